#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod filter_config;
mod influx_config;

use app_config::AppConfig;
pub use app_config::get_config_dir;
pub use args::Args;
use eyre::{
    eyre,
    Result,
};
pub use filter_config::{
    FilterConfig,
    MetricGroup,
};
pub use influx_config::InfluxConfig;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::BTreeMap,
    path::Path,
    time::Duration,
};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    app_config: AppConfig,
    /// Marathon API used for service discovery.
    pub marathon: Url,
    /// Marathon label selecting the apps to scrape.
    pub label: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub queue_size: usize,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub batch_timeout: Option<Duration>,
    #[serde(default)]
    pub stdout: bool,
    #[serde(default)]
    pub influx: InfluxConfig,
    #[serde(default)]
    pub extra_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get()) * 5
}

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    /// Layers the built-in defaults, the YAML config file, `METRICS_FETCHER_*`
    /// environment variables and the command line, in that order.
    ///
    /// An explicit `--config` file must exist; the file in the default config
    /// directory is optional.
    pub fn new(args: &Args) -> Result<Self, config::ConfigError> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        builder = match &args.config {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                builder.add_source(
                    config::File::from(path.as_path())
                        .format(config::FileFormat::Yaml)
                        .required(true),
                )
            }
            None => builder.add_source(
                config::File::from(config_dir.join("config.yaml"))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            ),
        };

        builder = builder
            .add_source(
                config::Environment::with_prefix("METRICS_FETCHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .add_source(args.clone());

        let cfg: Self = builder.build()?.try_deserialize()?;

        Ok(cfg)
    }

    /// Directory the optional `config.yaml` was looked up in.
    pub fn config_dir(&self) -> &Path {
        &self.app_config.config_dir
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(eyre!("workers must be at least 1"));
        }
        if self.queue_size == 0 {
            return Err(eyre!("queue_size must be at least 1"));
        }
        if !self.stdout && !self.influx.enabled() {
            return Err(eyre!("no sink configured: enable stdout or set an influx address"));
        }
        if self.filters.is_empty() {
            warn!("No filters configured, nothing will be emitted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_config(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("metrics-fetcher-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.label, "gather-metrics");
        assert_eq!(config.marathon.as_str(), "http://localhost:8080/");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.influx.database, "services");
        assert!(config.workers >= 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_and_args_are_layered() {
        let path = write_config(
            r#"
label: from-file
workers: 3
influx:
  address: http://influx:8086
filters:
  - group: meters
    path: "^requests"
    measurement: requests
"#,
        );
        let args = Args::try_parse_from([
            "metrics-fetcher",
            "--config",
            path.to_str().unwrap(),
            "--workers",
            "7",
            "--database",
            "metrics",
            "--tag",
            "dc=sjc",
        ])
        .unwrap();

        let config = Config::new(&args).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.label, "from-file");
        assert_eq!(config.workers, 7);
        assert_eq!(config.influx.address.as_ref().map(Url::as_str), Some("http://influx:8086/"));
        assert_eq!(config.influx.database, "metrics");
        assert_eq!(config.influx.retention, "default");
        assert_eq!(config.extra_tags.get("dc").map(String::as_str), Some("sjc"));
        assert_eq!(
            config.filters,
            vec![FilterConfig {
                group: MetricGroup::Meters,
                path: "^requests".to_string(),
                measurement: "requests".to_string(),
            }]
        );
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let args = Args {
            config: Some("/nonexistent/metrics-fetcher.yaml".into()),
            ..Args::default()
        };
        assert!(Config::new(&args).is_err());
    }

    #[test]
    fn validate_requires_a_sink() {
        let config = Config {
            stdout: false,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            workers: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
