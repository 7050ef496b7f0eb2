use clap::Parser;
use std::{
    path::PathBuf,
    time::Duration,
};

/// Gathers metrics from the services
///
/// First it fetches the list of service instances from Marathon that carry a
/// specific label. Then it calls the very last port defined on each instance
/// (assumed to be the admin port) to fetch metrics, filters and aggregates
/// them per service and sends the result to InfluxDB and/or stdout.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about)]
pub struct Args {
    /// YAML configuration file holding the filter rules and any other setting.
    #[clap(long, env = "METRICS_FETCHER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address of the Marathon API to discover services with.
    #[clap(long, env = "METRICS_FETCHER_MARATHON", value_name = "URL")]
    pub marathon: Option<String>,

    /// Label to search services in Marathon with.
    #[clap(long, value_name = "LABEL")]
    pub label: Option<String>,

    /// How many fetcher workers to spawn.
    #[clap(long, value_name = "N")]
    pub workers: Option<usize>,

    /// How many scrape jobs may wait for a free worker.
    #[clap(long = "queue-size", value_name = "N")]
    pub queue_size: Option<usize>,

    /// Timeout of a single metrics request (e.g. "5s").
    #[clap(long = "request-timeout", value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub request_timeout: Option<Duration>,

    /// Upper bound for the whole scrape stage; whatever finished by then is used.
    #[clap(long = "batch-timeout", value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub batch_timeout: Option<Duration>,

    /// Address of an InfluxDB server where metrics should be pushed.
    #[clap(long, value_name = "URL")]
    pub influx: Option<String>,

    /// Name of the InfluxDB database.
    #[clap(long, value_name = "NAME")]
    pub database: Option<String>,

    /// Which retention policy should be used for pushing metrics.
    #[clap(long, value_name = "POLICY")]
    pub retention: Option<String>,

    /// InfluxDB user name.
    #[clap(long = "influx-user", env = "METRICS_FETCHER_INFLUX_USER", value_name = "USER")]
    pub influx_user: Option<String>,

    /// InfluxDB password.
    #[clap(long = "influx-password", env = "METRICS_FETCHER_INFLUX_PASSWORD", hide_env_values = true)]
    pub influx_password: Option<String>,

    /// Print the metrics in line protocol to stdout.
    #[clap(long, action = clap::ArgAction::Set, value_name = "BOOL")]
    pub stdout: Option<bool>,

    /// Extra tag added to every record, can be repeated.
    #[clap(long = "tag", value_parser = parse_key_val, value_name = "KEY=VALUE")]
    pub tags: Vec<(String, String)>,

    /// Enables debug logging.
    #[clap(short, long, action)]
    pub verbose: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
        ValueKind,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(marathon) = &self.marathon {
                cache.insert("marathon".to_string(), marathon.clone().into());
            }
            if let Some(label) = &self.label {
                cache.insert("label".to_string(), label.clone().into());
            }
            if let Some(workers) = self.workers {
                cache.insert("workers".to_string(), (workers as u64).into());
            }
            if let Some(queue_size) = self.queue_size {
                cache.insert("queue_size".to_string(), (queue_size as u64).into());
            }
            if let Some(timeout) = self.request_timeout {
                cache.insert(
                    "request_timeout".to_string(),
                    humantime::format_duration(timeout).to_string().into(),
                );
            }
            if let Some(timeout) = self.batch_timeout {
                cache.insert(
                    "batch_timeout".to_string(),
                    humantime::format_duration(timeout).to_string().into(),
                );
            }
            if let Some(influx) = &self.influx {
                cache.insert("influx.address".to_string(), influx.clone().into());
            }
            if let Some(database) = &self.database {
                cache.insert("influx.database".to_string(), database.clone().into());
            }
            if let Some(retention) = &self.retention {
                cache.insert("influx.retention".to_string(), retention.clone().into());
            }
            if let Some(user) = &self.influx_user {
                cache.insert("influx.username".to_string(), user.clone().into());
            }
            if let Some(password) = &self.influx_password {
                cache.insert("influx.password".to_string(), password.clone().into());
            }
            if let Some(stdout) = self.stdout {
                cache.insert("stdout".to_string(), stdout.into());
            }
            if !self.tags.is_empty() {
                cache.insert(
                    "extra_tags".to_string(),
                    ValueKind::Table(HashMap::from_iter(
                        self.tags.iter().map(|(k, v)| (k.clone(), Value::from(v.clone()))),
                    ))
                    .into(),
                );
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "{}\n\
Authors: {author}

Config directory: {config_dir_path}",
        clap::crate_version!()
    )
}
