use crate::Args;
use color_eyre::Result;
use eyre::WrapErr;
use metrics_fetcher_config::Config;
use metrics_fetcher_gatherer::Orchestrator;

pub struct App {
    config: Config,
}

impl App {
    pub fn new(args: Args) -> Result<Self> {
        let config = Config::new(&args).wrap_err("Failed to load configuration")?;
        config.validate().wrap_err("Invalid configuration")?;
        debug!(config_dir = %config.config_dir().display(), "Configuration loaded");
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a single batch. Discovery and configuration errors end the
    /// process, anything else is reported in the log.
    pub async fn run(self) -> Result<()> {
        info!(
            marathon = %self.config.marathon,
            label = %self.config.label,
            workers = self.config.workers,
            filters = self.config.filters.len(),
            "Starting metrics fetcher"
        );
        let report = Orchestrator::from_config(&self.config)?.run().await?;
        info!(
            instances = report.instances,
            scraped = report.scraped,
            records = report.records,
            sink_failures = report.sink_failures,
            "Done"
        );
        Ok(())
    }
}
