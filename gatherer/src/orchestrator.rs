use crate::{
    filter::{
        combine,
        FilterRule,
    },
    registry::{
        MarathonRegistry,
        Registry,
    },
    scrape::ScrapePool,
    sinks::{
        InfluxSink,
        Sink,
        StdoutSink,
    },
};
use chrono::Utc;
use eyre::{
    Result,
    WrapErr,
};
use metrics_fetcher_config::Config;
use reqwest::Client as HttpClient;
use std::{
    collections::BTreeMap,
    fmt,
};

const USER_AGENT: &str = "metrics-fetcher";

/// Outcome of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Instances returned by discovery.
    pub instances: usize,
    /// Instances whose metrics were fetched and decoded.
    pub scraped: usize,
    /// Records handed to every sink.
    pub records: usize,
    pub sink_failures: usize,
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} instances scraped, {} records emitted",
            self.scraped, self.instances, self.records
        )?;
        if self.sink_failures > 0 {
            write!(f, ", {} sink(s) failed", self.sink_failures)?;
        }
        Ok(())
    }
}

/// Runs one batch: discovery, scrape, filter and emit.
pub struct Orchestrator {
    registry: Box<dyn Registry>,
    pool: ScrapePool,
    rules: Vec<FilterRule>,
    label: String,
    sinks: Vec<Box<dyn Sink>>,
    extra_tags: BTreeMap<String, String>,
}

impl Orchestrator {
    pub fn new(
        registry: impl Registry + 'static,
        pool: ScrapePool,
        rules: Vec<FilterRule>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            registry: Box::new(registry),
            pool,
            rules,
            label: label.into(),
            sinks: Vec::new(),
            extra_tags: BTreeMap::new(),
        }
    }

    pub fn with_sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Tags added to every emitted record, overriding tags of the same name.
    pub fn with_extra_tags(mut self, extra_tags: BTreeMap<String, String>) -> Self {
        self.extra_tags = extra_tags;
        self
    }

    /// Wires Marathon discovery, the scrape pool and the enabled sinks,
    /// sharing one HTTP client between them.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = HttpClient::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let registry = MarathonRegistry::new(config.marathon.clone(), client.clone(), config.workers)
            .wrap_err("Failed to configure Marathon client")?;
        let pool = ScrapePool::new(client.clone(), config.workers)
            .with_queue_size(config.queue_size)
            .with_batch_timeout(config.batch_timeout);
        let rules = config.filters.iter().map(FilterRule::from).collect();

        let mut orchestrator =
            Self::new(registry, pool, rules, config.label.clone()).with_extra_tags(config.extra_tags.clone());
        if config.stdout {
            orchestrator = orchestrator.with_sink(StdoutSink::stdout());
        }
        if config.influx.enabled() {
            let sink = InfluxSink::new(client, &config.influx).wrap_err("Failed to configure InfluxDB sink")?;
            orchestrator = orchestrator.with_sink(sink);
        }
        Ok(orchestrator)
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    /// Discovery failures abort the batch before anything is scraped.
    /// Failed scrapes and sinks are logged and counted in the report.
    pub async fn run(&mut self) -> Result<BatchReport> {
        info!(registry = self.registry.name(), label = %self.label, "Discovering instances");
        let instances = self
            .registry
            .list_instances(&self.label)
            .await
            .wrap_err_with(|| format!("Failed to list instances labelled `{}`", self.label))?;

        let mut report = BatchReport {
            instances: instances.len(),
            ..BatchReport::default()
        };

        let grouped = self.pool.scrape(instances).await;
        report.scraped = grouped.values().map(Vec::len).sum();

        let records = combine(&grouped, &self.rules);
        report.records = records.len();
        debug!(records = records.len(), rules = self.rules.len(), "Filtered metrics");

        let timestamp = Utc::now();
        for sink in &mut self.sinks {
            if let Err(e) = sink.emit(&records, &self.extra_tags, timestamp).await {
                error!(sink = sink.name(), error = %e, "Failed to emit metrics");
                report.sink_failures += 1;
            }
        }

        info!(%report, "Batch finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        filter::{
            MetricGroup,
            AGGREGATE_MEASUREMENT,
        },
        metrics::{
            FieldValue,
            FilteredRecord,
            InstanceDescriptor,
        },
        registry::RegistryError,
        sinks::SinkError,
        test_util::serve,
    };
    use axum::{
        routing::get,
        Router,
    };
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use std::{
        future::Future,
        net::SocketAddr,
        pin::Pin,
        sync::{
            Arc,
            Mutex,
        },
    };

    struct FixedRegistry(Option<Vec<InstanceDescriptor>>);

    impl Registry for FixedRegistry {
        fn list_instances<'a>(
            &'a self,
            _label: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<InstanceDescriptor>, RegistryError>> + Send + 'a>> {
            Box::pin(async move {
                self.0
                    .clone()
                    .ok_or_else(|| RegistryError::InvalidAddress("http://marathon.invalid".to_string()))
            })
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    type Batches = Arc<Mutex<Vec<(Vec<FilteredRecord>, DateTime<Utc>)>>>;

    struct RecordingSink(Batches);

    impl Sink for RecordingSink {
        fn emit<'a>(
            &'a mut self,
            records: &'a [FilteredRecord],
            extra_tags: &'a BTreeMap<String, String>,
            timestamp: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
            Box::pin(async move {
                let records = records
                    .iter()
                    .cloned()
                    .map(|mut record| {
                        record.tags.extend(extra_tags.clone());
                        record
                    })
                    .collect();
                self.0.lock().unwrap().push((records, timestamp));
                Ok(())
            })
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    struct FailingSink;

    impl Sink for FailingSink {
        fn emit<'a>(
            &'a mut self,
            _records: &'a [FilteredRecord],
            _extra_tags: &'a BTreeMap<String, String>,
            _timestamp: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
            Box::pin(async { Err(SinkError::InvalidAddress("nowhere".to_string())) })
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    async fn instance(id: &str, value: u32) -> InstanceDescriptor {
        let body = format!(r#"{{"gauges": {{"x": {{"value": {value}}}}}}}"#);
        let addr: SocketAddr = serve(Router::new().route("/metrics", get(move || async move { body }))).await;
        InstanceDescriptor::new("svc", id, addr.ip().to_string(), addr.port())
    }

    fn orchestrator(registry: FixedRegistry) -> Orchestrator {
        Orchestrator::new(
            registry,
            ScrapePool::new(HttpClient::new(), 2),
            vec![FilterRule::new(MetricGroup::Gauges, "^x$", "m")],
            "gather-metrics",
        )
    }

    #[tokio::test]
    async fn emits_instance_and_aggregate_records() {
        let instances = vec![instance("id1", 100).await, instance("id2", 20).await];
        let batches = Batches::default();
        let mut orchestrator = orchestrator(FixedRegistry(Some(instances)))
            .with_extra_tags(BTreeMap::from([("dc".to_string(), "sjc".to_string())]))
            .with_sink(FailingSink)
            .with_sink(RecordingSink(batches.clone()));

        let report = orchestrator.run().await.unwrap();

        assert_eq!(
            report,
            BatchReport {
                instances: 2,
                scraped: 2,
                records: 3,
                sink_failures: 1,
            }
        );

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let (records, _) = &batches[0];
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|record| record.tag("dc") == Some("sjc")));

        let mut values: Vec<_> = records[..2]
            .iter()
            .map(|record| (record.field("service_id").cloned(), record.field("value").cloned()))
            .collect();
        values.sort_by_key(|(id, _)| format!("{id:?}"));
        assert_eq!(
            values,
            vec![
                (Some(FieldValue::from("id1")), Some(FieldValue::Float(100.0))),
                (Some(FieldValue::from("id2")), Some(FieldValue::Float(20.0))),
            ]
        );

        let aggregate = &records[2];
        assert_eq!(aggregate.measurement, AGGREGATE_MEASUREMENT);
        assert_eq!(aggregate.field("min"), Some(&20.0.into()));
        assert_eq!(aggregate.field("max"), Some(&100.0.into()));
        assert_eq!(aggregate.field("avg"), Some(&60.0.into()));
        assert_eq!(aggregate.field("sum"), Some(&120.0.into()));
        assert_eq!(aggregate.field("count"), Some(&2usize.into()));
    }

    #[tokio::test]
    async fn discovery_failure_aborts_the_batch() {
        let batches = Batches::default();
        let mut orchestrator = orchestrator(FixedRegistry(None)).with_sink(RecordingSink(batches.clone()));

        let result = orchestrator.run().await;

        assert!(result.is_err());
        assert!(batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_instances_still_reaches_sinks() {
        let batches = Batches::default();
        let mut orchestrator =
            orchestrator(FixedRegistry(Some(Vec::new()))).with_sink(RecordingSink(batches.clone()));

        let report = orchestrator.run().await.unwrap();

        assert_eq!(report, BatchReport::default());
        assert_eq!(batches.lock().unwrap()[0].0, Vec::new());
    }

    #[test]
    fn report_display() {
        let report = BatchReport {
            instances: 4,
            scraped: 3,
            records: 12,
            sink_failures: 0,
        };
        assert_eq!(report.to_string(), "3/4 instances scraped, 12 records emitted");
        let failed = BatchReport {
            sink_failures: 1,
            ..report
        };
        assert_eq!(failed.to_string(), "3/4 instances scraped, 12 records emitted, 1 sink(s) failed");
    }

    #[test]
    fn sinks_follow_config() {
        let mut config = Config::default();
        config.stdout = true;
        assert_eq!(Orchestrator::from_config(&config).unwrap().sink_names(), vec!["stdout"]);

        config.influx.address = Some("http://influx:8086".parse().unwrap());
        assert_eq!(
            Orchestrator::from_config(&config).unwrap().sink_names(),
            vec!["stdout", "influxdb"]
        );

        config.stdout = false;
        assert_eq!(Orchestrator::from_config(&config).unwrap().sink_names(), vec!["influxdb"]);
    }
}
