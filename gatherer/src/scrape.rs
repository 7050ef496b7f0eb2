//! Bounded pool of workers pulling instances off a shared queue and fetching
//! their `/metrics` endpoint.
//!
//! Workers never touch the grouped result; they hand snapshots to the single
//! consumer in [`ScrapePool::scrape`] over a channel.

use crate::metrics::{
    GroupedSnapshots,
    InstanceDescriptor,
    RawMetricSnapshot,
    RawMetrics,
};
use reqwest::Client as HttpClient;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{
        mpsc,
        Mutex,
    },
    task::JoinSet,
};
use tracing::instrument;

pub const DEFAULT_QUEUE_SIZE: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status { url: String, status: u16 },
    #[error("invalid metrics body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
}

impl ScrapeError {
    fn transport(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ScrapeError::Timeout { url: url.to_string() }
        } else {
            ScrapeError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }
}

/// GETs the metrics endpoint of `instance` and decodes the body.
#[instrument(level = "debug", skip_all, fields(service = %instance.name, uri = %instance.address()))]
pub async fn fetch_metrics(client: &HttpClient, instance: &InstanceDescriptor) -> Result<RawMetricSnapshot, ScrapeError> {
    let url = instance.address();
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| ScrapeError::transport(&url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::Status {
            url,
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(|e| ScrapeError::transport(&url, e))?;
    let metrics: RawMetrics = serde_json::from_slice(&body).map_err(|source| ScrapeError::Decode {
        url: url.clone(),
        source,
    })?;
    debug!(
        gauges = metrics.gauges.len(),
        meters = metrics.meters.len(),
        timers = metrics.timers.len(),
        "Fetched metrics"
    );

    Ok(RawMetricSnapshot::new(instance.clone(), metrics))
}

#[derive(Debug, Clone)]
pub struct ScrapePool {
    client: HttpClient,
    max_workers: usize,
    queue_size: usize,
    batch_timeout: Option<Duration>,
}

impl ScrapePool {
    pub fn new(client: HttpClient, max_workers: usize) -> Self {
        Self {
            client,
            max_workers: max_workers.max(1),
            queue_size: DEFAULT_QUEUE_SIZE,
            batch_timeout: None,
        }
    }

    /// Capacity of the job queue between the dispatcher and the workers.
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    /// Upper bound for a whole batch. Results completed before the deadline
    /// are kept, everything still pending is abandoned.
    pub fn with_batch_timeout(mut self, batch_timeout: Option<Duration>) -> Self {
        self.batch_timeout = batch_timeout;
        self
    }

    /// Scrapes every instance and groups the successful snapshots by service
    /// name. Failed instances are logged and left out.
    pub async fn scrape(&self, instances: Vec<InstanceDescriptor>) -> GroupedSnapshots {
        let mut grouped = GroupedSnapshots::new();
        if instances.is_empty() {
            return grouped;
        }

        let total = instances.len();
        let (job_tx, job_rx) = mpsc::channel::<InstanceDescriptor>(self.queue_size);
        let (result_tx, mut results) = mpsc::unbounded_channel::<RawMetricSnapshot>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut tasks = JoinSet::new();
        let workers = self.max_workers.min(total);
        info!(instances = total, workers, "Starting scrape");

        for task_id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let client = self.client.clone();
            tasks.spawn(async move {
                loop {
                    // The lock is only held while waiting for the next job.
                    let job = job_rx.lock().await.recv().await;
                    let Some(instance) = job else {
                        break;
                    };
                    debug!(task_id, instance = %instance, "Scraping instance");
                    match fetch_metrics(&client, &instance).await {
                        Ok(snapshot) => {
                            if result_tx.send(snapshot).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(task_id, instance = %instance, error = %e, "Dropping instance from batch"),
                    }
                }
                debug!(task_id, "Worker finished");
            });
        }
        drop(result_tx);

        tasks.spawn(async move {
            for instance in instances {
                if job_tx.send(instance).await.is_err() {
                    break;
                }
            }
        });

        let collect = async {
            while let Some(snapshot) = results.recv().await {
                grouped
                    .entry(snapshot.instance.name.clone())
                    .or_default()
                    .push(snapshot);
            }
        };
        match self.batch_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, collect).await.is_err() {
                    warn!(timeout = ?limit, "Batch timed out, abandoning pending instances");
                    tasks.abort_all();
                }
            }
            None => collect.await,
        }

        while let Ok(snapshot) = results.try_recv() {
            grouped
                .entry(snapshot.instance.name.clone())
                .or_default()
                .push(snapshot);
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    error!(error = %e, "Scrape worker panicked");
                }
            }
        }

        let scraped: usize = grouped.values().map(Vec::len).sum();
        info!(instances = total, scraped, services = grouped.len(), "Scrape finished");
        grouped
    }
}
