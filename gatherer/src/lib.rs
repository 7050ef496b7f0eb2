//! # Metrics Fetcher Gatherer
//!
//! Collects Dropwizard-style `/metrics` snapshots from every instance of the
//! services registered in Marathon and turns them into line protocol records.
//!
//! ## Architecture
//!
//! - **`registry`**: discovery of the instances carrying the configured label
//! - **`scrape`**: bounded worker pool fetching each instance's metrics endpoint
//! - **`metrics`**: raw snapshots, instance descriptors and filtered records
//! - **`filter`**: per-instance records and per-service aggregates selected by rules
//! - **`sinks`**: stdout and InfluxDB destinations sharing one line protocol encoder
//! - **`orchestrator`**: runs one batch through all of the above
//!
//! ## Usage
//!
//! ```bash
//! metrics-fetcher --marathon=http://marathon:8080 \
//!                 --label=gather-metrics \
//!                 --influx=http://influx:8086 \
//!                 --config=filters.yaml
//! ```

#[macro_use]
extern crate tracing;

pub mod filter;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod scrape;
pub mod sinks;

#[cfg(test)]
mod test_util;

pub use filter::{
    combine,
    FilterRule,
};
pub use metrics::*;
pub use orchestrator::{
    BatchReport,
    Orchestrator,
};
pub use registry::{
    MarathonRegistry,
    Registry,
    RegistryError,
};
pub use scrape::{
    fetch_metrics,
    ScrapeError,
    ScrapePool,
};
pub use sinks::{
    InfluxSink,
    Sink,
    SinkError,
    StdoutSink,
};
