//! Destinations for the records of a batch.
//!
//! - **`StdoutSink`**: line protocol text on any writer, fails on records without fields
//! - **`InfluxSink`**: one HTTP write per batch, skips records without fields

pub mod influx;
pub mod stdout;

pub use crate::metrics::line_protocol::LineProtocolError;
use crate::metrics::FilteredRecord;
use chrono::{
    DateTime,
    Utc,
};
pub use influx::InfluxSink;
use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
};
pub use stdout::StdoutSink;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    LineProtocol(#[from] LineProtocolError),
    #[error("writing output failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid sink address `{0}`")]
    InvalidAddress(String),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}: {body}")]
    Status { url: String, status: u16, body: String },
}

/// Receives the combined records of one batch.
pub trait Sink: Send {
    /// Emit all records stamped with the batch `timestamp`, with `extra_tags`
    /// merged into the tags of every record.
    fn emit<'a>(
        &'a mut self,
        records: &'a [FilteredRecord],
        extra_tags: &'a BTreeMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;

    /// Get the name of this sink
    fn name(&self) -> &'static str;
}
