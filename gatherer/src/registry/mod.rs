//! Discovery of the instances to scrape.

pub mod marathon;

use crate::metrics::InstanceDescriptor;
pub use marathon::MarathonRegistry;
use std::{
    future::Future,
    pin::Pin,
};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid registry address `{0}`")]
    InvalidAddress(String),
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with {status}")]
    Status { url: String, status: u16 },
    #[error("invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("app {0} has a task without ports")]
    NoPorts(String),
}

/// Source of the instances labelled for scraping.
pub trait Registry: Send + Sync {
    /// Every running instance of the services carrying `label`.
    fn list_instances<'a>(
        &'a self,
        label: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<InstanceDescriptor>, RegistryError>> + Send + 'a>>;

    fn name(&self) -> &'static str;
}
