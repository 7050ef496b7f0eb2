use super::InstanceDescriptor;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::{
    collections::HashMap,
    fmt,
};

/// Point-in-time value. Kept in its encoded form and only decoded on
/// [`Gauge::parse`], since services report anything from numbers to strings
/// and lists here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Gauge {
    #[serde(default)]
    value: Option<Box<RawValue>>,
}

impl Gauge {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        Ok(Self {
            value: Some(RawValue::from_string(raw.to_string())?),
        })
    }

    /// The encoded value as received, `null` when it was absent.
    pub fn raw(&self) -> &str {
        self.value.as_deref().map_or("null", RawValue::get)
    }

    /// Decodes the value as a number. Anything non-numeric reads as `0`.
    pub fn parse(&self) -> f64 {
        self.value
            .as_deref()
            .and_then(|raw| serde_json::from_str::<f64>(raw.get()).ok())
            .unwrap_or_default()
    }
}

impl PartialEq for Gauge {
    fn eq(&self, other: &Self) -> bool {
        self.raw() == other.raw()
    }
}

impl fmt::Display for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.parse())
    }
}

/// Monotonic event counter with its one-minute rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Meter {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub m1_rate: f64,
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.count)
    }
}

/// Event counter with latency percentiles as estimated by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Timer {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub m1_rate: f64,
    #[serde(default)]
    pub p50: f64,
    #[serde(default)]
    pub p99: f64,
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value: {}, P50: {:.6}, P99: {:.6}, M1_Rate: {:.6}",
            self.count, self.p50, self.p99, self.m1_rate
        )
    }
}

/// Body of a `/metrics` response. Groups other than these three
/// (`counters`, `histograms`) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawMetrics {
    #[serde(default)]
    pub gauges: HashMap<String, Gauge>,
    #[serde(default)]
    pub meters: HashMap<String, Meter>,
    #[serde(default)]
    pub timers: HashMap<String, Timer>,
}

/// Everything scraped from one instance in one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMetricSnapshot {
    pub instance: InstanceDescriptor,
    pub metrics: RawMetrics,
}

impl RawMetricSnapshot {
    pub fn new(instance: InstanceDescriptor, metrics: RawMetrics) -> Self {
        Self { instance, metrics }
    }
}

/// Snapshots of one batch keyed by service name.
pub type GroupedSnapshots = HashMap<String, Vec<RawMetricSnapshot>>;
