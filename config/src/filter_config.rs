use serde::{
    Deserialize,
    Serialize,
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

/// The raw metric kind a filter rule selects from.
///
/// Accepts both the plural names used as JSON keys by the metrics endpoint
/// (`gauges`) and the singular kind names (`gauge`).
#[derive(Debug, Clone, Copy, Display, EnumIter, EnumString, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricGroup {
    #[serde(alias = "gauge")]
    #[strum(to_string = "gauges", serialize = "gauge")]
    Gauges,
    #[serde(alias = "meter")]
    #[strum(to_string = "meters", serialize = "meter")]
    Meters,
    #[serde(alias = "timer")]
    #[strum(to_string = "timers", serialize = "timer")]
    Timers,
}

/// One `{group, path, measurement}` triple from the `filters` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterConfig {
    pub group: MetricGroup,
    /// Regular expression searched for anywhere in the metric name.
    pub path: String,
    /// Measurement name the matched per-instance records are stored under.
    pub measurement: String,
}
