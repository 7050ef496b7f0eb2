//! # Filter Module
//!
//! Turns raw snapshots into [`FilteredRecord`]s according to the configured rules.
//!
//! - **`instance`**: one record per matching metric per instance, stored under the rule's measurement
//! - **`aggregate`**: one `metric_graphs` record per matching metric name across all instances of a service
//!
//! Rules are independent of each other; a metric matching several rules
//! yields a record for each of them.

pub mod aggregate;
pub mod instance;

use crate::metrics::{
    FilteredRecord,
    GroupedSnapshots,
};
pub use aggregate::AGGREGATE_MEASUREMENT;
pub use metrics_fetcher_config::MetricGroup;
use metrics_fetcher_config::FilterConfig;
use regex::Regex;
use std::collections::HashMap;

/// Selects metrics of one group whose name contains a match of `path`.
#[derive(Debug, Clone)]
pub struct FilterRule {
    group: MetricGroup,
    path: String,
    pattern: Option<Regex>,
    measurement: String,
}

impl FilterRule {
    /// A `path` that is not a valid regular expression gives a rule that
    /// matches nothing.
    pub fn new(group: MetricGroup, path: impl Into<String>, measurement: impl Into<String>) -> Self {
        let path = path.into();
        let pattern = match Regex::new(&path) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                error!(path = %path, error = %e, "Invalid filter pattern");
                None
            }
        };
        Self {
            group,
            path,
            pattern,
            measurement: measurement.into(),
        }
    }

    pub fn group(&self) -> MetricGroup {
        self.group
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Substring semantics: `very.custom` matches `some.very.custom_Path`.
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.as_ref().is_some_and(|pattern| pattern.is_match(name))
    }

    fn is_usable(&self) -> bool {
        if self.pattern.is_none() {
            warn!(path = %self.path, group = %self.group, "Error matching filter to metrics, skipping rule");
        }
        self.pattern.is_some()
    }

    /// Entries of `metrics` whose name matches, ordered by name.
    fn matching<'a, T>(&self, metrics: &'a HashMap<String, T>) -> Vec<(&'a str, &'a T)> {
        let mut matched: Vec<_> = metrics
            .iter()
            .filter(|(name, _)| self.matches(name))
            .map(|(name, metric)| (name.as_str(), metric))
            .collect();
        matched.sort_unstable_by_key(|(name, _)| *name);
        matched
    }
}

impl From<&FilterConfig> for FilterRule {
    fn from(config: &FilterConfig) -> Self {
        FilterRule::new(config.group, config.path.clone(), config.measurement.clone())
    }
}

/// Runs every rule over every service: per-instance records of a rule come
/// first, followed by that rule's aggregates for the service.
///
/// Services are visited in name order, so the output does not depend on the
/// order in which scrapes completed.
pub fn combine(grouped: &GroupedSnapshots, rules: &[FilterRule]) -> Vec<FilteredRecord> {
    let mut services: Vec<_> = grouped.iter().collect();
    services.sort_unstable_by_key(|(name, _)| *name);

    let mut result = Vec::new();
    for (service_name, snapshots) in services {
        for rule in rules {
            for snapshot in snapshots {
                result.extend(rule.apply_to_instance(snapshot));
            }
            result.extend(rule.apply_to_service(service_name, snapshots));
        }
    }
    result
}
