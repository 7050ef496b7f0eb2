use super::{
    FilterRule,
    MetricGroup,
};
use crate::metrics::{
    FilteredRecord,
    Gauge,
    Meter,
    RawMetricSnapshot,
    Timer,
};
use std::collections::{
    BTreeMap,
    HashMap,
};

/// Measurement of every cross-instance aggregate record.
pub const AGGREGATE_MEASUREMENT: &str = "metric_graphs";

/// Running min/max/sum over reported values. Percentiles are aggregated
/// with this as well, which only approximates a merged percentile.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Summary {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
}

impl Summary {
    fn collect(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut values = values.into_iter();
        let first = values.next()?;
        let mut summary = Self {
            count: 1,
            min: first,
            max: first,
            sum: first,
        };
        for value in values {
            summary.min = summary.min.min(value);
            summary.max = summary.max.max(value);
            summary.sum += value;
            summary.count += 1;
        }
        Some(summary)
    }

    fn avg(&self) -> f64 {
        self.sum / self.count as f64
    }
}

impl FilterRule {
    /// One `metric_graphs` record per matching metric name, combining the
    /// values of every snapshot that reports it.
    pub fn apply_to_service(&self, service_name: &str, snapshots: &[RawMetricSnapshot]) -> Vec<FilteredRecord> {
        debug!(rule = ?self, service = service_name, instances = snapshots.len(), "Grouping service metrics");
        if !self.is_usable() {
            return Vec::new();
        }

        match self.group {
            MetricGroup::Gauges => self.by_name(snapshots.iter().map(|s| &s.metrics.gauges))
                .into_iter()
                .filter_map(|(name, gauges)| aggregate_gauges(service_name, name, &gauges))
                .collect(),
            MetricGroup::Meters => self.by_name(snapshots.iter().map(|s| &s.metrics.meters))
                .into_iter()
                .filter_map(|(name, meters)| aggregate_meters(service_name, name, &meters))
                .collect(),
            MetricGroup::Timers => self.by_name(snapshots.iter().map(|s| &s.metrics.timers))
                .into_iter()
                .filter_map(|(name, timers)| aggregate_timers(service_name, name, &timers))
                .collect(),
        }
    }

    /// Collects the matching metrics of all instances under their name.
    fn by_name<'a, T: 'a>(
        &self,
        groups: impl Iterator<Item = &'a HashMap<String, T>>,
    ) -> BTreeMap<&'a str, Vec<&'a T>> {
        let mut grouped: BTreeMap<&str, Vec<&T>> = BTreeMap::new();
        for metrics in groups {
            for (name, metric) in metrics {
                if self.matches(name) {
                    grouped.entry(name.as_str()).or_default().push(metric);
                }
            }
        }
        grouped
    }
}

fn aggregate_record(service_name: &str, metric_name: &str) -> FilteredRecord {
    FilteredRecord::new(AGGREGATE_MEASUREMENT)
        .with_tag("service_name", service_name)
        .with_tag("metric_name", metric_name)
}

fn aggregate_gauges(service_name: &str, metric_name: &str, gauges: &[&Gauge]) -> Option<FilteredRecord> {
    let summary = Summary::collect(gauges.iter().map(|gauge| gauge.parse()))?;

    Some(
        aggregate_record(service_name, metric_name)
            .with_field("count", summary.count)
            .with_field("min", summary.min)
            .with_field("max", summary.max)
            .with_field("sum", summary.sum)
            .with_field("avg", summary.avg()),
    )
}

/// Counts and rates add up across instances.
fn aggregate_meters(service_name: &str, metric_name: &str, meters: &[&Meter]) -> Option<FilteredRecord> {
    if meters.is_empty() {
        return None;
    }
    let value = meters.iter().fold(0u64, |sum, meter| sum.saturating_add(meter.count));
    let m1_rate: f64 = meters.iter().map(|meter| meter.m1_rate).sum();

    Some(
        aggregate_record(service_name, metric_name)
            .with_field("count", meters.len())
            .with_field("value", value)
            .with_field("m1_rate", m1_rate),
    )
}

fn aggregate_timers(service_name: &str, metric_name: &str, timers: &[&Timer]) -> Option<FilteredRecord> {
    let m1 = Summary::collect(timers.iter().map(|timer| timer.m1_rate))?;
    let p50 = Summary::collect(timers.iter().map(|timer| timer.p50))?;
    let p99 = Summary::collect(timers.iter().map(|timer| timer.p99))?;
    let sum = timers.iter().fold(0u64, |sum, timer| sum.saturating_add(timer.count));

    Some(
        aggregate_record(service_name, metric_name)
            .with_field("count", timers.len())
            .with_field("sum", sum)
            .with_field("avg", sum as f64 / timers.len() as f64)
            .with_field("m1_min", m1.min)
            .with_field("m1_max", m1.max)
            .with_field("m1_avg", m1.avg())
            .with_field("p50_min", p50.min)
            .with_field("p50_max", p50.max)
            .with_field("p50_avg", p50.avg())
            .with_field("p99_min", p99.min)
            .with_field("p99_max", p99.max)
            .with_field("p99_avg", p99.avg()),
    )
}
