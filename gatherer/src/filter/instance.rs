use super::{
    FilterRule,
    MetricGroup,
};
use crate::metrics::{
    FilteredRecord,
    InstanceDescriptor,
    RawMetricSnapshot,
};

impl FilterRule {
    /// One record per metric of the rule's group matching the pattern, tagged
    /// with the owning instance.
    pub fn apply_to_instance(&self, snapshot: &RawMetricSnapshot) -> Vec<FilteredRecord> {
        debug!(rule = ?self, service_id = %snapshot.instance.id, "Filtering instance metrics");
        if !self.is_usable() {
            return Vec::new();
        }
        let instance = &snapshot.instance;
        let metrics = &snapshot.metrics;

        match self.group {
            MetricGroup::Gauges => self.matching(&metrics.gauges)
                .into_iter()
                .map(|(name, gauge)| {
                    trace!(name, %gauge, "Found gauge metric");
                    self.instance_record(name, instance).with_field("value", gauge.parse())
                })
                .collect(),
            MetricGroup::Meters => self.matching(&metrics.meters)
                .into_iter()
                .map(|(name, meter)| {
                    trace!(name, %meter, "Found meter metric");
                    self.instance_record(name, instance)
                        .with_field("value", meter.count)
                        .with_field("m1_rate", meter.m1_rate)
                })
                .collect(),
            MetricGroup::Timers => self.matching(&metrics.timers)
                .into_iter()
                .map(|(name, timer)| {
                    trace!(name, %timer, "Found timer metric");
                    self.instance_record(name, instance)
                        .with_field("value", timer.count)
                        .with_field("m1_rate", timer.m1_rate)
                        .with_field("p50", timer.p50)
                        .with_field("p99", timer.p99)
                })
                .collect(),
        }
    }

    fn instance_record(&self, metric_name: &str, instance: &InstanceDescriptor) -> FilteredRecord {
        FilteredRecord::new(&self.measurement)
            .with_tag("service_name", &instance.name)
            .with_tag("host", &instance.host)
            .with_tag("metric_name", metric_name)
            .with_field("service_id", instance.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metrics::FieldValue,
        test_util::snapshots,
    };
    use pretty_assertions::assert_eq;

    fn expected(metric_name: &str, fields: &[(&str, FieldValue)]) -> FilteredRecord {
        let mut record = FilteredRecord::new("test-measurement")
            .with_tag("service_name", "test-service")
            .with_tag("host", "localhost")
            .with_tag("metric_name", metric_name)
            .with_field("service_id", "123-45-67-89");
        for (key, value) in fields {
            record = record.with_field(*key, value.clone());
        }
        record
    }

    #[test]
    fn gauge_exact_match() {
        let rule = FilterRule::new(MetricGroup::Gauges, "^some.very.custom_Path$", "test-measurement");
        assert_eq!(
            rule.apply_to_instance(&snapshots()[0]),
            vec![expected("some.very.custom_Path", &[("value", 1234.0.into())])]
        );
    }

    #[test]
    fn meter_exact_match() {
        let rule = FilterRule::new(MetricGroup::Meters, "^some.very.custom_Path$", "test-measurement");
        assert_eq!(
            rule.apply_to_instance(&snapshots()[0]),
            vec![expected(
                "some.very.custom_Path",
                &[("value", 123u64.into()), ("m1_rate", 2.0.into())]
            )]
        );
    }

    #[test]
    fn timer_exact_match() {
        let rule = FilterRule::new(MetricGroup::Timers, "^timer_custom_path$", "test-measurement");
        assert_eq!(
            rule.apply_to_instance(&snapshots()[0]),
            vec![expected(
                "timer_custom_path",
                &[
                    ("value", 12u64.into()),
                    ("m1_rate", 3.25.into()),
                    ("p50", 1.12.into()),
                    ("p99", 2.33.into()),
                ]
            )]
        );
    }

    #[test]
    fn gauge_prefix_match() {
        let rule = FilterRule::new(MetricGroup::Gauges, "^some_prefix_metric", "test-measurement");
        assert_eq!(
            rule.apply_to_instance(&snapshots()[0]),
            vec![expected("some_prefix_metric-sdf_34t_4hh2", &[("value", 683.0.into())])]
        );
    }

    #[test]
    fn gauge_substring_match() {
        let rule = FilterRule::new(MetricGroup::Gauges, "very.custom", "test-measurement");
        assert_eq!(
            rule.apply_to_instance(&snapshots()[0]),
            vec![
                expected("4some.very.custom_Path", &[("value", 895.0.into())]),
                expected("some.very.custom_Path", &[("value", 1234.0.into())]),
                expected("some.very.custom_Path2", &[("value", 7532.0.into())]),
            ]
        );
    }

    #[test]
    fn only_the_rule_group_is_searched() {
        let rule = FilterRule::new(MetricGroup::Timers, "very.custom", "test-measurement");
        assert!(rule.apply_to_instance(&snapshots()[0]).is_empty());
    }
}
