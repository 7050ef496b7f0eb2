use crate::metrics::{
    Gauge,
    InstanceDescriptor,
    Meter,
    RawMetricSnapshot,
    RawMetrics,
    Timer,
};
use axum::Router;
use std::{
    collections::HashMap,
    net::SocketAddr,
};
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral local port for the lifetime of the test runtime.
pub(crate) async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Snapshot carrying only gauges, given as `(name, encoded value)` pairs.
pub(crate) fn snapshot(name: &str, id: &str, host: &str, gauges: &[(&str, &str)]) -> RawMetricSnapshot {
    let gauges = gauges
        .iter()
        .map(|(key, value)| (key.to_string(), Gauge::from_json(value).unwrap()))
        .collect();
    RawMetricSnapshot::new(
        InstanceDescriptor::new(name, id, host, 1234),
        RawMetrics {
            gauges,
            ..RawMetrics::default()
        },
    )
}

fn meter(count: u64, m1_rate: f64) -> Meter {
    Meter { count, m1_rate }
}

/// Two instances reporting the same metric names with different values.
pub(crate) fn snapshots() -> Vec<RawMetricSnapshot> {
    const NAMES: [&str; 4] = [
        "some.very.custom_Path",
        "some.very.custom_Path2",
        "some_prefix_metric-sdf_34t_4hh2",
        "4some.very.custom_Path",
    ];

    let mut first = snapshot(
        "test-service",
        "123-45-67-89",
        "localhost",
        &NAMES.iter().copied().zip(["1234", "7532", "683", "895"]).collect::<Vec<_>>(),
    );
    first.metrics.meters = NAMES
        .iter()
        .map(|name| name.to_string())
        .zip([meter(123, 2.0), meter(73, 3.0), meter(87, 4.0), meter(1, 5.0)])
        .collect();
    first.metrics.timers = HashMap::from([(
        "timer_custom_path".to_string(),
        Timer {
            count: 12,
            m1_rate: 3.25,
            p50: 1.12,
            p99: 2.33,
        },
    )]);

    let mut second = snapshot(
        "test-service2",
        "456-22-11-11",
        "localhost2",
        &NAMES.iter().copied().zip(["542", "2235", "892", "481"]).collect::<Vec<_>>(),
    );
    second.metrics.meters = NAMES
        .iter()
        .map(|name| name.to_string())
        .zip([meter(8, 0.0), meter(2, 0.0), meter(21, 0.0), meter(51, 0.0)])
        .collect();
    second.metrics.timers = HashMap::from([(
        "timer_custom_path".to_string(),
        Timer {
            count: 8,
            m1_rate: 4.904,
            p50: 77.31,
            p99: 32.478,
        },
    )]);

    vec![first, second]
}
