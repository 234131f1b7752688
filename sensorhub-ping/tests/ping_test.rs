//! End-to-end tests for the ping instrumentation against local sockets.

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use sensorhub_framework::{FetchOutcome, MetricRegistry, TagValue};
use sensorhub_ping::{PingConfig, PingInstrumentation, PingTarget};

async fn drain(tasks: &mut JoinSet<FetchOutcome>) -> Vec<FetchOutcome> {
    let mut outcomes = Vec::new();
    while let Some(result) = tasks.join_next().await {
        outcomes.push(result.unwrap());
    }
    outcomes
}

#[tokio::test]
async fn test_reachable_target_reports_time() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = PingConfig {
        host: Some("pi".to_string()),
        targets: vec![PingTarget {
            name: Some("local".to_string()),
            ..PingTarget::new(addr.to_string())
        }],
        ..Default::default()
    };
    let registry = MetricRegistry::new();
    let ping = PingInstrumentation::new(&config, &registry).unwrap();

    let families = registry.collect();
    let time = families
        .iter()
        .find(|f| f.descriptor.name == "ping.result.time")
        .unwrap();
    assert!(time.measurements.is_empty());

    let mut tasks = JoinSet::new();
    ping.adapter().tick(&mut tasks);
    assert_eq!(drain(&mut tasks).await, vec![FetchOutcome::Updated]);

    let families = registry.collect();
    let time = families
        .iter()
        .find(|f| f.descriptor.name == "ping.result.time")
        .unwrap();
    assert_eq!(time.measurements.len(), 1);
    let tags = &time.measurements[0].tags;
    assert_eq!(tags.get("host"), Some(&TagValue::from("pi")));
    assert_eq!(tags.get("name"), Some(&TagValue::from("local")));
    assert_eq!(tags.get("address"), Some(&TagValue::from(addr.to_string())));
}

#[tokio::test]
async fn test_unresolvable_target_reports_nothing() {
    let config = PingConfig {
        targets: vec![
            PingTarget::new("127.0.0.1"),
            PingTarget::new("no-such-host.invalid"),
        ],
        timeout_ms: 2000,
        ..Default::default()
    };
    let registry = MetricRegistry::new();
    let ping = PingInstrumentation::new(&config, &registry).unwrap();

    let mut tasks = JoinSet::new();
    ping.adapter().tick(&mut tasks);
    let outcomes = drain(&mut tasks).await;
    assert!(outcomes.contains(&FetchOutcome::Failed));

    let families = registry.collect();
    let time = families
        .iter()
        .find(|f| f.descriptor.name == "ping.result.time")
        .unwrap();
    assert!(
        time.measurements
            .iter()
            .all(|m| m.tags.get("address") != Some(&TagValue::from("no-such-host.invalid")))
    );

    let stats = ping.adapter().stats().snapshot();
    assert!(stats.fetches_failed >= 1);
}

#[test]
fn test_duplicate_targets_rejected() {
    let config = PingConfig {
        targets: vec![PingTarget::new("10.0.0.1"), PingTarget::new("10.0.0.1")],
        ..Default::default()
    };
    assert!(PingInstrumentation::new(&config, &MetricRegistry::new()).is_err());
}
