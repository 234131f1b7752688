//! Hardware instrumentation against the machine running the tests.

use tokio::task::JoinSet;

use sensorhub_framework::{FetchOutcome, MetricRegistry, TagValue};
use sensorhub_sysinfo::{HardwareSource, SysinfoConfig, SysinfoInstrumentation};

fn family_values(registry: &MetricRegistry, name: &str) -> Vec<(Option<String>, f64)> {
    registry
        .collect()
        .into_iter()
        .filter(|f| f.descriptor.name == name)
        .flat_map(|f| f.measurements)
        .map(|m| (m.tags.get("name").map(TagValue::to_string), m.value))
        .collect()
}

#[tokio::test]
async fn test_cpu_and_memory_reported() {
    let registry = MetricRegistry::new();
    let config = SysinfoConfig {
        host: Some("lab".to_string()),
        ..Default::default()
    };
    let sysinfo = SysinfoInstrumentation::with_sources(
        &config,
        &registry,
        vec![HardwareSource::Cpu, HardwareSource::Memory],
    )
    .unwrap();

    let mut tasks = JoinSet::new();
    sysinfo.adapter().tick(&mut tasks);
    while let Some(outcome) = tasks.join_next().await {
        assert_eq!(outcome.unwrap(), FetchOutcome::Updated);
    }

    let total = family_values(&registry, "hardware.memory.total");
    assert_eq!(total.len(), 1);
    assert_eq!(total[0].0.as_deref(), Some("memory"));
    assert!(total[0].1 > 0.0);

    let load = family_values(&registry, "hardware.cpu.load");
    assert_eq!(load.len(), 1);
    assert_eq!(load[0].0.as_deref(), Some("cpu"));

    // Memory fields never leak into the storage family
    assert!(family_values(&registry, "hardware.storage.space").is_empty());
}

#[tokio::test]
async fn test_vanished_interface_keeps_identity() {
    let registry = MetricRegistry::new();
    let sysinfo = SysinfoInstrumentation::with_sources(
        &SysinfoConfig::default(),
        &registry,
        vec![HardwareSource::Network {
            interface: "gone0".to_string(),
        }],
    )
    .unwrap();

    let mut tasks = JoinSet::new();
    sysinfo.adapter().tick(&mut tasks);
    let outcome = tasks.join_next().await.unwrap().unwrap();
    assert_eq!(outcome, FetchOutcome::Failed);

    assert!(family_values(&registry, "hardware.network.bytes").is_empty());
    let observation = sysinfo.adapter().store().snapshot().pop().unwrap();
    assert_eq!(observation.tags().get("name"), Some(&TagValue::from("gone0")));
}

#[test]
fn test_invalid_filter_is_startup_error() {
    let config = SysinfoConfig {
        disk: sensorhub_sysinfo::DiskConfig {
            include: vec!["[".to_string()],
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(SysinfoInstrumentation::new(&config, &MetricRegistry::new()).is_err());
}
