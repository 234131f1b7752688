//! Omron instrumentation against an in-process sensor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinSet;

use sensorhub_framework::{FetchError, FetchOutcome, Fields, MetricRegistry, PollSource, TagValue};
use sensorhub_omron::frame::{self, COMMAND_READ, LATEST_DATA_LONG};
use sensorhub_omron::{OmronConfig, OmronDevice, OmronInstrumentation};

fn response() -> Vec<u8> {
    let mut data = vec![0u8; 28];
    data[1..3].copy_from_slice(&2150_i16.to_le_bytes());
    data[3..5].copy_from_slice(&4800_u16.to_le_bytes());
    frame::encode(COMMAND_READ, LATEST_DATA_LONG, &data)
}

/// Serves one canned response per request over an in-memory pipe.
struct FakeSensor {
    broken: Arc<AtomicBool>,
}

impl PollSource for FakeSensor {
    type Session = DuplexStream;

    async fn connect(&self) -> Result<DuplexStream, FetchError> {
        let (client, mut device) = tokio::io::duplex(256);
        let broken = self.broken.clone();
        tokio::spawn(async move {
            while frame::read_frame(&mut device).await.is_ok() {
                let mut reply = response();
                if broken.load(Ordering::SeqCst) {
                    let last = reply.len() - 1;
                    reply[last] ^= 0xFF;
                }
                if device.write_all(&reply).await.is_err() {
                    break;
                }
            }
        });
        Ok(client)
    }

    async fn read(&self, session: &mut DuplexStream) -> Result<Fields, FetchError> {
        frame::exchange(session).await
    }
}

fn config() -> OmronConfig {
    OmronConfig {
        host: Some("pi".to_string()),
        devices: vec![OmronDevice {
            port: "/dev/ttyUSB0".to_string(),
            name: Some("office".to_string()),
            baud_rate: 115_200,
        }],
        ..Default::default()
    }
}

fn value(registry: &MetricRegistry, name: &str) -> Option<f64> {
    registry
        .collect()
        .into_iter()
        .find(|f| f.descriptor.name == name)
        .and_then(|f| f.measurements.first().map(|m| m.value))
}

async fn tick(omron: &OmronInstrumentation<FakeSensor>) -> FetchOutcome {
    let mut tasks = JoinSet::new();
    omron.adapter().tick(&mut tasks);
    tasks.join_next().await.unwrap().unwrap()
}

#[tokio::test]
async fn test_read_exports_fields() {
    let registry = MetricRegistry::new();
    let broken = Arc::new(AtomicBool::new(false));
    let omron = OmronInstrumentation::with_sources(&config(), &registry, |_| FakeSensor {
        broken: broken.clone(),
    })
    .unwrap();

    assert_eq!(value(&registry, "sensor.temperature"), None);
    assert_eq!(tick(&omron).await, FetchOutcome::Updated);
    assert_eq!(value(&registry, "sensor.temperature"), Some(21.5));
    assert_eq!(value(&registry, "sensor.humidity"), Some(48.0));

    let families = registry.collect();
    let temperature = families
        .iter()
        .find(|f| f.descriptor.name == "sensor.temperature")
        .unwrap();
    let tags = &temperature.measurements[0].tags;
    assert_eq!(tags.get("model"), Some(&TagValue::from("omron")));
    assert_eq!(tags.get("port"), Some(&TagValue::from("/dev/ttyUSB0")));
    assert_eq!(tags.get("name"), Some(&TagValue::from("office")));
    assert_eq!(tags.get("host"), Some(&TagValue::from("pi")));
}

#[tokio::test]
async fn test_corrupt_frame_clears_then_recovers() {
    let registry = MetricRegistry::new();
    let broken = Arc::new(AtomicBool::new(false));
    let omron = OmronInstrumentation::with_sources(&config(), &registry, |_| FakeSensor {
        broken: broken.clone(),
    })
    .unwrap();

    assert_eq!(tick(&omron).await, FetchOutcome::Updated);

    broken.store(true, Ordering::SeqCst);
    assert_eq!(tick(&omron).await, FetchOutcome::Failed);
    assert_eq!(value(&registry, "sensor.temperature"), None);

    let store = omron.adapter().store();
    let observation = store.snapshot().pop().unwrap();
    assert!(observation.fields().is_empty());
    assert_eq!(observation.tags().get("name"), Some(&TagValue::from("office")));

    broken.store(false, Ordering::SeqCst);
    assert_eq!(tick(&omron).await, FetchOutcome::Updated);
    assert_eq!(value(&registry, "sensor.temperature"), Some(21.5));
}

#[test]
fn test_disabled_metrics_not_registered() {
    let mut config = config();
    config.metrics.seismic = false;
    config.metrics.light = false;

    let registry = MetricRegistry::new();
    OmronInstrumentation::with_sources(&config, &registry, |_| FakeSensor {
        broken: Arc::new(AtomicBool::new(false)),
    })
    .unwrap();

    let names: Vec<_> = registry
        .instruments()
        .iter()
        .map(|i| i.descriptor().name.clone())
        .collect();
    assert!(names.contains(&"sensor.temperature".to_string()));
    assert!(!names.contains(&"sensor.seismic".to_string()));
    assert!(!names.contains(&"sensor.light".to_string()));
    assert!(names.contains(&"sensorhub.adapter.fetches".to_string()));
}
