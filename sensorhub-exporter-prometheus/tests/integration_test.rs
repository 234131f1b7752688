//! Integration tests for the Prometheus endpoint.
//!
//! These tests drive the whole path: adapter writes into a store, the
//! exporter reads it on scrape, and the HTTP server renders the result.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Instant;

use sensorhub_exporter_prometheus::{HttpServer, PrometheusConfig, Renderer};
use sensorhub_framework::{
    Component, EntityId, Fields, MetricRegistry, ObservationStore, SnapshotExporter,
    StalenessPolicy, Tags,
};

/// Helper to parse Prometheus text format into `(series, value)` pairs.
fn parse_samples(body: &str) -> Vec<(String, f64)> {
    body.lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .filter_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            Some((series.to_string(), value.parse().ok()?))
        })
        .collect()
}

fn sensor_registry(policy: StalenessPolicy) -> (MetricRegistry, ObservationStore) {
    let registry = MetricRegistry::new();
    let store = ObservationStore::new();
    let exporter = SnapshotExporter::new(store.clone(), policy);
    let meter = registry.meter("sensorhub.test");

    exporter.register(
        &meter,
        "sensor.temperature",
        "Temperature",
        Some("Cel"),
        vec![Component::field("temperature")],
    );
    exporter.register(
        &meter,
        "hardware.network.bytes",
        "Network bytes",
        Some("By"),
        vec![
            Component::field("rx").with_tag("direction", "rx"),
            Component::field("tx").with_tag("direction", "tx"),
        ],
    );
    (registry, store)
}

#[tokio::test]
async fn test_scrape_reflects_store() {
    let (registry, store) = sensor_registry(StalenessPolicy::disabled());
    let renderer = Renderer::new(&PrometheusConfig::default());

    store.upsert(
        &EntityId::port("/dev/ttyUSB0").unwrap(),
        || Tags::new().with("model", "omron").with("port", "/dev/ttyUSB0"),
        |obs| obs.record(Instant::now(), Fields::new().with("temperature", 24.37)),
    );
    store.upsert(
        &EntityId::key("eth0").unwrap(),
        || Tags::new().with("name", "eth0"),
        |obs| obs.record(Instant::now(), Fields::new().with("rx", 1024.0).with("tx", 512.0)),
    );

    let body = renderer.scrape(&registry);
    let samples = parse_samples(&body);

    assert!(samples.contains(&(
        "sensor_temperature{model=\"omron\",port=\"/dev/ttyUSB0\"}".to_string(),
        24.37
    )));
    assert!(samples.contains(&(
        "hardware_network_bytes{direction=\"rx\",name=\"eth0\"}".to_string(),
        1024.0
    )));
    assert!(samples.contains(&(
        "hardware_network_bytes{direction=\"tx\",name=\"eth0\"}".to_string(),
        512.0
    )));
}

#[tokio::test]
async fn test_repeated_scrapes_same_samples() {
    let (registry, store) = sensor_registry(StalenessPolicy::disabled());
    let renderer = Renderer::new(&PrometheusConfig::default());
    store.upsert(&EntityId::key("a").unwrap(), Tags::new, |obs| {
        obs.record(Instant::now(), Fields::new().with("temperature", 20.0))
    });

    let strip = |body: String| {
        body.lines()
            .filter(|l| !l.contains("scrapes_total"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let first = strip(renderer.scrape(&registry));
    let second = strip(renderer.scrape(&registry));
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_stale_entity_disappears_from_scrape() {
    let (registry, store) = sensor_registry(StalenessPolicy::from_millis(1000));
    let renderer = Renderer::new(&PrometheusConfig::default());
    store.upsert(&EntityId::key("a").unwrap(), Tags::new, |obs| {
        obs.record(Instant::now(), Fields::new().with("temperature", 20.0))
    });

    assert!(renderer.scrape(&registry).contains("sensor_temperature 20\n"));

    tokio::time::advance(Duration::from_millis(1001)).await;
    assert!(!renderer.scrape(&registry).contains("sensor_temperature 20"));
}

#[tokio::test]
async fn test_empty_registry_render() {
    let renderer = Renderer::new(&PrometheusConfig::default());
    let body = renderer.scrape(&MetricRegistry::new());

    assert_eq!(parse_samples(&body), vec![(
        "sensorhub_exporter_scrapes_total".to_string(),
        1.0
    )]);
}

#[tokio::test]
async fn test_http_server_metrics_endpoint() {
    let (registry, store) = sensor_registry(StalenessPolicy::disabled());
    store.upsert(
        &EntityId::key("living").unwrap(),
        || Tags::new().with("name", "living"),
        |obs| obs.record(Instant::now(), Fields::new().with("temperature", 22.5)),
    );

    let config = PrometheusConfig {
        listen: "127.0.0.1:0".to_string(),
        ..Default::default()
    };
    let listener = TcpListener::bind(config.listen_addr().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = HttpServer::new(registry, &config).unwrap();
    let server_handle = tokio::spawn(async move { server.serve(listener, shutdown_rx).await });

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("# TYPE sensor_temperature gauge"));
    assert!(body.contains("sensor_temperature{name=\"living\"} 22.5"));

    let ready = client
        .get(format!("http://{}/ready", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(ready.status(), 200);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server_handle)
        .await
        .expect("server did not shut down")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_scrapes_during_ingestion() {
    let (registry, store) = sensor_registry(StalenessPolicy::disabled());
    let renderer = std::sync::Arc::new(Renderer::new(&PrometheusConfig::default()));

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let name = format!("sensor{}", i % 10);
                let id = EntityId::key(name.clone()).unwrap();
                store.upsert(&id, || Tags::new().with("name", name), |obs| {
                    obs.record(Instant::now(), Fields::new().with("rx", i as f64).with("tx", i as f64))
                });
                tokio::task::yield_now().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let registry = registry.clone();
        let renderer = renderer.clone();
        readers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let body = renderer.scrape(&registry);
                // rx and tx of one entity are written together, so a scrape
                // never sees them disagree.
                let samples = parse_samples(&body);
                for (series, value) in &samples {
                    if let Some(rest) = series.strip_prefix("hardware_network_bytes{direction=\"rx\"") {
                        let tx = format!("hardware_network_bytes{{direction=\"tx\"{}", rest);
                        let paired = samples.iter().find(|(s, _)| *s == tx).map(|(_, v)| *v);
                        assert_eq!(paired, Some(*value));
                    }
                }
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
}
