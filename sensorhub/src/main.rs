//! SensorHub service binary.

use anyhow::Result;

use sensorhub::{Instrumentations, SensorHubConfig};
use sensorhub_exporter_otel::OtelBridge;
use sensorhub_exporter_prometheus::HttpServer;
use sensorhub_framework::{ServiceArgs, ServiceConfig, ServiceRunner};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ServiceArgs::parse_with_default("sensorhub.json5");

    let mut config = SensorHubConfig::load(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;
    if let Some(listen) = &args.listen {
        config.prometheus.listen = listen.clone();
        config
            .prometheus
            .validate()
            .map_err(|e| anyhow::anyhow!("--listen: {}", e))?;
    }
    config.apply_host();

    let mut runner = ServiceRunner::new("sensorhub", config);
    runner
        .init_logging(Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let registry = runner.registry();
    let instrumentations = Instrumentations::build(runner.config(), &registry)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    tracing::info!(
        instrumentations = instrumentations.count(),
        instruments = registry.len(),
        "Metrics registered"
    );

    let otel = match &runner.config().otlp {
        Some(otlp) => Some(OtelBridge::new(otlp, &registry)?),
        None => None,
    };

    let server = HttpServer::new(registry, &runner.config().prometheus)?;
    let shutdown = runner.shutdown_signal();
    runner.spawn_with_error("http", server.run(shutdown));

    instrumentations.spawn_all(&mut runner);

    let result = runner.run().await.map_err(|e| anyhow::anyhow!("{}", e));

    if let Some(otel) = otel
        && let Err(e) = otel.shutdown()
    {
        tracing::warn!(error = %e, "OTLP exporter shutdown failed");
    }
    result
}
