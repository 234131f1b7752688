//! Self-metrics of the running service.

use tokio::time::Instant;

use sensorhub_framework::{Measurement, MetricRegistry, Tags};

pub const METER_NAME: &str = "sensorhub.application";

/// Registers `telemetry.service.uptime` and one
/// `telemetry.service.instrumentation{name}` series per enabled
/// instrumentation.
pub fn register(registry: &MetricRegistry, host: Option<&str>, instrumentations: &[&str]) {
    let base = match host {
        Some(host) => Tags::new().with("host", host),
        None => Tags::new(),
    };
    let meter = registry.meter(METER_NAME);
    let started = Instant::now();

    let tags = base.clone();
    meter
        .observable_gauge("telemetry.service.uptime")
        .with_description("Time since the service started")
        .with_unit("s")
        .with_callback(move || {
            vec![Measurement::new(
                started.elapsed().as_secs_f64(),
                tags.clone(),
            )]
        })
        .build();

    let enabled: Vec<Tags> = instrumentations
        .iter()
        .map(|name| base.clone().with("name", *name))
        .collect();
    meter
        .observable_gauge("telemetry.service.instrumentation")
        .with_description("Enabled instrumentations")
        .with_callback(move || {
            enabled
                .iter()
                .map(|tags| Measurement::new(1.0, tags.clone()))
                .collect()
        })
        .build();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn values(registry: &MetricRegistry, name: &str) -> Vec<Measurement> {
        registry
            .collect()
            .into_iter()
            .filter(|f| f.descriptor.name == name)
            .flat_map(|f| f.measurements)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_uptime_advances() {
        let registry = MetricRegistry::new();
        register(&registry, Some("pi"), &["ping"]);

        tokio::time::advance(Duration::from_secs(90)).await;
        let uptime = values(&registry, "telemetry.service.uptime");
        assert_eq!(uptime.len(), 1);
        assert_eq!(uptime[0].value, 90.0);
        assert_eq!(uptime[0].tags, Tags::new().with("host", "pi"));
    }

    #[tokio::test]
    async fn test_instrumentation_series() {
        let registry = MetricRegistry::new();
        register(&registry, None, &["omron", "sysinfo"]);

        let series = values(&registry, "telemetry.service.instrumentation");
        assert_eq!(series, vec![
            Measurement::new(1.0, Tags::new().with("name", "omron")),
            Measurement::new(1.0, Tags::new().with("name", "sysinfo")),
        ]);
    }
}
