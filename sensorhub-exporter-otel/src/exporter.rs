//! Binding of registry instruments to an OpenTelemetry meter provider.
//!
//! Each instrument in the [`MetricRegistry`] becomes an OTel observable
//! instrument whose callback invokes the registry callback. The periodic
//! reader drives collection, so values are read from the observation stores
//! on every export tick, exactly as a Prometheus scrape would.

use std::collections::HashMap;

use opentelemetry::metrics::{Meter, MeterProvider as _, ObservableCounter, ObservableGauge};
use opentelemetry::{InstrumentationScope, KeyValue, Value};
use opentelemetry_otlp::{MetricExporter, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tracing::{debug, info};

use sensorhub_framework::{Instrument, MetricKind, MetricRegistry, TagValue, Tags};

use crate::config::{OtelConfig, OtlpProtocol};

/// Registry instruments exported over OTLP.
pub struct OtelBridge {
    provider: SdkMeterProvider,
    gauges: Vec<ObservableGauge<f64>>,
    counters: Vec<ObservableCounter<f64>>,
}

impl OtelBridge {
    /// Build the OTLP pipeline and bind every instrument currently in
    /// `registry`. Instruments registered afterwards are not exported.
    pub fn new(config: &OtelConfig, registry: &MetricRegistry) -> anyhow::Result<Self> {
        info!(
            endpoint = %config.endpoint,
            protocol = ?config.protocol,
            "Initializing OpenTelemetry exporter"
        );

        let resource = Resource::builder()
            .with_attributes(build_resource_attributes(
                &config.service_name,
                config.service_version.as_deref(),
                &config.resource,
            ))
            .build();

        let provider = init_meter_provider(config, resource)?;
        Ok(Self::with_provider(provider, registry))
    }

    /// Bind `registry` to an existing provider.
    pub fn with_provider(provider: SdkMeterProvider, registry: &MetricRegistry) -> Self {
        let mut meters: HashMap<String, Meter> = HashMap::new();
        let mut gauges = Vec::new();
        let mut counters = Vec::new();

        for instrument in registry.instruments() {
            let descriptor = instrument.descriptor().clone();
            let meter = meters
                .entry(descriptor.meter.clone())
                .or_insert_with(|| {
                    provider.meter_with_scope(
                        InstrumentationScope::builder(descriptor.meter.clone()).build(),
                    )
                })
                .clone();

            match descriptor.kind {
                MetricKind::Gauge => {
                    let mut builder = meter
                        .f64_observable_gauge(descriptor.name.clone())
                        .with_description(descriptor.description.clone());
                    if let Some(unit) = descriptor.unit.clone() {
                        builder = builder.with_unit(unit);
                    }
                    gauges.push(
                        builder
                            .with_callback(move |observer| {
                                for (value, attributes) in observations(&instrument) {
                                    observer.observe(value, &attributes);
                                }
                            })
                            .build(),
                    );
                }
                MetricKind::Counter => {
                    let mut builder = meter
                        .f64_observable_counter(descriptor.name.clone())
                        .with_description(descriptor.description.clone());
                    if let Some(unit) = descriptor.unit.clone() {
                        builder = builder.with_unit(unit);
                    }
                    counters.push(
                        builder
                            .with_callback(move |observer| {
                                for (value, attributes) in observations(&instrument) {
                                    observer.observe(value, &attributes);
                                }
                            })
                            .build(),
                    );
                }
            }

            debug!(
                meter = %descriptor.meter,
                metric = %descriptor.name,
                kind = descriptor.kind.as_str(),
                "Bound instrument to OTLP"
            );
        }

        info!(
            instruments = gauges.len() + counters.len(),
            "OpenTelemetry exporter ready"
        );

        Self {
            provider,
            gauges,
            counters,
        }
    }

    /// Number of bound instruments.
    pub fn instrument_count(&self) -> usize {
        self.gauges.len() + self.counters.len()
    }

    /// Flush pending data and stop the periodic reader.
    pub fn shutdown(&self) -> anyhow::Result<()> {
        info!("Shutting down OpenTelemetry exporter");
        self.provider
            .shutdown()
            .map_err(|e| anyhow::anyhow!("Failed to shutdown meter provider: {}", e))
    }
}

fn init_meter_provider(
    config: &OtelConfig,
    resource: Resource,
) -> anyhow::Result<SdkMeterProvider> {
    let exporter = match config.protocol {
        OtlpProtocol::Grpc => MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .with_timeout(config.timeout())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create gRPC metric exporter: {}", e))?,
        OtlpProtocol::Http => MetricExporter::builder()
            .with_http()
            .with_endpoint(&config.endpoint)
            .with_timeout(config.timeout())
            .with_headers(config.headers.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP metric exporter: {}", e))?,
    };

    let reader = PeriodicReader::builder(exporter)
        .with_interval(config.export_interval())
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build();

    info!("Meter provider initialized");
    Ok(provider)
}

fn observations(instrument: &Instrument) -> Vec<(f64, Vec<KeyValue>)> {
    instrument
        .observe()
        .into_iter()
        .map(|m| (m.value, build_attributes(&m.tags)))
        .collect()
}

/// Build resource attributes from config.
pub fn build_resource_attributes(
    service_name: &str,
    service_version: Option<&str>,
    extra_attrs: &HashMap<String, String>,
) -> Vec<KeyValue> {
    let mut attrs = Vec::with_capacity(2 + extra_attrs.len());

    attrs.push(KeyValue::new("service.name", service_name.to_string()));

    if let Some(version) = service_version {
        attrs.push(KeyValue::new("service.version", version.to_string()));
    }

    for (k, v) in extra_attrs {
        attrs.push(KeyValue::new(k.clone(), v.clone()));
    }

    attrs
}

/// Convert measurement tags into OTel attributes, keeping value types.
pub fn build_attributes(tags: &Tags) -> Vec<KeyValue> {
    tags.iter()
        .map(|(key, value)| {
            let value = match value {
                TagValue::Text(s) => Value::from(s.clone()),
                TagValue::Int(i) => Value::I64(*i),
                TagValue::Float(f) => Value::F64(*f),
            };
            KeyValue::new(key.to_string(), value)
        })
        .collect()
}
