//! Prometheus text exposition rendering.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use sensorhub_framework::{MetricFamily, MetricKind, MetricRegistry};

use crate::config::{FilterConfig, PrometheusConfig};
use crate::mapping::{
    build_metric_name, escape_help, escape_label_value, format_value, sanitize_label_name,
};

/// Metric name filter built from glob patterns.
#[derive(Debug, Clone, Default)]
pub struct MetricFilter {
    include_metrics: Vec<glob::Pattern>,
    exclude_metrics: Vec<glob::Pattern>,
}

impl MetricFilter {
    /// Create a new filter from configuration. Invalid patterns are skipped;
    /// [`PrometheusConfig::validate`] rejects them up front.
    pub fn new(config: &FilterConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<glob::Pattern> {
            patterns
                .iter()
                .filter_map(|p| glob::Pattern::new(p).ok())
                .collect()
        };

        Self {
            include_metrics: compile(&config.include_metrics),
            exclude_metrics: compile(&config.exclude_metrics),
        }
    }

    /// Check if an instrument name should be exposed.
    pub fn allows(&self, name: &str) -> bool {
        if !self.include_metrics.is_empty()
            && !self.include_metrics.iter().any(|p| p.matches(name))
        {
            return false;
        }
        !self.exclude_metrics.iter().any(|p| p.matches(name))
    }
}

struct Series {
    labels: Vec<(String, String)>,
    value: f64,
}

struct Family {
    kind: MetricKind,
    help: String,
    series: Vec<Series>,
}

/// Renders registry contents in the Prometheus text format.
#[derive(Debug, Default)]
pub struct Renderer {
    prefix: String,
    default_labels: Vec<(String, String)>,
    filter: MetricFilter,
    scrapes: AtomicU64,
}

impl Renderer {
    pub fn new(config: &PrometheusConfig) -> Self {
        let mut default_labels: Vec<_> = config
            .default_labels
            .iter()
            .map(|(k, v)| (sanitize_label_name(k), v.clone()))
            .collect();
        default_labels.sort();

        Self {
            prefix: config.prefix.clone(),
            default_labels,
            filter: MetricFilter::new(&config.filters),
            scrapes: AtomicU64::new(0),
        }
    }

    /// Collect `registry` and render the result.
    pub fn scrape(&self, registry: &MetricRegistry) -> String {
        let scrapes = self.scrapes.fetch_add(1, Ordering::Relaxed) + 1;
        let families = registry.collect();
        let mut output = self.render(&families);

        writeln!(output, "# TYPE sensorhub_exporter_scrapes_total counter").ok();
        writeln!(output, "sensorhub_exporter_scrapes_total {}", scrapes).ok();
        output
    }

    /// Render families. Instruments with the same exposed name are merged
    /// into one family; output is sorted by name.
    pub fn render(&self, families: &[MetricFamily]) -> String {
        let mut by_name: BTreeMap<String, Family> = BTreeMap::new();

        for family in families {
            let descriptor = &family.descriptor;
            if !self.filter.allows(&descriptor.name) {
                continue;
            }

            let name = build_metric_name(&self.prefix, &descriptor.name, descriptor.kind);
            let entry = by_name.entry(name).or_insert_with(|| Family {
                kind: descriptor.kind,
                help: descriptor.description.clone(),
                series: Vec::new(),
            });

            for measurement in &family.measurements {
                let mut labels = self.default_labels.clone();
                for (key, value) in measurement.tags.iter() {
                    let key = sanitize_label_name(key);
                    let value = value.to_string();
                    match labels.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => slot.1 = value,
                        None => labels.push((key, value)),
                    }
                }
                labels.sort_by(|a, b| a.0.cmp(&b.0));
                entry.series.push(Series {
                    labels,
                    value: measurement.value,
                });
            }
        }

        let mut output = String::new();
        for (name, family) in &by_name {
            if !family.help.is_empty() {
                writeln!(output, "# HELP {} {}", name, escape_help(&family.help)).ok();
            }
            writeln!(output, "# TYPE {} {}", name, family.kind.as_str()).ok();

            for series in &family.series {
                writeln!(
                    output,
                    "{}{} {}",
                    name,
                    format_labels(&series.labels),
                    format_value(series.value)
                )
                .ok();
            }
        }
        output
    }

    pub fn scrape_count(&self) -> u64 {
        self.scrapes.load(Ordering::Relaxed)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
