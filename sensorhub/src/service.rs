//! Wiring of the configured instrumentations.

use tracing::info;

use sensorhub_framework::{MetricRegistry, Result, ServiceRunner};
use sensorhub_omron::OmronInstrumentation;
use sensorhub_ping::PingInstrumentation;
use sensorhub_switchbot::SwitchBotInstrumentation;
use sensorhub_sysinfo::SysinfoInstrumentation;

use crate::application;
use crate::config::SensorHubConfig;

/// Every instrumentation built from one configuration.
///
/// Construction registers all metrics, so a failure here happens before
/// any worker is started.
pub struct Instrumentations {
    switchbot: Option<SwitchBotInstrumentation>,
    omron: Option<OmronInstrumentation>,
    ping: Option<PingInstrumentation>,
    sysinfo: Option<SysinfoInstrumentation>,
}

impl Instrumentations {
    pub fn build(config: &SensorHubConfig, registry: &MetricRegistry) -> Result<Self> {
        let switchbot = config
            .switchbot
            .as_ref()
            .map(|c| SwitchBotInstrumentation::new(c, registry))
            .transpose()?;
        let omron = config
            .omron
            .as_ref()
            .map(|c| OmronInstrumentation::new(c, registry))
            .transpose()?;
        let ping = config
            .ping
            .as_ref()
            .map(|c| PingInstrumentation::new(c, registry))
            .transpose()?;
        let sysinfo = config
            .sysinfo
            .as_ref()
            .map(|c| SysinfoInstrumentation::new(c, registry))
            .transpose()?;

        let host = config.resolved_host();
        application::register(registry, host.as_deref(), &config.enabled());

        Ok(Self {
            switchbot,
            omron,
            ping,
            sysinfo,
        })
    }

    pub fn count(&self) -> usize {
        [
            self.switchbot.is_some(),
            self.omron.is_some(),
            self.ping.is_some(),
            self.sysinfo.is_some(),
        ]
        .into_iter()
        .filter(|enabled| *enabled)
        .count()
    }

    /// Start one worker per instrumentation.
    pub fn spawn_all(self, runner: &mut ServiceRunner<SensorHubConfig>) {
        if let Some(switchbot) = self.switchbot {
            let shutdown = runner.shutdown_signal();
            runner.spawn_with_error("switchbot", switchbot.run(shutdown));
        }
        if let Some(omron) = self.omron {
            let shutdown = runner.shutdown_signal();
            runner.spawn("omron", omron.run(shutdown));
        }
        if let Some(ping) = self.ping {
            let shutdown = runner.shutdown_signal();
            runner.spawn("ping", ping.run(shutdown));
        }
        if let Some(sysinfo) = self.sysinfo {
            let shutdown = runner.shutdown_signal();
            runner.spawn("sysinfo", sysinfo.run(shutdown));
        }
        info!(workers = runner.task_count(), "Instrumentations started");
    }
}
