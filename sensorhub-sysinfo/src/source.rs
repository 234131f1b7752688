//! Hardware poll sources backed by `sysinfo`.
//!
//! Every target owns its own `sysinfo` object as its session, so targets
//! never share refresh state.

use sysinfo::{Disks, Networks, System};
use tokio::task::{JoinError, spawn_blocking};

use sensorhub_framework::{EntityId, FetchError, Fields, PollSource, Result, Tags};

use crate::config::{ConfigError, SysinfoConfig};

pub const LOAD: &str = "load";
pub const MEMORY_USED: &str = "memory_used";
pub const MEMORY_AVAILABLE: &str = "memory_available";
pub const MEMORY_TOTAL: &str = "memory_total";
pub const SPACE_TOTAL: &str = "space_total";
pub const SPACE_USED: &str = "space_used";
pub const SPACE_AVAILABLE: &str = "space_available";
pub const RX: &str = "rx";
pub const TX: &str = "tx";

const PSEUDO_FILESYSTEMS: &[&str] = &[
    "tmpfs",
    "devtmpfs",
    "devfs",
    "sysfs",
    "proc",
    "cgroup",
    "cgroup2",
    "securityfs",
    "debugfs",
    "configfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "pstore",
    "binfmt_misc",
    "autofs",
    "overlay",
    "squashfs",
];

/// Include/exclude glob filter over names.
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    include: Vec<glob::Pattern>,
    exclude: Vec<glob::Pattern>,
}

impl NameFilter {
    pub fn new(include: &[String], exclude: &[String]) -> std::result::Result<Self, ConfigError> {
        let compile = |patterns: &[String]| -> std::result::Result<Vec<glob::Pattern>, ConfigError> {
            patterns
                .iter()
                .map(|p| {
                    glob::Pattern::new(p).map_err(|e| {
                        ConfigError::Validation(format!("invalid pattern '{}': {}", p, e))
                    })
                })
                .collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(name)) {
            return false;
        }
        !self.exclude.iter().any(|p| p.matches(name))
    }
}

/// Mount points to monitor, from `(mount point, filesystem type)` pairs.
pub fn select_disks<I>(config: &SysinfoConfig, disks: I) -> std::result::Result<Vec<String>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let filter = NameFilter::new(&config.disk.include, &config.disk.exclude)?;
    let mut selected: Vec<String> = disks
        .into_iter()
        .filter(|(_, fs)| !config.disk.exclude_pseudo || !PSEUDO_FILESYSTEMS.contains(&fs.as_str()))
        .map(|(mount, _)| mount)
        .filter(|mount| filter.matches(mount))
        .collect();
    selected.sort();
    selected.dedup();
    Ok(selected)
}

/// Interfaces to monitor.
pub fn select_interfaces<I>(config: &SysinfoConfig, names: I) -> std::result::Result<Vec<String>, ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let filter = NameFilter::new(&config.network.include, &config.network.exclude)?;
    let mut selected: Vec<String> = names
        .into_iter()
        .filter(|name| !config.network.exclude_loopback || !is_loopback(name))
        .filter(|name| filter.matches(name))
        .collect();
    selected.sort();
    Ok(selected)
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name == "lo0"
}

/// One piece of local hardware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareSource {
    Cpu,
    Memory,
    Disk { mount: String },
    Network { interface: String },
}

/// The `sysinfo` handle a source reads through.
pub enum HardwareSession {
    System(Box<System>),
    Disks(Disks),
    Networks(Networks),
    /// Handed to the blocking pool by a read that has not returned.
    Detached,
}

impl HardwareSource {
    pub fn id(&self) -> Result<EntityId> {
        Ok(match self {
            HardwareSource::Cpu => EntityId::key("cpu")?,
            HardwareSource::Memory => EntityId::key("memory")?,
            HardwareSource::Disk { mount } => EntityId::key(format!("disk:{}", mount))?,
            HardwareSource::Network { interface } => EntityId::key(format!("net:{}", interface))?,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            HardwareSource::Cpu => "cpu",
            HardwareSource::Memory => "memory",
            HardwareSource::Disk { mount } => mount,
            HardwareSource::Network { interface } => interface,
        }
    }

    pub fn tags(&self, host: Option<&str>) -> Tags {
        let mut tags = Tags::new();
        if let Some(host) = host {
            tags.insert("host", host);
        }
        tags.insert("name", self.name());
        tags
    }

    fn open(&self) -> HardwareSession {
        match self {
            HardwareSource::Cpu => {
                let mut system = System::new();
                // Load is measured between two refreshes; prime the first.
                system.refresh_cpu_usage();
                HardwareSession::System(Box::new(system))
            }
            HardwareSource::Memory => HardwareSession::System(Box::new(System::new())),
            HardwareSource::Disk { .. } => HardwareSession::Disks(Disks::new_with_refreshed_list()),
            HardwareSource::Network { .. } => {
                HardwareSession::Networks(Networks::new_with_refreshed_list())
            }
        }
    }

    /// Refresh and read. These are plain syscalls (statvfs on a dead network
    /// mount can hang), so this only runs on the blocking pool.
    fn sample(&self, session: &mut HardwareSession) -> std::result::Result<Fields, FetchError> {
        match (self, session) {
            (HardwareSource::Cpu, HardwareSession::System(system)) => {
                system.refresh_cpu_usage();
                Ok(Fields::new().with(LOAD, system.global_cpu_usage() as f64))
            }
            (HardwareSource::Memory, HardwareSession::System(system)) => {
                system.refresh_memory();
                Ok(Fields::new()
                    .with(MEMORY_USED, system.used_memory() as f64)
                    .with(MEMORY_AVAILABLE, system.available_memory() as f64)
                    .with(MEMORY_TOTAL, system.total_memory() as f64))
            }
            (HardwareSource::Disk { mount }, HardwareSession::Disks(disks)) => {
                disks.refresh(true);
                let disk = disks
                    .list()
                    .iter()
                    .find(|d| d.mount_point().to_string_lossy() == mount.as_str())
                    .ok_or_else(|| FetchError::Read(format!("mount {} not found", mount)))?;
                let total = disk.total_space();
                let available = disk.available_space();
                Ok(Fields::new()
                    .with(SPACE_TOTAL, total as f64)
                    .with(SPACE_AVAILABLE, available as f64)
                    .with(SPACE_USED, total.saturating_sub(available) as f64))
            }
            (HardwareSource::Network { interface }, HardwareSession::Networks(networks)) => {
                networks.refresh(true);
                let data = networks
                    .list()
                    .get(interface)
                    .ok_or_else(|| FetchError::Read(format!("interface {} not found", interface)))?;
                Ok(Fields::new()
                    .with(RX, data.total_received() as f64)
                    .with(TX, data.total_transmitted() as f64))
            }
            _ => Err(FetchError::Read("session does not match target".to_string())),
        }
    }
}

fn aborted(e: JoinError) -> FetchError {
    FetchError::Read(format!("hardware read aborted: {}", e))
}

impl PollSource for HardwareSource {
    type Session = HardwareSession;

    async fn connect(&self) -> std::result::Result<HardwareSession, FetchError> {
        let source = self.clone();
        spawn_blocking(move || source.open()).await.map_err(aborted)
    }

    /// The session moves to the blocking pool for the read and comes back
    /// when it returns. If the fetch times out first, the session stays
    /// `Detached` and is dropped with the failed fetch.
    async fn read(&self, session: &mut HardwareSession) -> std::result::Result<Fields, FetchError> {
        let source = self.clone();
        let mut detached = std::mem::replace(session, HardwareSession::Detached);
        let (detached, fields) = spawn_blocking(move || {
            let fields = source.sample(&mut detached);
            (detached, fields)
        })
        .await
        .map_err(aborted)?;
        *session = detached;
        fields
    }
}

/// Resolve the target list from the local machine.
pub fn discover(config: &SysinfoConfig) -> std::result::Result<Vec<HardwareSource>, ConfigError> {
    let mut sources = Vec::new();
    if config.cpu {
        sources.push(HardwareSource::Cpu);
    }
    if config.memory {
        sources.push(HardwareSource::Memory);
    }
    if config.disk.enabled {
        let disks = Disks::new_with_refreshed_list();
        let mounts = select_disks(
            config,
            disks.list().iter().map(|d| {
                (
                    d.mount_point().to_string_lossy().to_string(),
                    d.file_system().to_string_lossy().to_string(),
                )
            }),
        )?;
        sources.extend(mounts.into_iter().map(|mount| HardwareSource::Disk { mount }));
    }
    if config.network.enabled {
        let networks = Networks::new_with_refreshed_list();
        let interfaces = select_interfaces(config, networks.list().keys().cloned())?;
        sources.extend(
            interfaces
                .into_iter()
                .map(|interface| HardwareSource::Network { interface }),
        );
    }
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> SysinfoConfig {
        SysinfoConfig::parse(json).unwrap()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(m, f)| (m.to_string(), f.to_string()))
            .collect()
    }

    #[test]
    fn test_select_disks_skips_pseudo() {
        let mounts = select_disks(
            &config("{}"),
            pairs(&[("/", "ext4"), ("/run", "tmpfs"), ("/home", "btrfs"), ("/sys", "sysfs")]),
        )
        .unwrap();
        assert_eq!(mounts, vec!["/", "/home"]);
    }

    #[test]
    fn test_select_disks_globs() {
        let mounts = select_disks(
            &config(r#"{ disk: { include: ["/mnt/*"], exclude: ["/mnt/backup*"] } }"#),
            pairs(&[("/", "ext4"), ("/mnt/data", "xfs"), ("/mnt/backup1", "xfs")]),
        )
        .unwrap();
        assert_eq!(mounts, vec!["/mnt/data"]);
    }

    #[test]
    fn test_select_interfaces() {
        let names = vec!["lo".to_string(), "eth0".to_string(), "docker0".to_string()];
        let selected = select_interfaces(
            &config(r#"{ network: { exclude: ["docker*"] } }"#),
            names.clone(),
        )
        .unwrap();
        assert_eq!(selected, vec!["eth0"]);

        let selected =
            select_interfaces(&config("{ network: { exclude_loopback: false } }"), names).unwrap();
        assert_eq!(selected, vec!["docker0", "eth0", "lo"]);
    }

    #[test]
    fn test_source_identity() {
        let disk = HardwareSource::Disk {
            mount: "/home".to_string(),
        };
        assert_eq!(disk.id().unwrap(), EntityId::key("disk:/home").unwrap());
        assert_eq!(disk.name(), "/home");

        let tags = HardwareSource::Cpu.tags(Some("pi"));
        assert_eq!(tags.get("host").map(|v| v.to_string()).as_deref(), Some("pi"));
        assert_eq!(tags.get("name").map(|v| v.to_string()).as_deref(), Some("cpu"));
    }

    #[tokio::test]
    async fn test_memory_read() {
        let source = HardwareSource::Memory;
        let mut session = source.connect().await.unwrap();
        let fields = source.read(&mut session).await.unwrap();
        assert!(fields.get(MEMORY_TOTAL).unwrap() > 0.0);
        assert!(fields.contains(MEMORY_USED) && fields.contains(MEMORY_AVAILABLE));
    }

    #[tokio::test]
    async fn test_session_returned_after_read() {
        let source = HardwareSource::Memory;
        let mut session = source.connect().await.unwrap();
        source.read(&mut session).await.unwrap();
        assert!(matches!(session, HardwareSession::System(_)));
    }

    #[tokio::test]
    async fn test_detached_session_fails() {
        let mut session = HardwareSession::Detached;
        assert!(matches!(
            HardwareSource::Cpu.read(&mut session).await,
            Err(FetchError::Read(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_interface_fails() {
        let source = HardwareSource::Network {
            interface: "does-not-exist0".to_string(),
        };
        let mut session = source.connect().await.unwrap();
        assert!(matches!(
            source.read(&mut session).await,
            Err(FetchError::Read(_))
        ));
    }
}
