//! Service runner for lifecycle management.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use sensorhub_common::init_tracing;

use crate::ServiceArgs;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::registry::MetricRegistry;

/// How long workers get to finish after shutdown is signalled.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Service runner that manages the lifecycle of the adapters.
///
/// Handles:
/// - Logging initialization
/// - The shared metric registry
/// - Task spawning and management
/// - Graceful shutdown on Ctrl+C or SIGTERM
///
/// # Example
///
/// ```ignore
/// use sensorhub_framework::{ServiceArgs, ServiceConfig, ServiceRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = ServiceArgs::parse_with_default("sensorhub.json5");
///     let config = MyConfig::load(&args.config)?;
///
///     let mut runner = ServiceRunner::new("sensorhub", config);
///     runner.init_logging(Some(&args))?;
///
///     let shutdown = runner.shutdown_signal();
///     runner.spawn("omron", async move { adapter.run(shutdown).await });
///
///     runner.run().await
/// }
/// ```
pub struct ServiceRunner<C: ServiceConfig> {
    name: String,
    version: String,
    config: C,
    registry: MetricRegistry,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
    grace: Duration,
}

impl<C: ServiceConfig> ServiceRunner<C> {
    pub fn new(name: impl Into<String>, config: C) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            registry: MetricRegistry::new(),
            shutdown_tx,
            shutdown_rx,
            tasks: Vec::new(),
            grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Initialize tracing from the config, with an optional CLI level override.
    pub fn init_logging(&self, args: Option<&ServiceArgs>) -> Result<()> {
        let logging = self.config.logging();
        match args.and_then(|a| a.log_level.as_deref()) {
            Some(level) => init_tracing(&logging.with_level(level))?,
            None => init_tracing(logging)?,
        }

        tracing::info!(service = %self.name, version = %self.version, "Starting service");
        Ok(())
    }

    /// Override the shutdown grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// Shared metric registry handed to every instrumentation.
    pub fn registry(&self) -> MetricRegistry {
        self.registry.clone()
    }

    /// A receiver that flips to `true` when shutdown starts.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Spawn a worker task.
    ///
    /// The task is expected to return once the shutdown signal fires.
    pub fn spawn<F>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name.into(), tokio::spawn(future)));
    }

    /// Spawn a worker task that returns a Result.
    ///
    /// Errors are logged automatically.
    pub fn spawn_with_error<F, E>(&mut self, name: impl Into<String>, future: F)
    where
        F: Future<Output = std::result::Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let name = name.into();
        let worker = name.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = future.await {
                tracing::error!(worker = %worker, error = %e, "Worker failed");
            }
        });
        self.tasks.push((name, handle));
    }

    /// Run until Ctrl+C or SIGTERM is received.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_requested()).await
    }

    /// Run until `signal` completes, then stop every worker.
    ///
    /// Workers are given the grace period to return on their own; any that
    /// are still running afterwards are aborted.
    pub async fn run_until<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            service = %self.name,
            tasks = self.tasks.len(),
            "Service running. Press Ctrl+C to stop."
        );

        signal.await;
        tracing::info!(service = %self.name, "Received shutdown signal");

        // Receivers held by the runner keep the channel open.
        let _ = self.shutdown_tx.send(true);

        let deadline = tokio::time::Instant::now() + self.grace;
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => tracing::debug!(worker = %name, "Worker stopped"),
                Ok(Err(e)) if e.is_panic() => {
                    tracing::error!(worker = %name, "Worker panicked");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!(worker = %name, "Worker did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        tracing::info!(service = %self.name, "Goodbye!");
        Ok(())
    }
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_requested() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
