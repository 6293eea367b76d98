//! Heartbeat-driven health monitor that downgrades silent services

use chrono::{DateTime, Utc};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RegistryConfig;
use crate::registry::{ServiceRegistry, ServiceStatus, StatusChange};

/// Timing policy for inactivity decay
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Expected heartbeat cadence; also the tick interval
    pub heartbeat_interval: Duration,
    /// Silence after which a service is considered offline
    pub heartbeat_timeout: Duration,
    /// Pause after a failed tick
    pub error_backoff: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            error_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&RegistryConfig> for MonitorConfig {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            heartbeat_timeout: config.heartbeat_timeout(),
            error_backoff: config.monitor_backoff(),
        }
    }
}

impl MonitorConfig {
    /// Status a record should decay to after `silence` without a heartbeat.
    ///
    /// Returns `None` when the silence does not warrant a change.
    pub fn classify(&self, silence: Duration) -> Option<ServiceStatus> {
        if silence > self.heartbeat_timeout {
            Some(ServiceStatus::Offline)
        } else if silence > self.heartbeat_interval * 2 {
            Some(ServiceStatus::Degraded)
        } else {
            None
        }
    }
}

/// Decay never promotes: Healthy/Unknown < Degraded < Offline
fn severity(status: ServiceStatus) -> u8 {
    match status {
        ServiceStatus::Healthy | ServiceStatus::Unknown => 0,
        ServiceStatus::Degraded => 1,
        ServiceStatus::Offline => 2,
    }
}

/// Outcome of one monitor pass
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub scanned: usize,
    pub changes: Vec<StatusChange>,
}

/// One decay pass over the registry
type TickFn = fn(&ServiceRegistry, &MonitorConfig, DateTime<Utc>) -> TickReport;

struct MonitorTask {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

/// Periodic background task applying inactivity decay to the registry
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    config: MonitorConfig,
    tick_fn: TickFn,
    task: RwLock<Option<MonitorTask>>,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(registry: Arc<ServiceRegistry>, config: MonitorConfig) -> Self {
        Self::with_tick(registry, config, run_tick)
    }

    fn with_tick(registry: Arc<ServiceRegistry>, config: MonitorConfig, tick_fn: TickFn) -> Self {
        Self {
            registry,
            config,
            tick_fn,
            task: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run one pass against the current time
    pub fn tick(&self) -> TickReport {
        self.tick_at(Utc::now())
    }

    /// Run one pass as if the current time were `now`
    pub fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        (self.tick_fn)(&self.registry, &self.config, now)
    }

    /// Start the monitor background task. Does nothing if it is already running.
    pub async fn start(&self) {
        let mut task = self.task.write().await;
        if task.is_some() {
            warn!("Health monitor already running");
            return;
        }

        let registry = self.registry.clone();
        let config = self.config;
        let tick = self.tick_fn;
        let shutdown = CancellationToken::new();
        let cancelled = shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    tick(&registry, &config, Utc::now())
                }));

                let wait = match outcome {
                    Ok(report) => {
                        debug!(
                            scanned = report.scanned,
                            changed = report.changes.len(),
                            "Health monitor tick completed"
                        );
                        config.heartbeat_interval
                    }
                    Err(_) => {
                        error!(
                            backoff_secs = config.error_backoff.as_secs(),
                            "Health monitor tick failed, backing off"
                        );
                        config.error_backoff
                    }
                };

                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        });

        *task = Some(MonitorTask { handle, shutdown });
        info!(
            interval_secs = self.config.heartbeat_interval.as_secs(),
            timeout_secs = self.config.heartbeat_timeout.as_secs(),
            "Started health monitor"
        );
    }

    /// Stop the background task and wait for it to exit.
    ///
    /// Interrupts the wait between ticks; a tick in progress runs to completion.
    pub async fn stop(&self) {
        let Some(task) = self.task.write().await.take() else {
            return;
        };

        task.shutdown.cancel();
        if let Err(e) = task.handle.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
        info!("Stopped health monitor");
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .read()
            .await
            .as_ref()
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }
}

fn run_tick(registry: &ServiceRegistry, config: &MonitorConfig, now: DateTime<Utc>) -> TickReport {
    let mut scanned = 0;

    let changes = registry.apply_status_decay(now, |silence, current| {
        scanned += 1;
        // A heartbeat newer than `now` means the service is not silent at all
        let silence = silence.to_std().ok()?;
        config
            .classify(silence)
            .filter(|next| severity(*next) > severity(current))
    });

    for change in &changes {
        warn!(
            service = %change.name,
            from = %change.from,
            to = %change.to,
            "Service downgraded after heartbeat silence"
        );
    }

    TickReport { scanned, changes }
}
