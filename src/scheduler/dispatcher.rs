//! Strategy-agnostic dispatch of executable units.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::RwLock;

use super::{CronScheduler, Executable, IntervalRunner, Schedule, SchedulerError};

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Metadata about a dispatched unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    /// Cron scheduler id, or a generated id for interval units.
    pub id: uuid::Uuid,
    /// Unit name.
    pub name: String,
    /// Schedule description.
    pub schedule: String,
}

/// Routes each unit to the cron timeline or to its own interval runner.
///
/// Cron units only fire after [`start`](Self::start). Interval units begin
/// executing as soon as they are dispatched.
#[derive(Clone)]
pub struct Dispatcher {
    cron: CronScheduler,
    intervals: Arc<Mutex<Vec<IntervalRunner>>>,
    units: Arc<RwLock<Vec<UnitInfo>>>,
}

impl Dispatcher {
    /// Create a dispatcher with an idle cron timeline.
    pub async fn new() -> Result<Self, SchedulerError> {
        Ok(Self {
            cron: CronScheduler::new().await?,
            intervals: Arc::new(Mutex::new(Vec::new())),
            units: Arc::new(RwLock::new(Vec::new())),
        })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field(
                "unit_count",
                &self.units.try_read().map(|u| u.len()).unwrap_or(0),
            )
            .field("cron", &self.cron)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatch a unit according to its schedule.
    pub async fn dispatch(&self, unit: Arc<dyn Executable>) -> Result<UnitInfo, SchedulerError> {
        let name = unit.name().to_string();
        let schedule = unit.schedule().clone();

        let id = match &schedule {
            Schedule::Cron(expr) => {
                let id = self.cron.add(Arc::clone(&unit)).await?;
                tracing::info!(unit = %name, cron_schedule = %expr, "Scheduled cron unit");
                id
            }
            Schedule::Interval(interval) => {
                let runner = IntervalRunner::spawn(Arc::clone(&unit), *interval);
                self.lock_intervals().push(runner);
                tracing::info!(
                    unit = %name,
                    interval = %humantime::format_duration(*interval),
                    "Started periodic execution"
                );
                uuid::Uuid::new_v4()
            }
        };

        let info = UnitInfo {
            id,
            name,
            schedule: schedule.to_string(),
        };
        self.units.write().await.push(info.clone());
        Ok(info)
    }

    /// Start the cron timeline.
    ///
    /// If the timeline refuses to start, every dispatched unit is stopped
    /// before the error is returned, interval runners included.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if let Err(e) = self.cron.start().await {
            tracing::error!(error = %e, "Failed to start scheduler, stopping dispatched units");
            if let Err(shutdown_err) = self.shutdown().await {
                tracing::warn!(error = %shutdown_err, "Cleanup after failed start did not complete");
            }
            return Err(e);
        }
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// List dispatched units in dispatch order.
    pub async fn units(&self) -> Vec<UnitInfo> {
        self.units.read().await.clone()
    }

    /// Get the number of dispatched units.
    pub async fn unit_count(&self) -> usize {
        self.units.read().await.len()
    }

    /// Stop all interval runners and the cron timeline with default timeout.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Shutdown with custom timeout.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), SchedulerError> {
        for runner in self.lock_intervals().drain(..) {
            tracing::debug!(unit = %runner.name(), "Stopping interval runner");
            runner.abort();
        }

        let mut cron = self.cron.clone();
        match tokio::time::timeout(timeout, cron.shutdown()).await {
            Ok(Ok(())) => {
                tracing::info!("Scheduler shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Scheduler shutdown failed");
                Err(e)
            }
            Err(_) => {
                tracing::warn!("Scheduler shutdown timed out");
                Ok(())
            }
        }
    }

    fn lock_intervals(&self) -> MutexGuard<'_, Vec<IntervalRunner>> {
        match self.intervals.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
