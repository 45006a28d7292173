//! Cron timeline shared by all cron-scheduled units.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_cron_scheduler::{Job, JobScheduler};

use super::{Executable, Schedule, SchedulerError};

/// Single cron timeline backed by `tokio-cron-scheduler`.
///
/// The timeline computes the nearest fire time across all registered units,
/// sleeps until then and spawns each due unit as its own task. Units are not
/// serialized against each other. A tick that fires while the same unit is
/// still running is skipped. Missed ticks are not replayed.
#[derive(Clone)]
pub struct CronScheduler {
    scheduler: JobScheduler,
    started: Arc<AtomicBool>,
}

impl CronScheduler {
    /// Create an idle timeline.
    pub async fn new() -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;

        Ok(Self {
            scheduler,
            started: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register a cron unit and return its scheduler id.
    ///
    /// # Errors
    /// Returns `SchedulerError::Config` if the unit is not cron-scheduled, or
    /// `SchedulerError::Scheduler` if the scheduler rejects the expression.
    pub async fn add(&self, unit: Arc<dyn Executable>) -> Result<uuid::Uuid, SchedulerError> {
        let Schedule::Cron(expr) = unit.schedule().clone() else {
            return Err(SchedulerError::Config(format!(
                "unit '{}' is not cron-scheduled",
                unit.name()
            )));
        };

        let running = Arc::new(AtomicBool::new(false));
        let job = Job::new_cron_job_async(expr.as_str(), move |_: uuid::Uuid, _: JobScheduler| {
            let (unit, running) = (Arc::clone(&unit), Arc::clone(&running));
            Box::pin(async move { run_exclusive(unit, running).await })
                as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        })
        .map_err(|e| SchedulerError::Scheduler(e.to_string()))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))
    }

    /// Start the timeline. Calling this more than once is a no-op.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Cron scheduler already started");
            return Ok(());
        }

        self.scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Whether [`start`](Self::start) has been called.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Stop the timeline.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| SchedulerError::Scheduler(e.to_string()))
    }
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

/// Clears the in-progress flag even if the execution future is dropped.
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn run_exclusive(unit: Arc<dyn Executable>, running: Arc<AtomicBool>) {
    if running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        tracing::debug!(unit = %unit.name(), "Previous run still in progress, skipping tick");
        return;
    }
    let _guard = RunGuard(running);

    let start = std::time::Instant::now();
    tracing::debug!(unit = %unit.name(), "Cron execution started");
    unit.execute().await;
    tracing::debug!(
        unit = %unit.name(),
        elapsed_ms = start.elapsed().as_millis(),
        "Cron execution finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingUnit {
        schedule: Schedule,
        work: Duration,
        runs: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl CountingUnit {
        fn new(schedule: Schedule, work: Duration) -> Self {
            Self {
                schedule,
                work,
                runs: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Executable for CountingUnit {
        fn name(&self) -> &str {
            "counting"
        }

        fn schedule(&self) -> &Schedule {
            &self.schedule
        }

        async fn execute(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.work).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_add_rejects_interval_unit() {
        let cron = CronScheduler::new().await.unwrap();
        let unit = Arc::new(CountingUnit::new(
            Schedule::Interval(Duration::from_secs(1)),
            Duration::ZERO,
        ));

        let err = cron.add(unit).await.unwrap_err();
        assert!(err.to_string().contains("not cron-scheduled"));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let mut cron = CronScheduler::new().await.unwrap();
        assert!(!cron.is_started());
        cron.start().await.unwrap();
        cron.start().await.unwrap();
        assert!(cron.is_started());
        cron.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cron_fires_every_second() {
        let mut cron = CronScheduler::new().await.unwrap();
        let unit = Arc::new(CountingUnit::new(
            Schedule::cron("* * * * * *").unwrap(),
            Duration::ZERO,
        ));

        cron.add(unit.clone()).await.unwrap();
        cron.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2600)).await;
        cron.shutdown().await.unwrap();

        assert!(unit.runs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_tick_is_skipped() {
        let mut cron = CronScheduler::new().await.unwrap();
        let unit = Arc::new(CountingUnit::new(
            Schedule::cron("* * * * * *").unwrap(),
            Duration::from_millis(2500),
        ));

        cron.add(unit.clone()).await.unwrap();
        cron.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(4500)).await;
        cron.shutdown().await.unwrap();

        assert!(unit.runs.load(Ordering::SeqCst) >= 1);
        assert_eq!(unit.max_active.load(Ordering::SeqCst), 1);
    }
}
