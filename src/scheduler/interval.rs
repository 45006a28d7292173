//! Interval runner: one repeating loop per interval-scheduled unit.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::Executable;

/// Handle to a running interval loop.
///
/// The loop pauses `interval` after each *completed* execution, so a unit
/// never overlaps with itself and a slow execution delays the next one.
#[derive(Debug)]
pub struct IntervalRunner {
    name: String,
    interval: Duration,
    handle: JoinHandle<()>,
}

impl IntervalRunner {
    /// Start the loop. The first execution begins immediately.
    pub fn spawn(unit: Arc<dyn Executable>, interval: Duration) -> Self {
        let name = unit.name().to_string();
        let handle = tokio::spawn(async move {
            loop {
                let start = std::time::Instant::now();
                tracing::debug!(unit = %unit.name(), "Interval execution started");
                unit.execute().await;
                tracing::debug!(
                    unit = %unit.name(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Interval execution finished"
                );
                tokio::time::sleep(interval).await;
            }
        });

        Self {
            name,
            interval,
            handle,
        }
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pause between executions.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the loop. An execution in progress is dropped at its next await point.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Schedule;
    use std::sync::Mutex;
    use std::time::Instant;

    struct SlowUnit {
        schedule: Schedule,
        work: Duration,
        starts: Mutex<Vec<Instant>>,
    }

    #[async_trait::async_trait]
    impl Executable for SlowUnit {
        fn name(&self) -> &str {
            "slow"
        }

        fn schedule(&self) -> &Schedule {
            &self.schedule
        }

        async fn execute(&self) {
            self.starts.lock().unwrap().push(Instant::now());
            tokio::time::sleep(self.work).await;
        }
    }

    #[tokio::test]
    async fn test_interval_executions_never_overlap() {
        let interval = Duration::from_millis(20);
        let work = Duration::from_millis(120);
        let unit = Arc::new(SlowUnit {
            schedule: Schedule::Interval(interval),
            work,
            starts: Mutex::new(Vec::new()),
        });

        let runner = IntervalRunner::spawn(unit.clone(), interval);
        tokio::time::sleep(Duration::from_millis(700)).await;
        runner.abort();

        let starts = unit.starts.lock().unwrap().clone();
        assert!(starts.len() >= 3, "expected several runs, got {}", starts.len());
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= work + interval, "runs overlapped: gap {:?}", gap);
        }
    }

    #[tokio::test]
    async fn test_interval_first_run_is_immediate() {
        let unit = Arc::new(SlowUnit {
            schedule: Schedule::Interval(Duration::from_secs(3600)),
            work: Duration::ZERO,
            starts: Mutex::new(Vec::new()),
        });

        let runner = IntervalRunner::spawn(unit.clone(), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(unit.starts.lock().unwrap().len(), 1);
        assert_eq!(runner.name(), "slow");
        assert!(!runner.is_finished());
        runner.abort();
    }
}
