//! Core scheduling traits and types.

use std::time::Duration;

use croner::Cron;
use thiserror::Error;

/// Minimum allowed interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Interval used when a job configures neither a cron schedule nor an interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Errors raised while building or running the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid schedule definition.
    #[error("config error: {0}")]
    Config(String),

    /// The underlying cron scheduler rejected an operation.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Execution schedule of a unit.
///
/// Supports both fixed interval and cron-based scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed pause between the end of one execution and the start of the next.
    Interval(Duration),

    /// Cron expression in the six-field form `sec min hour day month weekday`.
    ///
    /// Expressions built through [`Schedule::cron`] are already normalized.
    Cron(String),
}

impl Schedule {
    /// Create an interval schedule.
    ///
    /// Interval is clamped to a minimum of 1 second.
    pub fn interval(duration: Duration) -> Self {
        if duration < MIN_INTERVAL {
            tracing::warn!(min_interval = ?MIN_INTERVAL, requested = ?duration,
                "Interval duration is less than minimum allowed. Using minimum duration."
            );
            Self::Interval(MIN_INTERVAL)
        } else {
            Self::Interval(duration)
        }
    }

    /// Create a cron schedule with immediate validation.
    ///
    /// Accepts the conventional five-field form (a `0` seconds field is
    /// prepended) and the six-field form with seconds. Day-of-week follows
    /// the cron timeline: `0` and `7` are Sunday, `1` is Monday.
    ///
    /// # Errors
    /// Returns `SchedulerError::Config` if the cron timeline would reject the
    /// expression.
    pub fn cron(expr: impl AsRef<str>) -> Result<Self, SchedulerError> {
        let normalized = normalize_cron(expr.as_ref());
        // Same parser and options JobScheduler applies when the job is added
        Cron::new(&normalized)
            .with_seconds_required()
            .with_dom_and_dow()
            .parse()
            .map_err(|e| SchedulerError::Config(format!("invalid cron expression: {e}")))?;

        Ok(Self::Cron(normalized))
    }

    /// Whether this schedule is driven by the cron timeline.
    pub fn is_cron(&self) -> bool {
        matches!(self, Self::Cron(_))
    }
}

fn normalize_cron(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval(d) => write!(f, "every {}", humantime::format_duration(*d)),
            Self::Cron(expr) => write!(f, "cron: {}", expr),
        }
    }
}

/// A unit of work the scheduler can dispatch.
///
/// Both dispatch strategies (cron timeline and interval runner) drive units
/// exclusively through this trait.
///
/// `execute` has no failure channel: implementations contain their own errors
/// and must leave previously published results untouched when a run fails.
#[async_trait::async_trait]
pub trait Executable: Send + Sync + 'static {
    /// Name used in logs and in the dispatcher's unit listing.
    fn name(&self) -> &str;

    /// Schedule this unit runs on.
    fn schedule(&self) -> &Schedule;

    /// Run one execution.
    async fn execute(&self);
}
