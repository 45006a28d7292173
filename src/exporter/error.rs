//! Exporter-level error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::scheduler::SchedulerError;

/// Fatal errors while building an [`Exporter`](super::Exporter).
///
/// Job-level problems never appear here; they are recorded in the
/// [`StartupReport`](super::StartupReport) instead.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The scheduler could not be created or started.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Self-monitoring metrics could not be created.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}
