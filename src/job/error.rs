//! Job-specific error types.
//!
//! Initialization variants cause a job to be skipped at startup; execution
//! variants are logged and contained inside a single run.

use thiserror::Error;

use crate::scheduler::SchedulerError;

/// Errors that can occur while initializing or executing a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Invalid job or query definition.
    #[error("config error: {0}")]
    Config(String),

    /// `query_ref` does not name a shared query.
    #[error("query '{query}' references unknown shared query '{reference}'")]
    QueryRefNotFound {
        /// Query holding the reference.
        query: String,
        /// Missing shared query name.
        reference: String,
    },

    /// Invalid schedule.
    #[error("invalid schedule: {0}")]
    Schedule(#[from] SchedulerError),

    /// Connection string names a driver this exporter does not support.
    #[error("unsupported connection string '{0}', expected sqlite://<path> or sqlite::memory:")]
    UnsupportedDriver(String),

    /// Database operation failed (sqlx error).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The query returned no rows and zero rows are not allowed.
    #[error("zero rows returned")]
    ZeroRows,

    /// A configured label or value column is missing from the result.
    #[error("column '{0}' not found in result")]
    MissingColumn(String),

    /// A value column holds something that is not a number.
    #[error("column '{0}' is not numeric")]
    InvalidValue(String),

    /// The query has no metric descriptor.
    #[error("query '{0}' has no descriptor")]
    MissingDescriptor(String),

    /// Building the metric failed.
    #[error("metric error: {0}")]
    Metric(#[from] prometheus::Error),
}
