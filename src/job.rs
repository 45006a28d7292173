//! Job Layer
//!
//! A [`Job`] runs its [`Query`] list against every configured [`Backend`]
//! and publishes one immutable [`SampleSet`] per query and execution.
//!
//! # Components
//!
//! - [`Job`]: schedule, connections and queries; implements [`Executable`](crate::scheduler::Executable)
//! - [`Query`]: metric descriptor plus the latest published samples
//! - [`Backend`] / [`SqliteBackend`]: data-source connections
//! - [`JobMetrics`]: self-monitoring counters and histograms

mod backend;
mod definition;
mod error;
mod metrics;
mod query;
mod sqlite;

pub use backend::{Backend, CONNECTION_LABEL_NAMES, ConnectionLabels, Row, RowValue};
pub use definition::Job;
pub use error::JobError;
pub use metrics::JobMetrics;
pub use query::{
    JOB_LABEL, METRIC_PREFIX, Query, SampleGroup, SampleSet, VALUE_COLUMN_LABEL,
};
pub use sqlite::SqliteBackend;
