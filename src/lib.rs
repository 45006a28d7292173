//! SQL Exporter Library
//!
//! Runs SQL queries on a schedule and exposes their latest results as
//! Prometheus metrics. Scrapes never touch a database: they read the samples
//! each query published after its most recent execution.
//!
//! # Architecture
//!
//! - **Config**: YAML job and query definitions
//! - **Job**: queries, connections and per-query published samples
//! - **Scheduler**: cron and fixed-interval execution
//! - **Exporter**: job registry and the describe/collect protocol
//! - **Server**: HTTP scrape endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use prometheus::Registry;
//! use sql_exporter::Exporter;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let exporter = Exporter::new("config.yml").await?;
//!     for (index, name, reason) in exporter.report().skipped() {
//!         eprintln!("job #{} ({:?}) skipped: {}", index, name, reason);
//!     }
//!
//!     let registry = Registry::new();
//!     exporter.register(&registry)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod exporter;
pub mod job;
pub mod scheduler;
pub mod server;

pub use config::{Config, ConfigError, JobConfig, QueryConfig};
pub use exporter::{Exporter, ExporterError, JobOutcome, SkipReason, StartupReport};
pub use job::{Job, JobError, Query, SampleSet};
pub use scheduler::{Schedule, SchedulerError};
