//! Exporter Layer
//!
//! Builds the job registry from configuration, dispatches every job to the
//! scheduler and implements the two-phase collection protocol:
//!
//! - [`Exporter::describe`]: every query descriptor, stable from startup on
//! - [`Exporter::collect`]: the latest published samples of every query
//!
//! # Example
//!
//! ```rust,no_run
//! use prometheus::Registry;
//! use sql_exporter::Exporter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = Exporter::new("config.yml").await?;
//! let registry = Registry::new();
//! exporter.register(&registry)?;
//! # Ok(())
//! # }
//! ```

mod collector;
mod error;
mod report;

pub use collector::Exporter;
pub use error::ExporterError;
pub use report::{JobOutcome, SkipReason, StartupReport};
