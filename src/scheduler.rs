//! Scheduling Layer
//!
//! Executes units of work on their own schedule. Every unit implements
//! [`Executable`]; the [`Dispatcher`] routes it to one of two strategies:
//!
//! - [`CronScheduler`]: a single cron timeline shared by all cron units
//! - [`IntervalRunner`]: one dedicated loop per interval unit
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_exporter::scheduler::{Dispatcher, Executable};
//!
//! # async fn example(unit: Arc<dyn Executable>) -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = Dispatcher::new().await?;
//! dispatcher.dispatch(unit).await?;
//! dispatcher.start().await?;
//! # Ok(())
//! # }
//! ```

mod cron;
mod dispatcher;
mod interval;
mod traits;

pub use cron::CronScheduler;
pub use dispatcher::{DEFAULT_SHUTDOWN_TIMEOUT, Dispatcher, UnitInfo};
pub use interval::IntervalRunner;
pub use traits::{DEFAULT_INTERVAL, Executable, MIN_INTERVAL, Schedule, SchedulerError};
