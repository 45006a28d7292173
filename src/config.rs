//! Configuration module for the SQL exporter.
//!
//! Provides YAML-based configuration loading for:
//! - Jobs (name, schedule, connections, queries)
//! - Shared query definitions referenced by `query_ref`

mod app;
mod validation;

pub use app::{Config, DEFAULT_CONFIG_FILE, JobConfig, QueryConfig, SharedQueries};
pub use validation::{ConfigError, expand_env_vars};
