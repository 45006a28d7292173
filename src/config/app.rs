//! Exporter configuration structures.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::ConfigError;

/// Configuration file used when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Shared query definitions, referenced from jobs by `query_ref`.
pub type SharedQueries = BTreeMap<String, String>;

// =============================================================================
// Query Configuration
// =============================================================================

/// One query of a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Query name; the exported metric is `sql_<name>`.
    pub name: String,

    /// Metric help text.
    #[serde(default)]
    pub help: String,

    /// Result columns used as label values, in order.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Result columns exported as gauge values.
    #[serde(default)]
    pub values: Vec<String>,

    /// Inline SQL.
    #[serde(default)]
    pub query: Option<String>,

    /// Name of a shared query used when `query` is empty.
    #[serde(default)]
    pub query_ref: Option<String>,

    /// Treat an empty result set as a valid (empty) execution.
    #[serde(default)]
    pub allow_zero_rows: bool,
}

// =============================================================================
// Job Configuration
// =============================================================================

/// One job: queries run against a set of connections on one schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job name (also exported as the `sql_job` label).
    pub name: String,

    /// Pause between executions (e.g. "30s", "5m"). Ignored when a cron
    /// schedule is set.
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,

    /// Cron expression (five or six fields). Takes precedence over `interval`.
    #[serde(default)]
    pub cron_schedule: Option<String>,

    /// Connection strings (`sqlite://path`, `sqlite::memory:`).
    /// `${VAR}` and `${VAR:-default}` are expanded from the environment.
    #[serde(default)]
    pub connections: Vec<String>,

    /// Queries in export order. Null entries are ignored.
    #[serde(default)]
    pub queries: Vec<Option<QueryConfig>>,
}

// =============================================================================
// Top-level Configuration
// =============================================================================

/// Top-level exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Jobs in registration order. A null entry is kept as `None` and skipped.
    #[serde(default)]
    pub jobs: Vec<Option<JobConfig>>,

    /// Shared query definitions.
    #[serde(default)]
    pub queries: SharedQueries,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// An empty path falls back to [`DEFAULT_CONFIG_FILE`].
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed. Job-level
    /// problems are not checked here; they surface when each job initializes.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = resolve_path(path.as_ref());
        tracing::debug!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }
}

fn resolve_path(path: &Path) -> &Path {
    if path.as_os_str().is_empty() {
        Path::new(DEFAULT_CONFIG_FILE)
    } else {
        path
    }
}
