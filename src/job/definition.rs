//! Job definition and execution.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use prometheus::proto::MetricFamily;

use super::{Backend, JobError, JobMetrics, Query, SampleGroup, SampleSet, SqliteBackend};
use crate::config::{JobConfig, SharedQueries, expand_env_vars};
use crate::scheduler::{DEFAULT_INTERVAL, Executable, Schedule};

/// A named set of queries run against a set of connections on one schedule.
pub struct Job {
    name: String,
    schedule: Schedule,
    backends: Vec<Arc<dyn Backend>>,
    queries: Vec<Query>,
    metrics: JobMetrics,
}

impl Job {
    /// Assemble a job from already built parts.
    pub fn new(
        name: impl Into<String>,
        schedule: Schedule,
        backends: Vec<Arc<dyn Backend>>,
        queries: Vec<Query>,
        metrics: JobMetrics,
    ) -> Self {
        Self {
            name: name.into(),
            schedule,
            backends,
            queries,
            metrics,
        }
    }

    /// Initialize a job from configuration.
    ///
    /// Resolves shared query references, builds query descriptors, picks the
    /// schedule (cron wins over interval) and creates lazy connection pools.
    ///
    /// # Errors
    /// Returns `JobError` if the definition is unusable; the caller skips the job.
    pub fn init(
        config: JobConfig,
        shared: &SharedQueries,
        metrics: JobMetrics,
    ) -> Result<Self, JobError> {
        let name = config.name.trim().to_string();
        if name.is_empty() {
            return Err(JobError::Config("job name cannot be empty".to_string()));
        }
        if config.connections.is_empty() {
            return Err(JobError::Config(format!("job '{}' has no connections", name)));
        }

        let schedule = match config.cron_schedule.as_deref().map(str::trim) {
            Some(expr) if !expr.is_empty() => {
                if config.interval.is_some() {
                    tracing::debug!(job = %name, "Both cron_schedule and interval set, using cron_schedule");
                }
                Schedule::cron(expr)?
            }
            _ => Schedule::interval(config.interval.unwrap_or(DEFAULT_INTERVAL)),
        };

        let mut seen_names = HashSet::new();
        let mut queries = Vec::with_capacity(config.queries.len());
        for query_config in config.queries.iter().flatten() {
            if !seen_names.insert(query_config.name.as_str()) {
                return Err(JobError::Config(format!(
                    "duplicate query name: '{}'",
                    query_config.name
                )));
            }
            queries.push(Query::from_config(query_config, &name, shared)?);
        }
        if queries.is_empty() {
            tracing::warn!(job = %name, "Job defines no queries");
        }

        let mut backends: Vec<Arc<dyn Backend>> = Vec::with_capacity(config.connections.len());
        for dsn in &config.connections {
            let dsn = expand_env_vars(dsn);
            backends.push(Arc::new(SqliteBackend::connect_lazy(&dsn)?));
        }

        Ok(Self::new(name, schedule, backends, queries, metrics))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Queries in export order.
    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn backends(&self) -> &[Arc<dyn Backend>] {
        &self.backends
    }

    /// Run every query once and publish the results.
    ///
    /// Failures are logged and counted; they never escape this method.
    pub async fn run(&self) {
        let start = Instant::now();
        tracing::debug!(job = %self.name, "Running job");

        for query in &self.queries {
            self.run_query(query).await;
        }

        let elapsed = start.elapsed();
        self.metrics
            .job_duration_seconds
            .with_label_values(&[self.name.as_str()])
            .observe(elapsed.as_secs_f64());
        self.metrics
            .last_run_timestamp_seconds
            .with_label_values(&[self.name.as_str()])
            .set(Utc::now().timestamp() as f64);
        tracing::debug!(job = %self.name, duration_ms = elapsed.as_millis(), "Job run finished");
    }

    async fn run_query(&self, query: &Query) {
        if query.descriptor().is_none() {
            tracing::debug!(job = %self.name, query = %query.name(), "Skipping query without descriptor");
            return;
        }

        let previous = query.snapshot();
        let mut groups = Vec::with_capacity(self.backends.len());
        let mut succeeded = 0usize;

        for (index, backend) in self.backends.iter().enumerate() {
            match execute_on(query, backend.as_ref()).await {
                Ok(families) => {
                    succeeded += 1;
                    groups.push(SampleGroup::new(index, families));
                }
                Err(e) => {
                    tracing::warn!(
                        job = %self.name,
                        query = %query.name(),
                        database = %backend.labels().database,
                        error = %e,
                        "Query failed"
                    );
                    self.metrics
                        .query_failures_total
                        .with_label_values(&[self.name.as_str(), query.name()])
                        .inc();
                    // Keep what this connection reported last time
                    if let Some(group) = previous.group(index) {
                        groups.push(group.clone());
                    }
                }
            }
        }

        if succeeded == 0 {
            tracing::debug!(job = %self.name, query = %query.name(), "No connection succeeded, keeping previous samples");
            return;
        }
        query.publish(SampleSet::new(groups));
    }
}

async fn execute_on(query: &Query, backend: &dyn Backend) -> Result<Vec<MetricFamily>, JobError> {
    let rows = backend.fetch(query.sql()).await?;
    query.build_samples(backend.labels(), &rows)
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("connections", &self.backends.len())
            .field("queries", &self.queries)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Executable for Job {
    fn name(&self) -> &str {
        &self.name
    }

    fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    async fn execute(&self) {
        self.run().await;
    }
}
