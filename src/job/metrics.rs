//! Self-monitoring metrics for job executions.
//!
//! All metrics use the `sql_exporter_` prefix.

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

/// Execution metrics shared by all jobs of one exporter.
#[derive(Clone)]
pub struct JobMetrics {
    /// Failed query executions by job and query.
    pub query_failures_total: CounterVec,
    /// Wall-clock duration of a full job run.
    pub job_duration_seconds: HistogramVec,
    /// Unix time the last job run finished.
    pub last_run_timestamp_seconds: GaugeVec,
}

impl JobMetrics {
    /// Create unregistered metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let query_failures_total = CounterVec::new(
            Opts::new(
                "sql_exporter_query_failures_total",
                "Total failed query executions",
            ),
            &["job", "query"],
        )?;

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "sql_exporter_job_duration_seconds",
                "Duration of a complete job run in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
            &["job"],
        )?;

        let last_run_timestamp_seconds = GaugeVec::new(
            Opts::new(
                "sql_exporter_last_run_timestamp_seconds",
                "Unix timestamp of the last finished job run",
            ),
            &["job"],
        )?;

        Ok(Self {
            query_failures_total,
            job_duration_seconds,
            last_run_timestamp_seconds,
        })
    }

    /// Register all metrics with `registry`.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.query_failures_total.clone()))?;
        registry.register(Box::new(self.job_duration_seconds.clone()))?;
        registry.register(Box::new(self.last_run_timestamp_seconds.clone()))?;
        Ok(())
    }
}

impl std::fmt::Debug for JobMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobMetrics").finish_non_exhaustive()
    }
}
