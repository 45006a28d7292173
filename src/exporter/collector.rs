//! The exporter: job registry plus the describe/collect protocol.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use prometheus::Registry;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;

use super::{ExporterError, JobOutcome, SkipReason, StartupReport};
use crate::config::Config;
use crate::job::{Job, JobMetrics};
use crate::scheduler::{Dispatcher, Executable, SchedulerError};

/// Owns the scheduled jobs and serves their latest results.
///
/// The job list is fixed once construction returns. Cloning is cheap and all
/// clones share the same jobs and scheduler.
#[derive(Clone)]
pub struct Exporter {
    jobs: Arc<Vec<Arc<Job>>>,
    dispatcher: Dispatcher,
    metrics: JobMetrics,
    report: Arc<StartupReport>,
}

impl Exporter {
    /// Load configuration from `config_path` and start all valid jobs.
    ///
    /// An empty path falls back to [`DEFAULT_CONFIG_FILE`](crate::config::DEFAULT_CONFIG_FILE).
    ///
    /// # Errors
    /// Returns `ExporterError::Config` if the file cannot be read or parsed.
    /// Jobs that fail to initialize are skipped, not reported as errors.
    pub async fn new(config_path: impl AsRef<Path>) -> Result<Self, ExporterError> {
        let config = Config::load(config_path)?;
        Self::from_config(config).await
    }

    /// Initialize and dispatch every job of `config`, then start the scheduler.
    ///
    /// Interval jobs start executing during this call; it returns without
    /// waiting for any execution to finish.
    pub async fn from_config(config: Config) -> Result<Self, ExporterError> {
        let metrics = JobMetrics::new()?;
        let dispatcher = Dispatcher::new().await?;
        let mut jobs = Vec::with_capacity(config.jobs.len());
        let mut report = StartupReport::default();
        let mut seen_names = HashSet::new();

        for (index, entry) in config.jobs.into_iter().enumerate() {
            let Some(job_config) = entry else {
                tracing::warn!(index, "Skipping empty job entry");
                report.push(JobOutcome::Skipped {
                    index,
                    name: None,
                    reason: SkipReason::MissingEntry,
                });
                continue;
            };

            let name = job_config.name.clone();
            let job = match Job::init(job_config, &config.queries, metrics.clone()) {
                Ok(job) => Arc::new(job),
                Err(e) => {
                    tracing::warn!(job = %name, error = %e, "Skipping job. Failed to initialize");
                    report.push(JobOutcome::Skipped {
                        index,
                        name: Some(name),
                        reason: SkipReason::Init(e.to_string()),
                    });
                    continue;
                }
            };

            if !seen_names.insert(job.name().to_string()) {
                tracing::warn!(job = %job.name(), "Duplicate job name");
            }

            match dispatcher
                .dispatch(Arc::clone(&job) as Arc<dyn Executable>)
                .await
            {
                Ok(unit) => {
                    report.push(JobOutcome::Scheduled {
                        name: unit.name,
                        schedule: unit.schedule,
                        id: unit.id,
                    });
                    jobs.push(job);
                }
                Err(e) => {
                    tracing::warn!(job = %name, error = %e, "Skipping job. Failed to schedule");
                    report.push(JobOutcome::Skipped {
                        index,
                        name: Some(name),
                        reason: SkipReason::Dispatch(e.to_string()),
                    });
                }
            }
        }

        dispatcher.start().await?;
        tracing::info!(
            jobs = jobs.len(),
            skipped = report.skipped().len(),
            "Exporter started"
        );

        Ok(Self {
            jobs: Arc::new(jobs),
            dispatcher,
            metrics,
            report: Arc::new(report),
        })
    }

    /// Registered jobs in configuration order.
    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    /// What happened to each configured job entry.
    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Every query descriptor, job by job, query by query.
    ///
    /// Queries without a descriptor are left out. The first omission of each
    /// query is logged as an error, later ones at debug level.
    pub fn describe(&self) -> Vec<&Desc> {
        let mut descs = Vec::new();
        for job in self.jobs.iter() {
            for query in job.queries() {
                match query.descriptor() {
                    Some(desc) => descs.push(desc),
                    None if query.first_missing_descriptor_report() => {
                        tracing::error!(
                            job = %job.name(),
                            query = %query.name(),
                            reason = query.descriptor_error().unwrap_or("unknown"),
                            "Query has no descriptor"
                        );
                    }
                    None => {
                        tracing::debug!(job = %job.name(), query = %query.name(), "Query has no descriptor");
                    }
                }
            }
        }
        descs
    }

    /// Current samples of every query, in the same order as [`describe`](Self::describe).
    ///
    /// Only reads published snapshots; never triggers an execution.
    pub fn collect(&self) -> Vec<MetricFamily> {
        let mut families = Vec::new();
        for job in self.jobs.iter() {
            for query in job.queries() {
                if query.descriptor().is_none() {
                    continue;
                }
                families.extend(query.snapshot().families().cloned());
            }
        }
        families
    }

    /// Register the exporter and its self-monitoring metrics with `registry`.
    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.clone()))?;
        self.metrics.register(registry)
    }

    /// Stop all scheduled executions.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.dispatcher.shutdown().await
    }
}

impl Collector for Exporter {
    fn desc(&self) -> Vec<&Desc> {
        self.describe()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        Exporter::collect(self)
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("jobs", &self.jobs.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
