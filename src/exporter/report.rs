//! Startup report: what happened to each configured job entry.

/// Why a configured job entry was not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The configuration entry was null.
    MissingEntry,
    /// `Job::init` failed.
    Init(String),
    /// The scheduler refused the job.
    Dispatch(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEntry => write!(f, "empty job entry"),
            Self::Init(e) => write!(f, "failed to initialize: {}", e),
            Self::Dispatch(e) => write!(f, "failed to schedule: {}", e),
        }
    }
}

/// Outcome of one configured job entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Registered and dispatched.
    Scheduled {
        name: String,
        schedule: String,
        id: uuid::Uuid,
    },
    /// Left out of the registry.
    Skipped {
        /// Entry position in the configuration.
        index: usize,
        /// Job name, when the entry had one.
        name: Option<String>,
        reason: SkipReason,
    },
}

/// Outcomes of all configured job entries, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    outcomes: Vec<JobOutcome>,
}

impl StartupReport {
    pub(crate) fn push(&mut self, outcome: JobOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[JobOutcome] {
        &self.outcomes
    }

    /// Names of registered jobs.
    pub fn scheduled(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                JobOutcome::Scheduled { name, .. } => Some(name.as_str()),
                JobOutcome::Skipped { .. } => None,
            })
            .collect()
    }

    /// Skipped entries as `(index, name, reason)`.
    pub fn skipped(&self) -> Vec<(usize, Option<&str>, &SkipReason)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                JobOutcome::Skipped {
                    index,
                    name,
                    reason,
                } => Some((*index, name.as_deref(), reason)),
                JobOutcome::Scheduled { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_partitions_outcomes() {
        let mut report = StartupReport::default();
        report.push(JobOutcome::Scheduled {
            name: "a".to_string(),
            schedule: "every 1s".to_string(),
            id: uuid::Uuid::new_v4(),
        });
        report.push(JobOutcome::Skipped {
            index: 1,
            name: None,
            reason: SkipReason::MissingEntry,
        });
        report.push(JobOutcome::Skipped {
            index: 2,
            name: Some("c".to_string()),
            reason: SkipReason::Init("bad query".to_string()),
        });

        assert_eq!(report.outcomes().len(), 3);
        assert_eq!(report.scheduled(), vec!["a"]);

        let skipped = report.skipped();
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0], (1, None, &SkipReason::MissingEntry));
        assert_eq!(skipped[1].1, Some("c"));
        assert_eq!(skipped[1].2.to_string(), "failed to initialize: bad query");
    }
}
