//! Queries and their published sample sets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use prometheus::core::{Collector as _, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};

use super::backend::CONNECTION_LABEL_NAMES;
use super::{ConnectionLabels, JobError, Row};
use crate::config::{QueryConfig, SharedQueries};

/// Namespace of every exported query metric.
pub const METRIC_PREFIX: &str = "sql";

/// Constant label carrying the owning job's name.
pub const JOB_LABEL: &str = "sql_job";

/// Variable label carrying the value column a sample was read from.
pub const VALUE_COLUMN_LABEL: &str = "col";

/// Metric families produced by one connection in one execution.
#[derive(Debug, Clone)]
pub struct SampleGroup {
    connection: usize,
    families: Vec<MetricFamily>,
}

impl SampleGroup {
    pub fn new(connection: usize, families: Vec<MetricFamily>) -> Self {
        Self {
            connection,
            families,
        }
    }

    /// Index of the job connection this group came from.
    pub fn connection(&self) -> usize {
        self.connection
    }

    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }
}

/// Immutable result of one completed execution of a query.
#[derive(Debug, Default)]
pub struct SampleSet {
    groups: Vec<SampleGroup>,
    collected_at: Option<DateTime<Utc>>,
}

impl SampleSet {
    pub fn new(groups: Vec<SampleGroup>) -> Self {
        Self {
            groups,
            collected_at: Some(Utc::now()),
        }
    }

    pub fn groups(&self) -> &[SampleGroup] {
        &self.groups
    }

    /// Group produced by the given connection, if any.
    pub fn group(&self, connection: usize) -> Option<&SampleGroup> {
        self.groups.iter().find(|g| g.connection == connection)
    }

    /// All families, group by group.
    pub fn families(&self) -> impl Iterator<Item = &MetricFamily> {
        self.groups.iter().flat_map(|g| g.families.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.families.is_empty())
    }

    /// When the execution finished; `None` before the first execution.
    pub fn collected_at(&self) -> Option<DateTime<Utc>> {
        self.collected_at
    }
}

/// A named measurement of a job.
///
/// The descriptor is fixed at construction. Samples are published by
/// swapping in a whole new [`SampleSet`]; readers clone the current `Arc`
/// and never observe a set that is still being built.
pub struct Query {
    name: String,
    fq_name: String,
    help: String,
    labels: Vec<String>,
    values: Vec<String>,
    sql: String,
    allow_zero_rows: bool,
    const_labels: HashMap<String, String>,
    descriptor: Option<Desc>,
    descriptor_error: Option<String>,
    missing_descriptor_reported: AtomicBool,
    samples: RwLock<Arc<SampleSet>>,
}

impl Query {
    /// Create a query and build its descriptor.
    ///
    /// A descriptor that cannot be built (invalid metric or label name,
    /// duplicate labels) leaves the query without one; it is then skipped by
    /// execution and by the collection protocol.
    pub fn new(
        job: &str,
        name: impl Into<String>,
        help: impl Into<String>,
        labels: Vec<String>,
        values: Vec<String>,
        sql: impl Into<String>,
        allow_zero_rows: bool,
    ) -> Self {
        let name = name.into();
        let mut help = help.into();
        if help.trim().is_empty() {
            help = format!("Result of SQL query {name}");
        }

        let fq_name = format!("{METRIC_PREFIX}_{name}");
        let const_labels = HashMap::from([(JOB_LABEL.to_string(), job.to_string())]);
        let variable_labels: Vec<String> = labels
            .iter()
            .cloned()
            .chain(CONNECTION_LABEL_NAMES.iter().map(|l| l.to_string()))
            .chain(std::iter::once(VALUE_COLUMN_LABEL.to_string()))
            .collect();

        let (descriptor, descriptor_error) = match Desc::new(
            fq_name.clone(),
            help.clone(),
            variable_labels,
            const_labels.clone(),
        ) {
            Ok(desc) => (Some(desc), None),
            Err(e) => {
                tracing::warn!(job = %job, query = %name, error = %e, "Failed to build query descriptor");
                (None, Some(e.to_string()))
            }
        };

        Self {
            name,
            fq_name,
            help,
            labels,
            values,
            sql: sql.into(),
            allow_zero_rows,
            const_labels,
            descriptor,
            descriptor_error,
            missing_descriptor_reported: AtomicBool::new(false),
            samples: RwLock::new(Arc::new(SampleSet::default())),
        }
    }

    /// Build a query from configuration, resolving `query_ref` against the
    /// shared definitions.
    pub fn from_config(
        config: &QueryConfig,
        job: &str,
        shared: &SharedQueries,
    ) -> Result<Self, JobError> {
        if config.name.trim().is_empty() {
            return Err(JobError::Config("query name cannot be empty".to_string()));
        }
        if config.values.is_empty() {
            return Err(JobError::Config(format!(
                "query '{}' defines no value columns",
                config.name
            )));
        }

        let inline = config.query.as_deref().filter(|q| !q.trim().is_empty());
        let sql = match (inline, config.query_ref.as_deref()) {
            (Some(sql), _) => sql.to_string(),
            (None, Some(reference)) => shared
                .get(reference)
                .cloned()
                .ok_or_else(|| JobError::QueryRefNotFound {
                    query: config.name.clone(),
                    reference: reference.to_string(),
                })?,
            (None, None) => {
                return Err(JobError::Config(format!(
                    "query '{}' has neither query nor query_ref",
                    config.name
                )));
            }
        };

        Ok(Self::new(
            job,
            &config.name,
            &config.help,
            config.labels.clone(),
            config.values.clone(),
            sql,
            config.allow_zero_rows,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exported metric name.
    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn descriptor(&self) -> Option<&Desc> {
        self.descriptor.as_ref()
    }

    /// Why the descriptor could not be built.
    pub fn descriptor_error(&self) -> Option<&str> {
        self.descriptor_error.as_deref()
    }

    /// Returns `true` the first time it is called on a query without a
    /// descriptor, so the caller logs that condition once.
    pub(crate) fn first_missing_descriptor_report(&self) -> bool {
        !self.missing_descriptor_reported.swap(true, Ordering::AcqRel)
    }

    /// Current sample set.
    pub fn snapshot(&self) -> Arc<SampleSet> {
        let guard = match self.samples.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&guard)
    }

    /// Replace the current sample set.
    pub fn publish(&self, set: SampleSet) {
        let set = Arc::new(set);
        let mut guard = match self.samples.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = set;
    }

    /// Turn the rows one connection returned into metric families.
    ///
    /// Every row yields one gauge per value column, labelled with the row's
    /// label columns, the connection labels and the value column name.
    pub fn build_samples(
        &self,
        connection: &ConnectionLabels,
        rows: &[Row],
    ) -> Result<Vec<MetricFamily>, JobError> {
        if self.descriptor.is_none() {
            return Err(JobError::MissingDescriptor(self.name.clone()));
        }
        if rows.is_empty() {
            return if self.allow_zero_rows {
                Ok(Vec::new())
            } else {
                Err(JobError::ZeroRows)
            };
        }

        let label_names: Vec<&str> = self
            .labels
            .iter()
            .map(String::as_str)
            .chain(CONNECTION_LABEL_NAMES)
            .chain(std::iter::once(VALUE_COLUMN_LABEL))
            .collect();
        let opts =
            Opts::new(self.fq_name.as_str(), self.help.as_str()).const_labels(self.const_labels.clone());
        let gauges = GaugeVec::new(opts, &label_names)?;

        for row in rows {
            let mut label_values = Vec::with_capacity(label_names.len());
            for label in &self.labels {
                let value = row
                    .get(label)
                    .ok_or_else(|| JobError::MissingColumn(label.clone()))?;
                label_values.push(value.to_label());
            }
            label_values.extend(connection.values().iter().map(|v| v.to_string()));

            for column in &self.values {
                let value = row
                    .get(column)
                    .ok_or_else(|| JobError::MissingColumn(column.clone()))?
                    .as_f64()
                    .ok_or_else(|| JobError::InvalidValue(column.clone()))?;

                let mut values: Vec<&str> = label_values.iter().map(String::as_str).collect();
                values.push(column.as_str());
                gauges
                    .get_metric_with_label_values(values.as_slice())?
                    .set(value);
            }
        }

        Ok(gauges.collect())
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("values", &self.values)
            .field("has_descriptor", &self.descriptor.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RowValue;
    use prometheus::TextEncoder;

    fn sqlite_labels() -> ConnectionLabels {
        ConnectionLabels {
            driver: "sqlite".to_string(),
            database: "app.db".to_string(),
            ..Default::default()
        }
    }

    fn rows_query(allow_zero_rows: bool) -> Query {
        Query::new(
            "inventory",
            "rows",
            "Rows per kind",
            vec!["kind".to_string()],
            vec!["count".to_string()],
            "SELECT kind, count FROM items",
            allow_zero_rows,
        )
    }

    fn encode(families: &[MetricFamily]) -> String {
        TextEncoder::new().encode_to_string(families).unwrap()
    }

    #[test]
    fn test_descriptor_shape() {
        let query = rows_query(false);
        let desc = query.descriptor().expect("descriptor");
        assert_eq!(desc.fq_name, "sql_rows");
        assert_eq!(desc.help, "Rows per kind");
        assert_eq!(
            desc.variable_labels,
            vec!["kind", "driver", "host", "database", "user", "col"]
        );
        assert!(query.descriptor_error().is_none());
    }

    #[test]
    fn test_invalid_name_has_no_descriptor() {
        let query = Query::new(
            "inventory",
            "bad-name",
            "",
            vec![],
            vec!["v".to_string()],
            "SELECT 1 AS v",
            false,
        );
        assert!(query.descriptor().is_none());
        assert!(query.descriptor_error().is_some());
        assert!(query.first_missing_descriptor_report());
        assert!(!query.first_missing_descriptor_report());

        let err = query.build_samples(&sqlite_labels(), &[]).unwrap_err();
        assert!(matches!(err, JobError::MissingDescriptor(_)));
    }

    #[test]
    fn test_label_clash_has_no_descriptor() {
        let query = Query::new(
            "inventory",
            "clash",
            "help",
            vec!["driver".to_string()],
            vec!["v".to_string()],
            "SELECT 1 AS v",
            false,
        );
        assert!(query.descriptor().is_none());
    }

    #[test]
    fn test_build_samples_one_gauge_per_row_and_value() {
        let query = rows_query(false);
        let rows = vec![
            Row::new()
                .with("kind", RowValue::Text("a".to_string()))
                .with("count", RowValue::Int(1)),
            Row::new()
                .with("kind", RowValue::Text("b".to_string()))
                .with("count", RowValue::Int(2)),
        ];

        let families = query.build_samples(&sqlite_labels(), &rows).unwrap();
        assert_eq!(families.len(), 1);

        let text = encode(&families);
        assert!(text.contains("# HELP sql_rows Rows per kind"));
        assert!(text.contains("# TYPE sql_rows gauge"));
        assert!(text.contains(r#"kind="a""#));
        assert!(text.contains(r#"kind="b""#));
        assert!(text.contains(r#"sql_job="inventory""#));
        assert!(text.contains(r#"col="count""#));
        assert_eq!(text.lines().filter(|l| l.starts_with("sql_rows{")).count(), 2);
    }

    #[test]
    fn test_build_samples_zero_rows() {
        let err = rows_query(false)
            .build_samples(&sqlite_labels(), &[])
            .unwrap_err();
        assert!(matches!(err, JobError::ZeroRows));

        let families = rows_query(true)
            .build_samples(&sqlite_labels(), &[])
            .unwrap();
        assert!(families.is_empty());
    }

    #[test]
    fn test_build_samples_missing_and_invalid_columns() {
        let query = rows_query(false);

        let missing_label = vec![Row::new().with("count", RowValue::Int(1))];
        let err = query
            .build_samples(&sqlite_labels(), &missing_label)
            .unwrap_err();
        assert!(matches!(err, JobError::MissingColumn(c) if c == "kind"));

        let bad_value = vec![
            Row::new()
                .with("kind", RowValue::Text("a".to_string()))
                .with("count", RowValue::Text("many".to_string())),
        ];
        let err = query.build_samples(&sqlite_labels(), &bad_value).unwrap_err();
        assert!(matches!(err, JobError::InvalidValue(c) if c == "count"));
    }

    #[test]
    fn test_from_config_resolves_query_ref() {
        let shared = SharedQueries::from([("up".to_string(), "SELECT 1 AS up".to_string())]);
        let config = QueryConfig {
            name: "up".to_string(),
            values: vec!["up".to_string()],
            query_ref: Some("up".to_string()),
            ..Default::default()
        };

        let query = Query::from_config(&config, "job", &shared).unwrap();
        assert_eq!(query.sql(), "SELECT 1 AS up");
        assert_eq!(query.fq_name(), "sql_up");
    }

    #[test]
    fn test_from_config_errors() {
        let shared = SharedQueries::new();

        let unknown_ref = QueryConfig {
            name: "up".to_string(),
            values: vec!["up".to_string()],
            query_ref: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Query::from_config(&unknown_ref, "job", &shared),
            Err(JobError::QueryRefNotFound { reference, .. }) if reference == "nope"
        ));

        let no_sql = QueryConfig {
            name: "up".to_string(),
            values: vec!["up".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            Query::from_config(&no_sql, "job", &shared),
            Err(JobError::Config(_))
        ));

        let no_values = QueryConfig {
            name: "up".to_string(),
            query: Some("SELECT 1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Query::from_config(&no_values, "job", &shared),
            Err(JobError::Config(_))
        ));
    }

    #[test]
    fn test_publish_replaces_whole_set() {
        let query = rows_query(false);
        assert!(query.snapshot().is_empty());
        assert!(query.snapshot().collected_at().is_none());

        let two_rows = vec![
            Row::new()
                .with("kind", RowValue::Text("a".to_string()))
                .with("count", RowValue::Int(1)),
            Row::new()
                .with("kind", RowValue::Text("b".to_string()))
                .with("count", RowValue::Int(2)),
        ];
        let families = query.build_samples(&sqlite_labels(), &two_rows).unwrap();
        query.publish(SampleSet::new(vec![SampleGroup::new(0, families)]));

        let before = query.snapshot();
        assert!(encode(&before.families().cloned().collect::<Vec<_>>()).contains(r#"kind="b""#));

        let one_row = vec![
            Row::new()
                .with("kind", RowValue::Text("a".to_string()))
                .with("count", RowValue::Int(5)),
        ];
        let families = query.build_samples(&sqlite_labels(), &one_row).unwrap();
        query.publish(SampleSet::new(vec![SampleGroup::new(0, families)]));

        let after = encode(&query.snapshot().families().cloned().collect::<Vec<_>>());
        assert!(!after.contains(r#"kind="b""#));
        assert!(after.contains(r#"kind="a""#));
        // Earlier readers keep their own snapshot
        assert!(encode(&before.families().cloned().collect::<Vec<_>>()).contains(r#"kind="b""#));
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_sets() {
        let query = Arc::new(Query::new(
            "torn",
            "generation",
            "help",
            vec![],
            vec!["value".to_string()],
            "SELECT 1 AS value",
            false,
        ));

        let make_set = |generation: i64| {
            let groups = (0..3)
                .map(|connection| {
                    let labels = ConnectionLabels {
                        database: format!("db{connection}"),
                        ..Default::default()
                    };
                    let rows = vec![Row::new().with("value", RowValue::Int(generation))];
                    SampleGroup::new(connection, query.build_samples(&labels, &rows).unwrap())
                })
                .collect();
            SampleSet::new(groups)
        };
        query.publish(make_set(0));

        let writer = {
            let query = Arc::clone(&query);
            let sets: Vec<SampleSet> = (1..=200).map(make_set).collect();
            std::thread::spawn(move || {
                for set in sets {
                    query.publish(set);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let query = Arc::clone(&query);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let snapshot = query.snapshot();
                        let families: Vec<MetricFamily> = snapshot.families().cloned().collect();
                        let text = TextEncoder::new().encode_to_string(&families).unwrap();
                        let values: Vec<&str> = text
                            .lines()
                            .filter(|l| l.starts_with("sql_generation{"))
                            .filter_map(|l| l.rsplit(' ').next())
                            .collect();
                        assert_eq!(values.len(), 3);
                        assert!(values.windows(2).all(|w| w[0] == w[1]), "torn read: {values:?}");
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
