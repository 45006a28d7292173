//! SQLite backend built on a lazily connected `sqlx` pool.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _};

use super::{Backend, ConnectionLabels, JobError, Row, RowValue};

/// Maximum pooled connections per backend.
const DEFAULT_MAX_CONNECTIONS: u32 = 2;

/// SQLite connection of a job.
///
/// The pool connects on first use, so a missing database file surfaces as an
/// execution error rather than an initialization error.
pub struct SqliteBackend {
    pool: SqlitePool,
    labels: ConnectionLabels,
}

impl SqliteBackend {
    /// Build a lazy pool for `dsn` (`sqlite://<path>`, `sqlite:<path>` or
    /// `sqlite::memory:`).
    ///
    /// # Errors
    /// Returns `JobError::UnsupportedDriver` for non-SQLite connection strings
    /// and `JobError::Database` if sqlx rejects the connection options.
    pub fn connect_lazy(dsn: &str) -> Result<Self, JobError> {
        let database =
            sqlite_database(dsn).ok_or_else(|| JobError::UnsupportedDriver(dsn.to_string()))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_lazy(dsn)?;

        Ok(Self {
            pool,
            labels: ConnectionLabels {
                driver: "sqlite".to_string(),
                host: String::new(),
                database,
                user: String::new(),
            },
        })
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for SqliteBackend {
    fn labels(&self) -> &ConnectionLabels {
        &self.labels
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Row>, JobError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(convert_row).collect())
    }
}

/// Extract the database part of a SQLite connection string.
fn sqlite_database(dsn: &str) -> Option<String> {
    let rest = dsn
        .strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))?;
    let database = rest.split('?').next().unwrap_or_default();
    if database.is_empty() {
        return None;
    }
    Some(database.to_string())
}

fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            (
                column.name().to_string(),
                decode_column(row, column.ordinal()),
            )
        })
        .collect()
}

// SQLite is dynamically typed, so try the storage classes in turn.
fn decode_column(row: &SqliteRow, index: usize) -> RowValue {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map_or(RowValue::Null, RowValue::Int);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map_or(RowValue::Null, RowValue::Float);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map_or(RowValue::Null, RowValue::Text);
    }
    RowValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_database_parsing() {
        assert_eq!(
            sqlite_database("sqlite::memory:").as_deref(),
            Some(":memory:")
        );
        assert_eq!(
            sqlite_database("sqlite:///var/lib/app.db?mode=ro").as_deref(),
            Some("/var/lib/app.db")
        );
        assert_eq!(sqlite_database("sqlite://data.db").as_deref(), Some("data.db"));
        assert_eq!(sqlite_database("sqlite://"), None);
        assert_eq!(sqlite_database("postgres://localhost/db"), None);
    }

    #[tokio::test]
    async fn test_unsupported_driver() {
        let err = SqliteBackend::connect_lazy("mysql://root@localhost/app").unwrap_err();
        assert!(matches!(err, JobError::UnsupportedDriver(_)));
    }

    #[tokio::test]
    async fn test_fetch_rows_in_memory() {
        let backend = SqliteBackend::connect_lazy("sqlite::memory:").unwrap();
        assert_eq!(backend.labels().driver, "sqlite");
        assert_eq!(backend.labels().database, ":memory:");

        let rows = backend
            .fetch("SELECT 'a' AS kind, 1 AS count, NULL AS note UNION ALL SELECT 'b', 2, NULL")
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("kind"), Some(&RowValue::Text("a".to_string())));
        assert_eq!(rows[0].get("count"), Some(&RowValue::Int(1)));
        assert_eq!(rows[0].get("note"), Some(&RowValue::Null));
        assert_eq!(rows[1].get("count").and_then(RowValue::as_f64), Some(2.0));
    }

    #[tokio::test]
    async fn test_fetch_invalid_sql() {
        let backend = SqliteBackend::connect_lazy("sqlite::memory:").unwrap();
        let err = backend.fetch("SELECT FROM nowhere").await.unwrap_err();
        assert!(matches!(err, JobError::Database(_)));
    }
}
