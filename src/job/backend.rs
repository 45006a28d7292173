//! Data-source connections used by jobs.

use std::collections::HashMap;

use super::JobError;

/// Label names identifying the connection a sample came from, in export order.
pub const CONNECTION_LABEL_NAMES: [&str; 4] = ["driver", "host", "database", "user"];

/// Identity of one connection, exported as labels on every sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionLabels {
    pub driver: String,
    pub host: String,
    pub database: String,
    pub user: String,
}

impl ConnectionLabels {
    /// Label values in the order of [`CONNECTION_LABEL_NAMES`].
    pub fn values(&self) -> [&str; 4] {
        [
            self.driver.as_str(),
            self.host.as_str(),
            self.database.as_str(),
            self.user.as_str(),
        ]
    }
}

/// A single column value of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl RowValue {
    /// Numeric interpretation. Text is parsed; NULL has none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Label interpretation. NULL becomes the empty string.
    pub fn to_label(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

/// One result row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: HashMap<String, RowValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: RowValue) -> Self {
        self.columns.insert(column.into(), value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: RowValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&RowValue> {
        self.columns.get(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(String, RowValue)> for Row {
    fn from_iter<T: IntoIterator<Item = (String, RowValue)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// One configured connection of a job.
///
/// `fetch` runs a statement and returns all rows. Implementations must not
/// panic on database errors; they return them.
#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Connection identity.
    fn labels(&self) -> &ConnectionLabels;

    /// Execute `sql` and return the full result set.
    async fn fetch(&self, sql: &str) -> Result<Vec<Row>, JobError>;
}
