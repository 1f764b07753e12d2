//! The boundary between nested transactions and the database driver.
//!
//! A [`Connection`] is one serial database session. The transaction layer
//! only ever sends it plain transaction-control statements through
//! [`Connection::batch_execute`]; everything else is issued by callers.
//!
//! Two drivers are provided:
//! - [`SqliteConnection`]: rusqlite, run on the blocking pool
//! - `PgConnection`: tokio-postgres (cargo feature `postgres`)

mod error;
mod sqlite;
mod value;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

pub use error::{ConnectionError, ConnectionResult};
pub use sqlite::{SqliteConfig, SqliteConnection};
pub use value::SqlValue;

#[cfg(feature = "postgres")]
pub use postgres::PgConnection;

/// A row returned from a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Look up a value by column name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Render as a JSON object keyed by column name.
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (col, val) in self.columns.iter().zip(&self.values) {
            map.insert(col.clone(), val.to_json());
        }
        Value::Object(map)
    }
}

/// Serializes as an object keyed by column name, in column order.
impl Serialize for SqlRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (col, val) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(col, val)?;
        }
        map.end()
    }
}

/// Result of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<SqlRow>,
    pub rows_affected: u64,
}

impl QueryResult {
    pub fn new(rows: Vec<SqlRow>) -> Self {
        Self {
            rows,
            rows_affected: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names of the first row, if any.
    pub fn columns(&self) -> &[String] {
        self.rows.first().map(|r| r.columns()).unwrap_or(&[])
    }
}

/// One serial database session.
///
/// Implementations must execute statements in the order they are issued;
/// the transaction layer relies on this to keep its nesting chain in step
/// with the server.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Short backend name ("sqlite", "postgres").
    fn backend(&self) -> &'static str;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<u64>;

    /// Run a query and collect its rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<QueryResult>;

    /// Execute one or more statements without parameters or results.
    async fn batch_execute(&self, sql: &str) -> ConnectionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup() {
        let row = SqlRow::new(
            vec!["id".into(), "name".into()],
            vec![SqlValue::Int(1), SqlValue::Text("alice".into())],
        );
        assert_eq!(row.get("name"), Some(&SqlValue::Text("alice".into())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_by_index(0), Some(&SqlValue::Int(1)));
        assert_eq!(row.to_json(), serde_json::json!({"id": 1, "name": "alice"}));
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let row = SqlRow::new(
            vec!["z".into(), "a".into(), "data".into()],
            vec![SqlValue::Null, SqlValue::Bool(false), SqlValue::Blob(vec![1, 2])],
        );
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"z":null,"a":false,"data":"\\x0102"}"#
        );
        assert_eq!(serde_json::to_value(&row).unwrap(), row.to_json());
    }

    #[test]
    fn test_empty_result_has_no_columns() {
        let result = QueryResult::default();
        assert!(result.is_empty());
        assert!(result.columns().is_empty());
    }
}
