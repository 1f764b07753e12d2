//! SQLite driver.
//!
//! rusqlite is synchronous, so every statement runs on tokio's blocking pool
//! while holding the connection mutex. Statements awaited one after another
//! therefore reach SQLite in issue order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, OpenFlags, ToSql};

use super::{Connection, ConnectionResult, QueryResult, SqlRow, SqlValue};

const MEMORY: &str = ":memory:";

/// SQLite connection options.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    /// Create the file if it doesn't exist.
    pub create_if_missing: bool,
    /// How long to wait on a locked database before failing.
    pub busy_timeout: Duration,
    /// Enforce foreign key constraints.
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(MEMORY),
            create_if_missing: true,
            busy_timeout: Duration::from_secs(5),
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Configuration for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, value: Duration) -> Self {
        self.busy_timeout = value;
        self
    }

    /// Set foreign_keys flag.
    pub fn foreign_keys(mut self, value: bool) -> Self {
        self.foreign_keys = value;
        self
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY
    }
}

/// A SQLite database session.
pub struct SqliteConnection {
    conn: Arc<Mutex<rusqlite::Connection>>,
    path: PathBuf,
}

impl SqliteConnection {
    /// Open a connection with the given configuration.
    pub fn open(config: &SqliteConfig) -> ConnectionResult<Self> {
        let conn = if config.is_memory() {
            rusqlite::Connection::open_in_memory()?
        } else {
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;
            if config.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            rusqlite::Connection::open_with_flags(&config.path, flags)?
        };

        conn.busy_timeout(config.busy_timeout)?;
        if config.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
        }

        tracing::debug!(path = %config.path.display(), "opened sqlite connection");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: config.path.clone(),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> ConnectionResult<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    /// Path the connection was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether SQLite is outside any transaction right now.
    pub fn is_autocommit(&self) -> bool {
        self.conn.lock().is_autocommit()
    }

    async fn run<T, F>(&self, f: F) -> ConnectionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> ConnectionResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&*conn)
        })
        .await?
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("path", &self.path)
            .finish()
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run(move |conn| {
            let n = conn.execute(&sql, params_from_iter(params.iter()))?;
            Ok(n as u64)
        })
        .await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<QueryResult> {
        let sql = sql.to_string();
        let params = params.to_vec();
        self.run(move |conn| query_blocking(conn, &sql, &params)).await
    }

    async fn batch_execute(&self, sql: &str) -> ConnectionResult<()> {
        let sql = sql.to_string();
        self.run(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }
}

fn query_blocking(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[SqlValue],
) -> ConnectionResult<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut out = Vec::new();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(from_value_ref(row.get_ref(i)?));
        }
        out.push(SqlRow::new(columns.clone(), values));
    }

    Ok(QueryResult::new(out))
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b.as_slice())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionError;

    #[tokio::test]
    async fn test_execute_and_query() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.batch_execute("CREATE TABLE t (x INTEGER, name TEXT, data BLOB)")
            .await
            .unwrap();

        let n = conn
            .execute(
                "INSERT INTO t (x, name, data) VALUES (?1, ?2, ?3)",
                &[SqlValue::Int(1), SqlValue::from("one"), SqlValue::Blob(vec![1, 2])],
            )
            .await
            .unwrap();
        assert_eq!(n, 1);

        let result = conn.query("SELECT x, name, data FROM t", &[]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.columns(), ["x", "name", "data"]);
        assert_eq!(result.rows[0].get("x"), Some(&SqlValue::Int(1)));
        assert_eq!(result.rows[0].get("name"), Some(&SqlValue::Text("one".into())));
        assert_eq!(result.rows[0].get("data"), Some(&SqlValue::Blob(vec![1, 2])));
    }

    #[tokio::test]
    async fn test_bool_and_null_params() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let result = conn
            .query("SELECT ?1 AS flag, ?2 AS nothing", &[SqlValue::Bool(true), SqlValue::Null])
            .await
            .unwrap();
        assert_eq!(result.rows[0].get("flag"), Some(&SqlValue::Int(1)));
        assert_eq!(result.rows[0].get("nothing"), Some(&SqlValue::Null));
    }

    #[tokio::test]
    async fn test_autocommit_tracks_transaction() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        assert!(conn.is_autocommit());
        conn.batch_execute("BEGIN").await.unwrap();
        assert!(!conn.is_autocommit());
        conn.batch_execute("ROLLBACK").await.unwrap();
        assert!(conn.is_autocommit());
    }

    #[tokio::test]
    async fn test_sql_error_is_reported() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let err = conn.query("SELECT * FROM nowhere", &[]).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Sqlite { .. }));
    }

    #[test]
    fn test_open_missing_file_without_create() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SqliteConfig::new(dir.path().join("absent.db")).create_if_missing(false);
        assert!(SqliteConnection::open(&config).is_err());
    }

    #[tokio::test]
    async fn test_file_database_is_shared() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = SqliteConfig::new(dir.path().join("shared.db"));

        let a = SqliteConnection::open(&config).unwrap();
        a.batch_execute("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .await
            .unwrap();

        let b = SqliteConnection::open(&config).unwrap();
        let result = b.query("SELECT x FROM t", &[]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(b.path(), config.path.as_path());
    }
}
