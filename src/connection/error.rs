//! Connection error types.

use thiserror::Error;

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Errors reported by the underlying database connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Error returned by SQLite.
    #[error("sqlite error: {message}")]
    Sqlite { message: String, code: Option<i32> },

    /// Error returned by PostgreSQL.
    #[error("postgres error: {message}")]
    Postgres { message: String, code: Option<String> },

    /// The connection is gone (socket closed, worker task lost).
    #[error("connection closed: {0}")]
    Closed(String),

    /// A statement could not be executed.
    #[error("query error: {0}")]
    Query(String),

    /// A value could not be converted to or from the database representation.
    #[error("type conversion error: {0}")]
    TypeConversion(String),
}

impl ConnectionError {
    /// SQLSTATE or SQLite extended code, rendered as text when present.
    pub fn code(&self) -> Option<String> {
        match self {
            ConnectionError::Sqlite { code, .. } => code.map(|c| c.to_string()),
            ConnectionError::Postgres { code, .. } => code.clone(),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for ConnectionError {
    fn from(err: rusqlite::Error) -> Self {
        ConnectionError::Sqlite {
            code: err.sqlite_error().map(|e| e.extended_code),
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for ConnectionError {
    fn from(err: tokio::task::JoinError) -> Self {
        ConnectionError::Closed(format!("blocking task failed: {}", err))
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for ConnectionError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return ConnectionError::Closed(err.to_string());
        }
        match err.as_db_error() {
            Some(db) => ConnectionError::Postgres {
                message: db.message().to_string(),
                code: Some(db.code().code().to_string()),
            },
            None => ConnectionError::Postgres {
                message: err.to_string(),
                code: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_error_carries_code() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: ConnectionError = conn.execute("RELEASE SAVEPOINT missing", []).unwrap_err().into();
        assert!(matches!(err, ConnectionError::Sqlite { .. }));
        assert!(err.code().is_some());
        assert!(err.to_string().starts_with("sqlite error:"));
    }

    #[test]
    fn test_plain_errors_have_no_code() {
        assert_eq!(ConnectionError::Query("boom".into()).code(), None);
        assert_eq!(ConnectionError::Closed("eof".into()).to_string(), "connection closed: eof");
    }
}
