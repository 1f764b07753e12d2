//! Shell error types.

use thiserror::Error;

use crate::connection::ConnectionError;
use crate::transaction::TransactionError;

/// Result type for shell operations.
pub type ShellResult<T> = Result<T, ShellError>;

/// Errors reported by the interactive shell.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("{0}")]
    Connection(#[from] ConnectionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown command: .{0} (type .help for available commands)")]
    UnknownCommand(String),
}
