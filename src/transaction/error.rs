//! Transaction error types.

use std::fmt;

use thiserror::Error;

use crate::connection::ConnectionError;
use crate::transaction::context::TransactionStatus;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Transaction-control operation, used to describe misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Open,
    Commit,
    Rollback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Open => write!(f, "nest into"),
            Operation::Commit => write!(f, "commit"),
            Operation::Rollback => write!(f, "roll back"),
        }
    }
}

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The statement could not be executed; no state transition happened.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The level was already committed or rolled back.
    #[error("cannot {operation} a transaction that is not active (depth {depth}, {state})")]
    NotActive {
        operation: Operation,
        depth: usize,
        state: TransactionStatus,
    },

    /// A transaction around this savepoint already ended, taking the savepoint with it.
    #[error("cannot {operation} at depth {depth}: the enclosing transaction is no longer active")]
    EnclosingNotActive { operation: Operation, depth: usize },

    /// Commit or rollback on a handle that has no open transaction.
    #[error("cannot {operation}: no transaction is open")]
    NoTransaction { operation: Operation },

    /// A scoped transaction body failed and rolling back after it failed too.
    #[error("{cause} (rollback also failed: {rollback})")]
    RollbackFailed {
        #[source]
        cause: Box<TransactionError>,
        rollback: Box<TransactionError>,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransactionError {
    /// Whether the error is a misuse of the state machine rather than a
    /// database failure.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            TransactionError::NotActive { .. }
                | TransactionError::EnclosingNotActive { .. }
                | TransactionError::NoTransaction { .. }
        )
    }

    /// The operation that was refused, for invalid-state errors.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            TransactionError::NotActive { operation, .. }
            | TransactionError::EnclosingNotActive { operation, .. }
            | TransactionError::NoTransaction { operation } => Some(*operation),
            _ => None,
        }
    }
}

/// Error type usable as the failure of a scoped transaction body.
///
/// Transaction failures convert into it through `From`, and a failed
/// rollback is folded into the body's error by [`rollback_failed`]
/// so neither error is lost. When the rollback succeeds the body's error is
/// returned untouched.
///
/// [`rollback_failed`]: ScopeFailure::rollback_failed
pub trait ScopeFailure: From<TransactionError> {
    fn rollback_failed(self, rollback: TransactionError) -> Self;
}

impl ScopeFailure for TransactionError {
    fn rollback_failed(self, rollback: TransactionError) -> Self {
        TransactionError::RollbackFailed {
            cause: Box::new(self),
            rollback: Box::new(rollback),
        }
    }
}
