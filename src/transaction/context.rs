//! Transaction context: the state of one nesting level.
//!
//! Contexts form a chain from the innermost open level up to the
//! connection-level root:
//!
//! ```text
//! depth 0   root        no transaction      (enter: BEGIN)
//! depth 1   transaction BEGIN ... COMMIT    (enter: SAVEPOINT sp_..)
//! depth 2+  savepoint   SAVEPOINT ... RELEASE / ROLLBACK TO
//! ```
//!
//! Each context moves from `Active` to `Committed` or `Cancelled` exactly
//! once. A failed statement leaves the status untouched.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::transaction::error::{Operation, TransactionError, TransactionResult};
use crate::transaction::savepoint::{SavepointName, TransactionConfig};

/// Lifecycle state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Active)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "active"),
            TransactionStatus::Committed => write!(f, "committed"),
            TransactionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A transaction-control statement sent to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Begin,
    Commit,
    Rollback,
    Savepoint(SavepointName),
    Release(SavepointName),
    RollbackTo(SavepointName),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Begin => write!(f, "BEGIN"),
            Statement::Commit => write!(f, "COMMIT"),
            Statement::Rollback => write!(f, "ROLLBACK"),
            Statement::Savepoint(name) => write!(f, "SAVEPOINT {}", name),
            Statement::Release(name) => write!(f, "RELEASE SAVEPOINT {}", name),
            Statement::RollbackTo(name) => write!(f, "ROLLBACK TO SAVEPOINT {}", name),
        }
    }
}

#[derive(Debug)]
enum Level {
    /// No transaction; the state a wrapped connection starts in.
    Root,
    /// Outermost transaction, entered with BEGIN.
    Transaction,
    /// Nested transaction backed by a savepoint.
    Savepoint(SavepointName),
}

/// One nesting level.
#[derive(Debug)]
pub struct TransactionContext {
    level: Level,
    depth: usize,
    parent: Option<Arc<TransactionContext>>,
    status: Mutex<TransactionStatus>,
    config: Arc<TransactionConfig>,
    opened_at: DateTime<Utc>,
}

impl TransactionContext {
    /// Create the connection-level root context.
    pub(crate) fn root(config: Arc<TransactionConfig>) -> Arc<Self> {
        Arc::new(Self {
            level: Level::Root,
            depth: 0,
            parent: None,
            status: Mutex::new(TransactionStatus::Active),
            config,
            opened_at: Utc::now(),
        })
    }

    pub fn status(&self) -> TransactionStatus {
        *self.status.lock()
    }

    pub fn is_active(&self) -> bool {
        self.status() == TransactionStatus::Active
    }

    /// Number of transaction levels open at this context; 0 for the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this is the connection-level root (no transaction).
    pub fn is_root(&self) -> bool {
        matches!(self.level, Level::Root)
    }

    /// Savepoint backing this level, if it is nested.
    pub fn savepoint(&self) -> Option<&SavepointName> {
        match &self.level {
            Level::Savepoint(name) => Some(name),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<&Arc<TransactionContext>> {
        self.parent.as_ref()
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// This context followed by every enclosing one, innermost first.
    pub fn chain(&self) -> impl Iterator<Item = &TransactionContext> {
        std::iter::successors(Some(self), |ctx| ctx.parent.as_deref())
    }

    /// Open a child level: BEGIN from the root, SAVEPOINT otherwise.
    ///
    /// The parent's own state is not changed.
    pub(crate) async fn open<C>(parent: &Arc<Self>, conn: &C) -> TransactionResult<Arc<Self>>
    where
        C: Connection + ?Sized,
    {
        parent.ensure_active(Operation::Open)?;
        parent.ensure_enclosing_active(Operation::Open)?;

        let (level, statement) = if parent.is_root() {
            (Level::Transaction, Statement::Begin)
        } else {
            let name = SavepointName::generate(&parent.config.savepoint_prefix);
            (Level::Savepoint(name.clone()), Statement::Savepoint(name))
        };

        let depth = parent.depth + 1;
        issue(conn, &statement, depth).await?;

        Ok(Arc::new(Self {
            level,
            depth,
            parent: Some(parent.clone()),
            status: Mutex::new(TransactionStatus::Active),
            config: parent.config.clone(),
            opened_at: Utc::now(),
        }))
    }

    /// Commit this level and return the level that is current afterwards:
    /// the parent for a savepoint, the context itself for the outermost
    /// transaction.
    pub(crate) async fn commit<C>(ctx: &Arc<Self>, conn: &C) -> TransactionResult<Arc<Self>>
    where
        C: Connection + ?Sized,
    {
        let statement = match &ctx.level {
            Level::Savepoint(name) => Statement::Release(name.clone()),
            _ => Statement::Commit,
        };
        Self::finish(ctx, conn, Operation::Commit, statement, TransactionStatus::Committed).await
    }

    /// Roll back this level and return the level that is current afterwards.
    ///
    /// A savepoint is rolled back to but not released; it stays defined
    /// until the enclosing transaction ends.
    pub(crate) async fn rollback<C>(ctx: &Arc<Self>, conn: &C) -> TransactionResult<Arc<Self>>
    where
        C: Connection + ?Sized,
    {
        let statement = match &ctx.level {
            Level::Savepoint(name) => Statement::RollbackTo(name.clone()),
            _ => Statement::Rollback,
        };
        Self::finish(ctx, conn, Operation::Rollback, statement, TransactionStatus::Cancelled).await
    }

    async fn finish<C>(
        ctx: &Arc<Self>,
        conn: &C,
        operation: Operation,
        statement: Statement,
        outcome: TransactionStatus,
    ) -> TransactionResult<Arc<Self>>
    where
        C: Connection + ?Sized,
    {
        if ctx.is_root() {
            return Err(TransactionError::NoTransaction { operation });
        }
        ctx.ensure_active(operation)?;
        ctx.ensure_enclosing_active(operation)?;

        issue(conn, &statement, ctx.depth).await?;
        *ctx.status.lock() = outcome;

        match (&ctx.level, &ctx.parent) {
            (Level::Savepoint(_), Some(parent)) => Ok(parent.clone()),
            _ => Ok(ctx.clone()),
        }
    }

    /// Every level around this one must still be open; once an ancestor
    /// ends, the database has already discarded this level.
    fn ensure_enclosing_active(&self, operation: Operation) -> TransactionResult<()> {
        if self.chain().skip(1).any(|ctx| !ctx.is_active()) {
            return Err(TransactionError::EnclosingNotActive {
                operation,
                depth: self.depth,
            });
        }
        Ok(())
    }

    fn ensure_active(&self, operation: Operation) -> TransactionResult<()> {
        match self.status() {
            TransactionStatus::Active => Ok(()),
            state => Err(TransactionError::NotActive {
                operation,
                depth: self.depth,
                state,
            }),
        }
    }
}

async fn issue<C>(conn: &C, statement: &Statement, depth: usize) -> TransactionResult<()>
where
    C: Connection + ?Sized,
{
    let sql = statement.to_string();
    tracing::debug!(depth, statement = %sql, "transaction statement");
    conn.batch_execute(&sql).await.map_err(|e| {
        tracing::debug!(depth, statement = %sql, error = %e, "transaction statement failed");
        TransactionError::from(e)
    })
}
