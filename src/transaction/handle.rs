//! The unified handle: a connection bound to one nesting level.
//!
//! A [`Handle`] answers two kinds of calls:
//! - data operations, which go straight to the shared connection through
//!   the [`Connection`] impl (or through `Deref` for driver-specific methods)
//! - transaction control, which goes to the bound [`TransactionContext`]
//!   and returns a new handle for the level that is current afterwards
//!
//! Handles are immutable. Rebind your variable to the handle a control
//! operation returns; the old one keeps pointing at its original level.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::{Connection, ConnectionResult, QueryResult, SqlValue};
use crate::transaction::context::{TransactionContext, TransactionStatus};
use crate::transaction::error::{ScopeFailure, TransactionResult};
use crate::transaction::savepoint::{SavepointName, TransactionConfig};

/// Wrap a connection. The returned handle has no open transaction.
pub fn wrap<C: Connection>(conn: C) -> Handle<C> {
    wrap_shared(Arc::new(conn))
}

/// Wrap a connection that is already shared.
pub fn wrap_shared<C: Connection + ?Sized>(conn: Arc<C>) -> Handle<C> {
    Handle {
        conn,
        context: TransactionContext::root(Arc::new(TransactionConfig::default())),
    }
}

/// Wrap a connection with a custom configuration.
pub fn wrap_with_config<C: Connection>(
    conn: C,
    config: TransactionConfig,
) -> TransactionResult<Handle<C>> {
    config.validate()?;
    Ok(Handle {
        conn: Arc::new(conn),
        context: TransactionContext::root(Arc::new(config)),
    })
}

/// A database handle bound to one nesting level.
pub struct Handle<C: ?Sized> {
    conn: Arc<C>,
    context: Arc<TransactionContext>,
}

impl<C: ?Sized> Clone for Handle<C> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            context: self.context.clone(),
        }
    }
}

impl<C: Connection + ?Sized> Handle<C> {
    /// The shared connection.
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// The level this handle is bound to.
    pub fn context(&self) -> &Arc<TransactionContext> {
        &self.context
    }

    pub fn depth(&self) -> usize {
        self.context.depth()
    }

    pub fn status(&self) -> TransactionStatus {
        self.context.status()
    }

    pub fn savepoint(&self) -> Option<&SavepointName> {
        self.context.savepoint()
    }

    /// Whether this handle is bound to an open transaction level.
    pub fn in_transaction(&self) -> bool {
        !self.context.is_root() && self.context.is_active()
    }

    /// Open a nested transaction and return a handle bound to it.
    ///
    /// The caller must later [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback) the returned handle.
    pub async fn transaction(&self) -> TransactionResult<Handle<C>> {
        let child = TransactionContext::open(&self.context, &*self.conn).await?;
        Ok(self.rebind(child))
    }

    /// Run `body` inside a nested transaction.
    ///
    /// If `body` returns `Ok` and left its level open, the level is
    /// committed. If it returns `Err`, the level is rolled back (unless
    /// `body` already ended it) and the error is returned as is. Returns a
    /// handle bound to this handle's level.
    pub async fn transaction_with<F, Fut, E>(&self, body: F) -> Result<Handle<C>, E>
    where
        F: FnOnce(Handle<C>) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: ScopeFailure,
    {
        let child = TransactionContext::open(&self.context, &*self.conn).await?;

        match body(self.rebind(child.clone())).await {
            Ok(()) => {
                if child.is_active() {
                    TransactionContext::commit(&child, &*self.conn).await?;
                }
                Ok(self.clone())
            }
            Err(err) if !child.is_active() => Err(err),
            Err(err) => {
                tracing::warn!(depth = child.depth(), "transaction body failed, rolling back");
                match TransactionContext::rollback(&child, &*self.conn).await {
                    Ok(_) => Err(err),
                    Err(rollback) => {
                        tracing::error!(
                            depth = child.depth(),
                            error = %rollback,
                            "rollback after failed transaction body failed"
                        );
                        Err(err.rollback_failed(rollback))
                    }
                }
            }
        }
    }

    /// Commit the bound level.
    ///
    /// Returns a handle bound to the parent level for a savepoint, or to
    /// the finished level itself for the outermost transaction.
    pub async fn commit(&self) -> TransactionResult<Handle<C>> {
        let current = TransactionContext::commit(&self.context, &*self.conn).await?;
        Ok(self.rebind(current))
    }

    /// Roll back the bound level. Returns a handle chosen as in
    /// [`commit`](Self::commit).
    pub async fn rollback(&self) -> TransactionResult<Handle<C>> {
        let current = TransactionContext::rollback(&self.context, &*self.conn).await?;
        Ok(self.rebind(current))
    }

    fn rebind(&self, context: Arc<TransactionContext>) -> Handle<C> {
        Handle {
            conn: self.conn.clone(),
            context,
        }
    }
}

#[async_trait]
impl<C: Connection + ?Sized> Connection for Handle<C> {
    fn backend(&self) -> &'static str {
        self.conn.backend()
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<u64> {
        self.conn.execute(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<QueryResult> {
        self.conn.query(sql, params).await
    }

    async fn batch_execute(&self, sql: &str) -> ConnectionResult<()> {
        self.conn.batch_execute(sql).await
    }
}

impl<C: ?Sized> Deref for Handle<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C: ?Sized> fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("depth", &self.context.depth())
            .field("savepoint", &self.context.savepoint())
            .field("status", &self.context.status())
            .finish()
    }
}
