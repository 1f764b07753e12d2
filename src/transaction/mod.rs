//! Nested transactions over a single connection.
//!
//! The first level is a real transaction (`BEGIN`); every level inside it
//! is a savepoint with a generated name. Each level commits or rolls back
//! on its own.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Handle                             │
//! │     (data operations → connection, control → context)       │
//! └─────────────────────────────────────────────────────────────┘
//!                │                              │
//!                ▼                              ▼
//!       ┌─────────────────┐           ┌──────────────────────┐
//!       │   Connection    │◄──────────│  TransactionContext  │
//!       │ (shared, serial)│ statements│ (one per level, chain│
//!       └─────────────────┘           │  up to the root)     │
//!                                     └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use nestedtx::connection::{Connection, SqliteConnection};
//! use nestedtx::transaction::{wrap, TransactionError};
//!
//! # async fn example() -> Result<(), TransactionError> {
//! let db = wrap(SqliteConnection::open_in_memory()?);
//!
//! // Scoped: committed when the block returns Ok, rolled back on Err.
//! db.transaction_with(|tx| async move {
//!     tx.batch_execute("CREATE TABLE users (name TEXT)").await?;
//!     tx.transaction_with(|inner| async move {
//!         inner.batch_execute("INSERT INTO users VALUES ('alice')").await?;
//!         Ok::<_, TransactionError>(())
//!     })
//!     .await?;
//!     Ok::<_, TransactionError>(())
//! })
//! .await?;
//!
//! // Explicit: keep the returned handles and finish each level yourself.
//! let tx = db.transaction().await?;
//! let savepoint = tx.transaction().await?;
//! let tx = savepoint.rollback().await?;
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod handle;
mod savepoint;

pub use context::{Statement, TransactionContext, TransactionStatus};
pub use error::{Operation, ScopeFailure, TransactionError, TransactionResult};
pub use handle::{wrap, wrap_shared, wrap_with_config, Handle};
pub use savepoint::{is_valid_identifier, SavepointName, TransactionConfig};
