//! nestedtx - Nested SQL transactions over a single connection
//!
//! A connection is wrapped into a [`transaction::Handle`]. Opening a
//! transaction on a handle with no open transaction issues `BEGIN`; opening
//! one inside it creates a savepoint, to any depth. Each level commits
//! (`COMMIT` / `RELEASE SAVEPOINT`) or rolls back (`ROLLBACK` /
//! `ROLLBACK TO SAVEPOINT`) on its own, and every handle still runs ordinary
//! statements against the same underlying connection.
//!
//! # Example
//!
//! ```no_run
//! use nestedtx::connection::{Connection, SqliteConnection};
//! use nestedtx::transaction::wrap;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = wrap(SqliteConnection::open_in_memory()?);
//! db.batch_execute("CREATE TABLE users (name TEXT)").await?;
//!
//! let tx = db.transaction().await?;
//! tx.execute("INSERT INTO users VALUES (?1)", &["alice".into()]).await?;
//! let sp = tx.transaction().await?;
//! sp.execute("INSERT INTO users VALUES (?1)", &["bob".into()]).await?;
//! sp.rollback().await?; // only bob is undone
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod shell;
pub mod transaction;
