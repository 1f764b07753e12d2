//! Interactive shell over a nested-transaction handle.
//!
//! Transaction-control input (`BEGIN`, `COMMIT`, `ROLLBACK`, their savepoint
//! forms and the matching dot-commands) drives the handle stack; everything
//! else is forwarded to the connection at the current level.

mod command;
mod error;
mod repl;

pub use command::{classify, Input};
pub use error::{ShellError, ShellResult};
pub use repl::{Output, OutputMode, Repl, ShellConfig};
