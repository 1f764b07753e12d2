//! Recording connection for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Connection, ConnectionError, ConnectionResult, QueryResult, SqlValue};

/// Records every statement it receives. Statements starting with a
/// registered prefix fail instead of being recorded.
#[derive(Debug, Default)]
pub(crate) struct MockConnection {
    log: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Statements received so far, in order.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Make statements beginning with `prefix` fail.
    pub(crate) fn fail_on(&self, prefix: &str) {
        self.failing.lock().push(prefix.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    fn record(&self, sql: &str) -> ConnectionResult<()> {
        if self.failing.lock().iter().any(|p| sql.starts_with(p.as_str())) {
            return Err(ConnectionError::Query(format!("injected failure: {}", sql)));
        }
        self.log.lock().push(sql.to_string());
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn backend(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, sql: &str, _params: &[SqlValue]) -> ConnectionResult<u64> {
        self.record(sql)?;
        Ok(1)
    }

    async fn query(&self, sql: &str, _params: &[SqlValue]) -> ConnectionResult<QueryResult> {
        self.record(sql)?;
        Ok(QueryResult::default())
    }

    async fn batch_execute(&self, sql: &str) -> ConnectionResult<()> {
        self.record(sql)
    }
}
