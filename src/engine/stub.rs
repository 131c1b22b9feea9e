//! In-memory gateway for unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::engine::{ColumnInfo, DatabaseGateway, DatabaseType, KeyRole, QueryResult};
use crate::error::{QueryError, Result};

pub(crate) struct StubGateway {
    tables: Mutex<Vec<(String, Vec<ColumnInfo>)>>,
    result: Mutex<std::result::Result<QueryResult, String>>,
    pub(crate) executed: Mutex<Vec<String>>,
    pub(crate) describe_calls: AtomicUsize,
    pub(crate) fail_introspection: AtomicBool,
}

impl StubGateway {
    pub(crate) fn new() -> Self {
        Self {
            tables: Mutex::new(Vec::new()),
            result: Mutex::new(Ok(QueryResult::default())),
            executed: Mutex::new(Vec::new()),
            describe_calls: AtomicUsize::new(0),
            fail_introspection: AtomicBool::new(false),
        }
    }

    pub(crate) fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.put_table(name, columns);
        self
    }

    /// Add or replace a table; `id` columns are primary keys
    pub(crate) fn put_table(&self, name: &str, columns: &[&str]) {
        let columns = columns
            .iter()
            .map(|c| {
                let role = if *c == "id" { KeyRole::Primary } else { KeyRole::None };
                ColumnInfo::new(*c, "INTEGER", role)
            })
            .collect();
        let mut tables = self.tables.lock();
        tables.retain(|(t, _)| t != name);
        tables.push((name.to_string(), columns));
    }

    pub(crate) fn set_result(&self, result: std::result::Result<QueryResult, String>) {
        *self.result.lock() = result;
    }

    fn check_introspection(&self) -> Result<()> {
        if self.fail_introspection.load(Ordering::SeqCst) {
            return Err(QueryError::connection_failed("stub database is down"));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseGateway for StubGateway {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn database_name(&self) -> String {
        "stub".to_string()
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.check_introspection()?;
        Ok(self.tables.lock().iter().map(|(t, _)| t.clone()).collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        self.check_introspection()?;
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.tables
            .lock()
            .iter()
            .find(|(t, _)| t == table)
            .map(|(_, c)| c.clone())
            .ok_or_else(|| QueryError::schema_unavailable(format!("Table '{table}' not found")))
    }

    async fn row_count(&self, _table: &str) -> Result<u64> {
        Ok(0)
    }

    async fn sample_rows(&self, _table: &str, _limit: usize) -> Result<QueryResult> {
        Ok(QueryResult::default())
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        crate::safety::assert_safe(sql)?;
        self.executed.lock().push(sql.to_string());
        match &*self.result.lock() {
            Ok(result) => Ok(result.clone()),
            Err(message) => Err(QueryError::execution_error(message.clone())),
        }
    }
}
