//! Recording driver for tests and dry runs
//!
//! [`RecordingDriver`] answers introspection from declared tables, replies to
//! statements from a queue of scripted results and logs every call. The
//! driver itself is moved into an entity manager, so inspection goes through
//! a cloned [`RecordingHandle`] sharing the same state.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use async_trait::async_trait;
use tracing::debug;

use crate::backends::{ColumnInfo, DatabaseValue, Driver, ResultSet, Row, SqlDialect};
use crate::error::OrmResult;

/// One statement received by the driver
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub sql: String,
    pub values: Vec<DatabaseValue>,
}

#[derive(Debug, Default)]
struct RecordingState {
    connected: bool,
    tables: Vec<(String, Vec<ColumnInfo>)>,
    responses: VecDeque<OrmResult<ResultSet>>,
    executed: Vec<ExecutedStatement>,
    connect_calls: usize,
    list_tables_calls: usize,
    list_columns_calls: usize,
    affected_rows: u64,
    last_insert_id: Option<DatabaseValue>,
}

/// Scripted in-process driver
#[derive(Debug)]
pub struct RecordingDriver {
    dialect: SqlDialect,
    state: Arc<Mutex<RecordingState>>,
}

/// Shared view into a [`RecordingDriver`]'s state
#[derive(Debug, Clone)]
pub struct RecordingHandle {
    state: Arc<Mutex<RecordingState>>,
}

fn lock(state: &Mutex<RecordingState>) -> MutexGuard<'_, RecordingState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            dialect: SqlDialect::SQLite,
            state: Arc::new(Mutex::new(RecordingState::default())),
        }
    }

    /// Report a different dialect; statements are still recorded as given
    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Declare a table returned by introspection
    pub fn with_table(self, name: &str, columns: Vec<ColumnInfo>) -> Self {
        self.handle().add_table(name, columns);
        self
    }

    /// Queue a row set for the next unanswered statement
    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        self.handle().push_rows(rows);
        self
    }

    /// Queue an arbitrary result
    pub fn with_result(self, result: OrmResult<ResultSet>) -> Self {
        self.handle().push_result(result);
        self
    }

    /// Handle sharing this driver's state
    pub fn handle(&self) -> RecordingHandle {
        RecordingHandle {
            state: self.state.clone(),
        }
    }
}

impl Default for RecordingDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHandle {
    pub fn add_table(&self, name: &str, columns: Vec<ColumnInfo>) {
        let mut state = lock(&self.state);
        state.tables.retain(|(existing, _)| existing != name);
        state.tables.push((name.to_string(), columns));
    }

    pub fn drop_table(&self, name: &str) {
        lock(&self.state).tables.retain(|(existing, _)| existing != name);
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push_result(Ok(ResultSet::with_rows(rows)));
    }

    pub fn push_affected(&self, rows_affected: u64) {
        self.push_result(Ok(ResultSet::affected(rows_affected)));
    }

    pub fn push_result(&self, result: OrmResult<ResultSet>) {
        lock(&self.state).responses.push_back(result);
    }

    /// Every statement executed so far, in order
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        lock(&self.state).executed.clone()
    }

    /// SQL text of every statement executed so far
    pub fn executed_sql(&self) -> Vec<String> {
        lock(&self.state).executed.iter().map(|s| s.sql.clone()).collect()
    }

    pub fn execute_count(&self) -> usize {
        lock(&self.state).executed.len()
    }

    pub fn connect_calls(&self) -> usize {
        lock(&self.state).connect_calls
    }

    pub fn list_tables_calls(&self) -> usize {
        lock(&self.state).list_tables_calls
    }

    pub fn list_columns_calls(&self) -> usize {
        lock(&self.state).list_columns_calls
    }

    /// Scripted results not yet consumed
    pub fn pending_responses(&self) -> usize {
        lock(&self.state).responses.len()
    }

    /// Forget recorded statements and call counts
    pub fn clear_log(&self) {
        let mut state = lock(&self.state);
        state.executed.clear();
        state.connect_calls = 0;
        state.list_tables_calls = 0;
        state.list_columns_calls = 0;
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn connect(&mut self) -> OrmResult<()> {
        let mut state = lock(&self.state);
        state.connect_calls += 1;
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> OrmResult<()> {
        lock(&self.state).connected = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<ResultSet> {
        debug!("Recording SQL: {} ({} bound values)", sql, params.len());

        let mut state = lock(&self.state);
        state.executed.push(ExecutedStatement {
            sql: sql.to_string(),
            values: params.to_vec(),
        });

        let result = state.responses.pop_front().unwrap_or_else(|| Ok(ResultSet::default()));
        if let Ok(result) = &result {
            state.affected_rows = result.rows_affected;
            if result.last_insert_id.is_some() {
                state.last_insert_id = result.last_insert_id.clone();
            }
        }
        result
    }

    async fn begin_transaction(&mut self) -> OrmResult<()> {
        self.execute("BEGIN", &[]).await.map(|_| ())
    }

    async fn commit(&mut self) -> OrmResult<()> {
        self.execute("COMMIT", &[]).await.map(|_| ())
    }

    async fn rollback(&mut self) -> OrmResult<()> {
        self.execute("ROLLBACK", &[]).await.map(|_| ())
    }

    async fn list_tables(&mut self) -> OrmResult<Vec<String>> {
        let mut state = lock(&self.state);
        state.list_tables_calls += 1;
        Ok(state.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_columns(&mut self, table: &str) -> OrmResult<Vec<ColumnInfo>> {
        let mut state = lock(&self.state);
        state.list_columns_calls += 1;
        Ok(state
            .tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, columns)| columns.clone())
            .unwrap_or_default())
    }

    async fn last_inserted_id(&mut self) -> OrmResult<Option<DatabaseValue>> {
        Ok(lock(&self.state).last_insert_id.clone())
    }

    fn affected_rows(&self) -> u64 {
        lock(&self.state).affected_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrmError;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let mut driver = RecordingDriver::new()
            .with_rows(vec![Row::new().with("id", 1)])
            .with_result(Err(OrmError::driver("boom")));
        let handle = driver.handle();

        let first = driver.execute("SELECT * FROM posts", &[]).await.unwrap();
        assert_eq!(first.rows.len(), 1);

        let second = driver.execute("SELECT * FROM posts", &[]).await;
        assert_eq!(second, Err(OrmError::driver("boom")));

        // Unscripted statements get an empty result
        let third = driver.execute("DELETE FROM posts WHERE id = ?", &[DatabaseValue::from(1)]).await.unwrap();
        assert_eq!(third, ResultSet::default());

        assert_eq!(handle.execute_count(), 3);
        assert_eq!(handle.executed()[2].values, vec![DatabaseValue::Int32(1)]);
        assert_eq!(handle.pending_responses(), 0);
    }

    #[tokio::test]
    async fn test_introspection_counts() {
        let mut driver = RecordingDriver::new().with_table("posts", vec![ColumnInfo::new("id", "INTEGER").primary_key()]);
        let handle = driver.handle();

        assert_eq!(driver.list_tables().await.unwrap(), vec!["posts".to_string()]);
        assert_eq!(driver.list_columns("posts").await.unwrap().len(), 1);
        assert!(driver.list_columns("comments").await.unwrap().is_empty());

        assert_eq!(handle.list_tables_calls(), 1);
        assert_eq!(handle.list_columns_calls(), 2);
    }

    #[tokio::test]
    async fn test_last_insert_id_tracks_results() {
        let mut driver = RecordingDriver::new().with_result(Ok(ResultSet::affected(1).with_last_insert_id(42i64)));

        driver.execute("INSERT INTO posts DEFAULT VALUES", &[]).await.unwrap();
        assert_eq!(driver.affected_rows(), 1);
        assert_eq!(driver.last_inserted_id().await.unwrap(), Some(DatabaseValue::Int64(42)));
    }
}
