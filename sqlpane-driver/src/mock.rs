//! In-memory mock driver for testing.
//!
//! Statements are registered up front with the rows they produce. The mock
//! counts opened and released connections and cursors, plus every fetch
//! request, so tests can check resource release and fetch patterns.

use crate::{Cursor, Driver, DriverConnection};
use sqlpane_core::{DriverError, Row, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What a registered statement does when executed.
#[derive(Debug, Clone)]
enum Script {
    Rows {
        columns: Arc<[String]>,
        rows: Vec<Vec<Value>>,
    },
    NoResult,
    Fail(String),
}

/// Counters describing how the mock has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub connections_opened: usize,
    pub connections_closed: usize,
    pub cursors_opened: usize,
    pub cursors_closed: usize,
    pub executes: usize,
    pub fetch_calls: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

impl MockStats {
    pub fn open_connections(&self) -> usize {
        self.connections_opened - self.connections_closed
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors_opened - self.cursors_closed
    }
}

#[derive(Debug, Default)]
struct MockState {
    scripts: HashMap<String, Script>,
    open_failures: HashMap<String, String>,
    commit_failure: Option<String>,
    in_transaction: bool,
    stats: MockStats,
}

/// Scripted driver. Clones share state, so a test can keep one handle for
/// assertions while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a statement producing `rows` under `columns`.
    pub fn with_rows(self, sql: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
        self.script(sql, Script::Rows { columns, rows })
    }

    /// Register a statement with no result columns (DDL, plain DML).
    pub fn with_statement(self, sql: &str) -> Self {
        self.script(sql, Script::NoResult)
    }

    /// Register a statement that fails when executed.
    pub fn with_failure(self, sql: &str, reason: &str) -> Self {
        self.script(sql, Script::Fail(reason.to_string()))
    }

    /// Make opening `target` fail.
    pub fn with_open_failure(self, target: &str, reason: &str) -> Self {
        self.lock()
            .open_failures
            .insert(target.to_string(), reason.to_string());
        self
    }

    /// Make every commit fail.
    pub fn with_commit_failure(self, reason: &str) -> Self {
        self.lock().commit_failure = Some(reason.to_string());
        self
    }

    pub fn stats(&self) -> MockStats {
        self.lock().stats
    }

    fn script(self, sql: &str, script: Script) -> Self {
        self.lock().scripts.insert(sql.to_string(), script);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Driver for MockDriver {
    fn name(&self) -> &str {
        "Mock"
    }

    fn open(&self, target: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
        let mut state = self.lock();
        if let Some(reason) = state.open_failures.get(target) {
            return Err(DriverError::Open {
                target: target.to_string(),
                reason: reason.clone(),
            });
        }
        state.stats.connections_opened += 1;
        Ok(Box::new(MockConnection {
            driver: self.clone(),
            open: Arc::new(Mutex::new(true)),
        }))
    }
}

struct MockConnection {
    driver: MockDriver,
    open: Arc<Mutex<bool>>,
}

impl MockConnection {
    fn ensure_open(&self) -> Result<(), DriverError> {
        if *self.open.lock().unwrap_or_else(PoisonError::into_inner) {
            Ok(())
        } else {
            Err(DriverError::ConnectionClosed)
        }
    }
}

impl DriverConnection for MockConnection {
    fn cursor(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        self.ensure_open()?;
        self.driver.lock().stats.cursors_opened += 1;
        Ok(Box::new(MockCursor {
            driver: self.driver.clone(),
            connection_open: Arc::clone(&self.open),
            pending: VecDeque::new(),
            descriptors: None,
            executed: false,
            closed: false,
        }))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut state = self.driver.lock();
        if let Some(reason) = &state.commit_failure {
            return Err(DriverError::Commit {
                reason: reason.clone(),
            });
        }
        state.stats.commits += 1;
        state.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.ensure_open()?;
        let mut state = self.driver.lock();
        state.stats.rollbacks += 1;
        state.in_transaction = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.driver.lock().in_transaction
    }

    fn close(&mut self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        if *open {
            *open = false;
            self.driver.lock().stats.connections_closed += 1;
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        self.close();
    }
}

struct MockCursor {
    driver: MockDriver,
    connection_open: Arc<Mutex<bool>>,
    pending: VecDeque<Row>,
    descriptors: Option<Vec<String>>,
    executed: bool,
    closed: bool,
}

impl MockCursor {
    fn ensure_usable(&self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::CursorClosed);
        }
        if !*self
            .connection_open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(DriverError::ConnectionClosed);
        }
        Ok(())
    }
}

impl Cursor for MockCursor {
    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.ensure_usable()?;
        self.pending.clear();
        self.descriptors = None;
        self.executed = false;

        let script = {
            let mut state = self.driver.lock();
            state.stats.executes += 1;
            state.scripts.get(sql).cloned()
        };
        match script {
            Some(Script::Rows { columns, rows }) => {
                self.descriptors = Some(columns.to_vec());
                self.pending = rows
                    .into_iter()
                    .map(|values| Row::new(Arc::clone(&columns), values))
                    .collect();
            }
            // Result-less statements stand in for writes and open a transaction.
            Some(Script::NoResult) => self.driver.lock().in_transaction = true,
            Some(Script::Fail(reason)) => return Err(DriverError::Step { reason }),
            None => {
                return Err(DriverError::Prepare {
                    reason: format!("unregistered statement: {sql}"),
                })
            }
        }
        self.executed = true;
        Ok(())
    }

    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError> {
        Ok(self.fetch_many(1)?.pop())
    }

    fn fetch_many(&mut self, limit: usize) -> Result<Vec<Row>, DriverError> {
        self.ensure_usable()?;
        if !self.executed {
            return Err(DriverError::NoStatement);
        }
        self.driver.lock().stats.fetch_calls += 1;
        let take = limit.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }

    fn column_descriptors(&self) -> Option<Vec<String>> {
        self.descriptors.clone()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.driver.lock().stats.cursors_closed += 1;
        }
    }
}

impl Drop for MockCursor {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// TESTS
// ============================================================================
