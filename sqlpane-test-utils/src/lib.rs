//! sqlpane Test Utilities
//!
//! Shared test infrastructure for the sqlpane workspace:
//! - An event recorder that subscribes to any notifier
//! - Proptest generators for values, rows and result sets
//! - Fixtures for SQLite database files and N-row statements
//! - Assertions for buffer invariants

// Re-export the mock driver from its source crate
pub use sqlpane_driver::{MockDriver, MockStats};

pub use sqlpane_core::{
    BufferError, BufferEvent, ConnectError, EngineConfig, ExecError, FetchError, Row,
    SessionEvent, SqlpaneError, SqlpaneResult, TxnError, Value,
};

use std::sync::{Arc, Mutex, PoisonError};

// ============================================================================
// EVENT RECORDER
// ============================================================================

/// Collects every event emitted to the listeners it hands out.
#[derive(Debug)]
pub struct EventRecorder<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone + Send + 'static> EventRecorder<E> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A listener suitable for `Notifier::subscribe`.
    pub fn listener(&self) -> impl FnMut(&E) + Send + 'static {
        let events = Arc::clone(&self.events);
        move |event: &E| {
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone())
        }
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<E> {
        self.lock().clone()
    }

    /// Return and forget everything recorded so far.
    pub fn take(&self) -> Vec<E> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<E>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Clone + Send + 'static> Default for EventRecorder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventRecorder<E> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cell values and result sets.

    use super::*;
    use proptest::prelude::*;

    /// Any cell value. Reals are finite so equality comparisons hold.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::Integer),
            (-1.0e12f64..1.0e12).prop_map(Value::Real),
            "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Blob),
        ]
    }

    /// A column name usable unquoted in SQL.
    pub fn arb_column_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}".prop_map(|name| format!("c_{name}"))
    }

    /// A row of exactly `arity` values.
    pub fn arb_row(arity: usize) -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(arb_value(), arity)
    }

    /// Distinct column names (between one and `max_columns`) plus up to
    /// `max_rows` rows of matching arity.
    pub fn arb_result_set(
        max_columns: usize,
        max_rows: usize,
    ) -> impl Strategy<Value = (Vec<String>, Vec<Vec<Value>>)> {
        prop::collection::hash_set(arb_column_name(), 1..=max_columns.max(1))
            .prop_map(|names| names.into_iter().collect::<Vec<_>>())
            .prop_flat_map(move |columns| {
                let arity = columns.len();
                (
                    Just(columns),
                    prop::collection::vec(arb_row(arity), 0..=max_rows),
                )
            })
    }

    /// Batch sizes worth exercising: tiny ones plus the default.
    pub fn arb_batch_size() -> impl Strategy<Value = usize> {
        prop_oneof![1usize..16, Just(sqlpane_core::DEFAULT_BATCH_SIZE)]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built databases and statements for common scenarios.

    use super::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A statement yielding exactly `n` rows with a single column `n`
    /// counting up from 1.
    pub fn numbered_rows_sql(n: usize) -> String {
        format!(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < {n}) \
             SELECT n FROM seq WHERE n <= {n}"
        )
    }

    /// Mock rows matching [`numbered_rows_sql`].
    pub fn numbered_rows(n: usize) -> Vec<Vec<Value>> {
        (1..=n as i64).map(|i| vec![Value::Integer(i)]).collect()
    }

    /// A mock driver that knows `numbered_rows_sql(n)` for each `n` given.
    pub fn numbered_mock(counts: &[usize]) -> MockDriver {
        counts.iter().fold(MockDriver::new(), |driver, &n| {
            driver.with_rows(&numbered_rows_sql(n), &["n"], numbered_rows(n))
        })
    }

    /// A SQLite database file inside its own temporary directory.
    ///
    /// The directory, and the file with it, is removed on drop.
    pub struct SqliteFile {
        dir: TempDir,
        path: PathBuf,
    }

    impl SqliteFile {
        /// Create an empty database file.
        pub fn empty() -> Self {
            Self::with_schema("")
        }

        /// Create a database file and run `sql` against it.
        pub fn with_schema(sql: &str) -> Self {
            let dir = tempfile::tempdir().expect("create temp dir");
            let path = dir.path().join("fixture.db");
            let conn = rusqlite::Connection::open(&path).expect("create database file");
            conn.execute_batch(sql).expect("apply fixture schema");
            // Force the header out so the file is a real database even when empty.
            conn.pragma_update(None, "user_version", 1)
                .expect("write database header");
            drop(conn);
            Self { dir, path }
        }

        /// A `people` table with `n` numbered rows.
        pub fn people(n: usize) -> Self {
            let mut sql = String::from("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL);");
            for i in 1..=n {
                sql.push_str(&format!("INSERT INTO people (id, name) VALUES ({i}, 'person {i}');"));
            }
            Self::with_schema(&sql)
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Path as a connect target string.
        pub fn target(&self) -> String {
            self.path.display().to_string()
        }

        /// A path in the same directory that does not exist.
        pub fn missing_sibling(&self) -> PathBuf {
            self.dir.path().join("missing.db")
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for result-set invariants.

    use super::*;

    /// Every row has exactly `columns` values.
    #[track_caller]
    pub fn assert_uniform_arity(columns: usize, rows: &[Vec<Value>]) {
        for (index, row) in rows.iter().enumerate() {
            assert_eq!(
                row.len(),
                columns,
                "row {index} has {} values, expected {columns}",
                row.len()
            );
        }
    }

    /// The single integer column counts up from 1 without gaps.
    #[track_caller]
    pub fn assert_numbered(rows: &[Vec<Value>]) {
        for (index, row) in rows.iter().enumerate() {
            assert_eq!(
                row.first().and_then(Value::as_i64),
                Some(index as i64 + 1),
                "row {index} out of sequence"
            );
        }
    }

    /// Assert that a result is a `NotFound` connect error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &Result<T, ConnectError>) {
        match result {
            Err(ConnectError::NotFound { .. }) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }
}
