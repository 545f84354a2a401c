//! Connection Session
//!
//! Owns one database connection at a time, the cursor of the statement
//! executed last, and the result buffer fed by that cursor.

use crate::buffer::{PagedResultBuffer, PrimeOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlpane_core::{
    BufferEvent, ConfigError, ConnectError, EngineConfig, ExecError, FetchError, Notifier,
    SessionEvent, SubscriptionId, TxnError, MEMORY_TARGET,
};
use sqlpane_driver::{Cursor, Driver, DriverConnection, SqliteDriver};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Details of an established connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Normalized target that was opened
    pub target: String,
    /// The string exactly as the caller supplied it
    pub raw_input: String,
    /// Whether the target is the in-memory sentinel
    pub in_memory: bool,
    /// When the connection was opened
    pub connected_at: DateTime<Utc>,
}

/// A single-owner database session.
///
/// Not safe for concurrent mutation; callers serialize access per session.
pub struct ConnectionSession {
    // Declared before `connection` so the cursor is dropped first.
    cursor: Option<Box<dyn Cursor>>,
    connection: Option<Box<dyn DriverConnection>>,
    info: Option<ConnectionInfo>,
    buffer: PagedResultBuffer,
    events: Notifier<SessionEvent>,
    driver: Arc<dyn Driver>,
    config: EngineConfig,
}

impl ConnectionSession {
    /// Create a disconnected session over `driver`.
    pub fn new(driver: Arc<dyn Driver>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cursor: None,
            connection: None,
            info: None,
            buffer: PagedResultBuffer::new(),
            events: Notifier::new(),
            driver,
            config,
        })
    }

    /// Create a disconnected session backed by SQLite.
    pub fn sqlite(config: EngineConfig) -> Result<Self, ConfigError> {
        let driver = Arc::new(SqliteDriver::new(&config));
        Self::new(driver, config)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Open `raw_input` after tearing down any existing connection.
    ///
    /// Surrounding whitespace is trimmed to form the target. Anything other
    /// than `":memory:"` must name an existing file; otherwise `NotFound` is
    /// returned without attempting an open. Any failure leaves the session
    /// disconnected.
    pub fn connect(&mut self, raw_input: &str) -> Result<ConnectionInfo, ConnectError> {
        self.disconnect();

        let target = raw_input.trim();
        let in_memory = target == MEMORY_TARGET;
        if !in_memory && !Path::new(target).is_file() {
            warn!(database = target, "database file not found");
            return Err(ConnectError::NotFound {
                target: target.to_string(),
            });
        }

        let connection = self.driver.open(target).map_err(|source| {
            warn!(database = target, error = %source, "open failed");
            ConnectError::Open {
                target: target.to_string(),
                source,
            }
        })?;
        self.connection = Some(connection);

        let info = ConnectionInfo {
            target: target.to_string(),
            raw_input: raw_input.to_string(),
            in_memory,
            connected_at: Utc::now(),
        };
        self.info = Some(info.clone());
        info!(database = target, driver = self.driver.name(), "connected");

        self.events.emit(SessionEvent::Connected {
            target: target.to_string(),
        });
        self.log(format!("Connected: {raw_input}"));
        Ok(info)
    }

    /// Close the cursor, then the connection, then clear the buffer.
    ///
    /// Safe to call while disconnected. `Disconnected` is emitted every time.
    pub fn disconnect(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close();
            if let Some(info) = self.info.take() {
                info!(database = %info.target, "disconnected");
            }
        }
        self.info = None;
        self.buffer.clear();
        self.events.emit(SessionEvent::Disconnected);
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    /// Run `sql` and load its first batch into the buffer.
    ///
    /// The previous cursor is released first. When the statement itself
    /// fails the buffer keeps its previous contents and is marked exhausted.
    /// Otherwise the buffer is reset and primed with one row; if a row came
    /// back a fetch cycle follows automatically to fill the first page.
    pub fn execute(&mut self, sql: &str) -> Result<(), ExecError> {
        let connection = self.connection.as_mut().ok_or(ExecError::NotConnected)?;

        if let Some(mut previous) = self.cursor.take() {
            previous.close();
        }

        let mut cursor = match connection.cursor() {
            Ok(cursor) => cursor,
            Err(source) => {
                self.buffer.mark_exhausted();
                return Err(statement_error(sql, source));
            }
        };
        if let Err(source) = cursor.execute(sql) {
            cursor.close();
            self.buffer.mark_exhausted();
            return Err(statement_error(sql, source));
        }

        let primed = self.buffer.reset_and_prime(cursor.as_mut());
        let cursor = match primed {
            Ok(PrimeOutcome::HasRows) => {
                if let Err(err) = self.buffer.fill_first_page(cursor.as_mut(), self.config.batch_size) {
                    cursor.close();
                    self.buffer.mark_exhausted();
                    return Err(err.into());
                }
                cursor
            }
            Ok(PrimeOutcome::Empty) => cursor,
            Err(err) => {
                cursor.close();
                return Err(err.into());
            }
        };
        self.cursor = Some(cursor);

        self.log(format!("Executed: {sql}"));
        Ok(())
    }

    /// Pull the next batch from the live cursor. Returns rows appended.
    pub fn fetch_more(&mut self) -> Result<usize, FetchError> {
        let cursor = self.cursor.as_mut().ok_or(FetchError::NoActiveCursor)?;
        self.buffer.fetch_more(cursor.as_mut(), self.config.batch_size)
    }

    pub fn commit(&mut self) -> Result<(), TxnError> {
        let connection = self.connection.as_mut().ok_or(TxnError::NotConnected)?;
        connection.commit().map_err(|err| {
            warn!(error = %err, "commit failed");
            TxnError::Commit(err)
        })?;
        self.log("Committed".to_string());
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<(), TxnError> {
        let connection = self.connection.as_mut().ok_or(TxnError::NotConnected)?;
        connection.rollback().map_err(|err| {
            warn!(error = %err, "rollback failed");
            TxnError::Rollback(err)
        })?;
        self.log("Rollback".to_string());
        Ok(())
    }

    fn log(&mut self, message: String) {
        self.events.emit(SessionEvent::Log { message });
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Target of the open connection.
    pub fn target(&self) -> Option<&str> {
        self.info.as_ref().map(|info| info.target.as_str())
    }

    pub fn info(&self) -> Option<&ConnectionInfo> {
        self.info.as_ref()
    }

    pub fn buffer(&self) -> &PagedResultBuffer {
        &self.buffer
    }

    /// Whether a statement's cursor is currently held.
    pub fn has_cursor(&self) -> bool {
        self.cursor.is_some()
    }

    /// Whether the connection has an open transaction.
    pub fn in_transaction(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.in_transaction())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn notifier(&mut self) -> &mut Notifier<SessionEvent> {
        &mut self.events
    }

    pub fn subscribe_buffer<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&BufferEvent) + Send + 'static,
    {
        self.buffer.subscribe(listener)
    }

    pub fn buffer_notifier(&mut self) -> &mut Notifier<BufferEvent> {
        self.buffer.events_mut()
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("driver", &self.driver.name())
            .field("info", &self.info)
            .field("has_cursor", &self.cursor.is_some())
            .field("buffer", &self.buffer)
            .field("config", &self.config)
            .finish()
    }
}

fn statement_error(sql: &str, source: sqlpane_core::DriverError) -> ExecError {
    warn!(error = %source, "statement failed");
    ExecError::Statement {
        sql: sql.to_string(),
        source,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpane_core::{DriverError, Value};
    use sqlpane_driver::MockDriver;
    use sqlpane_test_utils::EventRecorder;

    fn mock_session(driver: &MockDriver) -> ConnectionSession {
        ConnectionSession::new(Arc::new(driver.clone()), EngineConfig::default()).unwrap()
    }

    fn numbers(n: i64) -> Vec<Vec<Value>> {
        (1..=n).map(|i| vec![Value::Integer(i)]).collect()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = ConnectionSession::sqlite(EngineConfig::default().with_batch_size(0)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_connect_memory_emits_in_order() {
        let driver = MockDriver::new();
        let mut session = mock_session(&driver);
        let recorder = EventRecorder::<SessionEvent>::new();
        session.subscribe(recorder.listener());

        let info = session.connect("  :memory: ").unwrap();
        assert_eq!(info.target, ":memory:");
        assert_eq!(info.raw_input, "  :memory: ");
        assert!(info.in_memory);
        assert_eq!(session.target(), Some(":memory:"));
        assert!(session.is_connected());
        assert_eq!(
            recorder.events(),
            vec![
                SessionEvent::Disconnected,
                SessionEvent::Connected {
                    target: ":memory:".to_string()
                },
                SessionEvent::Log {
                    message: "Connected:   :memory: ".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_missing_file_never_opens() {
        let driver = MockDriver::new();
        let mut session = mock_session(&driver);
        let err = session.connect("/definitely/not/here.db").unwrap_err();
        assert_eq!(
            err,
            ConnectError::NotFound {
                target: "/definitely/not/here.db".to_string()
            }
        );
        assert!(!session.is_connected());
        assert_eq!(driver.stats().connections_opened, 0);
    }

    #[test]
    fn test_open_failure_leaves_session_disconnected() {
        let driver = MockDriver::new().with_open_failure(":memory:", "out of memory");
        let mut session = mock_session(&driver);
        let err = session.connect(":memory:").unwrap_err();
        assert!(matches!(err, ConnectError::Open { .. }));
        assert!(!session.is_connected());
        assert_eq!(session.target(), None);
    }

    #[test]
    fn test_operations_require_connection() {
        let driver = MockDriver::new();
        let mut session = mock_session(&driver);
        assert_eq!(session.execute("SELECT 1").unwrap_err(), ExecError::NotConnected);
        assert_eq!(session.commit().unwrap_err(), TxnError::NotConnected);
        assert_eq!(session.rollback().unwrap_err(), TxnError::NotConnected);
        assert_eq!(session.fetch_more().unwrap_err(), FetchError::NoActiveCursor);
    }

    #[test]
    fn test_execute_primes_and_fetches_first_batch() {
        let driver = MockDriver::new().with_rows("SELECT n", &["n"], numbers(3));
        let mut session = mock_session(&driver);
        session.connect(":memory:").unwrap();
        session.execute("SELECT n").unwrap();

        let buffer = session.buffer();
        assert_eq!(buffer.columns(), ["n".to_string()]);
        assert_eq!(buffer.fetched_count(), 3);
        assert!(!buffer.has_more());
        assert!(session.has_cursor());
        // One priming fetch plus one batch.
        assert_eq!(driver.stats().fetch_calls, 2);
    }

    #[test]
    fn test_result_less_statement_skips_auto_fetch() {
        let driver = MockDriver::new().with_statement("CREATE TABLE t (x)");
        let mut session = mock_session(&driver);
        session.connect(":memory:").unwrap();
        session.execute("CREATE TABLE t (x)").unwrap();

        assert_eq!(session.buffer().fetched_count(), 0);
        assert!(session.buffer().columns().is_empty());
        assert_eq!(driver.stats().fetch_calls, 1);
    }

    #[test]
    fn test_failed_execute_keeps_previous_rows_and_releases_cursors() {
        let driver = MockDriver::new()
            .with_rows("SELECT n", &["n"], numbers(3))
            .with_failure("INSERT dup", "UNIQUE constraint failed");
        let mut session = mock_session(&driver);
        session.connect(":memory:").unwrap();
        session.execute("SELECT n").unwrap();

        let err = session.execute("INSERT dup").unwrap_err();
        assert!(matches!(
            err,
            ExecError::Statement {
                source: DriverError::Step { .. },
                ..
            }
        ));
        assert_eq!(session.buffer().fetched_count(), 3);
        assert_eq!(session.buffer().columns(), ["n".to_string()]);
        assert!(!session.buffer().has_more());
        assert!(!session.has_cursor());
        assert_eq!(driver.stats().open_cursors(), 0);
    }

    #[test]
    fn test_commit_and_rollback_log() {
        let driver = MockDriver::new();
        let mut session = mock_session(&driver);
        session.connect(":memory:").unwrap();
        let recorder = EventRecorder::<SessionEvent>::new();
        session.subscribe(recorder.listener());

        session.commit().unwrap();
        session.rollback().unwrap();
        assert_eq!(
            recorder.events(),
            vec![
                SessionEvent::Log {
                    message: "Committed".to_string()
                },
                SessionEvent::Log {
                    message: "Rollback".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_commit_failure_surfaces() {
        let driver = MockDriver::new().with_commit_failure("database is locked");
        let mut session = mock_session(&driver);
        session.connect(":memory:").unwrap();
        assert!(matches!(
            session.commit().unwrap_err(),
            TxnError::Commit(DriverError::Commit { .. })
        ));
    }

    #[test]
    fn test_drop_releases_everything() {
        let driver = MockDriver::new().with_rows("SELECT n", &["n"], numbers(2));
        {
            let mut session = mock_session(&driver);
            session.connect(":memory:").unwrap();
            session.execute("SELECT n").unwrap();
            assert_eq!(driver.stats().open_cursors(), 1);
        }
        let stats = driver.stats();
        assert_eq!(stats.open_cursors(), 0);
        assert_eq!(stats.open_connections(), 0);
    }

    #[test]
    fn test_connection_info_serializes() {
        let driver = MockDriver::new();
        let mut session = mock_session(&driver);
        let info = session.connect(":memory:").unwrap();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["target"], ":memory:");
        assert_eq!(json["in_memory"], true);
    }
}
