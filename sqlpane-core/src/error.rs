//! Error types for sqlpane operations

use thiserror::Error;

/// Failures reported by a database driver.
///
/// Driver implementations return these; the session wraps them into the
/// operation-specific errors below.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Failed to open {target}: {reason}")]
    Open { target: String, reason: String },

    #[error("Failed to prepare statement: {reason}")]
    Prepare { reason: String },

    #[error("Statement failed: {reason}")]
    Step { reason: String },

    #[error("Commit failed: {reason}")]
    Commit { reason: String },

    #[error("Rollback failed: {reason}")]
    Rollback { reason: String },

    #[error("Cursor has no executed statement")]
    NoStatement,

    #[error("Cursor is closed")]
    CursorClosed,

    #[error("Connection is closed")]
    ConnectionClosed,
}

/// Connect errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The target is not the in-memory sentinel and no such file exists.
    #[error("Database not found: {target}")]
    NotFound { target: String },

    #[error("Could not connect to {target}: {source}")]
    Open {
        target: String,
        #[source]
        source: DriverError,
    },
}

/// Errors raised while pulling rows from a live cursor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("No active cursor; execute a statement first")]
    NoActiveCursor,

    #[error("Batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("Row arity mismatch: expected {expected} columns, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("Fetch failed: {0}")]
    Driver(#[from] DriverError),
}

/// Statement execution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("Not connected")]
    NotConnected,

    #[error("Execution failed for `{sql}`: {source}")]
    Statement {
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Transaction control errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxnError {
    #[error("Not connected")]
    NotConnected,

    #[error("Commit failed: {0}")]
    Commit(#[source] DriverError),

    #[error("Rollback failed: {0}")]
    Rollback(#[source] DriverError),
}

/// Out-of-range reads against the result buffer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("Row {row} out of range ({fetched} rows fetched)")]
    RowOutOfRange { row: usize, fetched: usize },

    #[error("Column {column} out of range ({columns} columns)")]
    ColumnOutOfRange { column: usize, columns: usize },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all sqlpane errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SqlpaneError {
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),

    #[error("Execute error: {0}")]
    Exec(#[from] ExecError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Transaction error: {0}")]
    Txn(#[from] TxnError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for sqlpane operations.
pub type SqlpaneResult<T> = Result<T, SqlpaneError>;

// =============================================================================
// TESTS
// =============================================================================
