//! sqlpane Driver - Cursor Abstraction and Implementations
//!
//! Defines the blocking driver contract the result engine consumes, plus
//! two implementations: a SQLite driver and an in-memory mock for tests.

pub mod mock;
pub mod sqlite;

pub use mock::{MockDriver, MockStats};
pub use sqlite::SqliteDriver;

use sqlpane_core::{DriverError, Row};

// ============================================================================
// DRIVER TRAITS
// ============================================================================

/// Opens connections to a kind of database.
pub trait Driver: Send + Sync {
    /// Short name shown to users, e.g. "SQLite".
    fn name(&self) -> &str;

    /// Open a connection to `target`. The caller has already decided the
    /// target is acceptable; drivers only report open failures.
    fn open(&self, target: &str) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// A live connection.
pub trait DriverConnection: Send {
    /// Create a cursor bound to this connection.
    fn cursor(&mut self) -> Result<Box<dyn Cursor>, DriverError>;

    /// Commit the open transaction, if any.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the open transaction, if any.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Whether a transaction is currently open.
    fn in_transaction(&self) -> bool;

    /// Release the connection. Idempotent. Cursors created from it stop
    /// working afterwards.
    fn close(&mut self);
}

/// A stateful handle over one executed statement's pending rows.
pub trait Cursor: Send {
    /// Run a statement. Any rows it produces become pending on this cursor.
    fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Pull the next pending row.
    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError>;

    /// Pull up to `limit` pending rows, in arrival order. Empty once the
    /// statement is exhausted.
    fn fetch_many(&mut self, limit: usize) -> Result<Vec<Row>, DriverError>;

    /// Column names of the executed statement, or `None` when the statement
    /// produces no result columns (DDL, plain DML).
    fn column_descriptors(&self) -> Option<Vec<String>>;

    /// Release the cursor. Idempotent.
    fn close(&mut self);
}
