//! sqlpane Core - Shared Types
//!
//! Cell values, rows, the error taxonomy, engine configuration and the
//! notification registry. Every other crate depends on this one.
//! This crate performs no I/O.

pub mod config;
pub mod error;
pub mod events;
pub mod value;

pub use config::{EngineConfig, DEFAULT_BATCH_SIZE, MEMORY_TARGET};
pub use error::{
    BufferError, ConfigError, ConnectError, DriverError, ExecError, FetchError, SqlpaneError,
    SqlpaneResult, TxnError,
};
pub use events::{BufferEvent, Notifier, SessionEvent, SubscriptionId};
pub use value::{Row, Value};
