//! sqlpane Session - Paginated Query Results
//!
//! A [`ConnectionSession`] owns one live connection and the cursor of the
//! statement it ran last. Rows from that cursor accumulate in a
//! [`PagedResultBuffer`], which a display layer reads by row and column
//! index and extends on demand with `fetch_more`.
//!
//! ```no_run
//! use sqlpane_core::EngineConfig;
//! use sqlpane_session::ConnectionSession;
//!
//! let mut session = ConnectionSession::sqlite(EngineConfig::default())?;
//! session.connect(":memory:")?;
//! session.execute("SELECT 1 AS x")?;
//! assert_eq!(session.buffer().column_name(0)?, "x");
//! # Ok::<(), sqlpane_core::SqlpaneError>(())
//! ```

pub mod buffer;
pub mod session;

pub use buffer::{PagedResultBuffer, PrimeOutcome};
pub use session::{ConnectionInfo, ConnectionSession};
