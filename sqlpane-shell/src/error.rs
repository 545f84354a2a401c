//! Error types for the shell.

use crate::config::ConfigError;

/// Errors that stop the shell. Statement and connection failures are
/// printed and the loop continues; they never surface here.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Could not start session: {0}")]
    Session(#[from] sqlpane_core::ConfigError),
    #[error("Could not install log subscriber: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}

/// A line that looked like a command but is not one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command :{0} (try :help)")]
    Unknown(String),
    #[error(":{command} takes no arguments")]
    UnexpectedArgument { command: &'static str },
}
