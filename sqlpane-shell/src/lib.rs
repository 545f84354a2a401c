//! sqlpane Shell - Line-Oriented Result Browser
//!
//! Reads commands and SQL from a line source, runs them against one
//! [`ConnectionSession`](sqlpane_session::ConnectionSession), and prints
//! notifications and newly fetched rows as they arrive.

pub mod app;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod render;
