//! Shell state and command dispatch.

use crate::commands::{Command, HELP};
use crate::config::ShellConfig;
use crate::error::ShellError;
use crate::render::render_table;
use sqlpane_core::{BufferEvent, SessionEvent, SqlpaneResult};
use sqlpane_session::ConnectionSession;
use std::io::{self, Write};
use std::sync::mpsc;
use tracing::debug;

/// Whether the read loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Shell {
    session: ConnectionSession,
    config: ShellConfig,
    session_events: mpsc::Receiver<SessionEvent>,
    buffer_events: mpsc::Receiver<BufferEvent>,
    /// Buffer rows already printed.
    shown: usize,
}

impl Shell {
    /// A shell over a fresh SQLite session. Does not connect yet.
    pub fn new(config: ShellConfig) -> Result<Self, ShellError> {
        let session = ConnectionSession::sqlite(config.engine.clone())?;
        Ok(Self::with_session(session, config))
    }

    pub fn with_session(mut session: ConnectionSession, config: ShellConfig) -> Self {
        let session_events = session.notifier().channel();
        let buffer_events = session.buffer_notifier().channel();
        Self {
            session,
            config,
            session_events,
            buffer_events,
            shown: 0,
        }
    }

    pub fn session(&self) -> &ConnectionSession {
        &self.session
    }

    /// Connect to the configured default target.
    pub fn start<W: Write>(&mut self, out: &mut W) -> Result<Flow, ShellError> {
        self.run(Command::Connect(None), out)
    }

    pub fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> Result<Flow, ShellError> {
        match Command::parse(line) {
            Ok(command) => self.run(command, out),
            Err(err) => {
                writeln!(out, "error: {err}")?;
                Ok(Flow::Continue)
            }
        }
    }

    fn run<W: Write>(&mut self, command: Command, out: &mut W) -> Result<Flow, ShellError> {
        debug!(?command, "running shell command");
        let outcome: SqlpaneResult<()> = match command {
            Command::Empty => Ok(()),
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => {
                writeln!(out, "{HELP}")?;
                Ok(())
            }
            Command::Connect(target) => {
                let raw = target.unwrap_or_else(|| self.config.default_target.clone());
                self.session.connect(&raw).map(|_| ()).map_err(Into::into)
            }
            Command::Disconnect => {
                self.session.disconnect();
                writeln!(out, "disconnected")?;
                Ok(())
            }
            Command::Fetch => self.session.fetch_more().map(|_| ()).map_err(Into::into),
            Command::Commit => self.session.commit().map_err(Into::into),
            Command::Rollback => self.session.rollback().map_err(Into::into),
            Command::Sql(sql) => self.session.execute(&sql).map_err(Into::into),
        };

        self.print_updates(out)?;
        if let Err(err) = outcome {
            writeln!(out, "error: {err}")?;
        }
        Ok(Flow::Continue)
    }

    /// Print queued notifications, then any rows not shown yet.
    fn print_updates<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        for event in self.session_events.try_iter() {
            match event {
                SessionEvent::Connected { target } => {
                    writeln!(out, "connected to {target} ({})", self.session.driver_name())?
                }
                SessionEvent::Log { message } => writeln!(out, "-- {message}")?,
                SessionEvent::Disconnected => {}
            }
        }

        let mut reset = false;
        let mut more = None;
        for event in self.buffer_events.try_iter() {
            match event {
                BufferEvent::Reset { .. } => {
                    reset = true;
                    self.shown = 0;
                }
                BufferEvent::MoreAvailable { more: flag } => more = Some(flag),
                BufferEvent::RowsAppended { .. } => {}
            }
        }

        let buffer = self.session.buffer();
        let fetched = buffer.fetched_count();
        let start = self.shown.min(fetched);
        let has_new_rows = fetched > start;
        if has_new_rows || (reset && buffer.column_count() > 0) {
            let page = render_table(
                buffer.columns(),
                &buffer.rows()[start..fetched],
                start,
                self.config.page_width,
            );
            out.write_all(page.as_bytes())?;
            let hint = if buffer.has_more() {
                ", :fetch for more"
            } else {
                ""
            };
            writeln!(out, "({fetched} rows fetched{hint})")?;
        } else if more == Some(false) && !reset {
            writeln!(out, "(no more rows)")?;
        }
        self.shown = fetched;
        Ok(())
    }
}
