//! SQLite driver.
//!
//! `rusqlite` statements borrow the connection they were prepared on, so a
//! cursor cannot keep its statement alive beside the connection handle.
//! Each connection therefore runs on a dedicated worker thread that owns the
//! `rusqlite::Connection` and answers blocking requests from the handle and
//! its cursors. Exactly one statement is live per connection: executing a
//! new one finalizes the previous statement.

use crate::{Cursor, Driver, DriverConnection};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use sqlpane_core::{DriverError, EngineConfig, Row, Value, MEMORY_TARGET};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Upper bound on rows preallocated for one batch.
const PREALLOCATE_LIMIT: usize = 1024;

/// Statement keywords that start an implicit transaction.
const DATA_MODIFYING: [&str; 4] = ["INSERT", "UPDATE", "DELETE", "REPLACE"];

type Reply<T> = mpsc::Sender<Result<T, DriverError>>;

/// Requests served by the worker thread.
enum Request {
    Execute {
        cursor: u64,
        sql: String,
        reply: Reply<Option<Vec<String>>>,
    },
    Fetch {
        cursor: u64,
        limit: usize,
        reply: Reply<Vec<Row>>,
    },
    CloseStatement {
        cursor: u64,
    },
    Control(Control),
    Shutdown,
}

/// Requests that do not touch the live statement.
enum Control {
    Commit { reply: Reply<()> },
    Rollback { reply: Reply<()> },
    InTransaction { reply: mpsc::Sender<bool> },
}

/// How a statement's serving loop ended.
enum StatementExit {
    /// The owning cursor closed it, or it failed to execute.
    Closed,
    /// Another statement replaces it; serve this request next.
    Next(Request),
    /// The connection is shutting down.
    Stop,
}

// ============================================================================
// DRIVER
// ============================================================================

/// Driver for SQLite database files and the `:memory:` store.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    implicit_transactions: bool,
}

impl SqliteDriver {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            implicit_transactions: config.implicit_transactions,
        }
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "SQLite"
    }

    fn open(&self, target: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
        let connection = SqliteConnection::open(target, self.implicit_transactions)?;
        Ok(Box::new(connection))
    }
}

// ============================================================================
// CONNECTION
// ============================================================================

/// Handle to a worker-owned SQLite connection.
#[derive(Debug)]
pub struct SqliteConnection {
    target: String,
    requests: Option<mpsc::Sender<Request>>,
    worker: Option<thread::JoinHandle<()>>,
    next_cursor: u64,
}

impl SqliteConnection {
    fn open(target: &str, implicit_transactions: bool) -> Result<Self, DriverError> {
        let (requests, receiver) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path = target.to_string();

        let worker = thread::Builder::new()
            .name("sqlpane-sqlite".to_string())
            .spawn(move || {
                let conn = match open_connection(&path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_worker(&conn, implicit_transactions, &receiver);
                if let Err((_, err)) = conn.close() {
                    tracing::warn!(database = %path, error = %err, "SQLite close reported an error");
                }
            })
            .map_err(|err| DriverError::Open {
                target: target.to_string(),
                reason: format!("failed to spawn sqlite worker: {err}"),
            })?;

        let ready = ready_rx.recv().map_err(|_| DriverError::Open {
            target: target.to_string(),
            reason: "sqlite worker exited during open".to_string(),
        })?;
        if let Err(err) = ready {
            let _ = worker.join();
            return Err(err);
        }

        Ok(Self {
            target: target.to_string(),
            requests: Some(requests),
            worker: Some(worker),
            next_cursor: 0,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn sender(&self) -> Result<&mpsc::Sender<Request>, DriverError> {
        self.requests.as_ref().ok_or(DriverError::ConnectionClosed)
    }
}

impl DriverConnection for SqliteConnection {
    fn cursor(&mut self) -> Result<Box<dyn Cursor>, DriverError> {
        let requests = self.sender()?.clone();
        self.next_cursor += 1;
        Ok(Box::new(SqliteCursor {
            id: self.next_cursor,
            requests,
            descriptors: None,
            executed: false,
            closed: false,
        }))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        round_trip(self.sender()?, |reply| {
            Request::Control(Control::Commit { reply })
        })
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        round_trip(self.sender()?, |reply| {
            Request::Control(Control::Rollback { reply })
        })
    }

    fn in_transaction(&self) -> bool {
        let Ok(requests) = self.sender() else {
            return false;
        };
        let (reply, response) = mpsc::channel();
        if requests
            .send(Request::Control(Control::InTransaction { reply }))
            .is_err()
        {
            return false;
        }
        response.recv().unwrap_or(false)
    }

    fn close(&mut self) {
        if let Some(requests) = self.requests.take() {
            let _ = requests.send(Request::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!(database = %self.target, "SQLite worker panicked");
            }
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// CURSOR
// ============================================================================

/// Cursor whose statement lives on the connection's worker thread.
#[derive(Debug)]
pub struct SqliteCursor {
    id: u64,
    requests: mpsc::Sender<Request>,
    descriptors: Option<Vec<String>>,
    executed: bool,
    closed: bool,
}

impl Cursor for SqliteCursor {
    fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::CursorClosed);
        }
        self.executed = false;
        self.descriptors = None;

        let cursor = self.id;
        let descriptors = round_trip(&self.requests, |reply| Request::Execute {
            cursor,
            sql: sql.to_string(),
            reply,
        })?;
        self.descriptors = descriptors;
        self.executed = true;
        Ok(())
    }

    fn fetch_one(&mut self) -> Result<Option<Row>, DriverError> {
        Ok(self.fetch_many(1)?.into_iter().next())
    }

    fn fetch_many(&mut self, limit: usize) -> Result<Vec<Row>, DriverError> {
        if self.closed {
            return Err(DriverError::CursorClosed);
        }
        if !self.executed {
            return Err(DriverError::NoStatement);
        }
        let cursor = self.id;
        round_trip(&self.requests, |reply| Request::Fetch {
            cursor,
            limit,
            reply,
        })
    }

    fn column_descriptors(&self) -> Option<Vec<String>> {
        self.descriptors.clone()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.requests.send(Request::CloseStatement { cursor: self.id });
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// WORKER
// ============================================================================

fn round_trip<T>(
    requests: &mpsc::Sender<Request>,
    build: impl FnOnce(Reply<T>) -> Request,
) -> Result<T, DriverError> {
    let (reply, response) = mpsc::channel();
    requests
        .send(build(reply))
        .map_err(|_| DriverError::ConnectionClosed)?;
    response.recv().map_err(|_| DriverError::ConnectionClosed)?
}

fn open_connection(target: &str) -> Result<Connection, DriverError> {
    let conn = if target == MEMORY_TARGET {
        Connection::open_in_memory()
    } else {
        Connection::open_with_flags(
            target,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }
    .map_err(|err| open_error(target, &err))?;

    // Opening is lazy; reading the schema surfaces files that are not databases.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .map_err(|err| open_error(target, &err))?;

    Ok(conn)
}

fn run_worker(conn: &Connection, implicit_transactions: bool, requests: &mpsc::Receiver<Request>) {
    let mut pending = None;
    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => match requests.recv() {
                Ok(request) => request,
                Err(_) => break,
            },
        };

        match request {
            Request::Execute { cursor, sql, reply } => {
                match serve_statement(conn, implicit_transactions, cursor, &sql, reply, requests) {
                    StatementExit::Closed => {}
                    StatementExit::Next(request) => pending = Some(request),
                    StatementExit::Stop => break,
                }
            }
            Request::Fetch { reply, .. } => {
                let _ = reply.send(Err(DriverError::NoStatement));
            }
            Request::CloseStatement { .. } => {}
            Request::Control(control) => serve_control(conn, control),
            Request::Shutdown => break,
        }
    }
}

/// Run one statement and serve fetches against it until it is replaced,
/// closed, or the connection shuts down.
fn serve_statement(
    conn: &Connection,
    implicit_transactions: bool,
    owner: u64,
    sql: &str,
    reply: Reply<Option<Vec<String>>>,
    requests: &mpsc::Receiver<Request>,
) -> StatementExit {
    // SQLite prepares these into a null statement that cannot be stepped.
    if is_blank_sql(sql) {
        let _ = reply.send(Ok(None));
        return serve_fetches(conn, owner, requests, |_| Ok(Vec::new()));
    }

    if implicit_transactions && modifies_data(sql) && conn.is_autocommit() {
        if let Err(err) = conn.execute_batch("BEGIN") {
            let _ = reply.send(Err(step_error(&err)));
            return StatementExit::Closed;
        }
    }

    let mut statement = match conn.prepare(sql) {
        Ok(statement) => statement,
        Err(err) => {
            let _ = reply.send(Err(DriverError::Prepare {
                reason: err.to_string(),
            }));
            return StatementExit::Closed;
        }
    };
    let names: Arc<[String]> = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let descriptors = (!names.is_empty()).then(|| names.to_vec());

    let mut rows = match statement.query([]) {
        Ok(rows) => rows,
        Err(err) => {
            let _ = reply.send(Err(step_error(&err)));
            return StatementExit::Closed;
        }
    };

    // Step once up front so DDL/DML run and statement errors surface from execute.
    let mut lookahead = match read_row(&mut rows, &names) {
        Ok(row) => row,
        Err(err) => {
            let _ = reply.send(Err(err));
            return StatementExit::Closed;
        }
    };
    let mut exhausted = lookahead.is_none();
    let _ = reply.send(Ok(descriptors));

    serve_fetches(conn, owner, requests, |limit| {
        fill_batch(&mut rows, &names, &mut lookahead, &mut exhausted, limit)
    })
}

fn serve_fetches(
    conn: &Connection,
    owner: u64,
    requests: &mpsc::Receiver<Request>,
    mut fetch: impl FnMut(usize) -> Result<Vec<Row>, DriverError>,
) -> StatementExit {
    loop {
        let Ok(request) = requests.recv() else {
            return StatementExit::Stop;
        };
        match request {
            Request::Fetch {
                cursor,
                limit,
                reply,
            } if cursor == owner => {
                let _ = reply.send(fetch(limit));
            }
            Request::Fetch { reply, .. } => {
                let _ = reply.send(Err(DriverError::NoStatement));
            }
            Request::CloseStatement { cursor } if cursor == owner => return StatementExit::Closed,
            Request::CloseStatement { .. } => {}
            Request::Control(control) => serve_control(conn, control),
            Request::Shutdown => return StatementExit::Stop,
            request @ Request::Execute { .. } => return StatementExit::Next(request),
        }
    }
}

fn fill_batch(
    rows: &mut rusqlite::Rows<'_>,
    names: &Arc<[String]>,
    lookahead: &mut Option<Row>,
    exhausted: &mut bool,
    limit: usize,
) -> Result<Vec<Row>, DriverError> {
    let mut batch = Vec::with_capacity(limit.min(PREALLOCATE_LIMIT));
    if limit == 0 {
        return Ok(batch);
    }
    if let Some(row) = lookahead.take() {
        batch.push(row);
    }
    while batch.len() < limit && !*exhausted {
        match read_row(rows, names)? {
            Some(row) => batch.push(row),
            None => *exhausted = true,
        }
    }
    Ok(batch)
}

fn read_row(
    rows: &mut rusqlite::Rows<'_>,
    names: &Arc<[String]>,
) -> Result<Option<Row>, DriverError> {
    let Some(row) = rows.next().map_err(|err| step_error(&err))? else {
        return Ok(None);
    };
    let mut values = Vec::with_capacity(names.len());
    for (index, name) in names.iter().enumerate() {
        let value = row.get_ref(index).map_err(|err| step_error(&err))?;
        values.push(value_from_ref(name, value)?);
    }
    Ok(Some(Row::new(Arc::clone(names), values)))
}

/// TEXT that is not valid UTF-8 is an error, never a lossy conversion.
fn value_from_ref(column: &str, value: ValueRef<'_>) -> Result<Value, DriverError> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => {
            let text = std::str::from_utf8(v).map_err(|err| DriverError::Step {
                reason: format!("column {column} holds invalid UTF-8 text: {err}"),
            })?;
            Value::Text(text.to_string())
        }
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    })
}

fn serve_control(conn: &Connection, control: Control) {
    match control {
        Control::Commit { reply } => {
            let result = finish_transaction(conn, "COMMIT").map_err(|err| DriverError::Commit {
                reason: err.to_string(),
            });
            let _ = reply.send(result);
        }
        Control::Rollback { reply } => {
            let result =
                finish_transaction(conn, "ROLLBACK").map_err(|err| DriverError::Rollback {
                    reason: err.to_string(),
                });
            let _ = reply.send(result);
        }
        Control::InTransaction { reply } => {
            let _ = reply.send(!conn.is_autocommit());
        }
    }
}

/// Commit or roll back; a no-op when no transaction is open.
fn finish_transaction(conn: &Connection, verb: &str) -> rusqlite::Result<()> {
    if conn.is_autocommit() {
        return Ok(());
    }
    conn.execute_batch(verb)
}

fn modifies_data(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("");
    DATA_MODIFYING
        .iter()
        .any(|candidate| keyword.eq_ignore_ascii_case(candidate))
}

fn is_blank_sql(sql: &str) -> bool {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
        if rest.is_empty() {
            return true;
        }
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, after)| after);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, after)| after);
        } else {
            return false;
        }
    }
}

fn open_error(target: &str, err: &rusqlite::Error) -> DriverError {
    DriverError::Open {
        target: target.to_string(),
        reason: err.to_string(),
    }
}

fn step_error(err: &rusqlite::Error) -> DriverError {
    DriverError::Step {
        reason: err.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
