//! Paged Result Buffer
//!
//! Holds the rows fetched so far for the statement a session last executed.
//! The buffer never owns the cursor; the session lends it for each priming
//! or fetch call. Rows are only ever appended, or replaced wholesale by a
//! reset.

use sqlpane_core::{BufferError, BufferEvent, FetchError, Notifier, SubscriptionId, Value};
use sqlpane_driver::Cursor;
use tracing::{debug, warn};

/// Result of the priming fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeOutcome {
    /// At least one row came back; the caller should continue with `fetch_more`.
    HasRows,
    /// The statement produced no rows.
    Empty,
}

/// Fetched-rows cache for the current statement.
#[derive(Debug, Default)]
pub struct PagedResultBuffer {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    has_more: bool,
    events: Notifier<BufferEvent>,
}

impl PagedResultBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // FETCHING
    // ========================================================================

    /// Clear the buffer and pull exactly one row from `cursor`.
    ///
    /// A returned row supplies the headers through its field names. With no
    /// row the headers come from the cursor's column descriptors, if any,
    /// and `MoreAvailable { more: false }` is emitted right away since no
    /// follow-up fetch will happen.
    pub fn reset_and_prime(&mut self, cursor: &mut dyn Cursor) -> Result<PrimeOutcome, FetchError> {
        self.columns.clear();
        self.rows.clear();
        self.has_more = false;

        let primed = match cursor.fetch_one() {
            Ok(primed) => primed,
            Err(err) => {
                warn!(error = %err, "priming fetch failed");
                self.emit_reset();
                return Err(err.into());
            }
        };

        match primed {
            Some(row) => {
                let columns = row.names().to_vec();
                if row.len() != columns.len() {
                    self.emit_reset();
                    return Err(FetchError::ArityMismatch {
                        expected: columns.len(),
                        got: row.len(),
                    });
                }
                self.columns = columns;
                self.rows.push(row.into_values());
                // A single-row request that came back full.
                self.has_more = true;
                self.emit_reset();
                debug!(columns = self.columns.len(), "primed result buffer");
                Ok(PrimeOutcome::HasRows)
            }
            None => {
                self.columns = cursor.column_descriptors().unwrap_or_default();
                self.emit_reset();
                self.events.emit(BufferEvent::MoreAvailable { more: false });
                debug!(columns = self.columns.len(), "statement produced no rows");
                Ok(PrimeOutcome::Empty)
            }
        }
    }

    /// Pull up to `batch_size` more rows from `cursor` and append them.
    ///
    /// Returns the number of rows appended. `has_more` afterwards is true
    /// iff the batch came back full, so a result set that is an exact
    /// multiple of `batch_size` costs one extra empty fetch before it
    /// reports exhaustion. A failed fetch leaves the buffer unchanged.
    pub fn fetch_more(&mut self, cursor: &mut dyn Cursor, batch_size: usize) -> Result<usize, FetchError> {
        if batch_size == 0 {
            return Err(FetchError::ZeroBatchSize);
        }
        self.append_batch(cursor, batch_size, 0, batch_size)
    }

    /// Complete the first page after a priming fetch that returned a row.
    ///
    /// The primed row counts toward the page: only `batch_size - 1` rows are
    /// requested, and a page holding exactly `batch_size` rows reports more
    /// available. Following the prime with a plain `fetch_more` would give a
    /// first page of `batch_size + 1` rows and report a result of exactly
    /// `batch_size` rows as exhausted. Otherwise behaves like
    /// [`fetch_more`](Self::fetch_more).
    pub fn fill_first_page(&mut self, cursor: &mut dyn Cursor, batch_size: usize) -> Result<usize, FetchError> {
        if batch_size == 0 {
            return Err(FetchError::ZeroBatchSize);
        }
        let primed = self.rows.len();
        self.append_batch(cursor, batch_size.saturating_sub(primed), primed, batch_size)
    }

    fn append_batch(
        &mut self,
        cursor: &mut dyn Cursor,
        request: usize,
        counted: usize,
        page_size: usize,
    ) -> Result<usize, FetchError> {
        let batch = cursor.fetch_many(request).map_err(|err| {
            warn!(error = %err, request, "fetch failed");
            FetchError::from(err)
        })?;

        if let Some(bad) = batch.iter().find(|row| row.len() != self.columns.len()) {
            return Err(FetchError::ArityMismatch {
                expected: self.columns.len(),
                got: bad.len(),
            });
        }

        let first = self.rows.len();
        let count = batch.len();
        self.rows.extend(batch.into_iter().map(|row| row.into_values()));
        self.has_more = counted + count >= page_size;

        debug!(
            fetched_total = self.rows.len(),
            batch = count,
            has_more = self.has_more,
            "fetched rows"
        );

        if count > 0 {
            self.events.emit(BufferEvent::RowsAppended { first, count });
        }
        self.events.emit(BufferEvent::MoreAvailable {
            more: self.has_more,
        });
        Ok(count)
    }

    /// Mark the current contents as final without touching them.
    ///
    /// Used when the cursor behind the buffer is released. Emits
    /// `MoreAvailable { more: false }` only if the flag actually changed.
    pub fn mark_exhausted(&mut self) {
        if self.has_more {
            self.has_more = false;
            self.events.emit(BufferEvent::MoreAvailable { more: false });
        }
    }

    /// Drop all contents. No-op when already empty.
    pub fn clear(&mut self) {
        if self.columns.is_empty() && self.rows.is_empty() && !self.has_more {
            return;
        }
        self.columns.clear();
        self.rows.clear();
        self.has_more = false;
        self.emit_reset();
    }

    fn emit_reset(&mut self) {
        self.events.emit(BufferEvent::Reset {
            columns: self.columns.clone(),
            rows: self.rows.len(),
        });
    }

    // ========================================================================
    // READ API
    // ========================================================================

    /// Cell at (`row`, `column`).
    pub fn get(&self, row: usize, column: usize) -> Result<&Value, BufferError> {
        let values = self.row(row)?;
        values.get(column).ok_or(BufferError::ColumnOutOfRange {
            column,
            columns: self.columns.len(),
        })
    }

    pub fn column_name(&self, index: usize) -> Result<&str, BufferError> {
        self.columns
            .get(index)
            .map(String::as_str)
            .ok_or(BufferError::ColumnOutOfRange {
                column: index,
                columns: self.columns.len(),
            })
    }

    pub fn row(&self, index: usize) -> Result<&[Value], BufferError> {
        self.rows
            .get(index)
            .map(Vec::as_slice)
            .ok_or(BufferError::RowOutOfRange {
                row: index,
                fetched: self.rows.len(),
            })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rows fetched so far. Always equal to `rows().len()`.
    pub fn fetched_count(&self) -> usize {
        self.rows.len()
    }

    /// Whether another `fetch_more` could yield rows.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    // ========================================================================
    // NOTIFICATIONS
    // ========================================================================

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&BufferEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn events_mut(&mut self) -> &mut Notifier<BufferEvent> {
        &mut self.events
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpane_core::DriverError;
    use sqlpane_driver::{Driver, DriverConnection, MockDriver};
    use sqlpane_test_utils::EventRecorder;

    fn numbers(n: i64) -> Vec<Vec<Value>> {
        (1..=n).map(|i| vec![Value::Integer(i), Value::from(format!("row {i}"))]).collect()
    }

    fn executed(driver: &MockDriver, sql: &str) -> (Box<dyn DriverConnection>, Box<dyn Cursor>) {
        let mut conn = driver.open("mock").unwrap();
        let mut cursor = conn.cursor().unwrap();
        cursor.execute(sql).unwrap();
        (conn, cursor)
    }

    #[test]
    fn test_prime_learns_headers_from_first_row() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(3));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();

        let outcome = buffer.reset_and_prime(cursor.as_mut()).unwrap();
        assert_eq!(outcome, PrimeOutcome::HasRows);
        assert_eq!(buffer.columns(), ["id".to_string(), "label".to_string()]);
        assert_eq!(buffer.fetched_count(), 1);
        assert_eq!(buffer.get(0, 0).unwrap(), &Value::Integer(1));
        assert!(buffer.has_more());
    }

    #[test]
    fn test_prime_empty_uses_descriptors_and_reports_exhaustion() {
        let driver = MockDriver::new().with_rows("SELECT none", &["a", "b"], vec![]);
        let (_conn, mut cursor) = executed(&driver, "SELECT none");
        let mut buffer = PagedResultBuffer::new();
        let recorder = EventRecorder::<BufferEvent>::new();
        buffer.subscribe(recorder.listener());

        let outcome = buffer.reset_and_prime(cursor.as_mut()).unwrap();
        assert_eq!(outcome, PrimeOutcome::Empty);
        assert_eq!(buffer.columns(), ["a".to_string(), "b".to_string()]);
        assert_eq!(buffer.fetched_count(), 0);
        assert!(!buffer.has_more());
        assert_eq!(
            recorder.events(),
            vec![
                BufferEvent::Reset {
                    columns: vec!["a".to_string(), "b".to_string()],
                    rows: 0
                },
                BufferEvent::MoreAvailable { more: false },
            ]
        );
    }

    #[test]
    fn test_prime_without_descriptors_leaves_headers_empty() {
        let driver = MockDriver::new().with_statement("CREATE TABLE t (x)");
        let (_conn, mut cursor) = executed(&driver, "CREATE TABLE t (x)");
        let mut buffer = PagedResultBuffer::new();

        assert_eq!(
            buffer.reset_and_prime(cursor.as_mut()).unwrap(),
            PrimeOutcome::Empty
        );
        assert!(buffer.columns().is_empty());
        assert_eq!(buffer.column_count(), 0);
    }

    #[test]
    fn test_fetch_more_appends_in_order() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(7));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        buffer.reset_and_prime(cursor.as_mut()).unwrap();

        assert_eq!(buffer.fetch_more(cursor.as_mut(), 3).unwrap(), 3);
        assert!(buffer.has_more());
        assert_eq!(buffer.fetch_more(cursor.as_mut(), 3).unwrap(), 3);
        assert!(buffer.has_more());
        assert_eq!(buffer.fetch_more(cursor.as_mut(), 3).unwrap(), 0);
        assert!(!buffer.has_more());

        let ids: Vec<i64> = buffer
            .rows()
            .iter()
            .filter_map(|row| row[0].as_i64())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_partial_batch_clears_has_more() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(4));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        let recorder = EventRecorder::<BufferEvent>::new();
        buffer.subscribe(recorder.listener());
        buffer.reset_and_prime(cursor.as_mut()).unwrap();

        assert_eq!(buffer.fetch_more(cursor.as_mut(), 10).unwrap(), 3);
        assert!(!buffer.has_more());
        assert_eq!(
            recorder.events()[1..],
            [
                BufferEvent::RowsAppended { first: 1, count: 3 },
                BufferEvent::MoreAvailable { more: false },
            ]
        );
    }

    #[test]
    fn test_first_page_counts_primed_row() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(8));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        buffer.reset_and_prime(cursor.as_mut()).unwrap();

        assert_eq!(buffer.fill_first_page(cursor.as_mut(), 4).unwrap(), 3);
        assert_eq!(buffer.fetched_count(), 4);
        assert!(buffer.has_more());
        assert_eq!(buffer.fetch_more(cursor.as_mut(), 4).unwrap(), 4);
        assert!(buffer.has_more());
        assert_eq!(buffer.fetch_more(cursor.as_mut(), 4).unwrap(), 0);
        assert!(!buffer.has_more());
    }

    #[test]
    fn test_first_page_of_one_requests_nothing() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(2));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        buffer.reset_and_prime(cursor.as_mut()).unwrap();

        assert_eq!(buffer.fill_first_page(cursor.as_mut(), 1).unwrap(), 0);
        assert_eq!(buffer.fetched_count(), 1);
        assert!(buffer.has_more());
        assert_eq!(buffer.fetch_more(cursor.as_mut(), 1).unwrap(), 1);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(2));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        assert_eq!(
            buffer.fetch_more(cursor.as_mut(), 0).unwrap_err(),
            FetchError::ZeroBatchSize
        );
        assert_eq!(driver.stats().fetch_calls, 0);
    }

    #[test]
    fn test_arity_mismatch_leaves_buffer_unchanged() {
        let driver = MockDriver::new().with_rows(
            "SELECT ragged",
            &["a", "b"],
            vec![
                vec![Value::Integer(1), Value::Integer(2)],
                vec![Value::Integer(3), Value::Integer(4)],
                vec![Value::Integer(5)],
            ],
        );
        let (_conn, mut cursor) = executed(&driver, "SELECT ragged");
        let mut buffer = PagedResultBuffer::new();
        buffer.reset_and_prime(cursor.as_mut()).unwrap();

        assert_eq!(
            buffer.fetch_more(cursor.as_mut(), 10).unwrap_err(),
            FetchError::ArityMismatch {
                expected: 2,
                got: 1
            }
        );
        assert_eq!(buffer.fetched_count(), 1);
        assert!(buffer.rows().iter().all(|row| row.len() == buffer.column_count()));
    }

    #[test]
    fn test_driver_failure_surfaces() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(2));
        let (mut conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        buffer.reset_and_prime(cursor.as_mut()).unwrap();
        conn.close();

        assert_eq!(
            buffer.fetch_more(cursor.as_mut(), 10).unwrap_err(),
            FetchError::Driver(DriverError::ConnectionClosed)
        );
        assert_eq!(buffer.fetched_count(), 1);
    }

    #[test]
    fn test_out_of_range_reads_are_errors() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(1));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        buffer.reset_and_prime(cursor.as_mut()).unwrap();

        assert_eq!(
            buffer.get(1, 0).unwrap_err(),
            BufferError::RowOutOfRange { row: 1, fetched: 1 }
        );
        assert_eq!(
            buffer.get(0, 2).unwrap_err(),
            BufferError::ColumnOutOfRange {
                column: 2,
                columns: 2
            }
        );
        assert_eq!(buffer.column_name(1).unwrap(), "label");
        assert!(buffer.column_name(2).is_err());
    }

    #[test]
    fn test_mark_exhausted_and_clear() {
        let driver = MockDriver::new().with_rows("SELECT", &["id", "label"], numbers(3));
        let (_conn, mut cursor) = executed(&driver, "SELECT");
        let mut buffer = PagedResultBuffer::new();
        buffer.reset_and_prime(cursor.as_mut()).unwrap();
        let recorder = EventRecorder::<BufferEvent>::new();
        buffer.subscribe(recorder.listener());

        buffer.mark_exhausted();
        buffer.mark_exhausted();
        assert_eq!(buffer.fetched_count(), 1);
        buffer.clear();
        buffer.clear();
        assert_eq!(buffer.fetched_count(), 0);
        assert!(buffer.columns().is_empty());

        assert_eq!(
            recorder.events(),
            vec![
                BufferEvent::MoreAvailable { more: false },
                BufferEvent::Reset {
                    columns: vec![],
                    rows: 0
                },
            ]
        );
    }
}
