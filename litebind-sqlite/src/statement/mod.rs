use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use litebind_core::Value;

use crate::connection::ConnectionInner;
use crate::database::{Executed, StatementHandle};
use crate::error::Error;
use crate::extended::ExtendedCommand;
use crate::native::ColumnFlags;
use crate::result_set::ResultSet;

mod prepared;

pub use prepared::PreparedStatement;

/// Where a statement is in its lifecycle.
///
/// ```text
/// Unprepared -> Prepared -> Executing -> RowsAvailable | NoRows
///                  ^                           |
///                  +---------------------------+          (any) -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    Unprepared,
    Prepared,
    Executing,
    RowsAvailable,
    NoRows,
    Closed,
}

/// What is known about a compiled statement without running it.
#[derive(Debug)]
pub(crate) struct StatementInfo {
    pub(crate) columns: Vec<String>,
    pub(crate) decltypes: Vec<Option<String>>,
    pub(crate) tables: Vec<Option<String>>,
    pub(crate) param_count: usize,
    // `sqlite3_table_column_metadata` is comparatively expensive, so only on demand
    flags: OnceLock<Vec<ColumnFlags>>,
}

impl StatementInfo {
    fn read(handle: &StatementHandle) -> Result<Self, Error> {
        handle.run(|raw| {
            let count = raw.column_count();

            StatementInfo {
                columns: (0..count).map(|i| raw.column_name(i)).collect(),
                decltypes: (0..count).map(|i| raw.column_decltype(i)).collect(),
                tables: (0..count).map(|i| raw.column_table_name(i)).collect(),
                param_count: raw.bind_parameter_count(),
                flags: OnceLock::new(),
            }
        })
    }

    pub(crate) fn column_flags(&self, handle: &StatementHandle) -> Result<&[ColumnFlags], Error> {
        if let Some(flags) = self.flags.get() {
            return Ok(flags);
        }

        let flags = handle.run(|raw| raw.column_flags())?;

        Ok(self.flags.get_or_init(|| flags))
    }
}

/// The capability a [`ResultSet`] holds on its statement.
///
/// A statement has at most one open cursor. Whoever flips `open` to `false` first resets the
/// statement; afterwards the result set can no longer touch it.
pub(crate) struct Cursor {
    conn: Arc<ConnectionInner>,
    handle: Arc<StatementHandle>,
    open: AtomicBool,
}

impl Cursor {
    fn new(conn: Arc<ConnectionInner>, handle: Arc<StatementHandle>) -> Arc<Self> {
        Arc::new(Self {
            conn,
            handle,
            open: AtomicBool::new(true),
        })
    }

    pub(crate) fn handle(&self) -> &StatementHandle {
        &self.handle
    }

    /// `false` once closed, or once the connection finalized the statement underneath.
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.handle.is_closed()
    }

    pub(crate) fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) || self.handle.is_closed() {
            return;
        }

        if let Err(e) = self.handle.run(|raw| raw.reset()) {
            log::debug!("failed to reset statement when closing its result set: {e}");
        }
    }

    /// Finalize the statement after a step failed beyond recovery.
    ///
    /// The owning statement notices on its next use and moves to its failed state.
    pub(crate) fn finalize(&self) {
        self.open.store(false, Ordering::Release);

        if let Err(e) = self.conn.db.finalize(&self.handle) {
            log::debug!("finalizing after failed step: {e}");
        }
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("handle", &self.handle)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

/// State and transitions shared by [`Statement`] and [`PreparedStatement`].
pub(crate) struct StatementCore {
    conn: Arc<ConnectionInner>,
    handle: Option<Arc<StatementHandle>>,
    info: Option<Arc<StatementInfo>>,
    state: StatementState,
    cursor: Option<Arc<Cursor>>,
    max_rows: usize,
    update_count: Option<i64>,
    // state after a failure that finalized the handle
    failed_state: StatementState,
}

impl StatementCore {
    fn new(conn: Arc<ConnectionInner>, failed_state: StatementState) -> Self {
        Self {
            conn,
            handle: None,
            info: None,
            state: StatementState::Unprepared,
            cursor: None,
            max_rows: 0,
            update_count: None,
            failed_state,
        }
    }

    /// The current state, accounting for a result set that finalized the handle.
    fn state(&self) -> StatementState {
        match &self.handle {
            Some(handle)
                if handle.is_closed()
                    && self.state != StatementState::Closed
                    && !self.conn.db.is_closed() =>
            {
                self.failed_state
            }
            _ => self.state,
        }
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.state() == StatementState::Closed {
            return Err(Error::HandleClosed { name: "statement" });
        }

        if self.conn.db.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.release()?;

        let handle = self.conn.db.prepare(sql)?;

        let info = match StatementInfo::read(&handle) {
            Ok(info) => info,
            Err(e) => {
                let _ = self.conn.db.finalize(&handle);
                return Err(e);
            }
        };

        self.handle = Some(handle);
        self.info = Some(Arc::new(info));
        self.state = StatementState::Prepared;

        Ok(())
    }

    fn prepared(&self) -> Result<(Arc<StatementHandle>, Arc<StatementInfo>), Error> {
        self.ensure_open()?;

        match (&self.handle, &self.info) {
            (Some(handle), Some(info)) => Ok((Arc::clone(handle), Arc::clone(info))),
            _ => Err(Error::HandleClosed { name: "statement" }),
        }
    }

    fn column_count(&self) -> usize {
        self.info.as_ref().map_or(0, |info| info.columns.len())
    }

    fn close_cursor(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    /// Step once; `true` if a row is ready.
    fn run(&mut self, params: Option<&[Value]>) -> Result<bool, Error> {
        let (handle, info) = self.prepared()?;

        self.close_cursor();
        self.update_count = None;
        self.state = StatementState::Executing;

        let executed = match self
            .conn
            .db
            .execute(&handle, params, self.conn.auto_commit())
        {
            Ok(executed) => executed,
            Err(e) => {
                self.after_failure();
                return Err(e);
            }
        };

        match executed {
            Executed::Done { changes } if info.columns.is_empty() => {
                self.state = StatementState::NoRows;
                self.update_count = Some(changes);
            }
            _ => self.state = StatementState::RowsAvailable,
        }

        Ok(executed.has_row())
    }

    fn update(&mut self, params: Option<&[Value]>) -> Result<i64, Error> {
        let (handle, _) = self.prepared()?;

        self.close_cursor();
        self.update_count = None;
        self.state = StatementState::Executing;

        match self
            .conn
            .db
            .execute_update(&handle, params, self.conn.auto_commit())
        {
            Ok(changes) => {
                self.state = StatementState::NoRows;
                self.update_count = Some(changes);
                Ok(changes)
            }
            Err(e) => {
                self.after_failure();
                Err(e)
            }
        }
    }

    fn batch(&mut self, count: usize, values: &[Value]) -> Result<Vec<i64>, Error> {
        let (handle, _) = self.prepared()?;

        self.close_cursor();
        self.update_count = None;
        self.state = StatementState::Executing;

        match self
            .conn
            .db
            .execute_batch(&handle, count, values, self.conn.auto_commit())
        {
            Ok(counts) => {
                self.state = StatementState::NoRows;
                Ok(counts)
            }
            Err(e) => {
                self.after_failure();
                Err(e)
            }
        }
    }

    fn after_failure(&mut self) {
        match &self.handle {
            Some(handle) if handle.is_closed() => {
                self.handle = None;
                self.info = None;
                self.state = self.failed_state;
            }
            Some(_) => self.state = StatementState::Prepared,
            None => self.state = self.failed_state,
        }
    }

    fn open_result_set(&mut self, has_row: bool) -> Result<ResultSet, Error> {
        let (handle, info) = self.prepared()?;

        let cursor = Cursor::new(Arc::clone(&self.conn), handle);
        self.cursor = Some(Arc::clone(&cursor));

        Ok(ResultSet::new(cursor, info, has_row, self.max_rows))
    }

    /// Close the open cursor and finalize the handle, if any.
    fn release(&mut self) -> Result<(), Error> {
        self.close_cursor();
        self.info = None;

        match self.handle.take() {
            Some(handle) => self.conn.db.finalize(&handle),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), Error> {
        if self.state == StatementState::Closed {
            return Ok(());
        }

        self.state = StatementState::Closed;

        // the connection already finalized everything
        if self.conn.db.is_closed() {
            self.close_cursor();
            self.handle = None;
            return Ok(());
        }

        self.release()
    }

    fn cancel(&self) -> Result<(), Error> {
        self.conn.db.interrupt()
    }
}

impl Drop for StatementCore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("error closing statement on drop: {e}");
        }
    }
}

/// Runs ad-hoc SQL.
///
/// Every `execute*` call compiles its SQL afresh; the result set of the previous call is
/// closed first. Besides SQL, `execute*` understands `backup [db] to <file>` and
/// `restore [db] from <file>`.
pub struct Statement {
    core: StatementCore,
    batch: Vec<String>,
    pending: Option<ResultSet>,
}

impl Statement {
    pub(crate) fn new(conn: Arc<ConnectionInner>) -> Self {
        Self {
            core: StatementCore::new(conn, StatementState::Unprepared),
            batch: Vec::new(),
            pending: None,
        }
    }

    /// Execute `sql`. Returns `true` if it produces a result set, which is then available
    /// from [`result_set`][Self::result_set].
    pub fn execute(&mut self, sql: &str) -> Result<bool, Error> {
        self.pending = None;

        if self.try_extended(sql)? {
            return Ok(false);
        }

        self.core.prepare(sql)?;
        let has_row = self.core.run(None)?;

        if self.core.column_count() == 0 {
            return Ok(false);
        }

        self.pending = Some(self.core.open_result_set(has_row)?);
        Ok(true)
    }

    pub fn execute_query(&mut self, sql: &str) -> Result<ResultSet, Error> {
        self.pending = None;

        if ExtendedCommand::parse(sql)?.is_some() {
            return Err(Error::QueryReturnedNoRows);
        }

        self.core.prepare(sql)?;

        if self.core.column_count() == 0 {
            return Err(Error::QueryReturnedNoRows);
        }

        let has_row = self.core.run(None)?;
        self.core.open_result_set(has_row)
    }

    /// Execute `sql`, which must not produce a result set. Returns the number of changed rows.
    pub fn execute_update(&mut self, sql: &str) -> Result<i64, Error> {
        self.pending = None;

        if self.try_extended(sql)? {
            return Ok(0);
        }

        self.core.prepare(sql)?;

        if self.core.column_count() > 0 {
            return Err(Error::QueryReturnedRows);
        }

        self.core.update(None)
    }

    fn try_extended(&mut self, sql: &str) -> Result<bool, Error> {
        let Some(command) = ExtendedCommand::parse(sql)? else {
            return Ok(false);
        };

        self.core.ensure_open()?;
        self.core.release()?;
        self.core.state = StatementState::Executing;

        let db = &self.core.conn.db;

        let r = match &command {
            ExtendedCommand::Backup { database, file } => {
                db.backup_to(database, file, &mut |_| {})
            }
            ExtendedCommand::Restore { database, file } => {
                db.restore_from(database, file, &mut |_| {})
            }
        };

        self.core.state = StatementState::Unprepared;
        self.core.update_count = r.is_ok().then_some(0);

        r.map(|()| true)
    }

    pub fn add_batch(&mut self, sql: impl Into<String>) -> Result<(), Error> {
        self.core.ensure_open()?;
        self.batch.push(sql.into());
        Ok(())
    }

    pub fn clear_batch(&mut self) {
        self.batch.clear();
    }

    /// Run every queued SQL string in order and clear the queue.
    ///
    /// Stops at the first failure with [`Error::BatchUpdate`], whose counts hold the results of
    /// the entries before it and `0` for the rest.
    pub fn execute_batch(&mut self) -> Result<Vec<i64>, Error> {
        self.core.ensure_open()?;

        let batch = mem::take(&mut self.batch);
        let mut update_counts = vec![0; batch.len()];

        for (i, sql) in batch.iter().enumerate() {
            match self.execute_update(sql) {
                Ok(count) => update_counts[i] = count,
                Err(e) => {
                    return Err(Error::BatchUpdate {
                        message: format!("batch entry {i}: {e}"),
                        update_counts,
                        source: Some(Box::new(e)),
                    })
                }
            }
        }

        Ok(update_counts)
    }

    /// The result set produced by the last [`execute`][Self::execute], once.
    pub fn result_set(&mut self) -> Option<ResultSet> {
        self.pending.take()
    }

    /// Rows changed by the last execution; `None` if it produced a result set.
    pub fn update_count(&self) -> Option<i64> {
        self.core.update_count
    }

    /// Limit the rows any result set of this statement returns; `0` means no limit.
    pub fn set_max_rows(&mut self, max_rows: usize) {
        self.core.max_rows = max_rows;
    }

    pub fn max_rows(&self) -> usize {
        self.core.max_rows
    }

    /// Interrupt whatever is running on the connection.
    pub fn cancel(&self) -> Result<(), Error> {
        self.core.cancel()
    }

    pub fn state(&self) -> StatementState {
        self.core.state()
    }

    pub fn is_closed(&self) -> bool {
        self.core.state() == StatementState::Closed
    }

    /// Close the statement along with its open result set. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        self.pending = None;
        self.core.close()
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("state", &self.core.state())
            .field("batch", &self.batch.len())
            .finish_non_exhaustive()
    }
}
