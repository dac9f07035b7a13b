//! The connection-level orchestrator.
//!
//! A [`Database`] owns the native connection handle and every statement handle prepared on it.
//! All native calls go through a [`SafeHandle`], so no pointer is used after it was freed or
//! from two threads at once. When several handles are held at the same time they are always
//! taken in the order statement, `begin;`, `commit;`, connection.

use std::collections::HashSet;
use std::ffi::{c_int, c_uint, CStr};
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use libsqlite3_sys::{
    SQLITE_DONE, SQLITE_ERROR, SQLITE_OK, SQLITE_ROW, SQLITE_TRACE_PROFILE, SQLITE_TRACE_STMT,
};
use litebind_core::logger::{LogSettings, QueryLogger};
use litebind_core::{SafeHandle, Value};

use crate::connection::hooks::{
    CommitListener, ListenerSet, SqliteOperation, TraceEvent, UpdateListener,
};
use crate::error::Error;
use crate::native::backup::{self, BackupProgress};
use crate::native::callback::{
    BusyFn, Callback, CallbackSlot, CallbackTable, CollationFn, ProgressFn, TraceFn,
};
use crate::native::{RawConnection, RawStatement};
use crate::SqliteError;

pub(crate) type StatementHandle = SafeHandle<RawStatement>;

// prepared on first use, and again after a close that was called off
type CachedStatement = Mutex<Option<Arc<StatementHandle>>>;

type StatementTraceFn = dyn Fn(&str) + Send + Sync;
type ProfileFn = dyn Fn(&str, std::time::Duration) + Send + Sync;

// offending SQL is cut to this many characters in error messages
const SQL_IN_ERROR_LEN: usize = 100;

pub(crate) struct Database {
    handle: SafeHandle<RawConnection>,
    filename: String,

    // every live statement prepared through `prepare`
    statements: Mutex<HashSet<Arc<StatementHandle>>>,

    // cached for the auto-commit protocol; not part of `statements`
    begin: CachedStatement,
    commit: CachedStatement,

    update_listeners: Arc<ListenerSet<dyn UpdateListener>>,
    commit_listeners: Arc<ListenerSet<dyn CommitListener>>,

    callbacks: Arc<CallbackTable>,
    hooks: Mutex<Hooks>,

    log_settings: LogSettings,
    closed: AtomicBool,
}

/// Slots of the hooks currently installed on the connection.
///
/// SQLite holds a pointer into each slot, so a slot may only be dropped after its hook has
/// been replaced or the connection has been closed.
#[derive(Default)]
struct Hooks {
    update: Option<Box<CallbackSlot>>,
    commit: Option<Box<CallbackSlot>>,
    rollback: Option<Box<CallbackSlot>>,
    busy: Option<Box<CallbackSlot>>,
    progress: Option<Box<CallbackSlot>>,
    trace: Option<Box<CallbackSlot>>,

    statement_trace: Option<Arc<StatementTraceFn>>,
    profile: Option<Arc<ProfileFn>>,
}

enum Step {
    Row,
    Done { changes: i64 },
    Failed(SqliteError),
}

/// The outcome of stepping a statement once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Executed {
    /// A row is ready to be read.
    Row,
    /// The statement ran to completion, changing `changes` rows.
    Done { changes: i64 },
}

impl Executed {
    pub(crate) fn has_row(self) -> bool {
        matches!(self, Executed::Row)
    }
}

impl Database {
    pub(crate) fn open(
        filename: &CStr,
        flags: c_int,
        log_settings: LogSettings,
    ) -> Result<Self, Error> {
        let raw = RawConnection::open(filename, flags)?;
        let filename = filename.to_string_lossy().into_owned();

        log::debug!("opened database {filename:?} (flags {flags:#x})");

        Ok(Self {
            handle: SafeHandle::new("connection", raw),
            filename,
            statements: Mutex::new(HashSet::new()),
            begin: CachedStatement::default(),
            commit: CachedStatement::default(),
            update_listeners: Arc::new(ListenerSet::new()),
            commit_listeners: Arc::new(ListenerSet::new()),
            callbacks: CallbackTable::new(),
            hooks: Mutex::new(Hooks::default()),
            log_settings,
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn filename(&self) -> &str {
        &self.filename
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `f` with exclusive access to the connection handle.
    pub(crate) fn with_handle<T>(
        &self,
        f: impl FnOnce(RawConnection) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        self.handle.try_run(f)
    }

    fn lock_statements(&self) -> MutexGuard<'_, HashSet<Arc<StatementHandle>>> {
        self.statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_hooks(&self) -> MutexGuard<'_, Hooks> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close every statement, then the connection.
    ///
    /// Closing is best effort: every handle is attempted and the first failure is returned.
    /// If another thread is using a handle, nothing further is closed, the database stays
    /// open and [`Error::HandleBusy`] is returned so the close can be retried. Closing an
    /// already closed database does nothing.
    pub(crate) fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut first_error = None;
        let mut busy = Vec::new();

        // never finalize under the set lock
        let statements: Vec<_> = self.lock_statements().drain().collect();

        for statement in statements {
            match finalize_handle(&statement) {
                Ok(()) => {}
                Err(e @ Error::HandleBusy { .. }) => {
                    first_error.get_or_insert(e);
                    busy.push(statement);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        let mut cached_busy = false;

        for cell in [&self.begin, &self.commit] {
            let cached = cell.lock().unwrap_or_else(PoisonError::into_inner).clone();

            match cached.as_deref().map(finalize_handle) {
                None | Some(Ok(())) => {}
                Some(Err(e)) => {
                    cached_busy |= matches!(e, Error::HandleBusy { .. });
                    first_error.get_or_insert(e);
                }
            }
        }

        if cached_busy || !busy.is_empty() {
            return Err(self.reopen_after_busy(busy, first_error));
        }

        let closed = self.handle.close(|_, conn| match conn.close() {
            SQLITE_OK => Ok(SQLITE_OK),
            _ => Err(conn.last_error().into()),
        });

        match closed {
            Ok(_) => {
                drop(mem::take(&mut *self.lock_hooks()));
                self.callbacks.clear();
            }
            Err(e @ Error::HandleBusy { .. }) => {
                return Err(self.reopen_after_busy(Vec::new(), Some(e)));
            }
            Err(e) => {
                log::warn!("failed to close database {:?}: {e}", self.filename);

                // SQLite may still call into these
                mem::forget(mem::take(&mut *self.lock_hooks()));
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Undo a close that found a handle in use: the connection stays open and the statements
    /// that could not be finalized are tracked again.
    fn reopen_after_busy(&self, busy: Vec<Arc<StatementHandle>>, error: Option<Error>) -> Error {
        self.lock_statements().extend(busy);
        self.closed.store(false, Ordering::Release);

        let error = error.unwrap_or(Error::HandleBusy { name: "connection" });
        log::debug!("close of {:?} deferred: {error}", self.filename);

        error
    }

    /// Compile the first statement of `sql` into a new tracked handle.
    pub(crate) fn prepare(&self, sql: &str) -> Result<Arc<StatementHandle>, Error> {
        let handle = Arc::new(SafeHandle::new("statement", self.prepare_raw(sql)?));

        self.lock_statements().insert(Arc::clone(&handle));

        // lost a race against `close`
        if self.is_closed() {
            self.finalize(&handle)?;
            return Err(Error::ConnectionClosed);
        }

        Ok(handle)
    }

    /// Compile `sql` into a handle the database does not track.
    pub(crate) fn prepare_untracked(&self, sql: &str) -> Result<Arc<StatementHandle>, Error> {
        Ok(Arc::new(SafeHandle::new("statement", self.prepare_raw(sql)?)))
    }

    fn prepare_raw(&self, sql: &str) -> Result<RawStatement, Error> {
        self.with_handle(|conn| match conn.prepare(sql) {
            Ok(Some(statement)) => Ok(statement),
            Ok(None) => Err(SqliteError::from_code(SQLITE_ERROR)
                .with_message(format!("no statement in '{}'", truncate(sql)))
                .into()),
            Err(e) => {
                let message = format!("{} in '{}'", e.message(), truncate(sql));
                Err(e.with_message(message).into())
            }
        })
    }

    /// Finalize a statement and stop tracking it.
    pub(crate) fn finalize(&self, statement: &Arc<StatementHandle>) -> Result<(), Error> {
        self.lock_statements().remove(statement);

        finalize_handle(statement)
    }

    /// Prepare and run a single statement, discarding any row.
    pub(crate) fn exec(&self, sql: &str, auto_commit: bool) -> Result<(), Error> {
        let statement = self.prepare(sql)?;

        let r = self.execute(&statement, None, auto_commit);

        // `execute` may already have finalized it
        let finalized = self.finalize(&statement);

        r.and(finalized)
    }

    /// Run every statement in `sql`.
    pub(crate) fn exec_script(&self, sql: &str) -> Result<(), Error> {
        let _logger = QueryLogger::new(sql, &self.log_settings);

        self.with_handle(|conn| conn.exec(sql))
    }

    /// Bind `params` (if any), then step once.
    ///
    /// On completion the changed row count is read, the statement is reset and, with
    /// `auto_commit`, the auto-commit protocol runs. Busy, locked, misuse and constraint
    /// failures leave the statement usable; any other failure finalizes it.
    pub(crate) fn execute(
        &self,
        statement: &Arc<StatementHandle>,
        params: Option<&[Value]>,
        auto_commit: bool,
    ) -> Result<Executed, Error> {
        let sql = statement.run(|raw| raw.sql())?;
        let mut logger = QueryLogger::new(&sql, &self.log_settings);

        let step = statement.try_run(|raw| {
            if let Some(params) = params {
                bind_all(raw, params)?;
            }

            let status = raw.step();

            Ok(match status & 0xff {
                SQLITE_ROW => Step::Row,
                SQLITE_DONE => {
                    let changes = raw.changes();
                    raw.reset();
                    Step::Done { changes }
                }
                _ => {
                    let err = raw.error_for(status);
                    raw.reset();
                    Step::Failed(err)
                }
            })
        })?;

        match step {
            Step::Row => Ok(Executed::Row),

            Step::Done { changes } => {
                logger.increase_rows_affected(u64::try_from(changes).unwrap_or(0));

                if auto_commit {
                    self.ensure_auto_commit()?;
                }

                Ok(Executed::Done { changes })
            }

            Step::Failed(err) => {
                if !err.kind().is_recoverable() {
                    if let Err(e) = self.finalize(statement) {
                        log::debug!("finalizing after failed step: {e}");
                    }
                }

                Err(err.into())
            }
        }
    }

    /// Run the statement once per entry of a batch.
    ///
    /// `values` holds `count` rows of `bind_parameter_count` values each. Every entry must
    /// complete without producing rows; the changed row count of each entry is returned.
    pub(crate) fn execute_batch(
        &self,
        statement: &Arc<StatementHandle>,
        count: usize,
        values: &[Value],
        auto_commit: bool,
    ) -> Result<Vec<i64>, Error> {
        if count == 0 {
            return Err(err_protocol!("batch is empty"));
        }

        let sql = statement.run(|raw| raw.sql())?;
        let mut logger = QueryLogger::new(&sql, &self.log_settings);

        let mut update_counts = vec![0_i64; count];

        let r = statement.try_run(|raw| {
            let param_count = raw.bind_parameter_count();

            if values.len() != count * param_count {
                return Err(Error::ParameterCountMismatch {
                    expected: count * param_count,
                    actual: values.len(),
                });
            }

            for i in 0..count {
                let row = &values[i * param_count..(i + 1) * param_count];

                let step = bind_all(raw, row).map(|()| raw.step());

                let status = match step {
                    Ok(status) => status,
                    Err(e) => {
                        raw.reset();
                        return Err(batch_error(i, e.to_string(), &update_counts, Some(e)));
                    }
                };

                match status & 0xff {
                    SQLITE_DONE => {
                        let changes = raw.changes();
                        raw.reset();

                        update_counts[i] = changes;
                        logger.increase_rows_affected(u64::try_from(changes).unwrap_or(0));
                    }

                    SQLITE_ROW => {
                        raw.reset();
                        return Err(batch_error(i, "query returns results", &update_counts, None));
                    }

                    _ => {
                        let err = raw.error_for(status);
                        raw.reset();

                        return Err(batch_error(
                            i,
                            err.to_string(),
                            &update_counts,
                            Some(err.into()),
                        ));
                    }
                }
            }

            Ok(())
        });

        // runs once for the whole batch, whether it succeeded or not
        let committed = if auto_commit {
            self.ensure_auto_commit()
        } else {
            Ok(())
        };

        r?;
        committed?;

        Ok(update_counts)
    }

    /// Run a statement that must not produce rows; returns the changed row count.
    pub(crate) fn execute_update(
        &self,
        statement: &Arc<StatementHandle>,
        params: Option<&[Value]>,
        auto_commit: bool,
    ) -> Result<i64, Error> {
        let r = match self.execute(statement, params, auto_commit) {
            Ok(Executed::Row) => Err(Error::QueryReturnedRows),
            Ok(Executed::Done { changes }) => Ok(changes),
            Err(e) => Err(e),
        };

        if !statement.is_closed() {
            let _ = statement.run(|raw| raw.reset());
        }

        r
    }

    /// The auto-commit compensation protocol.
    ///
    /// Steps `begin;`: if that doesn't complete, a transaction is already open and nothing
    /// happens. Otherwise `commit;` is stepped and must complete. Both are reset afterwards.
    fn ensure_auto_commit(&self) -> Result<(), Error> {
        let begin = self.cached(&self.begin, "begin;")?;
        let commit = self.cached(&self.commit, "commit;")?;

        begin.try_run(|begin| {
            let r = if begin.step() & 0xff != SQLITE_DONE {
                Ok(())
            } else {
                commit.try_run(|commit| {
                    let status = commit.step();

                    if status & 0xff != SQLITE_DONE {
                        let err = commit.error_for(status);
                        commit.reset();
                        return Err(err.into());
                    }

                    commit.reset();
                    Ok(())
                })
            };

            begin.reset();
            r
        })
    }

    fn cached(&self, cell: &CachedStatement, sql: &str) -> Result<Arc<StatementHandle>, Error> {
        let mut cached = cell.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = cached.as_ref().filter(|handle| !handle.is_closed()) {
            return Ok(Arc::clone(handle));
        }

        let handle = self.prepare_untracked(sql)?;
        *cached = Some(Arc::clone(&handle));

        Ok(handle)
    }

    pub(crate) fn changes(&self) -> Result<i64, Error> {
        self.with_handle(|conn| Ok(conn.changes()))
    }

    pub(crate) fn total_changes(&self) -> Result<i64, Error> {
        self.with_handle(|conn| Ok(conn.total_changes()))
    }

    pub(crate) fn last_insert_rowid(&self) -> Result<i64, Error> {
        self.with_handle(|conn| Ok(conn.last_insert_rowid()))
    }

    pub(crate) fn in_transaction(&self) -> Result<bool, Error> {
        self.with_handle(|conn| Ok(conn.in_transaction()))
    }

    pub(crate) fn limit(&self, id: c_int, value: c_int) -> Result<c_int, Error> {
        self.with_handle(|conn| Ok(conn.limit(id, value)))
    }

    /// Abort whatever is running on the connection. Doesn't wait for the connection lock.
    pub(crate) fn interrupt(&self) -> Result<(), Error> {
        if self.is_closed() || self.handle.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        self.handle.raw_unguarded().interrupt();
        Ok(())
    }

    /// Set the busy timeout. This replaces any busy handler.
    pub(crate) fn busy_timeout(&self, ms: c_int) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();

        self.with_handle(|conn| conn.busy_timeout(ms).map_err(Into::into))?;

        hooks.busy = None;
        Ok(())
    }

    pub(crate) fn enable_load_extension(&self, enabled: bool) -> Result<(), Error> {
        self.with_handle(|conn| conn.enable_load_extension(enabled).map_err(Into::into))
    }

    pub(crate) fn create_function(
        &self,
        name: &CStr,
        n_args: c_int,
        deterministic: bool,
        aggregate: bool,
        callback: Callback,
    ) -> Result<(), Error> {
        let slot = self.callbacks.register(callback);

        self.with_handle(|conn| {
            conn.create_function(name, n_args, deterministic, aggregate, slot)
                .map_err(Into::into)
        })
    }

    pub(crate) fn destroy_function(&self, name: &CStr, n_args: c_int) -> Result<(), Error> {
        self.with_handle(|conn| conn.destroy_function(name, n_args).map_err(Into::into))
    }

    pub(crate) fn create_collation(
        &self,
        name: &CStr,
        collate: Arc<CollationFn>,
    ) -> Result<(), Error> {
        let slot = self.callbacks.register(Callback::Collation(collate));

        self.with_handle(|conn| conn.create_collation(name, slot).map_err(Into::into))
    }

    pub(crate) fn destroy_collation(&self, name: &CStr) -> Result<(), Error> {
        self.with_handle(|conn| conn.destroy_collation(name).map_err(Into::into))
    }

    pub(crate) fn set_busy_handler(&self, handler: Option<Arc<BusyFn>>) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();
        let slot = handler.map(|f| self.callbacks.register(Callback::Busy(f)));

        self.with_handle(|conn| {
            conn.set_busy_handler(slot.as_deref())
                .map_err(Into::into)
        })?;

        // the old slot is only released once SQLite no longer points at it
        hooks.busy = slot;
        Ok(())
    }

    pub(crate) fn set_progress_handler(
        &self,
        num_ops: c_int,
        handler: Option<Arc<ProgressFn>>,
    ) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();
        let slot = handler.map(|f| self.callbacks.register(Callback::Progress(f)));

        self.with_handle(|conn| {
            conn.set_progress_handler(num_ops, slot.as_deref());
            Ok(())
        })?;

        hooks.progress = slot;
        Ok(())
    }

    pub(crate) fn set_statement_trace(
        &self,
        trace: Option<Arc<StatementTraceFn>>,
    ) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();
        let previous = mem::replace(&mut hooks.statement_trace, trace);

        self.install_trace(&mut hooks).inspect_err(|_| {
            hooks.statement_trace = previous;
        })
    }

    pub(crate) fn set_profile(&self, profile: Option<Arc<ProfileFn>>) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();
        let previous = mem::replace(&mut hooks.profile, profile);

        self.install_trace(&mut hooks).inspect_err(|_| {
            hooks.profile = previous;
        })
    }

    // statement tracing and profiling share the one `sqlite3_trace_v2` registration
    fn install_trace(&self, hooks: &mut Hooks) -> Result<(), Error> {
        let mut mask: c_uint = 0;

        #[allow(clippy::cast_sign_loss)]
        if hooks.statement_trace.is_some() {
            mask |= SQLITE_TRACE_STMT as c_uint;
        }

        #[allow(clippy::cast_sign_loss)]
        if hooks.profile.is_some() {
            mask |= SQLITE_TRACE_PROFILE as c_uint;
        }

        let slot = (mask != 0).then(|| {
            let statement_trace = hooks.statement_trace.clone();
            let profile = hooks.profile.clone();

            let f: Arc<TraceFn> = Arc::new(move |event: TraceEvent<'_>| match event {
                TraceEvent::Statement(sql) => {
                    if let Some(f) = &statement_trace {
                        f(sql);
                    }
                }
                TraceEvent::Profile { sql, elapsed } => {
                    if let Some(f) = &profile {
                        f(sql, elapsed);
                    }
                }
            });

            self.callbacks.register(Callback::Trace(f))
        });

        self.with_handle(|conn| conn.set_trace(mask, slot.as_deref()).map_err(Into::into))?;

        hooks.trace = slot;
        Ok(())
    }

    pub(crate) fn add_update_listener(&self, listener: Arc<dyn UpdateListener>) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();

        if !self.update_listeners.add(Arc::clone(&listener)) {
            return Ok(());
        }

        let listeners = Arc::clone(&self.update_listeners);
        let slot = self.callbacks.register(Callback::Update(Arc::new(
            move |operation: SqliteOperation, database: &str, table: &str, rowid: i64| {
                for listener in listeners.snapshot() {
                    listener.on_update(operation, database, table, rowid);
                }
            },
        )));

        if let Err(e) = self.with_handle(|conn| {
            conn.set_update_hook(Some(&slot));
            Ok(())
        }) {
            self.update_listeners.remove(&listener);
            return Err(e);
        }

        hooks.update = Some(slot);
        Ok(())
    }

    pub(crate) fn remove_update_listener(
        &self,
        listener: &Arc<dyn UpdateListener>,
    ) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();

        if !self.update_listeners.remove(listener) {
            return Ok(());
        }

        self.with_handle(|conn| {
            conn.set_update_hook(None);
            Ok(())
        })?;

        hooks.update = None;
        Ok(())
    }

    pub(crate) fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();

        if !self.commit_listeners.add(Arc::clone(&listener)) {
            return Ok(());
        }

        let on_commit = Arc::clone(&self.commit_listeners);
        let commit = self.callbacks.register(Callback::Commit(Arc::new(move || {
            for listener in on_commit.snapshot() {
                listener.on_commit();
            }

            // listeners observe commits, they never veto them
            true
        })));

        let on_rollback = Arc::clone(&self.commit_listeners);
        let rollback = self.callbacks.register(Callback::Rollback(Arc::new(move || {
            for listener in on_rollback.snapshot() {
                listener.on_rollback();
            }
        })));

        if let Err(e) = self.with_handle(|conn| {
            conn.set_commit_hook(Some(&commit));
            conn.set_rollback_hook(Some(&rollback));
            Ok(())
        }) {
            self.commit_listeners.remove(&listener);
            return Err(e);
        }

        hooks.commit = Some(commit);
        hooks.rollback = Some(rollback);
        Ok(())
    }

    pub(crate) fn remove_commit_listener(
        &self,
        listener: &Arc<dyn CommitListener>,
    ) -> Result<(), Error> {
        let mut hooks = self.lock_hooks();

        if !self.commit_listeners.remove(listener) {
            return Ok(());
        }

        self.with_handle(|conn| {
            conn.set_commit_hook(None);
            conn.set_rollback_hook(None);
            Ok(())
        })?;

        hooks.commit = None;
        hooks.rollback = None;
        Ok(())
    }

    pub(crate) fn backup_to(
        &self,
        db_name: &str,
        path: &str,
        observer: &mut dyn FnMut(BackupProgress),
    ) -> Result<(), Error> {
        log::debug!("backing up {db_name:?} of {:?} to {path:?}", self.filename);

        self.with_handle(|conn| backup::backup_to_file(conn, db_name, path, observer))
    }

    pub(crate) fn restore_from(
        &self,
        db_name: &str,
        path: &str,
        observer: &mut dyn FnMut(BackupProgress),
    ) -> Result<(), Error> {
        log::debug!("restoring {db_name:?} of {:?} from {path:?}", self.filename);

        self.with_handle(|conn| backup::restore_from_file(conn, db_name, path, observer))
    }

    #[cfg(test)]
    pub(crate) fn tracked_statements(&self) -> usize {
        self.lock_statements().len()
    }

    #[cfg(test)]
    pub(crate) fn registered_callbacks(&self) -> usize {
        self.callbacks.len()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("error closing database on drop: {e}");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("filename", &self.filename)
            .field("handle", &self.handle)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Finalize a statement handle. Any code `sqlite3_finalize` returns only describes the last
/// evaluation; the handle is gone either way.
fn finalize_handle(statement: &StatementHandle) -> Result<(), Error> {
    statement.close(|_, raw| Ok(raw.finalize())).map(|_| ())
}

/// Bind a full row of parameters, positionally.
fn bind_all(raw: RawStatement, params: &[Value]) -> Result<(), Error> {
    let expected = raw.bind_parameter_count();

    if params.len() != expected {
        return Err(Error::ParameterCountMismatch {
            expected,
            actual: params.len(),
        });
    }

    // a statement that was stepped must be reset before it can be re-bound
    raw.reset();

    for (index, value) in params.iter().enumerate() {
        let status = raw.bind(index, value);

        if status != SQLITE_OK {
            return Err(raw.error_for(status).into());
        }
    }

    Ok(())
}

fn batch_error(
    entry: usize,
    message: impl std::fmt::Display,
    update_counts: &[i64],
    source: Option<Error>,
) -> Error {
    Error::BatchUpdate {
        message: format!("batch entry {entry}: {message}"),
        update_counts: update_counts.to_vec(),
        source: source.map(Box::new),
    }
}

fn truncate(sql: &str) -> String {
    match sql.char_indices().nth(SQL_IN_ERROR_LEN) {
        Some((end, _)) => format!("{}...", &sql[..end]),
        None => sql.to_owned(),
    }
}
