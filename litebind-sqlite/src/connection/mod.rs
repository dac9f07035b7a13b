use std::cmp::Ordering as CmpOrdering;
use std::fmt::{self, Debug, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use litebind_core::error::BoxDynError;
use litebind_core::Value;

use crate::database::Database;
use crate::error::Error;
use crate::native::{self, BackupProgress};
use crate::options::{SqliteConnectOptions, SqliteTransactionMode};
use crate::statement::{PreparedStatement, Statement};

pub(crate) mod collation;
mod establish;
pub(crate) mod function;
pub(crate) mod hooks;
mod limit;
mod savepoint;
#[cfg(feature = "load-extension")]
mod load_extension;
#[cfg(feature = "deserialize")]
mod serialize;

pub use collation::Collation;
pub use function::{Aggregate, FunctionFlags};
pub use hooks::{CommitListener, SqliteOperation, TraceEvent, UpdateListener};
pub use limit::SqliteLimit;
pub use savepoint::Savepoint;
#[cfg(feature = "deserialize")]
pub use serialize::{SqliteBufError, SqliteOwnedBuf};

use establish::EstablishParams;
use function::Function;

/// State shared between a connection and the statements created from it.
pub(crate) struct ConnectionInner {
    pub(crate) db: Database,
    auto_commit: AtomicBool,
    transaction_mode: SqliteTransactionMode,
    // last savepoint id handed out
    savepoints: AtomicU32,
    #[cfg_attr(not(feature = "load-extension"), allow(dead_code))]
    load_extension: bool,
}

impl ConnectionInner {
    pub(crate) fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::Acquire)
    }
}

/// A connection to a SQLite database.
///
/// Connections start in auto-commit mode: every statement that changes the database is
/// committed as soon as it completes. Turn auto-commit off with
/// [`set_auto_commit`][Self::set_auto_commit] to group statements into explicit transactions.
///
/// All calls are synchronous. A connection may be shared between threads, but a call that
/// finds the connection in use by another thread fails with [`Error::HandleBusy`] instead of
/// waiting.
pub struct SqliteConnection {
    inner: Arc<ConnectionInner>,
}

impl SqliteConnection {
    /// Open a connection from a URL such as `sqlite:data.db?mode=ro`.
    pub fn connect(url: &str) -> Result<Self, Error> {
        Self::connect_with(&url.parse()?)
    }

    pub fn connect_with(options: &SqliteConnectOptions) -> Result<Self, Error> {
        let params = EstablishParams::from_options(options)?;
        let db = params.establish()?;

        let pragmas = options.pragma_string();

        if !pragmas.is_empty() {
            db.exec_script(&pragmas)?;
        }

        for collation in &options.collations {
            collation.create(&db)?;
        }

        for function in &options.functions {
            function.create(&db)?;
        }

        Ok(Self {
            inner: Arc::new(ConnectionInner {
                db,
                auto_commit: AtomicBool::new(true),
                transaction_mode: options.transaction_mode,
                savepoints: AtomicU32::new(0),
                load_extension: options.load_extension,
            }),
        })
    }

    /// The filename the database was opened with.
    pub fn filename(&self) -> &str {
        self.inner.db.filename()
    }

    /// A statement for running ad-hoc SQL.
    pub fn create_statement(&self) -> Result<Statement, Error> {
        self.ensure_open()?;

        Ok(Statement::new(Arc::clone(&self.inner)))
    }

    /// Compile `sql` for repeated execution.
    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement, Error> {
        self.ensure_open()?;

        PreparedStatement::new(Arc::clone(&self.inner), sql)
    }

    /// Execute a single statement, discarding any rows it returns.
    ///
    /// Returns `true` if the statement produced a result set.
    pub fn execute(&self, sql: &str) -> Result<bool, Error> {
        let mut statement = self.create_statement()?;
        let produced_rows = statement.execute(sql)?;

        statement.close()?;

        Ok(produced_rows)
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.inner.db.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        Ok(())
    }

    pub fn auto_commit(&self) -> bool {
        self.inner.auto_commit()
    }

    /// Switch auto-commit mode.
    ///
    /// Turning it on commits the open transaction; turning it off opens one with the
    /// configured [`SqliteTransactionMode`]. Setting the current mode again does nothing.
    pub fn set_auto_commit(&self, auto_commit: bool) -> Result<(), Error> {
        self.ensure_open()?;

        if self.auto_commit() == auto_commit {
            return Ok(());
        }

        let sql = if auto_commit {
            "commit;"
        } else {
            self.inner.transaction_mode.begin_sql()
        };

        self.inner.db.exec(sql, false)?;
        self.inner.auto_commit.store(auto_commit, Ordering::Release);

        Ok(())
    }

    pub fn transaction_mode(&self) -> SqliteTransactionMode {
        self.inner.transaction_mode
    }

    /// Commit the open transaction and start the next one.
    pub fn commit(&self) -> Result<(), Error> {
        self.end_transaction("commit;")
    }

    /// Roll back the open transaction and start the next one.
    pub fn rollback(&self) -> Result<(), Error> {
        self.end_transaction("rollback;")
    }

    fn end_transaction(&self, sql: &str) -> Result<(), Error> {
        self.in_explicit_transaction()?;

        let db = &self.inner.db;

        db.exec(sql, false)?;
        db.exec(self.inner.transaction_mode.begin_sql(), false)
    }

    /// Mark a point in the open transaction, named `name` or numbered if `None`.
    ///
    /// In auto-commit mode this turns auto-commit off first, opening a transaction that
    /// [`commit`][Self::commit] or [`rollback`][Self::rollback] ends.
    pub fn set_savepoint(&self, name: Option<&str>) -> Result<Savepoint, Error> {
        self.ensure_open()?;
        self.set_auto_commit(false)?;

        let id = self.inner.savepoints.fetch_add(1, Ordering::AcqRel) + 1;
        let savepoint = Savepoint::new(id, name);

        self.inner.db.exec(&savepoint.savepoint_sql(), false)?;

        Ok(savepoint)
    }

    /// Forget `savepoint` and every savepoint set after it, keeping their changes.
    pub fn release_savepoint(&self, savepoint: &Savepoint) -> Result<(), Error> {
        self.in_explicit_transaction()?;
        self.inner.db.exec(&savepoint.release_sql(), false)
    }

    /// Undo every change made since `savepoint` was set. The savepoint itself stays.
    pub fn rollback_to_savepoint(&self, savepoint: &Savepoint) -> Result<(), Error> {
        self.in_explicit_transaction()?;
        self.inner.db.exec(&savepoint.rollback_sql(), false)
    }

    fn in_explicit_transaction(&self) -> Result<(), Error> {
        self.ensure_open()?;

        if self.auto_commit() {
            return Err(Error::AutoCommitMode);
        }

        Ok(())
    }

    /// Whether the database is inside a transaction right now.
    pub fn in_transaction(&self) -> Result<bool, Error> {
        self.inner.db.in_transaction()
    }

    /// Close the connection along with every statement still open on it.
    ///
    /// Fails with [`Error::HandleBusy`] and leaves the connection open if another thread is
    /// using it; the close can then be retried. Closing a closed connection does nothing.
    pub fn close(&self) -> Result<(), Error> {
        self.inner.db.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.db.is_closed()
    }

    /// Register a scalar SQL function, replacing any function with the same name and
    /// number of arguments.
    ///
    /// `n_args` of `-1` accepts any number of arguments. An error returned by `f` becomes
    /// the SQL error of the statement that called it.
    pub fn create_function<F>(
        &self,
        name: &str,
        n_args: i32,
        flags: FunctionFlags,
        f: F,
    ) -> Result<(), Error>
    where
        F: Fn(&[Value]) -> Result<Value, BoxDynError> + Send + Sync + 'static,
    {
        Function::scalar(name, n_args, flags, f).create(&self.inner.db)
    }

    /// Register an aggregate SQL function; `init` creates the state of each group.
    pub fn create_aggregate<A, F>(
        &self,
        name: &str,
        n_args: i32,
        flags: FunctionFlags,
        init: F,
    ) -> Result<(), Error>
    where
        A: Aggregate,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Function::aggregate(name, n_args, flags, init).create(&self.inner.db)
    }

    pub fn destroy_function(&self, name: &str, n_args: i32) -> Result<(), Error> {
        self.inner
            .db
            .destroy_function(&function::function_name(name)?, n_args)
    }

    /// Register a collating sequence for use in `COLLATE` clauses and indexes.
    pub fn create_collation<F>(&self, name: &str, collate: F) -> Result<(), Error>
    where
        F: Fn(&str, &str) -> CmpOrdering + Send + Sync + 'static,
    {
        Collation::new(name, collate).create(&self.inner.db)
    }

    pub fn destroy_collation(&self, name: &str) -> Result<(), Error> {
        self.inner
            .db
            .destroy_collation(&collation::collation_name(name)?)
    }

    /// Called with the number of prior calls whenever a table is locked; return `true` to
    /// try again or `false` to give up with `SQLITE_BUSY`.
    ///
    /// Replaces the busy timeout.
    pub fn set_busy_handler<F>(&self, handler: F) -> Result<(), Error>
    where
        F: Fn(i32) -> bool + Send + Sync + 'static,
    {
        self.inner.db.set_busy_handler(Some(Arc::new(handler)))
    }

    pub fn clear_busy_handler(&self) -> Result<(), Error> {
        self.inner.db.set_busy_handler(None)
    }

    /// Sleep up to `timeout` while a table is locked. Replaces the busy handler.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<(), Error> {
        let ms = i32::try_from(timeout.as_millis()).map_err(|_| {
            Error::Configuration(format!("busy timeout {timeout:?} is too large").into())
        })?;

        self.inner.db.busy_timeout(ms)
    }

    /// Call `handler` every `num_ops` virtual machine instructions of a running statement.
    /// Returning `false` interrupts the statement.
    pub fn set_progress_handler<F>(&self, num_ops: i32, handler: F) -> Result<(), Error>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.inner
            .db
            .set_progress_handler(num_ops, Some(Arc::new(handler)))
    }

    pub fn clear_progress_handler(&self) -> Result<(), Error> {
        self.inner.db.set_progress_handler(0, None)
    }

    /// Call `trace` with the text of every statement as it starts running.
    pub fn set_trace<F>(&self, trace: F) -> Result<(), Error>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.db.set_statement_trace(Some(Arc::new(trace)))
    }

    pub fn clear_trace(&self) -> Result<(), Error> {
        self.inner.db.set_statement_trace(None)
    }

    /// Call `profile` with the text and running time of every statement as it finishes.
    pub fn set_profile<F>(&self, profile: F) -> Result<(), Error>
    where
        F: Fn(&str, Duration) + Send + Sync + 'static,
    {
        self.inner.db.set_profile(Some(Arc::new(profile)))
    }

    pub fn clear_profile(&self) -> Result<(), Error> {
        self.inner.db.set_profile(None)
    }

    /// The first listener installs the native update hook.
    pub fn add_update_listener(&self, listener: Arc<dyn UpdateListener>) -> Result<(), Error> {
        self.inner.db.add_update_listener(listener)
    }

    /// Removing the last listener uninstalls the native update hook.
    pub fn remove_update_listener(&self, listener: &Arc<dyn UpdateListener>) -> Result<(), Error> {
        self.inner.db.remove_update_listener(listener)
    }

    pub fn add_commit_listener(&self, listener: Arc<dyn CommitListener>) -> Result<(), Error> {
        self.inner.db.add_commit_listener(listener)
    }

    pub fn remove_commit_listener(&self, listener: &Arc<dyn CommitListener>) -> Result<(), Error> {
        self.inner.db.remove_commit_listener(listener)
    }

    /// Abort any statement running on this connection at its earliest opportunity.
    ///
    /// May be called while another thread is inside a call on this connection.
    pub fn interrupt(&self) -> Result<(), Error> {
        self.inner.db.interrupt()
    }

    /// Rows changed by the most recent `INSERT`, `UPDATE` or `DELETE`.
    pub fn changes(&self) -> Result<i64, Error> {
        self.inner.db.changes()
    }

    /// Rows changed since the connection was opened.
    pub fn total_changes(&self) -> Result<i64, Error> {
        self.inner.db.total_changes()
    }

    pub fn last_insert_rowid(&self) -> Result<i64, Error> {
        self.inner.db.last_insert_rowid()
    }

    /// Set a run-time limit and return its previous value. A negative `value` leaves the
    /// limit unchanged.
    pub fn limit(&self, limit: SqliteLimit, value: i32) -> Result<i32, Error> {
        self.inner.db.limit(limit.id(), value)
    }

    /// Version of the SQLite library in use, such as `3.46.0`.
    pub fn libversion() -> &'static str {
        native::libversion()
    }

    /// Copy the database `db_name` (usually `main`) into the file at `path`.
    ///
    /// `observer` is told the remaining and total page counts after every step.
    pub fn backup_to(
        &self,
        db_name: &str,
        path: impl AsRef<Path>,
        mut observer: impl FnMut(BackupProgress),
    ) -> Result<(), Error> {
        self.inner
            .db
            .backup_to(db_name, path_str(path.as_ref())?, &mut observer)
    }

    /// Replace the database `db_name` with the contents of the file at `path`.
    pub fn restore_from(
        &self,
        db_name: &str,
        path: impl AsRef<Path>,
        mut observer: impl FnMut(BackupProgress),
    ) -> Result<(), Error> {
        self.inner
            .db
            .restore_from(db_name, path_str(path.as_ref())?, &mut observer)
    }

    /// Serialize the database `schema` (usually `main`) into a buffer.
    ///
    /// The buffer holds exactly the bytes of the database file on disk.
    #[cfg(feature = "deserialize")]
    pub fn serialize(&self, schema: &str) -> Result<SqliteOwnedBuf, Error> {
        serialize::serialize(&self.inner.db, schema)
    }

    /// Replace the database `schema` with the serialized database in `data`.
    #[cfg(feature = "deserialize")]
    pub fn deserialize(&self, schema: &str, data: &[u8], read_only: bool) -> Result<(), Error> {
        serialize::deserialize(&self.inner.db, schema, data, read_only)
    }

    /// Load a SQLite extension from the shared library at `path`.
    ///
    /// # Safety
    /// Loading an extension runs arbitrary native code inside this process.
    #[cfg(feature = "load-extension")]
    pub unsafe fn load_extension(&self, path: &str, entry_point: Option<&str>) -> Result<(), Error> {
        load_extension::load_extension(
            &self.inner.db,
            path,
            entry_point,
            self.inner.load_extension,
        )
    }
}

fn path_str(path: &Path) -> Result<&str, Error> {
    path.to_str().ok_or_else(|| {
        Error::Configuration(format!("path {path:?} is not valid UTF-8").into())
    })
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if let Err(e) = self.inner.db.close() {
            log::warn!("error closing connection to {:?}: {e}", self.inner.db.filename());
        }
    }
}

impl Debug for SqliteConnection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("filename", &self.inner.db.filename())
            .field("auto_commit", &self.auto_commit())
            .field("closed", &self.is_closed())
            .finish()
    }
}
