use std::borrow::Cow;
use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use litebind_core::error::BoxDynError;
use litebind_core::logger::LogSettings;
use litebind_core::Value;
use log::LevelFilter;

use crate::connection::collation::Collation;
use crate::connection::function::{Aggregate, Function, FunctionFlags};

mod connect;
mod encoding;
mod journal_mode;
mod locking_mode;
mod parse;
mod synchronous;
mod temp_store;
mod transaction_mode;

pub use encoding::SqliteEncoding;
pub use journal_mode::SqliteJournalMode;
pub use locking_mode::SqliteLockingMode;
pub use synchronous::SqliteSynchronous;
pub use temp_store::SqliteTempStore;
pub use transaction_mode::SqliteTransactionMode;

/// Options and flags which can be used to configure a SQLite connection.
///
/// A value of `SqliteConnectOptions` can be parsed from a connection URL:
///
/// | URL | Description |
/// | -- | -- |
/// `sqlite::memory:` | Open an in-memory database. |
/// `sqlite:data.db` | Open the file `data.db` in the current directory. |
/// `sqlite://data.db` | Open the file `data.db` in the current directory. |
/// `sqlite:///data.db` | Open the file `data.db` from the root (`/`) directory. |
/// `jdbc:sqlite:data.db` | Same as `sqlite:data.db`. |
/// `sqlite://data.db?mode=ro` | Open the file `data.db` for read-only access. |
/// `sqlite:data.db?journal_mode=wal&foreign_keys=on` | Set pragmas when connecting. |
///
/// # Example
///
/// ```rust,no_run
/// # use litebind_core::error::Error;
/// use litebind_sqlite::{SqliteConnectOptions, SqliteJournalMode};
/// use std::str::FromStr;
///
/// # fn main() -> Result<(), Error> {
/// let conn = SqliteConnectOptions::from_str("sqlite://data.db")?
///     .journal_mode(SqliteJournalMode::Wal)
///     .read_only(true)
///     .connect()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct SqliteConnectOptions {
    pub(crate) filename: Cow<'static, Path>,
    pub(crate) in_memory: bool,
    pub(crate) read_only: bool,
    pub(crate) create_if_missing: bool,
    pub(crate) shared_cache: bool,
    pub(crate) busy_timeout: Duration,
    pub(crate) load_extension: bool,
    pub(crate) immutable: bool,
    pub(crate) vfs: Option<Cow<'static, str>>,
    pub(crate) transaction_mode: SqliteTransactionMode,
    pub(crate) log_settings: LogSettings,
    pub(crate) pragmas: IndexMap<Cow<'static, str>, Cow<'static, str>>,
    pub(crate) collations: Vec<Collation>,
    pub(crate) functions: Vec<Function>,
}

impl Default for SqliteConnectOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl SqliteConnectOptions {
    /// Options for an in-memory database, created on demand, with no pragmas set.
    pub fn new() -> Self {
        Self {
            filename: Cow::Borrowed(Path::new(":memory:")),
            in_memory: false,
            read_only: false,
            create_if_missing: true,
            shared_cache: false,
            busy_timeout: Duration::from_millis(3000),
            load_extension: false,
            immutable: false,
            vfs: None,
            transaction_mode: SqliteTransactionMode::Deferred,
            log_settings: LogSettings::default(),
            pragmas: IndexMap::new(),
            collations: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Sets the name of the database file.
    pub fn filename(mut self, filename: impl AsRef<Path>) -> Self {
        self.filename = Cow::Owned(filename.as_ref().to_owned());
        self
    }

    pub fn get_filename(&self) -> &Path {
        &self.filename
    }

    /// Open a private in-memory database, ignoring the filename.
    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.in_memory || self.filename.as_os_str().is_empty() || self.filename == Path::new(":memory:")
    }

    /// Sets the [access mode](https://www.sqlite.org/c3ref/open.html) to open the database
    /// for read-only access.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Create the database file if it does not exist. On by default.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Set the [`SQLITE_OPEN_SHAREDCACHE` flag](https://sqlite.org/sharedcache.html).
    ///
    /// By default, this is disabled.
    pub fn shared_cache(mut self, on: bool) -> Self {
        self.shared_cache = on;
        self
    }

    /// Sets a timeout value to wait when the database is locked, before
    /// returning a busy timeout error.
    ///
    /// The default busy timeout is 3 seconds.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Allow `load_extension()` on the connection (C API only, not the SQL function).
    pub fn load_extension(mut self, enabled: bool) -> Self {
        self.load_extension = enabled;
        self
    }

    /// Mark the database file as unchangeable by anyone, which skips all locking.
    pub fn immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    /// Use the named [VFS](https://www.sqlite.org/vfs.html) instead of the default one.
    pub fn vfs(mut self, vfs_name: impl Into<Cow<'static, str>>) -> Self {
        self.vfs = Some(vfs_name.into());
        self
    }

    /// How `set_auto_commit(false)` and `commit()`/`rollback()` open the next transaction.
    pub fn transaction_mode(mut self, mode: SqliteTransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    pub fn get_transaction_mode(&self) -> SqliteTransactionMode {
        self.transaction_mode
    }

    /// Log every statement at `level`. The default is `Debug`.
    pub fn log_statements(mut self, level: LevelFilter) -> Self {
        self.log_settings.log_statements(level);
        self
    }

    /// Log statements that take longer than `duration` at `level` instead.
    pub fn log_slow_statements(mut self, level: LevelFilter, duration: Duration) -> Self {
        self.log_settings.log_slow_statements(level, duration);
        self
    }

    /// Register a collating sequence on every connection opened with these options.
    pub fn collation<N, F>(mut self, name: N, collate: F) -> Self
    where
        N: Into<std::sync::Arc<str>>,
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.collations.push(Collation::new(name, collate));
        self
    }

    /// Register a scalar SQL function on every connection opened with these options.
    ///
    /// `n_args` of `-1` accepts any number of arguments.
    pub fn function<F>(mut self, name: &str, n_args: i32, flags: FunctionFlags, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BoxDynError> + Send + Sync + 'static,
    {
        self.functions.push(Function::scalar(name, n_args, flags, f));
        self
    }

    /// Register an aggregate SQL function on every connection opened with these options.
    pub fn aggregate<A, F>(mut self, name: &str, n_args: i32, flags: FunctionFlags, init: F) -> Self
    where
        A: Aggregate,
        F: Fn() -> A + Send + Sync + 'static,
    {
        self.functions
            .push(Function::aggregate(name, n_args, flags, init));
        self
    }

    /// Sets custom initial pragma for the database connection.
    ///
    /// Pragmas run in the order they were first set; setting one again replaces its value.
    pub fn pragma<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: Into<Cow<'static, str>>,
    {
        self.pragmas.insert(key.into(), value.into());
        self
    }

    pub fn get_pragma(&self, key: &str) -> Option<&str> {
        self.pragmas.get(key).map(|value| &**value)
    }

    /// Sets the [page cache size](https://www.sqlite.org/pragma.html#pragma_cache_size).
    ///
    /// Positive values are pages, negative values are KiB.
    pub fn cache_size(self, size: i64) -> Self {
        self.pragma("cache_size", size.to_string())
    }

    /// Sets the [journal mode](https://www.sqlite.org/pragma.html#pragma_journal_mode) for the database connection.
    pub fn journal_mode(self, mode: SqliteJournalMode) -> Self {
        self.pragma("journal_mode", mode.as_str())
    }

    /// Sets the [synchronous](https://www.sqlite.org/pragma.html#pragma_synchronous) setting for the database connection.
    pub fn synchronous(self, synchronous: SqliteSynchronous) -> Self {
        self.pragma("synchronous", synchronous.as_str())
    }

    /// Sets the [locking mode](https://www.sqlite.org/pragma.html#pragma_locking_mode) for the database connection.
    pub fn locking_mode(self, mode: SqliteLockingMode) -> Self {
        self.pragma("locking_mode", mode.as_str())
    }

    /// Set the enforcement of [foreign key constraints](https://www.sqlite.org/pragma.html#pragma_foreign_keys).
    pub fn foreign_keys(self, on: bool) -> Self {
        self.pragma("foreign_keys", on_off(on))
    }

    pub fn temp_store(self, store: SqliteTempStore) -> Self {
        self.pragma("temp_store", store.as_str())
    }

    /// Only has an effect on a database that doesn't exist yet.
    pub fn encoding(self, encoding: SqliteEncoding) -> Self {
        self.pragma("encoding", encoding.as_str())
    }

    /// Sets the [page_size](https://www.sqlite.org/pragma.html#pragma_page_size) setting for the database connection.
    ///
    /// Only has an effect before the database is first written to.
    pub fn page_size(self, page_size: u32) -> Self {
        self.pragma("page_size", page_size.to_string())
    }

    pub fn user_version(self, version: i32) -> Self {
        self.pragma("user_version", version.to_string())
    }

    pub fn case_sensitive_like(self, on: bool) -> Self {
        self.pragma("case_sensitive_like", on_off(on))
    }

    pub fn recursive_triggers(self, on: bool) -> Self {
        self.pragma("recursive_triggers", on_off(on))
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
