use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use libsqlite3_sys::{SQLITE_DELETE, SQLITE_INSERT, SQLITE_UPDATE};

/// The kind of row change reported to an [`UpdateListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteOperation {
    Insert,
    Update,
    Delete,
    Unknown(i32),
}

impl From<i32> for SqliteOperation {
    fn from(value: i32) -> Self {
        match value {
            SQLITE_INSERT => SqliteOperation::Insert,
            SQLITE_UPDATE => SqliteOperation::Update,
            SQLITE_DELETE => SqliteOperation::Delete,
            code => SqliteOperation::Unknown(code),
        }
    }
}

/// Notified of every row inserted, updated or deleted in a rowid table.
///
/// Listeners run synchronously on the thread that executes the statement, while the statement
/// is still running: they must not use the connection that invoked them.
pub trait UpdateListener: Send + Sync + 'static {
    fn on_update(&self, operation: SqliteOperation, database: &str, table: &str, rowid: i64);
}

impl<F> UpdateListener for F
where
    F: Fn(SqliteOperation, &str, &str, i64) + Send + Sync + 'static,
{
    fn on_update(&self, operation: SqliteOperation, database: &str, table: &str, rowid: i64) {
        self(operation, database, table, rowid)
    }
}

/// Notified when a transaction commits or rolls back.
pub trait CommitListener: Send + Sync + 'static {
    fn on_commit(&self);

    fn on_rollback(&self);
}

/// One event delivered to a trace callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TraceEvent<'a> {
    /// A statement started running; the text is as prepared, without bound values.
    Statement(&'a str),
    /// A statement finished, with the wall-clock time it took.
    Profile { sql: &'a str, elapsed: Duration },
}

/// Registered listeners, compared by identity.
pub(crate) struct ListenerSet<T: ?Sized> {
    listeners: Mutex<Vec<Arc<T>>>,
}

impl<T: ?Sized> ListenerSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<T>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if this was the first listener.
    pub(crate) fn add(&self, listener: Arc<T>) -> bool {
        let mut listeners = self.lock();
        listeners.push(listener);
        listeners.len() == 1
    }

    /// Returns `true` if the last listener was just removed.
    pub(crate) fn remove(&self, listener: &Arc<T>) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();

        listeners.retain(|l| !same(l, listener));

        before > 0 && listeners.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// A copy of the current listeners, so dispatch never holds the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.lock().clone()
    }
}

impl<T: ?Sized> Debug for ListenerSet<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.lock().len())
            .finish()
    }
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    // compare data pointers only; vtable pointers of the same type may differ
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}
