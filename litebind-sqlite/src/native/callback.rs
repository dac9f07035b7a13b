//! Re-entry from SQLite into user callbacks.
//!
//! Every function, collation and hook registered on a connection is stored in that
//! connection's [`CallbackTable`] under an integer id. SQLite is handed a pointer to a
//! [`CallbackSlot`] (table + id), never to the closure itself. Each trampoline below resolves
//! the slot back to a cloned callback, releases the table lock, and only then runs user code,
//! with unwinding caught at the FFI boundary.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::fmt::{self, Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use std::{mem, ptr, slice};

use libsqlite3_sys::{
    sqlite3_aggregate_context, sqlite3_context, sqlite3_result_blob64, sqlite3_result_double,
    sqlite3_result_error, sqlite3_result_error_nomem, sqlite3_result_int, sqlite3_result_int64,
    sqlite3_result_null, sqlite3_result_text64, sqlite3_sql, sqlite3_stmt, sqlite3_user_data,
    sqlite3_value, sqlite3_value_blob, sqlite3_value_bytes, sqlite3_value_double,
    sqlite3_value_int64, sqlite3_value_text, sqlite3_value_type, SQLITE_BLOB, SQLITE_FLOAT,
    SQLITE_INTEGER, SQLITE_NULL, SQLITE_TRACE_PROFILE, SQLITE_TRACE_STMT, SQLITE_TRANSIENT,
    SQLITE_UTF8,
};
use litebind_core::error::BoxDynError;
use litebind_core::Value;

use crate::connection::function::Aggregate;
use crate::connection::hooks::{SqliteOperation, TraceEvent};
use crate::native::intmap::IntMap;

pub(crate) type ScalarFn = dyn Fn(&[Value]) -> Result<Value, BoxDynError> + Send + Sync;
pub(crate) type AggregateFactory = dyn Fn() -> Box<dyn Aggregate> + Send + Sync;
pub(crate) type CollationFn = dyn Fn(&str, &str) -> Ordering + Send + Sync;
pub(crate) type UpdateFn = dyn Fn(SqliteOperation, &str, &str, i64) + Send + Sync;
pub(crate) type CommitFn = dyn Fn() -> bool + Send + Sync;
pub(crate) type RollbackFn = dyn Fn() + Send + Sync;
pub(crate) type BusyFn = dyn Fn(i32) -> bool + Send + Sync;
pub(crate) type ProgressFn = dyn Fn() -> bool + Send + Sync;
pub(crate) type TraceFn = dyn Fn(TraceEvent<'_>) + Send + Sync;

#[derive(Clone)]
pub(crate) enum Callback {
    Scalar(Arc<ScalarFn>),
    Aggregate(Arc<AggregateFactory>),
    Collation(Arc<CollationFn>),
    Update(Arc<UpdateFn>),
    Commit(Arc<CommitFn>),
    Rollback(Arc<RollbackFn>),
    Busy(Arc<BusyFn>),
    Progress(Arc<ProgressFn>),
    Trace(Arc<TraceFn>),
}

impl Debug for Callback {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Callback::Scalar(_) => "Scalar",
            Callback::Aggregate(_) => "Aggregate",
            Callback::Collation(_) => "Collation",
            Callback::Update(_) => "Update",
            Callback::Commit(_) => "Commit",
            Callback::Rollback(_) => "Rollback",
            Callback::Busy(_) => "Busy",
            Callback::Progress(_) => "Progress",
            Callback::Trace(_) => "Trace",
        })
    }
}

/// Registered callbacks of one connection.
#[derive(Debug, Default)]
pub(crate) struct CallbackTable {
    entries: Mutex<IntMap<Callback>>,
}

impl CallbackTable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn entries(&self) -> MutexGuard<'_, IntMap<Callback>> {
        // user code never runs under this lock, so a poisoned lock still holds a valid map
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `callback` and return the slot SQLite will hand back to the trampolines.
    pub(crate) fn register(self: &Arc<Self>, callback: Callback) -> Box<CallbackSlot> {
        let id = self.entries().insert_vacant(callback);

        Box::new(CallbackSlot {
            table: Arc::downgrade(self),
            id,
        })
    }

    fn get(&self, id: i64) -> Option<Callback> {
        self.entries().get(id).cloned()
    }

    fn release(&self, id: i64) {
        self.entries().remove(id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Drop every callback. Only valid once the connection is closed.
    pub(crate) fn clear(&self) {
        self.entries().clear();
    }
}

/// The user-data pointer given to SQLite. Dropping the slot unregisters its callback.
#[derive(Debug)]
pub(crate) struct CallbackSlot {
    table: Weak<CallbackTable>,
    id: i64,
}

impl CallbackSlot {
    pub(crate) fn as_user_data(&self) -> *mut c_void {
        ptr::from_ref(self).cast_mut().cast()
    }
}

impl Drop for CallbackSlot {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.release(self.id);
        }
    }
}

/// The single lookup every trampoline goes through.
///
/// Returns `None` if the connection (and so its table) is gone or the callback was removed.
unsafe fn lookup(data: *mut c_void) -> Option<Callback> {
    if data.is_null() {
        return None;
    }

    // SAFETY: SQLite only hands back pointers we gave it, and the slot outlives the
    // registration it was given for
    let slot = &*(data as *const CallbackSlot);

    slot.table.upgrade()?.get(slot.id)
}

/// `xDestroy` for functions and collations; SQLite owns those slots.
pub(crate) unsafe extern "C" fn destroy_slot(data: *mut c_void) {
    if !data.is_null() {
        drop(Box::from_raw(data as *mut CallbackSlot));
    }
}

unsafe fn read_args(argc: c_int, argv: *mut *mut sqlite3_value) -> Vec<Value> {
    let argc = usize::try_from(argc).unwrap_or(0);

    if argc == 0 || argv.is_null() {
        return Vec::new();
    }

    slice::from_raw_parts(argv, argc)
        .iter()
        .map(|value| read_value(*value))
        .collect()
}

unsafe fn read_value(value: *mut sqlite3_value) -> Value {
    // https://www.sqlite.org/c3ref/value_blob.html
    match sqlite3_value_type(value) {
        SQLITE_NULL => Value::Null,
        SQLITE_INTEGER => Value::Long(sqlite3_value_int64(value)),
        SQLITE_FLOAT => Value::Double(sqlite3_value_double(value)),
        SQLITE_BLOB => {
            let ptr = sqlite3_value_blob(value) as *const u8;
            let len = usize::try_from(sqlite3_value_bytes(value)).unwrap_or(0);

            if ptr.is_null() || len == 0 {
                Value::Blob(Vec::new())
            } else {
                Value::Blob(slice::from_raw_parts(ptr, len).to_vec())
            }
        }
        // SQLITE_TEXT
        _ => {
            let ptr = sqlite3_value_text(value);
            let len = usize::try_from(sqlite3_value_bytes(value)).unwrap_or(0);

            if ptr.is_null() || len == 0 {
                Value::Text(String::new())
            } else {
                Value::Text(String::from_utf8_lossy(slice::from_raw_parts(ptr, len)).into_owned())
            }
        }
    }
}

unsafe fn set_result(ctx: *mut sqlite3_context, value: &Value) {
    // https://www.sqlite.org/c3ref/result_blob.html
    match value {
        Value::Null => sqlite3_result_null(ctx),
        Value::Int(v) => sqlite3_result_int(ctx, *v),
        Value::Long(v) => sqlite3_result_int64(ctx, *v),
        Value::Double(v) => sqlite3_result_double(ctx, *v),
        Value::Text(v) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let encoding = SQLITE_UTF8 as u8;

            sqlite3_result_text64(
                ctx,
                v.as_ptr() as *const c_char,
                v.len() as u64,
                SQLITE_TRANSIENT(),
                encoding,
            );
        }
        Value::Blob(v) => sqlite3_result_blob64(
            ctx,
            v.as_ptr() as *const c_void,
            v.len() as u64,
            SQLITE_TRANSIENT(),
        ),
    }
}

unsafe fn set_error(ctx: *mut sqlite3_context, message: &str) {
    // SQLite copies the message
    let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
    sqlite3_result_error(ctx, message.as_ptr() as *const c_char, len);
}

unsafe fn text<'a>(ptr: *const c_void, len: c_int) -> Cow<'a, str> {
    let len = usize::try_from(len).unwrap_or(0);

    if ptr.is_null() || len == 0 {
        return Cow::Borrowed("");
    }

    String::from_utf8_lossy(slice::from_raw_parts(ptr as *const u8, len))
}

pub(crate) unsafe extern "C" fn call_scalar(
    ctx: *mut sqlite3_context,
    argc: c_int,
    argv: *mut *mut sqlite3_value,
) {
    let Some(Callback::Scalar(func)) = lookup(sqlite3_user_data(ctx)) else {
        set_error(ctx, "function is no longer registered");
        return;
    };

    let args = read_args(argc, argv);

    match catch_unwind(AssertUnwindSafe(|| func(&args))) {
        Ok(Ok(value)) => set_result(ctx, &value),
        Ok(Err(e)) => set_error(ctx, &e.to_string()),
        Err(_) => {
            log::error!("user-defined function panicked");
            set_error(ctx, "user-defined function panicked");
        }
    }
}

// The aggregate context holds a single thin pointer to the boxed state; SQLite zeroes it on
// first use, which reads as "no state yet".
type AggregateState = *mut Box<dyn Aggregate>;

pub(crate) unsafe extern "C" fn call_aggregate_step(
    ctx: *mut sqlite3_context,
    argc: c_int,
    argv: *mut *mut sqlite3_value,
) {
    let Some(Callback::Aggregate(init)) = lookup(sqlite3_user_data(ctx)) else {
        set_error(ctx, "function is no longer registered");
        return;
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let size = mem::size_of::<AggregateState>() as c_int;

    // https://www.sqlite.org/c3ref/aggregate_context.html
    let state = sqlite3_aggregate_context(ctx, size) as *mut AggregateState;

    if state.is_null() {
        sqlite3_result_error_nomem(ctx);
        return;
    }

    let args = read_args(argc, argv);

    let r = catch_unwind(AssertUnwindSafe(|| {
        if (*state).is_null() {
            *state = Box::into_raw(Box::new(init()));
        }

        (**state).step(&args)
    }));

    match r {
        Ok(Ok(())) => {}
        Ok(Err(e)) => set_error(ctx, &e.to_string()),
        Err(_) => {
            log::error!("aggregate step panicked");
            set_error(ctx, "aggregate step panicked");
        }
    }
}

pub(crate) unsafe extern "C" fn call_aggregate_final(ctx: *mut sqlite3_context) {
    // passing 0 doesn't allocate; NULL means `step` never ran
    let state = sqlite3_aggregate_context(ctx, 0) as *mut AggregateState;

    // take ownership first so the state is freed whatever happens below
    let existing = if state.is_null() || (*state).is_null() {
        None
    } else {
        let boxed = Box::from_raw(*state);
        *state = ptr::null_mut();
        Some(*boxed)
    };

    let r = catch_unwind(AssertUnwindSafe(|| {
        let mut aggregate = match existing {
            Some(aggregate) => aggregate,
            None => match lookup(sqlite3_user_data(ctx)) {
                Some(Callback::Aggregate(init)) => init(),
                _ => return Err("function is no longer registered".into()),
            },
        };

        aggregate.finish()
    }));

    match r {
        Ok(Ok(value)) => set_result(ctx, &value),
        Ok(Err(e)) => set_error(ctx, &e.to_string()),
        Err(_) => {
            log::error!("aggregate finish panicked");
            set_error(ctx, "aggregate finish panicked");
        }
    }
}

pub(crate) unsafe extern "C" fn call_collation(
    data: *mut c_void,
    left_len: c_int,
    left_ptr: *const c_void,
    right_len: c_int,
    right_ptr: *const c_void,
) -> c_int {
    let r = catch_unwind(AssertUnwindSafe(|| {
        let Some(Callback::Collation(compare)) = lookup(data) else {
            return Ordering::Equal;
        };

        compare(&text(left_ptr, left_len), &text(right_ptr, right_len))
    }));

    match r.unwrap_or(Ordering::Equal) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub(crate) unsafe extern "C" fn call_update_hook(
    data: *mut c_void,
    op_code: c_int,
    database: *const c_char,
    table: *const c_char,
    rowid: i64,
) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let Some(Callback::Update(callback)) = lookup(data) else {
            return;
        };

        let operation: SqliteOperation = op_code.into();
        let database = CStr::from_ptr(database).to_str().unwrap_or_default();
        let table = CStr::from_ptr(table).to_str().unwrap_or_default();

        callback(operation, database, table, rowid);
    }));
}

/// Returns non-zero to turn the commit into a rollback.
pub(crate) unsafe extern "C" fn call_commit_hook(data: *mut c_void) -> c_int {
    let r = catch_unwind(AssertUnwindSafe(|| match lookup(data) {
        Some(Callback::Commit(callback)) => callback(),
        _ => true,
    }));

    c_int::from(!r.unwrap_or_default())
}

pub(crate) unsafe extern "C" fn call_rollback_hook(data: *mut c_void) {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        if let Some(Callback::Rollback(callback)) = lookup(data) {
            callback();
        }
    }));
}

/// Returns non-zero to have SQLite retry.
pub(crate) unsafe extern "C" fn call_busy_handler(data: *mut c_void, count: c_int) -> c_int {
    let r = catch_unwind(AssertUnwindSafe(|| match lookup(data) {
        Some(Callback::Busy(callback)) => callback(count),
        _ => false,
    }));

    c_int::from(r.unwrap_or_default())
}

/// Returns non-zero to interrupt the running statement.
pub(crate) unsafe extern "C" fn call_progress_handler(data: *mut c_void) -> c_int {
    let r = catch_unwind(AssertUnwindSafe(|| match lookup(data) {
        Some(Callback::Progress(callback)) => callback(),
        _ => true,
    }));

    c_int::from(!r.unwrap_or_default())
}

pub(crate) unsafe extern "C" fn call_trace(
    event: c_uint,
    data: *mut c_void,
    p: *mut c_void,
    x: *mut c_void,
) -> c_int {
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let Some(Callback::Trace(callback)) = lookup(data) else {
            return;
        };

        // https://www.sqlite.org/c3ref/c_trace.html
        #[allow(clippy::cast_sign_loss)]
        if event == SQLITE_TRACE_STMT as c_uint {
            if x.is_null() {
                return;
            }

            // the unexpanded text of the statement, or a `--` comment for trigger bodies
            let sql = CStr::from_ptr(x as *const c_char).to_string_lossy();
            callback(TraceEvent::Statement(&sql));
        } else if event == SQLITE_TRACE_PROFILE as c_uint {
            if p.is_null() || x.is_null() {
                return;
            }

            let raw = sqlite3_sql(p as *mut sqlite3_stmt);
            let sql = if raw.is_null() {
                Cow::Borrowed("")
            } else {
                CStr::from_ptr(raw).to_string_lossy()
            };

            let nanos = *(x as *const i64);
            let elapsed = Duration::from_nanos(u64::try_from(nanos).unwrap_or(0));

            callback(TraceEvent::Profile { sql: &sql, elapsed });
        }
    }));

    0
}
