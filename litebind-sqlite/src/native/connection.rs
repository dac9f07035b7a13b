use std::ffi::{c_int, c_uint, c_void, CStr, CString};
use std::ptr::{self, NonNull};
use std::{fmt, io};

use libsqlite3_sys::{
    sqlite3, sqlite3_busy_handler, sqlite3_busy_timeout, sqlite3_changes, sqlite3_close,
    sqlite3_commit_hook, sqlite3_create_collation_v2, sqlite3_create_function_v2,
    sqlite3_db_config, sqlite3_exec, sqlite3_extended_result_codes, sqlite3_get_autocommit,
    sqlite3_interrupt, sqlite3_last_insert_rowid, sqlite3_libversion, sqlite3_limit,
    sqlite3_open_v2, sqlite3_prepare_v2, sqlite3_progress_handler, sqlite3_rollback_hook,
    sqlite3_total_changes, sqlite3_trace_v2, sqlite3_update_hook,
    SQLITE_DBCONFIG_ENABLE_LOAD_EXTENSION, SQLITE_DETERMINISTIC, SQLITE_OK, SQLITE_UTF8,
};

use crate::error::Error;
use crate::native::callback::{self, CallbackSlot};
use crate::native::RawStatement;
use crate::SqliteError;

/// Raw SQLite3 database handle.
///
/// This is a plain pointer: it is neither closed on drop nor protected against concurrent use.
/// It only ever lives inside a [`SafeHandle`][litebind_core::SafeHandle], and every method here
/// must be called from within `SafeHandle::run` so that the pointer is known to be open and
/// exclusively held. The one exception is [`interrupt`][Self::interrupt].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawConnection(NonNull<sqlite3>);

// A SQLite3 handle is safe to send between threads, provided not more than one is accessing it
// at the same time. `SafeHandle` upholds that; the handle is additionally opened with
// [SQLITE_OPEN_FULLMUTEX].
//
// <https://www.sqlite.org/c3ref/threadsafe.html>
unsafe impl Send for RawConnection {}
unsafe impl Sync for RawConnection {}

impl RawConnection {
    pub(crate) fn open(filename: &CStr, flags: c_int) -> Result<Self, Error> {
        let mut handle = ptr::null_mut();

        // <https://www.sqlite.org/c3ref/open.html>
        let status = unsafe { sqlite3_open_v2(filename.as_ptr(), &mut handle, flags, ptr::null()) };

        // SAFETY: the database is still initialized as long as the pointer is not `NULL`.
        // We need to close it even if there's an error.
        let handle = Self(NonNull::new(handle).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "SQLite is unable to allocate memory to hold the sqlite3 object",
            ))
        })?);

        if status != SQLITE_OK {
            let err = handle.last_error();
            let message = format!(
                "opening db: '{}': {}",
                filename.to_string_lossy(),
                err.message()
            );

            handle.close();

            return Err(err.with_message(message).into());
        }

        // Enable extended result codes
        // https://www.sqlite.org/c3ref/extended_result_codes.html
        unsafe {
            // This only returns a non-OK code if SQLite is built with `SQLITE_ENABLE_API_ARMOR`
            // and the database pointer is `NULL` or already closed, neither of which is possible
            // here.
            sqlite3_extended_result_codes(handle.as_ptr(), 1);
        }

        Ok(handle)
    }

    /// Close the handle. Returns `SQLITE_BUSY` if statements are still unfinalized.
    pub(crate) fn close(self) -> c_int {
        // https://sqlite.org/c3ref/close.html
        unsafe { sqlite3_close(self.as_ptr()) }
    }

    #[inline]
    pub(crate) fn as_ptr(self) -> *mut sqlite3 {
        self.0.as_ptr()
    }

    pub(crate) fn last_error(self) -> SqliteError {
        SqliteError::new(self.as_ptr())
    }

    pub(crate) fn call_with_result(
        self,
        call: impl FnOnce(*mut sqlite3) -> c_int,
    ) -> Result<(), SqliteError> {
        if call(self.as_ptr()) == SQLITE_OK {
            Ok(())
        } else {
            Err(self.last_error())
        }
    }

    /// Compile the first statement in `sql`. Anything after it is ignored.
    ///
    /// Returns `Ok(None)` if `sql` holds no statement at all (only whitespace or comments).
    pub(crate) fn prepare(self, sql: &str) -> Result<Option<RawStatement>, SqliteError> {
        let len = c_int::try_from(sql.len()).map_err(|_| {
            SqliteError::from_code(libsqlite3_sys::SQLITE_TOOBIG)
                .with_message("statement is too large")
        })?;

        let mut statement_handle = ptr::null_mut();
        let mut tail = ptr::null();

        // https://www.sqlite.org/c3ref/prepare.html
        let status = unsafe {
            sqlite3_prepare_v2(
                self.as_ptr(),
                sql.as_ptr().cast(),
                len,
                &mut statement_handle,
                &mut tail,
            )
        };

        if status != SQLITE_OK {
            return Err(self.last_error());
        }

        Ok(NonNull::new(statement_handle).map(RawStatement::new))
    }

    /// Run every statement in `sql`, discarding rows.
    pub(crate) fn exec(self, sql: &str) -> Result<(), Error> {
        let sql = CString::new(sql).map_err(|_| err_protocol!("query contains nul bytes"))?;

        // SAFETY: we have exclusive access to the database handle
        let status = unsafe {
            sqlite3_exec(
                self.as_ptr(),
                sql.as_ptr(),
                // callback if we wanted result rows
                None,
                // callback data
                ptr::null_mut(),
                // out-pointer for the error message, we just use `SqliteError::new()`
                ptr::null_mut(),
            )
        };

        if status == SQLITE_OK {
            Ok(())
        } else {
            Err(self.last_error().into())
        }
    }

    /// Rows changed by the most recently completed INSERT, UPDATE or DELETE.
    pub(crate) fn changes(self) -> i64 {
        // https://sqlite.org/c3ref/changes.html
        i64::from(unsafe { sqlite3_changes(self.as_ptr()) })
    }

    pub(crate) fn total_changes(self) -> i64 {
        // https://sqlite.org/c3ref/total_changes.html
        i64::from(unsafe { sqlite3_total_changes(self.as_ptr()) })
    }

    pub(crate) fn in_transaction(self) -> bool {
        // https://sqlite.org/c3ref/get_autocommit.html
        unsafe { sqlite3_get_autocommit(self.as_ptr()) == 0 }
    }

    pub(crate) fn last_insert_rowid(self) -> i64 {
        unsafe { sqlite3_last_insert_rowid(self.as_ptr()) }
    }

    pub(crate) fn busy_timeout(self, ms: c_int) -> Result<(), SqliteError> {
        // https://sqlite.org/c3ref/busy_timeout.html
        self.call_with_result(|db| unsafe { sqlite3_busy_timeout(db, ms) })
    }

    /// Abort any pending operation on the connection.
    ///
    /// Safe to call from any thread while another thread is inside a call on this handle, but
    /// not after the handle has been closed.
    pub(crate) fn interrupt(self) {
        // https://sqlite.org/c3ref/interrupt.html
        unsafe { sqlite3_interrupt(self.as_ptr()) }
    }

    /// `true` enables *just* `sqlite3_load_extension`, false disables *all* extension loading.
    pub(crate) fn enable_load_extension(self, enabled: bool) -> Result<(), SqliteError> {
        // <https://www.sqlite.org/c3ref/c_dbconfig_defensive.html#sqlitedbconfigenableloadextension>
        self.call_with_result(|db| unsafe {
            sqlite3_db_config(
                db,
                SQLITE_DBCONFIG_ENABLE_LOAD_EXTENSION,
                c_int::from(enabled),
                ptr::null_mut::<c_int>(),
            )
        })
    }

    /// Set a run-time limit, returning the previous value. A negative `value` only queries.
    pub(crate) fn limit(self, id: c_int, value: c_int) -> c_int {
        // https://sqlite.org/c3ref/limit.html
        unsafe { sqlite3_limit(self.as_ptr(), id, value) }
    }

    /// Register a scalar (`aggregate == false`) or aggregate function bound to `slot`.
    ///
    /// SQLite owns `slot` from here on; it is released through the destroy callback, which
    /// SQLite also invokes when registration fails.
    pub(crate) fn create_function(
        self,
        name: &CStr,
        n_args: c_int,
        deterministic: bool,
        aggregate: bool,
        slot: Box<CallbackSlot>,
    ) -> Result<(), SqliteError> {
        let flags = if deterministic {
            SQLITE_UTF8 | SQLITE_DETERMINISTIC
        } else {
            SQLITE_UTF8
        };

        let (func, step, fin) = if aggregate {
            (
                None,
                Some(callback::call_aggregate_step as unsafe extern "C" fn(_, _, _)),
                Some(callback::call_aggregate_final as unsafe extern "C" fn(_)),
            )
        } else {
            (
                Some(callback::call_scalar as unsafe extern "C" fn(_, _, _)),
                None,
                None,
            )
        };

        // https://www.sqlite.org/c3ref/create_function.html
        self.call_with_result(|db| unsafe {
            sqlite3_create_function_v2(
                db,
                name.as_ptr(),
                n_args,
                flags,
                Box::into_raw(slot).cast(),
                func,
                step,
                fin,
                Some(callback::destroy_slot),
            )
        })
    }

    /// Remove a function; SQLite releases the slot of the old registration.
    pub(crate) fn destroy_function(self, name: &CStr, n_args: c_int) -> Result<(), SqliteError> {
        self.call_with_result(|db| unsafe {
            sqlite3_create_function_v2(
                db,
                name.as_ptr(),
                n_args,
                SQLITE_UTF8,
                ptr::null_mut(),
                None,
                None,
                None,
                None,
            )
        })
    }

    pub(crate) fn create_collation(
        self,
        name: &CStr,
        slot: Box<CallbackSlot>,
    ) -> Result<(), SqliteError> {
        let raw = Box::into_raw(slot);

        // https://www.sqlite.org/c3ref/create_collation.html
        let r = self.call_with_result(|db| unsafe {
            sqlite3_create_collation_v2(
                db,
                name.as_ptr(),
                SQLITE_UTF8,
                raw.cast(),
                Some(callback::call_collation),
                Some(callback::destroy_slot),
            )
        });

        if r.is_err() {
            // The xDestroy callback is not called if sqlite3_create_collation_v2() fails.
            unsafe { callback::destroy_slot(raw.cast()) };
        }

        r
    }

    pub(crate) fn destroy_collation(self, name: &CStr) -> Result<(), SqliteError> {
        self.call_with_result(|db| unsafe {
            sqlite3_create_collation_v2(db, name.as_ptr(), SQLITE_UTF8, ptr::null_mut(), None, None)
        })
    }

    // The hooks below don't take ownership of the slot; the caller keeps it alive until the
    // hook is replaced or the connection is closed.

    pub(crate) fn set_update_hook(self, slot: Option<&CallbackSlot>) {
        // https://www.sqlite.org/c3ref/update_hook.html
        unsafe {
            match slot {
                Some(slot) => sqlite3_update_hook(
                    self.as_ptr(),
                    Some(callback::call_update_hook),
                    slot.as_user_data(),
                ),
                None => sqlite3_update_hook(self.as_ptr(), None, ptr::null_mut()),
            };
        }
    }

    pub(crate) fn set_commit_hook(self, slot: Option<&CallbackSlot>) {
        // https://www.sqlite.org/c3ref/commit_hook.html
        unsafe {
            match slot {
                Some(slot) => sqlite3_commit_hook(
                    self.as_ptr(),
                    Some(callback::call_commit_hook),
                    slot.as_user_data(),
                ),
                None => sqlite3_commit_hook(self.as_ptr(), None, ptr::null_mut()),
            };
        }
    }

    pub(crate) fn set_rollback_hook(self, slot: Option<&CallbackSlot>) {
        unsafe {
            match slot {
                Some(slot) => sqlite3_rollback_hook(
                    self.as_ptr(),
                    Some(callback::call_rollback_hook),
                    slot.as_user_data(),
                ),
                None => sqlite3_rollback_hook(self.as_ptr(), None, ptr::null_mut()),
            };
        }
    }

    pub(crate) fn set_busy_handler(self, slot: Option<&CallbackSlot>) -> Result<(), SqliteError> {
        // https://www.sqlite.org/c3ref/busy_handler.html
        self.call_with_result(|db| unsafe {
            match slot {
                Some(slot) => {
                    sqlite3_busy_handler(db, Some(callback::call_busy_handler), slot.as_user_data())
                }
                None => sqlite3_busy_handler(db, None, ptr::null_mut()),
            }
        })
    }

    pub(crate) fn set_progress_handler(self, num_ops: c_int, slot: Option<&CallbackSlot>) {
        // https://www.sqlite.org/c3ref/progress_handler.html
        unsafe {
            match slot {
                Some(slot) => sqlite3_progress_handler(
                    self.as_ptr(),
                    num_ops,
                    Some(callback::call_progress_handler),
                    slot.as_user_data(),
                ),
                None => sqlite3_progress_handler(self.as_ptr(), 0, None, ptr::null_mut()),
            }
        }
    }

    pub(crate) fn set_trace(self, mask: c_uint, slot: Option<&CallbackSlot>) -> Result<(), SqliteError> {
        // https://www.sqlite.org/c3ref/trace_v2.html
        self.call_with_result(|db| unsafe {
            match slot {
                Some(slot) => sqlite3_trace_v2(
                    db,
                    mask,
                    Some(callback::call_trace),
                    slot.as_user_data(),
                ),
                None => sqlite3_trace_v2(db, 0, None, ptr::null_mut::<c_void>()),
            }
        })
    }
}

impl fmt::Debug for RawConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawConnection").field(&self.0).finish()
    }
}

/// The version string of the linked SQLite library, e.g. `3.46.0`.
pub(crate) fn libversion() -> &'static str {
    // https://www.sqlite.org/c3ref/libversion.html
    unsafe {
        let version = sqlite3_libversion();
        debug_assert!(!version.is_null());

        CStr::from_ptr(version).to_str().unwrap_or("unknown")
    }
}
