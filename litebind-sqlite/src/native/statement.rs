use std::ffi::{c_void, CStr};
use std::fmt;
use std::os::raw::{c_char, c_int};
use std::ptr::{self, NonNull};
use std::slice::from_raw_parts;

use libsqlite3_sys::{
    sqlite3, sqlite3_bind_blob64, sqlite3_bind_double, sqlite3_bind_int, sqlite3_bind_int64,
    sqlite3_bind_null, sqlite3_bind_parameter_count, sqlite3_bind_text64, sqlite3_changes,
    sqlite3_clear_bindings,
    sqlite3_column_blob, sqlite3_column_bytes, sqlite3_column_count,
    sqlite3_column_database_name, sqlite3_column_decltype, sqlite3_column_double,
    sqlite3_column_int, sqlite3_column_int64, sqlite3_column_name, sqlite3_column_origin_name,
    sqlite3_column_table_name, sqlite3_column_text, sqlite3_column_type, sqlite3_db_handle,
    sqlite3_finalize, sqlite3_reset, sqlite3_sql, sqlite3_step, sqlite3_stmt,
    sqlite3_table_column_metadata, SQLITE_BLOB, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_NULL,
    SQLITE_OK, SQLITE_TRANSIENT, SQLITE_UTF8,
};
use litebind_core::Value;

use crate::SqliteError;

/// Raw prepared statement handle.
///
/// Like [`RawConnection`], this is a plain pointer that is only touched from within its
/// [`SafeHandle`][litebind_core::SafeHandle]. Column and parameter indices are 0-based here.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RawStatement(NonNull<sqlite3_stmt>);

// access to SQLite3 statement handles are safe to send and share between threads
// as long as the `sqlite3_step` call is serialized.

unsafe impl Send for RawStatement {}
unsafe impl Sync for RawStatement {}

macro_rules! expect_ret_valid {
    ($fn_name:ident($($args:tt)*)) => {{
        let val = $fn_name($($args)*);

        TryFrom::try_from(val)
            // This likely means UB in SQLite itself or our usage of it;
            // signed integer overflow is UB in the C standard.
            .unwrap_or_else(|_| panic!("{}() returned invalid value: {val:?}", stringify!($fn_name)))
    }}
}

macro_rules! check_col_idx {
    ($idx:ident) => {
        c_int::try_from($idx).unwrap_or_else(|_| panic!("invalid column index: {}", $idx))
    };
}

/// Declared constraints of a result column, as reported by `sqlite3_table_column_metadata`.
///
/// All flags are `false` for columns that don't come straight from a table (expressions,
/// sub-queries, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    pub not_null: bool,
    pub primary_key: bool,
    pub auto_increment: bool,
}

impl RawStatement {
    pub(crate) fn new(ptr: NonNull<sqlite3_stmt>) -> Self {
        Self(ptr)
    }

    #[inline]
    fn as_ptr(self) -> *mut sqlite3_stmt {
        self.0.as_ptr()
    }

    #[inline]
    fn db_handle(self) -> *mut sqlite3 {
        // O(c) access to the connection handle for this statement handle
        // https://sqlite.org/c3ref/db_handle.html
        unsafe { sqlite3_db_handle(self.as_ptr()) }
    }

    /// Rows changed by the most recent statement completed on this statement's connection.
    pub(crate) fn changes(self) -> i64 {
        // https://sqlite.org/c3ref/changes.html
        i64::from(unsafe { sqlite3_changes(self.db_handle()) })
    }

    pub(crate) fn sql(self) -> String {
        // https://sqlite.org/c3ref/expanded_sql.html
        unsafe {
            let raw = sqlite3_sql(self.as_ptr());
            debug_assert!(!raw.is_null());

            CStr::from_ptr(raw).to_string_lossy().into_owned()
        }
    }

    #[inline]
    pub(crate) fn last_error(self) -> SqliteError {
        SqliteError::new(self.db_handle())
    }

    /// Error for the result code `code` returned by a call on this statement.
    ///
    /// The message is read from the connection; if the connection has since recorded a
    /// different code, the generic message for `code` is used instead.
    pub(crate) fn error_for(self, code: c_int) -> SqliteError {
        let err = self.last_error();

        if err.code() == code {
            err
        } else {
            SqliteError::from_code(code)
        }
    }

    /// Evaluate the statement once. Returns the raw result code.
    pub(crate) fn step(self) -> c_int {
        // https://sqlite.org/c3ref/step.html
        unsafe { sqlite3_step(self.as_ptr()) }
    }

    pub(crate) fn reset(self) -> c_int {
        // https://sqlite.org/c3ref/reset.html
        unsafe { sqlite3_reset(self.as_ptr()) }
    }

    /// Destroy the statement. The handle must not be used again, whatever this returns.
    pub(crate) fn finalize(self) -> c_int {
        // https://sqlite.org/c3ref/finalize.html
        unsafe { sqlite3_finalize(self.as_ptr()) }
    }

    pub(crate) fn clear_bindings(self) -> c_int {
        // https://sqlite.org/c3ref/clear_bindings.html
        unsafe { sqlite3_clear_bindings(self.as_ptr()) }
    }

    // Number Of SQL Parameters
    #[inline]
    pub(crate) fn bind_parameter_count(self) -> usize {
        // https://www.sqlite.org/c3ref/bind_parameter_count.html
        unsafe { expect_ret_valid!(sqlite3_bind_parameter_count(self.as_ptr())) }
    }

    // Binding Values To Prepared Statements
    // https://www.sqlite.org/c3ref/bind_blob.html

    /// Bind `value` to the 0-based parameter `index`.
    pub(crate) fn bind(self, index: usize, value: &Value) -> c_int {
        // parameters are 1-based in SQLite
        let index = index + 1;

        match value {
            Value::Null => self.bind_null(index),
            Value::Int(v) => self.bind_int(index, *v),
            Value::Long(v) => self.bind_int64(index, *v),
            Value::Double(v) => self.bind_double(index, *v),
            Value::Text(v) => self.bind_text(index, v),
            Value::Blob(v) => self.bind_blob(index, v),
        }
    }

    #[inline]
    fn bind_blob(self, index: usize, v: &[u8]) -> c_int {
        unsafe {
            sqlite3_bind_blob64(
                self.as_ptr(),
                check_col_idx!(index),
                v.as_ptr() as *const c_void,
                v.len() as u64,
                SQLITE_TRANSIENT(),
            )
        }
    }

    #[inline]
    fn bind_text(self, index: usize, v: &str) -> c_int {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let encoding = SQLITE_UTF8 as u8;

        unsafe {
            sqlite3_bind_text64(
                self.as_ptr(),
                check_col_idx!(index),
                v.as_ptr() as *const c_char,
                v.len() as u64,
                SQLITE_TRANSIENT(),
                encoding,
            )
        }
    }

    #[inline]
    fn bind_int(self, index: usize, v: i32) -> c_int {
        unsafe { sqlite3_bind_int(self.as_ptr(), check_col_idx!(index), v) }
    }

    #[inline]
    fn bind_int64(self, index: usize, v: i64) -> c_int {
        unsafe { sqlite3_bind_int64(self.as_ptr(), check_col_idx!(index), v) }
    }

    #[inline]
    fn bind_double(self, index: usize, v: f64) -> c_int {
        unsafe { sqlite3_bind_double(self.as_ptr(), check_col_idx!(index), v) }
    }

    #[inline]
    fn bind_null(self, index: usize) -> c_int {
        unsafe { sqlite3_bind_null(self.as_ptr(), check_col_idx!(index)) }
    }

    #[inline]
    pub(crate) fn column_count(self) -> usize {
        // https://sqlite.org/c3ref/column_count.html
        unsafe { expect_ret_valid!(sqlite3_column_count(self.as_ptr())) }
    }

    pub(crate) fn column_name(self, index: usize) -> String {
        // https://sqlite.org/c3ref/column_name.html
        unsafe {
            let name = sqlite3_column_name(self.as_ptr(), check_col_idx!(index));
            debug_assert!(!name.is_null());

            if name.is_null() {
                return String::new();
            }

            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }

    pub(crate) fn column_decltype(self, index: usize) -> Option<String> {
        // https://sqlite.org/c3ref/column_decltype.html
        unsafe {
            let decl = sqlite3_column_decltype(self.as_ptr(), check_col_idx!(index));
            if decl.is_null() {
                // If the Nth column of the result set is an expression or subquery,
                // then a NULL pointer is returned.
                return None;
            }

            Some(CStr::from_ptr(decl).to_string_lossy().into_owned())
        }
    }

    pub(crate) fn column_table_name(self, index: usize) -> Option<String> {
        // https://sqlite.org/c3ref/column_database_name.html
        unsafe {
            let name = sqlite3_column_table_name(self.as_ptr(), check_col_idx!(index));
            if name.is_null() {
                return None;
            }

            Some(CStr::from_ptr(name).to_string_lossy().into_owned())
        }
    }

    /// Declared constraints of every result column.
    pub(crate) fn column_flags(self) -> Vec<ColumnFlags> {
        (0..self.column_count())
            .map(|index| self.column_flags_at(index))
            .collect()
    }

    fn column_flags_at(self, index: usize) -> ColumnFlags {
        unsafe {
            let index = check_col_idx!(index);

            // https://sqlite.org/c3ref/column_database_name.html
            //
            // The returned strings are valid until the statement is finalized, re-prepared, or
            // the same information is requested again in a different encoding.
            let db_name = sqlite3_column_database_name(self.as_ptr(), index);
            let table_name = sqlite3_column_table_name(self.as_ptr(), index);
            let origin_name = sqlite3_column_origin_name(self.as_ptr(), index);

            if db_name.is_null() || table_name.is_null() || origin_name.is_null() {
                return ColumnFlags::default();
            }

            let mut not_null: c_int = 0;
            let mut primary_key: c_int = 0;
            let mut auto_increment: c_int = 0;

            // https://sqlite.org/c3ref/table_column_metadata.html
            let status = sqlite3_table_column_metadata(
                self.db_handle(),
                db_name,
                table_name,
                origin_name,
                // function docs state to provide NULL for return values you don't care about
                ptr::null_mut(),
                ptr::null_mut(),
                &mut not_null,
                &mut primary_key,
                &mut auto_increment,
            );

            if status != SQLITE_OK {
                return ColumnFlags::default();
            }

            ColumnFlags {
                not_null: not_null != 0,
                primary_key: primary_key != 0,
                auto_increment: auto_increment != 0,
            }
        }
    }

    // result values from the query
    // https://www.sqlite.org/c3ref/column_blob.html

    #[inline]
    pub(crate) fn column_type(self, index: usize) -> c_int {
        unsafe { sqlite3_column_type(self.as_ptr(), check_col_idx!(index)) }
    }

    #[inline]
    pub(crate) fn column_int(self, index: usize) -> i32 {
        unsafe { sqlite3_column_int(self.as_ptr(), check_col_idx!(index)) }
    }

    #[inline]
    pub(crate) fn column_int64(self, index: usize) -> i64 {
        unsafe { sqlite3_column_int64(self.as_ptr(), check_col_idx!(index)) }
    }

    #[inline]
    pub(crate) fn column_double(self, index: usize) -> f64 {
        unsafe { sqlite3_column_double(self.as_ptr(), check_col_idx!(index)) }
    }

    pub(crate) fn column_blob(self, index: usize) -> Option<Vec<u8>> {
        if self.column_type(index) == SQLITE_NULL {
            return None;
        }

        let ptr =
            unsafe { sqlite3_column_blob(self.as_ptr(), check_col_idx!(index)) } as *const u8;

        // `sqlite3_column_bytes` must come after the pointer is fetched
        let len: usize = unsafe {
            expect_ret_valid!(sqlite3_column_bytes(self.as_ptr(), check_col_idx!(index)))
        };

        if len == 0 || ptr.is_null() {
            // empty blobs are NULL
            return Some(Vec::new());
        }

        Some(unsafe { from_raw_parts(ptr, len) }.to_vec())
    }

    pub(crate) fn column_text(self, index: usize) -> Option<String> {
        if self.column_type(index) == SQLITE_NULL {
            return None;
        }

        let ptr = unsafe { sqlite3_column_text(self.as_ptr(), check_col_idx!(index)) };

        let len: usize = unsafe {
            expect_ret_valid!(sqlite3_column_bytes(self.as_ptr(), check_col_idx!(index)))
        };

        if len == 0 || ptr.is_null() {
            return Some(String::new());
        }

        let bytes = unsafe { from_raw_parts(ptr, len) };

        Some(String::from_utf8_lossy(bytes).into_owned())
    }

    /// The value of a column, typed by its storage class.
    pub(crate) fn column_value(self, index: usize) -> Value {
        match self.column_type(index) {
            SQLITE_INTEGER => Value::Long(self.column_int64(index)),
            SQLITE_FLOAT => Value::Double(self.column_double(index)),
            SQLITE_BLOB => self.column_blob(index).map_or(Value::Null, Value::Blob),
            SQLITE_NULL => Value::Null,
            // SQLITE_TEXT
            _ => self.column_text(index).map_or(Value::Null, Value::Text),
        }
    }
}

impl fmt::Debug for RawStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawStatement").field(&self.0).finish()
    }
}
