use std::error::Error as StdError;
use std::ffi::CStr;
use std::fmt::{self, Display, Formatter};
use std::os::raw::c_int;
use std::borrow::Cow;

use libsqlite3_sys::{
    sqlite3, sqlite3_errmsg, sqlite3_errstr, sqlite3_extended_errcode, SQLITE_CONSTRAINT_CHECK,
    SQLITE_CONSTRAINT_FOREIGNKEY, SQLITE_CONSTRAINT_NOTNULL, SQLITE_CONSTRAINT_PRIMARYKEY,
    SQLITE_CONSTRAINT_UNIQUE,
};

pub(crate) use litebind_core::error::*;

/// The primary result codes of SQLite, plus [`Unknown`][Self::Unknown] for anything else.
///
/// Extended result codes map to their primary code (the low 8 bits).
///
/// <https://www.sqlite.org/rescode.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqliteErrorCode {
    Ok,
    Error,
    Internal,
    Perm,
    Abort,
    Busy,
    Locked,
    NoMem,
    ReadOnly,
    Interrupted,
    IoError,
    Corrupt,
    NotFound,
    Full,
    CantOpen,
    Protocol,
    Empty,
    SchemaChanged,
    TooBig,
    Constraint,
    Mismatch,
    Misuse,
    NoLfs,
    Auth,
    Format,
    Range,
    NotADatabase,
    Notice,
    Warning,
    Row,
    Done,
    Unknown,
}

impl SqliteErrorCode {
    /// Map any result code, primary or extended, to its kind. Never fails.
    pub fn from_code(code: c_int) -> Self {
        use SqliteErrorCode::*;

        if code < 0 {
            return Unknown;
        }

        match code & 0xff {
            0 => Ok,
            1 => Error,
            2 => Internal,
            3 => Perm,
            4 => Abort,
            5 => Busy,
            6 => Locked,
            7 => NoMem,
            8 => ReadOnly,
            9 => Interrupted,
            10 => IoError,
            11 => Corrupt,
            12 => NotFound,
            13 => Full,
            14 => CantOpen,
            15 => Protocol,
            16 => Empty,
            17 => SchemaChanged,
            18 => TooBig,
            19 => Constraint,
            20 => Mismatch,
            21 => Misuse,
            22 => NoLfs,
            23 => Auth,
            24 => Format,
            25 => Range,
            26 => NotADatabase,
            27 => Notice,
            28 => Warning,
            100 => Row,
            101 => Done,
            _ => Unknown,
        }
    }

    /// The C name of the primary code, e.g. `SQLITE_BUSY`.
    pub fn as_str(&self) -> &'static str {
        use SqliteErrorCode::*;

        match self {
            Ok => "SQLITE_OK",
            Error => "SQLITE_ERROR",
            Internal => "SQLITE_INTERNAL",
            Perm => "SQLITE_PERM",
            Abort => "SQLITE_ABORT",
            Busy => "SQLITE_BUSY",
            Locked => "SQLITE_LOCKED",
            NoMem => "SQLITE_NOMEM",
            ReadOnly => "SQLITE_READONLY",
            Interrupted => "SQLITE_INTERRUPT",
            IoError => "SQLITE_IOERR",
            Corrupt => "SQLITE_CORRUPT",
            NotFound => "SQLITE_NOTFOUND",
            Full => "SQLITE_FULL",
            CantOpen => "SQLITE_CANTOPEN",
            Protocol => "SQLITE_PROTOCOL",
            Empty => "SQLITE_EMPTY",
            SchemaChanged => "SQLITE_SCHEMA",
            TooBig => "SQLITE_TOOBIG",
            Constraint => "SQLITE_CONSTRAINT",
            Mismatch => "SQLITE_MISMATCH",
            Misuse => "SQLITE_MISUSE",
            NoLfs => "SQLITE_NOLFS",
            Auth => "SQLITE_AUTH",
            Format => "SQLITE_FORMAT",
            Range => "SQLITE_RANGE",
            NotADatabase => "SQLITE_NOTADB",
            Notice => "SQLITE_NOTICE",
            Warning => "SQLITE_WARNING",
            Row => "SQLITE_ROW",
            Done => "SQLITE_DONE",
            Unknown => "UNKNOWN",
        }
    }

    pub fn description(&self) -> &'static str {
        use SqliteErrorCode::*;

        match self {
            Ok => "Successful result",
            Error => "SQL error or missing database",
            Internal => "Internal logic error in SQLite",
            Perm => "Access permission denied",
            Abort => "Callback routine requested an abort",
            Busy => "The database file is locked",
            Locked => "A table in the database is locked",
            NoMem => "A malloc() failed",
            ReadOnly => "Attempt to write a readonly database",
            Interrupted => "Operation terminated by sqlite3_interrupt()",
            IoError => "Some kind of disk I/O error occurred",
            Corrupt => "The database disk image is malformed",
            NotFound => "NOT USED. Table or record not found",
            Full => "Insertion failed because database is full",
            CantOpen => "Unable to open the database file",
            Protocol => "NOT USED. Database lock protocol error",
            Empty => "Database is empty",
            SchemaChanged => "The database schema changed",
            TooBig => "String or BLOB exceeds size limit",
            Constraint => "Abort due to constraint violation",
            Mismatch => "Data type mismatch",
            Misuse => "Library used incorrectly",
            NoLfs => "Uses OS features not supported on host",
            Auth => "Authorization denied",
            Format => "Auxiliary database format error",
            Range => "2nd parameter to sqlite3_bind out of range",
            NotADatabase => "File opened that is not a database file",
            Notice => "Notifications from sqlite3_log()",
            Warning => "Warnings from sqlite3_log()",
            Row => "sqlite3_step() has another row ready",
            Done => "sqlite3_step() has finished executing",
            Unknown => "unknown error",
        }
    }

    /// Busy, locked, misuse and constraint failures leave the statement usable after a reset;
    /// every other failure finalizes it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SqliteErrorCode::Busy
                | SqliteErrorCode::Locked
                | SqliteErrorCode::Misuse
                | SqliteErrorCode::Constraint
        )
    }
}

impl Display for SqliteErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Error Codes And Messages
// https://www.sqlite.org/c3ref/errcode.html

#[derive(Debug, Clone)]
pub struct SqliteError {
    code: c_int,
    message: String,
}

impl SqliteError {
    /// The last error recorded on `handle`.
    pub(crate) fn new(handle: *mut sqlite3) -> Self {
        // returns the extended result code even when extended result codes are disabled
        let code: c_int = unsafe { sqlite3_extended_errcode(handle) };

        // return English-language text that describes the error
        let message = unsafe {
            let msg = sqlite3_errmsg(handle);
            debug_assert!(!msg.is_null());

            CStr::from_ptr(msg).to_string_lossy().into_owned()
        };

        Self { code, message }
    }

    /// An error for `code` that has no connection to read a message from.
    pub(crate) fn from_code(code: c_int) -> Self {
        // https://www.sqlite.org/c3ref/errcode.html
        let message = unsafe {
            let msg = sqlite3_errstr(code);

            if msg.is_null() {
                SqliteErrorCode::from_code(code).description().to_owned()
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        };

        Self { code, message }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// The (extended) result code.
    #[inline]
    pub fn code(&self) -> c_int {
        self.code
    }

    /// The primary code, mapped to its kind.
    #[inline]
    pub fn kind(&self) -> SqliteErrorCode {
        SqliteErrorCode::from_code(self.code)
    }

    /// The message reported by SQLite.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SqliteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // some codes produce ambiguous messages, so the code is always included:
        // SQLITE_BUSY: "database is locked"
        // SQLITE_LOCKED: "database table is locked"
        let kind = self.kind();

        write!(
            f,
            "[{}] {} (code {}): {}",
            kind.as_str(),
            kind.description(),
            self.code,
            self.message
        )
    }
}

impl StdError for SqliteError {}

impl DatabaseError for SqliteError {
    #[inline]
    fn message(&self) -> &str {
        &self.message
    }

    /// The extended result code.
    #[inline]
    fn code(&self) -> Option<Cow<'_, str>> {
        Some(format!("{}", self.code).into())
    }

    #[doc(hidden)]
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    #[doc(hidden)]
    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    #[doc(hidden)]
    fn into_error(self: Box<Self>) -> BoxDynError {
        self
    }

    fn kind(&self) -> ErrorKind {
        match self.code {
            SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => ErrorKind::UniqueViolation,
            SQLITE_CONSTRAINT_FOREIGNKEY => ErrorKind::ForeignKeyViolation,
            SQLITE_CONSTRAINT_NOTNULL => ErrorKind::NotNullViolation,
            SQLITE_CONSTRAINT_CHECK => ErrorKind::CheckViolation,
            _ => ErrorKind::Other,
        }
    }
}

/// Extension for getting at the SQLite specifics of a generic [`Error`].
pub trait SqliteErrorExt {
    /// The SQLite error behind this error, if there is one.
    fn as_sqlite_error(&self) -> Option<&SqliteError>;

    /// The kind of the SQLite error behind this error, if there is one.
    fn sqlite_code(&self) -> Option<SqliteErrorCode> {
        self.as_sqlite_error().map(SqliteError::kind)
    }
}

impl SqliteErrorExt for Error {
    fn as_sqlite_error(&self) -> Option<&SqliteError> {
        self.as_database_error()?.try_downcast_ref()
    }
}
