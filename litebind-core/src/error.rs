//! Types for working with errors produced by litebind.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt::Display;
use std::io;
use std::result::Result as StdResult;
use std::sync::Arc;

/// A specialized `Result` type for litebind.
pub type Result<T, E = Error> = StdResult<T, E>;

// Convenience type alias for usage within litebind.
pub type BoxDynError = Box<dyn StdError + 'static + Send + Sync>;

/// Represents all the ways a method can fail within litebind.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Error occurred while parsing a connection string or applying connection options.
    #[error("error with configuration: {0}")]
    Configuration(#[source] BoxDynError),

    /// Error returned from the database.
    #[error("error returned from database: {0}")]
    Database(Box<dyn DatabaseError>),

    /// Error from the filesystem or the operating system.
    #[error("error communicating with the database: {0}")]
    Io(#[from] io::Error),

    /// Unexpected or invalid data encountered while talking to the engine.
    ///
    /// This should indicate there is a programming error in litebind or that the
    /// engine returned something it never documented.
    #[error("encountered unexpected or invalid data: {0}")]
    Protocol(String),

    /// A native handle was in use by another thread.
    ///
    /// Handles never block: contention is reported immediately and is never retried.
    #[error("{name} ptr is locked elsewhere")]
    HandleBusy { name: &'static str },

    /// A native handle was used after it had been closed.
    #[error("{name} is closed")]
    HandleClosed { name: &'static str },

    /// Closing a native handle failed.
    ///
    /// Every later attempt to close the same handle returns this error again, sharing `source`.
    #[error("failed to close {name}: {source}")]
    HandleClose {
        name: &'static str,

        #[source]
        source: Arc<Error>,
    },

    /// The connection has been closed.
    #[error("database connection closed")]
    ConnectionClosed,

    /// The result set has been closed, either explicitly, by exhaustion, or because its
    /// statement was closed or executed again.
    #[error("result set is closed")]
    ResultSetClosed,

    /// Column index was out of bounds.
    #[error("column index out of bounds: the len is {len}, but the index is {index}")]
    ColumnIndexOutOfBounds { index: usize, len: usize },

    /// No column found for the given name.
    #[error("no column found for name: {0}")]
    ColumnNotFound(String),

    /// Parameter index was out of bounds.
    #[error("parameter index out of bounds: the len is {len}, but the index is {index}")]
    ParameterIndexOutOfBounds { index: usize, len: usize },

    /// A parameter slot was never bound.
    #[error("parameter {index} was not bound")]
    UnboundParameter { index: usize },

    /// The number of supplied values does not match the statement's parameter count.
    #[error("expected {expected} parameters, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    /// An update was executed with a statement that produces rows.
    #[error("query returns results")]
    QueryReturnedRows,

    /// A query was executed with a statement that produces no result columns.
    #[error("query does not return results")]
    QueryReturnedNoRows,

    /// `commit` or `rollback` was called while the connection is in auto-commit mode.
    #[error("database in auto-commit mode")]
    AutoCommitMode,

    /// A batch aborted part-way.
    ///
    /// `update_counts` has one slot per queued entry; entries that were never reached are `0`.
    #[error("{message}")]
    BatchUpdate {
        message: String,
        update_counts: Vec<i64>,

        #[source]
        source: Option<Box<Error>>,
    },

    /// Error occurred while decoding a value.
    #[error("error occurred while decoding: {0}")]
    Decode(#[source] BoxDynError),
}

impl Error {
    pub fn into_database_error(self) -> Option<Box<dyn DatabaseError + 'static>> {
        match self {
            Error::Database(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_database_error(&self) -> Option<&(dyn DatabaseError + 'static)> {
        match self {
            Error::Database(err) => Some(&**err),
            Error::BatchUpdate {
                source: Some(source),
                ..
            } => source.as_database_error(),
            _ => None,
        }
    }

    #[inline]
    pub fn protocol(err: impl Display) -> Self {
        Error::Protocol(err.to_string())
    }

    #[inline]
    pub fn config(err: impl StdError + Send + Sync + 'static) -> Self {
        Error::Configuration(err.into())
    }
}

/// The error kind.
///
/// This enum is to be used to identify frequent errors that can be handled by the program.
/// Although it currently only supports constraint violations, the type may grow in the future.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Unique/primary key constraint violation.
    UniqueViolation,
    /// Foreign key constraint violation.
    ForeignKeyViolation,
    /// Not-null constraint violation.
    NotNullViolation,
    /// Check constraint violation.
    CheckViolation,
    /// An unmapped error.
    Other,
}

/// An error that was returned from the database.
pub trait DatabaseError: 'static + Send + Sync + StdError {
    /// The primary, human-readable error message.
    fn message(&self) -> &str;

    /// The database-specific error code.
    fn code(&self) -> Option<Cow<'_, str>> {
        None
    }

    #[doc(hidden)]
    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static);

    #[doc(hidden)]
    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static);

    #[doc(hidden)]
    fn into_error(self: Box<Self>) -> BoxDynError;

    /// Returns the kind of the error, if supported.
    fn kind(&self) -> ErrorKind;

    /// Returns whether the error kind is a violation of a unique/primary key constraint.
    fn is_unique_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::UniqueViolation)
    }

    /// Returns whether the error kind is a violation of a foreign key.
    fn is_foreign_key_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::ForeignKeyViolation)
    }

    /// Returns whether the error kind is a violation of a check.
    fn is_check_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::CheckViolation)
    }
}

impl dyn DatabaseError {
    /// Downcast a reference to this generic database error to a specific
    /// database error type.
    #[inline]
    pub fn try_downcast_ref<E: DatabaseError>(&self) -> Option<&E> {
        self.as_error().downcast_ref()
    }

    /// Downcast this generic database error to a specific database error type.
    #[inline]
    pub fn try_downcast<E: DatabaseError>(self: Box<Self>) -> StdResult<Box<E>, Box<Self>> {
        if self.as_error().is::<E>() {
            match self.into_error().downcast() {
                Ok(err) => Ok(err),
                // `is::<E>()` was just checked
                Err(_) => unreachable!("downcast failed after type check"),
            }
        } else {
            Err(self)
        }
    }
}

impl<E> From<E> for Error
where
    E: DatabaseError,
{
    #[inline]
    fn from(error: E) -> Self {
        Error::Database(Box::new(error))
    }
}

/// Format an error message as a `Protocol` error.
#[macro_export]
macro_rules! err_protocol {
    ($($fmt_args:tt)*) => {
        $crate::error::Error::Protocol(
            format!(
                "{} ({}:{})",
                // Note: the format string needs to be unmodified (e.g. by `concat!()`)
                // for implicit formatting arguments to work
                format_args!($($fmt_args)*),
                module_path!(),
                line!(),
            )
        )
    };
}
