//! The native call surface: thin wrappers over the SQLite C API.
//!
//! Nothing in here tracks lifetimes or serializes access; that is the job of
//! [`SafeHandle`][litebind_core::SafeHandle] and [`Database`][crate::database::Database].

pub(crate) mod backup;
pub(crate) mod callback;
mod connection;
pub(crate) mod intmap;
mod statement;

pub use backup::BackupProgress;
pub(crate) use connection::{libversion, RawConnection};
pub use statement::ColumnFlags;
pub(crate) use statement::RawStatement;
