//! **SQLite** client binding.
//!
//! ### Note: linkage is semver-exempt.
//! This crate uses the `libsqlite3-sys` crate which links the native library for SQLite 3.
//! With the default `bundled` feature, SQLite is built and linked from source.
//!
//! Due to Cargo's requirement that only one version of a crate that links a given native library
//! exists in the dependency graph at a time, using litebind alongside another crate linking
//! `libsqlite3-sys` like `rusqlite` is a semver hazard. Pin both and upgrade them in lockstep.
//!
//! ### Dynamic linking
//! To dynamically link to a system SQLite library, use the `unbundled` feature instead.
//! Version `3.20.0` or newer is recommended.

// SQLite is a C library. All interactions require FFI which is unsafe.
// All unsafe blocks should have comments pointing to SQLite docs and ensuring that we maintain
// invariants.
#![allow(unsafe_code)]

#[macro_use]
extern crate litebind_core;

pub use connection::{
    Aggregate, Collation, CommitListener, FunctionFlags, Savepoint, SqliteConnection, SqliteLimit,
    SqliteOperation, TraceEvent, UpdateListener,
};
#[cfg(feature = "deserialize")]
pub use connection::{SqliteBufError, SqliteOwnedBuf};
pub use driver::SqliteDriver;
pub use error::{SqliteError, SqliteErrorCode, SqliteErrorExt};
pub use native::{BackupProgress, ColumnFlags};
pub use options::{
    SqliteConnectOptions, SqliteEncoding, SqliteJournalMode, SqliteLockingMode,
    SqliteSynchronous, SqliteTempStore, SqliteTransactionMode,
};
pub use result_set::ResultSet;
pub use statement::{PreparedStatement, Statement, StatementState};

mod connection;
mod database;
mod driver;
mod error;
mod extended;
mod native;
mod options;
mod result_set;
mod statement;
