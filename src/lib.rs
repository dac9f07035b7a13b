#![cfg_attr(docsrs, feature(doc_cfg))]
//! A synchronous SQLite client binding.
//!
//! ```rust,no_run
//! # fn main() -> litebind::Result<()> {
//! use litebind::SqliteConnection;
//!
//! let conn = SqliteConnection::connect("sqlite::memory:")?;
//! conn.execute("create table users (id integer primary key, name text not null)")?;
//!
//! let mut insert = conn.prepare("insert into users (name) values (?)")?;
//! insert.bind(1, "alice")?;
//! insert.execute_update()?;
//!
//! let mut select = conn.create_statement()?;
//! let mut rows = select.execute_query("select id, name from users")?;
//! while rows.next()? {
//!     println!("{} {:?}", rows.get_long(1)?, rows.get_string(2)?);
//! }
//! # Ok(())
//! # }
//! ```

// Modules
pub use litebind_core::{driver, error};

// Types
pub use litebind_core::driver::{Driver, DriverRegistry};
pub use litebind_core::error::{DatabaseError, ErrorKind};
pub use litebind_core::{Error, Result, SafeHandle, Value};

pub use litebind_sqlite::{
    Aggregate, BackupProgress, Collation, ColumnFlags, CommitListener, FunctionFlags,
    PreparedStatement, ResultSet, Savepoint, SqliteConnectOptions, SqliteConnection, SqliteDriver,
    SqliteError, SqliteErrorCode, SqliteErrorExt, SqliteLimit, SqliteOperation, Statement,
    StatementState, TraceEvent, UpdateListener,
};

/// Everything SQLite specific, including the pragma enums.
pub mod sqlite {
    pub use litebind_sqlite::*;
}

/// A registry with the SQLite driver registered.
///
/// ```rust,no_run
/// # fn main() -> litebind::Result<()> {
/// let conn = litebind::registry().connect("jdbc:sqlite:data.db")?;
/// # Ok(())
/// # }
/// ```
pub fn registry() -> DriverRegistry<SqliteConnection> {
    let mut registry = DriverRegistry::new();
    registry.register(SqliteDriver);
    registry
}
