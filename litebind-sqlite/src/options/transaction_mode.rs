use crate::error::Error;
use std::str::FromStr;

/// How the connection starts transactions when auto-commit is turned off.
///
/// Refer to [SQLite documentation] for the differences.
///
/// [SQLite documentation]: https://www.sqlite.org/lang_transaction.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteTransactionMode {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl SqliteTransactionMode {
    pub(crate) fn begin_sql(&self) -> &'static str {
        match self {
            SqliteTransactionMode::Deferred => "begin;",
            SqliteTransactionMode::Immediate => "begin immediate;",
            SqliteTransactionMode::Exclusive => "begin exclusive;",
        }
    }
}

impl FromStr for SqliteTransactionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match &*s.to_ascii_lowercase() {
            "deferred" => SqliteTransactionMode::Deferred,
            "immediate" => SqliteTransactionMode::Immediate,
            "exclusive" => SqliteTransactionMode::Exclusive,

            _ => {
                return Err(Error::Configuration(
                    format!("unknown value {s:?} for `transaction_mode`").into(),
                ));
            }
        })
    }
}
