use crate::error::Error;
use std::str::FromStr;

/// Where temporary tables and indices are kept.
///
/// Refer to [SQLite documentation] for details.
///
/// [SQLite documentation]: https://www.sqlite.org/pragma.html#pragma_temp_store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteTempStore {
    #[default]
    Default,
    File,
    Memory,
}

impl SqliteTempStore {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SqliteTempStore::Default => "DEFAULT",
            SqliteTempStore::File => "FILE",
            SqliteTempStore::Memory => "MEMORY",
        }
    }
}

impl FromStr for SqliteTempStore {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Ok(match &*s.to_ascii_lowercase() {
            "default" | "0" => SqliteTempStore::Default,
            "file" | "1" => SqliteTempStore::File,
            "memory" | "2" => SqliteTempStore::Memory,

            _ => {
                return Err(Error::Configuration(
                    format!("unknown value {s:?} for `temp_store`").into(),
                ));
            }
        })
    }
}
