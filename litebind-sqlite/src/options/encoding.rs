use crate::error::Error;
use std::str::FromStr;

/// Text encoding of a new database. It can't be changed once the database exists.
///
/// [SQLite documentation]: https://www.sqlite.org/pragma.html#pragma_encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteEncoding {
    #[default]
    Utf8,
    Utf16,
    Utf16Le,
    Utf16Be,
}

impl SqliteEncoding {
    // quoted, it's a string literal in the pragma
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SqliteEncoding::Utf8 => "'UTF-8'",
            SqliteEncoding::Utf16 => "'UTF-16'",
            SqliteEncoding::Utf16Le => "'UTF-16le'",
            SqliteEncoding::Utf16Be => "'UTF-16be'",
        }
    }
}

impl FromStr for SqliteEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let unquoted = s.trim_matches(|c| c == '\'' || c == '"');

        Ok(match &*unquoted.to_ascii_lowercase() {
            "utf-8" | "utf8" => SqliteEncoding::Utf8,
            "utf-16" | "utf16" => SqliteEncoding::Utf16,
            "utf-16le" | "utf16le" => SqliteEncoding::Utf16Le,
            "utf-16be" | "utf16be" => SqliteEncoding::Utf16Be,

            _ => {
                return Err(Error::Configuration(
                    format!("unknown value {s:?} for `encoding`").into(),
                ));
            }
        })
    }
}
