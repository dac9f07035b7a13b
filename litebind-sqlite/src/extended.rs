//! SQL-like commands handled by the binding itself instead of SQLite:
//!
//! ```text
//! backup [<database>] to <file>
//! restore [<database>] from <file>
//! ```
//!
//! Names may be bare, `"double quoted"` or `'single quoted'`; the database defaults to `main`.

use std::sync::LazyLock;

use libsqlite3_sys::SQLITE_ERROR;
use regex::{Captures, Regex};

use crate::error::Error;
use crate::SqliteError;

static BACKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^backup(?:\s+("[^"]*"|'[^']*'|\S+))?\s+to\s+("[^"]*"|'[^']*'|\S+)$"#)
        .expect("invalid backup pattern")
});

static RESTORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^restore(?:\s+("[^"]*"|'[^']*'|\S+))?\s+from\s+("[^"]*"|'[^']*'|\S+)$"#)
        .expect("invalid restore pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExtendedCommand {
    Backup { database: String, file: String },
    Restore { database: String, file: String },
}

impl ExtendedCommand {
    /// `Ok(None)` if `sql` is not an extended command at all.
    pub(crate) fn parse(sql: &str) -> Result<Option<Self>, Error> {
        let sql = sql.trim();

        if starts_with_ignore_case(sql, "backup") {
            let caps = BACKUP.captures(sql).ok_or_else(|| syntax_error(sql))?;
            let (database, file) = names(&caps);

            return Ok(Some(ExtendedCommand::Backup { database, file }));
        }

        if starts_with_ignore_case(sql, "restore") {
            let caps = RESTORE.captures(sql).ok_or_else(|| syntax_error(sql))?;
            let (database, file) = names(&caps);

            return Ok(Some(ExtendedCommand::Restore { database, file }));
        }

        Ok(None)
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

fn names(caps: &Captures<'_>) -> (String, String) {
    let database = caps
        .get(1)
        .map(|m| unquote(m.as_str()))
        .filter(|name| !name.is_empty())
        .unwrap_or("main");

    let file = caps.get(2).map_or("", |m| unquote(m.as_str()));

    (database.to_owned(), file.to_owned())
}

fn unquote(s: &str) -> &str {
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));

    if quoted {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn syntax_error(sql: &str) -> Error {
    SqliteError::from_code(SQLITE_ERROR)
        .with_message(format!("syntax error: {sql}"))
        .into()
}
