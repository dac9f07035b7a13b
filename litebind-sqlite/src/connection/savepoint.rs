use std::fmt::{self, Display, Formatter};

/// A point inside the open transaction that can be rolled back to or released.
///
/// Created by [`SqliteConnection::set_savepoint`][crate::SqliteConnection::set_savepoint].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    id: u32,
    name: Option<String>,
}

impl Savepoint {
    pub(crate) fn new(id: u32, name: Option<&str>) -> Self {
        Self {
            id,
            name: name.map(str::to_owned),
        }
    }

    /// Sequence number of the savepoint on its connection, starting at `1`.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The given name, or `SQLITE_SAVEPOINT_<id>` for an unnamed savepoint.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("SQLITE_SAVEPOINT_{}", self.id),
        }
    }

    pub(crate) fn savepoint_sql(&self) -> String {
        format!("savepoint {};", quoted(&self.name()))
    }

    pub(crate) fn release_sql(&self) -> String {
        format!("release savepoint {};", quoted(&self.name()))
    }

    pub(crate) fn rollback_sql(&self) -> String {
        format!("rollback to savepoint {};", quoted(&self.name()))
    }
}

impl Display for Savepoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

// names are identifiers, so any character is fine once quoted
fn quoted(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
