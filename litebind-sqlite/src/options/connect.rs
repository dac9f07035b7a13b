use std::fmt::Write;

use crate::connection::SqliteConnection;
use crate::error::Error;
use crate::options::SqliteConnectOptions;

impl SqliteConnectOptions {
    /// Open a connection with these options.
    pub fn connect(&self) -> Result<SqliteConnection, Error> {
        SqliteConnection::connect_with(self)
    }

    /// Collect all `PRAGMA` commands into a single string
    pub(crate) fn pragma_string(&self) -> String {
        let mut string = String::new();

        for (key, value) in &self.pragmas {
            write!(string, "PRAGMA {key} = {value}; ").ok();
        }

        string
    }
}
