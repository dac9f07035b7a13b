use litebind_core::driver::Driver;

use crate::connection::SqliteConnection;
use crate::error::Error;

/// Opens [`SqliteConnection`]s for `sqlite:` and `jdbc:sqlite:` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    type Connection = SqliteConnection;

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn accepts_url(&self, url: &str) -> bool {
        url.starts_with("sqlite:") || url.starts_with("jdbc:sqlite:")
    }

    fn connect(&self, url: &str) -> Result<SqliteConnection, Error> {
        SqliteConnection::connect(url)
    }
}
