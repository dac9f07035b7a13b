use std::collections::BTreeMap;
use std::ffi::{c_int, CString};
use std::io;
use std::time::Duration;

use libsqlite3_sys::{
    SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_MEMORY,
    SQLITE_OPEN_PRIVATECACHE, SQLITE_OPEN_READONLY, SQLITE_OPEN_READWRITE,
    SQLITE_OPEN_SHAREDCACHE, SQLITE_OPEN_URI,
};
use litebind_core::logger::LogSettings;
use percent_encoding::NON_ALPHANUMERIC;

use crate::database::Database;
use crate::error::Error;
use crate::SqliteConnectOptions;

/// Everything needed to open the native connection, resolved from [`SqliteConnectOptions`].
#[derive(Debug)]
pub(crate) struct EstablishParams {
    filename: CString,
    open_flags: c_int,
    busy_timeout: Duration,
    load_extension: bool,
    log_settings: LogSettings,
}

impl EstablishParams {
    pub(crate) fn from_options(options: &SqliteConnectOptions) -> Result<Self, Error> {
        let mut filename = if options.is_in_memory() {
            ":memory:".to_owned()
        } else {
            options
                .filename
                .to_str()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        "filename passed to SQLite must be valid UTF-8",
                    )
                })?
                .to_owned()
        };

        // Statements step under their own handle lock, not the connection's, so the
        // connection must always be opened in serialized threading mode.
        let mut flags = SQLITE_OPEN_URI | SQLITE_OPEN_FULLMUTEX;

        flags |= if options.read_only {
            SQLITE_OPEN_READONLY
        } else if options.create_if_missing {
            SQLITE_OPEN_CREATE | SQLITE_OPEN_READWRITE
        } else {
            SQLITE_OPEN_READWRITE
        };

        if options.is_in_memory() {
            flags |= SQLITE_OPEN_MEMORY;
        }

        flags |= if options.shared_cache {
            SQLITE_OPEN_SHAREDCACHE
        } else {
            SQLITE_OPEN_PRIVATECACHE
        };

        let mut query_params = BTreeMap::new();

        if options.immutable {
            query_params.insert("immutable", "true");
        }

        if let Some(vfs) = options.vfs.as_deref() {
            query_params.insert("vfs", vfs);
        }

        if !query_params.is_empty() {
            filename = format!(
                "file:{}?{}",
                percent_encoding::percent_encode(filename.as_bytes(), NON_ALPHANUMERIC),
                serde_urlencoded::to_string(&query_params).map_err(Error::config)?
            );
        }

        let filename = CString::new(filename).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "filename passed to SQLite must not contain nul bytes",
            )
        })?;

        Ok(Self {
            filename,
            open_flags: flags,
            busy_timeout: options.busy_timeout,
            load_extension: options.load_extension,
            log_settings: options.log_settings.clone(),
        })
    }

    pub(crate) fn establish(&self) -> Result<Database, Error> {
        let db = Database::open(&self.filename, self.open_flags, self.log_settings.clone())?;

        if self.load_extension {
            db.enable_load_extension(true)?;
        }

        // Configure a busy timeout
        // This causes SQLite to automatically sleep in increasing intervals until the time
        // when there is something locked during [sqlite3_step].
        let ms = c_int::try_from(self.busy_timeout.as_millis()).map_err(|_| {
            Error::Configuration(
                format!("busy timeout {:?} is too large", self.busy_timeout).into(),
            )
        })?;

        db.busy_timeout(ms)?;

        Ok(db)
    }
}
