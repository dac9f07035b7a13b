//! Online backup between two open databases.
//!
//! <https://www.sqlite.org/backup.html>

use std::ffi::{c_int, CStr, CString};

use libsqlite3_sys::{
    sqlite3_backup, sqlite3_backup_finish, sqlite3_backup_init, sqlite3_backup_pagecount,
    sqlite3_backup_remaining, sqlite3_backup_step, sqlite3_sleep, SQLITE_BUSY, SQLITE_DONE,
    SQLITE_LOCKED, SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_READONLY, SQLITE_OPEN_READWRITE,
    SQLITE_OPEN_URI,
};

use crate::error::Error;
use crate::native::RawConnection;
use crate::SqliteError;

const PAGES_PER_STEP: c_int = 100;

// how often a single step is retried while the other side holds a lock
const BUSY_RETRIES: u32 = 3;
const BUSY_SLEEP_MS: c_int = 100;

/// Progress of a running backup, reported after every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupProgress {
    /// Pages still to be copied.
    pub remaining: i32,
    /// Pages in the source database.
    pub page_count: i32,
}

impl BackupProgress {
    unsafe fn of(backup: *mut sqlite3_backup) -> Self {
        Self {
            remaining: sqlite3_backup_remaining(backup),
            page_count: sqlite3_backup_pagecount(backup),
        }
    }
}

/// Copy the database `db_name` of `conn` into the file at `path`, replacing its content.
pub(crate) fn backup_to_file(
    conn: RawConnection,
    db_name: &str,
    path: &str,
    observer: &mut dyn FnMut(BackupProgress),
) -> Result<(), Error> {
    let db_name = c_string(db_name)?;
    let file = RawConnection::open(
        &c_string(path)?,
        SQLITE_OPEN_CREATE | SQLITE_OPEN_READWRITE | SQLITE_OPEN_URI,
    )?;

    let r = copy(file, c"main", conn, &db_name, observer);

    file.close();
    r.map_err(Into::into)
}

/// Replace the database `db_name` of `conn` with the content of the file at `path`.
pub(crate) fn restore_from_file(
    conn: RawConnection,
    db_name: &str,
    path: &str,
    observer: &mut dyn FnMut(BackupProgress),
) -> Result<(), Error> {
    let db_name = c_string(db_name)?;
    let file = RawConnection::open(&c_string(path)?, SQLITE_OPEN_READONLY | SQLITE_OPEN_URI)?;

    let r = copy(conn, &db_name, file, c"main", observer);

    file.close();
    r.map_err(Into::into)
}

fn c_string(s: &str) -> Result<CString, Error> {
    CString::new(s).map_err(|_| err_protocol!("name contains nul bytes: {s:?}"))
}

fn copy(
    dest: RawConnection,
    dest_name: &CStr,
    source: RawConnection,
    source_name: &CStr,
    observer: &mut dyn FnMut(BackupProgress),
) -> Result<(), SqliteError> {
    // https://www.sqlite.org/c3ref/backup_finish.html#sqlite3backupinit
    let backup = unsafe {
        sqlite3_backup_init(
            dest.as_ptr(),
            dest_name.as_ptr(),
            source.as_ptr(),
            source_name.as_ptr(),
        )
    };

    if backup.is_null() {
        return Err(dest.last_error());
    }

    let mut retries = 0;

    let status = loop {
        let status = unsafe { sqlite3_backup_step(backup, PAGES_PER_STEP) };

        match status & 0xff {
            SQLITE_OK => {
                retries = 0;
                observer(unsafe { BackupProgress::of(backup) });
            }

            SQLITE_BUSY | SQLITE_LOCKED if retries < BUSY_RETRIES => {
                retries += 1;
                log::debug!("backup step blocked, retry {retries} of {BUSY_RETRIES}");

                unsafe { sqlite3_sleep(BUSY_SLEEP_MS) };
            }

            _ => break status,
        }
    };

    if status == SQLITE_DONE {
        observer(unsafe { BackupProgress::of(backup) });
    }

    // releases every resource associated with the backup, whatever happened above
    let finish = unsafe { sqlite3_backup_finish(backup) };

    let code = if status == SQLITE_DONE { finish } else { status };

    if code == SQLITE_OK {
        return Ok(());
    }

    let err = dest.last_error();

    if err.code() == code {
        Err(err)
    } else {
        Err(SqliteError::from_code(code))
    }
}
