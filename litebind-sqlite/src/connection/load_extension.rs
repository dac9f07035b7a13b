use std::ffi::{c_char, CStr, CString};
use std::ptr;

use libsqlite3_sys::{sqlite3_free, sqlite3_load_extension};

use crate::database::Database;
use crate::error::Error;

/// Load the extension at `path`, optionally through a non-default entry point.
///
/// Extension loading is switched on just for this call and switched off again afterwards,
/// unless the connection was opened with it enabled.
pub(crate) fn load_extension(
    db: &Database,
    path: &str,
    entry_point: Option<&str>,
    keep_enabled: bool,
) -> Result<(), Error> {
    let name = CString::new(path).map_err(Error::config)?;
    let entry_point = entry_point
        .map(CString::new)
        .transpose()
        .map_err(Error::config)?;

    db.with_handle(|conn| {
        conn.enable_load_extension(true)?;

        let mut err_msg: *mut c_char = ptr::null_mut();

        // SAFETY: we hold the connection lock and every pointer outlives the call
        let loaded = conn.call_with_result(|db| unsafe {
            sqlite3_load_extension(
                db,
                name.as_ptr(),
                entry_point.as_ref().map_or_else(ptr::null, |s| s.as_ptr()),
                &mut err_msg,
            )
        });

        let loaded = loaded.map_err(|e| {
            if err_msg.is_null() {
                return e;
            }

            // SAFETY: non-null, NUL-terminated, and ours to free once copied
            let message = unsafe { CStr::from_ptr(err_msg) }
                .to_string_lossy()
                .into_owned();

            unsafe {
                sqlite3_free(err_msg.cast());
            }

            e.with_message(message)
        });

        if !keep_enabled {
            conn.enable_load_extension(false)?;
        }

        loaded?;

        log::debug!("loaded extension {path:?}");

        Ok(())
    })
}
