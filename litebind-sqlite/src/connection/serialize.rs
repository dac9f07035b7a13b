use std::ffi::CString;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use libsqlite3_sys::{
    sqlite3_deserialize, sqlite3_free, sqlite3_malloc64, sqlite3_serialize,
    SQLITE_DESERIALIZE_FREEONCLOSE, SQLITE_DESERIALIZE_READONLY, SQLITE_DESERIALIZE_RESIZEABLE,
    SQLITE_OK,
};

use crate::database::Database;
use crate::error::Error;

pub(crate) fn serialize(db: &Database, schema: &str) -> Result<SqliteOwnedBuf, Error> {
    let c_schema = CString::new(schema).map_err(Error::config)?;

    db.with_handle(|conn| {
        let mut size = 0;

        // SAFETY: we hold the connection lock; the returned buffer is ours to free
        let ptr = unsafe { sqlite3_serialize(conn.as_ptr(), c_schema.as_ptr(), &mut size, 0) };
        if ptr.is_null() {
            return Err(Error::config(SqliteBufError::Serialize(schema.to_owned())));
        }

        let size = usize::try_from(size).map_err(Error::config)?;

        // SAFETY: `ptr` was allocated by SQLite and holds `size` bytes
        unsafe { SqliteOwnedBuf::from(ptr, size) }.map_err(Error::config)
    })
}

pub(crate) fn deserialize(
    db: &Database,
    schema: &str,
    data: &[u8],
    read_only: bool,
) -> Result<(), Error> {
    let c_schema = CString::new(schema).map_err(Error::config)?;
    let len = i64::try_from(data.len()).map_err(Error::config)?;

    // the buffer is handed to SQLite, which frees it when the schema is detached or closed
    let mut flags = SQLITE_DESERIALIZE_FREEONCLOSE;
    flags |= if read_only {
        SQLITE_DESERIALIZE_READONLY
    } else {
        SQLITE_DESERIALIZE_RESIZEABLE
    };

    let buf = SqliteOwnedBuf::try_from(data).map_err(Error::config)?;

    db.with_handle(|conn| {
        let (ptr, _) = buf.into_raw();

        // SAFETY: `ptr` came from `sqlite3_malloc64`; with FREEONCLOSE SQLite owns it even
        // when the call fails
        #[allow(clippy::cast_sign_loss)]
        let rc = unsafe {
            sqlite3_deserialize(
                conn.as_ptr(),
                c_schema.as_ptr(),
                ptr,
                len,
                len,
                flags as _,
            )
        };

        if rc != SQLITE_OK {
            return Err(conn.last_error().into());
        }

        Ok(())
    })
}

/// Errors that could occur when using [`SqliteOwnedBuf`].
#[derive(Debug, thiserror::Error)]
pub enum SqliteBufError {
    #[error("error initializing buffer using sqlite3_malloc")]
    Malloc,

    #[error("database {0:?} could not be serialized")]
    Serialize(String),
}

/// Memory buffer owned and allocated by SQLite, as returned by
/// [`SqliteConnection::serialize`][crate::SqliteConnection::serialize].
#[derive(Debug)]
pub struct SqliteOwnedBuf {
    ptr: NonNull<u8>,
    size: usize,
}

unsafe impl Send for SqliteOwnedBuf {}
unsafe impl Sync for SqliteOwnedBuf {}

impl Drop for SqliteOwnedBuf {
    fn drop(&mut self) {
        unsafe {
            sqlite3_free(self.ptr.as_ptr().cast());
        }
    }
}

impl SqliteOwnedBuf {
    fn with_capacity(size: usize) -> Result<Self, SqliteBufError> {
        // zero-sized allocations come back as NULL
        let capacity = u64::try_from(size.max(1)).map_err(|_| SqliteBufError::Malloc)?;

        unsafe {
            let ptr = sqlite3_malloc64(capacity).cast::<u8>();
            Self::from(ptr, size)
        }
    }

    /// Takes ownership of a buffer allocated by SQLite.
    unsafe fn from(ptr: *mut u8, size: usize) -> Result<Self, SqliteBufError> {
        Ok(Self {
            ptr: NonNull::new(ptr).ok_or(SqliteBufError::Malloc)?,
            size,
        })
    }

    fn into_raw(self) -> (*mut u8, usize) {
        let raw = (self.ptr.as_ptr(), self.size);
        std::mem::forget(self);
        raw
    }
}

impl TryFrom<&[u8]> for SqliteOwnedBuf {
    type Error = SqliteBufError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let mut buf = Self::with_capacity(bytes.len())?;

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf.ptr.as_mut(), buf.size);
        }

        Ok(buf)
    }
}

impl Deref for SqliteOwnedBuf {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }
}

impl DerefMut for SqliteOwnedBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_mut(), self.size) }
    }
}

impl AsRef<[u8]> for SqliteOwnedBuf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}
