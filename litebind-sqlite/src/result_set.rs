use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use libsqlite3_sys::{SQLITE_DONE, SQLITE_NULL, SQLITE_ROW};
use litebind_core::Value;

use crate::error::Error;
use crate::native::{ColumnFlags, RawStatement};
use crate::statement::{Cursor, StatementInfo};

/// Forward-only, single-pass view over the rows of one statement execution.
///
/// The result set is tied to the execution that produced it: executing or closing the
/// statement again closes it. It also closes itself once the last row has been read.
///
/// Column indices are 1-based.
pub struct ResultSet {
    cursor: Arc<Cursor>,
    info: Arc<StatementInfo>,
    // the first row was already stepped to by `execute`
    first_row: bool,
    row: usize,
    past_last: bool,
    max_rows: usize,
    last_was_null: bool,
    // lower-cased name -> 1-based index
    names: OnceLock<HashMap<String, usize>>,
}

impl ResultSet {
    pub(crate) fn new(
        cursor: Arc<Cursor>,
        info: Arc<StatementInfo>,
        first_row: bool,
        max_rows: usize,
    ) -> Self {
        Self {
            cursor,
            info,
            first_row,
            row: 0,
            past_last: false,
            max_rows,
            last_was_null: false,
            names: OnceLock::new(),
        }
    }

    /// Move to the next row. Returns `false` once there are no more rows.
    pub fn next(&mut self) -> Result<bool, Error> {
        if !self.cursor.is_open() || self.past_last {
            return Ok(false);
        }

        if self.max_rows != 0 && self.row >= self.max_rows {
            self.finish();
            return Ok(false);
        }

        if self.row == 0 {
            if !self.first_row {
                // the statement completed without producing a row
                self.finish();
                return Ok(false);
            }

            self.row = 1;
            return Ok(true);
        }

        let stepped = self.cursor.handle().run(|raw| {
            let status = raw.step();

            match status & 0xff {
                SQLITE_ROW => Ok(true),
                SQLITE_DONE => Ok(false),
                _ => Err(raw.error_for(status)),
            }
        });

        match stepped {
            Ok(Ok(true)) => {
                self.row += 1;
                Ok(true)
            }
            Ok(Ok(false)) => {
                self.finish();
                Ok(false)
            }
            Ok(Err(e)) => {
                if e.kind().is_recoverable() {
                    self.close();
                } else {
                    self.cursor.finalize();
                }

                Err(e.into())
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn finish(&mut self) {
        self.past_last = true;
        self.cursor.close();
    }

    /// The current row number; `0` before the first call to [`next`][Self::next].
    pub fn row(&self) -> usize {
        if self.past_last {
            0
        } else {
            self.row
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.cursor.is_open()
    }

    /// Close the result set and reset its statement. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.cursor.close();
    }

    fn check_index(&self, index: usize) -> Result<usize, Error> {
        let len = self.info.columns.len();

        if index == 0 || index > len {
            return Err(Error::ColumnIndexOutOfBounds { index, len });
        }

        Ok(index - 1)
    }

    fn read<T>(
        &mut self,
        index: usize,
        f: impl FnOnce(RawStatement, usize) -> T,
    ) -> Result<T, Error> {
        if !self.cursor.is_open() {
            return Err(Error::ResultSetClosed);
        }

        let column = self.check_index(index)?;

        if self.row == 0 || self.past_last {
            return Err(err_protocol!("result set has no current row"));
        }

        let (is_null, value) = self
            .cursor
            .handle()
            .run(|raw| (raw.column_type(column) == SQLITE_NULL, f(raw, column)))?;

        self.last_was_null = is_null;

        Ok(value)
    }

    pub fn get_int(&mut self, index: usize) -> Result<i32, Error> {
        self.read(index, |raw, i| raw.column_int(i))
    }

    pub fn get_long(&mut self, index: usize) -> Result<i64, Error> {
        self.read(index, |raw, i| raw.column_int64(i))
    }

    pub fn get_double(&mut self, index: usize) -> Result<f64, Error> {
        self.read(index, |raw, i| raw.column_double(i))
    }

    pub fn get_bool(&mut self, index: usize) -> Result<bool, Error> {
        self.read(index, |raw, i| raw.column_int64(i) != 0)
    }

    pub fn get_string(&mut self, index: usize) -> Result<Option<String>, Error> {
        self.read(index, |raw, i| raw.column_text(i))
    }

    pub fn get_bytes(&mut self, index: usize) -> Result<Option<Vec<u8>>, Error> {
        self.read(index, |raw, i| raw.column_blob(i))
    }

    pub fn get_value(&mut self, index: usize) -> Result<Value, Error> {
        self.read(index, |raw, i| raw.column_value(i))
    }

    /// Storage class of the column in the current row, as a `SQLITE_*` type code.
    pub fn column_type(&mut self, index: usize) -> Result<i32, Error> {
        self.read(index, |raw, i| raw.column_type(i))
    }

    /// Whether the column read last was `NULL`.
    pub fn was_null(&self) -> bool {
        self.last_was_null
    }

    /// The 1-based index of the first column called `name`, ignoring ASCII case.
    pub fn find_column(&self, name: &str) -> Result<usize, Error> {
        let names = self.names.get_or_init(|| {
            let mut names = HashMap::with_capacity(self.info.columns.len());

            for (i, column) in self.info.columns.iter().enumerate() {
                names.entry(column.to_ascii_lowercase()).or_insert(i + 1);
            }

            names
        });

        names
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| Error::ColumnNotFound(name.to_owned()))
    }

    pub fn column_count(&self) -> usize {
        self.info.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.info.columns
    }

    pub fn column_name(&self, index: usize) -> Result<&str, Error> {
        Ok(&self.info.columns[self.check_index(index)?])
    }

    /// The declared type of the column, if it comes straight from a table.
    pub fn column_decltype(&self, index: usize) -> Result<Option<&str>, Error> {
        Ok(self.info.decltypes[self.check_index(index)?].as_deref())
    }

    pub fn column_table_name(&self, index: usize) -> Result<Option<&str>, Error> {
        Ok(self.info.tables[self.check_index(index)?].as_deref())
    }

    fn flags(&self, index: usize) -> Result<ColumnFlags, Error> {
        let column = self.check_index(index)?;
        let flags = self.info.column_flags(self.cursor.handle())?;

        Ok(flags.get(column).copied().unwrap_or_default())
    }

    /// `false` only for table columns declared `NOT NULL`.
    pub fn is_nullable(&self, index: usize) -> Result<bool, Error> {
        Ok(!self.flags(index)?.not_null)
    }

    pub fn is_primary_key(&self, index: usize) -> Result<bool, Error> {
        Ok(self.flags(index)?.primary_key)
    }

    pub fn is_auto_increment(&self, index: usize) -> Result<bool, Error> {
        Ok(self.flags(index)?.auto_increment)
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("columns", &self.info.columns)
            .field("row", &self.row)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
