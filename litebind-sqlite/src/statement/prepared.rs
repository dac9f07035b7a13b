use std::sync::Arc;

use bit_vec::BitVec;
use litebind_core::Value;

use crate::connection::ConnectionInner;
use crate::error::Error;
use crate::result_set::ResultSet;
use crate::statement::{StatementCore, StatementState};

/// A statement compiled once and executed any number of times with different parameters.
///
/// Parameters are buffered here and only handed to SQLite when the statement runs. The buffer
/// holds one row of `parameter_count()` values per queued batch entry, plus the row currently
/// being bound; a bit per slot records whether it was bound.
pub struct PreparedStatement {
    core: StatementCore,
    sql: String,
    param_count: usize,
    values: Vec<Value>,
    bound: BitVec,
    // offset of the row currently being bound
    batch_pos: usize,
    batch_count: usize,
    pending: Option<ResultSet>,
}

impl PreparedStatement {
    pub(crate) fn new(conn: Arc<ConnectionInner>, sql: &str) -> Result<Self, Error> {
        let mut core = StatementCore::new(conn, StatementState::Closed);
        core.prepare(sql)?;

        let param_count = core.info.as_ref().map_or(0, |info| info.param_count);

        Ok(Self {
            core,
            sql: sql.to_owned(),
            param_count,
            values: vec![Value::Null; param_count],
            bound: BitVec::from_elem(param_count, false),
            batch_pos: 0,
            batch_count: 0,
            pending: None,
        })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bind `value` to the parameter at `position` (1-based) of the current row.
    pub fn bind(&mut self, position: usize, value: impl Into<Value>) -> Result<(), Error> {
        self.core.ensure_open()?;

        if position == 0 || position > self.param_count {
            return Err(Error::ParameterIndexOutOfBounds {
                index: position,
                len: self.param_count,
            });
        }

        let slot = self.batch_pos + position - 1;

        self.values[slot] = value.into();
        self.bound.set(slot, true);

        Ok(())
    }

    /// Unbind every parameter of the current row.
    pub fn clear_parameters(&mut self) -> Result<(), Error> {
        self.core.ensure_open()?;

        for slot in self.batch_pos..self.batch_pos + self.param_count {
            self.values[slot] = Value::Null;
            self.bound.set(slot, false);
        }

        let (handle, _) = self.core.prepared()?;
        handle.run(|raw| raw.clear_bindings())?;

        Ok(())
    }

    fn current_row(&self) -> Result<&[Value], Error> {
        let row = self.batch_pos..self.batch_pos + self.param_count;

        if let Some(unbound) = row.clone().find(|&slot| !self.bound[slot]) {
            return Err(Error::UnboundParameter {
                index: unbound - self.batch_pos + 1,
            });
        }

        Ok(&self.values[row])
    }

    /// Execute with the current parameters. Returns `true` if the statement produces a result
    /// set, which is then available from [`result_set`][Self::result_set].
    pub fn execute(&mut self) -> Result<bool, Error> {
        self.core.ensure_open()?;
        self.pending = None;

        let row = self.current_row()?.to_vec();
        let has_row = self.core.run(Some(&row))?;

        if self.core.column_count() == 0 {
            return Ok(false);
        }

        self.pending = Some(self.core.open_result_set(has_row)?);
        Ok(true)
    }

    pub fn execute_query(&mut self) -> Result<ResultSet, Error> {
        self.core.ensure_open()?;
        self.pending = None;

        if self.core.column_count() == 0 {
            return Err(Error::QueryReturnedNoRows);
        }

        let row = self.current_row()?.to_vec();
        let has_row = self.core.run(Some(&row))?;

        self.core.open_result_set(has_row)
    }

    /// Execute a statement that produces no result set. Returns the number of changed rows.
    pub fn execute_update(&mut self) -> Result<i64, Error> {
        self.core.ensure_open()?;
        self.pending = None;

        if self.core.column_count() > 0 {
            return Err(Error::QueryReturnedRows);
        }

        let row = self.current_row()?.to_vec();
        self.core.update(Some(&row))
    }

    /// Queue the current parameters as a batch entry.
    ///
    /// The next row starts out as a copy of this one, so only the parameters that change
    /// between entries need to be bound again.
    pub fn add_batch(&mut self) -> Result<(), Error> {
        self.core.ensure_open()?;

        let next = self.batch_pos + self.param_count;
        let needed = next + self.param_count;

        if needed > self.values.len() {
            let len = (self.values.len() * 2).max(needed);

            self.values.resize(len, Value::Null);
            self.bound.grow(len - self.bound.len(), false);
        }

        for i in 0..self.param_count {
            self.values[next + i] = self.values[self.batch_pos + i].clone();

            let bound = self.bound[self.batch_pos + i];
            self.bound.set(next + i, bound);
        }

        self.batch_pos = next;
        self.batch_count += 1;

        Ok(())
    }

    /// Drop every queued entry and the current parameters.
    pub fn clear_batch(&mut self) {
        self.values = vec![Value::Null; self.param_count];
        self.bound = BitVec::from_elem(self.param_count, false);
        self.batch_pos = 0;
        self.batch_count = 0;
    }

    /// Number of entries queued with [`add_batch`][Self::add_batch].
    pub fn batch_size(&self) -> usize {
        self.batch_count
    }

    /// Run every queued entry and clear the batch.
    ///
    /// Every parameter of every entry must be bound, or nothing runs. On failure the
    /// [`Error::BatchUpdate`] carries the counts of the entries that completed.
    pub fn execute_batch(&mut self) -> Result<Vec<i64>, Error> {
        self.core.ensure_open()?;
        self.pending = None;

        if self.batch_count == 0 {
            return Ok(Vec::new());
        }

        let len = self.batch_count * self.param_count;

        if let Some(unbound) = (0..len).find(|&slot| !self.bound[slot]) {
            return Err(Error::UnboundParameter {
                index: unbound % self.param_count + 1,
            });
        }

        let count = self.batch_count;
        let values = self.values[..len].to_vec();

        self.clear_batch();

        self.core.batch(count, &values)
    }

    pub fn parameter_count(&self) -> usize {
        self.param_count
    }

    pub fn column_count(&self) -> usize {
        self.core.column_count()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.core
            .info
            .as_ref()
            .map(|info| info.columns.clone())
            .unwrap_or_default()
    }

    /// The result set produced by the last [`execute`][Self::execute], once.
    pub fn result_set(&mut self) -> Option<ResultSet> {
        self.pending.take()
    }

    /// Rows changed by the last execution; `None` if it produced a result set.
    pub fn update_count(&self) -> Option<i64> {
        self.core.update_count
    }

    /// Limit the rows any result set of this statement returns; `0` means no limit.
    pub fn set_max_rows(&mut self, max_rows: usize) {
        self.core.max_rows = max_rows;
    }

    pub fn cancel(&self) -> Result<(), Error> {
        self.core.cancel()
    }

    pub fn state(&self) -> StatementState {
        self.core.state()
    }

    pub fn is_closed(&self) -> bool {
        self.core.state() == StatementState::Closed
    }

    /// Close the statement along with its open result set. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), Error> {
        self.pending = None;
        self.core.close()
    }
}

impl std::fmt::Debug for PreparedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .field("state", &self.core.state())
            .field("batch_count", &self.batch_count)
            .finish_non_exhaustive()
    }
}
