use std::ffi::c_int;

use libsqlite3_sys::{
    SQLITE_LIMIT_ATTACHED, SQLITE_LIMIT_COLUMN, SQLITE_LIMIT_COMPOUND_SELECT,
    SQLITE_LIMIT_EXPR_DEPTH, SQLITE_LIMIT_FUNCTION_ARG, SQLITE_LIMIT_LENGTH,
    SQLITE_LIMIT_LIKE_PATTERN_LENGTH, SQLITE_LIMIT_SQL_LENGTH, SQLITE_LIMIT_TRIGGER_DEPTH,
    SQLITE_LIMIT_VARIABLE_NUMBER, SQLITE_LIMIT_VDBE_OP, SQLITE_LIMIT_WORKER_THREADS,
};

/// Run-time limit categories.
///
/// <https://www.sqlite.org/c3ref/c_limit_attached.html>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqliteLimit {
    Length,
    SqlLength,
    Column,
    ExprDepth,
    CompoundSelect,
    VdbeOp,
    FunctionArg,
    Attached,
    LikePatternLength,
    VariableNumber,
    TriggerDepth,
    WorkerThreads,
}

impl SqliteLimit {
    pub(crate) fn id(self) -> c_int {
        match self {
            SqliteLimit::Length => SQLITE_LIMIT_LENGTH,
            SqliteLimit::SqlLength => SQLITE_LIMIT_SQL_LENGTH,
            SqliteLimit::Column => SQLITE_LIMIT_COLUMN,
            SqliteLimit::ExprDepth => SQLITE_LIMIT_EXPR_DEPTH,
            SqliteLimit::CompoundSelect => SQLITE_LIMIT_COMPOUND_SELECT,
            SqliteLimit::VdbeOp => SQLITE_LIMIT_VDBE_OP,
            SqliteLimit::FunctionArg => SQLITE_LIMIT_FUNCTION_ARG,
            SqliteLimit::Attached => SQLITE_LIMIT_ATTACHED,
            SqliteLimit::LikePatternLength => SQLITE_LIMIT_LIKE_PATTERN_LENGTH,
            SqliteLimit::VariableNumber => SQLITE_LIMIT_VARIABLE_NUMBER,
            SqliteLimit::TriggerDepth => SQLITE_LIMIT_TRIGGER_DEPTH,
            SqliteLimit::WorkerThreads => SQLITE_LIMIT_WORKER_THREADS,
        }
    }
}
