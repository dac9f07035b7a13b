use std::ffi::CString;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use litebind_core::error::BoxDynError;
use litebind_core::Value;

use crate::database::Database;
use crate::error::Error;
use crate::native::callback::{AggregateFactory, Callback, ScalarFn};

/// Running state of one evaluation of an aggregate function.
///
/// A fresh state is created for every group; `step` is called once per row and `finish` once
/// at the end. `finish` is also called, on a fresh state, for a group without rows.
pub trait Aggregate: Send + 'static {
    fn step(&mut self, args: &[Value]) -> Result<(), BoxDynError>;

    fn finish(&mut self) -> Result<Value, BoxDynError>;
}

/// Options for user-defined functions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    deterministic: bool,
}

impl FunctionFlags {
    pub const NONE: Self = Self {
        deterministic: false,
    };

    /// The function always returns the same result for the same arguments, which lets SQLite
    /// use it in indexes and factor it out of loops.
    pub const DETERMINISTIC: Self = Self {
        deterministic: true,
    };

    pub fn is_deterministic(self) -> bool {
        self.deterministic
    }
}

/// A user-defined SQL function, ready to be registered on a connection.
#[derive(Clone)]
pub(crate) struct Function {
    name: Arc<str>,
    n_args: i32,
    flags: FunctionFlags,
    kind: FunctionKind,
}

#[derive(Clone)]
enum FunctionKind {
    Scalar(Arc<ScalarFn>),
    Aggregate(Arc<AggregateFactory>),
}

impl Function {
    pub(crate) fn scalar<F>(name: &str, n_args: i32, flags: FunctionFlags, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, BoxDynError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            n_args,
            flags,
            kind: FunctionKind::Scalar(Arc::new(f)),
        }
    }

    pub(crate) fn aggregate<A, F>(name: &str, n_args: i32, flags: FunctionFlags, init: F) -> Self
    where
        A: Aggregate,
        F: Fn() -> A + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            n_args,
            flags,
            kind: FunctionKind::Aggregate(Arc::new(move || Box::new(init()) as Box<dyn Aggregate>)),
        }
    }

    pub(crate) fn create(&self, db: &Database) -> Result<(), Error> {
        let c_name = function_name(&self.name)?;

        let (callback, aggregate) = match &self.kind {
            FunctionKind::Scalar(f) => (Callback::Scalar(Arc::clone(f)), false),
            FunctionKind::Aggregate(f) => (Callback::Aggregate(Arc::clone(f)), true),
        };

        db.create_function(&c_name, self.n_args, self.flags.is_deterministic(), aggregate, callback)
    }
}

pub(crate) fn function_name(name: &str) -> Result<CString, Error> {
    CString::new(name).map_err(|_| err_protocol!("invalid function name: {:?}", name))
}

impl Debug for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("n_args", &self.n_args)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
