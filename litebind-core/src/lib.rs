//! Core of litebind, the SQLite client binding. Not meant to be used directly;
//! see the `litebind` crate.
#![warn(future_incompatible, rust_2018_idioms)]
#![allow(clippy::needless_doctest_main, clippy::type_complexity)]

#[macro_use]
pub mod error;

pub mod driver;
pub mod handle;
pub mod logger;
pub mod value;

pub use error::{Error, Result};
pub use handle::SafeHandle;
pub use value::Value;
