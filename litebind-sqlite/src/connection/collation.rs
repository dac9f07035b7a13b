use std::cmp::Ordering;
use std::ffi::CString;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::database::Database;
use crate::error::Error;
use crate::native::callback::CollationFn;

#[derive(Clone)]
pub struct Collation {
    name: Arc<str>,
    collate: Arc<CollationFn>,
}

impl Collation {
    pub fn new<N, F>(name: N, collate: F) -> Self
    where
        N: Into<Arc<str>>,
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        Collation {
            name: name.into(),
            collate: Arc::new(collate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn create(&self, db: &Database) -> Result<(), Error> {
        db.create_collation(&collation_name(&self.name)?, Arc::clone(&self.collate))
    }
}

pub(crate) fn collation_name(name: &str) -> Result<CString, Error> {
    CString::new(name).map_err(|_| err_protocol!("invalid collation name: {:?}", name))
}

impl Debug for Collation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
