//! Explicit driver registration.
//!
//! There is no process-wide driver list: an application builds a [`DriverRegistry`] at startup,
//! registers the drivers it wants, and resolves connection URLs through it.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::error::Error;

/// Something that can open connections for URLs it recognises.
pub trait Driver: Send + Sync + 'static {
    type Connection;

    /// Short, human readable name of the driver.
    fn name(&self) -> &'static str;

    /// Returns `true` if this driver can handle `url`.
    fn accepts_url(&self, url: &str) -> bool;

    fn connect(&self, url: &str) -> Result<Self::Connection, Error>;
}

/// The registration table. Holds no other state.
pub struct DriverRegistry<C: 'static> {
    drivers: Vec<Arc<dyn Driver<Connection = C>>>,
}

impl<C: 'static> DriverRegistry<C> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            drivers: Vec::new(),
        }
    }

    /// Add a driver. Drivers are consulted in registration order.
    pub fn register<D>(&mut self, driver: D) -> &mut Self
    where
        D: Driver<Connection = C>,
    {
        self.drivers.push(Arc::new(driver));
        self
    }

    /// Remove every driver with the given name. Returns `true` if any was removed.
    pub fn deregister(&mut self, name: &str) -> bool {
        let before = self.drivers.len();
        self.drivers.retain(|driver| driver.name() != name);
        self.drivers.len() != before
    }

    /// The first registered driver that accepts `url`.
    pub fn driver_for(&self, url: &str) -> Option<&dyn Driver<Connection = C>> {
        self.drivers
            .iter()
            .find(|driver| driver.accepts_url(url))
            .map(|driver| &**driver)
    }

    pub fn connect(&self, url: &str) -> Result<C, Error> {
        let driver = self.driver_for(url).ok_or_else(|| {
            Error::Configuration(format!("no registered driver accepts {url:?}").into())
        })?;

        log::debug!("connecting to {url:?} with the {} driver", driver.name());

        driver.connect(url)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drivers.iter().map(|driver| driver.name())
    }
}

impl<C: 'static> Default for DriverRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> Debug for DriverRegistry<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
