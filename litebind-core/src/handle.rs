//! Exclusive, non-blocking access to a raw native handle.
//!
//! A [`SafeHandle`] owns one raw handle (a connection pointer, a statement pointer, ...) and
//! guarantees that:
//!
//! * at most one thread is inside a callback on the raw handle at any instant; a second
//!   thread is turned away with [`Error::HandleBusy`] instead of waiting,
//! * the raw handle is never handed out after it has been closed ([`Error::HandleClosed`]),
//! * the close callback runs at most once, and every later `close` observes its outcome.

use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use crate::error::Error;

/// The recorded result of closing a handle.
type CloseOutcome = Result<i32, Arc<Error>>;

pub struct SafeHandle<H> {
    name: &'static str,
    raw: H,
    state: Mutex<State>,
    // mirrors `State::outcome.is_some()` so `is_closed` never needs the lock
    closed: AtomicBool,
}

#[derive(Default)]
struct State {
    outcome: Option<CloseOutcome>,
}

impl<H> SafeHandle<H> {
    /// Wrap `raw`. `name` only shows up in error messages.
    pub fn new(name: &'static str, raw: H) -> Self {
        Self {
            name,
            raw,
            state: Mutex::new(State::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` once [`close`][Self::close] has run, whatever its outcome.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<H: Copy> SafeHandle<H> {

    /// Run `f` with exclusive access to the raw handle.
    ///
    /// Fails with [`Error::HandleBusy`] if another thread currently holds the handle and with
    /// [`Error::HandleClosed`] if the handle has been closed. Both checks happen under the same
    /// lock acquisition, so a handle can't be closed between them.
    pub fn run<T>(&self, f: impl FnOnce(H) -> T) -> Result<T, Error> {
        let state = self.try_lock()?;

        if state.outcome.is_some() {
            return Err(Error::HandleClosed { name: self.name });
        }

        let ret = f(self.raw);
        drop(state);

        Ok(ret)
    }

    /// Like [`run`][Self::run], for callbacks that can fail themselves.
    pub fn try_run<T>(&self, f: impl FnOnce(H) -> Result<T, Error>) -> Result<T, Error> {
        self.run(f)?
    }

    /// Close the handle.
    ///
    /// The first call invokes `f` and records what it returned; the handle is marked closed
    /// even if `f` fails. Every later call returns the recorded result without invoking
    /// anything. A recorded failure comes back as [`Error::HandleClose`] sharing the same
    /// source each time.
    pub fn close(&self, f: impl FnOnce(&Self, H) -> Result<i32, Error>) -> Result<i32, Error> {
        let mut state = self.try_lock()?;

        if let Some(outcome) = &state.outcome {
            return self.replay(outcome);
        }

        let outcome = f(self, self.raw).map_err(Arc::new);
        let ret = self.replay(&outcome);

        state.outcome = Some(outcome);
        self.closed.store(true, Ordering::Release);

        ret
    }

    /// The raw handle, without taking the lock.
    ///
    /// Only for engine calls that are documented as safe to make concurrently with any other
    /// call on the same handle (e.g. `sqlite3_interrupt`). The caller must still make sure the
    /// handle has not been closed.
    pub fn raw_unguarded(&self) -> H {
        self.raw
    }

    fn replay(&self, outcome: &CloseOutcome) -> Result<i32, Error> {
        match outcome {
            Ok(code) => Ok(*code),
            Err(source) => Err(Error::HandleClose {
                name: self.name,
                source: Arc::clone(source),
            }),
        }
    }

    fn try_lock(&self) -> Result<MutexGuard<'_, State>, Error> {
        match self.state.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(Error::HandleBusy { name: self.name }),
            // a callback panicked while holding the lock; the state itself is still consistent
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
        }
    }
}

impl<H: PartialEq> PartialEq for SafeHandle<H> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<H: Eq> Eq for SafeHandle<H> {}

impl<H: Hash> Hash for SafeHandle<H> {
    fn hash<S: Hasher>(&self, state: &mut S) {
        self.raw.hash(state);
    }
}

impl<H: Debug> Debug for SafeHandle<H> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeHandle")
            .field("name", &self.name)
            .field("raw", &self.raw)
            .field("closed", &self.is_closed())
            .finish()
    }
}
