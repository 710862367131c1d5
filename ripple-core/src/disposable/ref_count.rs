//! Reference-counted disposable.
//!
//! Keeps a shared resource alive while derived subscriptions (leases) exist.
//! The underlying disposable is released once the primary holder has called
//! `dispose()` **and** every lease has been released, in whichever order
//! those events happen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Dispose, Disposable};

struct RefCountState {
    underlying: Option<Disposable>,
    primary_disposed: bool,
    leases: usize,
}

#[derive(Clone)]
pub struct RefCountDisposable {
    state: Arc<Mutex<RefCountState>>,
}

impl RefCountDisposable {
    pub fn new(underlying: Disposable) -> Self {
        Self {
            state: Arc::new(Mutex::new(RefCountState {
                underlying: Some(underlying),
                primary_disposed: false,
                leases: 0,
            })),
        }
    }

    /// Take a lease on the underlying resource.
    ///
    /// Once the underlying resource has been released this returns an empty
    /// disposable.
    pub fn lease(&self) -> Disposable {
        let mut state = self.state.lock();
        if state.underlying.is_none() {
            return Disposable::empty();
        }
        state.leases += 1;
        Disposable::new(Lease {
            parent: self.clone(),
            released: AtomicBool::new(false),
        })
    }

    pub fn lease_count(&self) -> usize {
        self.state.lock().leases
    }

    fn release(&self) {
        let underlying = {
            let mut state = self.state.lock();
            state.leases = state.leases.saturating_sub(1);
            if state.primary_disposed && state.leases == 0 {
                state.underlying.take()
            } else {
                None
            }
        };
        if let Some(underlying) = underlying {
            underlying.dispose();
        }
    }
}

impl Dispose for RefCountDisposable {
    /// Signal that the primary holder is done.
    fn dispose(&self) {
        let underlying = {
            let mut state = self.state.lock();
            if state.primary_disposed {
                return;
            }
            state.primary_disposed = true;
            if state.leases == 0 {
                state.underlying.take()
            } else {
                None
            }
        };
        if let Some(underlying) = underlying {
            underlying.dispose();
        }
    }

    /// True once the underlying resource has been released.
    fn is_disposed(&self) -> bool {
        self.state.lock().underlying.is_none()
    }
}

impl From<RefCountDisposable> for Disposable {
    fn from(value: RefCountDisposable) -> Self {
        Disposable::new(value)
    }
}

struct Lease {
    parent: RefCountDisposable,
    released: AtomicBool,
}

impl Dispose for Lease {
    fn dispose(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.parent.release();
        }
    }

    fn is_disposed(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
