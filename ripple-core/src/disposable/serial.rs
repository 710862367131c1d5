//! Single-slot disposables.
//!
//! [`SerialDisposable`] holds one replaceable occupant; [`SingleAssignmentDisposable`]
//! is filled exactly once, typically with the result of a `subscribe` call that
//! may itself trigger disposal before it returns.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use super::{Dispose, Disposable};

#[derive(Default)]
struct SlotState {
    current: Option<Disposable>,
    disposed: bool,
}

/// A slot holding at most one disposable.
///
/// Assigning a new occupant disposes the previous one. Once the slot itself
/// is disposed, every later assignment is disposed on arrival.
#[derive(Clone, Default)]
pub struct SerialDisposable {
    state: Arc<Mutex<SlotState>>,
}

impl SerialDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, next: Disposable) {
        let (previous, rejected) = {
            let mut state = self.state.lock();
            if state.disposed {
                (None, Some(next))
            } else {
                (state.current.replace(next), None)
            }
        };
        if let Some(previous) = previous {
            previous.dispose();
        }
        if let Some(rejected) = rejected {
            rejected.dispose();
        }
    }

    pub fn get(&self) -> Option<Disposable> {
        self.state.lock().current.clone()
    }
}

impl Dispose for SerialDisposable {
    fn dispose(&self) {
        let current = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.current.take()
        };
        if let Some(current) = current {
            current.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl From<SerialDisposable> for Disposable {
    fn from(value: SerialDisposable) -> Self {
        Disposable::new(value)
    }
}

#[derive(Default)]
struct FutureState {
    current: Option<Disposable>,
    assigned: bool,
    disposed: bool,
}

/// A slot that is assigned once, possibly after it was disposed.
///
/// If the slot is disposed before the assignment arrives, the assigned value
/// is disposed as soon as it is set.
#[derive(Clone, Default)]
pub struct SingleAssignmentDisposable {
    state: Arc<Mutex<FutureState>>,
}

impl SingleAssignmentDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the slot. A second assignment is rejected: the argument is
    /// disposed and the first occupant is kept.
    pub fn set(&self, value: Disposable) {
        let rejected = {
            let mut state = self.state.lock();
            if state.assigned {
                warn!("single-assignment disposable assigned twice; disposing the new value");
                Some(value)
            } else {
                state.assigned = true;
                if state.disposed {
                    Some(value)
                } else {
                    state.current = Some(value);
                    None
                }
            }
        };
        if let Some(rejected) = rejected {
            rejected.dispose();
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.state.lock().assigned
    }
}

impl Dispose for SingleAssignmentDisposable {
    fn dispose(&self) {
        let current = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.current.take()
        };
        if let Some(current) = current {
            current.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl From<SingleAssignmentDisposable> for Disposable {
    fn from(value: SingleAssignmentDisposable) -> Self {
        Disposable::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(count: &Arc<AtomicUsize>) -> Disposable {
        let count = count.clone();
        Disposable::from_action(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn serial_replacement_disposes_previous() {
        let count = Arc::new(AtomicUsize::new(0));
        let serial = SerialDisposable::new();
        let first = counting(&count);
        serial.set(first.clone());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        serial.set(counting(&count));
        assert!(first.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        serial.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn serial_after_dispose_rejects_assignment() {
        let count = Arc::new(AtomicUsize::new(0));
        let serial = SerialDisposable::new();
        serial.dispose();
        serial.set(counting(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(serial.get().is_none());
    }

    #[test]
    fn future_disposed_before_assignment() {
        let count = Arc::new(AtomicUsize::new(0));
        let slot = SingleAssignmentDisposable::new();
        slot.dispose();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        slot.set(counting(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(slot.is_assigned());
    }

    #[test]
    fn future_second_assignment_is_rejected() {
        let count = Arc::new(AtomicUsize::new(0));
        let slot = SingleAssignmentDisposable::new();
        let first = counting(&count);
        slot.set(first.clone());
        slot.set(counting(&count));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!first.is_disposed());

        slot.dispose();
        assert!(first.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
