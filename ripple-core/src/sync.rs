//! Serialization gate for operators fed by more than one source.
//!
//! Sources composed by merge, combine-latest, zip and friends may run on
//! different schedulers. Their callbacks take the operator's gate before
//! touching shared state or the downstream observer, so the downstream sees
//! a single ordered stream. The gate is re-entrant: a downstream observer
//! that synchronously feeds the same operator again on this thread does not
//! deadlock.

use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::error::RxError;
use crate::observer::{Observer, ObserverRef};

#[derive(Default)]
pub(crate) struct Gate {
    lock: ReentrantMutex<()>,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = self.lock.lock();
        f()
    }
}

/// Forwards to `observer` while holding a shared gate.
pub(crate) struct SerializedObserver<T> {
    gate: Arc<Gate>,
    observer: ObserverRef<T>,
}

impl<T> SerializedObserver<T> {
    pub(crate) fn new(gate: Arc<Gate>, observer: ObserverRef<T>) -> Arc<Self> {
        Arc::new(Self { gate, observer })
    }

    pub(crate) fn gate(&self) -> &Gate {
        &self.gate
    }
}

impl<T> Observer<T> for SerializedObserver<T> {
    fn on_next(&self, value: T) {
        self.gate.run(|| self.observer.on_next(value));
    }

    fn on_error(&self, error: RxError) {
        self.gate.run(|| self.observer.on_error(error));
    }

    fn on_completed(&self) {
        self.gate.run(|| self.observer.on_completed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ObserverBuilder;
    use parking_lot::Mutex;
    use std::thread;

    #[test]
    fn gate_is_reentrant_on_one_thread() {
        let gate = Gate::new();
        let inner = gate.run(|| gate.run(|| 7));
        assert_eq!(inner, 7);
    }

    #[test]
    fn concurrent_producers_are_serialized() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let downstream: ObserverRef<usize> = Arc::new(
            ObserverBuilder::new()
                .on_next(move |v| sink.lock().push(v))
                .build(),
        );
        let serialized = SerializedObserver::new(Gate::new(), downstream);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let observer = serialized.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        observer.on_next(t * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(log.lock().len(), 1000);
    }
}
