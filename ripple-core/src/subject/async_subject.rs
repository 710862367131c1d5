use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::{remove_observer, ObserverList, SubjectLike};
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Observer, ObserverRef};
use crate::scheduler::{CurrentThreadScheduler, SchedulerRef};
use crate::Value;

enum Outcome<T> {
    Pending,
    Completed(Option<T>),
    Failed(RxError),
}

impl<T: Clone> Outcome<T> {
    fn deliver(&self, observer: &ObserverRef<T>) {
        match self {
            Outcome::Pending => {}
            Outcome::Completed(last) => {
                if let Some(value) = last {
                    observer.on_next(value.clone());
                }
                observer.on_completed();
            }
            Outcome::Failed(error) => observer.on_error(error.clone()),
        }
    }
}

struct AsyncState<T> {
    last: Option<T>,
    outcome: Outcome<T>,
    observers: ObserverList<ObserverRef<T>>,
    next_id: u64,
}

struct AsyncInner<T> {
    state: Mutex<AsyncState<T>>,
    scheduler: SchedulerRef,
}

/// Publishes only the final value of a sequence, once it completes.
///
/// Values received before completion are held, never forwarded. On
/// completion every current and future observer receives the last value (if
/// any) followed by `completed`; on error they receive the error.
pub struct AsyncSubject<T> {
    inner: Arc<AsyncInner<T>>,
}

impl<T> Clone for AsyncSubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Value> Default for AsyncSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value> AsyncSubject<T> {
    pub fn new() -> Self {
        Self::with_scheduler(CurrentThreadScheduler::instance())
    }

    pub fn with_scheduler(scheduler: SchedulerRef) -> Self {
        Self {
            inner: Arc::new(AsyncInner {
                state: Mutex::new(AsyncState {
                    last: None,
                    outcome: Outcome::Pending,
                    observers: ObserverList::new(),
                    next_id: 0,
                }),
                scheduler,
            }),
        }
    }

    pub fn has_observers(&self) -> bool {
        !self.inner.state.lock().observers.is_empty()
    }

    pub fn as_observable(&self) -> Observable<T> {
        let inner = Arc::clone(&self.inner);
        Observable::create(move |observer| subscribe_core(&inner, observer))
    }

    fn finish(&self, outcome: Outcome<T>) {
        let observers = {
            let mut state = self.inner.state.lock();
            if !matches!(state.outcome, Outcome::Pending) {
                return;
            }
            state.outcome = outcome;
            std::mem::take(&mut state.observers)
        };
        debug!(observers = observers.len(), "async subject settled");

        let outcome = self.settled();
        for (_, observer) in observers {
            outcome.deliver(&observer);
        }
    }

    fn settled(&self) -> Outcome<T> {
        match &self.inner.state.lock().outcome {
            Outcome::Pending => Outcome::Pending,
            Outcome::Completed(last) => Outcome::Completed(last.clone()),
            Outcome::Failed(error) => Outcome::Failed(error.clone()),
        }
    }
}

fn subscribe_core<T: Value>(inner: &Arc<AsyncInner<T>>, observer: ObserverRef<T>) -> Disposable {
    let mut state = inner.state.lock();
    let outcome = match &state.outcome {
        Outcome::Pending => None,
        Outcome::Completed(last) => Some(Outcome::Completed(last.clone())),
        Outcome::Failed(error) => Some(Outcome::Failed(error.clone())),
    };
    if let Some(outcome) = outcome {
        drop(state);
        return inner
            .scheduler
            .schedule(Box::new(move || outcome.deliver(&observer)));
    }

    let id = state.next_id;
    state.next_id += 1;
    state.observers.push((id, observer));
    drop(state);

    let weak: Weak<AsyncInner<T>> = Arc::downgrade(inner);
    Disposable::from_action(move || {
        if let Some(inner) = weak.upgrade() {
            remove_observer(&mut inner.state.lock().observers, id);
        }
    })
}

impl<T: Value> Observer<T> for AsyncSubject<T> {
    fn on_next(&self, value: T) {
        let mut state = self.inner.state.lock();
        if matches!(state.outcome, Outcome::Pending) {
            state.last = Some(value);
        }
    }

    fn on_error(&self, error: RxError) {
        self.finish(Outcome::Failed(error));
    }

    fn on_completed(&self) {
        let last = self.inner.state.lock().last.take();
        self.finish(Outcome::Completed(last));
    }
}

impl<T: Value> SubjectLike<T> for AsyncSubject<T> {
    fn as_observable(&self) -> Observable<T> {
        AsyncSubject::as_observable(self)
    }
}
