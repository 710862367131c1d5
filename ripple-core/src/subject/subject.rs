use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::{remove_observer, ObserverList, SubjectLike};
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Notification, Observer, ObserverRef};
use crate::scheduler::{CurrentThreadScheduler, SchedulerRef};
use crate::Value;

struct SubjectState<T> {
    observers: ObserverList<ObserverRef<T>>,
    terminal: Option<Notification<T>>,
    next_id: u64,
}

struct SubjectInner<T> {
    state: Mutex<SubjectState<T>>,
    scheduler: SchedulerRef,
}

/// Forwards every notification to all current observers.
pub struct Subject<T> {
    inner: Arc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Value> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value> Subject<T> {
    /// Late subscribers receive the terminal notification on the
    /// current-thread scheduler.
    pub fn new() -> Self {
        Self::with_scheduler(CurrentThreadScheduler::instance())
    }

    pub fn with_scheduler(scheduler: SchedulerRef) -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                state: Mutex::new(SubjectState {
                    observers: ObserverList::new(),
                    terminal: None,
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

    fn terminate(&self, terminal: Notification<T>) {
        let observers = {
            let mut state = self.inner.state.lock();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(terminal.clone());
            std::mem::take(&mut state.observers)
        };
        debug!(
            kind = ?terminal.kind(),
            observers = observers.len(),
            "subject terminated"
        );
        for (_, observer) in observers {
            terminal.clone().accept(&observer);
        }
    }
}

fn subscribe_core<T: Value>(inner: &Arc<SubjectInner<T>>, observer: ObserverRef<T>) -> Disposable {
    let mut state = inner.state.lock();
    if let Some(terminal) = state.terminal.clone() {
        drop(state);
        return inner
            .scheduler
            .schedule(Box::new(move || terminal.accept(&observer)));
    }

    let id = state.next_id;
    state.next_id += 1;
    state.observers.push((id, observer));
    drop(state);

    let weak: Weak<SubjectInner<T>> = Arc::downgrade(inner);
    Disposable::from_action(move || {
        if let Some(inner) = weak.upgrade() {
            remove_observer(&mut inner.state.lock().observers, id);
        }
    })
}

impl<T: Value> Observer<T> for Subject<T> {
    fn on_next(&self, value: T) {
        let snapshot = {
            let state = self.inner.state.lock();
            if state.terminal.is_some() {
                return;
            }
            state.observers.clone()
        };
        for (_, observer) in snapshot {
            observer.on_next(value.clone());
        }
    }

    fn on_error(&self, error: RxError) {
        self.terminate(Notification::Error(error));
    }

    fn on_completed(&self) {
        self.terminate(Notification::Completed);
    }
}

impl<T: Value> SubjectLike<T> for Subject<T> {
    fn as_observable(&self) -> Observable<T> {
        Subject::as_observable(self)
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposable::SingleAssignmentDisposable;
    use crate::disposable::Dispose;

    fn recorder(subject: &Subject<i32>) -> (Arc<Mutex<Vec<Notification<i32>>>>, Disposable) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let handle = subject
            .as_observable()
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        (log, handle)
    }

    #[test]
    fn multicasts_to_every_observer() {
        let subject = Subject::new();
        let (a, _ha) = recorder(&subject);
        let (b, _hb) = recorder(&subject);

        subject.on_next(1);
        subject.on_completed();

        let expected = vec![Notification::Next(1), Notification::Completed];
        assert_eq!(*a.lock(), expected);
        assert_eq!(*b.lock(), expected);
        assert!(!subject.has_observers());
    }

    #[test]
    fn ignores_notifications_after_terminal() {
        let subject = Subject::new();
        let (log, _h) = recorder(&subject);

        subject.on_error(RxError::upstream("first"));
        subject.on_next(2);
        subject.on_completed();

        assert_eq!(
            *log.lock(),
            vec![
                Notification::Error(RxError::upstream("first"))
            ]
        );
    }

    #[test]
    fn late_subscriber_receives_only_terminal() {
        let subject = Subject::new();
        subject.on_next(1);
        subject.on_completed();

        let (log, _h) = recorder(&subject);
        assert_eq!(*log.lock(), vec![Notification::Completed]);
    }

    #[test]
    fn unsubscribing_mid_round_does_not_skip_others() {
        let subject = Subject::new();
        let slot = SingleAssignmentDisposable::new();
        let own = slot.clone();
        let first_seen = Arc::new(Mutex::new(Vec::new()));
        let sink = first_seen.clone();
        slot.set(subject.as_observable().subscribe_next(move |v: i32| {
            sink.lock().push(v);
            own.dispose();
        }));
        let (second, _h) = recorder(&subject);

        subject.on_next(1);
        subject.on_next(2);

        assert_eq!(*first_seen.lock(), vec![1]);
        assert_eq!(
            *second.lock(),
            vec![Notification::Next(1), Notification::Next(2)]
        );
    }

    #[test]
    fn disposing_subscription_detaches_observer() {
        let subject = Subject::<i32>::new();
        let (_log, handle) = recorder(&subject);
        assert!(subject.has_observers());
        handle.dispose();
        assert!(!subject.has_observers());
    }
}
