//! Switch: follow only the most recent inner observable.
//!
//! Each inner observable gets a generation id. Subscribing to a new inner
//! disposes the previous one first, and notifications carrying a stale id
//! are dropped. Outer completion waits for the active inner to complete.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::disposable::{CompositeDisposable, SerialDisposable, SingleAssignmentDisposable};
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, Observer, ObserverRef};
use crate::sync::{Gate, SerializedObserver};
use crate::Value;

#[derive(Default)]
struct SwitchState {
    latest: u64,
    has_latest: bool,
    outer_done: bool,
}

struct SwitchSink<T> {
    downstream: Arc<SerializedObserver<T>>,
    state: Mutex<SwitchState>,
    inner: SerialDisposable,
}

impl<T: Value> SwitchSink<T> {
    fn is_latest(&self, id: u64) -> bool {
        self.state.lock().latest == id
    }

    fn switch_to(self: &Arc<Self>, source: Observable<T>) {
        let id = {
            let mut state = self.state.lock();
            state.latest += 1;
            state.has_latest = true;
            state.latest
        };

        let slot = SingleAssignmentDisposable::new();
        self.inner.set(slot.clone().into());

        let (values, errors, completions) = (Arc::clone(self), Arc::clone(self), Arc::clone(self));
        slot.set(source.subscribe(AnonymousObserver::new(
            move |value| {
                values.downstream.gate().run(|| {
                    if values.is_latest(id) {
                        values.downstream.on_next(value);
                    }
                })
            },
            move |error| {
                errors.downstream.gate().run(|| {
                    if errors.is_latest(id) {
                        errors.downstream.on_error(error);
                    }
                })
            },
            move || {
                completions.downstream.gate().run(|| {
                    let finished = {
                        let mut state = completions.state.lock();
                        if state.latest != id {
                            return;
                        }
                        state.has_latest = false;
                        state.outer_done
                    };
                    if finished {
                        completions.downstream.on_completed();
                    }
                })
            },
        )));
    }
}

struct OuterObserver<T> {
    sink: Arc<SwitchSink<T>>,
}

impl<T: Value> Observer<Observable<T>> for OuterObserver<T> {
    fn on_next(&self, source: Observable<T>) {
        self.sink.switch_to(source);
    }

    fn on_error(&self, error: RxError) {
        self.sink.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.sink.downstream.gate().run(|| {
            let finished = {
                let mut state = self.sink.state.lock();
                state.outer_done = true;
                !state.has_latest
            };
            if finished {
                self.sink.downstream.on_completed();
            }
        })
    }
}

impl<T: Value> Observable<Observable<T>> {
    /// Mirror the most recently emitted inner observable.
    pub fn switch(&self) -> Observable<T> {
        let outer = self.clone();
        Observable::create(move |observer: ObserverRef<T>| {
            let sink = Arc::new(SwitchSink {
                downstream: SerializedObserver::new(Gate::new(), observer),
                state: Mutex::new(SwitchState::default()),
                inner: SerialDisposable::new(),
            });
            let inner = sink.inner.clone();
            let outer_subscription = outer.subscribe(OuterObserver { sink });
            CompositeDisposable::from_members([outer_subscription, inner.into()]).into()
        })
    }
}

impl<T: Value> Observable<T> {
    /// Map every value to an observable and follow only the latest one.
    pub fn switch_map<U, F>(&self, selector: F) -> Observable<U>
    where
        U: Value,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        self.map(selector).switch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Notification;
    use crate::subject::Subject;

    #[test]
    fn only_latest_inner_is_forwarded() {
        let outer = Subject::new();
        let first = Subject::new();
        let second = Subject::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        outer
            .as_observable()
            .switch()
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));

        outer.on_next(first.as_observable());
        first.on_next(1);
        outer.on_next(second.as_observable());
        assert!(!first.has_observers());
        first.on_next(2);
        second.on_next(3);

        outer.on_completed();
        assert_eq!(events.lock().len(), 2);
        second.on_completed();

        assert_eq!(
            *events.lock(),
            vec![
                Notification::Next(1),
                Notification::Next(3),
                Notification::Completed
            ]
        );
    }

    #[test]
    fn outer_completion_without_inner_completes() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        Observable::<Observable<i32>>::empty()
            .switch()
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        assert_eq!(*events.lock(), vec![Notification::Completed]);
    }

    #[test]
    fn switch_map_restarts_on_each_value() {
        let trigger = Subject::new();
        let ticks = Subject::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let source = ticks.as_observable();
        trigger
            .as_observable()
            .switch_map(move |label: &'static str| source.map(move |t: i32| format!("{label}{t}")))
            .subscribe_next(move |v| sink.lock().push(v));

        trigger.on_next("a");
        ticks.on_next(1);
        trigger.on_next("b");
        ticks.on_next(2);

        assert_eq!(*seen.lock(), vec!["a1".to_string(), "b2".to_string()]);
    }
}
