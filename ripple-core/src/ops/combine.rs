//! Two-source combinators: combine-latest and zip.
//!
//! Both keep their per-subscription state behind a mutex and run every
//! callback under the operator's gate, so the selector sees a consistent
//! view and the downstream receives one serialized stream.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::disposable::CompositeDisposable;
use crate::error::guard;
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, Observer, ObserverRef};
use crate::sync::{Gate, SerializedObserver};
use crate::Value;

struct LatestState<L, R> {
    left: Option<L>,
    right: Option<R>,
    left_done: bool,
    right_done: bool,
}

struct ZipState<L, R> {
    left: VecDeque<L>,
    right: VecDeque<R>,
    left_done: bool,
    right_done: bool,
}

enum Side {
    Left,
    Right,
}

impl<T: Value> Observable<T> {
    /// Emit `selector(left, right)` with the latest value of each side
    /// whenever either side emits, once both sides have emitted.
    ///
    /// Completes once both sides have completed; fails as soon as either
    /// side fails.
    pub fn combine_latest<U, R, F>(&self, other: &Observable<U>, selector: F) -> Observable<R>
    where
        U: Value,
        R: Value,
        F: Fn(&T, &U) -> R + Send + Sync + 'static,
    {
        let left = self.clone();
        let right = other.clone();
        let selector: LatestSelector<T, U, R> = Arc::new(selector);
        Observable::create(move |observer: ObserverRef<R>| {
            let sink = Arc::new(LatestSink {
                downstream: SerializedObserver::new(Gate::new(), observer),
                selector: Arc::clone(&selector),
                state: Mutex::new(LatestState {
                    left: None,
                    right: None,
                    left_done: false,
                    right_done: false,
                }),
            });

            let (values, errors, done) = (Arc::clone(&sink), Arc::clone(&sink), Arc::clone(&sink));
            let left_subscription = left.subscribe(AnonymousObserver::new(
                move |value| values.update(|state| state.left = Some(value)),
                move |error| errors.downstream.on_error(error),
                move || done.finish(Side::Left),
            ));

            let (values, errors, done) = (Arc::clone(&sink), Arc::clone(&sink), sink);
            let right_subscription = right.subscribe(AnonymousObserver::new(
                move |value| values.update(|state| state.right = Some(value)),
                move |error| errors.downstream.on_error(error),
                move || done.finish(Side::Right),
            ));

            CompositeDisposable::from_members([left_subscription, right_subscription]).into()
        })
    }

    /// Pair the n-th value of each side through `selector`.
    ///
    /// The side that is ahead is buffered. Completes as soon as one side has
    /// completed and has no buffered values left; values the other side
    /// produces beyond that point are never paired.
    pub fn zip<U, R, F>(&self, other: &Observable<U>, selector: F) -> Observable<R>
    where
        U: Value,
        R: Value,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        let left = self.clone();
        let right = other.clone();
        let selector: ZipSelector<T, U, R> = Arc::new(selector);
        Observable::create(move |observer: ObserverRef<R>| {
            let sink = Arc::new(ZipSink {
                downstream: SerializedObserver::new(Gate::new(), observer),
                selector: Arc::clone(&selector),
                state: Mutex::new(ZipState {
                    left: VecDeque::new(),
                    right: VecDeque::new(),
                    left_done: false,
                    right_done: false,
                }),
            });

            let (values, errors, done) = (Arc::clone(&sink), Arc::clone(&sink), Arc::clone(&sink));
            let left_subscription = left.subscribe(AnonymousObserver::new(
                move |value| values.push(|state| state.left.push_back(value)),
                move |error| errors.downstream.on_error(error),
                move || done.finish(Side::Left),
            ));

            let (values, errors, done) = (Arc::clone(&sink), Arc::clone(&sink), sink);
            let right_subscription = right.subscribe(AnonymousObserver::new(
                move |value| values.push(|state| state.right.push_back(value)),
                move |error| errors.downstream.on_error(error),
                move || done.finish(Side::Right),
            ));

            CompositeDisposable::from_members([left_subscription, right_subscription]).into()
        })
    }
}

type LatestSelector<L, R, O> = Arc<dyn Fn(&L, &R) -> O + Send + Sync>;

struct LatestSink<L, R, O> {
    downstream: Arc<SerializedObserver<O>>,
    selector: LatestSelector<L, R, O>,
    state: Mutex<LatestState<L, R>>,
}

impl<L: Value, R: Value, O: Value> LatestSink<L, R, O> {
    fn update(&self, store: impl FnOnce(&mut LatestState<L, R>)) {
        self.downstream.gate().run(|| {
            let pair = {
                let mut state = self.state.lock();
                store(&mut state);
                match (&state.left, &state.right) {
                    (Some(l), Some(r)) => Some((l.clone(), r.clone())),
                    _ => None,
                }
            };
            if let Some((l, r)) = pair {
                match guard(|| (self.selector)(&l, &r)) {
                    Ok(value) => self.downstream.on_next(value),
                    Err(error) => self.downstream.on_error(error),
                }
            }
        })
    }

    fn finish(&self, side: Side) {
        self.downstream.gate().run(|| {
            let finished = {
                let mut state = self.state.lock();
                match side {
                    Side::Left => state.left_done = true,
                    Side::Right => state.right_done = true,
                }
                state.left_done && state.right_done
            };
            if finished {
                self.downstream.on_completed();
            }
        })
    }
}

type ZipSelector<L, R, O> = Arc<dyn Fn(L, R) -> O + Send + Sync>;

struct ZipSink<L, R, O> {
    downstream: Arc<SerializedObserver<O>>,
    selector: ZipSelector<L, R, O>,
    state: Mutex<ZipState<L, R>>,
}

impl<L: Value, R: Value, O: Value> ZipSink<L, R, O> {
    fn push(&self, enqueue: impl FnOnce(&mut ZipState<L, R>)) {
        self.downstream.gate().run(|| {
            let (pair, finished) = {
                let mut state = self.state.lock();
                enqueue(&mut state);
                let pair = if !state.left.is_empty() && !state.right.is_empty() {
                    state.left.pop_front().zip(state.right.pop_front())
                } else {
                    None
                };
                (pair, Self::exhausted(&state))
            };

            if let Some((l, r)) = pair {
                match guard(|| (self.selector)(l, r)) {
                    Ok(value) => self.downstream.on_next(value),
                    Err(error) => {
                        self.downstream.on_error(error);
                        return;
                    }
                }
            }
            if finished {
                self.downstream.on_completed();
            }
        })
    }

    fn finish(&self, side: Side) {
        self.downstream.gate().run(|| {
            let finished = {
                let mut state = self.state.lock();
                match side {
                    Side::Left => state.left_done = true,
                    Side::Right => state.right_done = true,
                }
                Self::exhausted(&state)
            };
            if finished {
                self.downstream.on_completed();
            }
        })
    }

    fn exhausted(state: &ZipState<L, R>) -> bool {
        (state.left_done && state.left.is_empty()) || (state.right_done && state.right.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RxError;
    use crate::observer::Notification;
    use crate::subject::Subject;

    fn collect<T: Value>(source: &Observable<T>) -> Arc<Mutex<Vec<Notification<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        source
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        events
    }

    #[test]
    fn combine_latest_waits_for_both_sides() {
        let left = Subject::new();
        let right = Subject::new();
        let events = collect(
            &left
                .as_observable()
                .combine_latest(&right.as_observable(), |l: &i32, r: &char| format!("{l}{r}")),
        );

        left.on_next(1);
        left.on_next(2);
        right.on_next('a');
        left.on_next(3);
        right.on_next('b');
        left.on_completed();
        right.on_completed();

        assert_eq!(
            *events.lock(),
            vec![
                Notification::Next("2a".to_string()),
                Notification::Next("3a".to_string()),
                Notification::Next("3b".to_string()),
                Notification::Completed
            ]
        );
    }

    #[test]
    fn combine_latest_requires_both_completions() {
        let left = Subject::<i32>::new();
        let right = Subject::<i32>::new();
        let events = collect(&left.as_observable().combine_latest(&right.as_observable(), |l, r| l + r));

        left.on_completed();
        assert!(events.lock().is_empty());
        right.on_completed();
        assert_eq!(*events.lock(), vec![Notification::Completed]);
    }

    #[test]
    fn combine_latest_fails_fast() {
        let left = Subject::<i32>::new();
        let right = Subject::<i32>::new();
        let events = collect(&left.as_observable().combine_latest(&right.as_observable(), |l, r| l + r));

        right.on_error(RxError::upstream("right broke"));
        assert!(!left.has_observers());
        assert_eq!(
            *events.lock(),
            vec![
                Notification::Error(RxError::upstream("right broke"))
            ]
        );
    }

    #[test]
    fn zip_buffers_the_side_that_is_ahead() {
        let left = Subject::new();
        let right = Subject::new();
        let events = collect(&left.as_observable().zip(&right.as_observable(), |l: i32, r: i32| l * r));

        left.on_next(1);
        left.on_next(2);
        left.on_next(3);
        right.on_next(10);
        right.on_next(20);

        assert_eq!(
            *events.lock(),
            vec![Notification::Next(10), Notification::Next(40)]
        );
    }

    #[test]
    fn zip_completes_when_exhausted_side_is_drained() {
        let left = Subject::new();
        let right = Subject::new();
        let events = collect(&left.as_observable().zip(&right.as_observable(), |l: i32, r: i32| l + r));

        left.on_next(1);
        left.on_completed();
        assert!(events.lock().is_empty());
        right.on_next(5);

        assert_eq!(
            *events.lock(),
            vec![Notification::Next(6), Notification::Completed]
        );
        assert!(!right.has_observers());
    }

    #[test]
    fn zip_selector_panic_is_an_error() {
        let events = collect(&Observable::just(1).zip(&Observable::just(0), |l: i32, r: i32| {
            if r == 0 {
                panic!("zero");
            }
            l / r
        }));
        let events = events.lock();
        assert_eq!(events[0].error().map(RxError::message), Some("zero"));
    }
}
