//! Sequencing operators: retry, repeat, concat and catch.
//!
//! Each resubscription is one step of a recursive schedule on the
//! current-thread trampoline, so long chains of synchronous resubscriptions
//! do not grow the stack, and disposing the outer handle cancels a step
//! that is already queued.

use std::sync::Arc;

use tracing::debug;

use crate::disposable::{CompositeDisposable, Disposable, SerialDisposable};
use crate::error::{guard, RxError};
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, ObserverRef};
use crate::scheduler::{schedule_recursive, CurrentThreadScheduler};
use crate::Value;

/// Which terminal notification triggers a resubscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resubscribe {
    OnError,
    OnCompleted,
}

fn resubscribe<T: Value>(
    source: Observable<T>,
    trigger: Resubscribe,
    limit: Option<usize>,
) -> Observable<T> {
    Observable::create(move |observer: ObserverRef<T>| {
        if limit == Some(0) {
            observer.on_completed();
            return Disposable::empty();
        }

        let current = SerialDisposable::new();
        let slot = current.clone();
        let source = source.clone();
        let steps = schedule_recursive(
            &CurrentThreadScheduler::instance(),
            1usize,
            move |attempt, recursion| {
                let last = limit.is_some_and(|max| attempt >= max);
                let (values, errors, done) = (observer.clone(), observer.clone(), observer.clone());
                let (on_error, on_completed) = (recursion.clone(), recursion.clone());
                let subscription = source.subscribe(AnonymousObserver::new(
                    move |value| values.on_next(value),
                    move |error| {
                        if trigger == Resubscribe::OnError && !last {
                            debug!(attempt, %error, "resubscribing after error");
                            on_error.schedule(attempt + 1);
                        } else {
                            errors.on_error(error);
                        }
                    },
                    move || {
                        if trigger == Resubscribe::OnCompleted && !last {
                            debug!(attempt, "resubscribing after completion");
                            on_completed.schedule(attempt + 1);
                        } else {
                            done.on_completed();
                        }
                    },
                ));
                slot.set(subscription);
            },
        );

        CompositeDisposable::from_members([current.into(), steps]).into()
    })
}

impl<T: Value> Observable<T> {
    /// Resubscribe on error. `count` is the total number of subscriptions;
    /// the last error is forwarded once they are used up.
    pub fn retry(&self, count: usize) -> Observable<T> {
        resubscribe(self.clone(), Resubscribe::OnError, Some(count))
    }

    /// Resubscribe on every error.
    pub fn retry_forever(&self) -> Observable<T> {
        resubscribe(self.clone(), Resubscribe::OnError, None)
    }

    /// Subscribe `count` times in a row, completing after the last.
    pub fn repeat(&self, count: usize) -> Observable<T> {
        resubscribe(self.clone(), Resubscribe::OnCompleted, Some(count))
    }

    /// Resubscribe on every completion.
    pub fn repeat_forever(&self) -> Observable<T> {
        resubscribe(self.clone(), Resubscribe::OnCompleted, None)
    }

    /// Emit this sequence, then `other`.
    pub fn concat(&self, other: &Observable<T>) -> Observable<T> {
        Observable::concat_many(vec![self.clone(), other.clone()])
    }

    /// Subscribe to each source in turn, starting the next once the
    /// previous completes.
    pub fn concat_many(sources: Vec<Observable<T>>) -> Observable<T> {
        let sources = Arc::new(sources);
        Observable::create(move |observer: ObserverRef<T>| {
            let current = SerialDisposable::new();
            let slot = current.clone();
            let sources = Arc::clone(&sources);
            let steps = schedule_recursive(
                &CurrentThreadScheduler::instance(),
                0usize,
                move |index, recursion| {
                    let Some(source) = sources.get(index) else {
                        observer.on_completed();
                        return;
                    };
                    let (values, errors) = (observer.clone(), observer.clone());
                    let next = recursion.clone();
                    slot.set(source.subscribe(AnonymousObserver::new(
                        move |value| values.on_next(value),
                        move |error| errors.on_error(error),
                        move || next.schedule(index + 1),
                    )));
                },
            );
            CompositeDisposable::from_members([current.into(), steps]).into()
        })
    }

    /// On error, continue with the observable returned by `handler`.
    pub fn catch_error<F>(&self, handler: F) -> Observable<T>
    where
        F: Fn(RxError) -> Observable<T> + Send + Sync + 'static,
    {
        let source = self.clone();
        let handler = Arc::new(handler);
        Observable::create(move |observer: ObserverRef<T>| {
            let current = SerialDisposable::new();
            let slot = current.clone();
            let handler = Arc::clone(&handler);
            let (values, done) = (observer.clone(), observer.clone());
            current.set(source.subscribe(AnonymousObserver::new(
                move |value| values.on_next(value),
                move |error| match guard(|| handler(error)) {
                    Ok(fallback) => slot.set(fallback.subscribe_observer(observer.clone())),
                    Err(error) => observer.on_error(error),
                },
                move || done.on_completed(),
            )));
            current.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Notification;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collect<T: Value>(source: &Observable<T>) -> Arc<Mutex<Vec<Notification<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        source
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        events
    }

    /// Fails on the first `failures` subscriptions, then emits `value`.
    fn flaky(failures: usize, value: i32) -> (Observable<i32>, Arc<AtomicUsize>) {
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let counter = subscriptions.clone();
        let source = Observable::defer(move || {
            if counter.fetch_add(1, Ordering::SeqCst) < failures {
                Observable::throw(RxError::upstream("flaky"))
            } else {
                Observable::just(value)
            }
        });
        (source, subscriptions)
    }

    #[test]
    fn retry_resubscribes_until_success() {
        let (source, subscriptions) = flaky(2, 7);
        let events = collect(&source.retry(3));
        assert_eq!(
            *events.lock(),
            vec![Notification::Next(7), Notification::Completed]
        );
        assert_eq!(subscriptions.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_forwards_error_when_attempts_run_out() {
        let (source, subscriptions) = flaky(5, 7);
        let events = collect(&source.retry(2));
        assert_eq!(
            *events.lock(),
            vec![
                Notification::Error(RxError::upstream("flaky"))
            ]
        );
        assert_eq!(subscriptions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn repeat_counts_total_subscriptions() {
        let events = collect(&Observable::from_iter(vec![1, 2]).repeat(3));
        let values: Vec<_> = events.lock().iter().filter_map(|n| n.value().copied()).collect();
        assert_eq!(values, vec![1, 2, 1, 2, 1, 2]);
        assert_eq!(events.lock().last(), Some(&Notification::Completed));
    }

    #[test]
    fn repeat_forever_is_stack_safe_and_cancellable() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let events = collect(
            &Observable::just(1)
                .repeat_forever()
                .tap(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .take(50_000),
        );
        assert_eq!(seen.load(Ordering::SeqCst), 50_000);
        assert_eq!(events.lock().last(), Some(&Notification::Completed));
    }

    #[test]
    fn zero_count_completes_immediately() {
        let (source, subscriptions) = flaky(1, 1);
        let events = collect(&source.retry(0));
        assert_eq!(*events.lock(), vec![Notification::Completed]);
        assert_eq!(subscriptions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concat_runs_sources_in_order() {
        let events = collect(&Observable::concat_many(vec![
            Observable::from_iter(vec![1, 2]),
            Observable::empty(),
            Observable::just(3),
        ]));
        let values: Vec<_> = events.lock().iter().filter_map(|n| n.value().copied()).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(events.lock().len(), 4);
    }

    #[test]
    fn concat_stops_at_first_error() {
        let events = collect(
            &Observable::throw(RxError::upstream("first")).concat(&Observable::just(1)),
        );
        assert_eq!(
            *events.lock(),
            vec![
                Notification::Error(RxError::upstream("first"))
            ]
        );
    }

    #[test]
    fn catch_error_switches_to_handler_result() {
        let events = collect(
            &Observable::just(1)
                .concat(&Observable::throw(RxError::upstream("broken")))
                .catch_error(|error| Observable::just(error.message().len() as i32)),
        );
        assert_eq!(
            *events.lock(),
            vec![
                Notification::Next(1),
                Notification::Next(6),
                Notification::Completed
            ]
        );
    }
}
