//! Single-source operators: projection, filtering, slicing, side effects,
//! materialization and scheduling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::forward;
use crate::disposable::{CompositeDisposable, Disposable};
use crate::error::{guard, Result, RxError};
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, Notification, Observer, ObserverRef, ScheduledObserver};
use crate::scheduler::SchedulerRef;
use crate::sync::{Gate, SerializedObserver};
use crate::Value;

impl<T: Value> Observable<T> {
    /// Project every value through `selector`.
    pub fn map<U, F>(&self, selector: F) -> Observable<U>
    where
        U: Value,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let selector = Arc::new(selector);
        Observable::create(move |observer| {
            let selector = Arc::clone(&selector);
            source.subscribe(forward(observer, move |downstream, value| {
                match guard(|| selector(value)) {
                    Ok(mapped) => downstream.on_next(mapped),
                    Err(error) => downstream.on_error(error),
                }
            }))
        })
    }

    /// Like [`map`](Self::map), with a selector that can fail.
    pub fn try_map<U, F>(&self, selector: F) -> Observable<U>
    where
        U: Value,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let selector = Arc::new(selector);
        Observable::create(move |observer| {
            let selector = Arc::clone(&selector);
            source.subscribe(forward(observer, move |downstream, value| {
                match guard(|| selector(value)).and_then(|mapped| mapped) {
                    Ok(mapped) => downstream.on_next(mapped),
                    Err(error) => downstream.on_error(error),
                }
            }))
        })
    }

    /// Keep the values matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.try_filter(move |value| Ok(predicate(value)))
    }

    pub fn try_filter<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> Result<bool> + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::create(move |observer| {
            let predicate = Arc::clone(&predicate);
            source.subscribe(forward(observer, move |downstream, value| {
                match guard(|| predicate(&value)).and_then(|keep| keep) {
                    Ok(true) => downstream.on_next(value),
                    Ok(false) => {}
                    Err(error) => downstream.on_error(error),
                }
            }))
        })
    }

    /// Emit every intermediate result of folding `accumulator` over the
    /// values, starting from `seed`.
    pub fn scan<A, F>(&self, seed: A, accumulator: F) -> Observable<A>
    where
        A: Value,
        F: Fn(A, T) -> A + Send + Sync + 'static,
    {
        let source = self.clone();
        let accumulator = Arc::new(accumulator);
        Observable::create(move |observer| {
            let accumulator = Arc::clone(&accumulator);
            let current = Mutex::new(seed.clone());
            source.subscribe(forward(observer, move |downstream, value| {
                let next = {
                    let mut current = current.lock();
                    let next = guard(|| accumulator(current.clone(), value));
                    if let Ok(next) = &next {
                        *current = next.clone();
                    }
                    next
                };
                match next {
                    Ok(next) => downstream.on_next(next),
                    Err(error) => downstream.on_error(error),
                }
            }))
        })
    }

    /// Emit the first `count` values, then complete and unsubscribe.
    pub fn take(&self, count: usize) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            if count == 0 {
                observer.on_completed();
                return Disposable::empty();
            }
            let remaining = AtomicUsize::new(count);
            source.subscribe(forward(observer, move |downstream, value| {
                match remaining.fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                    r.checked_sub(1)
                }) {
                    Ok(1) => {
                        downstream.on_next(value);
                        downstream.on_completed();
                    }
                    Ok(_) => downstream.on_next(value),
                    Err(_) => {}
                }
            }))
        })
    }

    /// Drop the first `count` values.
    pub fn skip(&self, count: usize) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let remaining = AtomicUsize::new(count);
            source.subscribe(forward(observer, move |downstream, value| {
                let skipped = remaining
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
                    .is_ok();
                if !skipped {
                    downstream.on_next(value);
                }
            }))
        })
    }

    /// Emit values while `predicate` holds, then complete.
    pub fn take_while<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::create(move |observer| {
            let predicate = Arc::clone(&predicate);
            source.subscribe(forward(observer, move |downstream, value| {
                match guard(|| predicate(&value)) {
                    Ok(true) => downstream.on_next(value),
                    Ok(false) => downstream.on_completed(),
                    Err(error) => downstream.on_error(error),
                }
            }))
        })
    }

    /// Mirror this sequence until `trigger` emits a value.
    pub fn take_until<U: Value>(&self, trigger: &Observable<U>) -> Observable<T> {
        let source = self.clone();
        let trigger = trigger.clone();
        Observable::create(move |observer| {
            let downstream = SerializedObserver::new(Gate::new(), observer);
            let on_signal = downstream.clone();
            let on_failure = downstream.clone();
            let stop = trigger.subscribe(AnonymousObserver::new(
                move |_| on_signal.on_completed(),
                move |error| on_failure.on_error(error),
                || {},
            ));
            let main = source.subscribe_observer(downstream);
            CompositeDisposable::from_members([stop, main]).into()
        })
    }

    /// Run `action` on every value before passing it on.
    pub fn tap<F>(&self, action: F) -> Observable<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let source = self.clone();
        let action = Arc::new(action);
        Observable::create(move |observer| {
            let action = Arc::clone(&action);
            source.subscribe(forward(observer, move |downstream, value| {
                match guard(|| action(&value)) {
                    Ok(()) => downstream.on_next(value),
                    Err(error) => downstream.on_error(error),
                }
            }))
        })
    }

    /// Emit `values` before this sequence.
    pub fn start_with(&self, values: Vec<T>) -> Observable<T> {
        Observable::concat_many(vec![Observable::from_iter(values), self.clone()])
    }

    /// Drop values equal to the one emitted just before.
    pub fn distinct_until_changed(&self) -> Observable<T>
    where
        T: PartialEq,
    {
        let source = self.clone();
        Observable::create(move |observer| {
            let last: Mutex<Option<T>> = Mutex::new(None);
            source.subscribe(forward(observer, move |downstream, value| {
                let changed = {
                    let mut last = last.lock();
                    if last.as_ref() == Some(&value) {
                        false
                    } else {
                        *last = Some(value.clone());
                        true
                    }
                };
                if changed {
                    downstream.on_next(value);
                }
            }))
        })
    }

    /// Run `action` once the subscription ends, by termination or disposal.
    pub fn finally<F>(&self, action: F) -> Observable<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let source = self.clone();
        let action = Arc::new(action);
        Observable::create(move |observer| {
            let subscription = source.subscribe_observer(observer);
            let action = Arc::clone(&action);
            Disposable::from_action(move || {
                subscription.dispose();
                action();
            })
        })
    }

    /// Turn every notification into a value. The output completes right
    /// after the materialized terminal notification.
    pub fn materialize(&self) -> Observable<Notification<T>> {
        let source = self.clone();
        Observable::create(move |observer: ObserverRef<Notification<T>>| {
            let values = observer.clone();
            let errors = observer.clone();
            source.subscribe(AnonymousObserver::new(
                move |value| values.on_next(Notification::Next(value)),
                move |error| {
                    errors.on_next(Notification::Error(error));
                    errors.on_completed();
                },
                move || {
                    observer.on_next(Notification::Completed);
                    observer.on_completed();
                },
            ))
        })
    }

    /// Deliver notifications to the observer on `scheduler`.
    pub fn observe_on(&self, scheduler: SchedulerRef) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let scheduled = ScheduledObserver::new(Arc::clone(&scheduler), observer);
            let subscription = source.subscribe(ObserveOn {
                scheduled: scheduled.clone(),
            });
            Disposable::from_action(move || {
                subscription.dispose();
                scheduled.dispose();
            })
        })
    }

    /// Perform the subscription itself on `scheduler`.
    pub fn subscribe_on(&self, scheduler: SchedulerRef) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let group = CompositeDisposable::new();
            let target = group.clone();
            let source = source.clone();
            let pending = scheduler.schedule(Box::new(move || {
                target.add(source.subscribe_observer(observer));
            }));
            group.add(pending);
            group.into()
        })
    }

    /// Collect every value and emit them as one `Vec` on completion.
    pub fn to_vec(&self) -> Observable<Vec<T>> {
        let source = self.clone();
        Observable::create(move |observer: ObserverRef<Vec<T>>| {
            let items = Arc::new(Mutex::new(Vec::new()));
            let collected = Arc::clone(&items);
            let errors = observer.clone();
            source.subscribe(AnonymousObserver::new(
                move |value| items.lock().push(value),
                move |error| errors.on_error(error),
                move || {
                    let all = std::mem::take(&mut *collected.lock());
                    observer.on_next(all);
                    observer.on_completed();
                },
            ))
        })
    }
}

impl<T: Value> Observable<Notification<T>> {
    /// Replay materialized notifications as a live sequence.
    pub fn dematerialize(&self) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            source.subscribe(forward(observer, |downstream, notification: Notification<T>| {
                notification.accept(downstream)
            }))
        })
    }
}

struct ObserveOn<T> {
    scheduled: ScheduledObserver<T>,
}

impl<T: Value> Observer<T> for ObserveOn<T> {
    fn on_next(&self, value: T) {
        self.scheduled.on_next(value);
        self.scheduled.ensure_active();
    }

    fn on_error(&self, error: RxError) {
        self.scheduled.on_error(error);
        self.scheduled.ensure_active();
    }

    fn on_completed(&self) {
        self.scheduled.on_completed();
        self.scheduled.ensure_active();
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::scheduler::{Scheduler, VirtualTimeScheduler};
    use crate::subject::Subject;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn collect<T: Value>(source: &Observable<T>) -> Arc<Mutex<Vec<Notification<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        source
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        events
    }

    fn values<T: Value>(events: &Mutex<Vec<Notification<T>>>) -> Vec<T> {
        events.lock().iter().filter_map(|n| n.value().cloned()).collect()
    }

    #[test]
    fn map_and_filter_compose() {
        let events = collect(
            &Observable::range(1, 6)
                .filter(|v| v % 2 == 1)
                .map(|v| v * v),
        );
        assert_eq!(values(&events), vec![1, 9, 25]);
        assert_eq!(events.lock().last(), Some(&Notification::Completed));
    }

    #[test]
    fn panicking_selector_becomes_error_notification() {
        let events = collect(&Observable::from_iter(vec![1, 0, 2]).map(|v: i32| {
            if v == 0 {
                panic!("division by zero");
            }
            10 / v
        }));

        let events = events.lock();
        assert_eq!(events[0], Notification::Next(10));
        let error = events[1].error().expect("error notification");
        assert_eq!(error.kind(), ErrorKind::Callback);
        assert_eq!(error.message(), "division by zero");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn try_map_propagates_returned_error() {
        let events = collect(&Observable::from_iter(vec!["1", "x"]).try_map(|s: &str| {
            s.parse::<i32>()
                .map_err(|e| RxError::argument(format!("bad number {s:?}")).with_cause(e))
        }));
        let events = events.lock();
        assert_eq!(events[0], Notification::Next(1));
        assert_eq!(events[1].error().map(RxError::kind), Some(ErrorKind::Argument));
    }

    #[test]
    fn scan_emits_running_totals() {
        let events = collect(&Observable::range(1, 4).scan(0, |acc, v| acc + v));
        assert_eq!(values(&events), vec![1, 3, 6, 10]);
    }

    #[test]
    fn take_completes_and_releases_source() {
        let subject = Subject::new();
        let events = collect(&subject.as_observable().take(2));

        subject.on_next(1);
        assert!(subject.has_observers());
        subject.on_next(2);
        subject.on_next(3);

        assert_eq!(
            *events.lock(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Completed
            ]
        );
        assert!(!subject.has_observers());
    }

    #[test]
    fn take_zero_completes_without_subscribing() {
        let subscribed = Arc::new(AtomicBool::new(false));
        let flag = subscribed.clone();
        let source = Observable::<i32>::create(move |_| {
            flag.store(true, Ordering::SeqCst);
            Disposable::empty()
        });

        let events = collect(&source.take(0));
        assert_eq!(*events.lock(), vec![Notification::Completed]);
        assert!(!subscribed.load(Ordering::SeqCst));
    }

    #[test]
    fn skip_and_take_while_slice_the_sequence() {
        let events = collect(&Observable::range(0, 10).skip(3).take_while(|v| *v < 6));
        assert_eq!(values(&events), vec![3, 4, 5]);
        assert_eq!(events.lock().last(), Some(&Notification::Completed));
    }

    #[test]
    fn take_until_stops_on_trigger() {
        let source = Subject::new();
        let trigger = Subject::<()>::new();
        let events = collect(&source.as_observable().take_until(&trigger.as_observable()));

        source.on_next(1);
        trigger.on_next(());
        source.on_next(2);

        assert_eq!(
            *events.lock(),
            vec![Notification::Next(1), Notification::Completed]
        );
        assert!(!source.has_observers());
        assert!(!trigger.has_observers());
    }

    #[test]
    fn distinct_until_changed_drops_repeats() {
        let events =
            collect(&Observable::from_iter(vec![1, 1, 2, 2, 2, 1, 3]).distinct_until_changed());
        assert_eq!(values(&events), vec![1, 2, 1, 3]);
    }

    #[test]
    fn start_with_prepends_values() {
        let events = collect(&Observable::from_iter(vec![3, 4]).start_with(vec![1, 2]));
        assert_eq!(values(&events), vec![1, 2, 3, 4]);
    }

    #[test]
    fn finally_runs_on_completion_and_on_dispose() {
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        collect(&Observable::just(1).finally(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let counter = runs.clone();
        let handle = Observable::<i32>::never()
            .finally(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .subscribe_next(|_| {});
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        handle.dispose();
        handle.dispose();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tap_sees_values_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        collect(&Observable::range(1, 3).tap(move |v| sink.lock().push(*v)));
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn dematerialize_restores_the_protocol() {
        let events = collect(
            &Observable::from_iter(vec![
                Notification::Next(1),
                Notification::Error(RxError::upstream("stop")),
                Notification::Next(2),
            ])
            .dematerialize(),
        );
        assert_eq!(
            *events.lock(),
            vec![
                Notification::Next(1),
                Notification::Error(RxError::upstream("stop"))
            ]
        );
    }

    #[test]
    fn observe_on_defers_delivery_to_scheduler() {
        let vt = VirtualTimeScheduler::new();
        let events = collect(&Observable::from_iter(vec![1, 2]).observe_on(vt.clone()));
        assert!(events.lock().is_empty());

        vt.start();
        assert_eq!(values(&events), vec![1, 2]);
        assert_eq!(events.lock().last(), Some(&Notification::Completed));
    }

    #[test]
    fn subscribe_on_defers_subscription() {
        let vt = VirtualTimeScheduler::new();
        let subscribed_at = Arc::new(Mutex::new(None));
        let stamp = subscribed_at.clone();
        let clock = vt.clone();
        let source = Observable::<i32>::create(move |_| {
            *stamp.lock() = Some(clock.now());
            Disposable::empty()
        });

        source
            .subscribe_on(vt.clone())
            .subscribe_next(|_| {});
        assert!(subscribed_at.lock().is_none());

        vt.advance_to(Duration::from_millis(3));
        assert_eq!(*subscribed_at.lock(), Some(Duration::ZERO));
    }

    #[test]
    fn to_vec_emits_everything_at_once() {
        let events = collect(&Observable::range(1, 3).to_vec());
        assert_eq!(
            *events.lock(),
            vec![Notification::Next(vec![1, 2, 3]), Notification::Completed]
        );
    }
}
