//! Merge: run inner sources concurrently and interleave their values.
//!
//! All inner subscriptions live in one composite group. A shared counter
//! tracks the outer source plus every active inner source; `completed` is
//! forwarded only when it drops to zero. The first error from anywhere is
//! forwarded and, through the downstream guard, disposes the whole group.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::disposable::{CompositeDisposable, Disposable, SingleAssignmentDisposable};
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, Observer, ObserverRef};
use crate::sync::{Gate, SerializedObserver};
use crate::Value;

struct MergeSink<T> {
    downstream: Arc<SerializedObserver<T>>,
    group: CompositeDisposable,
    active: AtomicUsize,
}

impl<T: Value> MergeSink<T> {
    fn release_one(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.downstream.on_completed();
        }
    }

    fn subscribe_inner(self: &Arc<Self>, inner: Observable<T>) {
        self.active.fetch_add(1, Ordering::AcqRel);

        let slot = SingleAssignmentDisposable::new();
        let member: Disposable = slot.clone().into();
        self.group.add(member.clone());

        let values = Arc::clone(&self.downstream);
        let errors = Arc::clone(&self.downstream);
        let sink = Arc::clone(self);
        slot.set(inner.subscribe(AnonymousObserver::new(
            move |value| values.on_next(value),
            move |error| errors.on_error(error),
            move || {
                sink.group.remove(&member);
                sink.release_one();
            },
        )));
    }
}

struct OuterObserver<T> {
    sink: Arc<MergeSink<T>>,
}

impl<T: Value> Observer<Observable<T>> for OuterObserver<T> {
    fn on_next(&self, inner: Observable<T>) {
        self.sink.subscribe_inner(inner);
    }

    fn on_error(&self, error: RxError) {
        self.sink.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.sink.release_one();
    }
}

impl<T: Value> Observable<Observable<T>> {
    /// Subscribe to every inner observable as it arrives and forward all of
    /// their values.
    pub fn merge_all(&self) -> Observable<T> {
        let outer = self.clone();
        Observable::create(move |observer: ObserverRef<T>| {
            let sink = Arc::new(MergeSink {
                downstream: SerializedObserver::new(Gate::new(), observer),
                group: CompositeDisposable::new(),
                active: AtomicUsize::new(1),
            });
            let group = sink.group.clone();
            group.add(outer.subscribe(OuterObserver { sink }));
            group.into()
        })
    }
}

impl<T: Value> Observable<T> {
    pub fn merge(&self, other: &Observable<T>) -> Observable<T> {
        Observable::merge_many(vec![self.clone(), other.clone()])
    }

    pub fn merge_many(sources: Vec<Observable<T>>) -> Observable<T> {
        Observable::from_iter(sources).merge_all()
    }

    /// Map every value to an observable and merge the results.
    pub fn flat_map<U, F>(&self, selector: F) -> Observable<U>
    where
        U: Value,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        self.map(selector).merge_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::Notification;
    use crate::subject::Subject;
    use parking_lot::Mutex;

    fn collect<T: Value>(source: &Observable<T>) -> Arc<Mutex<Vec<Notification<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        source
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        events
    }

    #[test]
    fn completes_after_every_source_completes() {
        let a = Subject::new();
        let b = Subject::new();
        let events = collect(&a.as_observable().merge(&b.as_observable()));

        a.on_next(1);
        b.on_next(2);
        a.on_completed();
        assert_eq!(events.lock().len(), 2);
        b.on_completed();

        assert_eq!(
            *events.lock(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Completed
            ]
        );
    }

    #[test]
    fn first_error_disposes_siblings() {
        let a = Subject::<i32>::new();
        let b = Subject::<i32>::new();
        let events = collect(&a.as_observable().merge(&b.as_observable()));

        a.on_error(RxError::upstream("a failed"));
        assert!(!b.has_observers());
        b.on_next(5);

        assert_eq!(
            *events.lock(),
            vec![
                Notification::Error(RxError::upstream("a failed"))
            ]
        );
    }

    #[test]
    fn flat_map_flattens_inner_sequences() {
        let events = collect(&Observable::range(1, 3).flat_map(|n| Observable::range(0, n)));
        let mut values: Vec<i64> = events
            .lock()
            .iter()
            .filter_map(|n| n.value().copied())
            .collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 0, 0, 1, 1, 2]);
        assert_eq!(events.lock().last(), Some(&Notification::Completed));
    }

    #[test]
    fn empty_outer_completes() {
        let events = collect(&Observable::<Observable<i32>>::empty().merge_all());
        assert_eq!(*events.lock(), vec![Notification::Completed]);
    }
}
