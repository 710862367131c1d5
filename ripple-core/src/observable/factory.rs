//! Creation operators.
//!
//! Every operator that produces notifications by itself takes an explicit
//! scheduler in its `*_on` form. The short form uses the current-thread
//! trampoline, so a synchronous sequence is fully delivered before the
//! outermost `subscribe` returns without growing the call stack.

use std::time::Duration;

use crate::disposable::Disposable;
use crate::error::{guard, RxError};
use crate::observable::Observable;
use crate::scheduler::{
    schedule_recursive, schedule_recursive_after, CurrentThreadScheduler, SchedulerRef,
};
use crate::Value;

impl<T: Value> Observable<T> {
    /// Completes immediately without emitting.
    pub fn empty() -> Self {
        Self::empty_on(CurrentThreadScheduler::instance())
    }

    pub fn empty_on(scheduler: SchedulerRef) -> Self {
        Observable::create(move |observer| {
            scheduler.schedule(Box::new(move || observer.on_completed()))
        })
    }

    /// Never emits anything.
    pub fn never() -> Self {
        Observable::create(|_| Disposable::empty())
    }

    /// Fails immediately with `error`.
    pub fn throw(error: RxError) -> Self {
        Self::throw_on(error, CurrentThreadScheduler::instance())
    }

    pub fn throw_on(error: RxError, scheduler: SchedulerRef) -> Self {
        Observable::create(move |observer| {
            let error = error.clone();
            scheduler.schedule(Box::new(move || observer.on_error(error)))
        })
    }

    /// Emits `value`, then completes.
    pub fn just(value: T) -> Self {
        Self::just_on(value, CurrentThreadScheduler::instance())
    }

    pub fn just_on(value: T, scheduler: SchedulerRef) -> Self {
        Observable::create(move |observer| {
            let value = value.clone();
            scheduler.schedule(Box::new(move || {
                observer.on_next(value);
                observer.on_completed();
            }))
        })
    }

    /// Emits every item of `items`, one scheduled step per item, then
    /// completes. The collection is cloned for each subscription.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_iter_on(items, CurrentThreadScheduler::instance())
    }

    pub fn from_iter_on<I>(items: I, scheduler: SchedulerRef) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Observable::create(move |observer| {
            let iter = items.clone().into_iter();
            schedule_recursive(&scheduler, iter, move |mut iter, recursion| {
                match iter.next() {
                    Some(value) => {
                        observer.on_next(value);
                        recursion.schedule(iter);
                    }
                    None => observer.on_completed(),
                }
            })
        })
    }

    /// Calls `factory` on every subscription and subscribes to the result.
    pub fn defer<F>(factory: F) -> Self
    where
        F: Fn() -> Observable<T> + Send + Sync + 'static,
    {
        Observable::create(move |observer| match guard(&factory) {
            Ok(source) => source.subscribe_observer(observer),
            Err(error) => {
                observer.on_error(error);
                Disposable::empty()
            }
        })
    }
}

impl Observable<i64> {
    /// Emits `count` consecutive integers starting at `start`.
    pub fn range(start: i64, count: i64) -> Self {
        Self::range_on(start, count, CurrentThreadScheduler::instance())
    }

    pub fn range_on(start: i64, count: i64, scheduler: SchedulerRef) -> Self {
        let end = start.saturating_add(count.max(0));
        Self::from_iter_on(start..end, scheduler)
    }
}

impl Observable<u64> {
    /// Emits 0, 1, 2, ... every `period`, forever.
    pub fn interval(period: Duration, scheduler: SchedulerRef) -> Self {
        Observable::create(move |observer| {
            schedule_recursive_after(&scheduler, period, 0u64, move |tick, recursion| {
                observer.on_next(tick);
                recursion.schedule_after(period, tick + 1);
            })
        })
    }

    /// Emits 0 once `due` has elapsed, then completes.
    pub fn timer(due: Duration, scheduler: SchedulerRef) -> Self {
        Observable::create(move |observer| {
            scheduler.schedule_after(
                due,
                Box::new(move || {
                    observer.on_next(0);
                    observer.on_completed();
                }),
            )
        })
    }
}
