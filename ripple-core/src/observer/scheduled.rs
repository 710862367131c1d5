//! An observer that queues notifications and delivers them on a scheduler.
//!
//! Inbound calls only enqueue. [`ScheduledObserver::ensure_active`] starts a
//! recursive drain on the scheduler if one is not already running; the drain
//! delivers one notification per step, so delivery order matches arrival
//! order and long backlogs stay stack-safe on the trampoline.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Notification, Observer, ObserverRef};
use crate::disposable::{Dispose, SerialDisposable};
use crate::error::RxError;
use crate::scheduler::{schedule_recursive, SchedulerRef};
use crate::Value;

struct DrainState<T> {
    queue: VecDeque<Notification<T>>,
    active: bool,
}

struct ScheduledInner<T> {
    scheduler: SchedulerRef,
    observer: ObserverRef<T>,
    state: Mutex<DrainState<T>>,
    drain: SerialDisposable,
}

pub(crate) struct ScheduledObserver<T> {
    inner: Arc<ScheduledInner<T>>,
}

impl<T> Clone for ScheduledObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Value> ScheduledObserver<T> {
    pub(crate) fn new(scheduler: SchedulerRef, observer: ObserverRef<T>) -> Self {
        Self {
            inner: Arc::new(ScheduledInner {
                scheduler,
                observer,
                state: Mutex::new(DrainState {
                    queue: VecDeque::new(),
                    active: false,
                }),
                drain: SerialDisposable::new(),
            }),
        }
    }

    /// Start draining the queue unless a drain is already in flight.
    pub(crate) fn ensure_active(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.active || state.queue.is_empty() {
                return;
            }
            state.active = true;
        }

        let inner = Arc::clone(&self.inner);
        let drain = schedule_recursive(&self.inner.scheduler, (), move |(), recursion| {
            let next = {
                let mut state = inner.state.lock();
                let next = state.queue.pop_front();
                if next.is_none() {
                    state.active = false;
                }
                next
            };
            if let Some(notification) = next {
                notification.accept(&inner.observer);
                recursion.schedule(());
            }
        });
        self.inner.drain.set(drain);
    }

    /// Stop delivering and drop anything still queued.
    pub(crate) fn dispose(&self) {
        self.inner.drain.dispose();
        self.inner.state.lock().queue.clear();
    }

    pub(crate) fn same_as(&self, other: &ScheduledObserver<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn push(&self, notification: Notification<T>) {
        self.inner.state.lock().queue.push_back(notification);
    }
}

impl<T: Value> Observer<T> for ScheduledObserver<T> {
    fn on_next(&self, value: T) {
        self.push(Notification::Next(value));
    }

    fn on_error(&self, error: RxError) {
        self.push(Notification::Error(error));
    }

    fn on_completed(&self) {
        self.push(Notification::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ObserverBuilder;
    use crate::scheduler::{Scheduler, VirtualTimeScheduler};
    use std::time::Duration;

    #[test]
    fn delivers_in_order_only_when_scheduler_runs() {
        let vt = VirtualTimeScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let observer: ObserverRef<i32> = Arc::new(
            ObserverBuilder::new()
                .on_next(move |v| sink.lock().push(v))
                .build(),
        );
        let scheduled = ScheduledObserver::new(vt.clone(), observer);

        scheduled.on_next(1);
        scheduled.on_next(2);
        scheduled.ensure_active();
        scheduled.on_next(3);
        scheduled.ensure_active();
        assert!(log.lock().is_empty());

        vt.advance_by(Duration::ZERO);
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(vt.now(), Duration::ZERO);
    }

    #[test]
    fn dispose_drops_backlog() {
        let vt = VirtualTimeScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let observer: ObserverRef<i32> = Arc::new(
            ObserverBuilder::new()
                .on_next(move |v| sink.lock().push(v))
                .build(),
        );
        let scheduled = ScheduledObserver::new(vt.clone(), observer);
        scheduled.on_next(1);
        scheduled.ensure_active();
        scheduled.dispose();

        vt.start();
        assert!(log.lock().is_empty());
    }
}
