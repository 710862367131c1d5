use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{remove_observer, ObserverList, SubjectLike};
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Notification, Observer, ObserverRef, ScheduledObserver};
use crate::scheduler::{CurrentThreadScheduler, SchedulerRef};
use crate::Value;

struct ReplayState<T> {
    buffer: VecDeque<(Duration, T)>,
    terminal: Option<Notification<T>>,
    observers: ObserverList<ScheduledObserver<T>>,
    next_id: u64,
}

struct ReplayInner<T> {
    state: Mutex<ReplayState<T>>,
    buffer_size: Option<usize>,
    window: Option<Duration>,
    scheduler: SchedulerRef,
}

impl<T> ReplayInner<T> {
    fn trim(&self, state: &mut ReplayState<T>) {
        if let Some(size) = self.buffer_size {
            while state.buffer.len() > size {
                state.buffer.pop_front();
            }
        }
        if let Some(window) = self.window {
            let now = self.scheduler.now();
            while let Some((stamp, _)) = state.buffer.front() {
                if now.saturating_sub(*stamp) > window {
                    state.buffer.pop_front();
                } else {
                    break;
                }
            }
        }
    }
}

/// Replays buffered values to every new subscriber, then forwards live
/// notifications.
///
/// The buffer holds at most `buffer_size` values, none older than `window`.
/// Replay and live delivery both go through the subject's scheduler, one
/// queue per subscriber, so a subscriber sees history strictly before new
/// values.
pub struct ReplaySubject<T> {
    inner: Arc<ReplayInner<T>>,
}

impl<T> Clone for ReplaySubject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Value> Default for ReplaySubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value> ReplaySubject<T> {
    /// Unbounded replay on the current-thread scheduler.
    pub fn new() -> Self {
        Self::with_options(None, None, CurrentThreadScheduler::instance())
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self::with_options(Some(buffer_size), None, CurrentThreadScheduler::instance())
    }

    pub fn with_window(window: Duration, scheduler: SchedulerRef) -> Self {
        Self::with_options(None, Some(window), scheduler)
    }

    pub fn with_options(
        buffer_size: Option<usize>,
        window: Option<Duration>,
        scheduler: SchedulerRef,
    ) -> Self {
        Self {
            inner: Arc::new(ReplayInner {
                state: Mutex::new(ReplayState {
                    buffer: VecDeque::new(),
                    terminal: None,
                    observers: ObserverList::new(),
                    next_id: 0,
                }),
                buffer_size,
                window,
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

    /// Most recent buffered value and the stored error, if any.
    pub(crate) fn latest(&self) -> (Option<T>, Option<RxError>) {
        let mut state = self.inner.state.lock();
        self.inner.trim(&mut state);
        let value = state.buffer.back().map(|(_, value)| value.clone());
        let error = state.terminal.as_ref().and_then(|t| t.error().cloned());
        (value, error)
    }

    fn terminate(&self, terminal: Notification<T>) {
        let observers = {
            let mut state = self.inner.state.lock();
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(terminal.clone());
            self.inner.trim(&mut state);
            std::mem::take(&mut state.observers)
        };
        debug!(
            kind = ?terminal.kind(),
            observers = observers.len(),
            "replay subject terminated"
        );
        for (_, observer) in observers {
            terminal.clone().accept(&observer);
            observer.ensure_active();
        }
    }
}

fn subscribe_core<T: Value>(inner: &Arc<ReplayInner<T>>, observer: ObserverRef<T>) -> Disposable {
    let scheduled = ScheduledObserver::new(Arc::clone(&inner.scheduler), observer);
    let id = {
        let mut state = inner.state.lock();
        inner.trim(&mut state);
        for (_, value) in &state.buffer {
            scheduled.on_next(value.clone());
        }
        match state.terminal.clone() {
            Some(terminal) => {
                terminal.accept(&scheduled);
                None
            }
            None => {
                let id = state.next_id;
                state.next_id += 1;
                state.observers.push((id, scheduled.clone()));
                Some(id)
            }
        }
    };
    scheduled.ensure_active();

    let weak: Weak<ReplayInner<T>> = Arc::downgrade(inner);
    Disposable::from_action(move || {
        if let (Some(id), Some(inner)) = (id, weak.upgrade()) {
            remove_observer(&mut inner.state.lock().observers, id);
        }
        scheduled.dispose();
    })
}

impl<T: Value> Observer<T> for ReplaySubject<T> {
    fn on_next(&self, value: T) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.terminal.is_some() {
                return;
            }
            let now = self.inner.scheduler.now();
            state.buffer.push_back((now, value.clone()));
            self.inner.trim(&mut state);
            state.observers.clone()
        };
        for (_, observer) in snapshot {
            observer.on_next(value.clone());
            observer.ensure_active();
        }
    }

    fn on_error(&self, error: RxError) {
        self.terminate(Notification::Error(error));
    }

    fn on_completed(&self) {
        self.terminate(Notification::Completed);
    }
}

impl<T: Value> SubjectLike<T> for ReplaySubject<T> {
    fn as_observable(&self) -> Observable<T> {
        ReplaySubject::as_observable(self)
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::VirtualTimeScheduler;

    fn record(source: &Observable<i32>) -> Arc<Mutex<Vec<Notification<i32>>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        source
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        log
    }

    #[test]
    fn new_subscriber_gets_trimmed_history_then_live() {
        let subject = ReplaySubject::with_buffer_size(2);
        subject.on_next(1);
        subject.on_next(2);
        subject.on_next(3);

        let log = record(&subject.as_observable());
        subject.on_next(4);

        assert_eq!(
            *log.lock(),
            vec![
                Notification::Next(2),
                Notification::Next(3),
                Notification::Next(4)
            ]
        );
    }

    #[test]
    fn buffered_terminal_ends_late_subscriber() {
        let subject = ReplaySubject::new();
        subject.on_next(1);
        subject.on_error(RxError::upstream("done"));

        let log = record(&subject.as_observable());
        assert_eq!(
            *log.lock(),
            vec![
                Notification::Next(1),
                Notification::Error(RxError::upstream("done"))
            ]
        );
    }

    #[test]
    fn window_drops_stale_values() {
        let vt = VirtualTimeScheduler::new();
        let subject = ReplaySubject::with_window(Duration::from_millis(10), vt.clone());
        subject.on_next(1);
        vt.advance_to(Duration::from_millis(8));
        subject.on_next(2);
        vt.advance_to(Duration::from_millis(15));

        let log = record(&subject.as_observable());
        vt.advance_by(Duration::ZERO);

        assert_eq!(*log.lock(), vec![Notification::Next(2)]);
    }

    #[test]
    fn replay_waits_for_the_scheduler() {
        let vt = VirtualTimeScheduler::new();
        let subject = ReplaySubject::with_options(None, None, vt.clone());
        subject.on_next(1);

        let log = record(&subject.as_observable());
        assert!(log.lock().is_empty());

        subject.on_next(2);
        vt.advance_by(Duration::ZERO);
        assert_eq!(
            *log.lock(),
            vec![Notification::Next(1), Notification::Next(2)]
        );
    }
}
