//! Time-based operators: throttle, delay and timeout.
//!
//! Each takes the scheduler that owns its timers explicitly; timers are
//! owned by the subscription and released with it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::disposable::{CompositeDisposable, Dispose, SerialDisposable, SingleAssignmentDisposable};
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Notification, Observer, ObserverRef};
use crate::scheduler::{schedule_recursive_after, Recursion, SchedulerRef};
use crate::sync::{Gate, SerializedObserver};
use crate::Value;

// ----------------------------------------------------------------------------
// Throttle
// ----------------------------------------------------------------------------

struct ThrottleState<T> {
    pending: Option<T>,
    id: u64,
}

struct ThrottleSink<T> {
    downstream: Arc<SerializedObserver<T>>,
    state: Mutex<ThrottleState<T>>,
    timer: SerialDisposable,
    scheduler: SchedulerRef,
    due: Duration,
}

impl<T: Value> ThrottleSink<T> {
    fn take_pending(&self) -> Option<T> {
        let mut state = self.state.lock();
        state.id += 1;
        state.pending.take()
    }
}

/// Wraps the shared sink so that the timer can be re-armed from `on_next`.
struct ThrottleObserver<T> {
    sink: Arc<ThrottleSink<T>>,
}

impl<T: Value> Observer<T> for ThrottleObserver<T> {
    fn on_next(&self, value: T) {
        let id = {
            let mut state = self.sink.state.lock();
            state.id += 1;
            state.pending = Some(value);
            state.id
        };

        let sink = Arc::clone(&self.sink);
        let timer = self.sink.scheduler.schedule_after(
            self.sink.due,
            Box::new(move || {
                sink.downstream.gate().run(|| {
                    let ready = {
                        let mut state = sink.state.lock();
                        if state.id == id {
                            state.pending.take()
                        } else {
                            None
                        }
                    };
                    if let Some(value) = ready {
                        sink.downstream.on_next(value);
                    }
                })
            }),
        );
        self.sink.timer.set(timer);
    }

    fn on_error(&self, error: RxError) {
        self.sink.timer.dispose();
        self.sink.downstream.gate().run(|| {
            self.sink.take_pending();
            self.sink.downstream.on_error(error);
        })
    }

    fn on_completed(&self) {
        self.sink.timer.dispose();
        self.sink.downstream.gate().run(|| {
            if let Some(value) = self.sink.take_pending() {
                self.sink.downstream.on_next(value);
            }
            self.sink.downstream.on_completed();
        })
    }
}

// ----------------------------------------------------------------------------
// Delay
// ----------------------------------------------------------------------------

struct DelayState<T> {
    queue: BTreeMap<(Duration, u64), Notification<T>>,
    next_seq: u64,
    draining: bool,
}

struct DelaySink<T> {
    downstream: ObserverRef<T>,
    state: Mutex<DelayState<T>>,
    drain: SerialDisposable,
    scheduler: SchedulerRef,
    due: Duration,
}

impl<T: Value> DelaySink<T> {
    fn enqueue(self: &Arc<Self>, notification: Notification<T>) {
        let start = {
            let mut state = self.state.lock();
            let at = self.scheduler.now() + self.due;
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.insert((at, seq), notification);
            !std::mem::replace(&mut state.draining, true)
        };
        if start {
            let sink = Arc::clone(self);
            let drain = schedule_recursive_after(&self.scheduler, self.due, (), move |(), recursion| {
                sink.drain_due(recursion)
            });
            self.drain.set(drain);
        }
    }

    /// Deliver everything due by now, then reschedule for the next item.
    fn drain_due(&self, recursion: &Recursion<()>) {
        let now = self.scheduler.now();
        let (ready, next) = {
            let mut state = self.state.lock();
            let later = state.queue.split_off(&(now, u64::MAX));
            let ready = std::mem::replace(&mut state.queue, later);
            let next = state.queue.keys().next().map(|(at, _)| *at);
            if next.is_none() {
                state.draining = false;
            }
            (ready, next)
        };

        for (_, notification) in ready {
            let terminal = notification.is_terminal();
            notification.accept(&self.downstream);
            if terminal {
                return;
            }
        }
        if let Some(at) = next {
            recursion.schedule_after(at.saturating_sub(now), ());
        }
    }
}

struct DelayObserver<T> {
    sink: Arc<DelaySink<T>>,
}

impl<T: Value> Observer<T> for DelayObserver<T> {
    fn on_next(&self, value: T) {
        self.sink.enqueue(Notification::Next(value));
    }

    fn on_error(&self, error: RxError) {
        self.sink.enqueue(Notification::Error(error));
    }

    fn on_completed(&self) {
        self.sink.enqueue(Notification::Completed);
    }
}

// ----------------------------------------------------------------------------
// Timeout
// ----------------------------------------------------------------------------

#[derive(Default)]
struct TimeoutState {
    id: u64,
    switched: bool,
}

struct TimeoutSink<T> {
    downstream: ObserverRef<T>,
    state: Mutex<TimeoutState>,
    subscription: SerialDisposable,
    timer: SerialDisposable,
    fallback: Observable<T>,
    scheduler: SchedulerRef,
    due: Duration,
}

impl<T: Value> TimeoutSink<T> {
    /// Start the window for generation `id`. A timer that fires after newer
    /// data has arrived sees a different id and does nothing.
    fn arm(self: &Arc<Self>, id: u64) {
        let sink = Arc::clone(self);
        let timer = self.scheduler.schedule_after(
            self.due,
            Box::new(move || {
                let fire = {
                    let mut state = sink.state.lock();
                    if state.id == id && !state.switched {
                        state.switched = true;
                        true
                    } else {
                        false
                    }
                };
                if fire {
                    debug!(due = ?sink.due, "timeout elapsed, switching to fallback");
                    let fallback = sink.fallback.subscribe_observer(sink.downstream.clone());
                    sink.subscription.set(fallback);
                }
            }),
        );
        self.timer.set(timer);
    }

    /// Claim the current window for an upstream notification.
    fn claim(&self, terminal: bool) -> Option<u64> {
        let mut state = self.state.lock();
        if state.switched {
            return None;
        }
        state.id += 1;
        state.switched = terminal;
        Some(state.id)
    }
}

struct TimeoutObserver<T> {
    sink: Arc<TimeoutSink<T>>,
}

impl<T: Value> Observer<T> for TimeoutObserver<T> {
    fn on_next(&self, value: T) {
        if let Some(id) = self.sink.claim(false) {
            self.sink.downstream.on_next(value);
            self.sink.arm(id);
        }
    }

    fn on_error(&self, error: RxError) {
        if self.sink.claim(true).is_some() {
            self.sink.timer.dispose();
            self.sink.downstream.on_error(error);
        }
    }

    fn on_completed(&self) {
        if self.sink.claim(true).is_some() {
            self.sink.timer.dispose();
            self.sink.downstream.on_completed();
        }
    }
}

impl<T: Value> Observable<T> {
    /// Emit a value only after `due` has passed without a newer one
    /// arriving. Superseded values are dropped; a value still pending when
    /// the source completes is emitted before `completed`.
    pub fn throttle(&self, due: Duration, scheduler: SchedulerRef) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let sink = Arc::new(ThrottleSink {
                downstream: SerializedObserver::new(Gate::new(), observer),
                state: Mutex::new(ThrottleState {
                    pending: None,
                    id: 0,
                }),
                timer: SerialDisposable::new(),
                scheduler: Arc::clone(&scheduler),
                due,
            });
            let timer = sink.timer.clone();
            let subscription = source.subscribe(ThrottleObserver { sink });
            CompositeDisposable::from_members([subscription, timer.into()]).into()
        })
    }

    /// Shift every notification, including `error` and `completed`, later
    /// by `due`, preserving the spacing between them.
    pub fn delay(&self, due: Duration, scheduler: SchedulerRef) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let sink = Arc::new(DelaySink {
                downstream: observer,
                state: Mutex::new(DelayState {
                    queue: BTreeMap::new(),
                    next_seq: 0,
                    draining: false,
                }),
                drain: SerialDisposable::new(),
                scheduler: Arc::clone(&scheduler),
                due,
            });
            let drain = sink.drain.clone();
            let subscription = source.subscribe(DelayObserver { sink });
            CompositeDisposable::from_members([subscription, drain.into()]).into()
        })
    }

    /// Fail with a timeout error if no notification arrives within `due` of
    /// the previous one, or of subscription.
    pub fn timeout(&self, due: Duration, scheduler: SchedulerRef) -> Observable<T> {
        self.timeout_with(due, Observable::throw(RxError::timeout(due)), scheduler)
    }

    /// Switch to `fallback` if no notification arrives within `due` of the
    /// previous one, or of subscription.
    pub fn timeout_with(
        &self,
        due: Duration,
        fallback: Observable<T>,
        scheduler: SchedulerRef,
    ) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |observer| {
            let sink = Arc::new(TimeoutSink {
                downstream: observer,
                state: Mutex::new(TimeoutState::default()),
                subscription: SerialDisposable::new(),
                timer: SerialDisposable::new(),
                fallback: fallback.clone(),
                scheduler: Arc::clone(&scheduler),
                due,
            });

            let original = SingleAssignmentDisposable::new();
            sink.subscription.set(original.clone().into());
            sink.arm(0);
            original.set(source.subscribe(TimeoutObserver {
                sink: Arc::clone(&sink),
            }));

            CompositeDisposable::from_members([
                sink.subscription.clone().into(),
                sink.timer.clone().into(),
            ])
            .into()
        })
    }
}
