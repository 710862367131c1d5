//! Schedulers
//!
//! A scheduler executes units of work ("actions") either as soon as possible
//! or after a relative delay. Every scheduled action hands back a
//! [`Disposable`] that cancels it if it has not started yet; cancelling a
//! running or finished action is a no-op.
//!
//! # Built-in Schedulers
//!
//! - [`ImmediateScheduler`]: runs the action synchronously, on the caller's
//!   stack.
//! - [`CurrentThreadScheduler`]: a thread-local trampoline. The first action
//!   scheduled on an idle thread runs synchronously; anything it schedules is
//!   queued and drained iteratively, so recursive scheduling never grows the
//!   call stack.
//! - [`TimeoutScheduler`]: defers to the tokio timer facility. Even a zero
//!   delay runs asynchronously relative to the caller.
//! - [`VirtualTimeScheduler`]: a manually advanced clock for deterministic
//!   tests.
//!
//! # Recursive Scheduling
//!
//! [`schedule_recursive`] runs an action that can reschedule itself through a
//! [`Recursion`] handle. Instead of closing over shared mutable locals, the
//! action receives an explicit state value on every step and passes the next
//! state along when it reschedules. Disposing the handle returned by
//! `schedule_recursive` stops all future steps, including one that is already
//! queued.

mod current_thread;
mod immediate;
mod timeout;
mod virtual_time;

pub use current_thread::CurrentThreadScheduler;
pub use immediate::ImmediateScheduler;
pub use timeout::TimeoutScheduler;
pub use virtual_time::VirtualTimeScheduler;

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::disposable::{
    BooleanDisposable, CompositeDisposable, Dispose, Disposable, SingleAssignmentDisposable,
};

/// A unit of work.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Shared handle to a scheduler.
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Executes actions now or after a delay.
pub trait Scheduler: Send + Sync {
    /// The scheduler's notion of the current time, as an offset from its
    /// clock origin.
    fn now(&self) -> Duration;

    /// Run `action` as soon as possible.
    fn schedule(&self, action: Action) -> Disposable;

    /// Run `action` once `delay` has elapsed.
    fn schedule_after(&self, delay: Duration, action: Action) -> Disposable;
}

/// Monotonic time since the process-wide clock origin.
pub(crate) fn clock() -> Duration {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed()
}

/// A queued action together with its cancellation flag.
pub(crate) struct QueuedAction {
    action: Action,
    cancel: BooleanDisposable,
}

impl QueuedAction {
    pub(crate) fn new(action: Action) -> (Self, Disposable) {
        let cancel = BooleanDisposable::new();
        let handle = cancel.clone().into();
        (Self { action, cancel }, handle)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_disposed()
    }

    pub(crate) fn run(self) {
        if !self.cancel.is_disposed() {
            (self.action)();
        }
    }
}

// ----------------------------------------------------------------------------
// Recursive scheduling
// ----------------------------------------------------------------------------

struct RecursionInner<S> {
    scheduler: SchedulerRef,
    action: Box<dyn Fn(S, &Recursion<S>) + Send + Sync>,
    pending: CompositeDisposable,
}

/// Handle given to a recursively scheduled action so it can requeue itself.
pub struct Recursion<S> {
    inner: Arc<RecursionInner<S>>,
}

impl<S> Clone for Recursion<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Send + 'static> Recursion<S> {
    fn new<F>(scheduler: SchedulerRef, action: F) -> Self
    where
        F: Fn(S, &Recursion<S>) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(RecursionInner {
                scheduler,
                action: Box::new(action),
                pending: CompositeDisposable::new(),
            }),
        }
    }

    /// Run the action again as soon as possible with `state`.
    pub fn schedule(&self, state: S) {
        self.enqueue(None, state);
    }

    /// Run the action again after `delay` with `state`.
    pub fn schedule_after(&self, delay: Duration, state: S) {
        self.enqueue(Some(delay), state);
    }

    /// Whether the outer handle has been disposed.
    pub fn is_cancelled(&self) -> bool {
        self.inner.pending.is_disposed()
    }

    pub fn scheduler(&self) -> &SchedulerRef {
        &self.inner.scheduler
    }

    fn enqueue(&self, delay: Option<Duration>, state: S) {
        if self.is_cancelled() {
            return;
        }

        let slot = SingleAssignmentDisposable::new();
        let handle: Disposable = slot.clone().into();
        self.inner.pending.add(handle.clone());

        let this = self.clone();
        let action: Action = Box::new(move || {
            this.inner.pending.remove(&handle);
            if this.is_cancelled() {
                return;
            }
            (this.inner.action)(state, &this);
        });

        let scheduled = match delay {
            None => self.inner.scheduler.schedule(action),
            Some(delay) => self.inner.scheduler.schedule_after(delay, action),
        };
        slot.set(scheduled);
    }

    fn handle(&self) -> Disposable {
        self.inner.pending.clone().into()
    }
}

/// Schedule `action` with an initial `state`; the action may reschedule
/// itself through the [`Recursion`] it receives.
pub fn schedule_recursive<S, F>(scheduler: &SchedulerRef, state: S, action: F) -> Disposable
where
    S: Send + 'static,
    F: Fn(S, &Recursion<S>) + Send + Sync + 'static,
{
    let recursion = Recursion::new(Arc::clone(scheduler), action);
    recursion.schedule(state);
    recursion.handle()
}

/// Like [`schedule_recursive`], but the first step runs after `delay`.
pub fn schedule_recursive_after<S, F>(
    scheduler: &SchedulerRef,
    delay: Duration,
    state: S,
    action: F,
) -> Disposable
where
    S: Send + 'static,
    F: Fn(S, &Recursion<S>) + Send + Sync + 'static,
{
    let recursion = Recursion::new(Arc::clone(scheduler), action);
    recursion.schedule_after(delay, state);
    recursion.handle()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
