//! The stopped-guard placed around every subscribed observer.
//!
//! It enforces terminal exclusivity on behalf of the downstream observer and
//! releases the upstream subscription as soon as a terminal notification has
//! been delivered or the subscription handle is disposed.
//!
//! It also records whether a panic unwound out of the downstream observer,
//! so the subscribe path can tell a failing producer from a failing
//! consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{Observer, ObserverRef};
use crate::disposable::{Dispose, Disposable, SingleAssignmentDisposable};
use crate::error::RxError;

pub(crate) struct AutoDetachObserver<T> {
    observer: ObserverRef<T>,
    stopped: AtomicBool,
    delivery_panicked: AtomicBool,
    upstream: SingleAssignmentDisposable,
}

/// Flags the guard when dropped during an unwind.
struct Delivering<'a>(&'a AtomicBool);

impl Drop for Delivering<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.store(true, Ordering::Release);
        }
    }
}

impl<T: Send + 'static> AutoDetachObserver<T> {
    pub(crate) fn new(observer: ObserverRef<T>) -> Arc<Self> {
        Arc::new(Self {
            observer,
            stopped: AtomicBool::new(false),
            delivery_panicked: AtomicBool::new(false),
            upstream: SingleAssignmentDisposable::new(),
        })
    }

    /// Attach the disposable returned by the upstream subscribe function.
    /// If the guard already stopped, it is released right away.
    pub(crate) fn set_upstream(&self, upstream: Disposable) {
        self.upstream.set(upstream);
    }

    /// Whether a panic escaped the downstream observer.
    pub(crate) fn delivery_panicked(&self) -> bool {
        self.delivery_panicked.load(Ordering::Acquire)
    }

    fn deliver(&self, notify: impl FnOnce(&ObserverRef<T>)) {
        let _delivering = Delivering(&self.delivery_panicked);
        notify(&self.observer);
    }

    /// Deliver `error` unless already stopped. Returns whether it was delivered.
    pub(crate) fn fail(&self, error: RxError) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.deliver(|observer| observer.on_error(error));
        self.upstream.dispose();
        true
    }

    /// Stop forwarding and release the upstream subscription.
    pub(crate) fn detach(&self) {
        self.stopped.store(true, Ordering::Release);
        self.upstream.dispose();
    }

    /// The handle returned to the subscriber.
    pub(crate) fn handle(self: &Arc<Self>) -> Disposable {
        let this = Arc::clone(self);
        Disposable::from_action(move || this.detach())
    }
}

impl<T: Send + 'static> Observer<T> for AutoDetachObserver<T> {
    fn on_next(&self, value: T) {
        if !self.stopped.load(Ordering::Acquire) {
            self.deliver(|observer| observer.on_next(value));
        }
    }

    fn on_error(&self, error: RxError) {
        self.fail(error);
    }

    fn on_completed(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.deliver(|observer| observer.on_completed());
        self.upstream.dispose();
    }
}
