//! Observables
//!
//! An [`Observable`] is a stateless factory of notification streams. Each
//! call to `subscribe` starts an independent production for that observer,
//! which lasts until a terminal notification is delivered or the returned
//! [`Disposable`] is disposed.
//!
//! # The Subscription Protocol
//!
//! Every subscribe entry point:
//!
//! 1. wraps the observer in a stopped-guard that drops anything arriving
//!    after `error`/`completed` and releases the upstream subscription on the
//!    terminal event;
//! 2. runs the subscribe function inside the current-thread trampoline, so
//!    re-entrant subscriptions are serialized instead of stack-recursive;
//! 3. converts a panic escaping the subscribe function into an `error`
//!    notification, unless the guard has already stopped. A panic raised by
//!    the downstream observer itself keeps unwinding to the caller.
//!
//! The returned handle is valid even when the sequence terminated during the
//! call itself; disposing it then has no further effect.

mod factory;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::trace;

use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observer::{AutoDetachObserver, ObserverBuilder, Observer, ObserverRef};
use crate::scheduler::CurrentThreadScheduler;
use crate::Value;

type SubscribeFn<T> = dyn Fn(ObserverRef<T>) -> Disposable + Send + Sync;

/// A push-based stream of values of type `T`.
pub struct Observable<T> {
    subscribe_fn: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: Arc::clone(&self.subscribe_fn),
        }
    }
}

impl<T> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

impl<T: Value> Observable<T> {
    /// Build an observable from a subscribe function.
    ///
    /// The function receives the (already guarded) observer and returns the
    /// disposable that tears the production down.
    pub fn create<F>(subscribe: F) -> Self
    where
        F: Fn(ObserverRef<T>) -> Disposable + Send + Sync + 'static,
    {
        Self {
            subscribe_fn: Arc::new(subscribe),
        }
    }

    /// Subscribe any observer.
    pub fn subscribe<O>(&self, observer: O) -> Disposable
    where
        O: Observer<T> + 'static,
    {
        self.subscribe_observer(Arc::new(observer))
    }

    /// Subscribe a shared observer.
    pub fn subscribe_observer(&self, observer: ObserverRef<T>) -> Disposable {
        let guard = AutoDetachObserver::new(observer);
        let subscribe_fn = Arc::clone(&self.subscribe_fn);
        let sink = Arc::clone(&guard);

        CurrentThreadScheduler::ensure_trampoline(move || {
            let downstream: ObserverRef<T> = sink.clone();
            match panic::catch_unwind(AssertUnwindSafe(|| subscribe_fn(downstream))) {
                Ok(upstream) => sink.set_upstream(upstream),
                Err(payload) => {
                    let converted = !sink.delivery_panicked()
                        && sink.fail(RxError::from_panic(payload.as_ref()));
                    if !converted {
                        panic::resume_unwind(payload);
                    }
                }
            }
        });

        trace!("subscription established");
        guard.handle()
    }

    /// Subscribe with only a value callback. An error notification panics.
    pub fn subscribe_next<N>(&self, on_next: N) -> Disposable
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(ObserverBuilder::new().on_next(on_next).build())
    }

    /// Subscribe with all three callbacks.
    pub fn subscribe_all<N, E, C>(&self, on_next: N, on_error: E, on_completed: C) -> Disposable
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(RxError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe(
            ObserverBuilder::new()
                .on_next(on_next)
                .on_error(on_error)
                .on_completed(on_completed)
                .build(),
        )
    }
}
