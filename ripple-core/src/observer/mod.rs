//! Observers
//!
//! An observer is a three-callback sink: `on_next` for values, then at most
//! one of `on_error` or `on_completed`. After a terminal notification no
//! further calls are valid. Observers do not enforce this themselves; the
//! subscription machinery wraps every observer in a guard that drops
//! anything arriving after the terminal event.
//!
//! # Building Observers
//!
//! Any type implementing [`Observer`] can be subscribed. For closures, use
//! [`ObserverBuilder`]: callbacks that are not supplied fall back to explicit
//! defaults. A missing `on_next` or `on_completed` does nothing, while a
//! missing `on_error` panics with the error, so an unobserved failure is
//! never silently lost.

mod auto_detach;
mod notification;
mod scheduled;

pub(crate) use auto_detach::AutoDetachObserver;
pub use notification::{Notification, NotificationKind};
pub(crate) use scheduled::ScheduledObserver;

use std::sync::Arc;

use tracing::warn;

use crate::error::RxError;

/// A sink for notifications.
pub trait Observer<T>: Send + Sync {
    fn on_next(&self, value: T);
    fn on_error(&self, error: RxError);
    fn on_completed(&self);
}

/// Shared handle to an observer.
pub type ObserverRef<T> = Arc<dyn Observer<T>>;

impl<T, O> Observer<T> for Arc<O>
where
    O: Observer<T> + ?Sized,
{
    fn on_next(&self, value: T) {
        (**self).on_next(value);
    }

    fn on_error(&self, error: RxError) {
        (**self).on_error(error);
    }

    fn on_completed(&self) {
        (**self).on_completed();
    }
}

type NextFn<T> = Box<dyn Fn(T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(RxError) + Send + Sync>;
type CompletedFn = Box<dyn Fn() + Send + Sync>;

/// An observer assembled from three closures.
pub struct AnonymousObserver<T> {
    next: NextFn<T>,
    error: ErrorFn,
    completed: CompletedFn,
}

impl<T> AnonymousObserver<T> {
    pub fn new<N, E, C>(next: N, error: E, completed: C) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(RxError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self {
            next: Box::new(next),
            error: Box::new(error),
            completed: Box::new(completed),
        }
    }
}

impl<T> Observer<T> for AnonymousObserver<T> {
    fn on_next(&self, value: T) {
        (self.next)(value);
    }

    fn on_error(&self, error: RxError) {
        (self.error)(error);
    }

    fn on_completed(&self) {
        (self.completed)();
    }
}

/// The error callback used when none is supplied: fail loudly.
pub(crate) fn unhandled_error(error: RxError) {
    warn!(%error, "error notification reached an observer without an error handler");
    panic!("unhandled error notification: {error}");
}

/// Builds an [`AnonymousObserver`], filling in the default callbacks.
pub struct ObserverBuilder<T> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn>,
    completed: Option<CompletedFn>,
}

impl<T> Default for ObserverBuilder<T> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
            completed: None,
        }
    }
}

impl<T: 'static> ObserverBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_next<F>(mut self, f: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.next = Some(Box::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(RxError) + Send + Sync + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.completed = Some(Box::new(f));
        self
    }

    pub fn build(self) -> AnonymousObserver<T> {
        AnonymousObserver {
            next: self.next.unwrap_or_else(|| Box::new(|_| {})),
            error: self.error.unwrap_or_else(|| Box::new(unhandled_error)),
            completed: self.completed.unwrap_or_else(|| Box::new(|| {})),
        }
    }
}
