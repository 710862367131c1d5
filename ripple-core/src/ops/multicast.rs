//! Multicasting: share one upstream subscription among many observers.
//!
//! [`ConnectableObservable`] routes subscribers to a subject and only
//! subscribes the subject to the source when [`connect`] is called.
//! [`ConnectableObservable::ref_count`] automates that: the first
//! subscriber connects and the last one to leave disconnects.
//!
//! The `*_with` forms instead build a fresh subject per subscription and
//! hand the shared view to a selector, so the source is multicast only
//! within the selector's expression.
//!
//! [`connect`]: ConnectableObservable::connect

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::disposable::{CompositeDisposable, Disposable, Dispose, SingleAssignmentDisposable};
use crate::error::guard;
use crate::observable::Observable;
use crate::observer::ObserverRef;
use crate::scheduler::SchedulerRef;
use crate::subject::{AsyncSubject, BehaviorSubject, ReplaySubject, Subject, SubjectLike};
use crate::Value;

struct Connectable<T> {
    source: Observable<T>,
    subject: Arc<dyn SubjectLike<T>>,
    connection: Mutex<Option<Disposable>>,
}

/// An observable whose upstream subscription is started explicitly.
pub struct ConnectableObservable<T> {
    inner: Arc<Connectable<T>>,
}

impl<T> Clone for ConnectableObservable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for ConnectableObservable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectableObservable")
            .field("connected", &self.inner.connection.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Value> ConnectableObservable<T> {
    pub fn new<S>(source: Observable<T>, subject: S) -> Self
    where
        S: SubjectLike<T> + 'static,
    {
        Self {
            inner: Arc::new(Connectable {
                source,
                subject: Arc::new(subject),
                connection: Mutex::new(None),
            }),
        }
    }

    /// Subscribe the subject to the source. While connected, further calls
    /// return the existing connection.
    ///
    /// Disposing the returned handle disconnects; a later `connect` then
    /// subscribes to the source again.
    pub fn connect(&self) -> Disposable {
        let subscription = SingleAssignmentDisposable::new();
        let handle = {
            let mut connection = self.inner.connection.lock();
            if let Some(existing) = connection.as_ref() {
                return existing.clone();
            }

            let slot = subscription.clone();
            let weak = Arc::downgrade(&self.inner);
            let handle = Disposable::from_action(move || {
                slot.dispose();
                if let Some(inner) = weak.upgrade() {
                    let mut connection = inner.connection.lock();
                    // Only clear the slot if it still holds this connection.
                    if connection.as_ref().is_some_and(Disposable::is_disposed) {
                        debug!("multicast source disconnected");
                        *connection = None;
                    }
                }
            });
            *connection = Some(handle.clone());
            handle
        };

        // The slot is reserved, so a synchronous source may reconnect or
        // disconnect from inside its own emissions.
        debug!("connecting multicast source");
        subscription.set(self.inner.source.subscribe(Arc::clone(&self.inner.subject)));
        handle
    }

    fn disconnect(&self) {
        let connection = self.inner.connection.lock().clone();
        if let Some(connection) = connection {
            connection.dispose();
        }
    }

    /// Subscribers are attached to the subject, not the source.
    pub fn as_observable(&self) -> Observable<T> {
        self.inner.subject.as_observable()
    }

    /// Connect while at least one subscriber is attached.
    pub fn ref_count(&self) -> Observable<T> {
        let connectable = self.clone();
        let count = Arc::new(Mutex::new(0usize));
        Observable::create(move |observer: ObserverRef<T>| {
            let subscription = connectable.as_observable().subscribe_observer(observer);
            let first = {
                let mut count = count.lock();
                *count += 1;
                *count == 1
            };
            if first {
                connectable.connect();
            }

            let count = Arc::clone(&count);
            let connectable = connectable.clone();
            Disposable::from_action(move || {
                subscription.dispose();
                let last = {
                    let mut count = count.lock();
                    *count -= 1;
                    *count == 0
                };
                if last {
                    connectable.disconnect();
                }
            })
        })
    }
}

impl<T: Value> Observable<T> {
    /// Multicast through `subject`.
    pub fn multicast<S>(&self, subject: S) -> ConnectableObservable<T>
    where
        S: SubjectLike<T> + 'static,
    {
        ConnectableObservable::new(self.clone(), subject)
    }

    /// Multicast through a [`Subject`].
    pub fn publish(&self) -> ConnectableObservable<T> {
        self.multicast(Subject::new())
    }

    /// Multicast through a [`BehaviorSubject`] seeded with `initial`.
    pub fn publish_value(&self, initial: T) -> ConnectableObservable<T> {
        self.multicast(BehaviorSubject::new(initial))
    }

    /// Multicast only the final value, through an [`AsyncSubject`].
    pub fn publish_last(&self) -> ConnectableObservable<T> {
        self.multicast(AsyncSubject::new())
    }

    /// Multicast through a [`ReplaySubject`] keeping at most `buffer_size`
    /// values no older than `window`.
    pub fn replay(
        &self,
        buffer_size: Option<usize>,
        window: Option<Duration>,
        scheduler: SchedulerRef,
    ) -> ConnectableObservable<T> {
        self.multicast(ReplaySubject::with_options(buffer_size, window, scheduler))
    }

    /// `publish().ref_count()`.
    pub fn share(&self) -> Observable<T> {
        self.publish().ref_count()
    }

    /// For each subscription, multicast the source through a subject from
    /// `factory` and subscribe to `selector` applied to the shared view.
    pub fn multicast_with<R, S, F, G>(&self, factory: F, selector: G) -> Observable<R>
    where
        R: Value,
        S: SubjectLike<T> + 'static,
        F: Fn() -> S + Send + Sync + 'static,
        G: Fn(Observable<T>) -> Observable<R> + Send + Sync + 'static,
    {
        let source = self.clone();
        Observable::create(move |observer: ObserverRef<R>| {
            let prepared = guard(|| {
                let connectable = source.multicast(factory());
                let shared = selector(connectable.as_observable());
                (connectable, shared)
            });
            match prepared {
                Ok((connectable, shared)) => {
                    let subscription = shared.subscribe_observer(observer);
                    CompositeDisposable::from_members([subscription, connectable.connect()]).into()
                }
                Err(error) => {
                    observer.on_error(error);
                    Disposable::empty()
                }
            }
        })
    }

    /// [`Observable::multicast_with`] over a fresh [`Subject`].
    pub fn publish_with<R, G>(&self, selector: G) -> Observable<R>
    where
        R: Value,
        G: Fn(Observable<T>) -> Observable<R> + Send + Sync + 'static,
    {
        self.multicast_with(Subject::new, selector)
    }

    /// [`Observable::multicast_with`] over a fresh [`ReplaySubject`].
    pub fn replay_with<R, G>(
        &self,
        buffer_size: Option<usize>,
        window: Option<Duration>,
        scheduler: SchedulerRef,
        selector: G,
    ) -> Observable<R>
    where
        R: Value,
        G: Fn(Observable<T>) -> Observable<R> + Send + Sync + 'static,
    {
        self.multicast_with(
            move || ReplaySubject::with_options(buffer_size, window, Arc::clone(&scheduler)),
            selector,
        )
    }
}
