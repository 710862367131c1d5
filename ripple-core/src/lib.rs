//! Ripple Core
//!
//! This crate provides a push-based reactive stream engine. Producers emit
//! values over time to subscribed consumers; consumers compose
//! transformations over those streams; all work is coordinated through
//! pluggable schedulers, and every resource is released exactly once.
//!
//! It implements:
//!
//! - Disposable primitives with leak-free, idempotent teardown
//! - Schedulers, including a stack-safe trampoline for synchronous recursion
//! - The observer/observable subscription protocol
//! - Multicast subjects (plain, replay, async, behavior)
//! - Concurrency-sensitive combinators (merge, switch, combine-latest, zip,
//!   group-by, buffering, throttling, delay, timeout, retry/repeat, amb)
//!
//! # Architecture
//!
//! The crate is organized into several modules, leaves first:
//!
//! - `disposable`: lifetime tokens and their compositions
//! - `scheduler`: units-of-work execution and recursive self-scheduling
//! - `observer`: the three-callback sink, notifications and the stopped guard
//! - `observable`: the subscription entry points and creation operators
//! - `subject`: observer/observable hybrids for multicast
//! - `ops`: the combinator library, as methods on [`Observable`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use ripple_core::prelude::*;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! Observable::from_iter(vec![1, 2, 3, 4])
//!     .filter(|v| v % 2 == 0)
//!     .map(|v| v * 10)
//!     .subscribe_next(move |v| sink.lock().push(v));
//!
//! assert_eq!(*seen.lock(), vec![20, 40]);
//! ```

pub mod config;
pub mod disposable;
pub mod error;
pub mod observable;
pub mod observer;
pub mod ops;
pub mod scheduler;
pub mod subject;

mod sync;

pub use config::{RxConfig, SchedulerKind};
pub use error::{ErrorKind, Result, RxError};
pub use observable::Observable;

/// Bound shared by every value that flows through a stream.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + Send + Sync + 'static {}

/// Commonly used types and traits.
pub mod prelude {
    pub use crate::config::{RxConfig, SchedulerKind};
    pub use crate::disposable::{
        BooleanDisposable, CompositeDisposable, Dispose, Disposable, RefCountDisposable,
        SerialDisposable, SingleAssignmentDisposable,
    };
    pub use crate::error::{ErrorKind, RxError};
    pub use crate::observable::Observable;
    pub use crate::observer::{
        AnonymousObserver, Notification, NotificationKind, Observer, ObserverBuilder, ObserverRef,
    };
    pub use crate::ops::{ConnectableObservable, GroupedObservable};
    pub use crate::scheduler::{
        schedule_recursive, schedule_recursive_after, CurrentThreadScheduler, ImmediateScheduler,
        Recursion, Scheduler, SchedulerRef, TimeoutScheduler, VirtualTimeScheduler,
    };
    pub use crate::subject::{AsyncSubject, BehaviorSubject, ReplaySubject, Subject, SubjectLike};
    pub use crate::Value;
}
