//! Subjects
//!
//! A subject is both an [`Observer`] and a source: notifications pushed
//! into it are multicast to every observer currently subscribed through
//! [`SubjectLike::as_observable`].
//!
//! # Variants
//!
//! - [`Subject`]: plain fan-out of live notifications.
//! - [`ReplaySubject`]: also replays a trimmed history to new subscribers.
//! - [`AsyncSubject`]: publishes only the final value, on completion.
//! - [`BehaviorSubject`]: always holds a current value, replayed to every
//!   new subscriber.
//!
//! Once a subject receives `error` or `completed` it is stopped: further
//! inbound notifications are ignored, and observers that subscribe later
//! are sent the terminal notification through the subject's scheduler.
//!
//! Fan-out always iterates over a snapshot of the observer list, so an
//! observer unsubscribing itself mid-notification does not disturb the
//! round in progress.

mod async_subject;
mod behavior;
mod replay;
#[allow(clippy::module_inception)]
mod subject;

pub use async_subject::AsyncSubject;
pub use behavior::BehaviorSubject;
pub use replay::ReplaySubject;
pub use subject::Subject;

use smallvec::SmallVec;

use crate::observable::Observable;
use crate::observer::Observer;

/// Observer list shared by the subject variants, keyed by subscription id.
pub(crate) type ObserverList<O> = SmallVec<[(u64, O); 4]>;

/// An observer that can also be observed.
pub trait SubjectLike<T>: Observer<T> {
    /// The source side of this subject.
    fn as_observable(&self) -> Observable<T>;
}

/// Remove the entry registered under `id`, keeping the others in order.
pub(crate) fn remove_observer<O>(list: &mut ObserverList<O>, id: u64) -> Option<O> {
    let index = list.iter().position(|(entry, _)| *entry == id)?;
    Some(list.remove(index).1)
}
