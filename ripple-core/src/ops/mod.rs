//! Operators
//!
//! Every operator is an inherent method on [`Observable`] (or an associated
//! function for the n-ary forms) that builds a new observable from existing
//! ones. Each subscription to the result creates fresh per-subscription
//! state; nothing is shared between two subscriptions of the same operator.
//!
//! # Conventions
//!
//! - User callbacks (selectors, predicates, accumulators, factories) run
//!   under a panic guard. A panic becomes an `error` notification on the
//!   output and never escapes `subscribe`.
//! - Operators that combine several sources serialize their downstream
//!   calls through a re-entrant gate.
//! - Time-based operators take their scheduler explicitly.
//! - Misuse detectable at construction time (zero counts or spans) is
//!   reported as `Err(RxError)` by the operator itself.
//!
//! [`Observable`]: crate::observable::Observable

mod amb;
mod buffer;
mod combine;
mod group_by;
mod merge;
mod multicast;
mod retry;
mod switch;
mod time;
mod transform;

pub use group_by::GroupedObservable;
pub use multicast::ConnectableObservable;

use crate::observer::{AnonymousObserver, ObserverRef};

/// An observer that hands values to `on_next` and passes terminal
/// notifications straight through to `downstream`.
pub(crate) fn forward<T, U, F>(downstream: ObserverRef<U>, on_next: F) -> AnonymousObserver<T>
where
    T: 'static,
    U: 'static,
    F: Fn(&ObserverRef<U>, T) + Send + Sync + 'static,
{
    let values = downstream.clone();
    let errors = downstream.clone();
    AnonymousObserver::new(
        move |value| on_next(&values, value),
        move |error| errors.on_error(error),
        move || downstream.on_completed(),
    )
}
