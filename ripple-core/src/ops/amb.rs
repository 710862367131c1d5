//! Amb: mirror whichever source reacts first.
//!
//! The first source to deliver any notification wins. Every other
//! subscription is disposed at that moment and later notifications from
//! losing sources are dropped.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::disposable::{CompositeDisposable, Disposable, Dispose, SingleAssignmentDisposable};
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, ObserverRef};
use crate::Value;

struct AmbSink<T> {
    downstream: ObserverRef<T>,
    winner: Mutex<Option<usize>>,
    subscriptions: Vec<SingleAssignmentDisposable>,
}

impl<T: Value> AmbSink<T> {
    /// Whether `index` may deliver. The first caller becomes the winner and
    /// disposes every other subscription outside the lock.
    fn claim(&self, index: usize) -> bool {
        let won = {
            let mut winner = self.winner.lock();
            match *winner {
                Some(current) => return current == index,
                None => {
                    *winner = Some(index);
                    true
                }
            }
        };
        trace!(index, "amb source won");
        for (other, subscription) in self.subscriptions.iter().enumerate() {
            if other != index {
                subscription.dispose();
            }
        }
        won
    }

    fn decided(&self) -> bool {
        self.winner.lock().is_some()
    }
}

impl<T: Value> Observable<T> {
    /// Mirror whichever of `self` and `other` notifies first.
    pub fn amb(&self, other: &Observable<T>) -> Observable<T> {
        Observable::amb_many(vec![self.clone(), other.clone()])
    }

    /// Mirror whichever source notifies first. An empty list never notifies.
    pub fn amb_many(sources: Vec<Observable<T>>) -> Observable<T> {
        let sources = Arc::new(sources);
        Observable::create(move |observer: ObserverRef<T>| {
            let sink = Arc::new(AmbSink {
                downstream: observer,
                winner: Mutex::new(None),
                subscriptions: (0..sources.len())
                    .map(|_| SingleAssignmentDisposable::new())
                    .collect(),
            });

            for (index, source) in sources.iter().enumerate() {
                if sink.decided() {
                    break;
                }
                let (values, errors, done) = (Arc::clone(&sink), Arc::clone(&sink), Arc::clone(&sink));
                sink.subscriptions[index].set(source.subscribe(AnonymousObserver::new(
                    move |value| {
                        if values.claim(index) {
                            values.downstream.on_next(value);
                        }
                    },
                    move |error| {
                        if errors.claim(index) {
                            errors.downstream.on_error(error);
                        }
                    },
                    move || {
                        if done.claim(index) {
                            done.downstream.on_completed();
                        }
                    },
                )));
            }

            CompositeDisposable::from_members(
                sink.subscriptions.iter().cloned().map(Disposable::from),
            )
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RxError;
    use crate::observer::{Notification, Observer};
    use crate::scheduler::VirtualTimeScheduler;
    use crate::subject::Subject;
    use std::time::Duration;

    fn collect<T: Value>(source: &Observable<T>) -> Arc<Mutex<Vec<Notification<T>>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        source
            .materialize()
            .subscribe_next(move |n| sink.lock().push(n));
        events
    }

    #[test]
    fn first_to_notify_wins_and_losers_are_disposed() {
        let a = Subject::new();
        let b = Subject::new();
        let events = collect(&a.as_observable().amb(&b.as_observable()));

        b.on_next(1);
        assert!(!a.has_observers());
        a.on_next(100);
        b.on_next(2);
        b.on_completed();

        assert_eq!(
            *events.lock(),
            vec![
                Notification::Next(1),
                Notification::Next(2),
                Notification::Completed
            ]
        );
    }

    #[test]
    fn terminal_notification_also_wins() {
        let a = Subject::<i32>::new();
        let b = Subject::<i32>::new();
        let events = collect(&a.as_observable().amb(&b.as_observable()));

        a.on_error(RxError::upstream("a failed"));
        b.on_next(1);

        assert!(!b.has_observers());
        assert_eq!(
            *events.lock(),
            vec![
                Notification::Error(RxError::upstream("a failed"))
            ]
        );
    }

    #[test]
    fn timed_race() {
        let vt = VirtualTimeScheduler::new();
        let slow = Observable::timer(Duration::from_millis(5), vt.clone()).map(|_| "a");
        let fast = Observable::timer(Duration::from_millis(3), vt.clone()).map(|_| "b");
        let events = collect(&slow.amb(&fast));

        vt.start();
        assert_eq!(
            *events.lock(),
            vec![Notification::Next("b"), Notification::Completed]
        );
        assert_eq!(vt.pending(), 0);
    }

    #[test]
    fn synchronous_winner_releases_later_sources() {
        let late = Subject::<i32>::new();
        let events = collect(&Observable::amb_many(vec![
            Observable::just(1),
            late.as_observable(),
        ]));

        assert!(!late.has_observers());
        assert_eq!(
            *events.lock(),
            vec![Notification::Next(1), Notification::Completed]
        );
    }

    #[test]
    fn no_sources_never_notifies() {
        let events = collect(&Observable::<i32>::amb_many(Vec::new()));
        assert!(events.lock().is_empty());
    }
}
