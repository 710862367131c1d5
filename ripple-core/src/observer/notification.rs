//! Notifications: the observer protocol reified as data.
//!
//! Used wherever notifications have to be stored and replayed later:
//! replay buffers, delay queues, scheduled observers and `materialize`.

use crate::error::RxError;
use crate::observable::Observable;
use crate::scheduler::SchedulerRef;
use crate::Value;

use super::Observer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Next,
    Error,
    Completed,
}

/// One event of the observer protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<T> {
    Next(T),
    Error(RxError),
    Completed,
}

impl<T> Notification<T> {
    /// Deliver this notification to `observer`.
    pub fn accept<O>(self, observer: &O)
    where
        O: Observer<T> + ?Sized,
    {
        match self {
            Notification::Next(value) => observer.on_next(value),
            Notification::Error(error) => observer.on_error(error),
            Notification::Completed => observer.on_completed(),
        }
    }

    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Next(_) => NotificationKind::Next,
            Notification::Error(_) => NotificationKind::Error,
            Notification::Completed => NotificationKind::Completed,
        }
    }

    /// True for `Error` and `Completed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Next(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Notification::Next(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&RxError> {
        match self {
            Notification::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl<T: Value> Notification<T> {
    /// An observable that replays this notification on `scheduler`, followed
    /// by `completed` when the notification is a value.
    pub fn to_observable_on(&self, scheduler: SchedulerRef) -> Observable<T> {
        let notification = self.clone();
        Observable::create(move |observer| {
            let notification = notification.clone();
            scheduler.schedule(Box::new(move || {
                let terminal = notification.is_terminal();
                notification.accept(&observer);
                if !terminal {
                    observer.on_completed();
                }
            }))
        })
    }
}
