use super::{ReplaySubject, SubjectLike};
use crate::error::{ErrorKind, Result, RxError};
use crate::observable::Observable;
use crate::observer::Observer;
use crate::scheduler::{CurrentThreadScheduler, SchedulerRef};
use crate::Value;

/// A subject that always has a current value.
///
/// Backed by a single-slot [`ReplaySubject`] seeded with the initial value,
/// so every new subscriber starts with the most recent value.
pub struct BehaviorSubject<T> {
    replay: ReplaySubject<T>,
}

impl<T> Clone for BehaviorSubject<T> {
    fn clone(&self) -> Self {
        Self {
            replay: self.replay.clone(),
        }
    }
}

impl<T: Value> BehaviorSubject<T> {
    pub fn new(initial: T) -> Self {
        Self::with_scheduler(initial, CurrentThreadScheduler::instance())
    }

    pub fn with_scheduler(initial: T, scheduler: SchedulerRef) -> Self {
        let replay = ReplaySubject::with_options(Some(1), None, scheduler);
        replay.on_next(initial);
        Self { replay }
    }

    /// The current value, or the error the subject terminated with.
    pub fn value(&self) -> Result<T> {
        match self.replay.latest() {
            (_, Some(error)) => Err(error),
            (Some(value), None) => Ok(value),
            (None, None) => Err(RxError::new(
                ErrorKind::Unavailable,
                "behavior subject holds no value",
            )),
        }
    }

    pub fn has_observers(&self) -> bool {
        self.replay.has_observers()
    }

    pub fn as_observable(&self) -> Observable<T> {
        self.replay.as_observable()
    }
}

impl<T: Value> Observer<T> for BehaviorSubject<T> {
    fn on_next(&self, value: T) {
        self.replay.on_next(value);
    }

    fn on_error(&self, error: RxError) {
        self.replay.on_error(error);
    }

    fn on_completed(&self) {
        self.replay.on_completed();
    }
}

impl<T: Value> SubjectLike<T> for BehaviorSubject<T> {
    fn as_observable(&self) -> Observable<T> {
        BehaviorSubject::as_observable(self)
    }
}
