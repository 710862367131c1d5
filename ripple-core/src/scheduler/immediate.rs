//! Immediate Scheduler
//!
//! Runs every action synchronously on the caller's stack. A positive delay
//! blocks the calling thread for that long first; a zero delay is genuinely
//! synchronous.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::{clock, Action, Scheduler, SchedulerRef};
use crate::disposable::Disposable;

#[derive(Debug, Default)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    /// The shared instance.
    pub fn instance() -> SchedulerRef {
        static INSTANCE: OnceLock<SchedulerRef> = OnceLock::new();
        Arc::clone(INSTANCE.get_or_init(|| Arc::new(ImmediateScheduler)))
    }
}

impl Scheduler for ImmediateScheduler {
    fn now(&self) -> Duration {
        clock()
    }

    fn schedule(&self, action: Action) -> Disposable {
        action();
        Disposable::empty()
    }

    fn schedule_after(&self, delay: Duration, action: Action) -> Disposable {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        action();
        Disposable::empty()
    }
}
