//! Timeout Scheduler
//!
//! Bridges to the host timer facility, here a tokio runtime. Each action is
//! spawned as a task that sleeps for the requested delay (or yields once for
//! a zero delay) and then runs the action. Actions of one scheduler never
//! overlap: they take turns through a gate.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::{clock, Action, QueuedAction, Scheduler, SchedulerRef};
use crate::disposable::Disposable;
use crate::error::{ErrorKind, Result, RxError};

pub struct TimeoutScheduler {
    handle: Handle,
    gate: Arc<Mutex<()>>,
}

impl TimeoutScheduler {
    /// Create a scheduler that spawns its timers on `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Create a scheduler bound to the runtime of the calling thread.
    pub fn current() -> Result<Self> {
        Handle::try_current().map(Self::new).map_err(|e| {
            RxError::new(
                ErrorKind::Unavailable,
                "timeout scheduler requires a running tokio runtime",
            )
            .with_cause(e)
        })
    }

    pub fn into_ref(self) -> SchedulerRef {
        Arc::new(self)
    }
}

fn run_serialized(gate: &Mutex<()>, item: QueuedAction) {
    let _turn = gate.lock();
    item.run();
}

impl Scheduler for TimeoutScheduler {
    fn now(&self) -> Duration {
        clock()
    }

    fn schedule(&self, action: Action) -> Disposable {
        self.schedule_after(Duration::ZERO, action)
    }

    fn schedule_after(&self, delay: Duration, action: Action) -> Disposable {
        let (item, cancel) = QueuedAction::new(action);
        let gate = Arc::clone(&self.gate);
        let task = self.handle.spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            run_serialized(&gate, item);
        });
        let abort = task.abort_handle();
        Disposable::from_action(move || {
            cancel.dispose();
            abort.abort();
        })
    }
}
