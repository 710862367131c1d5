//! Virtual Time Scheduler
//!
//! A scheduler whose clock only moves when told to. Work is kept in a queue
//! ordered by due time and insertion sequence, and runs while the clock is
//! advanced past it. Time-based operators become fully deterministic under
//! this scheduler, which makes it the tool of choice for tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Action, QueuedAction, Scheduler};
use crate::disposable::Disposable;

#[derive(Default)]
struct VirtualState {
    clock: Duration,
    next_seq: u64,
    queue: BTreeMap<(Duration, u64), QueuedAction>,
}

#[derive(Default)]
pub struct VirtualTimeScheduler {
    state: Mutex<VirtualState>,
}

impl VirtualTimeScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run everything due up to and including `target`, then set the clock
    /// to `target`. The clock never moves backwards.
    pub fn advance_to(&self, target: Duration) {
        while let Some(item) = self.pop_due(Some(target)) {
            item.run();
        }
        let mut state = self.state.lock();
        if state.clock < target {
            state.clock = target;
        }
    }

    pub fn advance_by(&self, delta: Duration) {
        let target = self.now() + delta;
        self.advance_to(target);
    }

    /// Run until the queue is empty, moving the clock to each item's due time.
    pub fn start(&self) {
        while let Some(item) = self.pop_due(None) {
            item.run();
        }
    }

    /// Number of queued, not yet cancelled actions.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queue
            .values()
            .filter(|item| !item.is_cancelled())
            .count()
    }

    fn pop_due(&self, limit: Option<Duration>) -> Option<QueuedAction> {
        let mut state = self.state.lock();
        let key = *state.queue.keys().next()?;
        if limit.map_or(false, |limit| key.0 > limit) {
            return None;
        }
        let item = state.queue.remove(&key)?;
        if state.clock < key.0 {
            state.clock = key.0;
        }
        Some(item)
    }

    fn enqueue(&self, delay: Duration, action: Action) -> Disposable {
        let (item, handle) = QueuedAction::new(action);
        let mut state = self.state.lock();
        let due = state.clock + delay;
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.insert((due, seq), item);
        handle
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn now(&self) -> Duration {
        self.state.lock().clock
    }

    fn schedule(&self, action: Action) -> Disposable {
        self.enqueue(Duration::ZERO, action)
    }

    fn schedule_after(&self, delay: Duration, action: Action) -> Disposable {
        self.enqueue(delay, action)
    }
}
