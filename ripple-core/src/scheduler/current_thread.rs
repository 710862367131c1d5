//! Current-Thread Scheduler (Trampoline)
//!
//! Each thread owns at most one trampoline queue. Scheduling on an idle
//! thread installs the queue, runs the action synchronously and then drains
//! whatever the action (transitively) scheduled, one item at a time, until
//! the queue is empty. Scheduling while a drain is in progress only appends
//! to the queue.
//!
//! # Ordering
//!
//! Items are ordered by due time, then by insertion sequence, so work
//! scheduled without a delay runs in FIFO order. When the head item is due in
//! the future, the draining thread sleeps until it is due.
//!
//! # Failure
//!
//! A panicking action is not swallowed. It unwinds out of the drain loop; the
//! queue guard discards the remaining items so the thread starts clean next
//! time.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing::trace;

use super::{clock, Action, QueuedAction, Scheduler, SchedulerRef};
use crate::disposable::Disposable;

thread_local! {
    static TRAMPOLINE: RefCell<Option<TrampolineQueue>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct TrampolineQueue {
    items: BTreeMap<(Duration, u64), QueuedAction>,
    next_seq: u64,
}

impl TrampolineQueue {
    fn push(&mut self, due: Duration, item: QueuedAction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.items.insert((due, seq), item);
    }

    fn pop(&mut self) -> Option<(Duration, QueuedAction)> {
        self.items.pop_first().map(|((due, _), item)| (due, item))
    }
}

/// Removes the thread's queue when the drain ends, even by unwinding.
struct TrampolineGuard;

impl Drop for TrampolineGuard {
    fn drop(&mut self) {
        TRAMPOLINE.with(|cell| {
            cell.borrow_mut().take();
        });
    }
}

/// Trampoline scheduler bound to the calling thread.
#[derive(Debug, Default)]
pub struct CurrentThreadScheduler;

impl CurrentThreadScheduler {
    /// The shared instance.
    pub fn instance() -> SchedulerRef {
        static INSTANCE: OnceLock<SchedulerRef> = OnceLock::new();
        Arc::clone(INSTANCE.get_or_init(|| Arc::new(CurrentThreadScheduler)))
    }

    /// True when no trampoline is running on this thread, meaning the next
    /// scheduled action would run synchronously.
    pub fn schedule_required() -> bool {
        TRAMPOLINE.with(|cell| cell.borrow().is_none())
    }

    /// Run `action` inside a trampoline: directly if one is already active on
    /// this thread, otherwise by starting one.
    pub fn ensure_trampoline<F>(action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if Self::schedule_required() {
            Self::enqueue(clock(), Box::new(action));
        } else {
            action();
        }
    }

    fn enqueue(due: Duration, action: Action) -> Disposable {
        let (item, handle) = QueuedAction::new(action);
        let first = TRAMPOLINE.with(|cell| {
            let mut slot = cell.borrow_mut();
            match slot.as_mut() {
                Some(queue) => {
                    queue.push(due, item);
                    None
                }
                None => {
                    *slot = Some(TrampolineQueue::default());
                    Some(item)
                }
            }
        });
        if let Some(item) = first {
            drain(due, item);
        }
        handle
    }
}

fn drain(due: Duration, first: QueuedAction) {
    let _guard = TrampolineGuard;
    trace!("trampoline started");

    invoke(due, first);
    let mut drained = 1usize;
    while let Some((due, item)) =
        TRAMPOLINE.with(|cell| cell.borrow_mut().as_mut().and_then(TrampolineQueue::pop))
    {
        invoke(due, item);
        drained += 1;
    }

    trace!(drained, "trampoline drained");
}

fn invoke(due: Duration, item: QueuedAction) {
    if item.is_cancelled() {
        return;
    }
    let now = clock();
    if due > now {
        std::thread::sleep(due - now);
    }
    item.run();
}

impl Scheduler for CurrentThreadScheduler {
    fn now(&self) -> Duration {
        clock()
    }

    fn schedule(&self, action: Action) -> Disposable {
        Self::enqueue(clock(), action)
    }

    fn schedule_after(&self, delay: Duration, action: Action) -> Disposable {
        Self::enqueue(clock() + delay, action)
    }
}
