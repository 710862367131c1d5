//! Buffering by count and by time.
//!
//! # Count
//!
//! A new buffer opens every `skip` values and is emitted once it holds
//! `count` values. With `skip < count` buffers overlap, with `skip > count`
//! the values in between are dropped. On completion every open, non-empty
//! buffer is flushed.
//!
//! # Time
//!
//! A new buffer opens every `shift` and closes `span` after it opened; a
//! closing buffer is emitted even when empty. The boundaries are driven by
//! one recursive timer whose state is a [`WindowClock`]. On completion the
//! buffers still open are flushed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::disposable::CompositeDisposable;
use crate::error::{Result, RxError};
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, Observer, ObserverRef};
use crate::scheduler::{schedule_recursive_after, SchedulerRef};
use crate::sync::{Gate, SerializedObserver};
use crate::Value;

struct CountState<T> {
    buffers: VecDeque<Vec<T>>,
    seen: usize,
}

impl<T: Clone> CountState<T> {
    fn push(&mut self, value: T, count: usize, skip: usize) -> Option<Vec<T>> {
        if self.seen % skip == 0 {
            self.buffers.push_back(Vec::with_capacity(count));
        }
        self.seen += 1;
        for buffer in self.buffers.iter_mut() {
            buffer.push(value.clone());
        }
        match self.buffers.front() {
            Some(front) if front.len() == count => self.buffers.pop_front(),
            _ => None,
        }
    }
}

/// Position in the repeating open/close schedule of time-based buffers.
#[derive(Debug, Clone, Copy)]
struct WindowClock {
    shift: Duration,
    elapsed: Duration,
    next_close: Duration,
    next_open: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Boundary {
    close: bool,
    open: bool,
}

impl WindowClock {
    fn new(span: Duration, shift: Duration) -> Self {
        Self {
            shift,
            elapsed: Duration::ZERO,
            next_close: span,
            next_open: shift,
        }
    }

    /// The delay until the next boundary, what happens there, and the clock
    /// after it.
    fn advance(mut self) -> (Duration, Boundary, WindowClock) {
        let close = self.next_close <= self.next_open;
        let open = self.next_open <= self.next_close;
        let at = if close { self.next_close } else { self.next_open };
        let delay = at - self.elapsed;

        self.elapsed = at;
        if close {
            self.next_close += self.shift;
        }
        if open {
            self.next_open += self.shift;
        }
        (delay, Boundary { close, open }, self)
    }
}

struct TimeSink<T> {
    downstream: Arc<SerializedObserver<Vec<T>>>,
    buffers: Mutex<VecDeque<Vec<T>>>,
}

impl<T: Value> TimeSink<T> {
    fn boundary(&self, boundary: Boundary) {
        self.downstream.gate().run(|| {
            let closed = {
                let mut buffers = self.buffers.lock();
                let closed = if boundary.close {
                    buffers.pop_front()
                } else {
                    None
                };
                if boundary.open {
                    buffers.push_back(Vec::new());
                }
                closed
            };
            if let Some(buffer) = closed {
                self.downstream.on_next(buffer);
            }
        })
    }
}

impl<T: Value> Observer<T> for TimeSink<T> {
    fn on_next(&self, value: T) {
        self.downstream.gate().run(|| {
            for buffer in self.buffers.lock().iter_mut() {
                buffer.push(value.clone());
            }
        })
    }

    fn on_error(&self, error: RxError) {
        self.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.downstream.gate().run(|| {
            let open: Vec<_> = self.buffers.lock().drain(..).collect();
            for buffer in open {
                self.downstream.on_next(buffer);
            }
            self.downstream.on_completed();
        })
    }
}

impl<T: Value> Observable<T> {
    /// Non-overlapping buffers of `count` values.
    pub fn buffer_with_count(&self, count: usize) -> Result<Observable<Vec<T>>> {
        self.buffer_with_count_skip(count, count)
    }

    /// Buffers of `count` values, a new one starting every `skip` values.
    pub fn buffer_with_count_skip(&self, count: usize, skip: usize) -> Result<Observable<Vec<T>>> {
        if count == 0 || skip == 0 {
            return Err(RxError::argument(format!(
                "buffer count and skip must be positive (count {count}, skip {skip})"
            )));
        }

        let source = self.clone();
        Ok(Observable::create(move |observer: ObserverRef<Vec<T>>| {
            let state = Arc::new(Mutex::new(CountState {
                buffers: VecDeque::new(),
                seen: 0,
            }));
            let (values, flush) = (Arc::clone(&state), state);
            let (next, errors) = (observer.clone(), observer.clone());
            source.subscribe(AnonymousObserver::new(
                move |value| {
                    let full = values.lock().push(value, count, skip);
                    if let Some(buffer) = full {
                        next.on_next(buffer);
                    }
                },
                move |error| errors.on_error(error),
                move || {
                    let rest: Vec<_> = flush.lock().buffers.drain(..).collect();
                    for buffer in rest.into_iter().filter(|b| !b.is_empty()) {
                        observer.on_next(buffer);
                    }
                    observer.on_completed();
                },
            ))
        }))
    }

    /// Consecutive buffers each covering `span` of time.
    pub fn buffer_with_time(
        &self,
        span: Duration,
        scheduler: SchedulerRef,
    ) -> Result<Observable<Vec<T>>> {
        self.buffer_with_time_shift(span, span, scheduler)
    }

    /// Buffers covering `span` of time, a new one opening every `shift`.
    pub fn buffer_with_time_shift(
        &self,
        span: Duration,
        shift: Duration,
        scheduler: SchedulerRef,
    ) -> Result<Observable<Vec<T>>> {
        if span.is_zero() || shift.is_zero() {
            return Err(RxError::argument(format!(
                "buffer span and shift must be positive (span {span:?}, shift {shift:?})"
            )));
        }

        let source = self.clone();
        Ok(Observable::create(move |observer: ObserverRef<Vec<T>>| {
            let sink = Arc::new(TimeSink {
                downstream: SerializedObserver::new(Gate::new(), observer),
                buffers: Mutex::new(VecDeque::from([Vec::new()])),
            });

            let (delay, first, clock) = WindowClock::new(span, shift).advance();
            let ticker = Arc::clone(&sink);
            let timer = schedule_recursive_after(
                &scheduler,
                delay,
                (first, clock),
                move |(boundary, clock), recursion| {
                    ticker.boundary(boundary);
                    let (delay, next, clock) = clock.advance();
                    recursion.schedule_after(delay, (next, clock));
                },
            );

            let subscription = source.subscribe(sink);
            CompositeDisposable::from_members([timer, subscription]).into()
        }))
    }
}
