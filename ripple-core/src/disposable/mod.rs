//! Disposable Primitives
//!
//! A disposable is a lifetime token whose only operation is `dispose()`.
//! Disposing is idempotent: the first call releases the resource, every
//! later call is a no-op, and concurrent calls never release twice.
//!
//! # Variants
//!
//! - [`Disposable::empty`]: does nothing.
//! - [`ActionDisposable`]: runs a cleanup closure exactly once.
//! - [`BooleanDisposable`]: a flag that can be queried.
//! - [`CompositeDisposable`]: owns a dynamic set of members.
//! - [`SerialDisposable`]: a single replaceable slot.
//! - [`SingleAssignmentDisposable`]: a slot filled at most once, possibly after
//!   it was already disposed.
//! - [`RefCountDisposable`]: releases its underlying resource only after the
//!   primary holder and every outstanding lease are done.
//!
//! # Late additions
//!
//! Containers never retain a disposable after they have been disposed. Adding
//! to a disposed composite, or assigning into a disposed slot, disposes the
//! argument on the spot.
//!
//! Cleanup closures run without any internal lock held. A panicking cleanup
//! propagates to whoever called `dispose()`.

mod composite;
mod ref_count;
mod serial;

pub use composite::CompositeDisposable;
pub use ref_count::RefCountDisposable;
pub use serial::{SerialDisposable, SingleAssignmentDisposable};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Anything that can release a resource.
pub trait Dispose: Send + Sync {
    /// Release the resource. Must be idempotent.
    fn dispose(&self);

    /// Whether `dispose` has already taken effect.
    fn is_disposed(&self) -> bool;
}

/// Type-erased, cloneable handle to a disposable resource.
///
/// Clones share the same underlying resource: disposing any clone disposes
/// all of them.
#[derive(Clone, Default)]
pub struct Disposable {
    inner: Option<Arc<dyn Dispose>>,
}

impl Disposable {
    /// A disposable that does nothing.
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Wrap a concrete disposable.
    pub fn new<D>(resource: D) -> Self
    where
        D: Dispose + 'static,
    {
        Self {
            inner: Some(Arc::new(resource)),
        }
    }

    /// A disposable that runs `action` the first time it is disposed.
    pub fn from_action<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::new(ActionDisposable::new(action))
    }

    pub fn dispose(&self) {
        if let Some(inner) = &self.inner {
            inner.dispose();
        }
    }

    /// Empty disposables report `false`: there is nothing to observe.
    pub fn is_disposed(&self) -> bool {
        self.inner.as_ref().map_or(false, |inner| inner.is_disposed())
    }

    /// Whether two handles refer to the same underlying resource.
    pub fn same_as(&self, other: &Disposable) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("empty", &self.inner.is_none())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Runs a cleanup closure exactly once.
pub struct ActionDisposable {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    disposed: AtomicBool,
}

impl ActionDisposable {
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
            disposed: AtomicBool::new(false),
        }
    }
}

impl Dispose for ActionDisposable {
    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

/// A disposable that only records whether it has been disposed.
///
/// Schedulers hand these out as cancellation tokens: the queued work checks
/// the flag right before it runs.
#[derive(Clone, Default)]
pub struct BooleanDisposable {
    disposed: Arc<AtomicBool>,
}

impl BooleanDisposable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dispose for BooleanDisposable {
    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl From<BooleanDisposable> for Disposable {
    fn from(value: BooleanDisposable) -> Self {
        Disposable::new(value)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn action_runs_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let d = Disposable::from_action(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!d.is_disposed());
        d.dispose();
        d.dispose();
        d.clone().dispose();

        assert!(d.is_disposed());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_disposable_is_inert() {
        let d = Disposable::empty();
        d.dispose();
        assert!(!d.is_disposed());
        assert!(!d.same_as(&Disposable::empty()));
    }

    #[test]
    fn boolean_disposable_reports_state() {
        let flag = BooleanDisposable::new();
        let handle: Disposable = flag.clone().into();
        assert!(!flag.is_disposed());
        handle.dispose();
        assert!(flag.is_disposed());
    }

    #[test]
    fn clones_share_identity() {
        let d = Disposable::from_action(|| {});
        let other = Disposable::from_action(|| {});
        assert!(d.same_as(&d.clone()));
        assert!(!d.same_as(&other));
    }

    #[test]
    fn concurrent_dispose_releases_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let d = Disposable::from_action(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = d.clone();
                std::thread::spawn(move || d.dispose())
            })
            .collect();
        for handle in handles {
            handle.join().expect("dispose thread panicked");
        }

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
