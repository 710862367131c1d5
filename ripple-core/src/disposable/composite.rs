//! Composite disposable: a dynamic group of members disposed together.

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::{Dispose, Disposable};

#[derive(Default)]
struct CompositeState {
    members: SmallVec<[Disposable; 4]>,
    disposed: bool,
}

/// Owns a set of disposables and releases all of them at once.
#[derive(Clone, Default)]
pub struct CompositeDisposable {
    state: Arc<Mutex<CompositeState>>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a composite that already owns `members`.
    pub fn from_members<I>(members: I) -> Self
    where
        I: IntoIterator<Item = Disposable>,
    {
        let composite = Self::new();
        composite.state.lock().members.extend(members);
        composite
    }

    /// Add a member. If the composite is already disposed, `member` is
    /// disposed immediately instead of being retained.
    pub fn add(&self, member: Disposable) {
        let rejected = {
            let mut state = self.state.lock();
            if state.disposed {
                Some(member)
            } else {
                state.members.push(member);
                None
            }
        };
        if let Some(member) = rejected {
            member.dispose();
        }
    }

    /// Remove `member` and dispose it. Remaining members keep their order.
    ///
    /// Returns `false` if the member was not part of the group.
    pub fn remove(&self, member: &Disposable) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let position = state.members.iter().position(|d| d.same_as(member));
            position.map(|index| state.members.remove(index))
        };
        match removed {
            Some(member) => {
                member.dispose();
                true
            }
            None => false,
        }
    }

    /// Dispose all current members but keep accepting new ones.
    pub fn clear(&self) {
        let members = std::mem::take(&mut self.state.lock().members);
        for member in members {
            member.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Dispose for CompositeDisposable {
    fn dispose(&self) {
        let members = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            std::mem::take(&mut state.members)
        };
        for member in members {
            member.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }
}

impl From<CompositeDisposable> for Disposable {
    fn from(value: CompositeDisposable) -> Self {
        Disposable::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(count: &Arc<AtomicUsize>) -> Disposable {
        let count = count.clone();
        Disposable::from_action(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn dispose_releases_every_member() {
        let count = Arc::new(AtomicUsize::new(0));
        let group = CompositeDisposable::new();
        group.add(counting(&count));
        group.add(counting(&count));
        group.add(counting(&count));
        assert_eq!(group.len(), 3);

        group.dispose();
        group.dispose();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(group.is_empty());
        assert!(group.is_disposed());
    }

    #[test]
    fn late_add_is_disposed_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let group = CompositeDisposable::new();
        group.dispose();

        group.add(counting(&count));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(group.len(), 0);
    }

    #[test]
    fn remove_disposes_member_and_keeps_order() {
        let count = Arc::new(AtomicUsize::new(0));
        let a = counting(&count);
        let b = counting(&count);
        let c = counting(&count);
        let group = CompositeDisposable::from_members([a.clone(), b.clone(), c.clone()]);

        assert!(group.remove(&b));
        assert!(!group.remove(&b));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(b.is_disposed());

        let state = group.state.lock();
        assert!(state.members[0].same_as(&a));
        assert!(state.members[1].same_as(&c));
    }

    #[test]
    fn clear_keeps_group_usable() {
        let count = Arc::new(AtomicUsize::new(0));
        let group = CompositeDisposable::new();
        group.add(counting(&count));
        group.clear();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!group.is_disposed());

        group.add(counting(&count));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn member_disposing_group_does_not_deadlock() {
        let group = CompositeDisposable::new();
        let inner = group.clone();
        group.add(Disposable::from_action(move || inner.dispose()));
        group.add(Disposable::from_action(|| {}));

        group.dispose();
        assert!(group.is_disposed());
    }
}
