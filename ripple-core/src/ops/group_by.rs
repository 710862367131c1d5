//! GroupBy: split one source into a sequence of keyed groups.
//!
//! Groups are created lazily, the first time a serialized key is seen, and
//! are kept in first-seen order. Every group is backed by a [`Subject`] and
//! holds a lease on a ref-counted handle to the single upstream
//! subscription: disposing the outer subscription releases upstream only
//! after every subscribed group has been released as well.

use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::disposable::{CompositeDisposable, RefCountDisposable, SingleAssignmentDisposable};
use crate::error::{guard, RxError};
use crate::observable::Observable;
use crate::observer::{AnonymousObserver, Observer, ObserverRef};
use crate::subject::Subject;
use crate::Value;

/// One group produced by [`Observable::group_by`].
///
/// Dereferences to the group's values as an [`Observable`].
pub struct GroupedObservable<K, V> {
    key: K,
    values: Observable<V>,
}

impl<K: Clone, V> Clone for GroupedObservable<K, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            values: self.values.clone(),
        }
    }
}

impl<K: std::fmt::Debug, V> std::fmt::Debug for GroupedObservable<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupedObservable")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<K: Value, V: Value> GroupedObservable<K, V> {
    fn new(key: K, subject: &Subject<V>, upstream: RefCountDisposable) -> Self {
        let source = subject.as_observable();
        let values = Observable::create(move |observer| {
            let lease = upstream.lease();
            let subscription = source.subscribe_observer(observer);
            CompositeDisposable::from_members([lease, subscription]).into()
        });
        Self { key, values }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn as_observable(&self) -> Observable<V> {
        self.values.clone()
    }
}

impl<K, V> Deref for GroupedObservable<K, V> {
    type Target = Observable<V>;

    fn deref(&self) -> &Observable<V> {
        &self.values
    }
}

struct GroupSink<T, K, V, S> {
    downstream: ObserverRef<GroupedObservable<K, V>>,
    groups: Mutex<IndexMap<S, Subject<V>>>,
    upstream: RefCountDisposable,
    key_selector: Arc<dyn Fn(&T) -> K + Send + Sync>,
    element_selector: Arc<dyn Fn(T) -> V + Send + Sync>,
    key_serializer: Arc<dyn Fn(&K) -> S + Send + Sync>,
}

impl<T, K, V, S> GroupSink<T, K, V, S>
where
    T: Value,
    K: Value,
    V: Value,
    S: Hash + Eq + Send + 'static,
{
    fn on_value(&self, value: T) {
        let keyed = guard(|| {
            let key = (self.key_selector)(&value);
            let serialized = (self.key_serializer)(&key);
            (key, serialized)
        });
        let (key, serialized) = match keyed {
            Ok(keyed) => keyed,
            Err(error) => return self.fail(error),
        };

        let (subject, fresh) = {
            let mut groups = self.groups.lock();
            match groups.get(&serialized) {
                Some(subject) => (subject.clone(), false),
                None => {
                    let subject = Subject::new();
                    groups.insert(serialized, subject.clone());
                    (subject, true)
                }
            }
        };
        if fresh {
            self.downstream
                .on_next(GroupedObservable::new(key, &subject, self.upstream.clone()));
        }

        match guard(|| (self.element_selector)(value)) {
            Ok(element) => subject.on_next(element),
            Err(error) => self.fail(error),
        }
    }

    fn drain_groups(&self) -> Vec<Subject<V>> {
        self.groups.lock().drain(..).map(|(_, subject)| subject).collect()
    }

    fn fail(&self, error: RxError) {
        for subject in self.drain_groups() {
            subject.on_error(error.clone());
        }
        self.downstream.on_error(error);
    }

    fn complete(&self) {
        for subject in self.drain_groups() {
            subject.on_completed();
        }
        self.downstream.on_completed();
    }
}

impl<T: Value> Observable<T> {
    /// Group values by `key_selector`.
    pub fn group_by<K, F>(&self, key_selector: F) -> Observable<GroupedObservable<K, T>>
    where
        K: Value + Hash + Eq,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.group_by_with(key_selector, |value| value)
    }

    /// Group values by `key_selector`, projecting each element first.
    pub fn group_by_with<K, V, F, E>(
        &self,
        key_selector: F,
        element_selector: E,
    ) -> Observable<GroupedObservable<K, V>>
    where
        K: Value + Hash + Eq,
        V: Value,
        F: Fn(&T) -> K + Send + Sync + 'static,
        E: Fn(T) -> V + Send + Sync + 'static,
    {
        self.group_by_serialized(key_selector, element_selector, K::clone)
    }

    /// Group values by the serialized form of their key. Keys that
    /// serialize equal share a group, whose key is the first one seen.
    pub fn group_by_serialized<K, V, S, F, E, Z>(
        &self,
        key_selector: F,
        element_selector: E,
        key_serializer: Z,
    ) -> Observable<GroupedObservable<K, V>>
    where
        K: Value,
        V: Value,
        S: Hash + Eq + Send + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
        E: Fn(T) -> V + Send + Sync + 'static,
        Z: Fn(&K) -> S + Send + Sync + 'static,
    {
        let source = self.clone();
        let key_selector: Arc<dyn Fn(&T) -> K + Send + Sync> = Arc::new(key_selector);
        let element_selector: Arc<dyn Fn(T) -> V + Send + Sync> = Arc::new(element_selector);
        let key_serializer: Arc<dyn Fn(&K) -> S + Send + Sync> = Arc::new(key_serializer);

        Observable::create(move |observer| {
            let subscription = SingleAssignmentDisposable::new();
            let upstream = RefCountDisposable::new(subscription.clone().into());
            let sink = Arc::new(GroupSink {
                downstream: observer,
                groups: Mutex::new(IndexMap::new()),
                upstream: upstream.clone(),
                key_selector: Arc::clone(&key_selector),
                element_selector: Arc::clone(&element_selector),
                key_serializer: Arc::clone(&key_serializer),
            });

            let (values, errors, done) = (Arc::clone(&sink), Arc::clone(&sink), sink);
            subscription.set(source.subscribe(AnonymousObserver::new(
                move |value| values.on_value(value),
                move |error| errors.fail(error),
                move || done.complete(),
            )));

            upstream.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{Notification, NotificationKind};
    use std::collections::BTreeMap;

    #[test]
    fn groups_are_created_lazily_in_first_seen_order() {
        let keys = Arc::new(Mutex::new(Vec::new()));
        let members: Arc<Mutex<BTreeMap<i64, Vec<i64>>>> = Arc::new(Mutex::new(BTreeMap::new()));
        let (key_log, member_log) = (keys.clone(), members.clone());

        Observable::range(1, 7)
            .group_by(|v| v % 3)
            .subscribe_next(move |group| {
                let key = *group.key();
                key_log.lock().push(key);
                let member_log = member_log.clone();
                group.subscribe_next(move |v| member_log.lock().entry(key).or_default().push(v));
            });

        assert_eq!(*keys.lock(), vec![1, 2, 0]);
        let members = members.lock();
        assert_eq!(members[&1], vec![1, 4, 7]);
        assert_eq!(members[&2], vec![2, 5]);
        assert_eq!(members[&0], vec![3, 6]);
    }

    #[test]
    fn serializer_merges_equivalent_keys() {
        let keys = Arc::new(Mutex::new(Vec::new()));
        let sink = keys.clone();
        Observable::from_iter(vec!["Apple", "avocado", "Banana", "apricot"])
            .group_by_serialized(
                |word: &&str| word.chars().next().unwrap_or_default().to_string(),
                |word| word.len(),
                |key: &String| key.to_lowercase(),
            )
            .subscribe_next(move |group| sink.lock().push(group.key().clone()));

        assert_eq!(*keys.lock(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn upstream_outlives_outer_subscription_while_groups_are_subscribed() {
        let source = Subject::new();
        let group_values = Arc::new(Mutex::new(Vec::new()));
        let group_handle = Arc::new(Mutex::new(None));
        let (values, handle_slot) = (group_values.clone(), group_handle.clone());

        let outer = source
            .as_observable()
            .group_by(|v: &i32| *v > 0)
            .subscribe_next(move |group| {
                let values = values.clone();
                *handle_slot.lock() = Some(group.subscribe_next(move |v| values.lock().push(v)));
            });

        source.on_next(1);
        outer.dispose();
        assert!(source.has_observers());
        source.on_next(2);

        let inner = group_handle.lock().take().expect("group subscribed");
        inner.dispose();
        assert!(!source.has_observers());
        assert_eq!(*group_values.lock(), vec![1, 2]);
    }

    #[test]
    fn key_selector_panic_fails_groups_and_outer() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        Observable::from_iter(vec![1, 2])
            .group_by(|v: &i32| {
                if *v == 2 {
                    panic!("bad key");
                }
                *v
            })
            .materialize()
            .subscribe_next(move |n: Notification<GroupedObservable<i32, i32>>| {
                sink.lock().push(n.kind())
            });

        assert_eq!(
            *events.lock(),
            vec![NotificationKind::Next, NotificationKind::Error]
        );
    }
}
