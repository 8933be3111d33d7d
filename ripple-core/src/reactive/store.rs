//! Dependency Store
//!
//! Maps every tracked (object, field) pair to the set of computations that
//! read it during their last run. This is pure storage: the runtime decides
//! when to subscribe, unsubscribe and publish.
//!
//! # Weak Association
//!
//! Entries are keyed by [`ObjectId`] and hold only a `Weak` liveness token
//! of the object, so tracking never keeps an object alive. Entries whose
//! object is gone are swept by [`DependencyStore::prune`], which the store
//! runs itself whenever the number of tracked objects crosses a high-water
//! mark.
//!
//! Subscribers are held weakly too. A computation's closure usually owns a
//! view of the very object it reads, so a strong subscriber would pin the
//! object for as long as the entry exists. Computations are owned by their
//! handles ([`Effect`](super::Effect), [`Computed`](super::Computed),
//! [`WatchHandle`](super::WatchHandle)) and by queued jobs.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::object::{Identity, ObjectId};
use super::subscriber::{AnyEffect, ComputationId};
use super::value::Key;

/// The computations subscribed to one (object, field) pair, in subscription
/// order.
pub(crate) type SubscriptionSet = IndexMap<ComputationId, Weak<dyn AnyEffect>>;

/// One back-link held by a computation: a set it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Dep {
    pub(crate) object: ObjectId,
    pub(crate) key: Key,
}

struct ObjectDeps {
    alive: Weak<()>,
    fields: HashMap<Key, SubscriptionSet>,
}

impl ObjectDeps {
    fn is_alive(&self) -> bool {
        self.alive.strong_count() > 0
    }
}

pub(crate) struct DependencyStore {
    objects: HashMap<ObjectId, ObjectDeps>,
    /// Minimum high-water mark.
    prune_threshold: usize,
    /// Current high-water mark; grows with the live set.
    prune_at: usize,
}

impl DependencyStore {
    pub(crate) fn new(prune_threshold: usize) -> Self {
        Self {
            objects: HashMap::new(),
            prune_threshold,
            prune_at: prune_threshold,
        }
    }

    /// Add `effect` to the set for (object, key).
    ///
    /// Returns `true` only if it was not already a member, which is when the
    /// caller must record a back-link.
    pub(crate) fn insert(
        &mut self,
        identity: &Identity,
        key: &str,
        effect: &Rc<dyn AnyEffect>,
    ) -> bool {
        let id = identity.id();
        if !self.objects.contains_key(&id) {
            if self.objects.len() >= self.prune_at {
                self.prune();
                self.prune_at = (self.objects.len() * 2).max(self.prune_threshold);
            }
            self.objects.insert(
                id,
                ObjectDeps {
                    alive: identity.downgrade(),
                    fields: HashMap::new(),
                },
            );
        }

        let Some(entry) = self.objects.get_mut(&id) else {
            return false;
        };
        if !entry.fields.contains_key(key) {
            entry.fields.insert(Key::from(key), SubscriptionSet::default());
        }
        let Some(set) = entry.fields.get_mut(key) else {
            return false;
        };

        let computation = effect.core().id();
        if set.contains_key(&computation) {
            return false;
        }
        set.insert(computation, Rc::downgrade(effect));
        true
    }

    /// Remove one computation from one set. Empty sets and entries are
    /// dropped. Missing entries are fine.
    pub(crate) fn remove(&mut self, object: ObjectId, key: &str, computation: ComputationId) {
        let Some(entry) = self.objects.get_mut(&object) else {
            return;
        };
        if let Some(set) = entry.fields.get_mut(key) {
            set.shift_remove(&computation);
            if set.is_empty() {
                entry.fields.remove(key);
            }
        }
        if entry.fields.is_empty() {
            self.objects.remove(&object);
        }
    }

    /// Live members of the set for (object, key), in subscription order.
    ///
    /// The trigger iterates the copy, since re-running a member may remove
    /// and re-add members of the very same set. Members whose handles are
    /// all gone are skipped.
    pub(crate) fn snapshot(&self, object: ObjectId, key: &str) -> Vec<Rc<dyn AnyEffect>> {
        self.objects
            .get(&object)
            .filter(|entry| entry.is_alive())
            .and_then(|entry| entry.fields.get(key))
            .map(|set| set.values().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    pub(crate) fn subscriber_count(&self, object: ObjectId, key: &str) -> usize {
        self.objects
            .get(&object)
            .and_then(|entry| entry.fields.get(key))
            .map_or(0, IndexMap::len)
    }

    /// Number of objects with at least one subscribed field.
    pub(crate) fn tracked_objects(&self) -> usize {
        self.objects.len()
    }

    /// Drop every entry whose object is gone. Returns how many were dropped.
    pub(crate) fn prune(&mut self) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, entry| entry.is_alive());
        let pruned = before - self.objects.len();
        if pruned > 0 {
            tracing::debug!(pruned, remaining = self.objects.len(), "pruned dead dependency entries");
        }
        pruned
    }
}
