//! Plain Objects
//!
//! An [`Object`] is the plain data the engine tracks: an ordered map of
//! fields behind a shared handle. Cloning an `Object` clones the handle, not
//! the data, so identity survives being passed around.
//!
//! Writing to an `Object` directly is *not* tracked. Drivers build objects
//! with these methods, then hand them to
//! [`Runtime::reactive`](super::Runtime::reactive) and mutate them only
//! through the returned view.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use super::refs::Ref;
use super::value::{Key, Value};

/// Counter for generating unique object IDs.
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identity of a tracked object.
///
/// IDs are never reused, so an ID left behind by a dropped object can not
/// alias a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        Self(OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity plus a liveness token.
///
/// The dependency store keeps only a `Weak` of the token, which lets it tell
/// when the owner is gone without keeping it alive.
#[derive(Debug)]
pub(crate) struct Identity {
    id: ObjectId,
    alive: Rc<()>,
}

impl Identity {
    pub(crate) fn new() -> Self {
        Self {
            id: ObjectId::next(),
            alive: Rc::new(()),
        }
    }

    pub(crate) fn id(&self) -> ObjectId {
        self.id
    }

    pub(crate) fn downgrade(&self) -> Weak<()> {
        Rc::downgrade(&self.alive)
    }
}

struct ObjectCell {
    identity: Identity,
    fields: RefCell<IndexMap<Key, Value>>,
}

/// A plain, untracked data object with identity.
#[derive(Clone)]
pub struct Object(Rc<ObjectCell>);

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Self(Rc::new(ObjectCell {
            identity: Identity::new(),
            fields: RefCell::new(IndexMap::new()),
        }))
    }

    /// Builder-style insert, for constructing objects inline.
    pub fn with(self, key: impl Into<Key>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Build an object from a JSON value. Non-object JSON yields `None`.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match Value::from(json) {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Get the object's identity.
    pub fn id(&self) -> ObjectId {
        self.0.identity.id()
    }

    pub(crate) fn identity(&self) -> &Identity {
        &self.0.identity
    }

    /// Whether two handles point at the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Read a field without tracking.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.fields.borrow().get(key).cloned()
    }

    /// Write a field without publishing. Returns the previous value.
    pub fn insert(&self, key: impl Into<Key>, value: impl Into<Value>) -> Option<Value> {
        self.0.fields.borrow_mut().insert(key.into(), value.into())
    }

    /// Remove a field without publishing, keeping the order of the rest.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.fields.borrow_mut().shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.fields.borrow().contains_key(key)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> Vec<Key> {
        self.0.fields.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.fields.borrow().is_empty()
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FromIterator<(K, V)> for Object
where
    K: Into<Key>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        for (key, value) in iter {
            object.insert(key, value);
        }
        object
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Object {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().collect()
    }
}

/// Collect the output of `to_refs` back into an object, ready for
/// [`Runtime::proxy_refs`](super::Runtime::proxy_refs).
impl From<IndexMap<Key, Ref>> for Object {
    fn from(refs: IndexMap<Key, Ref>) -> Self {
        refs.into_iter().collect()
    }
}

impl fmt::Debug for Object {
    // Field values are left out: objects may contain themselves.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id())
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_ids_are_unique() {
        let a = Object::new();
        let b = Object::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn clone_shares_fields() {
        let a = Object::new().with("x", 1);
        let b = a.clone();

        b.insert("x", 2);
        assert_eq!(a.get("x"), Some(Value::Int(2)));
        assert!(a.ptr_eq(&b));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn keys_keep_insertion_order() {
        let object = Object::new().with("b", 1).with("a", 2).with("c", 3);
        object.remove("a");

        let binding = object.keys();
        let keys: Vec<&str> = binding.iter().map(|k| &**k).collect();
        assert_eq!(keys, ["b", "c"]);
    }

    #[test]
    fn from_json_requires_an_object() {
        let object = Object::from_json(serde_json::json!({ "foo": { "bar": 2 } })).unwrap();
        let inner = object.get("foo").and_then(|v| v.as_object().cloned()).unwrap();
        assert_eq!(inner.get("bar"), Some(Value::Int(2)));

        assert!(Object::from_json(serde_json::json!([1, 2])).is_none());
    }

    #[test]
    fn identity_token_dies_with_object() {
        let object = Object::new();
        let token = object.identity().downgrade();
        assert!(token.upgrade().is_some());

        drop(object);
        assert!(token.upgrade().is_none());
    }
}
