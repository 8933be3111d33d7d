//! Tracked Objects
//!
//! A [`Reactive`] is a view over an [`Object`] whose accessors talk to the
//! runtime: [`get`](Reactive::get) subscribes the running computation to the
//! field, [`set`](Reactive::set) writes the field and then publishes it.
//! Every tracked access goes through these methods.
//!
//! Views are cheap handles. Tracking is keyed by the object's identity, not
//! by the view, so any number of views over the same object behave as one.

use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::object::{Object, ObjectId};
use super::refs::Ref;
use super::runtime::RuntimeInner;
use super::value::{Key, Value};
use crate::error::{ReactiveError, Result};

/// Whether a view accepts writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Reads subscribe, writes publish.
    Mutable,
    /// Writes are rejected. Reads do not subscribe, since nothing can change
    /// through this view.
    ReadOnly,
}

/// A tracked view over a plain object.
#[derive(Clone)]
pub struct Reactive {
    target: Object,
    runtime: Weak<RuntimeInner>,
    mode: Mode,
}

impl Reactive {
    pub(crate) fn new(runtime: &Rc<RuntimeInner>, target: Object, mode: Mode) -> Self {
        Self {
            target,
            runtime: Rc::downgrade(runtime),
            mode,
        }
    }

    /// Identity of the underlying object.
    pub fn id(&self) -> ObjectId {
        self.target.id()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_readonly(&self) -> bool {
        self.mode == Mode::ReadOnly
    }

    /// The underlying object. Accesses through it are not tracked.
    pub fn raw(&self) -> &Object {
        &self.target
    }

    /// Read a field, subscribing the running computation to it.
    ///
    /// Missing fields read as [`Value::Null`] and are still tracked, so a
    /// computation notices when the field is added later.
    pub fn get(&self, key: &str) -> Value {
        self.track(key);
        self.target.get(key).unwrap_or_default()
    }

    /// Read a nested object as a view of the same mode.
    ///
    /// Returns `None` if the field does not hold an object. The read is
    /// tracked either way.
    pub fn nested(&self, key: &str) -> Option<Reactive> {
        match self.get(key) {
            Value::Object(object) => Some(self.wrap(object)),
            _ => None,
        }
    }

    /// Write a field, then notify everything that read it.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.check_writable(key)?;
        self.target.insert(key, value);
        self.trigger(key);
        Ok(())
    }

    /// Read-modify-write of one field.
    pub fn update(&self, key: &str, f: impl FnOnce(Value) -> Value) -> Result<()> {
        self.check_writable(key)?;
        let next = f(self.get(key));
        self.set(key, next)
    }

    /// Delete a field, then notify everything that read it.
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        self.check_writable(key)?;
        let previous = self.target.remove(key);
        if previous.is_some() {
            self.trigger(key);
        }
        Ok(previous)
    }

    /// Field names in insertion order. Not tracked.
    pub fn keys(&self) -> Vec<Key> {
        self.target.keys()
    }

    /// A ref that reads and writes `key` through this view.
    pub fn to_ref(&self, key: &str) -> Ref {
        Ref::Field {
            target: self.clone(),
            key: Key::from(key),
        }
    }

    /// One [`to_ref`](Self::to_ref) per field, in field order.
    ///
    /// Lets callers destructure an object into standalone refs without
    /// losing reactivity: the refs still track and publish through this
    /// object.
    pub fn to_refs(&self) -> IndexMap<Key, Ref> {
        self.keys()
            .into_iter()
            .map(|key| {
                let r = self.to_ref(&key);
                (key, r)
            })
            .collect()
    }

    /// A view over `object` with this view's runtime and mode.
    pub(crate) fn wrap(&self, object: Object) -> Reactive {
        Reactive {
            target: object,
            runtime: self.runtime.clone(),
            mode: self.mode,
        }
    }

    fn track(&self, key: &str) {
        if self.mode == Mode::ReadOnly {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.subscribe(self.target.identity(), key);
        }
    }

    fn trigger(&self, key: &str) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.publish(self.target.id(), key);
        }
    }

    fn check_writable(&self, key: &str) -> Result<()> {
        if self.mode == Mode::ReadOnly {
            tracing::warn!(object = %self.id(), key, "rejected write to read-only field");
            return Err(ReactiveError::ReadOnly { key: key.to_string() });
        }
        Ok(())
    }
}

impl fmt::Debug for Reactive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reactive")
            .field("id", &self.id())
            .field("mode", &self.mode)
            .field("keys", &self.keys())
            .finish()
    }
}
