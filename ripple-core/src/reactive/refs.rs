//! Refs
//!
//! A [`Ref`] is a single reactive value. There are two kinds:
//!
//! - a standalone ref, backed by a fresh object with one `value` field;
//! - a field ref, which reads and writes one field of an existing reactive
//!   object (see [`Reactive::to_ref`]).
//!
//! Both go through the object's tracked accessors, so a ref needs no
//! bookkeeping of its own.
//!
//! [`RefsProxy`] is the other direction: a view over an object whose fields
//! may hold refs, which reads through them transparently.

use std::fmt;
use std::rc::Rc;

use super::object::Object;
use super::runtime::RuntimeInner;
use super::tracked::{Mode, Reactive};
use super::value::{Key, Value};
use crate::error::Result;

/// Field that backs a standalone ref.
const VALUE_KEY: &str = "value";

/// A reactive handle to a single value.
#[derive(Clone)]
pub enum Ref {
    /// A standalone ref, created by [`Runtime::new_ref`](super::Runtime::new_ref).
    Value(Reactive),
    /// One field of another reactive object.
    Field { target: Reactive, key: Key },
}

impl Ref {
    pub(crate) fn new(runtime: &Rc<RuntimeInner>, value: Value) -> Self {
        let backing = Object::new().with(VALUE_KEY, value);
        Ref::Value(Reactive::new(runtime, backing, Mode::Mutable))
    }

    fn target(&self) -> (&Reactive, &str) {
        match self {
            Ref::Value(target) => (target, VALUE_KEY),
            Ref::Field { target, key } => (target, &**key),
        }
    }

    /// Read the value, subscribing the running computation.
    pub fn get(&self) -> Value {
        let (target, key) = self.target();
        target.get(key)
    }

    /// Write the value and notify readers.
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let (target, key) = self.target();
        target.set(key, value)
    }

    pub fn update(&self, f: impl FnOnce(Value) -> Value) -> Result<()> {
        let (target, key) = self.target();
        target.update(key, f)
    }

    /// Read the value without subscribing.
    pub fn peek(&self) -> Value {
        let (target, key) = self.target();
        target.raw().get(key).unwrap_or_default()
    }

    /// Check if two refs read and write the same slot.
    pub fn ptr_eq(&self, other: &Ref) -> bool {
        let (a, a_key) = self.target();
        let (b, b_key) = other.target();
        a.raw().ptr_eq(b.raw()) && a_key == b_key
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Value(target) => write!(f, "Ref::Value({})", target.id()),
            Ref::Field { target, key } => write!(f, "Ref::Field({}.{key})", target.id()),
        }
    }
}

/// A view that unwraps refs stored in an object's fields.
///
/// Reading a field holding a ref yields the ref's value. Writing a plain
/// value to such a field writes through to the ref; writing anything else
/// (including another ref) replaces the field.
#[derive(Clone, Debug)]
pub struct RefsProxy {
    inner: Reactive,
}

impl RefsProxy {
    pub(crate) fn new(inner: Reactive) -> Self {
        Self { inner }
    }

    pub fn get(&self, key: &str) -> Value {
        match self.inner.get(key) {
            Value::Ref(r) => r.get(),
            value => value,
        }
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if !matches!(value, Value::Ref(_)) {
            if let Some(Value::Ref(r)) = self.inner.raw().get(key) {
                return r.set(value);
            }
        }
        self.inner.set(key, value)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.inner.keys()
    }

    /// The underlying reactive object, refs and all.
    pub fn raw(&self) -> &Reactive {
        &self.inner
    }
}
