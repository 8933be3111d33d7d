//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when it is
//! read after one of its dependencies changed.
//!
//! # How Computed Cells Work
//!
//! 1. The getter is wrapped in a lazy effect. Nothing runs at creation.
//!
//! 2. On first read, the effect runs, the result is cached and the cell is
//!    marked clean.
//!
//! 3. When a dependency changes, the effect is not re-run. Its scheduler
//!    marks the cell dirty instead and notifies whoever read the cell.
//!
//! 4. The next read sees the dirty flag and recomputes.
//!
//! # Why This Matters
//!
//! - A field changes
//! - 10 computed cells depend on it
//! - Only the cells that are actually read recompute
//! - Cells that are never read stay dirty (no wasted work)
//!
//! A cell only notifies on the clean to dirty transition, so a burst of
//! writes between two reads wakes its readers once.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::effect::{Effect, EffectOptions};
use super::object::{Identity, ObjectId};
use super::runtime::RuntimeInner;
use super::scheduler::Scheduler;

/// Field under which readers of a cell are subscribed.
const VALUE_KEY: &str = "value";

struct ComputedInner<T: 'static> {
    identity: Identity,
    runtime: Weak<RuntimeInner>,
    effect: Effect<T>,
    /// The cached value (None if never computed).
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
}

impl<T: 'static> ComputedInner<T> {
    fn invalidate(&self) {
        if self.dirty.replace(true) {
            return;
        }
        tracing::trace!(computed = %self.identity.id(), "invalidated");
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.publish(self.identity.id(), VALUE_KEY);
        }
    }
}

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Object, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.reactive(Object::new().with("foo", 1));
///
/// let s = state.clone();
/// let doubled = runtime.computed(move || s.get("foo").as_i64().unwrap_or(0) * 2);
/// assert!(doubled.is_dirty());
///
/// assert_eq!(doubled.get(), 2);
/// state.set("foo", 5).unwrap();
/// assert!(doubled.is_dirty());
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T: Clone + 'static> Computed<T> {
    pub(crate) fn new<F>(runtime: &Rc<RuntimeInner>, getter: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|this: &Weak<ComputedInner<T>>| {
            let this = this.clone();
            let scheduler = Scheduler::custom(move |_job| {
                if let Some(cell) = this.upgrade() {
                    cell.invalidate();
                }
            });
            let options = EffectOptions::lazy().with_scheduler(scheduler);

            ComputedInner {
                identity: Identity::new(),
                runtime: Rc::downgrade(runtime),
                effect: Effect::new(runtime, getter, options),
                value: RefCell::new(None),
                dirty: Cell::new(true),
            }
        });

        Self { inner }
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Subscribes the running computation to this cell.
    pub fn get(&self) -> T {
        let value = self.current();
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.subscribe(&self.inner.identity, VALUE_KEY);
        }
        value
    }

    fn current(&self) -> T {
        if !self.inner.dirty.get() {
            if let Some(value) = self.inner.value.borrow().as_ref() {
                return value.clone();
            }
        }

        let value = self.inner.effect.run();
        self.inner.dirty.set(false);
        *self.inner.value.borrow_mut() = Some(value.clone());
        tracing::debug!(computed = %self.id(), "recomputed");
        value
    }

    /// Check if the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Identity under which readers of this cell are tracked.
    pub fn id(&self) -> ObjectId {
        self.inner.identity.id()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.identity.id())
            .field("dirty", &self.inner.dirty.get())
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Object, Runtime};

    fn counted_double(runtime: &Runtime) -> (crate::reactive::Reactive, Computed<i64>, Rc<Cell<usize>>) {
        let state = runtime.reactive(Object::new().with("foo", 1));
        let calls = Rc::new(Cell::new(0));
        let (s, c) = (state.clone(), calls.clone());
        let doubled = runtime.computed(move || {
            c.set(c.get() + 1);
            s.get("foo").as_i64().unwrap_or(0) * 2
        });
        (state, doubled, calls)
    }

    #[test]
    fn computed_is_lazy() {
        let runtime = Runtime::new();
        let (_state, doubled, calls) = counted_double(&runtime);

        assert_eq!(calls.get(), 0);
        assert!(doubled.is_dirty());

        assert_eq!(doubled.get(), 2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn computed_caches() {
        let runtime = Runtime::new();
        let (state, doubled, calls) = counted_double(&runtime);

        doubled.get();
        doubled.get();
        doubled.get();
        assert_eq!(calls.get(), 1);

        // Writes only mark the cell dirty
        state.set("foo", 2).unwrap();
        state.set("foo", 3).unwrap();
        assert_eq!(calls.get(), 1);

        assert_eq!(doubled.get(), 6);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn effect_reading_computed_reruns() {
        let runtime = Runtime::new();
        let (state, doubled, _calls) = counted_double(&runtime);
        let seen = Rc::new(Cell::new(0));

        let (d, s) = (doubled.clone(), seen.clone());
        let effect = runtime.effect(move || s.set(d.get()));
        assert_eq!(seen.get(), 2);

        state.set("foo", 4).unwrap();
        assert_eq!(seen.get(), 8);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn burst_of_writes_notifies_once() {
        let runtime = Runtime::new();
        let (state, doubled, _calls) = counted_double(&runtime);
        let notified = Rc::new(Cell::new(0));

        // A reader whose scheduler only counts, so it stays subscribed.
        let (d, n) = (doubled.clone(), notified.clone());
        let _effect = runtime.effect_with(
            move || d.get(),
            EffectOptions::scheduler(Scheduler::custom(move |_job| n.set(n.get() + 1))),
        );

        state.set("foo", 2).unwrap();
        state.set("foo", 3).unwrap();
        assert_eq!(notified.get(), 1);

        // Reading makes the cell clean again, re-arming the notification.
        doubled.get();
        state.set("foo", 4).unwrap();
        assert_eq!(notified.get(), 2);
    }

    #[test]
    fn chained_computed_cells() {
        let runtime = Runtime::new();
        let (state, doubled, _calls) = counted_double(&runtime);

        let d = doubled.clone();
        let plus_one = runtime.computed(move || d.get() + 1);
        assert_eq!(plus_one.get(), 3);

        state.set("foo", 10).unwrap();
        assert!(plus_one.is_dirty());
        assert_eq!(plus_one.get(), 21);
    }
}
