//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever a field it read during
//! its last run is written.
//!
//! # How Effects Work
//!
//! Every run goes through the same four steps:
//!
//! 1. Unsubscribe from every (object, field) pair read during the previous
//!    run, and forget those back-links.
//! 2. Push the effect onto the runtime's context stack.
//! 3. Run the function. Every tracked read subscribes the effect again.
//! 4. Pop the context stack, restoring whichever computation was running
//!    before (if any).
//!
//! Step 1 is what keeps subscriptions minimal: an effect computing
//! `if ok { text } else { "default" }` stops depending on `text` as soon as a
//! run takes the `else` branch.
//!
//! # Options
//!
//! - `lazy`: skip the run at creation. The caller runs the effect manually
//!   via [`Effect::run`], which also establishes its first dependencies.
//! - `scheduler`: decide how a triggered run happens (see
//!   [`Scheduler`]). Without one, a write re-runs the effect inline.
//!
//! # Ownership
//!
//! The dependency store only holds computations weakly. An effect lives as
//! long as its [`Effect`] handles (and any job queued for it). Keep the handle
//! to keep it running; dropping the last one unsubscribes it everywhere.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::runtime::{FlagGuard, RuntimeInner};
use super::scheduler::Scheduler;
use super::store::Dep;
use super::subscriber::{AnyEffect, ComputationId, Job};

/// Options for [`Runtime::effect_with`](super::Runtime::effect_with).
#[derive(Debug, Clone, Default)]
pub struct EffectOptions {
    /// Do not run at creation.
    pub lazy: bool,
    /// How triggered runs are carried out. `None` runs them inline.
    pub scheduler: Option<Scheduler>,
}

impl EffectOptions {
    /// Options for an effect that does not run at creation.
    pub fn lazy() -> Self {
        Self {
            lazy: true,
            scheduler: None,
        }
    }

    /// Options with just a scheduler.
    pub fn scheduler(scheduler: Scheduler) -> Self {
        Self {
            lazy: false,
            scheduler: Some(scheduler),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

/// State shared by every computation regardless of its result type.
pub(crate) struct EffectCore {
    id: ComputationId,
    runtime: Weak<RuntimeInner>,
    /// Back-links: the subscription sets this computation is a member of.
    deps: RefCell<SmallVec<[Dep; 4]>>,
    scheduler: Option<Scheduler>,
    running: Cell<bool>,
    stopped: Cell<bool>,
    run_count: Cell<usize>,
}

impl EffectCore {
    pub(crate) fn id(&self) -> ComputationId {
        self.id
    }

    pub(crate) fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.get()
    }

    pub(crate) fn add_dep(&self, dep: Dep) {
        self.deps.borrow_mut().push(dep);
    }

    pub(crate) fn take_deps(&self) -> SmallVec<[Dep; 4]> {
        std::mem::take(&mut *self.deps.borrow_mut())
    }

    #[cfg(test)]
    pub(crate) fn deps(&self) -> Vec<Dep> {
        self.deps.borrow().to_vec()
    }
}

impl Drop for EffectCore {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.cleanup(self);
        }
    }
}

struct EffectInner<T> {
    core: EffectCore,
    f: Box<dyn Fn() -> T>,
}

impl<T: 'static> AnyEffect for EffectInner<T> {
    fn core(&self) -> &EffectCore {
        &self.core
    }

    fn execute(self: Rc<Self>) {
        // Queued before it was stopped.
        if self.core.stopped.get() {
            return;
        }
        if self.core.running.get() {
            tracing::warn!(
                computation = %self.core.id,
                "skipping trigger of a computation that is already running"
            );
            return;
        }
        Effect { inner: self }.run();
    }
}

/// A computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::reactive::{Object, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.reactive(Object::new().with("count", 0));
///
/// let s = state.clone();
/// let effect = runtime.effect(move || s.get("count").as_i64().unwrap_or(0) * 2);
/// assert_eq!(effect.run_count(), 1);
///
/// state.set("count", 5).unwrap();  // re-runs the effect
/// assert_eq!(effect.run_count(), 2);
/// assert_eq!(effect.run(), 10);
/// ```
#[must_use = "dropping the last handle to an effect stops it"]
pub struct Effect<T: 'static> {
    inner: Rc<EffectInner<T>>,
}

impl<T: 'static> Effect<T> {
    pub(crate) fn new<F>(runtime: &Rc<RuntimeInner>, f: F, options: EffectOptions) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let effect = Self {
            inner: Rc::new(EffectInner {
                core: EffectCore {
                    id: ComputationId::new(),
                    runtime: Rc::downgrade(runtime),
                    deps: RefCell::default(),
                    scheduler: options.scheduler,
                    running: Cell::new(false),
                    stopped: Cell::new(false),
                    run_count: Cell::new(0),
                },
                f: Box::new(f),
            }),
        };

        if !options.lazy {
            effect.run();
        }

        effect
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> ComputationId {
        self.inner.core.id
    }

    /// Run the effect now and return its result.
    ///
    /// Dependencies are rebuilt from scratch. A stopped effect (or one whose
    /// runtime is gone) just calls its function, without tracking. Its reads
    /// are not attributed to whichever computation called `run`.
    pub fn run(&self) -> T {
        let core = &self.inner.core;
        let Some(runtime) = core.runtime.upgrade() else {
            return (self.inner.f)();
        };
        if core.stopped.get() {
            let _ctx = ReactiveContext::untracked(&runtime);
            return (self.inner.f)();
        }

        runtime.cleanup(core);

        let _running = FlagGuard::set(&core.running);
        let _ctx = ReactiveContext::enter(&runtime, self.erased());

        core.run_count.set(core.run_count.get() + 1);
        tracing::debug!(computation = %core.id, run = core.run_count.get(), "running computation");

        (self.inner.f)()
    }

    /// Detach the effect from everything it depends on. It will never be
    /// triggered again.
    pub fn stop(&self) {
        let core = &self.inner.core;
        match core.runtime.upgrade() {
            Some(runtime) => runtime.cleanup(core),
            None => drop(core.take_deps()),
        }
        core.stopped.set(true);
        tracing::debug!(computation = %core.id, "stopped computation");
    }

    /// Check if the effect has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.inner.core.stopped.get()
    }

    /// Get the number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.inner.core.run_count.get()
    }

    /// Number of (object, field) pairs read during the last run.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.deps.borrow().len()
    }

    /// A job that re-runs this effect, as a scheduler would receive it.
    pub fn job(&self) -> Job {
        Job::new(self.erased())
    }

    pub(crate) fn erased(&self) -> Rc<dyn AnyEffect> {
        self.inner.clone()
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &EffectCore {
        &self.inner.core
    }

    pub(crate) fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Non-owning handle to an effect.
pub(crate) struct WeakEffect<T> {
    inner: Weak<EffectInner<T>>,
}

impl<T: 'static> WeakEffect<T> {
    pub(crate) fn upgrade(&self) -> Option<Effect<T>> {
        self.inner.upgrade().map(|inner| Effect { inner })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
