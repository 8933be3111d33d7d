//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects tracked objects,
//! effects, computed cells and watchers. It owns the dependency store, the
//! context stack and the task queue.
//!
//! # How It Works
//!
//! 1. When a tracked field is read while a computation is running, the
//!    runtime subscribes that computation to the (object, field) pair, and
//!    records the pair among the computation's back-links.
//!
//! 2. When a tracked field is written, the runtime snapshots the
//!    subscribers of that pair and, for each one, either re-runs it inline or
//!    hands it to its scheduler.
//!
//! 3. Before a computation re-runs, the runtime removes it from every set its
//!    back-links point at, so the next run starts from nothing.
//!
//! # Ownership
//!
//! Each `Runtime` is fully independent: two runtimes never share
//! subscriptions or queued work. Views and computations hold the runtime
//! weakly, so dropping the last `Runtime` handle tears the engine down; what
//! remains keeps working, untracked.
//!
//! The runtime in turn holds computations weakly. They belong to their
//! handles, so a computation that captured a `Runtime` clone or a view of the
//! objects it reads does not form a cycle with the store.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::computed::Computed;
use super::context::{ContextStack, ReactiveContext};
use super::effect::{Effect, EffectCore, EffectOptions};
use super::object::{Identity, Object, ObjectId};
use super::refs::{Ref, RefsProxy};
use super::scheduler::{JobQueue, Scheduler, Task};
use super::store::{Dep, DependencyStore};
use super::subscriber::{ComputationId, Job};
use super::tracked::{Mode, Reactive};
use super::value::{Key, Value};
use super::watch::{self, OnInvalidate, WatchHandle, WatchOptions};
use crate::config::EngineConfig;
use crate::error::{ReactiveError, Result};

/// Sets a flag for the guard's lifetime, restoring the previous value on
/// drop.
pub(crate) struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> FlagGuard<'a> {
    pub(crate) fn set(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

pub(crate) struct RuntimeInner {
    config: EngineConfig,
    store: RefCell<DependencyStore>,
    stack: ContextStack,
    queue: RefCell<JobQueue>,
    draining: Cell<bool>,
}

impl RuntimeInner {
    pub(crate) fn stack(&self) -> &ContextStack {
        &self.stack
    }

    /// Subscribe the active computation, if any, to (object, key).
    pub(crate) fn subscribe(&self, identity: &Identity, key: &str) {
        let Some(effect) = self.stack.current() else {
            return;
        };
        let core = effect.core();
        if core.is_stopped() {
            return;
        }

        let added = self.store.borrow_mut().insert(identity, key, &effect);
        if added {
            core.add_dep(Dep {
                object: identity.id(),
                key: Key::from(key),
            });
            tracing::trace!(object = %identity.id(), key, computation = %core.id(), "subscribed");
        }
    }

    /// Notify every computation subscribed to (object, key).
    pub(crate) fn publish(&self, object: ObjectId, key: &str) {
        let subscribers = self.store.borrow().snapshot(object, key);
        if subscribers.is_empty() {
            return;
        }
        tracing::trace!(object = %object, key, subscribers = subscribers.len(), "publishing");

        let active = self.stack.current_id();
        for effect in subscribers {
            let core = effect.core();
            let id = core.id();

            // A computation writing a field it reads would otherwise re-run
            // itself forever.
            if Some(id) == active {
                tracing::trace!(computation = %id, "skipping self-trigger");
                continue;
            }
            // An earlier subscriber in this snapshot may have stopped it.
            if core.is_stopped() {
                continue;
            }

            match core.scheduler().cloned() {
                Some(scheduler) => self.schedule(scheduler, Job::new(effect)),
                None => effect.execute(),
            }
        }
    }

    fn schedule(&self, scheduler: Scheduler, job: Job) {
        match scheduler {
            Scheduler::Queue => {
                let id = job.id();
                if self.queue.borrow_mut().enqueue(job) {
                    tracing::debug!(computation = %id, "scheduled job queue flush");
                }
            }
            Scheduler::Post => self.defer(Box::new(move || job.run())),
            Scheduler::Custom(f) => f(job),
        }
    }

    /// Remove a computation from every set it belongs to and clear its
    /// back-links.
    pub(crate) fn cleanup(&self, core: &EffectCore) {
        let deps = core.take_deps();
        if deps.is_empty() {
            return;
        }

        let mut store = self.store.borrow_mut();
        for dep in &deps {
            store.remove(dep.object, &dep.key, core.id());
        }
        tracing::trace!(computation = %core.id(), removed = deps.len(), "cleaned up dependencies");
    }

    pub(crate) fn defer(&self, task: Box<dyn FnOnce()>) {
        self.queue.borrow_mut().defer(task);
    }

    fn drain(&self) -> Result<usize> {
        if self.draining.get() {
            return Ok(0);
        }
        let _draining = FlagGuard::set(&self.draining);

        let limit = self.config.max_drain_jobs;
        let mut ran = 0usize;
        loop {
            let task = self.queue.borrow_mut().next_task();
            let Some(task) = task else {
                break;
            };

            match task {
                Task::Deferred(f) => {
                    f();
                    ran += 1;
                }
                Task::Flush => {
                    let mut flushed = 0usize;
                    loop {
                        let job = self.queue.borrow_mut().next_job();
                        let Some(job) = job else {
                            break;
                        };
                        job.run();
                        ran += 1;
                        flushed += 1;
                        if ran > limit {
                            return Err(self.abort_drain(limit));
                        }
                    }
                    self.queue.borrow_mut().finish_flush();
                    tracing::debug!(jobs = flushed, "flushed job queue");
                }
            }

            if ran > limit {
                return Err(self.abort_drain(limit));
            }
        }

        Ok(ran)
    }

    fn abort_drain(&self, limit: usize) -> ReactiveError {
        let stale = self.queue.borrow_mut().clear();
        drop(stale);
        tracing::error!(limit, "task queue did not settle, dropping remaining work");
        ReactiveError::DrainLimit { limit }
    }
}

/// A reactive engine instance.
///
/// Cloning a `Runtime` clones the handle; all clones drive the same engine.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use ripple_core::reactive::{Object, Runtime};
///
/// let runtime = Runtime::new();
/// let state = runtime.reactive(Object::new().with("ok", true).with("text", "foo"));
///
/// let shown = Rc::new(RefCell::new(String::new()));
/// let (s, out) = (state.clone(), shown.clone());
/// let _effect = runtime.effect(move || {
///     *out.borrow_mut() = if s.get("ok").as_bool() == Some(true) {
///         s.get("text").as_str().unwrap_or_default().to_string()
///     } else {
///         "default".to_string()
///     };
/// });
///
/// state.set("text", "bar").unwrap();
/// assert_eq!(*shown.borrow(), "bar");
///
/// state.set("ok", false).unwrap();
/// assert_eq!(*shown.borrow(), "default");
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::build(EngineConfig::default())
    }

    /// Create a runtime with a validated configuration.
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: EngineConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                store: RefCell::new(DependencyStore::new(config.prune_threshold)),
                stack: ContextStack::default(),
                queue: RefCell::new(JobQueue::default()),
                draining: Cell::new(false),
                config,
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn inner(&self) -> &Rc<RuntimeInner> {
        &self.inner
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// Wrap an object so reads subscribe and writes publish.
    pub fn reactive(&self, object: Object) -> Reactive {
        Reactive::new(&self.inner, object, Mode::Mutable)
    }

    /// Wrap an object in a view that rejects writes.
    pub fn readonly(&self, object: Object) -> Reactive {
        Reactive::new(&self.inner, object, Mode::ReadOnly)
    }

    /// Register a computation that runs now and whenever its dependencies
    /// change. It keeps running for as long as the returned handle (or a
    /// clone of it) is alive.
    pub fn effect<T, F>(&self, f: F) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        Effect::new(&self.inner, f, EffectOptions::default())
    }

    /// Register a computation with explicit options.
    pub fn effect_with<T, F>(&self, f: F, options: EffectOptions) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        Effect::new(&self.inner, f, options)
    }

    /// Create a lazily evaluated, cached derived value.
    pub fn computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + 'static,
        F: Fn() -> T + 'static,
    {
        Computed::new(&self.inner, getter)
    }

    /// Create a standalone reactive value with a single `value` field.
    pub fn new_ref(&self, value: impl Into<Value>) -> Ref {
        Ref::new(&self.inner, value.into())
    }

    /// View an object whose fields may hold refs, unwrapping them on read
    /// and writing through them on write.
    pub fn proxy_refs(&self, object: Object) -> RefsProxy {
        RefsProxy::new(self.reactive(object))
    }

    /// Watch the value produced by `getter`, calling `callback` with the new
    /// and previous values whenever it is re-evaluated. Keep the handle to
    /// keep the watcher running.
    pub fn watch<T, G, C>(&self, getter: G, callback: C, options: WatchOptions) -> WatchHandle<T>
    where
        T: 'static,
        G: Fn() -> T + 'static,
        C: FnMut(&T, Option<&T>, &OnInvalidate<'_>) + 'static,
    {
        watch::watch(&self.inner, getter, callback, options)
    }

    /// Watch every field reachable from `source`, at any depth.
    pub fn watch_object<C>(
        &self,
        source: Reactive,
        callback: C,
        options: WatchOptions,
    ) -> WatchHandle<Reactive>
    where
        C: FnMut(&Reactive, Option<&Reactive>, &OnInvalidate<'_>) + 'static,
    {
        watch::watch_object(&self.inner, source, callback, options)
    }

    // ------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------

    /// Run `f` with tracking paused: reads inside subscribe nothing.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _ctx = ReactiveContext::untracked(&self.inner);
        f()
    }

    /// Check if a computation is currently collecting dependencies.
    pub fn is_tracking(&self) -> bool {
        self.inner.stack.current().is_some()
    }

    /// The computation currently collecting dependencies, if any.
    pub fn current_computation(&self) -> Option<ComputationId> {
        self.inner.stack.current_id()
    }

    /// Number of computations subscribed to (object, key).
    pub fn subscriber_count(&self, object: ObjectId, key: &str) -> usize {
        self.inner.store.borrow().subscriber_count(object, key)
    }

    /// Number of objects the dependency store currently has entries for.
    pub fn tracked_objects(&self) -> usize {
        self.inner.store.borrow().tracked_objects()
    }

    /// Sweep dependency entries of objects that no longer exist.
    pub fn collect_garbage(&self) -> usize {
        self.inner.store.borrow_mut().prune()
    }

    // ------------------------------------------------------------------
    // Task queue
    // ------------------------------------------------------------------

    /// Run every queued job and deferred task, including ones queued while
    /// draining. Returns how many ran.
    ///
    /// This is the engine's microtask boundary: the host calls it once the
    /// current synchronous work is done. Calling it from inside a running
    /// task is a no-op.
    pub fn drain(&self) -> Result<usize> {
        self.inner.drain()
    }

    /// Check if `drain` has anything to do.
    pub fn has_pending_tasks(&self) -> bool {
        !self.inner.queue.borrow().is_idle()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("tracked_objects", &self.tracked_objects())
            .field("stack_depth", &self.inner.stack.depth())
            .field("pending_tasks", &self.has_pending_tasks())
            .field("pending_jobs", &self.inner.queue.borrow().pending_jobs())
            .finish()
    }
}
