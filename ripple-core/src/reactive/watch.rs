//! Watchers
//!
//! A watcher observes a getter and calls back with the new and previous
//! values whenever the getter's dependencies change.
//!
//! Under the hood it is a lazy effect whose scheduler runs the watch job
//! instead of the effect:
//!
//! 1. Re-run the getter to get the new value (this also re-collects its
//!    dependencies).
//! 2. Run the invalidation callback registered during the previous callback,
//!    if any. This is how a callback cancels its own stale async work.
//! 3. Call the user callback with `(new, old, on_invalidate)`. Reads inside
//!    the callback are not tracked.
//! 4. Keep `new` as the next `old`.
//!
//! With [`Flush::Post`], the job is deferred to the runtime's task queue and
//! runs on the next [`Runtime::drain`](super::Runtime::drain).

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use super::context::ReactiveContext;
use super::effect::{Effect, EffectOptions, WeakEffect};
use super::object::ObjectId;
use super::refs::Ref;
use super::runtime::{FlagGuard, RuntimeInner};
use super::scheduler::Scheduler;
use super::subscriber::ComputationId;
use super::tracked::Reactive;
use super::value::Value;
use crate::error::Result;

/// When a triggered watcher runs its callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flush {
    /// Inline, inside the write that triggered it.
    #[default]
    Sync,
    /// On the next `drain()`.
    Post,
}

/// Options for [`Runtime::watch`](super::Runtime::watch).
///
/// Deserializes from JSON such as `{"immediate": true, "flush": "post"}`.
/// Missing fields take their defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call back once at registration, with no previous value.
    pub immediate: bool,
    pub flush: Flush,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            ..Self::default()
        }
    }

    pub fn with_flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

type Cleanup = Box<dyn FnOnce()>;
type Callback<T> = Box<dyn FnMut(&T, Option<&T>, &OnInvalidate<'_>)>;

/// Passed to a watch callback to register work that must run before the
/// next callback (or when the watcher stops).
pub struct OnInvalidate<'a> {
    slot: &'a RefCell<Option<Cleanup>>,
}

impl OnInvalidate<'_> {
    /// Register `f`, replacing anything registered earlier in this callback.
    pub fn register<F>(&self, f: F)
    where
        F: FnOnce() + 'static,
    {
        *self.slot.borrow_mut() = Some(Box::new(f));
    }
}

impl fmt::Debug for OnInvalidate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnInvalidate")
            .field("registered", &self.slot.borrow().is_some())
            .finish()
    }
}

struct WatchState<T: 'static> {
    effect: OnceCell<WeakEffect<T>>,
    runtime: Weak<RuntimeInner>,
    old: RefCell<Option<T>>,
    cleanup: RefCell<Option<Cleanup>>,
    callback: RefCell<Callback<T>>,
    in_job: Cell<bool>,
}

impl<T: 'static> WatchState<T> {
    fn job(&self) {
        let Some(effect) = self.effect.get().and_then(WeakEffect::upgrade) else {
            return;
        };
        if effect.is_stopped() {
            return;
        }
        if self.in_job.get() {
            tracing::warn!(computation = %effect.id(), "watch callback re-triggered its own watcher");
            return;
        }
        let _in_job = FlagGuard::set(&self.in_job);

        let new = effect.run();
        self.invalidate();

        let old = self.old.borrow_mut().take();
        {
            let runtime = self.runtime.upgrade();
            let _ctx = runtime.as_ref().map(ReactiveContext::untracked);
            let on_invalidate = OnInvalidate {
                slot: &self.cleanup,
            };
            let mut callback = self.callback.borrow_mut();
            (*callback)(&new, old.as_ref(), &on_invalidate);
        }
        *self.old.borrow_mut() = Some(new);
    }

    fn defer_job(self: &Rc<Self>) {
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };
        let this = Rc::clone(self);
        runtime.defer(Box::new(move || this.job()));
    }

    /// Run and clear the registered invalidation callback.
    fn invalidate(&self) {
        let cleanup = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }
}

/// Handle to a registered watcher.
///
/// The handle owns the watcher: keep it to keep the watcher running.
/// Dropping it detaches the watcher without running a pending invalidation
/// callback; call [`stop`](Self::stop) for that.
#[must_use = "dropping the handle detaches the watcher"]
pub struct WatchHandle<T: 'static> {
    effect: Effect<T>,
    state: Rc<WatchState<T>>,
}

impl<T: 'static> WatchHandle<T> {
    /// Detach the watcher. A pending invalidation callback runs now.
    pub fn stop(&self) {
        self.effect.stop();
        self.state.invalidate();
    }

    pub fn is_stopped(&self) -> bool {
        self.effect.is_stopped()
    }

    pub fn id(&self) -> ComputationId {
        self.effect.id()
    }
}

impl<T: 'static> fmt::Debug for WatchHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("effect", &self.effect)
            .field("in_job", &self.state.in_job.get())
            .finish()
    }
}

pub(crate) fn watch<T, G, C>(
    runtime: &Rc<RuntimeInner>,
    getter: G,
    callback: C,
    options: WatchOptions,
) -> WatchHandle<T>
where
    T: 'static,
    G: Fn() -> T + 'static,
    C: FnMut(&T, Option<&T>, &OnInvalidate<'_>) + 'static,
{
    let state = Rc::new(WatchState {
        effect: OnceCell::new(),
        runtime: Rc::downgrade(runtime),
        old: RefCell::new(None),
        cleanup: RefCell::new(None),
        callback: RefCell::new(Box::new(callback)),
        in_job: Cell::new(false),
    });

    let scheduler = {
        let state = Rc::clone(&state);
        match options.flush {
            Flush::Sync => Scheduler::custom(move |_job| state.job()),
            Flush::Post => Scheduler::custom(move |_job| state.defer_job()),
        }
    };
    let effect = Effect::new(runtime, getter, EffectOptions::lazy().with_scheduler(scheduler));
    let registered = state.effect.set(effect.downgrade()).is_ok();
    debug_assert!(registered, "watch state bound to a second effect");
    tracing::debug!(computation = %effect.id(), ?options, "registered watcher");

    if options.immediate {
        state.job();
    } else {
        let initial = effect.run();
        *state.old.borrow_mut() = Some(initial);
    }

    WatchHandle { effect, state }
}

/// Watch every field reachable from `source`.
pub(crate) fn watch_object<C>(
    runtime: &Rc<RuntimeInner>,
    source: Reactive,
    callback: C,
    options: WatchOptions,
) -> WatchHandle<Reactive>
where
    C: FnMut(&Reactive, Option<&Reactive>, &OnInvalidate<'_>) + 'static,
{
    let getter = move || {
        let mut seen = HashSet::new();
        traverse(&source, &mut seen);
        source.clone()
    };
    watch(runtime, getter, callback, options)
}

/// Read every field of `view` and everything below it, once per object.
fn traverse(view: &Reactive, seen: &mut HashSet<ObjectId>) {
    if !seen.insert(view.id()) {
        return;
    }
    for key in view.keys() {
        let value = view.get(&key);
        traverse_value(view, value, seen);
    }
}

fn traverse_value(parent: &Reactive, value: Value, seen: &mut HashSet<ObjectId>) {
    match value {
        Value::Object(object) => traverse(&parent.wrap(object), seen),
        Value::List(items) => {
            for item in items.iter() {
                traverse_value(parent, item.clone(), seen);
            }
        }
        // The ref's own slot lives in an object; walking that object covers
        // the ref's value and stays cycle-safe.
        Value::Ref(r) => traverse(ref_source(&r), seen),
        _ => {}
    }
}

fn ref_source(r: &Ref) -> &Reactive {
    match r {
        Ref::Value(target) => target,
        Ref::Field { target, .. } => target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Object, Runtime};

    type Log = Rc<RefCell<Vec<(i64, Option<i64>)>>>;

    fn log_changes(log: &Log) -> impl FnMut(&i64, Option<&i64>, &OnInvalidate<'_>) + 'static {
        let log = log.clone();
        move |new, old, _| log.borrow_mut().push((*new, old.copied()))
    }

    fn foo_getter(state: &Reactive) -> impl Fn() -> i64 + 'static {
        let s = state.clone();
        move || s.get("foo").as_i64().unwrap_or(0)
    }

    #[test]
    fn callback_gets_new_and_old_values() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let log: Log = Rc::default();

        let _watch = runtime.watch(foo_getter(&state), log_changes(&log), WatchOptions::default());
        assert!(log.borrow().is_empty());

        state.set("foo", 2).unwrap();
        state.set("foo", 3).unwrap();
        assert_eq!(*log.borrow(), [(2, Some(1)), (3, Some(2))]);
    }

    #[test]
    fn immediate_calls_back_at_registration() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let log: Log = Rc::default();

        let _watch = runtime.watch(foo_getter(&state), log_changes(&log), WatchOptions::immediate());
        assert_eq!(*log.borrow(), [(1, None)]);

        state.set("foo", 2).unwrap();
        assert_eq!(*log.borrow(), [(1, None), (2, Some(1))]);
    }

    #[test]
    fn post_flush_waits_for_drain() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let log: Log = Rc::default();

        let options = WatchOptions::default().with_flush(Flush::Post);
        let _watch = runtime.watch(foo_getter(&state), log_changes(&log), options);

        state.set("foo", 2).unwrap();
        assert!(log.borrow().is_empty());
        assert!(runtime.has_pending_tasks());

        assert_eq!(runtime.drain().unwrap(), 1);
        assert_eq!(*log.borrow(), [(2, Some(1))]);
    }

    #[test]
    fn invalidation_runs_before_next_callback() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let events = Rc::new(RefCell::new(Vec::<String>::new()));

        let ev = events.clone();
        let _watch = runtime.watch(
            foo_getter(&state),
            move |new, _old, on_invalidate| {
                ev.borrow_mut().push(format!("callback {new}"));
                let ev = ev.clone();
                let new = *new;
                on_invalidate.register(move || ev.borrow_mut().push(format!("expired {new}")));
            },
            WatchOptions::default(),
        );

        state.set("foo", 2).unwrap();
        state.set("foo", 3).unwrap();
        assert_eq!(*events.borrow(), ["callback 2", "expired 2", "callback 3"]);
    }

    #[test]
    fn stop_detaches_and_runs_pending_invalidation() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let expired = Rc::new(Cell::new(false));
        let calls = Rc::new(Cell::new(0));

        let (e, c) = (expired.clone(), calls.clone());
        let handle = runtime.watch(
            foo_getter(&state),
            move |_new, _old, on_invalidate| {
                c.set(c.get() + 1);
                let e = e.clone();
                on_invalidate.register(move || e.set(true));
            },
            WatchOptions::default(),
        );

        state.set("foo", 2).unwrap();
        assert_eq!(calls.get(), 1);

        handle.stop();
        assert!(handle.is_stopped());
        assert!(expired.get());

        state.set("foo", 3).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn watcher_is_bound_to_its_effect() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let log: Log = Rc::default();

        let handle = runtime.watch(foo_getter(&state), log_changes(&log), WatchOptions::default());
        let bound = handle.state.effect.get().and_then(WeakEffect::upgrade);
        assert_eq!(bound.map(|effect| effect.id()), Some(handle.id()));
    }

    #[test]
    fn dropped_handle_detaches_the_watcher() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let log: Log = Rc::default();

        let sync = runtime.watch(foo_getter(&state), log_changes(&log), WatchOptions::default());
        drop(sync);
        state.set("foo", 2).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(runtime.subscriber_count(state.id(), "foo"), 0);

        // A post-flush job queued before the drop finds nothing to run.
        let options = WatchOptions::default().with_flush(Flush::Post);
        let post = runtime.watch(foo_getter(&state), log_changes(&log), options);
        state.set("foo", 3).unwrap();
        drop(post);
        runtime.drain().unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn callback_reads_are_not_tracked() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1).with("other", 1));
        let calls = Rc::new(Cell::new(0));

        let (s, c) = (state.clone(), calls.clone());
        let _watch = runtime.watch(
            foo_getter(&state),
            move |_, _, _| {
                c.set(c.get() + 1);
                s.get("other");
            },
            WatchOptions::default(),
        );

        state.set("foo", 2).unwrap();
        state.set("other", 2).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn callback_writing_its_source_does_not_recurse() {
        let runtime = Runtime::new();
        let state = runtime.reactive(Object::new().with("foo", 1));
        let calls = Rc::new(Cell::new(0));

        let (s, c) = (state.clone(), calls.clone());
        let _watch = runtime.watch(
            foo_getter(&state),
            move |new, _, _| {
                c.set(c.get() + 1);
                if *new < 100 {
                    s.set("foo", new + 100).unwrap();
                }
            },
            WatchOptions::default(),
        );

        state.set("foo", 2).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(state.get("foo"), Value::Int(102));
    }

    #[test]
    fn deep_watch_sees_nested_writes_and_survives_cycles() {
        let runtime = Runtime::new();
        let inner = Object::new().with("bar", 1);
        let root = Object::new().with("foo", inner.clone()).with("list", vec![Value::from(inner.clone())]);
        inner.insert("back", root.clone());
        let state = runtime.reactive(root);
        let calls = Rc::new(Cell::new(0));

        let c = calls.clone();
        let _watch = runtime.watch_object(state.clone(), move |_, _, _| c.set(c.get() + 1), WatchOptions::default());

        state.nested("foo").unwrap().set("bar", 2).unwrap();
        assert_eq!(calls.get(), 1);

        // Break the cycle so the objects can be freed.
        inner.remove("back");
    }

    #[test]
    fn deep_watch_follows_refs() {
        let runtime = Runtime::new();
        let count = runtime.new_ref(1);
        let state = runtime.reactive(Object::new().with("count", count.clone()));
        let calls = Rc::new(Cell::new(0));

        let c = calls.clone();
        let _watch = runtime.watch_object(state, move |_, _, _| c.set(c.get() + 1), WatchOptions::default());

        count.set(2).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn options_deserialize_from_json() {
        let options = WatchOptions::from_json(r#"{"immediate": true, "flush": "post"}"#).unwrap();
        assert_eq!(options, WatchOptions::immediate().with_flush(Flush::Post));

        let defaults = WatchOptions::from_json("{}").unwrap();
        assert_eq!(defaults, WatchOptions::default());

        assert!(WatchOptions::from_json(r#"{"flush": "later"}"#).is_err());
    }
}
