//! Reactive Primitives
//!
//! This module implements the core reactive system: tracked objects,
//! effects, computed cells, refs and watchers.
//!
//! # Concepts
//!
//! ## Tracked Objects
//!
//! A [`Reactive`] wraps a plain [`Object`]. Reading a field while a
//! computation is running subscribes that computation to the field; writing
//! the field re-runs (or schedules) every subscriber. A read-only view
//! rejects writes.
//!
//! ## Effects
//!
//! An [`Effect`] is a computation that re-runs whenever a field it read
//! changes. Dependencies are rebuilt on every run, so a branch that is no
//! longer taken stops triggering it. Effects can be lazy, and a
//! [`Scheduler`] can take over how a triggered run happens.
//!
//! ## Computed Cells
//!
//! A [`Computed`] is a derived value that caches its result and recomputes
//! only when read after a dependency changed.
//!
//! ## Refs and Watchers
//!
//! A [`Ref`] is a single reactive value, standalone or bound to one field of
//! an object. A watcher calls back with the new and previous values of a
//! getter whenever it changes.
//!
//! # Implementation Notes
//!
//! All state lives in a [`Runtime`]. Dependencies are kept in a store keyed
//! by object identity and field name, and a per-runtime context stack
//! attributes reads to the innermost running computation.
//!
//! This approach (sometimes called "automatic dependency tracking" or
//! "transparent reactivity") is used by SolidJS, Vue 3, and Leptos.

mod computed;
mod context;
mod effect;
mod object;
mod refs;
mod runtime;
mod scheduler;
mod store;
mod subscriber;
mod tracked;
mod value;
mod watch;

pub use computed::Computed;
pub use effect::{Effect, EffectOptions};
pub use object::{Object, ObjectId};
pub use refs::{Ref, RefsProxy};
pub use runtime::Runtime;
pub use scheduler::Scheduler;
pub use subscriber::{ComputationId, Job};
pub use tracked::{Mode, Reactive};
pub use value::{Key, Value};
pub use watch::{Flush, OnInvalidate, WatchHandle, WatchOptions};
