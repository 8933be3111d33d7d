//! Computation identities and type-erased handles.
//!
//! A computation is any re-runnable unit that reads tracked fields: effects,
//! the getter behind a computed cell, the getter behind a watcher. The store
//! and the schedulers only ever see them through [`AnyEffect`] and [`Job`].

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::effect::EffectCore;

/// Unique identifier for a computation.
///
/// Subscription sets and the job queue are keyed by this ID, which is what
/// makes re-subscribing and re-queueing idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComputationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "computation#{}", self.0)
    }
}

/// A computation with its result type erased.
pub(crate) trait AnyEffect {
    fn core(&self) -> &EffectCore;

    /// Re-run as a trigger would: the result is discarded, and a computation
    /// that is already executing is skipped.
    fn execute(self: Rc<Self>);
}

/// A triggered computation handed to a scheduler.
///
/// Running the job re-runs the computation with full cleanup and tracking.
#[derive(Clone)]
pub struct Job {
    effect: Rc<dyn AnyEffect>,
}

impl Job {
    pub(crate) fn new(effect: Rc<dyn AnyEffect>) -> Self {
        Self { effect }
    }

    /// The computation this job re-runs.
    pub fn id(&self) -> ComputationId {
        self.effect.core().id()
    }

    /// Re-run the computation now.
    pub fn run(&self) {
        Rc::clone(&self.effect).execute();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Job").field(&self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computation_ids_are_unique() {
        let id1 = ComputationId::new();
        let id2 = ComputationId::new();
        let id3 = ComputationId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn display_is_readable() {
        let id = ComputationId::new();
        assert!(id.to_string().starts_with("computation#"));
    }
}
