//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a field is read,
//! we can subscribe the current computation to it.
//!
//! # Implementation
//!
//! Each runtime owns a stack of frames. When a computation runs, it pushes
//! itself onto the stack; when it completes, it pops. Reads are attributed to
//! the top frame only, so a computation started from inside another one
//! (a nested effect, a computed read inside an effect) never steals or loses
//! the outer computation's dependencies.
//!
//! Frames are pushed through [`ReactiveContext`], a guard that pops on drop.
//! The stack therefore stays balanced even if a computation panics.

use std::cell::RefCell;
use std::rc::Rc;

use super::runtime::RuntimeInner;
use super::subscriber::{AnyEffect, ComputationId};

/// An entry in the context stack.
#[derive(Clone)]
pub(crate) enum Frame {
    /// Reads are attributed to this computation.
    Tracking(Rc<dyn AnyEffect>),
    /// Reads are not attributed to anyone.
    Untracked,
}

impl Frame {
    fn id(&self) -> Option<ComputationId> {
        match self {
            Frame::Tracking(effect) => Some(effect.core().id()),
            Frame::Untracked => None,
        }
    }
}

/// The per-runtime stack of running computations.
#[derive(Default)]
pub(crate) struct ContextStack {
    frames: RefCell<Vec<Frame>>,
}

impl ContextStack {
    /// The computation reads should be attributed to, if any.
    pub(crate) fn current(&self) -> Option<Rc<dyn AnyEffect>> {
        match self.frames.borrow().last() {
            Some(Frame::Tracking(effect)) => Some(Rc::clone(effect)),
            _ => None,
        }
    }

    pub(crate) fn current_id(&self) -> Option<ComputationId> {
        self.frames.borrow().last().and_then(Frame::id)
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    fn push(&self, frame: Frame) {
        self.frames.borrow_mut().push(frame);
    }

    fn pop(&self) -> Option<Frame> {
        self.frames.borrow_mut().pop()
    }
}

/// Guard that pops the context when dropped.
pub(crate) struct ReactiveContext {
    runtime: Rc<RuntimeInner>,
    computation: Option<ComputationId>,
}

impl ReactiveContext {
    /// Enter a tracking context for the given computation.
    ///
    /// While this context is on top, every tracked read subscribes
    /// `effect`.
    pub(crate) fn enter(runtime: &Rc<RuntimeInner>, effect: Rc<dyn AnyEffect>) -> Self {
        let computation = Some(effect.core().id());
        runtime.stack().push(Frame::Tracking(effect));
        Self {
            runtime: Rc::clone(runtime),
            computation,
        }
    }

    /// Enter a context in which reads subscribe nothing.
    pub(crate) fn untracked(runtime: &Rc<RuntimeInner>) -> Self {
        runtime.stack().push(Frame::Untracked);
        Self {
            runtime: Rc::clone(runtime),
            computation: None,
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = self.runtime.stack().pop();

        // Verify we're popping the right context.
        if let Some(frame) = popped {
            debug_assert_eq!(
                frame.id(),
                self.computation,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.computation,
                frame.id()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{EffectOptions, Runtime};

    #[test]
    fn context_tracks_computation() {
        let runtime = Runtime::new();
        let effect = runtime.effect_with(|| (), EffectOptions::lazy());
        let inner = runtime.inner();

        assert_eq!(inner.stack().depth(), 0);
        assert!(inner.stack().current().is_none());

        {
            let _ctx = ReactiveContext::enter(inner, effect.erased());
            assert_eq!(inner.stack().current_id(), Some(effect.id()));
        }

        // Context should be cleaned up after drop
        assert_eq!(inner.stack().depth(), 0);
        assert!(inner.stack().current_id().is_none());
    }

    #[test]
    fn nested_contexts() {
        let runtime = Runtime::new();
        let outer = runtime.effect_with(|| (), EffectOptions::lazy());
        let inner_effect = runtime.effect_with(|| (), EffectOptions::lazy());
        let inner = runtime.inner();

        {
            let _outer = ReactiveContext::enter(inner, outer.erased());
            assert_eq!(inner.stack().current_id(), Some(outer.id()));

            {
                let _inner = ReactiveContext::enter(inner, inner_effect.erased());
                assert_eq!(inner.stack().current_id(), Some(inner_effect.id()));
            }

            // After inner context drops, outer should be current
            assert_eq!(inner.stack().current_id(), Some(outer.id()));
        }

        assert!(inner.stack().current_id().is_none());
    }

    #[test]
    fn untracked_frame_hides_outer_computation() {
        let runtime = Runtime::new();
        let outer = runtime.effect_with(|| (), EffectOptions::lazy());
        let inner = runtime.inner();

        let _outer = ReactiveContext::enter(inner, outer.erased());
        {
            let _untracked = ReactiveContext::untracked(inner);
            assert!(inner.stack().current().is_none());
            assert_eq!(inner.stack().depth(), 2);
        }
        assert_eq!(inner.stack().current_id(), Some(outer.id()));
    }
}
