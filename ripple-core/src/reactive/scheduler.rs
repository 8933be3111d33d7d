//! Scheduling
//!
//! By default a triggered computation re-runs inline, inside the write that
//! triggered it. A [`Scheduler`] replaces that with a policy of its own.
//!
//! # The Task Queue
//!
//! There are no implicit microtasks here. Deferred work goes into the
//! runtime's task queue and runs when the host calls
//! [`Runtime::drain`](super::Runtime::drain), which is the one place where
//! "after the current synchronous call stack" happens.
//!
//! Two kinds of task live in the queue:
//!
//! - A **flush** of the deduplicating job queue. Jobs are keyed by
//!   computation, so N triggers of the same computation before the flush
//!   runs collapse into one run. Only the first job of a turn schedules a
//!   flush; later ones ride along.
//! - A **deferred closure**, one per trigger, used by post-flush watchers.

use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::subscriber::{ComputationId, Job};

/// Policy deciding how a triggered computation runs.
#[derive(Clone)]
pub enum Scheduler {
    /// Queue the job in the runtime's deduplicating job queue. It runs once
    /// on the next `drain()`, however many times it was triggered.
    Queue,

    /// Defer one run per trigger to the runtime's task queue.
    Post,

    /// Hand the job to a caller-supplied function, which may run it now,
    /// later, or never.
    Custom(Rc<dyn Fn(Job)>),
}

impl Scheduler {
    /// Wrap a closure as a custom scheduler.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(Job) + 'static,
    {
        Scheduler::Custom(Rc::new(f))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheduler::Queue => f.write_str("Queue"),
            Scheduler::Post => f.write_str("Post"),
            Scheduler::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A unit of deferred work.
pub(crate) enum Task {
    /// Drain the pending job set.
    Flush,
    Deferred(Box<dyn FnOnce()>),
}

#[derive(Default)]
pub(crate) struct JobQueue {
    pending: IndexMap<ComputationId, Job>,
    flush_pending: bool,
    tasks: VecDeque<Task>,
}

impl JobQueue {
    /// Queue a job, coalescing with an already-pending run of the same
    /// computation. Returns `true` if this call scheduled a new flush.
    pub(crate) fn enqueue(&mut self, job: Job) -> bool {
        self.pending.entry(job.id()).or_insert(job);
        if self.flush_pending {
            return false;
        }
        self.flush_pending = true;
        self.tasks.push_back(Task::Flush);
        true
    }

    pub(crate) fn defer(&mut self, task: Box<dyn FnOnce()>) {
        self.tasks.push_back(Task::Deferred(task));
    }

    pub(crate) fn next_task(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Take the oldest pending job. Jobs queued while a flush is draining are
    /// picked up by that same flush.
    pub(crate) fn next_job(&mut self) -> Option<Job> {
        self.pending.shift_remove_index(0).map(|(_, job)| job)
    }

    /// Called once the pending set is empty. Enqueues after this schedule a
    /// fresh flush.
    pub(crate) fn finish_flush(&mut self) {
        self.flush_pending = false;
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.tasks.is_empty() && self.pending.is_empty()
    }

    pub(crate) fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// Empty the queue, as after an aborted drain, handing back what was in
    /// it. The caller drops it once the queue is no longer borrowed, since a
    /// job may hold the last handle to its computation.
    pub(crate) fn clear(&mut self) -> JobQueue {
        std::mem::take(self)
    }
}
