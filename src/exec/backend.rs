// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The region driver and the planner talk to an [`ExecutorBackend`]
//! instead of a raw channel sender. Production forwards submissions to the
//! external task executor; tests substitute an in-memory executor that
//! records what was scheduled.

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::Result;
use crate::exec::task::Submission;

/// Trait abstracting how planned tasks are executed.
///
/// Implementations must honour `options.syncdeps` as a happens-before
/// constraint and `options.scope` as a placement restriction, resolve
/// task-handle arguments when the task runs, and bind each task's output
/// to its handle.
pub trait ExecutorBackend: Send {
    /// Hand a planned task to the executor.
    fn enqueue(&mut self, submission: Submission) -> Result<()>;
}

/// Production backend: forwards submissions to the external executor loop
/// over an unbounded channel. Execution, handle binding and completion
/// events are owned by the executor on the other end.
pub struct ChannelExecutor {
    tx: mpsc::UnboundedSender<Submission>,
}

impl ChannelExecutor {
    pub fn new(tx: mpsc::UnboundedSender<Submission>) -> Self {
        Self { tx }
    }
}

impl ExecutorBackend for ChannelExecutor {
    fn enqueue(&mut self, submission: Submission) -> Result<()> {
        debug!(handle = ?submission.handle, func = ?submission.func, "forwarding submission");
        self.tx
            .send(submission)
            .map_err(|e| anyhow!("executor channel closed: {e}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TaskHandle;
    use crate::exec::task::{TaskFn, TaskOptions};

    #[test]
    fn enqueue_forwards_over_the_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = ChannelExecutor::new(tx);

        let handle = TaskHandle::new();
        backend
            .enqueue(Submission {
                handle: handle.clone(),
                func: TaskFn::Copy,
                args: Vec::new(),
                options: TaskOptions::default(),
            })
            .unwrap();

        let forwarded = rx.try_recv().unwrap();
        assert_eq!(forwarded.handle, handle);
    }

    #[test]
    fn enqueue_reports_a_closed_channel() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut backend = ChannelExecutor::new(tx);

        let err = backend.enqueue(Submission {
            handle: TaskHandle::new(),
            func: TaskFn::Copy,
            args: Vec::new(),
            options: TaskOptions::default(),
        });
        assert!(err.is_err());
    }
}
