// src/exec/task.rs

use std::fmt;
use std::sync::Arc;

use crate::access::Arg;
use crate::data::{TaskHandle, TaskPayload, Value};
use crate::topology::Scope;

/// A user task body. Receives the resolved argument values in positional
/// order and produces the task's output payload.
pub type UserFn =
    Arc<dyn Fn(&[Value]) -> std::result::Result<TaskPayload, String> + Send + Sync>;

/// What a submitted task runs.
#[derive(Clone)]
pub enum TaskFn {
    /// User-provided body.
    User { name: String, body: UserFn },
    /// Scheduler-synthesised copy: the payload of the second argument is
    /// copied into the first.
    Copy,
    /// Scheduler-synthesised staging task: materialises its single
    /// argument in the space of the processor it runs on and binds the
    /// staged value to the task's handle. Used to move a task's output
    /// between spaces, since that output only exists once the producer
    /// has run.
    Stage,
}

impl TaskFn {
    pub fn user(
        name: impl Into<String>,
        body: impl Fn(&[Value]) -> std::result::Result<TaskPayload, String> + Send + Sync + 'static,
    ) -> TaskFn {
        TaskFn::User {
            name: name.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TaskFn::User { name, .. } => name,
            TaskFn::Copy => "copy",
            TaskFn::Stage => "stage",
        }
    }

    /// Whether this is a scheduler-synthesised data-movement task (a copy
    /// or a staging task) rather than user work.
    pub fn is_copy(&self) -> bool {
        matches!(self, TaskFn::Copy | TaskFn::Stage)
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFn::User { name, .. } => write!(f, "User({name})"),
            TaskFn::Copy => write!(f, "Copy"),
            TaskFn::Stage => write!(f, "Stage"),
        }
    }
}

/// Per-task options honoured by the executor.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Processors the task may run on.
    pub scope: Scope,
    /// Happens-before constraints: every listed task completes before this
    /// one starts.
    pub syncdeps: Vec<TaskHandle>,
}

/// A task as submitted by the user inside a region.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub func: TaskFn,
    pub args: Vec<Arg>,
    pub options: TaskOptions,
}

impl TaskSpec {
    pub fn new(func: TaskFn, args: Vec<Arg>) -> Self {
        Self {
            func,
            args,
            options: TaskOptions::default(),
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.options.scope = scope;
        self
    }
}

/// A positional argument as handed to the executor, after any planner
/// rewriting.
#[derive(Debug, Clone)]
pub enum RunArg {
    Value(Value),
    /// Resolved by the executor when the task runs.
    Task(TaskHandle),
}

/// A fully planned task on its way to the executor.
#[derive(Debug, Clone)]
pub struct Submission {
    pub handle: TaskHandle,
    pub func: TaskFn,
    pub args: Vec<(usize, RunArg)>,
    pub options: TaskOptions,
}

/// Result of executing a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(String),
}

/// Events sent from the executor back to the region driver.
#[derive(Debug, Clone)]
pub enum TaskEvent {
    Completed {
        handle: TaskHandle,
        outcome: TaskOutcome,
    },
}
