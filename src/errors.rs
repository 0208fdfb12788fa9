// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::data::{SpaceId, TaskId};

#[derive(Error, Debug)]
pub enum DepschedError {
    /// A `Deps` compound access contained an element that is not one of the
    /// tag constructors applied to a selector.
    #[error("invalid access annotation: {0}")]
    InvalidAccess(String),

    /// A dynamic-mode task's scope has no processors in common with the
    /// local worker.
    #[error("task scope cannot be constrained to the local worker")]
    IncompatibleScope,

    #[error("invalid traversal: {0:?} (expected \"inorder\", \"bfs\" or \"dfs\")")]
    InvalidTraversal(String),

    /// Internal invariant violation: a task queried against the access log
    /// was never recorded under the given value.
    #[error("task {task:?} is not in the access log for {key}")]
    MissingTaskInLog { task: TaskId, key: String },

    /// Internal invariant violation: after argument rewriting, a written
    /// argument does not reside in the space its task was placed on.
    #[error(
        "argument {position} of task {task:?} resides in {actual:?}, expected {expected:?}"
    )]
    PlacementAssertion {
        task: TaskId,
        position: usize,
        expected: SpaceId,
        actual: SpaceId,
    },

    /// A task forwarded to the executor failed. The region surfaces the
    /// first such failure after waiting for the rest.
    #[error("task failed: {0}")]
    UserTaskFailure(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DepschedError>;
