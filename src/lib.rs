// src/lib.rs

//! Data-dependency task scheduler.
//!
//! Tasks are submitted inside a *region* with read/write access
//! annotations on their arguments. The scheduler preserves the sequential
//! semantics of the submission order: it detects aliasing between memory
//! spans, builds a dependency DAG, places tasks round-robin over CPU
//! processors, synthesises copy tasks when data lives in another memory
//! space, and writes modified data back to its origin space when the
//! region closes.
//!
//! The execution machinery itself is consumed through narrow interfaces:
//! - [`topology::Topology`] describes workers, processors and memory
//!   spaces;
//! - [`mover::DataMover`] enumerates memory spans, decides aliasing and
//!   transfers values between spaces;
//! - [`exec::ExecutorBackend`] runs submitted tasks, honouring each task's
//!   `syncdeps` set and processor scope, and reports completions back over
//!   an event channel.
//!
//! Quick start:
//! 1. Wire a [`region::RegionContext`] from your topology, data mover and
//!    executor backend.
//! 2. Call [`region::with_region`] with [`options::RegionOptions`] and a
//!    body that submits [`exec::TaskSpec`]s through the provided
//!    [`region::Region`].
//! 3. Annotate arguments with [`access::Arg::In`], [`access::Arg::Out`],
//!    [`access::Arg::InOut`], or compound [`access::Arg::Deps`] accesses
//!    over sub-regions.

pub mod access;
pub mod alias;
pub mod dag;
pub mod data;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod mover;
pub mod options;
mod plan;
pub mod region;
pub mod topology;

pub use access::{AccessTag, Arg, ArgValue, Selector};
pub use data::{
    Datum, Identity, MemorySpan, Payload, ProcId, SpaceId, TaskHandle, TaskId, TaskPayload, Value,
    WorkerId,
};
pub use errors::{DepschedError, Result};
pub use exec::{
    ChannelExecutor, ExecutorBackend, RunArg, Submission, TaskEvent, TaskFn, TaskOptions,
    TaskOutcome, TaskSpec,
};
pub use mover::DataMover;
pub use options::{RegionOptions, Traversal};
pub use region::{with_region, Region, RegionContext};
pub use topology::{cpu_processors, Processor, ProcessorKind, Scope, Topology};
