// src/data.rs

//! Values, identities and storage descriptors shared across the scheduler.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

use indexmap::{IndexMap as _IndexMap, IndexSet as _IndexSet};
use rustc_hash::FxBuildHasher;

/// `IndexMap` with a fast hasher. Insertion-order iteration keeps plans
/// deterministic from one run to the next.
pub(crate) type IndexMap<K, V> = _IndexMap<K, V, FxBuildHasher>;
pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;

/// Identifies a worker process known to the topology service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u32);

/// Identifies a processor on some worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcId(pub u32);

/// Identifies a memory space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub u32);

/// Submission-ordered task id; doubles as the vertex index in the task DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

/// A contiguous storage region within one memory space; the unit of
/// aliasing analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemorySpan {
    pub space: SpaceId,
    pub base: u64,
    pub len: u64,
}

impl MemorySpan {
    /// Interval overlap. Symmetric; spans in different memory spaces never
    /// overlap.
    pub fn overlaps(&self, other: &MemorySpan) -> bool {
        self.space == other.space
            && self.base < other.base.saturating_add(other.len)
            && other.base < self.base.saturating_add(self.len)
    }
}

/// Payload held by a [`Datum`]: any sendable value that can be duplicated
/// when the scheduler materialises a copy in another memory space.
pub trait Payload: Any + Send + Sync {
    fn clone_payload(&self) -> Box<dyn Payload>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + Clone> Payload for T {
    fn clone_payload(&self) -> Box<dyn Payload> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Boxed payload as produced by user task bodies.
pub type TaskPayload = Box<dyn Payload>;

/// A datum tracked by the scheduler: an opaque payload behind a shared
/// handle. The scheduler compares data by handle identity, never by
/// content.
pub struct Datum {
    label: String,
    payload: Mutex<TaskPayload>,
}

/// Shared handle to a [`Datum`].
pub type Value = Arc<Datum>;

impl Datum {
    pub fn new<T: Any + Send + Sync + Clone>(label: impl Into<String>, payload: T) -> Value {
        Self::from_payload(label, Box::new(payload))
    }

    pub fn from_payload(label: impl Into<String>, payload: TaskPayload) -> Value {
        Arc::new(Datum {
            label: label.into(),
            payload: Mutex::new(payload),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Read the payload, cloning it out. `None` on a type mismatch.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.payload.lock().unwrap().as_any().downcast_ref::<T>().cloned()
    }

    /// Replace the payload.
    pub fn set<T: Any + Send + Sync + Clone>(&self, payload: T) {
        *self.payload.lock().unwrap() = Box::new(payload);
    }

    /// Duplicate the payload, e.g. to materialise the value in another
    /// memory space.
    pub fn clone_payload(&self) -> TaskPayload {
        self.payload.lock().unwrap().clone_payload()
    }

    /// Overwrite the payload with one cloned from elsewhere.
    pub fn replace_payload(&self, payload: TaskPayload) {
        *self.payload.lock().unwrap() = payload;
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datum")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Pointer identity of a tracked value or task handle.
///
/// Two structurally equal values passed separately must be tracked
/// separately, so scheduler maps key on the allocation address. The access
/// log holds the referent alive, which keeps addresses unique for the
/// region's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(usize);

impl Identity {
    pub fn of_value(value: &Value) -> Self {
        Identity(Arc::as_ptr(value) as usize)
    }

    pub fn of_task(task: &TaskHandle) -> Self {
        Identity(task.addr())
    }
}

/// Opaque, equality-comparable identity for a submitted computation.
///
/// A handle starts *unstarted*; once the executor has produced the task's
/// output it binds the value and the handle is *started*. Handles are
/// themselves values and may appear as arguments to later tasks.
#[derive(Clone)]
pub struct TaskHandle {
    cell: Arc<TaskCell>,
}

#[derive(Debug)]
struct TaskCell {
    result: OnceLock<Value>,
}

impl TaskHandle {
    pub fn new() -> Self {
        TaskHandle {
            cell: Arc::new(TaskCell {
                result: OnceLock::new(),
            }),
        }
    }

    /// The produced value, if the task has started.
    pub fn result(&self) -> Option<&Value> {
        self.cell.result.get()
    }

    pub fn is_started(&self) -> bool {
        self.cell.result.get().is_some()
    }

    /// Bind the produced value. Called by executor implementations; a
    /// second binding is ignored.
    pub fn bind_result(&self, value: Value) {
        let _ = self.cell.result.set(value);
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.cell) as usize
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for TaskHandle {}

impl Hash for TaskHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({:#x})", self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_overlap_only_within_one_space() {
        let a = MemorySpan { space: SpaceId(0), base: 0, len: 16 };
        let b = MemorySpan { space: SpaceId(0), base: 8, len: 16 };
        let c = MemorySpan { space: SpaceId(0), base: 16, len: 8 };
        let d = MemorySpan { space: SpaceId(1), base: 0, len: 16 };

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!a.overlaps(&d));
    }

    #[test]
    fn identity_distinguishes_equal_payloads() {
        let x = Datum::new("x", 1i64);
        let y = Datum::new("y", 1i64);
        assert_ne!(Identity::of_value(&x), Identity::of_value(&y));
        assert_eq!(Identity::of_value(&x), Identity::of_value(&x.clone()));
    }

    #[test]
    fn handle_starts_once() {
        let h = TaskHandle::new();
        assert!(!h.is_started());
        h.bind_result(Datum::new("r", 1i64));
        h.bind_result(Datum::new("ignored", 2i64));
        assert_eq!(h.result().unwrap().get::<i64>(), Some(1));
    }
}
