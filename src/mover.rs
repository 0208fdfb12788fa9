// src/mover.rs

//! Data-move contract: spans, aliasing and transfers between spaces.

use crate::access::Selector;
use crate::data::{MemorySpan, ProcId, Value};
use crate::errors::Result;

/// Consumed data-movement interface.
///
/// `memory_spans` enumerates the storage backing a value, optionally
/// restricted to a sub-region. `move_value` synchronously materialises a
/// value in another space and is only called during slot allocation.
/// `copy_to` transfers payload between two existing slots and is the body
/// of scheduler-synthesised copy tasks.
pub trait DataMover: Send + Sync {
    fn memory_spans(&self, value: &Value, selector: Option<&Selector>) -> Vec<MemorySpan>;

    /// Conservative, symmetric overlap test. False positives only lose
    /// parallelism; false negatives are forbidden.
    fn may_alias(&self, a: &MemorySpan, b: &MemorySpan) -> bool {
        a.overlaps(b)
    }

    /// Synchronous transfer: produce a copy of `value` reachable from the
    /// processor `to`.
    fn move_value(&self, from: ProcId, to: ProcId, value: &Value) -> Result<Value>;

    /// Copy the payload behind `src` into `dst`.
    fn copy_to(&self, dst: &Value, src: &Value) -> Result<()>;
}
