// src/alias.rs

//! Alias oracle: maps accesses to aliasing keys and decides overlap.

use crate::access::Selector;
use crate::data::{Identity, MemorySpan, TaskId, Value};
use crate::mover::DataMover;

/// Unit of aliasing analysis.
///
/// - `Span`: a storage interval of a value whose layout is known.
/// - `Value`: whole-value identity; used when aliasing mode is off, or as
///   a fallback when a value's layout cannot be enumerated.
/// - `TaskResult`: the not-yet-materialised output of a task. Fresh
///   storage, so it aliases only itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasKey {
    Span(MemorySpan),
    Value(Identity),
    TaskResult(TaskId),
}

/// Answers span and overlap queries for the recorder and the planner.
pub struct AliasOracle<'a> {
    mover: &'a dyn DataMover,
    aliasing: bool,
}

impl<'a> AliasOracle<'a> {
    pub fn new(mover: &'a dyn DataMover, aliasing: bool) -> Self {
        AliasOracle { mover, aliasing }
    }

    pub fn aliasing(&self) -> bool {
        self.aliasing
    }

    /// Aliasing keys of one access on a concrete value.
    ///
    /// With aliasing mode off, the value's identity plays the role of a
    /// single span. With it on, the data-move service enumerates the spans;
    /// a value it cannot describe falls back to its identity.
    pub fn data_keys(&self, value: &Value, selector: Option<&Selector>) -> Vec<AliasKey> {
        if !self.aliasing {
            return vec![AliasKey::Value(Identity::of_value(value))];
        }
        let spans = self.mover.memory_spans(value, selector);
        if spans.is_empty() {
            return vec![AliasKey::Value(Identity::of_value(value))];
        }
        spans.into_iter().map(AliasKey::Span).collect()
    }

    /// Overlap between two keys. Symmetric; keys of distinct kinds never
    /// alias.
    pub fn may_alias(&self, a: &AliasKey, b: &AliasKey) -> bool {
        match (a, b) {
            (AliasKey::Span(x), AliasKey::Span(y)) => self.mover.may_alias(x, y),
            (AliasKey::Value(x), AliasKey::Value(y)) => x == y,
            (AliasKey::TaskResult(x), AliasKey::TaskResult(y)) => x == y,
            _ => false,
        }
    }

    /// Whether any key of `a` may alias any key of `b`.
    pub fn sets_alias(&self, a: &[AliasKey], b: &[AliasKey]) -> bool {
        a.iter().any(|x| b.iter().any(|y| self.may_alias(x, y)))
    }
}
