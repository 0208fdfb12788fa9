// src/topology.rs

//! Topology contract: workers, processors, memory spaces and scopes.

use std::collections::BTreeSet;
use std::sync::Once;

use tracing::warn;

use crate::data::{ProcId, SpaceId, Value, WorkerId};

/// Processor kind. The planner only places work on CPU-class processors;
/// others are filtered out with a one-shot warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessorKind {
    Cpu,
    Gpu,
    Accelerator,
}

/// A processor as enumerated by the topology service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Processor {
    pub id: ProcId,
    pub worker: WorkerId,
    pub kind: ProcessorKind,
}

/// Consumed topology/discovery interface.
pub trait Topology: Send + Sync {
    /// Enumerate worker ids, in a stable order.
    fn workers(&self) -> Vec<WorkerId>;

    /// Enumerate the processors of one worker, in a stable order.
    fn processors(&self, worker: WorkerId) -> Vec<Processor>;

    /// Memory spaces a processor can access directly; never empty.
    fn memory_spaces(&self, proc: ProcId) -> Vec<SpaceId>;

    /// Processors attached to a memory space; never empty.
    fn space_processors(&self, space: SpaceId) -> Vec<ProcId>;

    /// The space currently backing a value.
    fn memory_space(&self, value: &Value) -> SpaceId;
}

/// Restriction of a task to a set of processors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// No restriction.
    All,
    /// Only the listed processors.
    Procs(BTreeSet<ProcId>),
    /// Result of an unsatisfiable intersection.
    Invalid,
}

impl Scope {
    pub fn single(proc: ProcId) -> Scope {
        Scope::Procs(BTreeSet::from([proc]))
    }

    pub fn procs(procs: impl IntoIterator<Item = ProcId>) -> Scope {
        Scope::Procs(procs.into_iter().collect())
    }

    /// All processors of one worker.
    pub fn worker(topology: &dyn Topology, worker: WorkerId) -> Scope {
        Scope::Procs(
            topology
                .processors(worker)
                .into_iter()
                .map(|p| p.id)
                .collect(),
        )
    }

    /// Intersection of two scopes; `Invalid` if the result would be empty.
    pub fn constrain(&self, other: &Scope) -> Scope {
        match (self, other) {
            (Scope::Invalid, _) | (_, Scope::Invalid) => Scope::Invalid,
            (Scope::All, s) | (s, Scope::All) => s.clone(),
            (Scope::Procs(a), Scope::Procs(b)) => {
                let both: BTreeSet<ProcId> = a.intersection(b).copied().collect();
                if both.is_empty() {
                    Scope::Invalid
                } else {
                    Scope::Procs(both)
                }
            }
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Scope::Invalid)
    }

    pub fn allows(&self, proc: ProcId) -> bool {
        match self {
            Scope::All => true,
            Scope::Procs(set) => set.contains(&proc),
            Scope::Invalid => false,
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::All
    }
}

static NON_CPU_WARNING: Once = Once::new();

/// Enumerate every CPU processor visible through `topology` within `scope`.
///
/// Non-CPU processors are dropped; the first drop in the process logs a
/// warning, later ones are silent.
pub fn cpu_processors(topology: &dyn Topology, scope: &Scope) -> Vec<Processor> {
    let mut procs = Vec::new();
    for worker in topology.workers() {
        for proc in topology.processors(worker) {
            if !scope.allows(proc.id) {
                continue;
            }
            if proc.kind != ProcessorKind::Cpu {
                NON_CPU_WARNING.call_once(|| {
                    warn!(
                        proc = ?proc.id,
                        kind = ?proc.kind,
                        "dropping non-CPU processor; only CPU placement is supported"
                    );
                });
                continue;
            }
            procs.push(proc);
        }
    }
    procs
}
