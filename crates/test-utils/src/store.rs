use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use depsched::access::Selector;
use depsched::errors::Result;
use depsched::{
    DataMover, Datum, MemorySpan, ProcId, Processor, ProcessorKind, SpaceId, TaskPayload,
    Topology, Value, WorkerId,
};

/// Pointer identity of a value; the store keeps a clone of every
/// registered value so addresses stay unique.
fn ident(value: &Value) -> usize {
    Arc::as_ptr(value) as usize
}

struct ValueInfo {
    // keeps the identity alive
    _value: Value,
    space: SpaceId,
    spans: Vec<MemorySpan>,
    sub_spans: HashMap<Selector, Vec<MemorySpan>>,
}

#[derive(Default)]
struct StoreInner {
    values: HashMap<usize, ValueInfo>,
    next_base: u64,
    moves: usize,
    copies: usize,
}

/// In-memory topology and data store used by the tests.
///
/// The layout is scripted up front: workers with CPU (and optionally
/// non-CPU) processors, one memory space per worker. Values are registered
/// into a space and get a fresh, non-overlapping span; aliasing between
/// values or sub-regions is opted into explicitly via [`Self::alloc_view`]
/// and [`Self::set_sub_span`].
pub struct InMemoryStore {
    workers: Vec<WorkerId>,
    procs: Vec<Processor>,
    proc_spaces: HashMap<ProcId, Vec<SpaceId>>,
    space_procs: HashMap<SpaceId, Vec<ProcId>>,
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    /// `n` workers, each with one CPU processor and one memory space.
    pub fn with_spaces(n: u32) -> Arc<Self> {
        Self::build(n, 1, false)
    }

    /// `spaces` workers, each with `procs_per_space` CPU processors
    /// sharing that worker's memory space.
    pub fn with_procs(spaces: u32, procs_per_space: u32) -> Arc<Self> {
        Self::build(spaces, procs_per_space, false)
    }

    /// Like [`Self::with_spaces`] plus one GPU processor on the first
    /// worker, for exercising the non-CPU filter.
    pub fn with_gpu(n: u32) -> Arc<Self> {
        Self::build(n, 1, true)
    }

    fn build(spaces: u32, procs_per_space: u32, gpu: bool) -> Arc<Self> {
        let mut workers = Vec::new();
        let mut procs = Vec::new();
        let mut proc_spaces = HashMap::new();
        let mut space_procs: HashMap<SpaceId, Vec<ProcId>> = HashMap::new();

        let mut next_proc = 0u32;
        for w in 0..spaces {
            let worker = WorkerId(w);
            let space = SpaceId(w);
            workers.push(worker);
            for _ in 0..procs_per_space {
                let proc = Processor {
                    id: ProcId(next_proc),
                    worker,
                    kind: ProcessorKind::Cpu,
                };
                next_proc += 1;
                procs.push(proc);
                proc_spaces.insert(proc.id, vec![space]);
                space_procs.entry(space).or_default().push(proc.id);
            }
        }
        if gpu {
            let proc = Processor {
                id: ProcId(next_proc),
                worker: WorkerId(0),
                kind: ProcessorKind::Gpu,
            };
            procs.push(proc);
            proc_spaces.insert(proc.id, vec![SpaceId(0)]);
            space_procs.entry(SpaceId(0)).or_default().push(proc.id);
        }

        Arc::new(InMemoryStore {
            workers,
            procs,
            proc_spaces,
            space_procs,
            inner: Mutex::new(StoreInner::default()),
        })
    }

    /// Register a value in a space with a fresh, non-overlapping span.
    pub fn register(&self, value: &Value, space: SpaceId) {
        let mut inner = self.inner.lock().unwrap();
        let base = inner.next_base;
        inner.next_base += 1024;
        inner.values.insert(
            ident(value),
            ValueInfo {
                _value: value.clone(),
                space,
                spans: vec![MemorySpan {
                    space,
                    base,
                    len: 1024,
                }],
                sub_spans: HashMap::new(),
            },
        );
    }

    /// Allocate and register a fresh value.
    pub fn alloc<T: Clone + Send + Sync + 'static>(
        &self,
        label: &str,
        payload: T,
        space: SpaceId,
    ) -> Value {
        let value = Datum::new(label, payload);
        self.register(&value, space);
        value
    }

    pub(crate) fn alloc_payload(&self, label: &str, payload: TaskPayload, space: SpaceId) -> Value {
        let value = Datum::from_payload(label, payload);
        self.register(&value, space);
        value
    }

    /// Allocate a value whose storage is a window into `of`'s span, so the
    /// two alias.
    pub fn alloc_view<T: Clone + Send + Sync + 'static>(
        &self,
        label: &str,
        payload: T,
        of: &Value,
        offset: u64,
        len: u64,
    ) -> Value {
        let value = Datum::new(label, payload);
        let mut inner = self.inner.lock().unwrap();
        let parent = inner
            .values
            .get(&ident(of))
            .expect("view parent not registered");
        let base_span = parent.spans[0];
        let space = parent.space;
        inner.values.insert(
            ident(&value),
            ValueInfo {
                _value: value.clone(),
                space,
                spans: vec![MemorySpan {
                    space,
                    base: base_span.base + offset,
                    len,
                }],
                sub_spans: HashMap::new(),
            },
        );
        value
    }

    /// Describe a named sub-region of a value as a window into its span.
    pub fn set_sub_span(&self, value: &Value, selector: Selector, offset: u64, len: u64) {
        let mut inner = self.inner.lock().unwrap();
        let info = inner
            .values
            .get_mut(&ident(value))
            .expect("value not registered");
        let base_span = info.spans[0];
        info.sub_spans.insert(
            selector,
            vec![MemorySpan {
                space: base_span.space,
                base: base_span.base + offset,
                len,
            }],
        );
    }

    pub fn space_of(&self, value: &Value) -> SpaceId {
        self.inner
            .lock()
            .unwrap()
            .values
            .get(&ident(value))
            .expect("value not registered")
            .space
    }

    /// Number of synchronous slot-allocation transfers performed.
    pub fn move_count(&self) -> usize {
        self.inner.lock().unwrap().moves
    }

    /// Number of `copy_to` payload transfers performed.
    pub fn copy_count(&self) -> usize {
        self.inner.lock().unwrap().copies
    }
}

impl Topology for InMemoryStore {
    fn workers(&self) -> Vec<WorkerId> {
        self.workers.clone()
    }

    fn processors(&self, worker: WorkerId) -> Vec<Processor> {
        self.procs
            .iter()
            .filter(|p| p.worker == worker)
            .copied()
            .collect()
    }

    fn memory_spaces(&self, proc: ProcId) -> Vec<SpaceId> {
        self.proc_spaces.get(&proc).cloned().unwrap_or_default()
    }

    fn space_processors(&self, space: SpaceId) -> Vec<ProcId> {
        self.space_procs.get(&space).cloned().unwrap_or_default()
    }

    fn memory_space(&self, value: &Value) -> SpaceId {
        self.space_of(value)
    }
}

impl DataMover for InMemoryStore {
    fn memory_spans(&self, value: &Value, selector: Option<&Selector>) -> Vec<MemorySpan> {
        let inner = self.inner.lock().unwrap();
        let Some(info) = inner.values.get(&ident(value)) else {
            return Vec::new();
        };
        match selector {
            Some(sel) => info
                .sub_spans
                .get(sel)
                .cloned()
                .unwrap_or_else(|| info.spans.clone()),
            None => info.spans.clone(),
        }
    }

    fn move_value(&self, _from: ProcId, to: ProcId, value: &Value) -> Result<Value> {
        let space = *self
            .proc_spaces
            .get(&to)
            .and_then(|s| s.first())
            .ok_or_else(|| anyhow!("unknown destination processor {to:?}"))?;
        let copy = Datum::from_payload(
            format!("{}@s{}", value.label(), space.0),
            value.clone_payload(),
        );
        self.register(&copy, space);
        self.inner.lock().unwrap().moves += 1;
        Ok(copy)
    }

    fn copy_to(&self, dst: &Value, src: &Value) -> Result<()> {
        dst.replace_payload(src.clone_payload());
        self.inner.lock().unwrap().copies += 1;
        Ok(())
    }
}
