// src/plan/state.rs

//! Mutable planning state: write-dependency summary, locality, ownership
//! and per-space slots.

use tracing::trace;

use crate::alias::{AliasKey, AliasOracle};
use crate::dag::recorder::DependencyRecorder;
use crate::data::{Identity, IndexMap, SpaceId, TaskHandle, TaskId, Value};
use crate::errors::{DepschedError, Result};

/// Every write access recorded in the region, in submission order.
///
/// Answers the three write-dependency queries the planner needs:
/// - any writer anywhere in the region,
/// - any writer at or before a given task (that task's own write counts),
/// - whether a given task itself writes a value.
pub(crate) struct WriteDeps {
    writes: Vec<(TaskId, Vec<AliasKey>)>,
}

impl WriteDeps {
    pub fn build(recorder: &DependencyRecorder) -> Self {
        let mut writes = Vec::new();
        for log in recorder.log().values() {
            for access in &log.accesses {
                if access.tag.write {
                    writes.push((access.task, access.keys.clone()));
                }
            }
        }
        writes.sort_by_key(|(task, _)| *task);
        WriteDeps { writes }
    }

    /// Any writer anywhere in the region touching storage aliasing `keys`.
    pub fn has_writedep(&self, oracle: &AliasOracle<'_>, keys: &[AliasKey]) -> bool {
        self.writes
            .iter()
            .any(|(_, wkeys)| oracle.sets_alias(keys, wkeys))
    }

    /// Any writer at or before `task` in submission order touching storage
    /// aliasing `keys`. `task` must itself appear in the access log under
    /// `key`; anything else is a fatal internal error.
    pub fn has_writedep_at(
        &self,
        recorder: &DependencyRecorder,
        oracle: &AliasOracle<'_>,
        key: Identity,
        keys: &[AliasKey],
        task: TaskId,
    ) -> Result<bool> {
        Self::check_in_log(recorder, key, task)?;
        Ok(self
            .writes
            .iter()
            .take_while(|(writer, _)| *writer <= task)
            .any(|(_, wkeys)| oracle.sets_alias(keys, wkeys)))
    }

    /// Whether `task` itself writes the value logged under `key`.
    pub fn is_writedep(
        &self,
        recorder: &DependencyRecorder,
        key: Identity,
        task: TaskId,
    ) -> Result<bool> {
        Self::check_in_log(recorder, key, task)?;
        let log = &recorder.log()[&key];
        Ok(log
            .accesses
            .iter()
            .any(|a| a.task == task && a.tag.write))
    }

    fn check_in_log(recorder: &DependencyRecorder, key: Identity, task: TaskId) -> Result<()> {
        let present = recorder
            .log()
            .get(&key)
            .map(|log| log.accesses.iter().any(|a| a.task == task))
            .unwrap_or(false);
        if present {
            Ok(())
        } else {
            Err(DepschedError::MissingTaskInLog {
                task,
                key: format!("{key:?}"),
            })
        }
    }
}

/// Owner and readers of one aliasing key.
#[derive(Debug)]
struct OwnerEntry {
    key: AliasKey,
    owner: Option<TaskHandle>,
    readers: Vec<TaskHandle>,
}

/// Origin and current space of one tracked value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Locality {
    pub origin: SpaceId,
    pub current: SpaceId,
}

/// Ownership, locality and slot tracking for the placement walk.
///
/// Ownership is an arena of per-key entries scanned through the alias
/// oracle; exact keys index into it so updates stay cheap.
#[derive(Default)]
pub(crate) struct PlacementState {
    entries: Vec<OwnerEntry>,
    index: IndexMap<AliasKey, usize>,
    locality: IndexMap<Identity, Locality>,
    slots: IndexMap<(SpaceId, Identity), Value>,
}

impl PlacementState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create ownership entries for every exact key not yet tracked.
    pub fn ensure_tracked(&mut self, keys: &[AliasKey]) {
        for key in keys {
            if !self.index.contains_key(key) {
                self.index.insert(*key, self.entries.len());
                self.entries.push(OwnerEntry {
                    key: *key,
                    owner: None,
                    readers: Vec::new(),
                });
            }
        }
    }

    /// Owner and readers of every tracked key aliasing any of `keys`, in
    /// first-registered order, deduplicated.
    pub fn write_deps(&self, oracle: &AliasOracle<'_>, keys: &[AliasKey]) -> Vec<TaskHandle> {
        let mut deps = Vec::new();
        for idx in self.aliasing_indices(oracle, keys) {
            let entry = &self.entries[idx];
            if let Some(owner) = &entry.owner {
                push_unique(&mut deps, owner);
            }
            for reader in &entry.readers {
                push_unique(&mut deps, reader);
            }
        }
        deps
    }

    /// Owners only, for read accesses.
    pub fn read_deps(&self, oracle: &AliasOracle<'_>, keys: &[AliasKey]) -> Vec<TaskHandle> {
        let mut deps = Vec::new();
        for idx in self.aliasing_indices(oracle, keys) {
            if let Some(owner) = &self.entries[idx].owner {
                push_unique(&mut deps, owner);
            }
        }
        deps
    }

    /// A user task wrote these keys: it becomes the owner and, being the
    /// freshest copy, also counts as a reader for later read-after-write
    /// queries.
    pub fn add_writer(&mut self, task: &TaskHandle, keys: &[AliasKey]) {
        self.ensure_tracked(keys);
        for key in keys {
            let idx = self.index[key];
            let entry = &mut self.entries[idx];
            trace!(?key, owner = ?task, "ownership transfer");
            entry.owner = Some(task.clone());
            entry.readers.clear();
            entry.readers.push(task.clone());
        }
    }

    /// A synthesised copy wrote these keys: it owns them and the reader
    /// set starts empty.
    pub fn set_owner(&mut self, task: &TaskHandle, keys: &[AliasKey]) {
        self.ensure_tracked(keys);
        for key in keys {
            let idx = self.index[key];
            let entry = &mut self.entries[idx];
            entry.owner = Some(task.clone());
            entry.readers.clear();
        }
    }

    pub fn add_reader(&mut self, task: &TaskHandle, keys: &[AliasKey]) {
        self.ensure_tracked(keys);
        for key in keys {
            let idx = self.index[key];
            let entry = &mut self.entries[idx];
            if !entry.readers.contains(task) {
                entry.readers.push(task.clone());
            }
        }
    }

    fn aliasing_indices(&self, oracle: &AliasOracle<'_>, keys: &[AliasKey]) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| keys.iter().any(|k| oracle.may_alias(k, &entry.key)))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Record origin = current = `space`. Origin is immutable after the
    /// first insertion.
    pub fn init_locality(&mut self, key: Identity, space: SpaceId) {
        self.locality.entry(key).or_insert(Locality {
            origin: space,
            current: space,
        });
    }

    pub fn locality(&self, key: Identity) -> Option<Locality> {
        self.locality.get(&key).copied()
    }

    pub fn set_current(&mut self, key: Identity, space: SpaceId) {
        if let Some(entry) = self.locality.get_mut(&key) {
            entry.current = space;
        }
    }

    /// Tracked values in first-seen order.
    pub fn locality_entries(&self) -> Vec<(Identity, Locality)> {
        self.locality.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn slot(&self, space: SpaceId, key: Identity) -> Option<&Value> {
        self.slots.get(&(space, key))
    }

    pub fn insert_slot(&mut self, space: SpaceId, key: Identity, value: Value) {
        self.slots.insert((space, key), value);
    }
}

fn push_unique(deps: &mut Vec<TaskHandle>, task: &TaskHandle) {
    if !deps.contains(task) {
        deps.push(task.clone());
    }
}
