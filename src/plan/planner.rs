// src/plan/planner.rs

//! Static placement and copy planning, run once at region close.
//!
//! The pipeline: summarise write dependencies, enumerate CPU processors,
//! seed locality, pre-allocate per-space slots for written values, walk
//! the task DAG in the configured traversal order assigning processors
//! round-robin and synthesising copy-in and staging tasks, then emit
//! writeback copies for values that ended up away from their origin
//! space. The walk never blocks on task execution: the only synchronous
//! call is slot allocation for data that exists before the region runs.

use anyhow::anyhow;
use tracing::{debug, info};

use crate::access::ArgValue;
use crate::alias::{AliasKey, AliasOracle};
use crate::dag::recorder::{DependencyRecorder, RecordedArg, RecordedTask};
use crate::data::{Identity, IndexMap, ProcId, SpaceId, TaskHandle, TaskId, Value};
use crate::errors::{DepschedError, Result};
use crate::exec::{ExecutorBackend, RunArg, Submission, TaskFn, TaskOptions};
use crate::mover::DataMover;
use crate::options::RegionOptions;
use crate::plan::state::{PlacementState, WriteDeps};
use crate::topology::{cpu_processors, Processor, Scope, Topology};

pub(crate) struct Planner<'a> {
    recorder: &'a DependencyRecorder,
    oracle: AliasOracle<'a>,
    topology: &'a dyn Topology,
    mover: &'a dyn DataMover,
    writedeps: WriteDeps,
    state: PlacementState,
    procs: Vec<Processor>,
    spaces: Vec<SpaceId>,
    /// Per-space staged copies of task outputs. The producer's own space
    /// holds no entry; there the output is reached through the producer's
    /// handle itself.
    staged: IndexMap<(SpaceId, Identity), TaskHandle>,
    /// Handles of synthesised copy tasks, for the region's wait set.
    copies: Vec<TaskHandle>,
}

impl<'a> Planner<'a> {
    /// Plan and forward every recorded task. Returns the handles of the
    /// synthesised copy tasks.
    pub fn run(
        recorder: &'a DependencyRecorder,
        topology: &'a dyn Topology,
        mover: &'a dyn DataMover,
        opts: &RegionOptions,
        scope: &Scope,
        executor: &mut dyn ExecutorBackend,
    ) -> Result<Vec<TaskHandle>> {
        if recorder.tasks().is_empty() {
            return Ok(Vec::new());
        }

        let procs = cpu_processors(topology, scope);
        if procs.is_empty() {
            return Err(anyhow!("no CPU processors available within the region scope").into());
        }
        let mut spaces = Vec::new();
        for proc in &procs {
            for space in topology.memory_spaces(proc.id) {
                if !spaces.contains(&space) {
                    spaces.push(space);
                }
            }
        }

        let mut planner = Planner {
            recorder,
            oracle: AliasOracle::new(mover, opts.aliasing),
            topology,
            mover,
            writedeps: WriteDeps::build(recorder),
            state: PlacementState::new(),
            procs,
            spaces,
            staged: IndexMap::default(),
            copies: Vec::new(),
        };

        planner.seed_locality();
        planner.allocate_slots()?;

        let order = recorder.dag().traversal_order(opts.traversal);
        info!(
            tasks = order.len(),
            procs = planner.procs.len(),
            spaces = planner.spaces.len(),
            traversal = ?opts.traversal,
            "planning region"
        );

        let mut proc_idx = 0;
        for id in order {
            planner.walk_task(id, proc_idx, executor)?;
            proc_idx = (proc_idx + 1) % planner.procs.len();
        }

        planner.write_back(executor)?;
        Ok(planner.copies)
    }

    /// Initial locality: every tracked value starts where the user handed
    /// it in. Unstarted task handles have no backing space yet and enter
    /// lazily once their producer is placed.
    fn seed_locality(&mut self) {
        for (key, log) in self.recorder.log() {
            if let ArgValue::Data(value) = &log.value {
                let space = self.topology.memory_space(value);
                self.state.init_locality(*key, space);
            }
        }
    }

    /// Pre-allocate a slot in every enumerated space for each value that
    /// is written somewhere in the region. Allocation in a foreign space
    /// goes through the synchronous data-move primitive; in the origin
    /// space the slot is the value itself.
    fn allocate_slots(&mut self) -> Result<()> {
        let mut planned = Vec::new();
        for (key, log) in self.recorder.log() {
            let ArgValue::Data(value) = &log.value else {
                continue;
            };
            let keys = union_keys(log.accesses.iter().map(|a| a.keys.as_slice()));
            if self.writedeps.has_writedep(&self.oracle, &keys) {
                planned.push((*key, value.clone()));
            }
        }
        for (key, value) in planned {
            for space in self.spaces.clone() {
                self.ensure_slot(key, &value, space)?;
            }
        }
        Ok(())
    }

    fn ensure_slot(&mut self, key: Identity, value: &Value, space: SpaceId) -> Result<Value> {
        if let Some(slot) = self.state.slot(space, key) {
            return Ok(slot.clone());
        }
        let origin = self
            .state
            .locality(key)
            .ok_or_else(|| anyhow!("no locality recorded for {key:?}"))?
            .origin;
        let slot = if origin == space {
            value.clone()
        } else {
            let from = self.proc_of_space(origin)?;
            let to = self.proc_of_space(space)?;
            debug!(?key, ?origin, ?space, "allocating remote slot");
            self.mover.move_value(from, to, value)?
        };
        self.state.insert_slot(space, key, slot.clone());
        Ok(slot)
    }

    fn proc_of_space(&self, space: SpaceId) -> Result<ProcId> {
        self.topology
            .space_processors(space)
            .first()
            .copied()
            .ok_or_else(|| anyhow!("memory space {space:?} exposes no processors").into())
    }

    fn space_of_proc(&self, proc: ProcId) -> Result<SpaceId> {
        self.topology
            .memory_spaces(proc)
            .first()
            .copied()
            .ok_or_else(|| anyhow!("processor {proc:?} exposes no memory spaces").into())
    }

    fn walk_task(
        &mut self,
        id: TaskId,
        proc_idx: usize,
        executor: &mut dyn ExecutorBackend,
    ) -> Result<()> {
        let task = self.recorder.task(id);
        let our_proc = self.procs[proc_idx];
        let our_space = self.space_of_proc(our_proc.id)?;
        debug!(task = ?id, proc = ?our_proc.id, space = ?our_space, "placing task");

        let mut args = Vec::with_capacity(task.args.len());
        for arg in &task.args {
            let run = self.plan_arg(task, arg, our_proc.id, our_space, executor)?;
            args.push((arg.position, run));
        }

        // Every argument this task writes must now reside in our space.
        for (arg, (_, run)) in task.args.iter().zip(&args) {
            if !self.writedeps.is_writedep(self.recorder, arg.key, id)? {
                continue;
            }
            let RunArg::Value(value) = run else { continue };
            let actual = self.topology.memory_space(value);
            if actual != our_space {
                return Err(DepschedError::PlacementAssertion {
                    task: id,
                    position: arg.position,
                    expected: our_space,
                    actual,
                });
            }
        }

        let syncdeps = self.task_syncdeps(task);
        executor.enqueue(Submission {
            handle: task.handle.clone(),
            func: task.func.clone(),
            args,
            options: TaskOptions {
                scope: Scope::single(our_proc.id),
                syncdeps,
            },
        })?;

        // Ownership transitions for everything the task touched, plus its
        // own result.
        for arg in &task.args {
            for access in &arg.accesses {
                if access.tag.write {
                    self.state.add_writer(&task.handle, &access.keys);
                } else if access.tag.read {
                    self.state.add_reader(&task.handle, &access.keys);
                }
            }
        }
        let result_key = AliasKey::TaskResult(id);
        self.state.add_writer(&task.handle, &[result_key]);
        self.state
            .init_locality(Identity::of_task(&task.handle), our_space);

        Ok(())
    }

    /// Resolve, copy in if necessary, and rewrite one argument.
    fn plan_arg(
        &mut self,
        task: &RecordedTask,
        arg: &RecordedArg,
        our_proc: ProcId,
        our_space: SpaceId,
        executor: &mut dyn ExecutorBackend,
    ) -> Result<RunArg> {
        match &arg.value {
            ArgValue::Data(v) => self
                .plan_data_arg(task, arg, v, our_proc, our_space, executor)
                .map(RunArg::Value),
            ArgValue::Task(h) => {
                self.plan_task_arg(task, arg, h, our_proc, our_space, executor)
            }
            ArgValue::Sub(selector) => Err(DepschedError::InvalidAccess(format!(
                "selector {selector:?} used outside `Deps`"
            ))),
        }
    }

    fn plan_data_arg(
        &mut self,
        task: &RecordedTask,
        arg: &RecordedArg,
        value: &Value,
        our_proc: ProcId,
        our_space: SpaceId,
        executor: &mut dyn ExecutorBackend,
    ) -> Result<Value> {
        let keys = arg.all_keys();
        self.state.ensure_tracked(&keys);

        // Nothing has written this storage up to and including this task:
        // the argument is read in place, wherever it lives.
        if !self
            .writedeps
            .has_writedep_at(self.recorder, &self.oracle, arg.key, &keys, task.id)?
        {
            return Ok(value.clone());
        }

        let locality = self
            .state
            .locality(arg.key)
            .ok_or_else(|| anyhow!("no locality recorded for {:?}", arg.key))?;
        let dst = self.ensure_slot(arg.key, value, our_space)?;

        if locality.current != our_space {
            let src = self.ensure_slot(arg.key, value, locality.current)?;
            let copy = TaskHandle::new();
            let syncdeps = self.state.write_deps(&self.oracle, &keys);
            debug!(
                task = ?task.id,
                from = ?locality.current,
                to = ?our_space,
                deps = syncdeps.len(),
                "synthesising copy-in"
            );
            executor.enqueue(Submission {
                handle: copy.clone(),
                func: TaskFn::Copy,
                args: vec![(0, RunArg::Value(dst.clone())), (1, RunArg::Value(src))],
                options: TaskOptions {
                    scope: Scope::single(our_proc),
                    syncdeps,
                },
            })?;
            self.copies.push(copy.clone());
            self.state.set_owner(&copy, &keys);
            self.state.set_current(arg.key, our_space);
        }

        Ok(dst)
    }

    /// A task-handle argument stands for its producer's output. That
    /// output does not exist while the planner runs, so the argument is
    /// never resolved here: locality comes from the producer's recorded
    /// placement, and cross-space movement is a staging task that runs
    /// behind the producer in the dependency graph. The consuming task
    /// receives whichever handle reaches the output in our space.
    fn plan_task_arg(
        &mut self,
        task: &RecordedTask,
        arg: &RecordedArg,
        handle: &TaskHandle,
        our_proc: ProcId,
        our_space: SpaceId,
        executor: &mut dyn ExecutorBackend,
    ) -> Result<RunArg> {
        let keys = arg.all_keys();
        self.state.ensure_tracked(&keys);

        if !self
            .writedeps
            .has_writedep_at(self.recorder, &self.oracle, arg.key, &keys, task.id)?
        {
            return Ok(RunArg::Task(handle.clone()));
        }

        let locality = self
            .state
            .locality(arg.key)
            .ok_or_else(|| anyhow!("producer of {:?} has not been placed", arg.key))?;

        if locality.current != our_space {
            let src = self.output_handle(arg.key, locality.current, locality.origin, handle)?;
            let copy = TaskHandle::new();
            let syncdeps = self.state.write_deps(&self.oracle, &keys);
            debug!(
                task = ?task.id,
                from = ?locality.current,
                to = ?our_space,
                deps = syncdeps.len(),
                "staging task output"
            );
            if our_space == locality.origin {
                // back into the producer's own output
                executor.enqueue(Submission {
                    handle: copy.clone(),
                    func: TaskFn::Copy,
                    args: vec![(0, RunArg::Task(handle.clone())), (1, RunArg::Task(src))],
                    options: TaskOptions {
                        scope: Scope::single(our_proc),
                        syncdeps,
                    },
                })?;
            } else {
                executor.enqueue(Submission {
                    handle: copy.clone(),
                    func: TaskFn::Stage,
                    args: vec![(0, RunArg::Task(src))],
                    options: TaskOptions {
                        scope: Scope::single(our_proc),
                        syncdeps,
                    },
                })?;
                self.staged.insert((our_space, arg.key), copy.clone());
            }
            self.copies.push(copy.clone());
            self.state.set_owner(&copy, &keys);
            self.state.set_current(arg.key, our_space);
        }

        let rep = self.output_handle(arg.key, our_space, locality.origin, handle)?;
        Ok(RunArg::Task(rep))
    }

    /// Handle through which a task's output is reached in `space`: the
    /// producer itself in its origin space, the staged copy elsewhere.
    fn output_handle(
        &self,
        key: Identity,
        space: SpaceId,
        origin: SpaceId,
        producer: &TaskHandle,
    ) -> Result<TaskHandle> {
        if space == origin {
            return Ok(producer.clone());
        }
        self.staged
            .get(&(space, key))
            .cloned()
            .ok_or_else(|| anyhow!("no staged copy of {key:?} in {space:?}").into())
    }

    /// Happens-before set for a user task: owners and readers of written
    /// storage, owners of read storage, plus the task's recorded DAG
    /// predecessors so the set stays sound under every traversal order.
    fn task_syncdeps(&self, task: &RecordedTask) -> Vec<TaskHandle> {
        let mut deps = Vec::new();
        for arg in &task.args {
            for access in &arg.accesses {
                let found = if access.tag.write {
                    self.state.write_deps(&self.oracle, &access.keys)
                } else if access.tag.read {
                    self.state.read_deps(&self.oracle, &access.keys)
                } else {
                    Vec::new()
                };
                for dep in found {
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }
            }
        }
        for pred in self.recorder.predecessor_handles(task.id) {
            if !deps.contains(&pred) {
                deps.push(pred);
            }
        }
        deps.retain(|h| h != &task.handle);
        deps
    }

    /// Emit copy-out tasks for every written value whose freshest copy is
    /// not in its origin space. Data values copy between their slots; a
    /// task's output copies from its staged copy back into the producer's
    /// own output, both ends resolved by the executor once the tasks in
    /// `syncdeps` have run.
    fn write_back(&mut self, executor: &mut dyn ExecutorBackend) -> Result<()> {
        for (key, locality) in self.state.locality_entries() {
            if locality.current == locality.origin {
                continue;
            }
            let Some(log) = self.recorder.log().get(&key) else {
                continue;
            };
            let keys = union_keys(log.accesses.iter().map(|a| a.keys.as_slice()));
            if !self.writedeps.has_writedep(&self.oracle, &keys) {
                continue;
            }

            let (dst, src) = match &log.value {
                ArgValue::Data(_) => {
                    let dst = self
                        .state
                        .slot(locality.origin, key)
                        .cloned()
                        .ok_or_else(|| anyhow!("no origin slot for {key:?}"))?;
                    let src = self
                        .state
                        .slot(locality.current, key)
                        .cloned()
                        .ok_or_else(|| anyhow!("no current slot for {key:?}"))?;
                    (RunArg::Value(dst), RunArg::Value(src))
                }
                ArgValue::Task(handle) => {
                    let src =
                        self.output_handle(key, locality.current, locality.origin, handle)?;
                    (RunArg::Task(handle.clone()), RunArg::Task(src))
                }
                ArgValue::Sub(_) => continue,
            };

            let copy = TaskHandle::new();
            let syncdeps = self.state.write_deps(&self.oracle, &keys);
            debug!(
                ?key,
                from = ?locality.current,
                to = ?locality.origin,
                "synthesising writeback copy"
            );
            executor.enqueue(Submission {
                handle: copy.clone(),
                func: TaskFn::Copy,
                args: vec![(0, dst), (1, src)],
                options: TaskOptions {
                    scope: Scope::procs(self.topology.space_processors(locality.origin)),
                    syncdeps,
                },
            })?;
            self.copies.push(copy.clone());
            self.state.set_owner(&copy, &keys);
            self.state.set_current(key, locality.origin);
        }
        Ok(())
    }
}

fn union_keys<'k>(sets: impl Iterator<Item = &'k [AliasKey]>) -> Vec<AliasKey> {
    let mut keys = Vec::new();
    for set in sets {
        for key in set {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
    }
    keys
}
