// src/region.rs

//! Region driver: scoped submission, planning at close, completion wait.
//!
//! A region collects task submissions whose arguments carry access
//! annotations. In static mode (the default) tasks are buffered and the
//! planner runs when the body returns; in dynamic mode each task is
//! forwarded to the executor as it is submitted, with its dependency set
//! attached. Either way the region waits for every outstanding task before
//! returning, rethrowing the first failure.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::access::ArgValue;
use crate::alias::AliasOracle;
use crate::dag::recorder::DependencyRecorder;
use crate::data::{IndexSet, TaskHandle, WorkerId};
use crate::errors::{DepschedError, Result};
use crate::exec::{
    ExecutorBackend, RunArg, Submission, TaskEvent, TaskOptions, TaskOutcome, TaskSpec,
};
use crate::mover::DataMover;
use crate::options::RegionOptions;
use crate::plan::planner::Planner;
use crate::topology::{Scope, Topology};

/// Long-lived wiring shared by successive regions: the consumed contracts
/// plus the channel on which the executor reports completions.
pub struct RegionContext {
    pub topology: Arc<dyn Topology>,
    pub mover: Arc<dyn DataMover>,
    pub executor: Box<dyn ExecutorBackend>,
    pub events: mpsc::UnboundedReceiver<TaskEvent>,
    /// Worker this driver runs on; dynamic-mode tasks are constrained to
    /// its processors.
    pub local_worker: WorkerId,
    /// Ambient scope filtering the processors the planner may use.
    pub scope: Scope,
}

/// Active submission sink handed to the region body.
pub struct Region<'a> {
    ctx: &'a mut RegionContext,
    opts: RegionOptions,
    recorder: DependencyRecorder,
    submitted: Vec<TaskHandle>,
}

impl Region<'_> {
    /// Submit a task. In static mode the task is buffered until the region
    /// closes; in dynamic mode it is forwarded immediately with its
    /// dependency set attached.
    pub fn submit(&mut self, spec: TaskSpec) -> Result<TaskHandle> {
        let handle = TaskHandle::new();
        let oracle = AliasOracle::new(self.ctx.mover.as_ref(), self.opts.aliasing);
        let id = self.recorder.record(spec, handle.clone(), &oracle)?;

        if !self.opts.static_plan {
            let task = self.recorder.task(id);
            let local = Scope::worker(self.ctx.topology.as_ref(), self.ctx.local_worker);
            let scope = task.options.scope.constrain(&local);
            if scope.is_invalid() {
                return Err(DepschedError::IncompatibleScope);
            }
            let syncdeps = self.recorder.predecessor_handles(id);
            let args = task
                .args
                .iter()
                .map(|arg| {
                    let run = match &arg.value {
                        ArgValue::Data(v) => RunArg::Value(v.clone()),
                        ArgValue::Task(h) => RunArg::Task(h.clone()),
                        ArgValue::Sub(_) => unreachable!("recorder rejects bare selectors"),
                    };
                    (arg.position, run)
                })
                .collect();
            debug!(task = ?id, deps = syncdeps.len(), "dispatching eagerly");
            self.ctx.executor.enqueue(Submission {
                handle: handle.clone(),
                func: task.func.clone(),
                args,
                options: TaskOptions { scope, syncdeps },
            })?;
        }

        self.submitted.push(handle.clone());
        Ok(handle)
    }

    /// Number of tasks submitted so far.
    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }
}

/// Open a region, run `body` with a submission sink, plan and dispatch,
/// then wait for every outstanding task.
///
/// Submission-time and configuration errors abort the region immediately.
/// Execution failures are collected while waiting; the first is rethrown
/// once all outstanding tasks have completed.
pub async fn with_region<R>(
    ctx: &mut RegionContext,
    opts: RegionOptions,
    body: impl FnOnce(&mut Region<'_>) -> Result<R>,
) -> Result<R> {
    info!(
        static_plan = opts.static_plan,
        traversal = ?opts.traversal,
        aliasing = opts.aliasing,
        "opening region"
    );

    let mut region = Region {
        ctx,
        opts: opts.clone(),
        recorder: DependencyRecorder::new(),
        submitted: Vec::new(),
    };
    let result = body(&mut region)?;

    let Region {
        ctx,
        recorder,
        mut submitted,
        ..
    } = region;

    if opts.static_plan {
        let copies = Planner::run(
            &recorder,
            ctx.topology.as_ref(),
            ctx.mover.as_ref(),
            &opts,
            &ctx.scope,
            ctx.executor.as_mut(),
        )?;
        submitted.extend(copies);
    }

    wait_for_completion(ctx, submitted).await?;
    info!("region closed");
    Ok(result)
}

async fn wait_for_completion(ctx: &mut RegionContext, submitted: Vec<TaskHandle>) -> Result<()> {
    let mut outstanding: IndexSet<TaskHandle> = submitted.into_iter().collect();
    let mut first_failure: Option<String> = None;

    while !outstanding.is_empty() {
        let Some(event) = ctx.events.recv().await else {
            return Err(anyhow!(
                "executor event channel closed with {} tasks outstanding",
                outstanding.len()
            )
            .into());
        };
        match event {
            TaskEvent::Completed { handle, outcome } => {
                if !outstanding.shift_remove(&handle) {
                    warn!(?handle, "completion for a task not awaited by this region; ignoring");
                    continue;
                }
                match outcome {
                    TaskOutcome::Success => debug!(?handle, "task completed"),
                    TaskOutcome::Failed(message) => {
                        warn!(?handle, error = %message, "task failed");
                        if first_failure.is_none() {
                            first_failure = Some(message);
                        }
                    }
                }
            }
        }
    }

    match first_failure {
        Some(message) => Err(DepschedError::UserTaskFailure(message)),
        None => Ok(()),
    }
}
