use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::mpsc;

use depsched::errors::Result;
use depsched::{
    DataMover, ExecutorBackend, ProcId, RunArg, Scope, SpaceId, Submission, TaskEvent, TaskFn,
    TaskHandle, TaskOutcome, Topology, Value,
};

use crate::store::InMemoryStore;

/// Record of one submission as observed by the executor.
#[derive(Debug, Clone)]
pub struct ExecutedTask {
    pub handle: TaskHandle,
    pub name: String,
    pub is_copy: bool,
    pub scope: Scope,
    pub syncdeps: Vec<TaskHandle>,
    pub args: Vec<(usize, RunArg)>,
    pub outcome: TaskOutcome,
}

/// Shared log of everything the fake executor ran, in arrival order.
pub type ExecLog = Arc<Mutex<Vec<ExecutedTask>>>;

/// A fake executor backend that:
/// - records every submission (scope, syncdeps, rewritten arguments),
/// - executes eagerly in arrival order, materialising task results in the
///   space of the task's scope,
/// - immediately emits `TaskEvent::Completed` for each submission.
///
/// The planner forwards tasks in a topological order with each synthesised
/// copy ahead of its consumer, so arrival order respects `syncdeps` and
/// eager execution is faithful enough for observing plans and payloads.
pub struct FakeExecutor {
    store: Arc<InMemoryStore>,
    events_tx: mpsc::UnboundedSender<TaskEvent>,
    log: ExecLog,
}

impl FakeExecutor {
    pub fn new(
        store: Arc<InMemoryStore>,
        events_tx: mpsc::UnboundedSender<TaskEvent>,
        log: ExecLog,
    ) -> Self {
        Self {
            store,
            events_tx,
            log,
        }
    }

    fn scope_proc(&self, scope: &Scope) -> Result<ProcId> {
        match scope {
            Scope::Procs(set) => set
                .iter()
                .next()
                .copied()
                .ok_or_else(|| anyhow!("empty processor scope").into()),
            Scope::All => self
                .store
                .workers()
                .first()
                .and_then(|w| self.store.processors(*w).first().map(|p| p.id))
                .ok_or_else(|| anyhow!("no processors in store").into()),
            Scope::Invalid => Err(anyhow!("task submitted with an invalid scope").into()),
        }
    }

    fn scope_space(&self, scope: &Scope) -> Result<SpaceId> {
        let proc = self.scope_proc(scope)?;
        self.store
            .memory_spaces(proc)
            .first()
            .copied()
            .ok_or_else(|| anyhow!("processor {proc:?} has no memory space").into())
    }

    fn resolve(&self, args: &[(usize, RunArg)]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for (_, arg) in args {
            match arg {
                RunArg::Value(v) => values.push(v.clone()),
                RunArg::Task(h) => values.push(
                    h.result()
                        .cloned()
                        .ok_or_else(|| anyhow!("dependency {h:?} has not started"))?,
                ),
            }
        }
        Ok(values)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn enqueue(&mut self, submission: Submission) -> Result<()> {
        let values = self.resolve(&submission.args)?;

        let outcome = match &submission.func {
            TaskFn::Copy => {
                if values.len() != 2 {
                    TaskOutcome::Failed("copy task expects exactly two arguments".into())
                } else {
                    match self.store.copy_to(&values[0], &values[1]) {
                        Ok(()) => TaskOutcome::Success,
                        Err(e) => TaskOutcome::Failed(e.to_string()),
                    }
                }
            }
            TaskFn::Stage => {
                if values.len() != 1 {
                    TaskOutcome::Failed("staging task expects exactly one argument".into())
                } else {
                    let space = self.scope_space(&submission.options.scope)?;
                    let staged = self.store.alloc_payload(
                        &format!("{}@s{}", values[0].label(), space.0),
                        values[0].clone_payload(),
                        space,
                    );
                    submission.handle.bind_result(staged);
                    TaskOutcome::Success
                }
            }
            TaskFn::User { name, body } => match body(&values) {
                Ok(payload) => {
                    let space = self.scope_space(&submission.options.scope)?;
                    let result = self.store.alloc_payload(name, payload, space);
                    submission.handle.bind_result(result);
                    TaskOutcome::Success
                }
                Err(message) => TaskOutcome::Failed(message),
            },
        };

        self.log.lock().unwrap().push(ExecutedTask {
            handle: submission.handle.clone(),
            name: submission.func.name().to_string(),
            is_copy: submission.func.is_copy(),
            scope: submission.options.scope.clone(),
            syncdeps: submission.options.syncdeps.clone(),
            args: submission.args.clone(),
            outcome: outcome.clone(),
        });

        self.events_tx
            .send(TaskEvent::Completed {
                handle: submission.handle,
                outcome,
            })
            .map_err(|e| anyhow!("event channel closed: {e}").into())
    }
}
