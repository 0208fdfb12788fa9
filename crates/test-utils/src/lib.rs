//! In-memory fakes for the contracts `depsched` consumes, plus a small
//! harness for wiring a [`RegionContext`] in tests.

mod fake_executor;
mod store;

pub use fake_executor::{ExecLog, ExecutedTask, FakeExecutor};
pub use store::InMemoryStore;

use std::sync::{Arc, Mutex};

use depsched::{RegionContext, Scope, WorkerId};
use tokio::sync::mpsc;

/// Wire a region context around the given store and a fresh fake
/// executor. Returns the context plus the executor's submission log.
pub fn harness(store: Arc<InMemoryStore>) -> (RegionContext, ExecLog) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let log: ExecLog = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(store.clone(), events_tx, log.clone());

    let ctx = RegionContext {
        topology: store.clone(),
        mover: store,
        executor: Box::new(executor),
        events: events_rx,
        local_worker: WorkerId(0),
        scope: Scope::All,
    };
    (ctx, log)
}
