//! Dynamic (eager) dispatch: tasks reach the executor as they are
//! submitted, carrying their dependency sets, constrained to the local
//! worker, with no planner-synthesised copies.

use std::error::Error;

use depsched::{with_region, Arg, RegionOptions, Scope, SpaceId, TaskFn, TaskSpec, WorkerId};
use depsched_test_utils::{harness, InMemoryStore};

type TestResult = Result<(), Box<dyn Error>>;

fn noop(name: &str) -> TaskFn {
    TaskFn::user(name, |_| Ok(Box::new(())))
}

#[tokio::test]
async fn tasks_are_forwarded_as_submitted() -> TestResult {
    let store = InMemoryStore::with_spaces(2);
    let (mut ctx, log) = harness(store.clone());
    let x = store.alloc("x", 0i64, SpaceId(0));

    with_region(&mut ctx, RegionOptions::dynamic(), |region| {
        region.submit(TaskSpec::new(noop("t0"), vec![Arg::Out((&x).into())]))?;
        assert_eq!(log.lock().unwrap().len(), 1, "first task dispatched eagerly");
        region.submit(TaskSpec::new(noop("t1"), vec![Arg::In((&x).into())]))?;
        assert_eq!(log.lock().unwrap().len(), 2, "second task dispatched eagerly");
        Ok(())
    })
    .await?;

    let entries = log.lock().unwrap();
    assert!(entries.iter().all(|t| !t.is_copy));
    // read-after-write dependency is carried in syncdeps
    assert!(entries[1].syncdeps.contains(&entries[0].handle));
    // both tasks are pinned to the local worker's processors
    let local = Scope::worker(store.as_ref(), WorkerId(0));
    for task in entries.iter() {
        assert_eq!(task.scope, local);
    }
    assert_eq!(store.move_count(), 0);
    assert_eq!(store.copy_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unstarted_handle_arguments_resolve_at_run_time() -> TestResult {
    let store = InMemoryStore::with_spaces(1);
    let (mut ctx, log) = harness(store.clone());

    with_region(&mut ctx, RegionOptions::dynamic(), |region| {
        let t0 = region.submit(TaskSpec::new(
            TaskFn::user("produce", |_| Ok(Box::new(9i64))),
            vec![],
        ))?;
        region.submit(TaskSpec::new(
            TaskFn::user("consume", |args| {
                match args[0].get::<i64>() {
                    Some(9) => Ok(Box::new(())),
                    other => Err(format!("unexpected input: {other:?}")),
                }
            }),
            vec![Arg::In((&t0).into())],
        ))?;
        Ok(())
    })
    .await?;

    let entries = log.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].syncdeps.contains(&entries[0].handle));
    Ok(())
}
