use std::error::Error;

use depsched::{
    with_region, Arg, DepschedError, ProcId, RegionOptions, Scope, SpaceId, TaskFn, TaskSpec,
};
use depsched_test_utils::{harness, InMemoryStore};

type TestResult = Result<(), Box<dyn Error>>;

fn noop(name: &str) -> TaskFn {
    TaskFn::user(name, |_| Ok(Box::new(())))
}

#[tokio::test]
async fn invalid_deps_element_rejects_the_submission() -> TestResult {
    let store = InMemoryStore::with_spaces(1);
    let (mut ctx, log) = harness(store.clone());
    let x = store.alloc("x", 0i64, SpaceId(0));
    let y = store.alloc("y", 0i64, SpaceId(0));

    let err = with_region(&mut ctx, RegionOptions::default(), |region| {
        region.submit(TaskSpec::new(
            noop("bad"),
            vec![Arg::Deps((&x).into(), vec![Arg::Plain((&y).into())])],
        ))?;
        Ok(())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, DepschedError::InvalidAccess(_)));
    assert!(log.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn dynamic_scope_outside_local_worker_is_incompatible() -> TestResult {
    let store = InMemoryStore::with_spaces(2);
    let (mut ctx, _log) = harness(store.clone());
    let x = store.alloc("x", 0i64, SpaceId(0));

    // the harness drives worker 0; processor 1 belongs to worker 1
    let err = with_region(&mut ctx, RegionOptions::dynamic(), |region| {
        region.submit(
            TaskSpec::new(noop("elsewhere"), vec![Arg::In((&x).into())])
                .with_scope(Scope::single(ProcId(1))),
        )?;
        Ok(())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, DepschedError::IncompatibleScope));
    Ok(())
}

#[tokio::test]
async fn first_failure_is_rethrown_after_waiting() -> TestResult {
    let store = InMemoryStore::with_spaces(1);
    let (mut ctx, log) = harness(store.clone());
    let x = store.alloc("x", 0i64, SpaceId(0));
    let y = store.alloc("y", 0i64, SpaceId(0));

    let err = with_region(&mut ctx, RegionOptions::default(), |region| {
        region.submit(TaskSpec::new(
            TaskFn::user("boom", |_| Err("boom".to_string())),
            vec![Arg::In((&x).into())],
        ))?;
        region.submit(TaskSpec::new(noop("fine"), vec![Arg::In((&y).into())]))?;
        Ok(())
    })
    .await
    .unwrap_err();

    assert!(matches!(err, DepschedError::UserTaskFailure(ref m) if m == "boom"));
    // the second task still ran to completion
    assert_eq!(log.lock().unwrap().len(), 2);
    Ok(())
}

#[test]
fn unknown_traversal_string_is_rejected() {
    let err = "zigzag".parse::<depsched::Traversal>().unwrap_err();
    assert!(matches!(err, DepschedError::InvalidTraversal(s) if s == "zigzag"));
}
