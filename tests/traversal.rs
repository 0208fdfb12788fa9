//! Traversal-order selection: the same submissions walked `inorder`, `bfs`
//! and `dfs` reach the executor in different orders, and placement follows
//! the walk.

use std::error::Error;

use depsched::{with_region, Arg, ProcId, RegionOptions, Scope, SpaceId, TaskFn, TaskSpec, Traversal};
use depsched_test_utils::{harness, ExecLog, InMemoryStore};

type TestResult = Result<(), Box<dyn Error>>;

fn noop(name: &str) -> TaskFn {
    TaskFn::user(name, |_| Ok(Box::new(())))
}

/// Submit a graph shaped 0 -> 1, 0 -> 2, 1 -> 3 through data
/// dependencies: t0 writes a, t1 and t2 read a, t1 writes c, t3 reads c.
async fn run_graph(traversal: Traversal) -> TestResult {
    let store = InMemoryStore::with_procs(1, 2);
    let (mut ctx, log) = harness(store.clone());
    let a = store.alloc("a", 0i64, SpaceId(0));
    let c = store.alloc("c", 0i64, SpaceId(0));

    with_region(&mut ctx, RegionOptions::with_traversal(traversal), |region| {
        region.submit(TaskSpec::new(noop("t0"), vec![Arg::Out((&a).into())]))?;
        region.submit(TaskSpec::new(
            noop("t1"),
            vec![Arg::In((&a).into()), Arg::Out((&c).into())],
        ))?;
        region.submit(TaskSpec::new(noop("t2"), vec![Arg::In((&a).into())]))?;
        region.submit(TaskSpec::new(noop("t3"), vec![Arg::In((&c).into())]))?;
        Ok(())
    })
    .await?;

    check_order(&log, traversal);
    Ok(())
}

fn check_order(log: &ExecLog, traversal: Traversal) {
    let entries = log.lock().unwrap();
    let names: Vec<&str> = entries
        .iter()
        .filter(|t| !t.is_copy)
        .map(|t| t.name.as_str())
        .collect();

    let expected = match traversal {
        Traversal::Inorder | Traversal::Bfs => vec!["t0", "t1", "t2", "t3"],
        // depth-first descends through t1 into t3 before backtracking
        Traversal::Dfs => vec!["t0", "t1", "t3", "t2"],
    };
    assert_eq!(names, expected, "walk order for {traversal:?}");

    // placement follows the walk round-robin over the two processors
    for (i, task) in entries.iter().filter(|t| !t.is_copy).enumerate() {
        assert_eq!(
            task.scope,
            Scope::single(ProcId((i % 2) as u32)),
            "round-robin slot {i} for {traversal:?}"
        );
    }
}

#[tokio::test]
async fn inorder_walks_in_submission_order() -> TestResult {
    run_graph(Traversal::Inorder).await
}

#[tokio::test]
async fn bfs_walks_breadth_first() -> TestResult {
    run_graph(Traversal::Bfs).await
}

#[tokio::test]
async fn dfs_walks_depth_first() -> TestResult {
    run_graph(Traversal::Dfs).await
}

/// A join consuming a data value from one producer and a task handle from
/// another: the handle's producer must be walked before its consumer in
/// every traversal, even when breadth-first discovery reaches the
/// consumer from the other root first.
#[tokio::test]
async fn task_handles_resolve_under_every_traversal() -> TestResult {
    for traversal in [Traversal::Inorder, Traversal::Bfs, Traversal::Dfs] {
        let store = InMemoryStore::with_spaces(2);
        let (mut ctx, log) = harness(store.clone());
        let x = store.alloc("x", 0i64, SpaceId(0));

        with_region(&mut ctx, RegionOptions::with_traversal(traversal), |region| {
            region.submit(TaskSpec::new(
                TaskFn::user("writer", |args| {
                    args[0].set(7i64);
                    Ok(Box::new(()))
                }),
                vec![Arg::Out((&x).into())],
            ))?;
            let produced = region.submit(TaskSpec::new(
                TaskFn::user("produce", |_| Ok(Box::new(4i64))),
                vec![],
            ))?;
            region.submit(TaskSpec::new(
                TaskFn::user("consume", |args| {
                    match (args[0].get::<i64>(), args[1].get::<i64>()) {
                        (Some(7), Some(4)) => Ok(Box::new(())),
                        other => Err(format!("unexpected inputs: {other:?}")),
                    }
                }),
                vec![Arg::In((&x).into()), Arg::In((&produced).into())],
            ))?;
            Ok(())
        })
        .await?;

        let entries = log.lock().unwrap();
        let produce = entries
            .iter()
            .position(|t| t.name == "produce")
            .expect("produce ran");
        let consume = entries
            .iter()
            .position(|t| t.name == "consume")
            .expect("consume ran");
        assert!(
            produce < consume,
            "producer must be forwarded before its consumer under {traversal:?}"
        );
        // the consumer depends on its handle-argument producer
        assert!(entries[consume]
            .syncdeps
            .contains(&entries[produce].handle));
        // all three ran to completion, so the staged value resolved
        assert_eq!(entries.iter().filter(|t| !t.is_copy).count(), 3);
    }
    Ok(())
}
