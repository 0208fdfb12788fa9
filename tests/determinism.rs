//! Running the same region twice over identical inputs must produce an
//! identical plan: same submission order, same placement, same dependency
//! structure.

use std::collections::HashMap;
use std::error::Error;

use depsched::{with_region, Arg, RegionOptions, Scope, SpaceId, TaskFn, TaskHandle, TaskSpec};
use depsched_test_utils::{harness, ExecutedTask, InMemoryStore};

type TestResult = Result<(), Box<dyn Error>>;

fn noop(name: &str) -> TaskFn {
    TaskFn::user(name, |_| Ok(Box::new(())))
}

/// Collapse a run's log into a handle-free shape: names, scopes and
/// syncdeps expressed as submission indices.
fn plan_shape(log: &[ExecutedTask]) -> Vec<(String, Scope, Vec<usize>)> {
    let position: HashMap<TaskHandle, usize> = log
        .iter()
        .enumerate()
        .map(|(i, t)| (t.handle.clone(), i))
        .collect();
    log.iter()
        .map(|t| {
            let mut deps: Vec<usize> = t
                .syncdeps
                .iter()
                .filter_map(|h| position.get(h).copied())
                .collect();
            deps.sort_unstable();
            (t.name.clone(), t.scope.clone(), deps)
        })
        .collect()
}

#[tokio::test]
async fn identical_regions_produce_identical_plans() -> TestResult {
    let mut shapes = Vec::new();

    for _ in 0..2 {
        let store = InMemoryStore::with_spaces(2);
        let (mut ctx, log) = harness(store.clone());
        let x = store.alloc("x", 0i64, SpaceId(0));
        let y = store.alloc("y", 0i64, SpaceId(1));

        with_region(&mut ctx, RegionOptions::default(), |region| {
            region.submit(TaskSpec::new(noop("t0"), vec![Arg::Out((&x).into())]))?;
            region.submit(TaskSpec::new(
                noop("t1"),
                vec![Arg::In((&x).into()), Arg::Out((&y).into())],
            ))?;
            region.submit(TaskSpec::new(noop("t2"), vec![Arg::InOut((&y).into())]))?;
            region.submit(TaskSpec::new(noop("t3"), vec![Arg::In((&x).into())]))?;
            Ok(())
        })
        .await?;

        shapes.push(plan_shape(&log.lock().unwrap()));
    }

    assert_eq!(shapes[0], shapes[1]);
    Ok(())
}

#[tokio::test]
async fn regions_without_writes_leave_values_untouched() -> TestResult {
    let store = InMemoryStore::with_spaces(2);
    let (mut ctx, _log) = harness(store.clone());
    let x = store.alloc("x", 33i64, SpaceId(0));

    with_region(&mut ctx, RegionOptions::default(), |region| {
        for i in 0..3 {
            region.submit(TaskSpec::new(noop(&format!("r{i}")), vec![Arg::In((&x).into())]))?;
        }
        Ok(())
    })
    .await?;

    // observationally equivalent to running the readers outside a region
    assert_eq!(x.get::<i64>(), Some(33));
    assert_eq!(store.space_of(&x), SpaceId(0));
    assert_eq!(store.move_count(), 0);
    assert_eq!(store.copy_count(), 0);
    Ok(())
}
