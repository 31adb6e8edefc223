mod common;
use crate::common::builders::{permanent, run_context, spec};
use crate::common::{executor, init_tracing, with_timeout};

use std::sync::atomic::Ordering;

use stardag::dag::Dag;
use stardag::errors::{GraphValidationError, PipelineError};
use stardag::types::{PipelineStatus, TaskStatus};
use stardag::warehouse::MemoryWarehouse;
use stardag_test_utils::scripted_task::{RunLog, ScriptedTask};

/// root -> {left, right}; left -> left_child; {left_child, right} -> join
#[tokio::test]
async fn failure_skips_every_descendant_and_nothing_else() {
    init_tracing();
    let log = RunLog::new();

    let left = ScriptedTask::new(spec("left", &["root"], 0))
        .then_fail(permanent("relation \"staging_songs\" does not exist"))
        .with_log(&log);
    let left_child = ScriptedTask::new(spec("left_child", &["left"], 0)).with_log(&log);
    let join = ScriptedTask::new(spec("join", &["left_child", "right"], 0)).with_log(&log);
    let left_child_calls = left_child.calls();
    let join_calls = join.calls();

    let dag = Dag::new()
        .with_task(ScriptedTask::new(spec("root", &[], 0)).with_log(&log))
        .with_task(left)
        .with_task(ScriptedTask::new(spec("right", &["root"], 0)).with_log(&log))
        .with_task(left_child)
        .with_task(join);

    let result = with_timeout(executor(&MemoryWarehouse::new(), 4).execute(&dag, run_context()))
        .await
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_tasks(), vec!["left"]);
    assert_eq!(result.skipped_tasks(), vec!["join", "left_child"]);
    assert_eq!(result.report("right").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(result.report("join").unwrap().attempts, 0);

    // Skipped tasks never run.
    assert_eq!(left_child_calls.load(Ordering::SeqCst), 0);
    assert_eq!(join_calls.load(Ordering::SeqCst), 0);
    assert!(!log.started().contains(&"join".to_string()));

    let errors = result.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, "left");
}

#[tokio::test]
async fn dependents_start_only_after_dependencies_succeed() {
    init_tracing();
    let log = RunLog::new();

    let dag = Dag::new()
        .with_task(ScriptedTask::new(spec("a", &[], 0)).with_log(&log))
        .with_task(ScriptedTask::new(spec("b", &["a"], 0)).with_log(&log))
        .with_task(ScriptedTask::new(spec("c", &["a"], 0)).with_log(&log))
        .with_task(ScriptedTask::new(spec("d", &["b", "c"], 0)).with_log(&log));

    let result = with_timeout(executor(&MemoryWarehouse::new(), 4).execute(&dag, run_context()))
        .await
        .unwrap();
    assert!(result.is_success());

    let pos = |e: &str| log.position(e).unwrap();
    assert!(pos("end:a") < pos("start:b"));
    assert!(pos("end:a") < pos("start:c"));
    assert!(pos("end:b") < pos("start:d"));
    assert!(pos("end:c") < pos("start:d"));
}

#[tokio::test]
async fn invalid_graphs_run_nothing() {
    init_tracing();

    let a = ScriptedTask::new(spec("a", &["c"], 0));
    let b = ScriptedTask::new(spec("b", &["a"], 0));
    let c = ScriptedTask::new(spec("c", &["b"], 0));
    let free = ScriptedTask::new(spec("free", &[], 0));
    let counters = [a.calls(), b.calls(), c.calls(), free.calls()];

    let warehouse = MemoryWarehouse::new();
    let dag = Dag::new().with_task(a).with_task(b).with_task(c).with_task(free);
    let err = executor(&warehouse, 2)
        .execute(&dag, run_context())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::GraphValidation(GraphValidationError::Cycle(_))
    ));
    for calls in counters {
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
    assert!(warehouse.statements().is_empty());

    let dangling = Dag::new().with_task(ScriptedTask::new(spec("x", &["missing"], 0)));
    let err = executor(&warehouse, 2)
        .execute(&dangling, run_context())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::GraphValidation(GraphValidationError::UnknownDependency { .. })
    ));
}
