mod common;
use crate::common::builders::{permanent, run_context, spec, transient};
use crate::common::{executor, init_tracing, with_timeout};

use std::sync::atomic::Ordering;

use stardag::dag::Dag;
use stardag::errors::TaskError;
use stardag::tasks::TaskOutput;
use stardag::types::{PipelineStatus, TaskStatus};
use stardag::warehouse::MemoryWarehouse;
use stardag_test_utils::scripted_task::ScriptedTask;

#[tokio::test]
async fn succeeds_on_the_kth_attempt() {
    init_tracing();

    // Two transient failures, then success; three retries allowed.
    let task = ScriptedTask::new(spec("flaky", &[], 3)).fail_times(2, transient("SlowDown"));
    let calls = task.calls();
    let dag = Dag::new().with_task(task);

    let result = with_timeout(executor(&MemoryWarehouse::new(), 2).execute(&dag, run_context()))
        .await
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Succeeded);
    let report = result.report("flaky").unwrap();
    assert_eq!(report.status, TaskStatus::Succeeded);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.error, None);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn attempts_never_exceed_the_policy() {
    init_tracing();

    let task = ScriptedTask::new(spec("always_throttled", &[], 2)).fail_times(10, transient("throttled"));
    let calls = task.calls();
    let dag = Dag::new().with_task(task);

    let result = with_timeout(executor(&MemoryWarehouse::new(), 2).execute(&dag, run_context()))
        .await
        .unwrap();

    let report = result.report("always_throttled").unwrap();
    assert_eq!(report.status, TaskStatus::Failed);
    assert_eq!(report.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(report.error, Some(TaskError::WarehouseStatement { .. })));
}

#[tokio::test]
async fn fatal_errors_are_not_retried() {
    init_tracing();

    let bad_sql = ScriptedTask::new(spec("bad_sql", &[], 3)).then_fail(permanent("syntax error at or near \"SELEC\""));
    let bad_sql_calls = bad_sql.calls();

    let no_rows = ScriptedTask::new(spec("no_rows", &[], 3)).then_fail(TaskError::NoResult {
        statement: "SELECT COUNT(*) FROM songs WHERE false".into(),
    });
    let no_rows_calls = no_rows.calls();

    let dag = Dag::new().with_task(bad_sql).with_task(no_rows);
    let result = with_timeout(executor(&MemoryWarehouse::new(), 2).execute(&dag, run_context()))
        .await
        .unwrap();

    assert_eq!(result.failed_tasks(), vec!["bad_sql", "no_rows"]);
    assert_eq!(bad_sql_calls.load(Ordering::SeqCst), 1);
    assert_eq!(no_rows_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.report("bad_sql").unwrap().attempts, 1);
}

#[tokio::test]
async fn retried_task_unblocks_dependents_once_it_succeeds() {
    init_tracing();

    let upstream = ScriptedTask::new(spec("upstream", &[], 1))
        .then_fail(TaskError::TransientIo("connection reset".into()))
        .then_succeed(TaskOutput::RowsLoaded(5));
    let downstream = ScriptedTask::new(spec("downstream", &["upstream"], 0));
    let downstream_calls = downstream.calls();

    let dag = Dag::new().with_task(upstream).with_task(downstream);
    let result = with_timeout(executor(&MemoryWarehouse::new(), 1).execute(&dag, run_context()))
        .await
        .unwrap();

    assert!(result.is_success());
    assert_eq!(
        result.report("upstream").unwrap().output,
        Some(TaskOutput::RowsLoaded(5))
    );
    assert_eq!(downstream_calls.load(Ordering::SeqCst), 1);
}
