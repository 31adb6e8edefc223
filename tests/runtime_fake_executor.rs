mod common;
use crate::common::builders::{permanent, spec, transient};
use crate::common::{init_tracing, with_timeout};

use std::sync::{Arc, Mutex};

use stardag::dag::{Dag, Scheduler};
use stardag::engine::{CancelHandle, CoreRuntime, PipelineResult, Runtime};
use stardag::types::TaskStatus;
use stardag_test_utils::fake_executor::FakeExecutor;
use stardag_test_utils::scripted_task::ScriptedTask;

fn diamond() -> Dag {
    Dag::new()
        .with_task(ScriptedTask::new(spec("a", &[], 1)))
        .with_task(ScriptedTask::new(spec("b", &["a"], 1)))
        .with_task(ScriptedTask::new(spec("c", &["a"], 1)))
        .with_task(ScriptedTask::new(spec("d", &["b", "c"], 1)))
}

async fn run_with(
    dag: &Dag,
    configure: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> (PipelineResult, Vec<String>) {
    let graph = dag.validate().unwrap();
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let fake = configure(FakeExecutor::new(tx, Arc::clone(&executed)));

    let cancel = CancelHandle::new();
    let runtime = Runtime::new(
        CoreRuntime::new(Scheduler::new(graph)),
        rx,
        cancel.subscribe(),
        fake,
    );
    let result = with_timeout(runtime.run()).await.unwrap();
    let executed = executed.lock().unwrap().clone();
    (result, executed)
}

#[tokio::test]
async fn runtime_dispatches_in_dependency_order() {
    init_tracing();
    let (result, executed) = run_with(&diamond(), |f| f).await;

    assert!(result.is_success());
    assert_eq!(executed.len(), 4);
    assert_eq!(executed[0], "a#1");
    assert_eq!(executed[3], "d#1");
}

#[tokio::test]
async fn runtime_redispatches_retriable_failures() {
    init_tracing();
    let (result, executed) = run_with(&diamond(), |f| f.fail("b", 1, transient("timeout"))).await;

    assert!(result.is_success());
    assert!(executed.contains(&"b#2".to_string()));
    let pos = |e: &str| executed.iter().position(|x| x == e).unwrap();
    assert!(pos("b#2") < pos("d#1"));
    assert_eq!(result.report("b").unwrap().attempts, 2);
}

#[tokio::test]
async fn runtime_skips_dependents_of_exhausted_tasks() {
    init_tracing();
    let (result, executed) = run_with(&diamond(), |f| {
        f.fail("c", 1, transient("timeout"))
            .fail("c", 2, transient("timeout again"))
    })
    .await;

    assert_eq!(result.report("c").unwrap().status, TaskStatus::Failed);
    assert_eq!(result.report("c").unwrap().error, Some(transient("timeout again")));
    assert_eq!(result.report("d").unwrap().status, TaskStatus::Skipped);
    assert!(!executed.iter().any(|e| e.starts_with("d#")));
    assert!(!executed.contains(&"c#3".to_string()));
}

#[tokio::test]
async fn runtime_does_not_retry_permanent_failures() {
    init_tracing();
    let (result, executed) = run_with(&diamond(), |f| f.fail("a", 1, permanent("no such table"))).await;

    assert_eq!(executed, vec!["a#1"]);
    assert_eq!(result.failed_tasks(), vec!["a"]);
    assert_eq!(result.skipped_tasks(), vec!["b", "c", "d"]);
}
