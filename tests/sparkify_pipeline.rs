mod common;
use crate::common::builders::{
    SPARKIFY_TASKS, int_rows, run_context, seed_sparkify, sparkify_config, sparkify_dag,
};
use crate::common::{executor, init_tracing, with_timeout};

use std::time::Duration;

use stardag::config::TaskKindConfig;
use stardag::errors::{TaskError, WarehouseError};
use stardag::tasks::TaskOutput;
use stardag::types::{PipelineStatus, TaskStatus};
use stardag::warehouse::MemoryWarehouse;

/// Select statement configured for a dimension task of the reference DAG.
fn dimension_select(task: &str) -> String {
    match &sparkify_config(0).task[task].kind {
        TaskKindConfig::Dimension(d) => d.statement.clone(),
        other => panic!("{task} is not a dimension task: {other:?}"),
    }
}

#[tokio::test]
async fn reference_pipeline_succeeds() {
    init_tracing();
    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);

    let result = with_timeout(executor(&warehouse, 4).execute(&sparkify_dag(0), run_context()))
        .await
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Succeeded, "{result}");
    assert!(!result.cancelled);
    assert_eq!(result.task_reports.len(), SPARKIFY_TASKS.len());
    for name in SPARKIFY_TASKS {
        let report = result.report(name).unwrap();
        assert_eq!(report.status, TaskStatus::Succeeded, "{name}");
        assert_eq!(report.attempts, 1, "{name}");
    }

    assert_eq!(
        result.report("Stage_events").unwrap().output,
        Some(TaskOutput::RowsLoaded(3))
    );
    assert_eq!(
        result.report("Stage_songs").unwrap().output,
        Some(TaskOutput::RowsLoaded(2))
    );
    match &result.report("Run_data_quality_checks").unwrap().output {
        Some(TaskOutput::Checks(report)) => {
            assert_eq!(report.outcomes.len(), 6);
            assert!(report.is_success());
        }
        other => panic!("unexpected gate output: {other:?}"),
    }

    assert_eq!(warehouse.row_count("dev.public.songplays"), 3);
    assert_eq!(warehouse.row_count("dev.public.users"), 2);

    // Credentials reach the warehouse but never the run result.
    assert!(
        warehouse
            .statements()
            .iter()
            .any(|s| s.starts_with("COPY dev.public.staging_events") && s.contains("AKIATEST"))
    );
    assert!(!format!("{result}").contains("test-secret"));
}

#[tokio::test]
async fn failed_staging_skips_the_rest_of_the_star() {
    init_tracing();
    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);
    warehouse.fail_next(
        "staging_songs",
        1,
        WarehouseError::permanent("permission denied for relation staging_songs"),
    );

    let result = with_timeout(executor(&warehouse, 4).execute(&sparkify_dag(3), run_context()))
        .await
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_tasks(), vec!["Stage_songs"]);
    assert_eq!(result.report("Stage_songs").unwrap().attempts, 1);
    assert_eq!(result.report("Stage_events").unwrap().status, TaskStatus::Succeeded);
    assert_eq!(result.report("Begin_execution").unwrap().status, TaskStatus::Succeeded);

    let skipped = result.skipped_tasks();
    assert_eq!(skipped.len(), 7);
    for name in [
        "Load_songplays_fact_table",
        "Load_user_dim_table",
        "Load_time_dim_table",
        "Run_data_quality_checks",
        "Stop_execution",
    ] {
        assert!(skipped.contains(&name), "{name} should be skipped");
    }

    let errors = result.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].1, TaskError::WarehouseStatement { .. }));
    assert!(
        !warehouse
            .statements()
            .iter()
            .any(|s| s.starts_with("INSERT INTO"))
    );
}

#[tokio::test]
async fn throttled_copy_is_retried() {
    init_tracing();
    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);
    warehouse.fail_next("FROM 's3://udacity-dend/log_data'", 2, WarehouseError::transient("SlowDown"));

    let result = with_timeout(executor(&warehouse, 4).execute(&sparkify_dag(3), run_context()))
        .await
        .unwrap();

    assert!(result.is_success(), "{result}");
    let report = result.report("Stage_events").unwrap();
    assert_eq!(report.attempts, 3);
    // Each attempt empties the staging table first, so retries never duplicate.
    assert_eq!(report.output, Some(TaskOutput::RowsLoaded(3)));
    assert_eq!(warehouse.row_count("dev.public.staging_events"), 3);
}

#[tokio::test]
async fn dimension_reload_is_idempotent_only_when_truncating() {
    init_tracing();
    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);
    let exec = executor(&warehouse, 4);
    let dag = sparkify_dag(0);

    for _ in 0..2 {
        let result = with_timeout(exec.execute(&dag, run_context())).await.unwrap();
        assert!(result.is_success(), "{result}");
    }
    assert_eq!(warehouse.row_count("dev.public.users"), 2);
    // Fact loads append.
    assert_eq!(warehouse.row_count("dev.public.songplays"), 6);

    let append_toml = common::builders::SPARKIFY_TOML.replace(
        "table = \"users\"\ntruncate_before_load = true",
        "table = \"users\"\ntruncate_before_load = false",
    );
    let cfg = common::builders::ConfigFileBuilder::from_toml(&append_toml)
        .with_retries(0, "10ms")
        .build();
    let append_dag = stardag::config::build_dag(&cfg).unwrap();

    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);
    let exec = executor(&warehouse, 4);
    for _ in 0..2 {
        let result = with_timeout(exec.execute(&append_dag, run_context())).await.unwrap();
        assert!(result.is_success(), "{result}");
    }
    assert_eq!(warehouse.row_count("dev.public.users"), 4);
    assert_eq!(warehouse.row_count("dev.public.songs"), 2);
}

#[tokio::test]
async fn quality_gate_fails_on_an_empty_dimension() {
    init_tracing();
    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);
    warehouse.add_select(&dimension_select("Load_user_dim_table"), vec![]);

    let result = with_timeout(executor(&warehouse, 4).execute(&sparkify_dag(3), run_context()))
        .await
        .unwrap();

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.failed_tasks(), vec!["Run_data_quality_checks"]);
    assert_eq!(result.skipped_tasks(), vec!["Stop_execution"]);

    let gate = result.report("Run_data_quality_checks").unwrap();
    // Assertion failures are never retried.
    assert_eq!(gate.attempts, 1);
    match &gate.error {
        Some(TaskError::AssertionFailure(report)) => {
            assert_eq!(report.failure_count(), 1);
            let failed: Vec<_> = report.failures().map(|o| o.index).collect();
            assert_eq!(failed, vec![4]);
        }
        other => panic!("unexpected gate error: {other:?}"),
    }
}

#[tokio::test]
async fn quality_gate_reports_every_failing_check() {
    init_tracing();
    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);
    warehouse.add_select(&dimension_select("Load_song_dim_table"), vec![]);
    warehouse.add_select(&dimension_select("Load_time_dim_table"), vec![]);

    let result = with_timeout(executor(&warehouse, 4).execute(&sparkify_dag(0), run_context()))
        .await
        .unwrap();

    let gate = result.report("Run_data_quality_checks").unwrap();
    assert_eq!(gate.status, TaskStatus::Failed);
    let Some(TaskError::AssertionFailure(report)) = &gate.error else {
        panic!("unexpected gate error: {:?}", gate.error);
    };
    assert_eq!(report.outcomes.len(), 6);
    let failed: Vec<_> = report.failures().map(|o| o.index).collect();
    assert_eq!(failed, vec![1, 3]);
    assert!(gate.error.as_ref().unwrap().to_string().starts_with("2 of 6"));
}

#[tokio::test]
async fn null_user_ids_fail_the_gate() {
    init_tracing();
    let warehouse = MemoryWarehouse::new();
    seed_sparkify(&warehouse);
    warehouse.set_query_result(
        "SELECT COUNT(*) FROM songplays WHERE userid IS NULL",
        int_rows(&[12]),
    );

    let result = with_timeout(executor(&warehouse, 4).execute(&sparkify_dag(0), run_context()))
        .await
        .unwrap();
    assert_eq!(result.failed_tasks(), vec!["Run_data_quality_checks"]);
}

#[tokio::test]
async fn warehouse_connections_stay_within_max_workers() {
    init_tracing();
    let warehouse = MemoryWarehouse::new().with_latency(Duration::from_millis(20));
    seed_sparkify(&warehouse);

    let result = with_timeout(executor(&warehouse, 2).execute(&sparkify_dag(0), run_context()))
        .await
        .unwrap();

    assert!(result.is_success(), "{result}");
    assert!(warehouse.peak_connections() <= 2);
    assert!(warehouse.peak_connections() >= 1);
    assert_eq!(warehouse.open_connections(), 0);
}
