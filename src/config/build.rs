// src/config/build.rs

//! Conversion of a validated [`ConfigFile`] into runtime objects.

use std::sync::Arc;

use tracing::debug;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, DefaultsSection, TaskConfig, TaskKindConfig};
use crate::config::validate::warehouse_classifier;
use crate::dag::{Dag, RetryPolicy};
use crate::engine::ExecutorOptions;
use crate::errors::{PipelineError, Result};
use crate::tasks::{
    DimensionLoadConfig, DimensionLoadTask, FactLoadTask, LoadConfig, NoopTask, QualityCheck,
    QualityGateTask, StagingConfig, StagingTask, Task, TaskSpec,
};
use crate::warehouse::command::DEFAULT_PSQL_ARGS;
use crate::warehouse::{CommandWarehouse, TableRef};

/// Build the task graph described by `cfg`.
pub fn build_dag(cfg: &ConfigFile) -> Result<Dag> {
    let mut dag = Dag::new();
    for (name, task_cfg) in cfg.task.iter() {
        let spec = TaskSpec::new(name.clone())
            .after(task_cfg.after.iter().cloned())
            .with_retry(retry_policy_for(&cfg.defaults, task_cfg)?);
        let task = build_task(cfg, spec, task_cfg)?;
        debug!(task = %name, description = %task.describe(), "built task");
        dag.add_task(task);
    }
    Ok(dag)
}

fn build_task(cfg: &ConfigFile, spec: TaskSpec, task_cfg: &TaskConfig) -> Result<Arc<dyn Task>> {
    let defaults = &cfg.defaults;
    let table_ref = |database: &Option<String>, schema: &Option<String>, table: &str| {
        TableRef::new(
            database.as_deref().or(defaults.database.as_deref()),
            schema.clone().unwrap_or_else(|| defaults.schema.clone()),
            table,
        )
    };

    let task: Arc<dyn Task> = match &task_cfg.kind {
        TaskKindConfig::Noop => Arc::new(NoopTask::new(spec)),
        TaskKindConfig::Staging(s) => Arc::new(StagingTask::new(
            spec,
            StagingConfig {
                bucket: s.bucket.clone(),
                key_pattern: s.key.clone(),
                source_format: s.format,
                copy_options: s.copy_options.clone(),
                credentials: s
                    .credentials
                    .clone()
                    .unwrap_or_else(|| cfg.object_store.credentials.clone()),
                destination: table_ref(&s.database, &s.schema, &s.table)?,
            },
        )?),
        TaskKindConfig::Fact(l) => Arc::new(FactLoadTask::new(
            spec,
            LoadConfig {
                statement: l.statement.clone(),
                destination: table_ref(&l.database, &l.schema, &l.table)?,
            },
        )?),
        TaskKindConfig::Dimension(d) => {
            let load = DimensionLoadConfig::new(LoadConfig {
                statement: d.statement.clone(),
                destination: table_ref(&d.database, &d.schema, &d.table)?,
            });
            let load = if d.truncate_before_load {
                load
            } else {
                load.append_only()
            };
            Arc::new(DimensionLoadTask::new(spec, load)?)
        }
        TaskKindConfig::Quality(q) => {
            let checks = q
                .checks
                .iter()
                .map(|c| QualityCheck::new(c.sql.clone(), c.expected.clone(), c.comparator))
                .collect();
            Arc::new(QualityGateTask::new(spec, checks))
        }
    };
    Ok(task)
}

/// Retry policy of one task: `[defaults]` overridden by the task's own
/// `retries` / `retry_delay`.
pub fn retry_policy_for(defaults: &DefaultsSection, task: &TaskConfig) -> Result<RetryPolicy> {
    let retries = task.retries.unwrap_or(defaults.retries);
    let delay = duration(task.retry_delay.as_deref().unwrap_or(&defaults.retry_delay))?;
    let policy = RetryPolicy::with_retries(retries, delay);
    if defaults.backoff_multiplier > 1.0 {
        let max = duration(&defaults.max_retry_delay)?;
        Ok(policy.exponential(defaults.backoff_multiplier, max))
    } else {
        Ok(policy)
    }
}

/// `CommandWarehouse` described by `[warehouse]`.
pub fn build_warehouse(cfg: &ConfigFile) -> Result<CommandWarehouse> {
    let args = cfg
        .warehouse
        .args
        .clone()
        .unwrap_or_else(|| DEFAULT_PSQL_ARGS.iter().map(|s| s.to_string()).collect());
    Ok(CommandWarehouse::new(
        cfg.warehouse.command.clone(),
        args,
        cfg.warehouse.field_separator.clone(),
        warehouse_classifier(&cfg.warehouse)?,
    ))
}

pub fn executor_options(cfg: &ConfigFile) -> ExecutorOptions {
    ExecutorOptions {
        max_workers: cfg.pipeline.max_workers,
    }
}

fn duration(s: &str) -> Result<std::time::Duration> {
    parse_duration(s).map_err(PipelineError::ConfigError)
}
