// src/tasks/load.rs

//! Fact and dimension loads.
//!
//! Both insert the result of an opaque transformation statement into a
//! destination table. Fact loads never truncate: running one twice over the
//! same partition appends the rows twice. Dimension loads truncate first
//! unless `truncate_before_load` is turned off, in which case they behave
//! exactly like fact loads.

use tracing::info;

use crate::errors::{Result, TaskError};
use crate::warehouse::{TableRef, Warehouse};

use super::{Task, TaskContext, TaskFuture, TaskKind, TaskOutput, TaskSpec, require_non_empty};

/// Parameters shared by fact and dimension loads.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadConfig {
    /// Transformation statement whose rows are inserted (usually a `SELECT`).
    pub statement: String,
    pub destination: TableRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DimensionLoadConfig {
    pub load: LoadConfig,
    pub truncate_before_load: bool,
}

impl DimensionLoadConfig {
    /// Truncating load, the default.
    pub fn new(load: LoadConfig) -> Self {
        Self {
            load,
            truncate_before_load: true,
        }
    }

    pub fn append_only(mut self) -> Self {
        self.truncate_before_load = false;
        self
    }
}

/// `INSERT INTO <table>` followed by the transformation statement.
pub fn insert_statement(table: &TableRef, statement: &str) -> String {
    format!("INSERT INTO {table}\n{}", statement.trim())
}

async fn insert(
    warehouse: &dyn Warehouse,
    task: &str,
    config: &LoadConfig,
) -> std::result::Result<(), TaskError> {
    let sql = insert_statement(&config.destination, &config.statement);
    info!(task, table = %config.destination, "inserting transformation result");
    warehouse
        .execute(&sql)
        .await
        .map_err(|e| TaskError::from_warehouse(&sql, e))
}

/// Append-only load into a fact table.
#[derive(Debug, Clone)]
pub struct FactLoadTask {
    spec: TaskSpec,
    config: LoadConfig,
}

impl FactLoadTask {
    pub fn new(spec: TaskSpec, config: LoadConfig) -> Result<Self> {
        require_non_empty(&spec.name, "statement", &config.statement)?;
        Ok(Self { spec, config })
    }
}

impl Task for FactLoadTask {
    fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    fn kind(&self) -> TaskKind {
        TaskKind::FactLoad
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            insert(ctx.warehouse.as_ref(), &self.spec.name, &self.config).await?;
            Ok(TaskOutput::Done)
        })
    }

    fn describe(&self) -> String {
        format!("fact load -> {} (append)", self.config.destination)
    }
}

/// Load into a dimension table, truncating first by default.
#[derive(Debug, Clone)]
pub struct DimensionLoadTask {
    spec: TaskSpec,
    config: DimensionLoadConfig,
}

impl DimensionLoadTask {
    pub fn new(spec: TaskSpec, config: DimensionLoadConfig) -> Result<Self> {
        require_non_empty(&spec.name, "statement", &config.load.statement)?;
        Ok(Self { spec, config })
    }
}

impl Task for DimensionLoadTask {
    fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    fn kind(&self) -> TaskKind {
        TaskKind::DimensionLoad
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            let table = &self.config.load.destination;
            if self.config.truncate_before_load {
                let delete = format!("DELETE FROM {table}");
                info!(task = %self.spec.name, %table, "emptying dimension table");
                ctx.warehouse
                    .execute(&delete)
                    .await
                    .map_err(|e| TaskError::from_warehouse(&delete, e))?;
            }
            insert(ctx.warehouse.as_ref(), &self.spec.name, &self.config.load).await?;
            Ok(TaskOutput::Done)
        })
    }

    fn describe(&self) -> String {
        let mode = if self.config.truncate_before_load {
            "truncate-and-reload"
        } else {
            "append"
        };
        format!("dimension load -> {} ({mode})", self.config.load.destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_prefixes_the_statement() {
        let table = TableRef::new(Some("dev"), "public", "songplays").unwrap();
        assert_eq!(
            insert_statement(&table, "\n  SELECT 1\n"),
            "INSERT INTO dev.public.songplays\nSELECT 1"
        );
    }

    #[test]
    fn empty_statements_are_rejected() {
        let cfg = LoadConfig {
            statement: "  ".into(),
            destination: TableRef::new(None, "public", "users").unwrap(),
        };
        assert!(FactLoadTask::new(TaskSpec::new("Load_fact"), cfg.clone()).is_err());
        assert!(DimensionLoadTask::new(TaskSpec::new("Load_users"), DimensionLoadConfig::new(cfg)).is_err());
    }
}
