// src/tasks/mod.rs

//! Task definitions.
//!
//! Every task implements [`Task`]; the executor only sees `Arc<dyn Task>`.
//!
//! - [`noop`]: start/end markers that only shape the graph.
//! - [`staging`]: truncate a staging table and bulk-copy a source partition.
//! - [`load`]: fact (append-only) and dimension (optionally truncating) loads.
//! - [`quality`]: the data-quality gate.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::RunContext;
use crate::dag::RetryPolicy;
use crate::errors::TaskError;
use crate::object_store::ObjectStore;
use crate::warehouse::Warehouse;

pub mod load;
pub mod noop;
pub mod quality;
pub mod staging;

pub use load::{DimensionLoadConfig, DimensionLoadTask, FactLoadTask, LoadConfig};
pub use noop::NoopTask;
pub use quality::{CheckOutcome, CheckReport, QualityCheck, QualityGateTask};
pub use staging::{StagingConfig, StagingTask};

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Boxed future returned by [`Task::run`].
pub type TaskFuture<'a> = Pin<Box<dyn Future<Output = Result<TaskOutput, TaskError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Noop,
    Staging,
    FactLoad,
    DimensionLoad,
    QualityGate,
}

/// What a successful attempt produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    Done,
    RowsLoaded(u64),
    Checks(CheckReport),
}

/// Everything a task attempt may use.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run: Arc<RunContext>,
    pub warehouse: Arc<dyn Warehouse>,
    pub object_store: Arc<dyn ObjectStore>,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Name, dependencies and retry policy shared by all task variants.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub name: TaskName,
    pub dependencies: Vec<TaskName>,
    pub retry_policy: RetryPolicy,
}

impl TaskSpec {
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn after<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// A unit of work in the DAG.
///
/// `run` must be safe to call again after a failed attempt; the executor
/// decides whether and when to do so.
pub trait Task: Send + Sync + Debug {
    fn spec(&self) -> &TaskSpec;

    fn kind(&self) -> TaskKind;

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a>;

    fn name(&self) -> &str {
        &self.spec().name
    }

    fn dependencies(&self) -> &[TaskName] {
        &self.spec().dependencies
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.spec().retry_policy
    }

    /// One-line description for dry runs and logs.
    fn describe(&self) -> String {
        format!("{:?}", self.kind())
    }
}

pub(crate) fn require_non_empty(task: &str, field: &str, value: &str) -> crate::errors::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::errors::PipelineError::ConfigError(format!(
            "task '{task}': `{field}` must not be empty"
        )));
    }
    Ok(())
}
