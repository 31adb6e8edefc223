// src/engine/executor.rs

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::context::RunContext;
use crate::dag::{Dag, Scheduler};
use crate::errors::Result;
use crate::exec::WorkerPool;
use crate::object_store::ObjectStore;
use crate::warehouse::Warehouse;

use super::core::CoreRuntime;
use super::report::PipelineResult;
use super::runtime::Runtime;
use super::{CancelHandle, ExecutorOptions};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Runs a [`Dag`] against a warehouse and an object store.
///
/// The executor holds no per-run state; the same instance (and the same
/// `Dag`) can be used for any number of runs.
#[derive(Debug, Clone)]
pub struct Executor {
    warehouse: Arc<dyn Warehouse>,
    object_store: Arc<dyn ObjectStore>,
    options: ExecutorOptions,
}

impl Executor {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        object_store: Arc<dyn ObjectStore>,
        mut options: ExecutorOptions,
    ) -> Self {
        if options.max_workers == 0 {
            warn!("max_workers = 0 would never run anything; using 1");
            options.max_workers = 1;
        }
        Self {
            warehouse,
            object_store,
            options,
        }
    }

    /// Run every task of `dag` once (plus retries) for `run`.
    ///
    /// Shape errors are returned as `PipelineError::GraphValidation` before any
    /// task starts. Task failures never produce an `Err`; they are reported in
    /// the returned [`PipelineResult`].
    pub async fn execute(&self, dag: &Dag, run: RunContext) -> Result<PipelineResult> {
        self.execute_with_cancel(dag, run, CancelHandle::new()).await
    }

    pub async fn execute_with_cancel(
        &self,
        dag: &Dag,
        run: RunContext,
        cancel: CancelHandle,
    ) -> Result<PipelineResult> {
        let graph = dag.validate()?;

        info!(
            run_id = %run.run_id(),
            logical_date = %run.logical_date(),
            tasks = graph.len(),
            max_workers = self.options.max_workers,
            "starting pipeline run"
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let pool = WorkerPool::new(
            self.options.max_workers,
            event_tx,
            cancel.subscribe(),
            Arc::new(run),
            Arc::clone(&self.warehouse),
            Arc::clone(&self.object_store),
        );

        let core = CoreRuntime::new(Scheduler::new(graph));
        let runtime = Runtime::new(core, event_rx, cancel.subscribe(), pool);
        let result = runtime.run().await?;

        info!(
            status = %result.status,
            cancelled = result.cancelled,
            failed = result.failed_tasks().len(),
            skipped = result.skipped_tasks().len(),
            "pipeline run finished"
        );
        Ok(result)
    }
}
