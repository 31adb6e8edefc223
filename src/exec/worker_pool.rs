// src/exec/worker_pool.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, watch};
use tracing::debug;

use crate::context::RunContext;
use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::object_store::ObjectStore;
use crate::warehouse::Warehouse;

use super::backend::ExecutorBackend;
use super::task_runner::{AttemptEnv, run_attempt};

/// Production backend: one tokio task per attempt, at most `max_workers`
/// of them inside `Task::run` at any time.
///
/// Retry backoff is waited out before a slot is taken, so a sleeping retry
/// never blocks other tasks.
pub struct WorkerPool {
    env: Arc<AttemptEnv>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(
        max_workers: usize,
        events: mpsc::Sender<RuntimeEvent>,
        cancel: watch::Receiver<bool>,
        run: Arc<RunContext>,
        warehouse: Arc<dyn Warehouse>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        let max_workers = max_workers.max(1);
        let env = AttemptEnv {
            slots: Arc::new(Semaphore::new(max_workers)),
            events,
            cancel,
            run,
            warehouse,
            object_store,
        };
        Self {
            env: Arc::new(env),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Spawn one attempt in the background.
    pub fn spawn_attempt(&self, task: ScheduledTask) {
        debug!(
            task = %task.name,
            attempt = task.attempt,
            delay_ms = task.delay.map(|d| d.as_millis() as u64),
            "spawning attempt"
        );
        let env = Arc::clone(&self.env);
        tokio::spawn(async move {
            run_attempt(task, &env).await;
        });
    }
}

impl ExecutorBackend for WorkerPool {
    fn dispatch(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        for task in tasks {
            self.spawn_attempt(task);
        }
        Box::pin(async { Ok(()) })
    }
}
