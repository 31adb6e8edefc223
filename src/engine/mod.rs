// src/engine/mod.rs

//! Orchestration engine for stardag.
//!
//! This module ties together:
//! - the DAG scheduler
//! - the worker pool that runs task attempts
//! - the main runtime event loop that reacts to:
//!   - attempt start/finish events from workers
//!   - abandoned dispatches
//!   - cancellation
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`Executor`] is the public entry point that
//! wires both to a [`crate::exec::WorkerPool`].

use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::TaskError;
use crate::tasks::{TaskName, TaskOutput};

pub mod core;
pub mod event_handlers;
pub mod executor;
pub mod report;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use executor::Executor;
pub use report::{PipelineResult, TaskReport};
pub use runtime::Runtime;

/// Events flowing into the runtime from workers.
///
/// Every dispatched attempt produces exactly one `AttemptFinished` or
/// `AttemptAbandoned`, optionally preceded by `AttemptStarted`.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A worker slot was acquired and the attempt is about to run.
    AttemptStarted { task: TaskName, attempt: u32 },
    /// The attempt ran to completion.
    AttemptFinished {
        task: TaskName,
        attempt: u32,
        result: Result<TaskOutput, TaskError>,
    },
    /// The attempt was dropped before it started (cancellation).
    AttemptAbandoned { task: TaskName, attempt: u32 },
}

/// Tuning for a single executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Upper bound on attempts running at the same time.
    pub max_workers: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { max_workers: 4 }
    }
}

/// Cloneable handle used to cancel a running pipeline.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once cancellation has been requested.
///
/// Never resolves if every handle is dropped without cancelling.
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}
