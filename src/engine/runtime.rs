// src/engine/runtime.rs

use std::fmt;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::report::PipelineResult;
use super::{CoreCommand, CoreStep, RuntimeEvent, cancelled};

/// Drives the DAG scheduler in response to `RuntimeEvent`s,
/// and delegates attempt execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, watching for cancellation and dispatching attempts.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    cancel_rx: watch::Receiver<bool>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

enum Next {
    Cancel,
    Event(Option<RuntimeEvent>),
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        cancel_rx: watch::Receiver<bool>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            cancel_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Dispatches the DAG roots.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the core.
    /// - Executes commands returned by the core.
    /// - Returns once every task is terminal and no attempt is in flight.
    pub async fn run(mut self) -> Result<PipelineResult> {
        debug!("runtime started");

        let step = self.core.start();
        self.execute_step(step).await?;

        let mut cancel_seen = false;
        while !self.core.is_done() {
            if self.core.is_stalled() {
                return Err(anyhow!("scheduler stalled: no attempt in flight but run not finished").into());
            }

            let next = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel_rx), if !cancel_seen => Next::Cancel,
                event = self.event_rx.recv() => Next::Event(event),
            };

            let step = match next {
                Next::Cancel => {
                    cancel_seen = true;
                    info!(
                        in_flight = self.core.in_flight(),
                        "cancellation requested; letting in-flight attempts finish"
                    );
                    self.core.cancel()
                }
                Next::Event(Some(event)) => {
                    debug!(?event, "runtime received event");
                    self.core.step(event)
                }
                Next::Event(None) => {
                    warn!("runtime event channel closed before run finished");
                    return Err(anyhow!("worker event channel closed unexpectedly").into());
                }
            };
            self.execute_step(step).await?;
        }

        debug!("runtime exiting");
        Ok(self.core.into_result())
    }

    async fn execute_step(&mut self, step: CoreStep) -> Result<()> {
        for command in step.commands {
            match command {
                CoreCommand::DispatchTasks(tasks) => {
                    if tasks.is_empty() {
                        continue;
                    }
                    let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
                    debug!(?names, "dispatching attempts");
                    self.executor.dispatch(tasks).await?;
                }
            }
        }
        Ok(())
    }
}
