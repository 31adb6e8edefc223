// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending `ScheduledTask`s to the worker pool
//! - watching the cancellation handle
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, warehouse, or processes.

use tracing::debug;

use crate::dag::Scheduler;
use crate::engine::RuntimeEvent;
use crate::engine::event_handlers::{
    CoreStep, handle_attempt_abandoned, handle_attempt_finished, handle_attempt_started,
    handle_cancel,
};
use crate::engine::report::PipelineResult;

/// Pure core runtime state.
///
/// This owns:
/// - the DAG scheduler
/// - the count of dispatched attempts that have not reported back yet
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    in_flight: usize,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            in_flight: 0,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Attempts dispatched but not yet finished or abandoned.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Dispatch the roots of the DAG.
    pub fn start(&mut self) -> CoreStep {
        let step = CoreStep::from_scheduler(self.scheduler.start());
        self.account(step)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let step = match event {
            RuntimeEvent::AttemptStarted { task, attempt } => {
                handle_attempt_started(&mut self.scheduler, &task, attempt)
            }
            RuntimeEvent::AttemptFinished {
                task,
                attempt,
                result,
            } => {
                self.settle();
                handle_attempt_finished(&mut self.scheduler, task, attempt, result)
            }
            RuntimeEvent::AttemptAbandoned { task, attempt } => {
                self.settle();
                handle_attempt_abandoned(&mut self.scheduler, &task, attempt)
            }
        };
        self.account(step)
    }

    /// Stop scheduling new work.
    pub fn cancel(&mut self) -> CoreStep {
        let step = handle_cancel(&mut self.scheduler);
        self.account(step)
    }

    /// No task can change state any more.
    pub fn is_done(&self) -> bool {
        self.scheduler.is_finished() && self.in_flight == 0
    }

    /// Nothing is in flight yet some task is not terminal.
    pub fn is_stalled(&self) -> bool {
        self.in_flight == 0 && !self.scheduler.is_finished()
    }

    pub fn into_result(self) -> PipelineResult {
        PipelineResult::from_reports(self.scheduler.reports(), self.scheduler.is_cancelled())
    }

    fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn account(&mut self, mut step: CoreStep) -> CoreStep {
        self.in_flight += step.dispatched();
        step.keep_running = !self.is_done();
        debug!(
            in_flight = self.in_flight,
            keep_running = step.keep_running,
            "core step"
        );
        step
    }
}
