// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::errors::TaskError;
use crate::tasks::{TaskName, TaskOutput};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Hand these attempts to the worker pool.
    DispatchTasks(Vec<ScheduledTask>),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub(crate) fn from_scheduler(step: SchedulerStep) -> Self {
        let mut commands = Vec::new();
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
        }
        Self {
            commands,
            keep_running: true,
        }
    }

    /// Attempts this step dispatches.
    pub fn dispatched(&self) -> usize {
        self.commands
            .iter()
            .map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => tasks.len(),
            })
            .sum()
    }
}

pub fn handle_attempt_started(scheduler: &mut Scheduler, task: &str, attempt: u32) -> CoreStep {
    scheduler.attempt_started(task, attempt);
    CoreStep::from_scheduler(SchedulerStep::default())
}

/// Record the outcome of an attempt and dispatch whatever became ready.
pub fn handle_attempt_finished(
    scheduler: &mut Scheduler,
    task: TaskName,
    attempt: u32,
    result: Result<TaskOutput, TaskError>,
) -> CoreStep {
    let step = scheduler.attempt_finished(&task, attempt, result);
    CoreStep::from_scheduler(step)
}

pub fn handle_attempt_abandoned(scheduler: &mut Scheduler, task: &str, attempt: u32) -> CoreStep {
    let step = scheduler.attempt_abandoned(task, attempt);
    CoreStep::from_scheduler(step)
}

pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.cancel();
    CoreStep::from_scheduler(step)
}
