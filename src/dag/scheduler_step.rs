// src/dag/scheduler_step.rs

//! Step-by-step result type for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::tasks::TaskName;

/// What changed in a single scheduler step.
///
/// The executor only needs `newly_scheduled`; the rest is there so tests can
/// drive the scheduler by hand and assert on each transition.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Attempts to dispatch now (first attempts) or after their delay (retries).
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that entered `Retrying` in this step.
    pub newly_retrying: Vec<TaskName>,
    /// Tasks that reached `Failed` in this step.
    pub newly_failed: Vec<TaskName>,
    /// Tasks that reached `Skipped` in this step.
    pub newly_skipped: Vec<TaskName>,
    /// Whether every task is now terminal.
    pub run_just_finished: bool,
}
