// src/dag/task_info.rs

//! Per-run task state and dispatch descriptions.

use std::sync::Arc;
use std::time::Duration;

use crate::errors::TaskError;
use crate::tasks::{Task, TaskName, TaskOutput};
use crate::types::TaskStatus;

/// Mutable state of one task during one run. Owned by the scheduler and
/// discarded with it.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub task: Arc<dyn Task>,
    /// Direct dependencies.
    pub deps: Vec<TaskName>,
    pub status: TaskStatus,
    /// Attempts actually started.
    pub attempts: u32,
    /// Error of the most recent failed attempt.
    pub last_error: Option<TaskError>,
    pub output: Option<TaskOutput>,
}

impl TaskInfo {
    pub fn new(task: Arc<dyn Task>, deps: Vec<TaskName>) -> Self {
        Self {
            name: task.name().to_string(),
            task,
            deps,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            output: None,
        }
    }
}

/// An attempt the scheduler wants the worker pool to run.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub task: Arc<dyn Task>,
    /// 1-based attempt number this dispatch will be.
    pub attempt: u32,
    /// Backoff to wait before starting (retries only).
    pub delay: Option<Duration>,
}

impl ScheduledTask {
    pub fn first_attempt(info: &TaskInfo) -> Self {
        Self {
            name: info.name.clone(),
            task: Arc::clone(&info.task),
            attempt: info.attempts + 1,
            delay: None,
        }
    }

    pub fn retry(info: &TaskInfo, delay: Duration) -> Self {
        Self {
            name: info.name.clone(),
            task: Arc::clone(&info.task),
            attempt: info.attempts + 1,
            delay: Some(delay),
        }
    }
}
