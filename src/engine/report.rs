// src/engine/report.rs

//! Run results.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::TaskError;
use crate::tasks::{TaskKind, TaskName, TaskOutput};
use crate::types::{PipelineStatus, TaskStatus};

/// Terminal state of one task in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport {
    pub kind: TaskKind,
    pub status: TaskStatus,
    /// Attempts actually started.
    pub attempts: u32,
    /// Error of the last failed attempt; cleared when a retry succeeds.
    pub error: Option<TaskError>,
    pub output: Option<TaskOutput>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub status: PipelineStatus,
    pub cancelled: bool,
    pub task_reports: BTreeMap<TaskName, TaskReport>,
}

impl PipelineResult {
    /// Succeeded only when every task succeeded and the run was not cancelled.
    pub fn from_reports(task_reports: BTreeMap<TaskName, TaskReport>, cancelled: bool) -> Self {
        let all_ok = task_reports
            .values()
            .all(|r| r.status == TaskStatus::Succeeded);
        let status = if all_ok && !cancelled {
            PipelineStatus::Succeeded
        } else {
            PipelineStatus::Failed
        };
        Self {
            status,
            cancelled,
            task_reports,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    pub fn report(&self, task: &str) -> Option<&TaskReport> {
        self.task_reports.get(task)
    }

    pub fn failed_tasks(&self) -> Vec<&str> {
        self.with_status(TaskStatus::Failed)
    }

    pub fn skipped_tasks(&self) -> Vec<&str> {
        self.with_status(TaskStatus::Skipped)
    }

    /// `(task, error)` for every failed task.
    pub fn errors(&self) -> Vec<(&str, &TaskError)> {
        self.task_reports
            .iter()
            .filter(|(_, r)| r.status == TaskStatus::Failed)
            .filter_map(|(name, r)| r.error.as_ref().map(|e| (name.as_str(), e)))
            .collect()
    }

    fn with_status(&self, status: TaskStatus) -> Vec<&str> {
        self.task_reports
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline {}", self.status)?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        writeln!(f)?;

        let width = self
            .task_reports
            .keys()
            .map(String::len)
            .max()
            .unwrap_or(0);
        for (name, report) in &self.task_reports {
            write!(
                f,
                "  {name:<width$}  {:<9}  attempts={}",
                report.status.as_str(),
                report.attempts
            )?;
            match &report.output {
                Some(TaskOutput::RowsLoaded(n)) => write!(f, "  rows={n}")?,
                Some(TaskOutput::Checks(c)) => write!(f, "  checks={}", c.outcomes.len())?,
                _ => {}
            }
            if report.status == TaskStatus::Failed {
                if let Some(err) = &report.error {
                    write!(f, "\n    error: {err}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
