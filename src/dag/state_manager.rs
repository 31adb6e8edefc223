// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::dag::task_info::{ScheduledTask, TaskInfo};
use crate::tasks::TaskName;
use crate::types::TaskStatus;

/// Applies state transitions to the scheduler's task map.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a DagGraph, tasks: &'a mut HashMap<TaskName, TaskInfo>) -> Self {
        Self { graph, tasks }
    }

    /// Mark every pending task downstream of `failed` as `Skipped`.
    ///
    /// Returns the tasks newly skipped, excluding `failed` itself.
    pub fn mark_dependents_skipped(&mut self, failed: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed).to_vec();
        let mut skipped = Vec::new();

        while let Some(name) = stack.pop() {
            let Some(info) = self.tasks.get_mut(&name) else {
                warn!(task = %name, "node in DAG not present in task map");
                continue;
            };
            match info.status {
                TaskStatus::Pending => {
                    info.status = TaskStatus::Skipped;
                    debug!(task = %info.name, upstream = %failed, "skipping task due to upstream failure");
                    skipped.push(info.name.clone());
                    stack.extend(self.graph.dependents_of(&name).iter().cloned());
                }
                // Cannot be running: its dependency never succeeded.
                TaskStatus::Queued | TaskStatus::Running | TaskStatus::Retrying => {
                    warn!(task = %info.name, upstream = %failed, "dependent of failed task is already active");
                }
                TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped => {}
            }
        }

        skipped
    }

    /// Mark every still-pending task as `Skipped` (cancellation).
    pub fn skip_all_pending(&mut self) -> Vec<TaskName> {
        let mut skipped = Vec::new();
        for name in self.graph.tasks() {
            if let Some(info) = self.tasks.get_mut(name) {
                if info.status == TaskStatus::Pending {
                    info.status = TaskStatus::Skipped;
                    skipped.push(info.name.clone());
                }
            }
        }
        skipped
    }

    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        deps_satisfied(self.tasks, info)
    }

    /// Mark pending tasks whose dependencies all succeeded as `Queued` and
    /// return them for dispatch, in topological order. They become `Running`
    /// once a worker reports the attempt started.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let candidates: Vec<TaskName> = self
            .graph
            .tasks()
            .filter(|name| {
                self.tasks.get(*name).is_some_and(|info| {
                    info.status == TaskStatus::Pending && self.deps_satisfied_for_info(info)
                })
            })
            .map(str::to_string)
            .collect();

        let mut ready = Vec::with_capacity(candidates.len());
        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                info!(task = %info.name, "dependencies satisfied; scheduling task");
                info.status = TaskStatus::Queued;
                ready.push(ScheduledTask::first_attempt(info));
            }
        }
        ready
    }
}

/// All direct dependencies of `info` have succeeded in this run.
pub fn deps_satisfied(tasks: &HashMap<TaskName, TaskInfo>, info: &TaskInfo) -> bool {
    info.deps.iter().all(|dep| match tasks.get(dep) {
        Some(d) => d.status == TaskStatus::Succeeded,
        None => {
            warn!(task = %info.name, dep = %dep, "dependency missing from task map");
            false
        }
    })
}
