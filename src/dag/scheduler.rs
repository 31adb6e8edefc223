use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{StateManager, deps_satisfied};
use crate::dag::task_info::{ScheduledTask, TaskInfo};
use crate::engine::report::TaskReport;
use crate::errors::TaskError;
use crate::tasks::{TaskName, TaskOutput};
use crate::types::TaskStatus;

/// Per-run state machine over a validated [`DagGraph`].
///
/// The scheduler never runs anything itself. It is fed attempt events and
/// answers with the attempts that should be dispatched next:
///
/// ```text
/// Pending -> Queued -> Running -> Succeeded
///                              -> Retrying -> Running ...   (retriable error, attempts left)
///                              -> Failed                    (fatal error or attempts exhausted)
/// Pending -> Skipped                                        (upstream failed, or cancelled)
/// Queued  -> Skipped                                        (cancelled before a slot freed up)
/// ```
///
/// Terminal states never change once set.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    tasks: HashMap<TaskName, TaskInfo>,
    cancelled: bool,
}

impl Scheduler {
    pub fn new(graph: DagGraph) -> Self {
        let tasks = graph
            .tasks()
            .filter_map(|name| {
                let task = graph.task(name)?;
                let deps = graph.dependencies_of(name).to_vec();
                Some((name.to_string(), TaskInfo::new(task.clone(), deps)))
            })
            .collect();

        Self {
            graph,
            tasks,
            cancelled: false,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    /// Dispatch the root tasks.
    pub fn start(&mut self) -> SchedulerStep {
        debug!(tasks = self.tasks.len(), "scheduler: starting run");
        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        let newly_scheduled = manager.collect_new_ready_tasks();
        SchedulerStep {
            newly_scheduled,
            run_just_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }

    /// Every task has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.tasks.values().all(|info| info.status.is_terminal())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.tasks.get(task).map(|info| info.status)
    }

    pub fn attempts_of(&self, task: &str) -> Option<u32> {
        self.tasks.get(task).map(|info| info.attempts)
    }

    /// Whether the dependencies of `task` have all succeeded. `None` for
    /// unknown tasks.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        Some(deps_satisfied(&self.tasks, info))
    }

    /// A worker acquired a slot for attempt `attempt` of `task`; the task
    /// is `Running` from here on.
    pub fn attempt_started(&mut self, task: &str, attempt: u32) {
        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, "start of unknown task; ignoring");
            return;
        };
        match info.status {
            TaskStatus::Queued | TaskStatus::Retrying => {
                info.status = TaskStatus::Running;
                info.attempts = info.attempts.max(attempt);
                debug!(task = %task, attempt, "attempt started");
            }
            other => {
                warn!(task = %task, attempt, status = %other, "attempt started for task in unexpected state");
            }
        }
    }

    /// Attempt `attempt` of `task` finished with `outcome`.
    pub fn attempt_finished(
        &mut self,
        task: &str,
        attempt: u32,
        outcome: Result<TaskOutput, TaskError>,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let cancelled = self.cancelled;

        let Some(info) = self.tasks.get_mut(task) else {
            warn!(task = %task, "completion for unknown task; ignoring");
            return step;
        };
        if info.status.is_terminal() {
            warn!(task = %task, attempt, status = %info.status, "completion for terminal task; ignoring");
            return step;
        }
        info.attempts = info.attempts.max(attempt);

        match outcome {
            Ok(output) => {
                info!(task = %task, attempt, "task succeeded");
                info.status = TaskStatus::Succeeded;
                info.output = Some(output);
                info.last_error = None;
                if !cancelled {
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                    step.newly_scheduled = manager.collect_new_ready_tasks();
                }
            }
            Err(err) => {
                let policy = *info.task.retry_policy();
                let retry = !cancelled && err.is_retriable() && policy.allows_retry(info.attempts);

                if retry {
                    let delay = policy.delay_after(info.attempts);
                    warn!(
                        task = %task,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed; retrying after backoff"
                    );
                    info.status = TaskStatus::Retrying;
                    info.last_error = Some(err);
                    step.newly_scheduled.push(ScheduledTask::retry(info, delay));
                    step.newly_retrying.push(task.to_string());
                } else {
                    warn!(
                        task = %task,
                        attempt,
                        retriable = err.is_retriable(),
                        error = %err,
                        "task failed; skipping dependents"
                    );
                    info.status = TaskStatus::Failed;
                    info.last_error = Some(err);
                    step.newly_failed.push(task.to_string());
                    let mut manager = StateManager::new(&self.graph, &mut self.tasks);
                    step.newly_skipped = manager.mark_dependents_skipped(task);
                }
            }
        }

        step.run_just_finished = self.is_finished();
        step
    }

    /// A dispatched attempt was dropped before it started (cancellation).
    ///
    /// A task waiting out a retry backoff fails with its last error; a task
    /// that never started is skipped.
    pub fn attempt_abandoned(&mut self, task: &str, attempt: u32) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        let Some(info) = self.tasks.get_mut(task) else {
            return step;
        };

        match info.status {
            TaskStatus::Retrying => {
                info!(task = %task, attempt, "retry abandoned; task failed");
                info.status = TaskStatus::Failed;
                step.newly_failed.push(task.to_string());
            }
            TaskStatus::Queued => {
                info!(task = %task, attempt, "dispatch abandoned before start; task skipped");
                info.status = TaskStatus::Skipped;
                step.newly_skipped.push(task.to_string());
            }
            _ => return step,
        }

        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        step.newly_skipped.extend(manager.mark_dependents_skipped(task));
        step.run_just_finished = self.is_finished();
        step
    }

    /// Stop scheduling: pending tasks are skipped, no new attempts or retries
    /// will be produced. Attempts already running are left to finish.
    pub fn cancel(&mut self) -> SchedulerStep {
        if self.cancelled {
            return SchedulerStep::default();
        }
        self.cancelled = true;
        let mut manager = StateManager::new(&self.graph, &mut self.tasks);
        let newly_skipped = manager.skip_all_pending();
        info!(skipped = newly_skipped.len(), "scheduler: run cancelled");
        SchedulerStep {
            newly_skipped,
            run_just_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }

    /// Per-task reports, keyed by task name.
    pub fn reports(&self) -> BTreeMap<TaskName, TaskReport> {
        self.tasks
            .iter()
            .map(|(name, info)| {
                (
                    name.clone(),
                    TaskReport {
                        kind: info.task.kind(),
                        status: info.status,
                        attempts: info.attempts,
                        error: info.last_error.clone(),
                        output: info.output.clone(),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dag::{Dag, RetryPolicy};
    use crate::errors::{ErrorClass, WarehouseError};
    use crate::tasks::{NoopTask, TaskSpec};

    fn noop(name: &str, deps: &[&str], retries: u32) -> NoopTask {
        NoopTask::new(
            TaskSpec::new(name)
                .after(deps.iter().copied())
                .with_retry(RetryPolicy::with_retries(retries, Duration::from_secs(1))),
        )
    }

    /// start -> {a, b} -> join
    fn scheduler(retries: u32) -> Scheduler {
        let dag = Dag::new()
            .with_task(noop("start", &[], retries))
            .with_task(noop("a", &["start"], retries))
            .with_task(noop("b", &["start"], retries))
            .with_task(noop("join", &["a", "b"], retries));
        Scheduler::new(dag.validate().unwrap())
    }

    fn names(step: &SchedulerStep) -> Vec<String> {
        let mut n: Vec<String> = step.newly_scheduled.iter().map(|t| t.name.clone()).collect();
        n.sort();
        n
    }

    fn transient() -> TaskError {
        TaskError::from_warehouse("COPY x", WarehouseError::transient("throttled"))
    }

    #[test]
    fn fan_out_and_fan_in() {
        let mut s = scheduler(0);
        assert_eq!(names(&s.start()), vec!["start"]);

        let step = s.attempt_finished("start", 1, Ok(TaskOutput::Done));
        assert_eq!(names(&step), vec!["a", "b"]);

        let step = s.attempt_finished("a", 1, Ok(TaskOutput::Done));
        assert!(step.newly_scheduled.is_empty(), "join must wait for b");
        assert_eq!(s.deps_satisfied("join"), Some(false));

        let step = s.attempt_finished("b", 1, Ok(TaskOutput::Done));
        assert_eq!(names(&step), vec!["join"]);

        let step = s.attempt_finished("join", 1, Ok(TaskOutput::Done));
        assert!(step.run_just_finished);
        assert!(s.is_finished());
    }

    #[test]
    fn dispatched_tasks_are_queued_until_a_worker_starts_them() {
        let mut s = scheduler(0);
        s.start();
        s.attempt_finished("start", 1, Ok(TaskOutput::Done));
        assert_eq!(s.status_of("a"), Some(TaskStatus::Queued));
        assert_eq!(s.attempts_of("a"), Some(0));

        s.attempt_started("a", 1);
        assert_eq!(s.status_of("a"), Some(TaskStatus::Running));
        assert_eq!(s.attempts_of("a"), Some(1));

        // Cancelled before a slot freed up: never ran, so skipped.
        s.cancel();
        let step = s.attempt_abandoned("b", 1);
        assert_eq!(step.newly_skipped, vec!["b"]);
        assert_eq!(s.status_of("b"), Some(TaskStatus::Skipped));
        assert_eq!(s.status_of("a"), Some(TaskStatus::Running));
    }

    #[test]
    fn retriable_failure_schedules_a_delayed_retry() {
        let mut s = scheduler(2);
        s.start();
        s.attempt_started("start", 1);

        let step = s.attempt_finished("start", 1, Err(transient()));
        assert_eq!(step.newly_retrying, vec!["start"]);
        let retry = &step.newly_scheduled[0];
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.delay, Some(Duration::from_secs(1)));
        assert_eq!(s.status_of("start"), Some(TaskStatus::Retrying));

        s.attempt_started("start", 2);
        assert_eq!(s.status_of("start"), Some(TaskStatus::Running));
        s.attempt_finished("start", 2, Ok(TaskOutput::Done));
        assert_eq!(s.status_of("start"), Some(TaskStatus::Succeeded));
        assert_eq!(s.attempts_of("start"), Some(2));
    }

    #[test]
    fn exhausted_retries_fail_and_skip_downstream() {
        let mut s = scheduler(1);
        s.start();
        s.attempt_finished("start", 1, Ok(TaskOutput::Done));
        s.attempt_finished("a", 1, Err(transient()));
        let step = s.attempt_finished("a", 2, Err(transient()));

        assert_eq!(step.newly_failed, vec!["a"]);
        assert_eq!(step.newly_skipped, vec!["join"]);
        assert_eq!(s.attempts_of("a"), Some(2));
        assert_eq!(s.status_of("b"), Some(TaskStatus::Queued));
        assert!(!s.is_finished());

        s.attempt_finished("b", 1, Ok(TaskOutput::Done));
        assert!(s.is_finished());
        assert_eq!(s.status_of("join"), Some(TaskStatus::Skipped));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut s = scheduler(5);
        s.start();
        let err = TaskError::WarehouseStatement {
            statement: "COPY x".into(),
            message: "syntax error".into(),
            class: ErrorClass::Permanent,
        };
        let step = s.attempt_finished("start", 1, Err(err));
        assert_eq!(step.newly_failed, vec!["start"]);
        let mut skipped = step.newly_skipped.clone();
        skipped.sort();
        assert_eq!(skipped, vec!["a", "b", "join"]);
        assert!(step.run_just_finished);
    }

    #[test]
    fn terminal_status_is_immutable() {
        let mut s = scheduler(0);
        s.start();
        s.attempt_finished("start", 1, Ok(TaskOutput::Done));
        let step = s.attempt_finished("start", 1, Err(transient()));
        assert!(step.newly_failed.is_empty());
        assert_eq!(s.status_of("start"), Some(TaskStatus::Succeeded));
    }

    #[test]
    fn cancel_skips_pending_and_stops_retries() {
        let mut s = scheduler(3);
        s.start();
        s.attempt_started("start", 1);
        let step = s.cancel();
        let mut skipped = step.newly_skipped.clone();
        skipped.sort();
        assert_eq!(skipped, vec!["a", "b", "join"]);

        // The in-flight attempt still reports; no retry follows.
        let step = s.attempt_finished("start", 1, Err(transient()));
        assert!(step.newly_scheduled.is_empty());
        assert_eq!(s.status_of("start"), Some(TaskStatus::Failed));
        assert!(s.is_finished());
    }
}
