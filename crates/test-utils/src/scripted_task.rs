use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stardag::errors::TaskError;
use stardag::tasks::{Task, TaskContext, TaskFuture, TaskKind, TaskOutput, TaskSpec};

/// Shared record of task runs across a DAG.
///
/// Entries are `"start:<task>"` and `"end:<task>"` in the order they
/// happened. Also tracks how many scripted tasks were inside `run` at once.
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RunLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Tasks that started, in start order.
    pub fn started(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix("start:").map(str::to_string))
            .collect()
    }

    /// Position of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self, task: &str) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.entries.lock().unwrap().push(format!("start:{task}"));
    }

    fn leave(&self, task: &str) {
        self.entries.lock().unwrap().push(format!("end:{task}"));
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A task whose attempts follow a script.
///
/// Each call to `run` pops the next scripted outcome; once the script is
/// exhausted every further attempt succeeds with `TaskOutput::Done`.
#[derive(Debug)]
pub struct ScriptedTask {
    spec: TaskSpec,
    kind: TaskKind,
    script: Mutex<VecDeque<Result<TaskOutput, TaskError>>>,
    latency: Duration,
    calls: Arc<AtomicU32>,
    log: Option<Arc<RunLog>>,
}

impl ScriptedTask {
    pub fn new(spec: TaskSpec) -> Self {
        Self {
            spec,
            kind: TaskKind::Noop,
            script: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
            calls: Arc::new(AtomicU32::new(0)),
            log: None,
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    /// Next attempt fails with `error`.
    pub fn then_fail(self, error: TaskError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    /// Next `n` attempts fail with `error`.
    pub fn fail_times(self, n: u32, error: TaskError) -> Self {
        (0..n).fold(self, |task, _| task.then_fail(error.clone()))
    }

    /// Next attempt succeeds with `output`.
    pub fn then_succeed(self, output: TaskOutput) -> Self {
        self.script.lock().unwrap().push_back(Ok(output));
        self
    }

    /// Every `run` sleeps this long before returning.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_log(mut self, log: &Arc<RunLog>) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    /// Shared counter of `run` invocations; stays valid after the task is
    /// moved into a `Dag`.
    pub fn calls(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl Task for ScriptedTask {
    fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn run<'a>(&'a self, _ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.log {
                log.enter(&self.spec.name);
            }
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(TaskOutput::Done));
            if let Some(log) = &self.log {
                log.leave(&self.spec.name);
            }
            outcome
        })
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
