// src/tasks/noop.rs

use tracing::debug;

use super::{Task, TaskContext, TaskFuture, TaskKind, TaskOutput, TaskSpec};

/// Marker task used for the start and end points of a pipeline.
#[derive(Debug, Clone)]
pub struct NoopTask {
    spec: TaskSpec,
}

impl NoopTask {
    pub fn new(spec: TaskSpec) -> Self {
        Self { spec }
    }
}

impl Task for NoopTask {
    fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Noop
    }

    fn run<'a>(&'a self, _ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            debug!(task = %self.spec.name, "noop task reached");
            Ok(TaskOutput::Done)
        })
    }

    fn describe(&self) -> String {
        "noop".to_string()
    }
}
