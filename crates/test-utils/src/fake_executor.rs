use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use stardag::dag::ScheduledTask;
use stardag::engine::RuntimeEvent;
use stardag::errors::{Result, TaskError};
use stardag::exec::ExecutorBackend;
use stardag::tasks::TaskOutput;
use tracing::debug;

/// A fake executor that:
/// - records which attempts were dispatched (`name#attempt`)
/// - never calls `Task::run`
/// - immediately reports each attempt as finished, failing the attempts
///   scripted with [`FakeExecutor::fail`] and succeeding the rest.
pub struct FakeExecutor {
    runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failures: HashMap<(String, u32), TaskError>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failures: HashMap::new(),
        }
    }

    /// Fail attempt `attempt` of `task` with `error`.
    pub fn fail(mut self, task: &str, attempt: u32, error: TaskError) -> Self {
        self.failures.insert((task.to_string(), attempt), error);
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failures = self.failures.clone();

        Box::pin(async move {
            for t in tasks {
                executed
                    .lock()
                    .map_err(|e| anyhow::anyhow!("dispatch log poisoned: {e}"))?
                    .push(format!("{}#{}", t.name, t.attempt));
                debug!(task = %t.name, attempt = t.attempt, "fake executor: dispatched");

                let result = match failures.get(&(t.name.clone(), t.attempt)) {
                    Some(err) => Err(err.clone()),
                    None => Ok(TaskOutput::Done),
                };

                // Spawn so the runtime is never blocked on its own channel.
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx
                        .send(RuntimeEvent::AttemptStarted {
                            task: t.name.clone(),
                            attempt: t.attempt,
                        })
                        .await;
                    let _ = tx
                        .send(RuntimeEvent::AttemptFinished {
                            task: t.name,
                            attempt: t.attempt,
                            result,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}
