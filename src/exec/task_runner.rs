// src/exec/task_runner.rs

//! Individual attempt runner.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::context::RunContext;
use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, cancelled};
use crate::errors::TaskError;
use crate::object_store::ObjectStore;
use crate::tasks::TaskContext;
use crate::warehouse::Warehouse;

/// Everything shared by the attempts of one run.
pub struct AttemptEnv {
    pub(crate) slots: Arc<Semaphore>,
    pub(crate) events: mpsc::Sender<RuntimeEvent>,
    pub(crate) cancel: watch::Receiver<bool>,
    pub(crate) run: Arc<RunContext>,
    pub(crate) warehouse: Arc<dyn Warehouse>,
    pub(crate) object_store: Arc<dyn ObjectStore>,
}

/// Run one attempt and report it.
///
/// - Sleeps through the retry delay, then waits for a worker slot. If the run
///   is cancelled during either wait, `AttemptAbandoned` is sent and the task
///   never runs.
/// - `AttemptStarted` is sent only once the slot is held.
/// - Once started, the attempt always runs to completion; cancellation does
///   not interrupt a statement mid-flight.
/// - A panic inside `Task::run` is reported as a failed attempt.
pub async fn run_attempt(task: ScheduledTask, env: &AttemptEnv) {
    let mut cancel = env.cancel.clone();

    if let Some(delay) = task.delay.filter(|d| !d.is_zero()) {
        debug!(task = %task.name, attempt = task.attempt, delay_ms = delay.as_millis() as u64, "waiting out retry backoff");
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                abandon(&task, env).await;
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    let permit = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => None,
        permit = Arc::clone(&env.slots).acquire_owned() => permit.ok(),
    };
    let Some(permit) = permit else {
        abandon(&task, env).await;
        return;
    };
    debug!(task = %task.name, attempt = task.attempt, "worker slot acquired");

    // The scheduler keeps the task `Queued` (or `Retrying`) until this event.
    send(
        env,
        RuntimeEvent::AttemptStarted {
            task: task.name.clone(),
            attempt: task.attempt,
        },
    )
    .await;

    info!(
        task = %task.name,
        attempt = task.attempt,
        kind = ?task.task.kind(),
        "starting attempt"
    );

    let ctx = TaskContext {
        run: Arc::clone(&env.run),
        warehouse: Arc::clone(&env.warehouse),
        object_store: Arc::clone(&env.object_store),
        attempt: task.attempt,
    };
    let runnable = Arc::clone(&task.task);
    let result = match tokio::spawn(async move { runnable.run(&ctx).await }).await {
        Ok(result) => result,
        Err(join_err) => {
            error!(task = %task.name, attempt = task.attempt, error = %join_err, "attempt panicked");
            Err(TaskError::Other(format!("task panicked: {join_err}")))
        }
    };
    drop(permit);

    match &result {
        Ok(output) => info!(task = %task.name, attempt = task.attempt, ?output, "attempt succeeded"),
        Err(err) => warn!(task = %task.name, attempt = task.attempt, error = %err, "attempt failed"),
    }

    send(
        env,
        RuntimeEvent::AttemptFinished {
            task: task.name,
            attempt: task.attempt,
            result,
        },
    )
    .await;
}

async fn abandon(task: &ScheduledTask, env: &AttemptEnv) {
    info!(task = %task.name, attempt = task.attempt, "run cancelled; attempt not started");
    send(
        env,
        RuntimeEvent::AttemptAbandoned {
            task: task.name.clone(),
            attempt: task.attempt,
        },
    )
    .await;
}

async fn send(env: &AttemptEnv, event: RuntimeEvent) {
    if env.events.send(event).await.is_err() {
        debug!("runtime dropped its event receiver; discarding event");
    }
}
