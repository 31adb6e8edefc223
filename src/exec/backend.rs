// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning attempts
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`super::worker_pool`].

use std::future::Future;
use std::pin::Pin;

use crate::dag::ScheduledTask;
use crate::errors::Result;

/// Trait abstracting how scheduled attempts are executed.
///
/// Every dispatched attempt must eventually be answered with exactly one
/// `AttemptFinished` or `AttemptAbandoned` event, or the run never ends.
pub trait ExecutorBackend: Send {
    /// Dispatch the given attempts for execution. Must not wait for them.
    fn dispatch(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}
