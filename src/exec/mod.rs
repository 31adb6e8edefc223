// src/exec/mod.rs

//! Attempt execution layer.
//!
//! This module is responsible for actually running task attempts on tokio
//! tasks, bounded by the worker limit, and reporting back to the
//! orchestration runtime via `RuntimeEvent`s.
//!
//! - [`worker_pool`] owns the semaphore and spawns one tokio task per attempt.
//! - [`task_runner`] handles a single attempt: backoff, slot acquisition,
//!   the `Task::run` call and the completion event.
//! - [`backend`] provides the `ExecutorBackend` trait the runtime talks to,
//!   which tests can replace with a fake implementation.

pub mod backend;
pub mod task_runner;
pub mod worker_pool;

pub use backend::ExecutorBackend;
pub use worker_pool::WorkerPool;
