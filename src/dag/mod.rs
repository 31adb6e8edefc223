// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the caller's task definitions and validates them into
//!   an acyclic [`DagGraph`].
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready, which are retried and which are skipped.
//! - [`retry`] defines the per-task retry policy.
//! - [`task_info`] provides per-run task state and dispatch descriptions.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod retry;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_info;

pub use graph::{Dag, DagGraph};
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use task_info::{ScheduledTask, TaskInfo};
