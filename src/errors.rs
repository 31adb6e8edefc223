// src/errors.rs

//! Crate-wide error types.
//!
//! - [`PipelineError`] is what the loader and the executor return for problems
//!   that stop a run before (or instead of) producing a `PipelineResult`.
//! - [`GraphValidationError`] covers DAG shape problems; no task runs when one
//!   of these is returned.
//! - [`TaskError`] is the task-level taxonomy recorded in task reports.
//! - [`WarehouseError`] is what a warehouse collaborator reports; tasks turn it
//!   into a [`TaskError`] with the statement attached.

use std::fmt;

use thiserror::Error;

use crate::tasks::quality::CheckReport;
use crate::types::ScalarValue;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph validation error: {0}")]
    GraphValidation(#[from] GraphValidationError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Problems with the shape of a DAG, detected before any task starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphValidationError {
    #[error("DAG must contain at least one task")]
    EmptyDag,

    #[error("duplicate task name '{0}'")]
    DuplicateTask(String),

    #[error("task '{task}' has unknown dependency '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(String),

    #[error("cycle detected in task DAG involving task '{0}'")]
    Cycle(String),
}

/// How a warehouse failure should be treated by the retry machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Throttling, timeouts, dropped connections. Worth another attempt.
    Transient,
    /// Bad SQL, missing relations, malformed data. Retrying cannot help.
    Permanent,
    /// Nothing matched; retried up to the policy limit.
    Unclassified,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

/// Failure reported by a [`crate::warehouse::Warehouse`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WarehouseError {
    /// Could not reach the warehouse at all (spawn failure, refused connection).
    #[error("warehouse unreachable: {0}")]
    Io(String),

    /// The warehouse rejected or failed the statement.
    #[error("{class} statement error: {message}")]
    Statement { message: String, class: ErrorClass },
}

impl WarehouseError {
    pub fn transient(message: impl Into<String>) -> Self {
        WarehouseError::Statement {
            message: message.into(),
            class: ErrorClass::Transient,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        WarehouseError::Statement {
            message: message.into(),
            class: ErrorClass::Permanent,
        }
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        WarehouseError::Statement {
            message: message.into(),
            class: ErrorClass::Unclassified,
        }
    }
}

/// Task-level failure, as recorded in a task report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("cannot resolve template '{pattern}': missing field(s) {}", missing.join(", "))]
    TemplateResolution {
        pattern: String,
        missing: Vec<String>,
    },

    #[error("transient IO error: {0}")]
    TransientIo(String),

    #[error("{class} warehouse error: {message} (statement: {statement})")]
    WarehouseStatement {
        statement: String,
        message: String,
        class: ErrorClass,
    },

    #[error("{0}")]
    AssertionFailure(CheckReport),

    #[error("statement returned no rows where one scalar was expected: {statement}")]
    NoResult { statement: String },

    #[error("statement returned {found} where {expected} was expected: {statement}")]
    UnexpectedResult {
        statement: String,
        expected: &'static str,
        found: ScalarValue,
    },

    #[error("cannot resolve credentials '{0}'")]
    Credentials(String),

    #[error("{0}")]
    Other(String),
}

impl TaskError {
    /// Attach the failing statement to a warehouse error.
    pub fn from_warehouse(statement: &str, err: WarehouseError) -> Self {
        match err {
            WarehouseError::Io(msg) => TaskError::TransientIo(msg),
            WarehouseError::Statement { message, class } => TaskError::WarehouseStatement {
                statement: statement.to_string(),
                message,
                class,
            },
        }
    }

    /// Whether another attempt of the same task may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            TaskError::TransientIo(_) => true,
            TaskError::WarehouseStatement { class, .. } => *class != ErrorClass::Permanent,
            TaskError::TemplateResolution { .. }
            | TaskError::AssertionFailure(_)
            | TaskError::NoResult { .. }
            | TaskError::UnexpectedResult { .. }
            | TaskError::Credentials(_)
            | TaskError::Other(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
