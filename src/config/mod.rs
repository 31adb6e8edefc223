// src/config/mod.rs

//! Configuration loading and validation for stardag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants like DAG correctness and durations (`validate.rs`).
//! - Turn a validated config into a `Dag`, a warehouse client and executor
//!   options (`build.rs`).

pub mod build;
pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::{build_dag, build_warehouse, executor_options, retry_policy_for};
pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    CheckConfig, ConfigFile, DefaultsSection, DimensionTaskConfig, LoadTaskConfig,
    ObjectStoreSection, PipelineSection, QualityTaskConfig, RawConfigFile, StagingTaskConfig,
    TaskConfig, TaskKindConfig, WarehouseSection,
};
