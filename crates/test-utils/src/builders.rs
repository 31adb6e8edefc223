#![allow(dead_code)]

use std::time::Duration;

use stardag::config::{
    ConfigFile, RawConfigFile, TaskConfig, TaskKindConfig, build_dag, parse_str,
};
use stardag::context::RunContext;
use stardag::dag::{Dag, RetryPolicy};
use stardag::errors::{TaskError, WarehouseError};
use stardag::tasks::TaskSpec;
use stardag::types::ScalarValue;
use stardag::warehouse::{MemoryWarehouse, Row};

/// The reference pipeline shipped with the crate.
pub const SPARKIFY_TOML: &str = include_str!("../../../configs/sparkify_etl.toml");

pub const SPARKIFY_TASKS: [&str; 10] = [
    "Begin_execution",
    "Stage_events",
    "Stage_songs",
    "Load_songplays_fact_table",
    "Load_user_dim_table",
    "Load_song_dim_table",
    "Load_artist_dim_table",
    "Load_time_dim_table",
    "Run_data_quality_checks",
    "Stop_execution",
];

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    /// Start from TOML text instead of an empty config.
    pub fn from_toml(text: &str) -> Self {
        Self {
            config: parse_str(text).expect("test TOML must parse"),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.config.pipeline.max_workers = n;
        self
    }

    pub fn with_retries(mut self, retries: u32, delay: &str) -> Self {
        self.config.defaults.retries = retries;
        self.config.defaults.retry_delay = delay.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn noop() -> Self {
        Self {
            task: TaskConfig {
                after: vec![],
                retries: None,
                retry_delay: None,
                kind: TaskKindConfig::Noop,
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// `TaskSpec` with `retries` extra attempts and no backoff.
pub fn spec(name: &str, deps: &[&str], retries: u32) -> TaskSpec {
    TaskSpec::new(name)
        .after(deps.iter().copied())
        .with_retry(RetryPolicy::with_retries(retries, Duration::ZERO))
}

pub fn run_context() -> RunContext {
    let date = stardag::cli::parse_execution_date("2018-11-01").expect("valid date");
    RunContext::new(date).with_run_id("test_run")
}

pub fn transient(msg: &str) -> TaskError {
    TaskError::from_warehouse("SELECT 1", WarehouseError::transient(msg))
}

pub fn permanent(msg: &str) -> TaskError {
    TaskError::from_warehouse("SELECT 1", WarehouseError::permanent(msg))
}

pub fn int_rows(values: &[i64]) -> Vec<Row> {
    values.iter().map(|v| vec![ScalarValue::Int(*v)]).collect()
}

/// The reference config with retry delays shortened for tests.
pub fn sparkify_config(retries: u32) -> ConfigFile {
    ConfigFileBuilder::from_toml(SPARKIFY_TOML)
        .with_retries(retries, "10ms")
        .build()
}

/// The reference DAG, built through the config layer.
pub fn sparkify_dag(retries: u32) -> Dag {
    build_dag(&sparkify_config(retries)).expect("reference DAG builds")
}

/// Seed `warehouse` so that every task of the reference DAG succeeds:
/// both S3 prefixes exist, every load select yields rows and the null-user
/// check returns zero.
pub fn seed_sparkify(warehouse: &MemoryWarehouse) {
    warehouse.add_source("s3://udacity-dend/log_data", int_rows(&[1, 2, 3]));
    warehouse.add_source("s3://udacity-dend/song_data", int_rows(&[1, 2]));

    let cfg = sparkify_config(0);
    for task in cfg.task.values() {
        match &task.kind {
            TaskKindConfig::Fact(l) => warehouse.add_select(&l.statement, int_rows(&[1, 2, 3])),
            TaskKindConfig::Dimension(d) => warehouse.add_select(&d.statement, int_rows(&[1, 2])),
            _ => {}
        }
    }
    warehouse.set_query_result(
        "SELECT COUNT(*) FROM songplays WHERE userid IS NULL",
        int_rows(&[0]),
    );
}
