// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{Comparator, ScalarValue, SourceFormat};
use crate::warehouse::command::DEFAULT_FIELD_SEPARATOR;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// name = "sparkify_etl"
/// max_workers = 4
///
/// [defaults]
/// retries = 3
/// retry_delay = "5m"
/// database = "dev"
///
/// [task.Stage_events]
/// kind = "staging"
/// after = ["Begin_execution"]
/// bucket = "s3://udacity-dend/"
/// key = "log_data"
/// table = "staging_events"
/// ```
///
/// All sections except `[task.*]` are optional and have reasonable defaults.
/// This is the unvalidated form; see [`ConfigFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub object_store: ObjectStoreSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A configuration that passed validation.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)` (or the
/// loader), so holders can rely on a well-formed DAG and parseable durations.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub defaults: DefaultsSection,
    pub warehouse: WarehouseSection,
    pub object_store: ObjectStoreSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            pipeline: raw.pipeline,
            defaults: raw.defaults,
            warehouse: raw.warehouse,
            object_store: raw.object_store,
            task: raw.task,
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_pipeline_name")]
    pub name: String,

    /// Maximum number of task attempts running at once.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_pipeline_name() -> String {
    "stardag".to_string()
}

fn default_max_workers() -> usize {
    4
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            max_workers: default_max_workers(),
        }
    }
}

/// `[defaults]` section: values every task inherits unless it overrides them.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    /// Extra attempts after the first one.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Duration string (`"250ms"`, `"30s"`, `"5m"`, `"1h"`).
    #[serde(default = "default_retry_delay")]
    pub retry_delay: String,

    /// `1.0` keeps the delay fixed.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Cap for exponential backoff.
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay: String,

    /// Optional database prefix for table names.
    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> String {
    "5m".to_string()
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_retry_delay() -> String {
    "1h".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            retry_delay: default_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_retry_delay: default_max_retry_delay(),
            database: None,
            schema: default_schema(),
        }
    }
}

/// `[warehouse]` section: how statements reach the warehouse.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseSection {
    /// Client program run once per statement.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments placed before the statement. `None` means the default
    /// `psql` flags.
    #[serde(default)]
    pub args: Option<Vec<String>>,

    /// Column separator in the client's output. Custom `args` must print
    /// with the same separator and with `NULL` as `\N`.
    #[serde(default = "default_field_separator")]
    pub field_separator: String,

    /// Regexes (case-insensitive) marking an error as transient. Replace the
    /// built-in list when set.
    #[serde(default)]
    pub transient_patterns: Option<Vec<String>>,

    /// Regexes marking an error as permanent.
    #[serde(default)]
    pub permanent_patterns: Option<Vec<String>>,
}

fn default_command() -> String {
    "psql".to_string()
}

fn default_field_separator() -> String {
    DEFAULT_FIELD_SEPARATOR.to_string()
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: None,
            field_separator: default_field_separator(),
            transient_patterns: None,
            permanent_patterns: None,
        }
    }
}

/// `[object_store]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreSection {
    /// Credential reference used by staging tasks that don't name one.
    #[serde(default = "default_credentials")]
    pub credentials: String,
}

fn default_credentials() -> String {
    "aws_credentials".to_string()
}

impl Default for ObjectStoreSection {
    fn default() -> Self {
        Self {
            credentials: default_credentials(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Dependency list: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Overrides `defaults.retries`.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Overrides `defaults.retry_delay`.
    #[serde(default)]
    pub retry_delay: Option<String>,

    #[serde(flatten)]
    pub kind: TaskKindConfig,
}

/// Variant-specific parameters, selected by `kind = "..."`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskKindConfig {
    Noop,
    Staging(StagingTaskConfig),
    Fact(LoadTaskConfig),
    Dimension(DimensionTaskConfig),
    Quality(QualityTaskConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StagingTaskConfig {
    #[serde(alias = "s3_bucket")]
    pub bucket: String,

    /// Key inside the bucket; `{ds}`, `{year}`, ... are filled in per run.
    #[serde(alias = "s3_key")]
    pub key: String,

    #[serde(default, alias = "source_format")]
    pub format: SourceFormat,

    #[serde(default, alias = "copy_format_option")]
    pub copy_options: Option<String>,

    /// Overrides `object_store.credentials`.
    #[serde(default, alias = "aws_credentials")]
    pub credentials: Option<String>,

    #[serde(alias = "destination_table")]
    pub table: String,

    #[serde(default, alias = "destination_schema")]
    pub schema: Option<String>,

    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadTaskConfig {
    /// Select statement whose rows are inserted.
    #[serde(alias = "sql_stmt")]
    pub statement: String,

    #[serde(alias = "destination_table")]
    pub table: String,

    #[serde(default, alias = "destination_schema")]
    pub schema: Option<String>,

    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DimensionTaskConfig {
    #[serde(alias = "sql_stmt")]
    pub statement: String,

    #[serde(alias = "destination_table")]
    pub table: String,

    #[serde(default, alias = "destination_schema")]
    pub schema: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    #[serde(default = "default_truncate", alias = "delete_load")]
    pub truncate_before_load: bool,
}

fn default_truncate() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct QualityTaskConfig {
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

/// One `[[task.<name>.checks]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckConfig {
    #[serde(alias = "test_sql")]
    pub sql: String,

    #[serde(alias = "expected_result")]
    pub expected: ScalarValue,

    #[serde(default = "default_comparator", alias = "comparison")]
    pub comparator: Comparator,
}

fn default_comparator() -> Comparator {
    Comparator::Equal
}
