// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, RawConfigFile, TaskKindConfig, WarehouseSection};
use crate::errors::{GraphValidationError, PipelineError, Result};
use crate::warehouse::ErrorClassifier;
use crate::warehouse::classify::{DEFAULT_PERMANENT_PATTERNS, DEFAULT_TRANSIENT_PATTERNS};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.pipeline.max_workers == 0 {
        return Err(PipelineError::ConfigError(
            "[pipeline].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }

    duration_field("[defaults].retry_delay", &cfg.defaults.retry_delay)?;
    duration_field("[defaults].max_retry_delay", &cfg.defaults.max_retry_delay)?;

    let multiplier = cfg.defaults.backoff_multiplier;
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(PipelineError::ConfigError(format!(
            "[defaults].backoff_multiplier must be >= 1.0 (got {multiplier})"
        )));
    }

    if cfg.warehouse.command.trim().is_empty() {
        return Err(PipelineError::ConfigError(
            "[warehouse].command must not be empty".to_string(),
        ));
    }
    if cfg.warehouse.field_separator.is_empty() {
        return Err(PipelineError::ConfigError(
            "[warehouse].field_separator must not be empty".to_string(),
        ));
    }
    // Compile once here so a bad pattern fails at load time.
    warehouse_classifier(&cfg.warehouse)?;

    Ok(())
}

/// Error classifier described by `[warehouse]`, falling back to the built-in
/// pattern lists.
pub(crate) fn warehouse_classifier(section: &WarehouseSection) -> Result<ErrorClassifier> {
    let owned = |d: &[&str]| d.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let transient = section
        .transient_patterns
        .clone()
        .unwrap_or_else(|| owned(DEFAULT_TRANSIENT_PATTERNS));
    let permanent = section
        .permanent_patterns
        .clone()
        .unwrap_or_else(|| owned(DEFAULT_PERMANENT_PATTERNS));
    ErrorClassifier::new(transient.as_slice(), permanent.as_slice())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if let Some(delay) = &task.retry_delay {
            duration_field(&format!("[task.{name}].retry_delay"), delay)?;
        }

        let blank = |field: &str, value: &str| -> Result<()> {
            if value.trim().is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "task '{name}': `{field}` must not be empty"
                )));
            }
            Ok(())
        };

        match &task.kind {
            TaskKindConfig::Noop => {}
            TaskKindConfig::Staging(s) => {
                blank("bucket", &s.bucket)?;
                blank("table", &s.table)?;
            }
            TaskKindConfig::Fact(l) => {
                blank("statement", &l.statement)?;
                blank("table", &l.table)?;
            }
            TaskKindConfig::Dimension(d) => {
                blank("statement", &d.statement)?;
                blank("table", &d.table)?;
            }
            TaskKindConfig::Quality(q) => {
                for (i, check) in q.checks.iter().enumerate() {
                    blank(&format!("checks[{i}].sql"), &check.sql)?;
                }
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(GraphValidationError::SelfDependency(name.clone()).into());
            }
            if !cfg.task.contains_key(dep) {
                return Err(GraphValidationError::UnknownDependency {
                    task: name.clone(),
                    dependency: dep.clone(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(GraphValidationError::Cycle(cycle.node_id().to_string()).into()),
    }
}

fn duration_field(field: &str, value: &str) -> Result<()> {
    parse_duration(value)
        .map(|_| ())
        .map_err(|e| PipelineError::ConfigError(format!("{field}: {e}")))
}
