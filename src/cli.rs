// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, ValueEnum};

use crate::config::loader::default_config_path;

/// Command-line arguments for `stardag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stardag",
    version,
    about = "Run a star-schema ETL pipeline (staging, fact and dimension loads, quality gate) as a DAG.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logical date of the run (RFC 3339 or YYYY-MM-DD). Defaults to now.
    #[arg(long, value_name = "DATE", value_parser = parse_execution_date)]
    pub execution_date: Option<DateTime<Utc>>,

    /// Extra template parameter for key patterns, as `key=value`. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Override `[pipeline].max_workers`.
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STARDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't touch the warehouse.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Accept a full RFC 3339 timestamp or a bare date (midnight UTC).
pub fn parse_execution_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid execution date '{s}': expected RFC 3339 or YYYY-MM-DD"))
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("invalid parameter '{s}': expected KEY=VALUE")),
    }
}
