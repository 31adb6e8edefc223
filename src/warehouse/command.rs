// src/warehouse/command.rs

//! Warehouse backed by a command-line SQL client.
//!
//! Each statement spawns one client process (`psql` by default), which opens
//! its own connection and closes it on exit. Connection parameters come from
//! the client's usual environment (`PGHOST`, `PGUSER`, `PGPASSWORD`, ...).
//!
//! Output is read as one row per line, fields split on the unit separator
//! (`\x1f`) and `NULL` printed as [`NULL_MARKER`]. A text value containing a
//! newline or the separator itself cannot be told apart from a row or field
//! boundary.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::WarehouseError;
use crate::types::{NULL_MARKER, ScalarValue};

use super::classify::ErrorClassifier;
use super::{Row, Warehouse, WarehouseFuture};

/// ASCII unit separator; never appears in ordinary table data.
pub const DEFAULT_FIELD_SEPARATOR: &str = "\u{1f}";

/// Default `psql` flags: no rc file, unaligned tuples-only output split on
/// [`DEFAULT_FIELD_SEPARATOR`], `NULL` printed as [`NULL_MARKER`], stop on
/// the first error. The statement is appended after `-c`.
pub const DEFAULT_PSQL_ARGS: &[&str] = &[
    "-X",
    "-A",
    "-t",
    "-q",
    "-v",
    "ON_ERROR_STOP=1",
    "-F",
    DEFAULT_FIELD_SEPARATOR,
    "-P",
    "null=\\N",
    "-c",
];

#[derive(Debug, Clone)]
pub struct CommandWarehouse {
    program: String,
    args: Vec<String>,
    field_separator: String,
    classifier: ErrorClassifier,
}

impl CommandWarehouse {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        field_separator: impl Into<String>,
        classifier: ErrorClassifier,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            field_separator: field_separator.into(),
            classifier,
        }
    }

    /// `psql` with [`DEFAULT_PSQL_ARGS`] and the default classifier.
    pub fn psql() -> Self {
        Self::new(
            "psql",
            DEFAULT_PSQL_ARGS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_FIELD_SEPARATOR,
            ErrorClassifier::default(),
        )
    }

    async fn run(&self, statement: &str) -> Result<String, WarehouseError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(statement)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = cmd.output().await.map_err(|e| {
            WarehouseError::Io(format!("spawning '{}': {e}", self.program))
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!(program = %self.program, "stderr: {}", line);
        }

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let message = if stderr.trim().is_empty() {
            format!("'{}' exited with {}", self.program, output.status)
        } else {
            stderr.trim().to_string()
        };
        let class = self.classifier.classify(&message);
        warn!(
            program = %self.program,
            exit_code = output.status.code().unwrap_or(-1),
            %class,
            "warehouse client reported an error"
        );
        Err(WarehouseError::Statement { message, class })
    }

    /// Every line is a row, including empty ones: a single-column `''` prints
    /// as an empty line.
    fn parse_rows(&self, stdout: &str) -> Vec<Row> {
        if stdout.is_empty() {
            return Vec::new();
        }
        let body = stdout.strip_suffix('\n').unwrap_or(stdout);
        body.split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .map(|line| {
                line.split(self.field_separator.as_str())
                    .map(ScalarValue::parse_field)
                    .collect()
            })
            .collect()
    }
}

impl Warehouse for CommandWarehouse {
    fn execute<'a>(&'a self, statement: &'a str) -> WarehouseFuture<'a, ()> {
        Box::pin(async move {
            self.run(statement).await?;
            Ok(())
        })
    }

    fn query<'a>(&'a self, statement: &'a str) -> WarehouseFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let stdout = self.run(statement).await?;
            Ok(self.parse_rows(&stdout))
        })
    }
}
