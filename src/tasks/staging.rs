// src/tasks/staging.rs

//! Staging: truncate a staging table and bulk-copy one source partition in.

use tracing::{debug, info};

use crate::errors::{Result, TaskError};
use crate::object_store::{Credentials, join_source_path};
use crate::types::SourceFormat;
use crate::warehouse::{TableRef, single_scalar};

use super::{Task, TaskContext, TaskFuture, TaskKind, TaskOutput, TaskSpec, require_non_empty};

/// Parameters of a staging task.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingConfig {
    /// Bucket URL, e.g. `s3://udacity-dend/`.
    pub bucket: String,
    /// Key inside the bucket; may contain `{field}` placeholders.
    pub key_pattern: String,
    pub source_format: SourceFormat,
    /// Format options, e.g. `auto ignorecase` for JSON.
    pub copy_options: Option<String>,
    /// Credential reference handed to the object store.
    pub credentials: String,
    pub destination: TableRef,
}

#[derive(Debug, Clone)]
pub struct StagingTask {
    spec: TaskSpec,
    config: StagingConfig,
}

impl StagingTask {
    pub fn new(spec: TaskSpec, config: StagingConfig) -> Result<Self> {
        require_non_empty(&spec.name, "bucket", &config.bucket)?;
        require_non_empty(&spec.name, "credentials", &config.credentials)?;
        Ok(Self { spec, config })
    }
}

/// A copy statement plus a rendering that is safe to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStatement {
    pub sql: String,
    pub redacted: String,
}

impl CopyStatement {
    pub fn new(
        table: &TableRef,
        source_path: &str,
        credentials: &Credentials,
        format: SourceFormat,
        options: Option<&str>,
    ) -> Self {
        let format_clause = match (format, options.map(str::trim).filter(|o| !o.is_empty())) {
            (SourceFormat::Json, Some(opts)) => format!("FORMAT AS JSON '{opts}'"),
            (SourceFormat::Json, None) => "FORMAT AS JSON 'auto'".to_string(),
            (SourceFormat::Csv, Some(opts)) => format!("FORMAT AS CSV {opts}"),
            (SourceFormat::Csv, None) => "FORMAT AS CSV".to_string(),
            (SourceFormat::Parquet, _) => "FORMAT AS PARQUET".to_string(),
        };
        let render = |access: &str, secret: &str| {
            format!(
                "COPY {table} FROM '{source_path}' ACCESS_KEY_ID '{access}' SECRET_ACCESS_KEY '{secret}' {format_clause}"
            )
        };
        Self {
            sql: render(&credentials.access_key, &credentials.secret_key),
            redacted: render("***", "***"),
        }
    }
}

impl Task for StagingTask {
    fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Staging
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            let cfg = &self.config;
            let key = ctx.run.render(&cfg.key_pattern)?;
            let source = ctx.object_store.source_path(&cfg.bucket, &key);
            let credentials = ctx.object_store.resolve_credentials(&cfg.credentials)?;
            let table = &cfg.destination;

            // Always empty the staging table so a retried copy cannot duplicate rows.
            let delete = format!("DELETE FROM {table}");
            info!(task = %self.spec.name, attempt = ctx.attempt, %table, "emptying staging table");
            ctx.warehouse
                .execute(&delete)
                .await
                .map_err(|e| TaskError::from_warehouse(&delete, e))?;

            let copy = CopyStatement::new(
                table,
                &source,
                &credentials,
                cfg.source_format,
                cfg.copy_options.as_deref(),
            );
            info!(task = %self.spec.name, attempt = ctx.attempt, %source, %table, "copying source into staging table");
            debug!(task = %self.spec.name, statement = %copy.redacted, "copy statement");
            ctx.warehouse
                .execute(&copy.sql)
                .await
                .map_err(|e| TaskError::from_warehouse(&copy.redacted, e))?;

            let count = format!("SELECT COUNT(*) FROM {table}");
            let rows = ctx
                .warehouse
                .query(&count)
                .await
                .map_err(|e| TaskError::from_warehouse(&count, e))?;
            let value = single_scalar(&count, rows)?;
            let loaded = value
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| TaskError::UnexpectedResult {
                    statement: count.clone(),
                    expected: "a row count",
                    found: value.clone(),
                })?;

            info!(task = %self.spec.name, %table, rows = loaded, "staging copy finished");
            Ok(TaskOutput::RowsLoaded(loaded))
        })
    }

    fn describe(&self) -> String {
        format!(
            "staging {} ({}) -> {}",
            join_source_path(&self.config.bucket, &self.config.key_pattern),
            self.config.source_format,
            self.config.destination
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_statement_redacts_secrets() {
        let table = TableRef::new(Some("dev"), "public", "staging_events").unwrap();
        let creds = Credentials::new("AKIA", "s3cr3t");
        let copy = CopyStatement::new(
            &table,
            "s3://udacity-dend/log_data",
            &creds,
            SourceFormat::Json,
            Some("auto ignorecase"),
        );
        assert_eq!(
            copy.sql,
            "COPY dev.public.staging_events FROM 's3://udacity-dend/log_data' ACCESS_KEY_ID 'AKIA' SECRET_ACCESS_KEY 's3cr3t' FORMAT AS JSON 'auto ignorecase'"
        );
        assert!(!copy.redacted.contains("s3cr3t"));
        assert!(copy.redacted.contains("FORMAT AS JSON 'auto ignorecase'"));
    }

    #[test]
    fn csv_options_are_appended_raw() {
        let table = TableRef::new(None, "public", "staging_songs").unwrap();
        let copy = CopyStatement::new(
            &table,
            "s3://b/k",
            &Credentials::new("a", "s"),
            SourceFormat::Csv,
            Some("IGNOREHEADER 1"),
        );
        assert!(copy.sql.ends_with("FORMAT AS CSV IGNOREHEADER 1"));
    }
}
