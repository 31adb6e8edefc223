// src/context.rs

//! Run context and key-pattern templating.
//!
//! A [`RunContext`] is handed to every task of one pipeline run and never
//! changes during it. Staging tasks use it to turn a key pattern such as
//! `log_data/{year}/{month}` into the partition for the logical date.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::Regex;

use crate::errors::TaskError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").expect("placeholder regex is valid")
});

/// Immutable parameters of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    logical_date: DateTime<Utc>,
    run_id: String,
    params: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(logical_date: DateTime<Utc>) -> Self {
        Self {
            logical_date,
            run_id: format!("manual__{}", logical_date.to_rfc3339()),
            params: BTreeMap::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Add a user parameter. User parameters shadow the built-in fields.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn logical_date(&self) -> DateTime<Utc> {
        self.logical_date
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Look up a template field by name.
    pub fn field(&self, name: &str) -> Option<String> {
        if let Some(v) = self.params.get(name) {
            return Some(v.clone());
        }

        let d = self.logical_date;
        let value = match name.strip_prefix("execution_date.").unwrap_or(name) {
            "ds" => d.format("%Y-%m-%d").to_string(),
            "ds_nodash" => d.format("%Y%m%d").to_string(),
            "ts" | "execution_date" => d.to_rfc3339(),
            "year" => d.year().to_string(),
            "month" => d.month().to_string(),
            "day" => d.day().to_string(),
            "hour" => d.hour().to_string(),
            "run_id" => self.run_id.clone(),
            _ => return None,
        };
        Some(value)
    }

    /// Substitute `{field}` placeholders in `pattern`.
    ///
    /// `{{` and `}}` produce literal braces. Every unknown field is reported
    /// in one [`TaskError::TemplateResolution`].
    pub fn render(&self, pattern: &str) -> Result<String, TaskError> {
        let mut out = String::with_capacity(pattern.len());
        let mut missing = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(pattern) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&pattern[last..whole.start()]);
            last = whole.end();

            match (whole.as_str(), caps.get(1)) {
                ("{{", _) => out.push('{'),
                ("}}", _) => out.push('}'),
                (_, Some(name)) => {
                    let name = name.as_str().trim();
                    match self.field(name) {
                        Some(value) => out.push_str(&value),
                        None => missing.push(name.to_string()),
                    }
                }
                (other, None) => out.push_str(other),
            }
        }
        out.push_str(&pattern[last..]);

        if missing.is_empty() {
            Ok(out)
        } else {
            Err(TaskError::TemplateResolution {
                pattern: pattern.to_string(),
                missing,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> RunContext {
        RunContext::new(Utc.with_ymd_and_hms(2018, 11, 3, 7, 0, 0).unwrap())
    }

    #[test]
    fn renders_date_partitions() {
        let c = ctx();
        assert_eq!(c.render("log_data/{year}/{month}").unwrap(), "log_data/2018/11");
        assert_eq!(
            c.render("log_data/{execution_date.year}/{execution_date.month}/{ds}-events.json")
                .unwrap(),
            "log_data/2018/11/2018-11-03-events.json"
        );
        assert_eq!(c.render("song_data").unwrap(), "song_data");
    }

    #[test]
    fn escaped_braces_are_literal() {
        assert_eq!(ctx().render("a{{b}}/{day}").unwrap(), "a{b}/3");
    }

    #[test]
    fn user_params_are_available() {
        let c = ctx().with_param("region", "us-west-2");
        assert_eq!(c.render("{region}/log_data").unwrap(), "us-west-2/log_data");
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let err = ctx().render("{tenant}/{year}/{shard}").unwrap_err();
        match err {
            TaskError::TemplateResolution { pattern, missing } => {
                assert_eq!(pattern, "{tenant}/{year}/{shard}");
                assert_eq!(missing, vec!["tenant".to_string(), "shard".to_string()]);
            }
            other => panic!("expected TemplateResolution, got {other:?}"),
        }
    }
}
