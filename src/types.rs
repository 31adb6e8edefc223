use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Per-run status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Waiting for dependencies.
    Pending,
    /// Dispatched; waiting for a worker slot.
    Queued,
    /// An attempt is executing.
    Running,
    /// The last attempt failed with a retriable error; waiting out the backoff.
    Retrying,
    Succeeded,
    Failed,
    /// Never ran because an upstream task failed or the run was cancelled.
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a whole pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Succeeded => f.write_str("succeeded"),
            PipelineStatus::Failed => f.write_str("failed"),
        }
    }
}

/// How query output spells SQL `NULL` (`psql -P null=\N`).
pub const NULL_MARKER: &str = "\\N";

/// A single typed value returned by the warehouse or expected by a check.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl ScalarValue {
    /// Parse one field of delimited query output.
    ///
    /// Exactly [`NULL_MARKER`] is `NULL`. Integers and finite decimals become
    /// numbers. Everything else stays text, verbatim: the empty string,
    /// padding, `nan`, and `psql`'s `t`/`f` booleans (those only match a
    /// `Bool` at comparison time).
    pub fn parse_field(raw: &str) -> Self {
        if raw == NULL_MARKER {
            return ScalarValue::Null;
        }
        if let Ok(i) = raw.parse::<i64>() {
            return ScalarValue::Int(i);
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() => ScalarValue::Float(f),
            _ => ScalarValue::Text(raw.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Order two values if they are comparable.
    ///
    /// Integers and floats compare numerically; `NULL` only equals `NULL`.
    /// Text spelled the way `psql` prints booleans compares with a `Bool`.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        use ScalarValue::*;
        match (self, other) {
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Bool(a), Text(t)) => text_bool(t).map(|b| a.cmp(&b)),
            (Text(t), Bool(b)) => text_bool(t).map(|a| a.cmp(b)),
            (Null, Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

fn text_bool(t: &str) -> Option<bool> {
    match t {
        "t" | "true" => Some(true),
        "f" | "false" => Some(false),
        _ => None,
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Int(i) => write!(f, "{i}"),
            ScalarValue::Float(x) => write!(f, "{x}"),
            ScalarValue::Text(s) => write!(f, "'{s}'"),
            ScalarValue::Null => f.write_str("NULL"),
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Float(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

/// Comparison applied between a check's actual and expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Comparator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl Comparator {
    /// Whether `actual <op> expected` holds.
    ///
    /// Values of incompatible types are never ordered and never equal, so only
    /// `!=` holds for them.
    pub fn holds(self, actual: &ScalarValue, expected: &ScalarValue) -> bool {
        match actual.compare(expected) {
            Some(ord) => match self {
                Comparator::Equal => ord == Ordering::Equal,
                Comparator::NotEqual => ord != Ordering::Equal,
                Comparator::LessThan => ord == Ordering::Less,
                Comparator::LessOrEqual => ord != Ordering::Greater,
                Comparator::GreaterThan => ord == Ordering::Greater,
                Comparator::GreaterOrEqual => ord != Ordering::Less,
            },
            None => self == Comparator::NotEqual,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Equal => "=",
            Comparator::NotEqual => "!=",
            Comparator::LessThan => "<",
            Comparator::LessOrEqual => "<=",
            Comparator::GreaterThan => ">",
            Comparator::GreaterOrEqual => ">=",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Comparator::Equal),
            "!=" | "<>" => Ok(Comparator::NotEqual),
            "<" => Ok(Comparator::LessThan),
            "<=" => Ok(Comparator::LessOrEqual),
            ">" => Ok(Comparator::GreaterThan),
            ">=" => Ok(Comparator::GreaterOrEqual),
            other => Err(format!(
                "invalid comparator '{other}' (expected one of =, !=, <, <=, >, >=)"
            )),
        }
    }
}

impl TryFrom<String> for Comparator {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Format of the files a staging task copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Json,
    Csv,
    Parquet,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Json => f.write_str("JSON"),
            SourceFormat::Csv => f.write_str("CSV"),
            SourceFormat::Parquet => f.write_str("PARQUET"),
        }
    }
}
