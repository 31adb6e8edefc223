// src/warehouse/classify.rs

//! Classification of warehouse error text.

use regex::{Regex, RegexBuilder};

use crate::errors::{ErrorClass, PipelineError, Result};

/// Patterns that mark an error as worth retrying.
pub const DEFAULT_TRANSIENT_PATTERNS: &[&str] = &[
    r"timed? ?out",
    r"connection (refused|reset|closed)",
    r"could not connect",
    r"throttl",
    r"slow ?down",
    r"too many connections",
    r"temporarily unavailable",
    r"specified S3 prefix .* does not exist",
    r"serializable isolation violation",
];

/// Patterns that mark an error as permanent.
pub const DEFAULT_PERMANENT_PATTERNS: &[&str] = &[
    r"syntax error",
    r"does not exist",
    r"permission denied",
    r"invalid input syntax",
    r"load into table .* failed",
    r"invalid credentials",
];

/// Case-insensitive regex classifier. Transient patterns win over permanent
/// ones, so "S3 prefix ... does not exist" stays retriable.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    transient: Vec<Regex>,
    permanent: Vec<Regex>,
}

impl ErrorClassifier {
    pub fn new<S: AsRef<str>>(transient: &[S], permanent: &[S]) -> Result<Self> {
        Ok(Self {
            transient: compile_all(transient)?,
            permanent: compile_all(permanent)?,
        })
    }

    pub fn classify(&self, message: &str) -> ErrorClass {
        if self.transient.iter().any(|re| re.is_match(message)) {
            ErrorClass::Transient
        } else if self.permanent.iter().any(|re| re.is_match(message)) {
            ErrorClass::Permanent
        } else {
            ErrorClass::Unclassified
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_PATTERNS, DEFAULT_PERMANENT_PATTERNS)
            .expect("default classifier patterns are valid")
    }
}

fn compile_all<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p.as_ref())
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    PipelineError::ConfigError(format!(
                        "invalid error pattern '{}': {e}",
                        p.as_ref()
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patterns_separate_throttling_from_bad_sql() {
        let c = ErrorClassifier::default();
        assert_eq!(c.classify("S3ServiceException: Please reduce your request rate. SlowDown"), ErrorClass::Transient);
        assert_eq!(c.classify("could not connect to server: Connection refused"), ErrorClass::Transient);
        assert_eq!(c.classify("ERROR:  syntax error at or near \"FORM\""), ErrorClass::Permanent);
        assert_eq!(c.classify("ERROR: relation \"public.users\" does not exist"), ErrorClass::Permanent);
        assert_eq!(
            c.classify("The specified S3 prefix 'log_data/2018/13' does not exist"),
            ErrorClass::Transient
        );
        assert_eq!(c.classify("something odd happened"), ErrorClass::Unclassified);
    }

    #[test]
    fn bad_patterns_are_config_errors() {
        let err = ErrorClassifier::new(&["("], &[]).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }
}
