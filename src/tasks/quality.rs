// src/tasks/quality.rs

//! Data-quality gate.
//!
//! Runs every check in declared order and reports all of them, so one run
//! shows every failing check. A statement error or a check that returns no
//! rows aborts the gate immediately; comparison mismatches are collected into
//! a [`CheckReport`] and returned as one [`TaskError::AssertionFailure`].

use std::fmt;

use tracing::{info, warn};

use crate::errors::TaskError;
use crate::types::{Comparator, ScalarValue};
use crate::warehouse::single_scalar;

use super::{Task, TaskContext, TaskFuture, TaskKind, TaskOutput, TaskSpec};

/// One assertion: `<test_statement result> <comparator> <expected>`.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheck {
    pub test_statement: String,
    pub expected: ScalarValue,
    pub comparator: Comparator,
}

impl QualityCheck {
    pub fn new(
        test_statement: impl Into<String>,
        expected: impl Into<ScalarValue>,
        comparator: Comparator,
    ) -> Self {
        Self {
            test_statement: test_statement.into(),
            expected: expected.into(),
            comparator,
        }
    }
}

/// Result of a single check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// 1-based position in the gate's check list.
    pub index: usize,
    pub test_statement: String,
    pub comparator: Comparator,
    pub expected: ScalarValue,
    pub actual: ScalarValue,
    pub passed: bool,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "check #{} `{}`: expected {} {}, got {}",
            self.index, self.test_statement, self.comparator, self.expected, self.actual
        )
    }
}

/// Outcome of every check the gate ran, in declared order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CheckReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckReport {
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} data quality checks failed",
            self.failure_count(),
            self.outcomes.len()
        )?;
        for outcome in self.failures() {
            write!(f, "; {outcome}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QualityGateTask {
    spec: TaskSpec,
    checks: Vec<QualityCheck>,
}

impl QualityGateTask {
    /// An empty check list is accepted and passes vacuously.
    pub fn new(spec: TaskSpec, checks: Vec<QualityCheck>) -> Self {
        Self { spec, checks }
    }

    async fn run_checks(&self, ctx: &TaskContext) -> Result<CheckReport, TaskError> {
        let mut report = CheckReport::default();

        for (i, check) in self.checks.iter().enumerate() {
            let rows = ctx
                .warehouse
                .query(&check.test_statement)
                .await
                .map_err(|e| TaskError::from_warehouse(&check.test_statement, e))?;
            let actual = single_scalar(&check.test_statement, rows)?;
            let passed = check.comparator.holds(&actual, &check.expected);

            let outcome = CheckOutcome {
                index: i + 1,
                test_statement: check.test_statement.clone(),
                comparator: check.comparator,
                expected: check.expected.clone(),
                actual,
                passed,
            };
            if passed {
                info!(task = %self.spec.name, "{outcome} (passed)");
            } else {
                warn!(task = %self.spec.name, "{outcome} (FAILED)");
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }
}

impl Task for QualityGateTask {
    fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    fn kind(&self) -> TaskKind {
        TaskKind::QualityGate
    }

    fn run<'a>(&'a self, ctx: &'a TaskContext) -> TaskFuture<'a> {
        Box::pin(async move {
            if self.checks.is_empty() {
                warn!(task = %self.spec.name, "quality gate has no checks; passing vacuously");
            }

            let report = self.run_checks(ctx).await?;
            if report.is_success() {
                info!(task = %self.spec.name, checks = report.outcomes.len(), "all data quality checks passed");
                Ok(TaskOutput::Checks(report))
            } else {
                Err(TaskError::AssertionFailure(report))
            }
        })
    }

    fn describe(&self) -> String {
        format!("quality gate ({} checks)", self.checks.len())
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::context::RunContext;
    use crate::errors::WarehouseError;
    use crate::object_store::StaticObjectStore;
    use crate::warehouse::MemoryWarehouse;

    const SONGS: &str = "SELECT COUNT(*) FROM songs WHERE songid IS NULL";
    const ARTISTS: &str = "SELECT COUNT(*) FROM artists WHERE artistid IS NULL";
    const USERS: &str = "SELECT COUNT(*) FROM users WHERE userid IS NULL";

    fn ctx(warehouse: &MemoryWarehouse) -> TaskContext {
        TaskContext {
            run: Arc::new(RunContext::new(Utc.with_ymd_and_hms(2018, 11, 1, 0, 0, 0).unwrap())),
            warehouse: Arc::new(warehouse.clone()),
            object_store: Arc::new(StaticObjectStore::new()),
            attempt: 1,
        }
    }

    fn zero_nulls(statements: &[&str]) -> QualityGateTask {
        QualityGateTask::new(
            TaskSpec::new("run_quality_checks"),
            statements
                .iter()
                .map(|s| QualityCheck::new(*s, ScalarValue::Int(0), Comparator::Equal))
                .collect(),
        )
    }

    fn count(n: i64) -> Vec<Vec<ScalarValue>> {
        vec![vec![ScalarValue::Int(n)]]
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn check_without_rows_is_a_no_result_error() {
        let wh = MemoryWarehouse::new();
        wh.set_query_result(SONGS, vec![]);

        let err = zero_nulls(&[SONGS]).run(&ctx(&wh)).await.unwrap_err();
        assert_eq!(err, TaskError::NoResult { statement: SONGS.to_string() });
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn empty_gate_passes_with_a_warning() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let wh = MemoryWarehouse::new();
        let out = zero_nulls(&[]).run(&ctx(&wh)).await.unwrap();

        assert_eq!(out, TaskOutput::Checks(CheckReport::default()));
        assert!(wh.statements().is_empty());
        let logged = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("WARN"), "{logged}");
        assert!(logged.contains("passing vacuously"), "{logged}");
    }

    #[tokio::test]
    async fn statement_error_stops_at_the_failing_check() {
        let wh = MemoryWarehouse::new();
        wh.set_query_result(SONGS, count(0));
        wh.set_query_result(ARTISTS, count(0));
        wh.set_query_result(USERS, count(0));
        wh.fail_next("FROM artists", 1, WarehouseError::permanent("relation \"artists\" does not exist"));

        let err = zero_nulls(&[SONGS, ARTISTS, USERS]).run(&ctx(&wh)).await.unwrap_err();
        assert!(
            matches!(&err, TaskError::WarehouseStatement { statement, .. } if statement == ARTISTS),
            "{err:?}"
        );
        assert_eq!(wh.statements(), vec![SONGS.to_string(), ARTISTS.to_string()]);
    }

    #[tokio::test]
    async fn mismatches_are_reported_together() {
        let wh = MemoryWarehouse::new();
        wh.set_query_result(SONGS, count(2));
        wh.set_query_result(ARTISTS, count(0));
        wh.set_query_result(USERS, count(5));

        let err = zero_nulls(&[SONGS, ARTISTS, USERS]).run(&ctx(&wh)).await.unwrap_err();
        let TaskError::AssertionFailure(report) = err else {
            panic!("expected an assertion failure, got {err:?}");
        };
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.failures().map(|o| o.index).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(report.outcomes[2].actual, ScalarValue::Int(5));
        assert!(report.to_string().starts_with("2 of 3 data quality checks failed"));
        assert_eq!(wh.statements().len(), 3);
    }
}
