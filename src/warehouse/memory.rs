// src/warehouse/memory.rs

//! In-process warehouse simulation.
//!
//! Understands just enough SQL for the pipeline's own statements:
//!
//! - `DELETE FROM <table>`
//! - `INSERT INTO <table> <select>`: appends the rows registered for `<select>`
//! - `COPY <table> FROM '<path>' ...`: appends the rows registered for `<path>`
//! - `SELECT COUNT(*) FROM <table> [WHERE ...]`: counts the table; a `WHERE`
//!   clause needs a registered query result
//!
//! Any statement can be given a canned query result or scripted failures.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use regex::Regex;

use crate::errors::WarehouseError;
use crate::types::ScalarValue;

use super::{Row, Warehouse, WarehouseFuture};

static DELETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*DELETE\s+FROM\s+([\w.$]+)\s*;?\s*$").expect("valid regex")
});
static INSERT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*INSERT\s+INTO\s+([\w.$]+)\s+(.+?)\s*;?\s*$").expect("valid regex")
});
static COPY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*COPY\s+([\w.$]+)\s+FROM\s+'([^']*)'").expect("valid regex")
});
static COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*SELECT\s+COUNT\(\*\)\s+FROM\s+([\w.$]+)\s*;?\s*$").expect("valid regex")
});

#[derive(Debug)]
struct FailureRule {
    needle: String,
    remaining: u32,
    error: WarehouseError,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<Row>>,
    sources: HashMap<String, Vec<Row>>,
    selects: HashMap<String, Vec<Row>>,
    query_results: HashMap<String, Vec<Row>>,
    failures: Vec<FailureRule>,
    statements: Vec<String>,
}

/// Simulated warehouse. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
    open: Arc<AtomicUsize>,
    peak_open: Arc<AtomicUsize>,
}

/// Held for the duration of one call; releases the simulated connection on drop.
struct ConnectionGuard<'a> {
    open: &'a AtomicUsize,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, so calls overlap in tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Rows a `COPY ... FROM '<path>'` will load.
    pub fn add_source(&self, path: impl Into<String>, rows: Vec<Row>) {
        self.lock().sources.insert(path.into(), rows);
    }

    /// Rows an `INSERT INTO <table> <select>` will append.
    pub fn add_select(&self, select: &str, rows: Vec<Row>) {
        self.lock().selects.insert(normalize(select), rows);
    }

    /// Canned result for a query statement.
    pub fn set_query_result(&self, statement: &str, rows: Vec<Row>) {
        self.lock().query_results.insert(normalize(statement), rows);
    }

    /// Make the next `times` statements containing `needle` fail with `error`.
    pub fn fail_next(&self, needle: impl Into<String>, times: u32, error: WarehouseError) {
        self.lock().failures.push(FailureRule {
            needle: needle.into(),
            remaining: times,
            error,
        });
    }

    /// Create (or replace) a table with the given rows.
    pub fn set_table(&self, table: impl Into<String>, rows: Vec<Row>) {
        self.lock().tables.insert(table.into(), rows);
    }

    pub fn table(&self, table: &str) -> Option<Vec<Row>> {
        let state = self.lock();
        lookup(&state.tables, table).map(|(_, rows)| rows.clone())
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.table(table).map(|rows| rows.len()).unwrap_or(0)
    }

    /// Every statement received, in order, including failed ones.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Highest number of simultaneously open connections seen so far.
    pub fn peak_connections(&self) -> usize {
        self.peak_open.load(Ordering::SeqCst)
    }

    /// Connections open right now.
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not wedge every other caller.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn connect(&self) -> ConnectionGuard<'_> {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(now, Ordering::SeqCst);
        let guard = ConnectionGuard { open: &self.open };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn run(&self, statement: &str) -> Result<Vec<Row>, WarehouseError> {
        let mut state = self.lock();
        state.statements.push(statement.to_string());

        if let Some(rule) = state
            .failures
            .iter_mut()
            .find(|r| r.remaining > 0 && statement.contains(&r.needle))
        {
            rule.remaining -= 1;
            return Err(rule.error.clone());
        }

        if let Some(rows) = state.query_results.get(&normalize(statement)) {
            return Ok(rows.clone());
        }

        if let Some(caps) = DELETE.captures(statement) {
            let table = caps[1].to_string();
            state.tables.entry(table).or_default().clear();
            return Ok(Vec::new());
        }

        if let Some(caps) = COPY.captures(statement) {
            let (table, path) = (caps[1].to_string(), caps[2].to_string());
            let rows = state.sources.get(&path).cloned().ok_or_else(|| {
                WarehouseError::transient(format!(
                    "The specified S3 prefix '{path}' does not exist"
                ))
            })?;
            state.tables.entry(table).or_default().extend(rows);
            return Ok(Vec::new());
        }

        if let Some(caps) = INSERT.captures(statement) {
            let (table, select) = (caps[1].to_string(), normalize(&caps[2]));
            let rows = state.selects.get(&select).cloned().ok_or_else(|| {
                WarehouseError::permanent(format!("no rows registered for select: {select}"))
            })?;
            state.tables.entry(table).or_default().extend(rows);
            return Ok(Vec::new());
        }

        if let Some(caps) = COUNT.captures(statement) {
            let count = lookup(&state.tables, &caps[1])
                .map(|(_, rows)| rows.len())
                .ok_or_else(|| {
                    WarehouseError::permanent(format!(
                        "relation \"{}\" does not exist",
                        &caps[1]
                    ))
                })?;
            return Ok(vec![vec![ScalarValue::Int(count as i64)]]);
        }

        Err(WarehouseError::permanent(format!(
            "unsupported statement: {statement}"
        )))
    }
}

impl Warehouse for MemoryWarehouse {
    fn execute<'a>(&'a self, statement: &'a str) -> WarehouseFuture<'a, ()> {
        Box::pin(async move {
            let _conn = self.connect().await;
            self.run(statement).map(|_| ())
        })
    }

    fn query<'a>(&'a self, statement: &'a str) -> WarehouseFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let _conn = self.connect().await;
            self.run(statement)
        })
    }
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Exact match first, then an unqualified name against `schema.table`.
fn lookup<'a>(
    tables: &'a BTreeMap<String, Vec<Row>>,
    name: &str,
) -> Option<(&'a String, &'a Vec<Row>)> {
    tables.get_key_value(name).or_else(|| {
        let suffix = format!(".{name}");
        tables.iter().find(|(k, _)| k.ends_with(&suffix))
    })
}
