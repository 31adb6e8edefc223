// src/warehouse/mod.rs

//! Warehouse abstraction.
//!
//! Tasks only ever talk to an `Arc<dyn Warehouse>`. Statements are opaque
//! strings; a connection is acquired for a single call and released when the
//! call completes, whether it succeeded or not.
//!
//! - [`command`] runs each statement through a client program (`psql` by
//!   default) in its own child process.
//! - [`memory`] is an in-process simulated warehouse for tests and demos.
//! - [`classify`] maps error text to an [`ErrorClass`](crate::errors::ErrorClass).

use std::fmt::{self, Debug};
use std::future::Future;
use std::pin::Pin;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::{PipelineError, Result, TaskError, WarehouseError};
use crate::types::ScalarValue;

pub mod classify;
pub mod command;
pub mod memory;

pub use classify::ErrorClassifier;
pub use command::CommandWarehouse;
pub use memory::MemoryWarehouse;

/// One result row.
pub type Row = Vec<ScalarValue>;

/// Boxed future returned by [`Warehouse`] methods.
pub type WarehouseFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, WarehouseError>> + Send + 'a>>;

/// Capability to run statements against the warehouse.
pub trait Warehouse: Send + Sync + Debug {
    /// Run a statement that returns no rows.
    fn execute<'a>(&'a self, statement: &'a str) -> WarehouseFuture<'a, ()>;

    /// Run a statement and return its rows in order.
    fn query<'a>(&'a self, statement: &'a str) -> WarehouseFuture<'a, Vec<Row>>;
}

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("identifier regex is valid")
});

/// A destination table, rendered as `[database.]schema.table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    database: Option<String>,
    schema: String,
    table: String,
}

impl TableRef {
    pub fn new(
        database: Option<&str>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self> {
        let schema = schema.into();
        let table = table.into();
        if let Some(db) = database {
            check_identifier("database", db)?;
        }
        check_identifier("schema", &schema)?;
        check_identifier("table", &table)?;
        Ok(Self {
            database: database.map(str::to_string),
            schema,
            table,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(db) = &self.database {
            write!(f, "{db}.")?;
        }
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn check_identifier(what: &str, value: &str) -> Result<()> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(PipelineError::ConfigError(format!(
            "invalid {what} name '{value}'"
        )))
    }
}

/// Extract the single scalar a statement is expected to produce.
pub fn single_scalar(statement: &str, rows: Vec<Row>) -> std::result::Result<ScalarValue, TaskError> {
    rows.into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .ok_or_else(|| TaskError::NoResult {
            statement: statement.to_string(),
        })
}
