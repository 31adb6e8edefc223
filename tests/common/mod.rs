#![allow(dead_code)]

use std::sync::Arc;

pub use stardag_test_utils::builders;
pub use stardag_test_utils::{init_tracing, with_timeout};

use stardag::engine::{Executor, ExecutorOptions};
use stardag::object_store::{Credentials, StaticObjectStore};
use stardag::warehouse::MemoryWarehouse;

/// Executor over a shared in-memory warehouse with the reference credentials.
pub fn executor(warehouse: &MemoryWarehouse, max_workers: usize) -> Executor {
    let store = StaticObjectStore::new()
        .with_credentials("aws_credentials", Credentials::new("AKIATEST", "test-secret"));
    Executor::new(
        Arc::new(warehouse.clone()),
        Arc::new(store),
        ExecutorOptions { max_workers },
    )
}
