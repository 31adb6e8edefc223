//! Shared helpers for the stardag test suites: config and DAG builders, a
//! fake `ExecutorBackend`, scripted tasks and tracing setup.

pub mod builders;
pub mod fake_executor;
pub mod scripted_task;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

pub use fake_executor::FakeExecutor;
pub use scripted_task::{RunLog, ScriptedTask};

static INIT: Once = Once::new();

/// Upper bound for any single pipeline run in a test.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Install a test-writer subscriber once per test binary.
///
/// Filter comes from `RUST_LOG`, then `STARDAG_LOG`, else `warn`. Output is
/// captured per test and only shown for failures (or with `--nocapture`).
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_from_env("STARDAG_LOG"))
            .unwrap_or_else(|_| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_TIMEOUT`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("test timed out after {TEST_TIMEOUT:?}"))
}
