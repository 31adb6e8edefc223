// src/lib.rs

pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod object_store;
pub mod tasks;
pub mod types;
pub mod warehouse;

use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, build_dag, build_warehouse, executor_options, load_and_validate};
use crate::context::RunContext;
use crate::dag::Dag;
use crate::engine::{CancelHandle, Executor};
use crate::object_store::EnvObjectStore;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and DAG construction
/// - the run context (logical date, parameters)
/// - the executor with the command-line warehouse client
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;
    let dag = build_dag(&cfg)?;
    // Shape problems surface here even for dry runs.
    let graph = dag.validate()?;

    let mut run_ctx = RunContext::new(args.execution_date.unwrap_or_else(Utc::now));
    for (key, value) in &args.params {
        run_ctx = run_ctx.with_param(key.clone(), value.clone());
    }

    if args.dry_run {
        print_dry_run(&cfg, &dag, &graph.execution_layers(), &run_ctx);
        return Ok(());
    }

    let mut options = executor_options(&cfg);
    if let Some(n) = args.max_workers {
        options.max_workers = n;
    }

    let warehouse = Arc::new(build_warehouse(&cfg)?);
    let executor = Executor::new(warehouse, Arc::new(EnvObjectStore::new()), options);

    // Ctrl-C → graceful cancellation.
    let cancel = CancelHandle::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling run");
            cancel.cancel();
        });
    }

    info!(pipeline = %cfg.pipeline.name, "running pipeline");
    let result = executor.execute_with_cancel(&dag, run_ctx, cancel).await?;
    print!("{result}");

    if !result.is_success() {
        bail!(
            "pipeline '{}' failed ({} failed, {} skipped)",
            cfg.pipeline.name,
            result.failed_tasks().len(),
            result.skipped_tasks().len()
        );
    }
    Ok(())
}

/// Simple dry-run output: print layers, tasks and what each would do.
fn print_dry_run(cfg: &ConfigFile, dag: &Dag, layers: &[Vec<String>], run_ctx: &RunContext) {
    println!("stardag dry-run: {}", cfg.pipeline.name);
    println!("  logical_date = {}", run_ctx.logical_date().to_rfc3339());
    println!("  run_id = {}", run_ctx.run_id());
    println!("  max_workers = {}", cfg.pipeline.max_workers);
    println!();

    println!("layers ({}):", layers.len());
    for (depth, layer) in layers.iter().enumerate() {
        println!("  [{depth}]");
        for name in layer {
            let Some(task) = dag.get(name) else { continue };
            println!("    - {name}: {}", task.describe());
            if !task.dependencies().is_empty() {
                println!("        after: {:?}", task.dependencies());
            }
            let policy = task.retry_policy();
            println!(
                "        attempts: {} (delay {:?})",
                policy.max_attempts(),
                policy.delay_after(1)
            );
        }
    }

    debug!("dry-run complete (no execution)");
}
