use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio::sync::mpsc;
use tracing::info;

use strata_core::store::GraphStore;
use strata_core::sync::{IgnoreRules, SyncEngine};
use strata_core::watch::FsWatcher;

use super::ProjectArgs;

/// Events buffered between the watcher thread and the engine.
const EVENT_BUFFER: usize = 4096;

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Skip the initial scan and only apply new changes
    #[arg(long)]
    pub no_scan: bool,
}

pub async fn run(args: WatchArgs, quiet: bool) -> anyhow::Result<()> {
    let project = args.project.load()?;
    let store: Arc<dyn GraphStore> = Arc::new(project.open_store()?);

    let engine = Arc::new(
        SyncEngine::new(Arc::clone(&project.config), &project.base, store)
            .context("Cannot start sync engine")?,
    );
    engine.start().await.context("Cannot start sync engine")?;

    // Start watching before the scan so nothing changed during it is lost.
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let watcher = FsWatcher::spawn(
        engine.roots().clone(),
        IgnoreRules::from_config(engine.config()),
        tx,
    )
    .context("Cannot start filesystem watcher")?;

    if !args.no_scan {
        let reporter = super::reporter(quiet);
        let report = engine
            .initial_scan(reporter.as_ref())
            .await
            .context("Initial scan failed")?;
        if let Err(partial) = super::print_sync_report("Watching", &project.base, &report) {
            eprintln!("Warning: {partial}");
        }
    }

    let loop_handle = tokio::spawn(Arc::clone(&engine).run(rx));
    info!("Watching for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Cannot listen for Ctrl-C")?;

    // Dropping the watcher closes the channel; the loop drains and exits.
    drop(watcher);
    let total = loop_handle
        .await
        .context("Sync loop panicked")?
        .context("Sync loop failed")?;

    println!();
    println!(
        "Stopped. {} processed, {} deleted, {} renamed, {} faults",
        total.processed,
        total.deleted,
        total.relocated,
        total.faults.len()
    );
    let parked = engine.parked_paths();
    if !parked.is_empty() {
        println!("  {} files still parked; the next run will pick them up", parked.len());
    }
    Ok(())
}
