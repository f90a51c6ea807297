use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tracing::info;

use strata_core::store::GraphStore;
use strata_core::sync::SyncEngine;

use super::ProjectArgs;

#[derive(Args, Debug)]
pub struct IngestArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: IngestArgs, quiet: bool) -> anyhow::Result<()> {
    let project = args.project.load()?;
    let store: Arc<dyn GraphStore> = Arc::new(project.open_store()?);

    let engine = Arc::new(
        SyncEngine::new(Arc::clone(&project.config), &project.base, store)
            .context("Cannot start sync engine")?,
    );
    engine.start().await.context("Cannot start sync engine")?;
    info!(db = %project.db_path().display(), "Ingesting");

    let reporter = super::reporter(quiet || args.json);
    let report = engine
        .initial_scan(reporter.as_ref())
        .await
        .context("Initial scan failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.faults.is_empty() {
            return Err(super::PartialSuccess {
                faults: report.faults.len(),
            }
            .into());
        }
        return Ok(());
    }
    super::print_sync_report("Graph updated for", &project.base, &report)
}
