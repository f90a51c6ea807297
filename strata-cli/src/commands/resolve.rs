use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use strata_core::resolve::Resolver;
use strata_core::sync::build_registry;

use super::ProjectArgs;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

pub async fn run(args: ResolveArgs) -> anyhow::Result<()> {
    let project = args.project.load()?;
    let store = project.open_existing_store()?;

    let resolver = Resolver::new(Arc::new(build_registry(&project.config)));
    let report = resolver
        .run(&store)
        .await
        .context("Resolver pass failed")?;

    println!("Resolver pass over {}", project.db_path().display());
    println!();
    println!("  Examined:     {}", report.examined);
    println!("  Resolved:     {}", report.resolved);
    println!("  Unresolvable: {}", report.unresolvable);
    println!("  Pending:      {}", report.pending);
    println!("  Overrides:    {}", report.overrides);
    Ok(())
}
