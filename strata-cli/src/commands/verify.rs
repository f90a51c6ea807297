use anyhow::Context;
use clap::Args;

use super::ProjectArgs;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: VerifyArgs) -> anyhow::Result<()> {
    let project = args.project.load()?;
    let store = project.open_existing_store()?;

    let report = strata_core::verify::verify(&store)
        .await
        .context("Failed to read graph")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Checked {} nodes and {} edges in {}",
            report.nodes,
            report.edges,
            project.db_path().display()
        );
        for violation in &report.violations {
            println!("  - {violation}");
        }
    }

    if !report.is_ok() {
        anyhow::bail!("graph verification failed: {} violations", report.violations.len());
    }
    if !args.json {
        println!("  OK");
    }
    Ok(())
}
