use anyhow::Context;
use clap::Args;

use strata_core::store::GraphStore;
use strata_core::types::FileStatus;

use super::ProjectArgs;

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    let project = args.project.load()?;
    let store = project.open_existing_store()?;
    let db_path = project.db_path();

    let stats = store.stats().await.context("Failed to read store stats")?;

    println!("Strata status for {}", project.base.display());
    println!();
    println!("  Database: {}", db_path.display());
    if let Ok(meta) = std::fs::metadata(&db_path) {
        println!("  Size:     {}", format_bytes(meta.len()));
    }
    println!("  Project:  {}", project.config.project.name);
    println!("  Files:    {}", stats.files);
    println!();

    println!("  Nodes: {} total", stats.total_nodes);
    print_counts(&stats.nodes_by_kind);
    println!();

    println!("  Edges: {} total", stats.total_edges);
    print_counts(&stats.edges_by_kind);
    println!();

    println!("  Unresolved references:   {}", stats.unresolved_edges);
    println!("  Unresolvable references: {}", stats.unresolvable_edges);

    if stats.parse_errors > 0 {
        println!();
        println!("  Parse errors ({}):", stats.parse_errors);
        let records = store
            .file_records()
            .await
            .context("Failed to read file records")?;
        for record in records.iter().filter(|r| r.status == FileStatus::ParseError) {
            println!(
                "    - {}: {}",
                record.path,
                record.diagnostic.as_deref().unwrap_or("syntax error")
            );
        }
    }
    Ok(())
}

fn print_counts(counts: &std::collections::HashMap<String, u64>) {
    let mut kinds: Vec<_> = counts.iter().collect();
    kinds.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (kind, count) in kinds {
        println!("    {kind:<20} {count:>6}");
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
