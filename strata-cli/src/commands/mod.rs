pub mod ingest;
pub mod resolve;
pub mod status;
pub mod verify;
pub mod watch;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use tracing::debug;

use strata_core::config::{CONFIG_FILE, StrataConfig};
use strata_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};
use strata_core::store::SqliteStore;
use strata_core::sync::SyncReport;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the source roots once and bring the graph up to date
    Ingest(ingest::IngestArgs),
    /// Ingest, then keep the graph in sync with filesystem changes
    Watch(watch::WatchArgs),
    /// Run one cross-reference resolver pass over the stored graph
    Resolve(resolve::ResolveArgs),
    /// Show what the graph currently holds
    Status(status::StatusArgs),
    /// Check the stored graph's structural invariants
    Verify(verify::VerifyArgs),
}

pub async fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Ingest(args) => ingest::run(args, quiet).await,
        Command::Watch(args) => watch::run(args, quiet).await,
        Command::Resolve(args) => resolve::run(args).await,
        Command::Status(args) => status::run(args).await,
        Command::Verify(args) => verify::run(args).await,
    }
}

/// Where a command finds its project.
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Project directory (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Configuration file (default: <path>/.strata/config.toml when present)
    #[arg(long, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database location, overriding `[store].path`
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

/// A loaded project: canonical base directory and configuration.
#[derive(Debug)]
pub struct Project {
    pub base: PathBuf,
    pub config: Arc<StrataConfig>,
}

impl ProjectArgs {
    pub fn load(&self) -> anyhow::Result<Project> {
        let base = std::fs::canonicalize(&self.path)
            .with_context(|| format!("Cannot resolve path: {}", self.path.display()))?;

        let explicit = self.config.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        });
        let default_file = base.join(CONFIG_FILE);
        let mut config = match explicit {
            Some(path) => StrataConfig::load(&path)
                .with_context(|| format!("Cannot load config: {}", path.display()))?,
            None if default_file.is_file() => StrataConfig::load(&default_file)
                .with_context(|| format!("Cannot load config: {}", default_file.display()))?,
            None => {
                debug!(path = %base.display(), "No config file, using defaults");
                StrataConfig::for_root(&base)
            }
        };
        if let Some(db_path) = &self.db_path {
            config.store.path.clone_from(db_path);
        }
        Ok(Project {
            base,
            config: Arc::new(config),
        })
    }
}

impl Project {
    pub fn db_path(&self) -> PathBuf {
        self.config.database_path(&self.base)
    }

    /// Open (or create) the project's database.
    pub fn open_store(&self) -> anyhow::Result<SqliteStore> {
        let db_path = self.db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create database directory: {}", parent.display()))?;
        }
        SqliteStore::open_with_timeout(
            &db_path,
            Duration::from_millis(self.config.store.busy_timeout_ms),
        )
        .with_context(|| format!("Cannot open database: {}", db_path.display()))
    }

    /// Open an existing database; reading commands never create one.
    pub fn open_existing_store(&self) -> anyhow::Result<SqliteStore> {
        let db_path = self.db_path();
        if !db_path.exists() {
            anyhow::bail!(
                "Database not found: {}. Run `strata ingest` first.",
                db_path.display()
            );
        }
        self.open_store()
    }
}

/// Some files faulted; everything else was integrated.
#[derive(Debug)]
pub struct PartialSuccess {
    pub faults: usize,
}

impl fmt::Display for PartialSuccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partial success: {} file{} could not be fully integrated",
            self.faults,
            if self.faults == 1 { "" } else { "s" }
        )
    }
}

impl std::error::Error for PartialSuccess {}

pub fn reporter(quiet: bool) -> Box<dyn ProgressReporter> {
    if quiet {
        Box::new(NoopReporter)
    } else {
        Box::new(IndicatifReporter::new())
    }
}

/// Print a sync summary and turn file faults into a partial-success error.
pub fn print_sync_report(title: &str, root: &Path, report: &SyncReport) -> anyhow::Result<()> {
    println!("{title} {}", root.display());
    println!();
    println!("  Processed: {}", report.processed);
    println!("  Unchanged: {}", report.unchanged);
    println!("  Deleted:   {}", report.deleted);
    if report.relocated > 0 {
        println!("  Renamed:   {}", report.relocated);
    }
    if report.skipped > 0 {
        println!("  Skipped:   {}", report.skipped);
    }
    if report.parked > 0 {
        println!("  Parked:    {}", report.parked);
    }
    if let Some(resolve) = &report.resolve {
        println!(
            "  Resolved:  {} of {} references ({} unresolvable, {} pending)",
            resolve.resolved, resolve.examined, resolve.unresolvable, resolve.pending
        );
        println!("  Overrides: {}", resolve.overrides);
    }

    if report.faults.is_empty() {
        return Ok(());
    }
    println!();
    println!("  Faults ({}):", report.faults.len());
    for fault in &report.faults {
        println!("    - {fault}");
    }
    Err(PartialSuccess {
        faults: report.faults.len(),
    }
    .into())
}
