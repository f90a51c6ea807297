use clap::Parser;

use strata_core::error::{ConfigError, StrataError, SyncError};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "strata",
    version,
    about = "Keep a queryable code graph in sync with your source tree"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into a process exit code.
///
/// Exit codes:
///   0: success
///   1: general/unknown error
///   2: configuration error
///   3: no valid source root
///   4: database error
///   10: partial success (some files faulted)
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.downcast_ref::<commands::PartialSuccess>().is_some() {
            return 10;
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return 2;
        }
        if let Some(strata) = cause.downcast_ref::<StrataError>() {
            return match strata {
                StrataError::Config(_) => 2,
                StrataError::Sync(SyncError::NoValidRoot(_)) => 3,
                StrataError::Store(_) | StrataError::Sync(SyncError::BackendUnreachable(_)) => 4,
                _ => 1,
            };
        }
    }

    let lower = format!("{err:#}").to_lowercase();
    if lower.contains("config") {
        2
    } else if lower.contains("cannot resolve path") || lower.contains("no valid root") {
        3
    } else if lower.contains("database") || lower.contains("sqlite") {
        4
    } else {
        1
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command, cli.quiet)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use strata_core::error::StoreError;

    use super::*;

    #[test]
    fn exit_code_config() {
        let err = anyhow::Error::from(StrataError::from(ConfigError::Invalid("bad".into())));
        assert_eq!(classify_exit_code(&err), 2);
        let err = anyhow::anyhow!("Cannot parse config: bad toml");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_no_valid_root() {
        let err = anyhow::Error::from(StrataError::from(SyncError::NoValidRoot("src".into())))
            .context("Cannot start sync engine");
        assert_eq!(classify_exit_code(&err), 3);
    }

    #[test]
    fn exit_code_database() {
        let err = anyhow::Error::from(StrataError::from(StoreError::Unavailable("gone".into())));
        assert_eq!(classify_exit_code(&err), 4);
        let err = anyhow::anyhow!("Cannot open database: /foo/.strata/graph.db");
        assert_eq!(classify_exit_code(&err), 4);
    }

    #[test]
    fn exit_code_partial_success() {
        let err = anyhow::Error::from(commands::PartialSuccess { faults: 2 });
        assert_eq!(classify_exit_code(&err), 10);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
