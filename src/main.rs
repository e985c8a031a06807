//! # searchsync CLI
//!
//! ## Usage
//!
//! ```bash
//! searchsync --config ./config/searchsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `searchsync push` | Build records and reconcile the remote index |
//! | `searchsync records` | Build records and print them as JSON |
//! | `searchsync settings` | Push index settings if they changed |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use searchsync::config;
use searchsync::error::SyncError;
use searchsync::hooks::NoHooks;
use searchsync::indexer::SyncStrategy;
use searchsync::push;

/// searchsync: keep a hosted search index in sync with a static site.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. The API key is read from the environment variable named by
/// `index.api_key_env` (default `ALGOLIA_API_KEY`).
#[derive(Parser)]
#[command(
    name = "searchsync",
    about = "Keep a hosted search index in sync with a statically built site",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/searchsync.toml")]
    config: PathBuf,

    /// Log debug output (overridden by `RUST_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build records from the site and reconcile the remote index.
    ///
    /// In `diff` mode only new records are uploaded and stale ones deleted.
    /// In `atomic` mode the whole index is rebuilt under `<index>_tmp` and
    /// moved over the live index.
    Push {
        /// Log every remote write instead of performing it.
        #[arg(long)]
        dry_run: bool,

        /// Reconciliation strategy; overrides `indexing.mode`.
        #[arg(long, value_enum)]
        mode: Option<SyncStrategy>,
    },

    /// Build records without contacting the remote index.
    Records {
        /// Write the records to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Push index settings if their fingerprint changed.
    Settings {
        /// Log the settings write instead of performing it.
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Push { dry_run, mode } => {
            cfg.indexing.dry_run |= dry_run;
            if let Some(mode) = mode {
                cfg.indexing.mode = mode;
            }
            push::run_push(&cfg, Arc::new(NoHooks)).await?;
        }
        Commands::Records { output } => {
            push::run_records(&cfg, Arc::new(NoHooks), output.as_deref()).await?;
        }
        Commands::Settings { dry_run } => {
            cfg.indexing.dry_run |= dry_run;
            push::run_settings(&cfg).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            if let Some(hint) = err.downcast_ref::<SyncError>().and_then(SyncError::remediation) {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
