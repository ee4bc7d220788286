//! quill-daemon: Trigger a silent synchronization from the host scheduler.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sync_daemon::{DaemonPaths, build_context};
use sync_story::{SyncRuns, synchronize_at_shutdown, synchronize_at_startup};

#[derive(Parser, Debug)]
#[command(name = "quill-daemon")]
#[command(about = "Headless note synchronization")]
struct Args {
    /// Path to the local notes repository file
    #[arg(long)]
    notes_file: PathBuf,

    /// Path to the settings file
    #[arg(long)]
    settings_file: PathBuf,

    /// Directory acting as the cloud storage
    #[arg(long)]
    cloud_dir: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    trigger: Trigger,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Trigger {
    /// Synchronize at application startup
    Startup,
    /// Synchronize at application shutdown
    Shutdown,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG; --verbose flips the default filter to debug.
    let default_filter = if args.verbose {
        "debug,sync_daemon=debug"
    } else {
        "info,sync_daemon=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(?args.trigger, "starting quill-daemon");

    let paths = DaemonPaths {
        notes_file: args.notes_file,
        settings_file: args.settings_file,
        cloud_dir: args.cloud_dir,
    };
    let context = build_context(&paths)?;
    let runs = SyncRuns::new();

    let report = match args.trigger {
        Trigger::Startup => synchronize_at_startup(context, &runs).await,
        Trigger::Shutdown => synchronize_at_shutdown(context, &runs).await,
    };

    // The report is the whole interface to the scheduler.
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!(
        succeeded = report.succeeded,
        changed = report.changed(),
        "quill-daemon done"
    );
    Ok(())
}
