//! overlay-gc: reclaim orphaned overlay layers and report runtime disk usage
//!
//! `reclaim` asks the container runtime which layers are referenced by any
//! container or image, then deletes every other directory under the storage
//! root and writes the audit log. `orphans` shows what `reclaim` would delete.
//! `report` prints a disk usage summary.
//!
//! # Exit Status
//!
//! - `0`: the pass completed, even if some directories were skipped or could
//!   not be deleted, or the audit log could not be written (the deleted
//!   layers are then listed on stdout)
//! - `2`: the runtime could not be queried; nothing was deleted
//! - `1`: any other error (bad configuration, missing storage root)
//!
//! Logs go to stderr (`RUST_LOG` adjusts verbosity); tables and JSON go to
//! stdout.

mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use overlay_gc::config::split_command;
use overlay_gc::*;
use output::{OutputFormat, print_reclaim, print_usage};
use tracing_subscriber::EnvFilter;

/// Exit status when the liveness oracle could not be queried.
const EXIT_ORACLE_UNAVAILABLE: u8 = 2;

#[derive(Parser)]
#[command(name = "overlay-gc")]
#[command(about = "Reclaim orphaned overlay layer directories", long_about = None)]
struct Cli {
    /// Configuration file (default: /etc/overlay-gc.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Overlay storage root, e.g. /var/lib/docker/overlay2
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Path of the deletion audit log
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Runtime command, e.g. "docker" or "sudo docker"
    #[arg(long, global = true)]
    runtime: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete layer directories not referenced by any container or image
    Reclaim {
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
        /// Output format (table or json)
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// List orphaned layer directories without deleting them
    #[command(visible_alias = "ls")]
    Orphans {
        /// Output format (table or json)
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show disk usage by containers, images, build cache and volumes
    #[command(visible_alias = "df")]
    Report {
        /// Output format (table or json)
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Reclaim { dry_run, format } => reclaim(&config, dry_run, format),
        Commands::Orphans { format } => reclaim(&config, true, format),
        Commands::Report { format } => report(&config, format),
    }
}

/// Layer file, environment and command-line settings.
fn load_config(cli: &Cli) -> Result<ReclaimConfig> {
    let mut config =
        ReclaimConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(root) = &cli.root {
        config.storage_root = root.clone();
    }
    if let Some(log) = &cli.audit_log {
        config.audit_log = log.clone();
    }
    if let Some(runtime) = &cli.runtime {
        config.runtime = split_command(runtime);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn reclaim(config: &ReclaimConfig, dry_run: bool, format: OutputFormat) -> Result<ExitCode> {
    if !dry_run && !rustix::process::geteuid().is_root() {
        tracing::warn!("not running as root; root-owned layer directories will be skipped");
    }

    let oracle = RuntimeOracle::new(
        RuntimeCli::new(config.runtime.clone()),
        config.driver_dir_name()?,
    );
    let root = OverlayRoot::open(&config.storage_root).context("Failed to open storage root")?;

    match run_pass(&oracle, &root, config, dry_run) {
        Ok(report) => {
            print_reclaim(&report, config, dry_run, format)
                .context("Failed to output reclaim report")?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_oracle_failure() => {
            let e = anyhow::Error::from(e);
            tracing::error!("{:#}; nothing was deleted", e);
            Ok(ExitCode::from(EXIT_ORACLE_UNAVAILABLE))
        }
        Err(e) => Err(e).context("Reclaim pass failed"),
    }
}

fn report(config: &ReclaimConfig, format: OutputFormat) -> Result<ExitCode> {
    let cli = RuntimeCli::new(config.runtime.clone());
    let usage = usage::collect(&cli);
    print_usage(&usage, format).context("Failed to output usage report")?;
    Ok(ExitCode::SUCCESS)
}
