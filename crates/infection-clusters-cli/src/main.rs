//! Infection Clusters CLI
//!
//! Command-line caller for the infection cluster detection core.
//!
//! # Commands
//!
//! - `import`: Load `transfers.csv` and `microbiology.csv`, replacing stored data
//! - `clusters`: Patient clusters per infection
//! - `stats`: Dashboard statistics
//! - `location-clusters`: Per-location clusters for one infection
//! - `cases`: Positive cases with location and timing
//! - `location-stats`: Per-location infection rates
//! - `health`: Database connectivity
//!
//! Output goes to stdout, logs to stderr. Exit code 1 on any error.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

use commands::{CaseArgs, ClustersArgs, ImportArgs, LocationClustersArgs};

/// Infection Clusters - hospital infection cluster detection
#[derive(Parser, Debug)]
#[command(name = "infection-clusters")]
#[command(author = "Infection Clusters Team")]
#[command(version = "0.1.0")]
#[command(about = "Detect hospital infection clusters from ward transfers and microbiology results")]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// SQLite database path
    #[arg(
        long,
        env = "INFECTION_CLUSTERS_DB",
        default_value = "infection_clusters.db",
        global = true
    )]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Replace stored records with the contents of two CSV files
    Import(ImportArgs),
    /// Detect patient clusters for every infection
    ///
    /// Refuses to run until both stays and tests have been imported.
    Clusters(ClustersArgs),
    /// Print record counts and cluster totals
    Stats,
    /// Per-location clusters for one infection
    LocationClusters(LocationClustersArgs),
    /// Positive cases joined to the patient's stays
    Cases(CaseArgs),
    /// Per-location patient totals and infection rates
    LocationStats(CaseArgs),
    /// Check database connectivity
    Health,
}

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    std::process::exit(run(cli.command, &cli.db, &mut out));
}

/// Execute one command and flush its output. Returns the process exit code.
fn run(command: Commands, db: &Path, out: &mut impl Write) -> i32 {
    let result = commands::execute(command, db, &mut *out)
        .and_then(|()| out.flush().context("Failed to flush output"));

    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {:#}", e);
            1
        }
    }
}
