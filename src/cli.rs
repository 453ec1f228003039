//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "jobtriage")]
#[command(author, version, about = "Automated triage for failed batch jobs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory containing config.toml (default: current directory)
    #[arg(long, global = true, env = "TRIAGE_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Triage a single failed run
    Run {
        /// Job identifier
        job_id: String,

        /// Run identifier of the failed run
        run_id: String,

        /// Attempt number within the lineage (1 for the first failure)
        #[arg(long, default_value = "1")]
        attempt: u32,
    },

    /// Scan for recently failed runs and triage each one
    Scan {
        /// Only consider runs that failed within this many hours
        #[arg(long, default_value = "24")]
        max_age_hours: u64,
    },

    /// Show the effective configuration (secrets redacted)
    Config,

    /// Drop decision records older than the retention window
    Compact,
}
