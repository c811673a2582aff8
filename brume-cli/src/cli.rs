//! CLI argument definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "brume")]
#[command(about = "Multi-host container cluster provisioner", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision every host cluster in a scenario, launch its containers,
    /// build the route mesh, and tear everything down on Ctrl-C
    Up(UpArgs),

    /// Validate a scenario file without touching the system
    Check {
        /// Scenario file
        #[arg(short, long)]
        scenario: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Args)]
pub struct UpArgs {
    /// Scenario file describing hosts and their containers
    #[arg(short, long)]
    pub scenario: PathBuf,

    /// Print per-container CPU utilization on this interval (seconds)
    #[arg(long)]
    pub sample_interval: Option<u64>,

    /// Timeout for individual networking commands (seconds)
    #[arg(long, default_value = "10")]
    pub timeout: u64,
}
