//! Brume cluster provisioner CLI
//!
//! Provisions per-host container clusters bridged into network namespaces
//! and stitches them into a routable multi-host network.

use clap::Parser;
use std::process;
use tracing::Level;

mod cli;
mod scenario;
mod up;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Execute the command
    let result = match cli.command {
        Commands::Up(args) => up::execute(args).await,
        Commands::Check { scenario } => check(&scenario),
        Commands::Version => {
            print_version();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn check(path: &std::path::Path) -> anyhow::Result<()> {
    let scenario = scenario::Scenario::load(path)?;
    println!(
        "Scenario OK: {} host(s), {} container(s)",
        scenario.hosts.len(),
        scenario
            .hosts
            .iter()
            .map(|h| h.containers.len())
            .sum::<usize>()
    );
    Ok(())
}

fn print_version() {
    println!("Brume cluster provisioner");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Features:");
    println!("  • Per-namespace bridge domains over veth pairs");
    println!("  • NAT egress and inter-cluster route meshing");
    println!("  • Container lifecycle via the runtime port");
    println!("  • Per-container CPU utilization sampling");
}
