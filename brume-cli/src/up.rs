//! Full scenario lifecycle: provision, launch, mesh, sample, tear down

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use brume_cluster::{Allocator, HostCluster, RouteMesh};
use brume_core::ContainerRecord;
use brume_net::CommandNetworking;
use brume_runtime::{DockerCli, UtilizationSampler};

use crate::cli::UpArgs;
use crate::scenario::Scenario;

pub async fn execute(args: UpArgs) -> Result<()> {
    info!("Starting Brume");

    // Kernel networking and firewall mutations need root
    if !nix::unistd::geteuid().is_root() {
        anyhow::bail!("Must run as root. Try: sudo brume up ...");
    }

    let scenario = Scenario::load(&args.scenario)?;
    info!(hosts = scenario.hosts.len(), "Scenario loaded");

    let net = Arc::new(CommandNetworking::new().with_timeout(Duration::from_secs(args.timeout)));
    let runtime = Arc::new(DockerCli::new());
    let allocator = Arc::new(Allocator::new());

    // Provision every host cluster; a failure rolls back the ones that
    // already succeeded so nothing is left half-built
    let mut clusters: Vec<HostCluster> = Vec::with_capacity(scenario.hosts.len());
    for host in &scenario.hosts {
        let subnet = match host.subnet {
            Some(subnet) => subnet,
            None => allocator.next_subnet()?,
        };

        let mut cluster = HostCluster::new(
            host.name.clone(),
            host.namespace(),
            subnet,
            net.clone(),
            runtime.clone(),
            allocator.clone(),
        );

        if let Err(error) = cluster.provision().await {
            warn!(cluster = %host.name, %error, "Provisioning failed, rolling back");
            teardown_all(&mut clusters).await;
            return Err(error).with_context(|| format!("Failed to provision {}", host.name));
        }

        info!(
            cluster = %host.name,
            subnet = %subnet,
            gateway = %subnet.gateway(),
            "Cluster ready"
        );
        clusters.push(cluster);
    }

    // Launch the scenario's containers
    for (host, cluster) in scenario.hosts.iter().zip(clusters.iter_mut()) {
        for spec in &host.containers {
            match cluster.launch_container(spec).await {
                Ok(record) => {
                    info!(
                        cluster = %host.name,
                        container = %record.name,
                        pid = record.pid.as_raw(),
                        "Container running"
                    );
                }
                Err(error) => {
                    warn!(cluster = %host.name, image = %spec.image, %error, "Launch failed");
                }
            }
        }
    }

    // Stitch the clusters together
    let mesh = RouteMesh::new(net.clone());
    let refs: Vec<&HostCluster> = clusters.iter().collect();
    let report = mesh.build(&refs).await?;
    for failure in &report.failures {
        warn!(
            source = %failure.source,
            dest = %failure.dest,
            error = %failure.error,
            "Route pair skipped"
        );
    }

    // Optional utilization sampling in the background
    let sampler_task = args.sample_interval.map(|interval| {
        let records: Vec<ContainerRecord> = clusters
            .iter()
            .flat_map(|c| c.containers().iter().cloned())
            .collect();
        tokio::spawn(sample_loop(records, Duration::from_secs(interval)))
    });

    info!("");
    info!("All clusters up. Press Ctrl+C to tear down...");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutting down...");

    if let Some(task) = sampler_task {
        task.abort();
    }

    teardown_all(&mut clusters).await;
    info!("Done");
    Ok(())
}

/// Tear down clusters in reverse dependency order, best-effort
async fn teardown_all(clusters: &mut [HostCluster]) {
    for cluster in clusters.iter_mut().rev() {
        let report = cluster.teardown().await;
        for warning in &report.warnings {
            warn!(cluster = %cluster.name(), warning = %warning, "Could not release");
        }
    }
}

/// Periodically print per-container CPU utilization
async fn sample_loop(records: Vec<ContainerRecord>, interval: Duration) {
    let sampler = UtilizationSampler::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let samples = sampler.sample(&records).await;
        if samples.is_empty() {
            continue;
        }

        println!("{:-<48}", "");
        println!("{:<24} {:<10} {:>8}", "Container", "PID", "CPU %");
        for sample in samples {
            println!(
                "{:<24} {:<10} {:>8.1}",
                sample.container,
                sample.pid.as_raw(),
                sample.cpu_percent
            );
        }
    }
}
