//! Inter-cluster static route mesh

use std::sync::Arc;
use tracing::{debug, info, warn};

use brume_core::{ClusterEvent, ClusterName, Error, Result};
use brume_net::{NetScope, RouteOutcome, StaticRoute, SystemNetworking};

use crate::cluster::{ClusterState, HostCluster};

/// A route that could not be installed for one ordered cluster pair
#[derive(Debug)]
pub struct MeshFailure {
    /// Cluster whose namespace was the install target
    pub source: ClusterName,
    /// Cluster whose subnet was the destination
    pub dest: ClusterName,
    /// Why the install failed
    pub error: Error,
}

/// Outcome of a mesh build
///
/// Per-pair failures are collected rather than raised, so one bad pair does
/// not abort the rest of the mesh.
#[derive(Debug, Default)]
pub struct MeshReport {
    /// Routes newly installed
    pub installed: usize,
    /// Routes that were already present from a prior run
    pub already_present: usize,
    /// Pairs that failed
    pub failures: Vec<MeshFailure>,
}

impl MeshReport {
    /// Whether every pair is now routed
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Builds the full inter-cluster route mesh
///
/// For every ordered pair `(A, B)` of distinct clusters, installs on `A`'s
/// namespace a static route to `B`'s subnet with `B`'s external address as
/// next hop. O(N²) installs for N clusters; rebuilding after a partial prior
/// run is safe because identical routes are no-ops.
pub struct RouteMesh {
    net: Arc<dyn SystemNetworking>,
}

impl RouteMesh {
    /// Create a mesh builder
    #[must_use]
    pub fn new(net: Arc<dyn SystemNetworking>) -> Self {
        Self { net }
    }

    /// Install routes for every ordered pair of clusters
    ///
    /// # Errors
    /// Returns error if any cluster has not reached
    /// [`ClusterState::Networked`]; per-pair install failures do not error,
    /// they are collected in the report
    pub async fn build(&self, clusters: &[&HostCluster]) -> Result<MeshReport> {
        for cluster in clusters {
            if !matches!(
                cluster.state(),
                ClusterState::Networked | ClusterState::Populated
            ) {
                return Err(Error::InvalidConfig {
                    message: format!(
                        "cluster {} is {}, meshing requires networked clusters",
                        cluster.name(),
                        cluster.state()
                    ),
                });
            }
        }

        info!(clusters = clusters.len(), "Building route mesh");
        let mut report = MeshReport::default();

        for source in clusters {
            let scope = NetScope::Namespace(source.namespace().pid);

            for dest in clusters {
                if source.name() == dest.name() {
                    continue;
                }

                // The next hop is only resolvable while the peer's
                // namespace is on the fabric
                if !self.net.namespace_alive(dest.namespace().pid).await {
                    report.failures.push(MeshFailure {
                        source: source.name().clone(),
                        dest: dest.name().clone(),
                        error: Error::RouteInstall {
                            message: format!(
                                "next hop {} unreachable: namespace gone",
                                dest.namespace().external_addr
                            ),
                        },
                    });
                    continue;
                }

                let route = StaticRoute {
                    dest: dest.subnet(),
                    via: dest.namespace().external_addr,
                    device: source.namespace().external_if.clone(),
                };

                match self.net.add_route(scope, &route).await {
                    Ok(RouteOutcome::Installed) => {
                        report.installed += 1;
                        ClusterEvent::RouteInstalled {
                            cluster: source.name().clone(),
                            dest: dest.subnet(),
                            via: dest.namespace().external_addr,
                        }
                        .emit_trace();
                    }
                    Ok(RouteOutcome::AlreadyPresent) => {
                        report.already_present += 1;
                        debug!(
                            source = %source.name(),
                            dest = %dest.name(),
                            "Route already present"
                        );
                    }
                    Err(error) => {
                        warn!(
                            source = %source.name(),
                            dest = %dest.name(),
                            %error,
                            "Route install failed"
                        );
                        report.failures.push(MeshFailure {
                            source: source.name().clone(),
                            dest: dest.name().clone(),
                            error,
                        });
                    }
                }
            }
        }

        info!(
            installed = report.installed,
            already_present = report.already_present,
            failed = report.failures.len(),
            "Route mesh built"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for RouteMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMesh").finish_non_exhaustive()
    }
}
