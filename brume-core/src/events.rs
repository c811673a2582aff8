//! Cluster lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClusterName, ClusterSubnet, ProcessId};

/// Events emitted during cluster lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// Cluster fully wired and networked
    Provisioned {
        /// Cluster name
        cluster: ClusterName,
        /// Subnet assigned to the cluster
        subnet: ClusterSubnet,
    },

    /// Container launched and recorded
    ContainerLaunched {
        /// Cluster name
        cluster: ClusterName,
        /// Generated container name
        container: String,
        /// Process id sampled from the runtime
        pid: ProcessId,
    },

    /// Static route installed toward a peer cluster
    RouteInstalled {
        /// Cluster receiving the route
        cluster: ClusterName,
        /// Destination subnet
        dest: ClusterSubnet,
        /// Next-hop address
        via: std::net::Ipv4Addr,
    },

    /// Cluster torn down
    TornDown {
        /// Cluster name
        cluster: ClusterName,
    },

    /// A resource could not be released during teardown
    TeardownIncomplete {
        /// Cluster name
        cluster: ClusterName,
        /// What could not be released
        message: String,
    },
}

impl ClusterEvent {
    /// Get the cluster name from any event
    #[must_use]
    pub const fn cluster(&self) -> &ClusterName {
        match self {
            Self::Provisioned { cluster, .. }
            | Self::ContainerLaunched { cluster, .. }
            | Self::RouteInstalled { cluster, .. }
            | Self::TornDown { cluster }
            | Self::TeardownIncomplete { cluster, .. } => cluster,
        }
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Provisioned { cluster, subnet } => {
                tracing::info!(
                    cluster = %cluster,
                    subnet = %subnet,
                    event = "provisioned",
                    "Cluster provisioned"
                );
            }
            Self::ContainerLaunched {
                cluster,
                container,
                pid,
            } => {
                tracing::info!(
                    cluster = %cluster,
                    container = %container,
                    pid = pid.as_raw(),
                    event = "container_launched",
                    "Container launched"
                );
            }
            Self::RouteInstalled { cluster, dest, via } => {
                tracing::debug!(
                    cluster = %cluster,
                    dest = %dest,
                    via = %via,
                    event = "route_installed",
                    "Route installed"
                );
            }
            Self::TornDown { cluster } => {
                tracing::info!(
                    cluster = %cluster,
                    event = "torn_down",
                    "Cluster torn down"
                );
            }
            Self::TeardownIncomplete { cluster, message } => {
                tracing::warn!(
                    cluster = %cluster,
                    message = %message,
                    event = "teardown_incomplete",
                    "Teardown incomplete"
                );
            }
        }
    }
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provisioned { cluster, subnet } => {
                write!(f, "Cluster {cluster} provisioned on {subnet}")
            }
            Self::ContainerLaunched {
                cluster,
                container,
                pid,
            } => {
                write!(f, "Cluster {cluster} launched {container} (pid {pid})")
            }
            Self::RouteInstalled { cluster, dest, via } => {
                write!(f, "Cluster {cluster} routes {dest} via {via}")
            }
            Self::TornDown { cluster } => write!(f, "Cluster {cluster} torn down"),
            Self::TeardownIncomplete { cluster, message } => {
                write!(f, "Cluster {cluster} teardown incomplete: {message}")
            }
        }
    }
}
