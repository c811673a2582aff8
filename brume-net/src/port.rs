//! System networking port for pluggable implementations

use async_trait::async_trait;
use std::fmt;
use std::net::Ipv4Addr;

use brume_core::{ClusterSubnet, ProcessId, Result};

/// Where a networking operation executes
///
/// Host-side operations act on the provisioning context's own network stack;
/// namespace-scoped operations act inside the network namespace owned by the
/// given process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetScope {
    /// The provisioning context's network stack
    Host,
    /// The network namespace owned by this process
    Namespace(ProcessId),
}

impl fmt::Display for NetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Namespace(pid) => write!(f, "netns:{pid}"),
        }
    }
}

/// One packet-translation or forwarding rule
///
/// A cluster's NAT state is exactly three of these, installed and removed as
/// a matched set (see [`crate::NatRuleSet`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NatRule {
    /// Source-address translation for traffic egressing `out_if`
    Masquerade {
        /// Egress interface
        out_if: String,
    },
    /// Forward acceptance for established/related return traffic
    ForwardReturn {
        /// Ingress interface
        in_if: String,
        /// Egress interface
        out_if: String,
    },
    /// Forward acceptance for new traffic from `in_if` toward `out_if`
    ForwardNew {
        /// Ingress interface
        in_if: String,
        /// Egress interface
        out_if: String,
    },
}

impl fmt::Display for NatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Masquerade { out_if } => write!(f, "masquerade out {out_if}"),
            Self::ForwardReturn { in_if, out_if } => {
                write!(f, "forward established {in_if} -> {out_if}")
            }
            Self::ForwardNew { in_if, out_if } => write!(f, "forward new {in_if} -> {out_if}"),
        }
    }
}

/// A static route toward a peer cluster's subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    /// Destination subnet
    pub dest: ClusterSubnet,
    /// Next-hop address
    pub via: Ipv4Addr,
    /// Interface the route egresses through
    pub device: String,
}

impl fmt::Display for StaticRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {} dev {}", self.dest, self.via, self.device)
    }
}

/// Result of a route installation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The route was installed
    Installed,
    /// An identical route was already present; nothing changed
    AlreadyPresent,
}

/// Trait for system networking backends
///
/// This allows for different implementations:
/// - [`CommandNetworking`](crate::CommandNetworking) - Production, drives
///   `ip`/`iptables` and the runtime's network API
/// - [`MockNetworking`](crate::MockNetworking) - Testing without touching
///   kernel state
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait SystemNetworking: Send + Sync {
    /// Create a paired virtual interface, both ends host-side
    ///
    /// # Errors
    /// Returns error if either name already exists or the kernel rejects the
    /// operation
    async fn create_veth(&self, ns_end: &str, bridge_end: &str) -> Result<()>;

    /// Move an interface into the namespace owned by `pid`
    ///
    /// # Errors
    /// Returns [`brume_core::Error::NamespaceUnavailable`] if the process is
    /// gone
    async fn move_to_namespace(&self, ifname: &str, pid: ProcessId) -> Result<()>;

    /// Bring an interface administratively up (idempotent)
    ///
    /// # Errors
    /// Returns error if the interface does not exist
    async fn set_link_up(&self, scope: NetScope, ifname: &str) -> Result<()>;

    /// Assign an address to an interface (idempotent)
    ///
    /// # Errors
    /// Returns error if the interface does not exist
    async fn assign_address(
        &self,
        scope: NetScope,
        ifname: &str,
        addr: Ipv4Addr,
        prefix: u8,
    ) -> Result<()>;

    /// Install one NAT/forwarding rule
    ///
    /// # Errors
    /// Returns error if the rule cannot be installed
    async fn install_nat_rule(&self, scope: NetScope, rule: &NatRule) -> Result<()>;

    /// Remove exactly one previously-installed rule
    ///
    /// # Errors
    /// Returns error if no matching rule exists
    async fn remove_nat_rule(&self, scope: NetScope, rule: &NatRule) -> Result<()>;

    /// Create an isolated bridge with the given address pool
    ///
    /// # Errors
    /// Returns error if the bridge already exists or creation is rejected
    async fn create_bridge(&self, name: &str, subnet: ClusterSubnet) -> Result<()>;

    /// Delete a bridge
    ///
    /// # Errors
    /// Returns error if the bridge does not exist or is busy
    async fn delete_bridge(&self, name: &str) -> Result<()>;

    /// Bind a host-side interface into a bridge and record the attachment
    ///
    /// # Errors
    /// Returns [`brume_core::Error::Attach`] if the interface does not exist
    /// or is already attached elsewhere
    async fn attach_interface(&self, bridge: &str, ifname: &str) -> Result<()>;

    /// Install a static route; installing an identical route is a no-op
    ///
    /// # Errors
    /// Returns [`brume_core::Error::RouteInstall`] if a differently-targeted
    /// route already covers the destination
    async fn add_route(&self, scope: NetScope, route: &StaticRoute) -> Result<RouteOutcome>;

    /// Delete an interface
    ///
    /// # Errors
    /// Returns error if the interface does not exist
    async fn delete_link(&self, scope: NetScope, ifname: &str) -> Result<()>;

    /// Whether an interface exists in the given scope
    ///
    /// # Errors
    /// Returns error if the existence query itself fails
    async fn link_exists(&self, scope: NetScope, ifname: &str) -> Result<bool>;

    /// Whether the process owning a namespace is still alive
    async fn namespace_alive(&self, pid: ProcessId) -> bool;
}
