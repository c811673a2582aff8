//! Virtual point-to-point link between a namespace and its bridge domain

use std::sync::Arc;
use tracing::debug;

use brume_core::{ClusterName, ClusterSubnet, Error, ProcessId, Result};

use crate::port::{NetScope, SystemNetworking};

/// A veth pair wiring one cluster's namespace to its bridge domain
///
/// The pair is created once and destroyed once; after [`destroy`] it is not
/// reusable. One end stays host-side for bridge attachment, the other is
/// moved into the target namespace and carries the cluster's gateway
/// address.
///
/// [`destroy`]: VirtualLink::destroy
pub struct VirtualLink {
    ns_end: String,
    bridge_end: String,
    namespace_pid: Option<ProcessId>,
    net: Arc<dyn SystemNetworking>,
}

impl VirtualLink {
    /// Create the pair, both ends host-side and down
    ///
    /// # Errors
    /// Returns [`Error::ResourceCreation`] if a link with a derived name
    /// already exists or the kernel rejects the operation
    pub async fn create(net: Arc<dyn SystemNetworking>, cluster: &ClusterName) -> Result<Self> {
        let ns_end = cluster.namespace_end();
        let bridge_end = cluster.bridge_end();

        net.create_veth(&ns_end, &bridge_end).await?;
        debug!(ns_end, bridge_end, "Virtual link created");

        Ok(Self {
            ns_end,
            bridge_end,
            namespace_pid: None,
            net,
        })
    }

    /// Namespace-side interface name
    #[must_use]
    pub fn ns_end(&self) -> &str {
        &self.ns_end
    }

    /// Bridge-side interface name
    #[must_use]
    pub fn bridge_end(&self) -> &str {
        &self.bridge_end
    }

    /// Scope the namespace-side end currently lives in
    fn ns_scope(&self) -> NetScope {
        self.namespace_pid.map_or(NetScope::Host, NetScope::Namespace)
    }

    /// Move the namespace-side end into the target namespace
    ///
    /// # Errors
    /// Returns [`Error::NamespaceUnavailable`] if the owning process is gone
    pub async fn move_to_namespace(&mut self, pid: ProcessId) -> Result<()> {
        if !self.net.namespace_alive(pid).await {
            return Err(Error::NamespaceUnavailable { pid: pid.as_raw() });
        }

        self.net.move_to_namespace(&self.ns_end, pid).await?;
        self.namespace_pid = Some(pid);
        Ok(())
    }

    /// Bring both ends administratively up (idempotent)
    ///
    /// # Errors
    /// Returns error if either end cannot be brought up
    pub async fn bring_up(&self) -> Result<()> {
        self.net
            .set_link_up(self.ns_scope(), &self.ns_end)
            .await?;
        self.net
            .set_link_up(NetScope::Host, &self.bridge_end)
            .await?;
        Ok(())
    }

    /// Assign the cluster's gateway address to the namespace-side end
    ///
    /// # Errors
    /// Returns error if the end has not been moved into a namespace yet or
    /// the assignment fails
    pub async fn assign_gateway(&self, subnet: &ClusterSubnet) -> Result<()> {
        let Some(pid) = self.namespace_pid else {
            return Err(Error::InvalidConfig {
                message: format!("{} not yet moved into a namespace", self.ns_end),
            });
        };

        self.net
            .assign_address(
                NetScope::Namespace(pid),
                &self.ns_end,
                subnet.gateway(),
                ClusterSubnet::PREFIX,
            )
            .await
    }

    /// Destroy the pair, tolerating ends that are already gone
    ///
    /// A namespace exiting removes its end automatically, and removing one
    /// end removes the peer, so this only deletes whichever end can still be
    /// observed.
    ///
    /// # Errors
    /// Returns error only if a still-present end cannot be deleted
    pub async fn destroy(&self) -> Result<()> {
        let ns_scope = self.ns_scope();

        let ns_reachable = match ns_scope {
            NetScope::Host => true,
            NetScope::Namespace(pid) => self.net.namespace_alive(pid).await,
        };

        if ns_reachable && self.net.link_exists(ns_scope, &self.ns_end).await? {
            self.net.delete_link(ns_scope, &self.ns_end).await?;
            debug!(ns_end = %self.ns_end, "Virtual link destroyed");
            return Ok(());
        }

        if self
            .net
            .link_exists(NetScope::Host, &self.bridge_end)
            .await?
        {
            self.net
                .delete_link(NetScope::Host, &self.bridge_end)
                .await?;
            debug!(bridge_end = %self.bridge_end, "Virtual link destroyed");
        }

        Ok(())
    }
}

impl std::fmt::Debug for VirtualLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualLink")
            .field("ns_end", &self.ns_end)
            .field("bridge_end", &self.bridge_end)
            .field("namespace_pid", &self.namespace_pid)
            .finish_non_exhaustive()
    }
}
