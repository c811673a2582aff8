//! Bridge domain lifecycle

use std::sync::Arc;
use tracing::{debug, warn};

use brume_core::{ClusterName, ClusterSubnet, Result};
use brume_net::{NetScope, SystemNetworking};

use crate::allocator::Allocator;

/// One cluster's isolated layer-2 domain with its address pool
///
/// Exists iff the pool is registered with the allocator and the underlying
/// bridge has been created; both happen in [`create`] and are undone in
/// [`destroy`].
///
/// [`create`]: BridgeDomain::create
/// [`destroy`]: BridgeDomain::destroy
pub struct BridgeDomain {
    cluster: ClusterName,
    name: String,
    subnet: ClusterSubnet,
    net: Arc<dyn SystemNetworking>,
    allocator: Arc<Allocator>,
}

impl BridgeDomain {
    /// Register the address pool and create the bridge
    ///
    /// # Errors
    /// Returns [`brume_core::Error::AddressPoolConflict`] if the subnet
    /// overlaps a registered pool, or the creation error with the pool
    /// released again
    pub async fn create(
        net: Arc<dyn SystemNetworking>,
        allocator: Arc<Allocator>,
        cluster: &ClusterName,
        subnet: ClusterSubnet,
    ) -> Result<Self> {
        allocator.reserve_pool(cluster, subnet)?;

        let name = cluster.bridge_domain();
        if let Err(error) = net.create_bridge(&name, subnet).await {
            allocator.release_pool(cluster);
            return Err(error);
        }

        debug!(bridge = %name, %subnet, "Bridge domain created");
        Ok(Self {
            cluster: cluster.clone(),
            name,
            subnet,
            net,
            allocator,
        })
    }

    /// Bridge name containers attach to
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address pool of the domain
    #[must_use]
    pub const fn subnet(&self) -> ClusterSubnet {
        self.subnet
    }

    /// Bind an interface into the domain and bring it up
    ///
    /// # Errors
    /// Returns [`brume_core::Error::Attach`] if the interface does not exist
    /// or is already attached elsewhere
    pub async fn attach(&self, ifname: &str) -> Result<()> {
        self.net.attach_interface(&self.name, ifname).await?;
        self.net.set_link_up(NetScope::Host, ifname).await?;

        debug!(bridge = %self.name, ifname, "Interface attached");
        Ok(())
    }

    /// Delete the bridge and release the pool, failing softly
    ///
    /// Callers must remove containers first; a bridge that is still busy
    /// produces a warning instead of aborting the broader teardown, and its
    /// pool stays reserved because the kernel resource still exists.
    pub async fn destroy(&self) -> Option<String> {
        match self.net.delete_bridge(&self.name).await {
            Ok(()) => {
                self.allocator.release_pool(&self.cluster);
                debug!(bridge = %self.name, "Bridge domain destroyed");
                None
            }
            Err(error) => {
                warn!(bridge = %self.name, %error, "Failed to destroy bridge domain");
                Some(format!("{}: {error}", self.name))
            }
        }
    }
}

impl std::fmt::Debug for BridgeDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeDomain")
            .field("name", &self.name)
            .field("subnet", &self.subnet)
            .finish_non_exhaustive()
    }
}
