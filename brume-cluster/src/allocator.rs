//! Name and address pool allocation

use std::collections::BTreeMap;
use std::sync::Mutex;

use brume_core::{ClusterName, ClusterSubnet, Error, Result};

/// First block index issued by the sequential allocator
const FIRST_SUBNET_INDEX: u8 = 11;

/// Serialized allocator for cluster names and subnets
///
/// All name generation and subnet registration flows through one of these so
/// no two clusters can receive colliding names or overlapping pools. It also
/// owns the global firewall gate: firewall rule insertion is not atomic
/// across a whole rule set, so installs from different clusters must not
/// interleave.
pub struct Allocator {
    state: Mutex<AllocState>,
    firewall_gate: tokio::sync::Mutex<()>,
}

struct AllocState {
    names: Vec<ClusterName>,
    pools: BTreeMap<ClusterName, ClusterSubnet>,
    next_index: u8,
}

impl Allocator {
    /// Create an empty allocator
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AllocState {
                names: Vec::new(),
                pools: BTreeMap::new(),
                next_index: FIRST_SUBNET_INDEX,
            }),
            firewall_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Reserve a cluster name
    ///
    /// # Errors
    /// Returns error if the name is already in use
    pub fn reserve_name(&self, name: &ClusterName) -> Result<()> {
        let mut state = self.lock();

        if state.names.contains(name) {
            return Err(Error::InvalidConfig {
                message: format!("cluster name {name} already in use"),
            });
        }

        state.names.push(name.clone());
        Ok(())
    }

    /// Release a cluster name (idempotent)
    pub fn release_name(&self, name: &ClusterName) {
        self.lock().names.retain(|n| n != name);
    }

    /// Register a cluster's address pool
    ///
    /// # Errors
    /// Returns [`Error::AddressPoolConflict`] if the subnet overlaps any
    /// registered pool
    pub fn reserve_pool(&self, name: &ClusterName, subnet: ClusterSubnet) -> Result<()> {
        let mut state = self.lock();

        for (owner, existing) in &state.pools {
            if existing.overlaps(&subnet) {
                return Err(Error::AddressPoolConflict {
                    subnet: subnet.to_string(),
                    existing: format!("{existing} ({owner})"),
                });
            }
        }

        state.pools.insert(name.clone(), subnet);
        Ok(())
    }

    /// Release a cluster's address pool (idempotent)
    pub fn release_pool(&self, name: &ClusterName) {
        self.lock().pools.remove(name);
    }

    /// Issue the next free `192.168.<n>.0/24` block
    ///
    /// Advances past blocks that overlap registered pools; issued blocks are
    /// consumed whether or not they are later registered.
    ///
    /// # Errors
    /// Returns error when the sequence is exhausted
    pub fn next_subnet(&self) -> Result<ClusterSubnet> {
        let mut state = self.lock();

        while state.next_index < u8::MAX {
            let candidate = ClusterSubnet::from_index(state.next_index);
            state.next_index += 1;

            if !state.pools.values().any(|pool| pool.overlaps(&candidate)) {
                return Ok(candidate);
            }
        }

        Err(Error::InvalidConfig {
            message: "subnet sequence exhausted".to_string(),
        })
    }

    /// Number of registered pools
    #[must_use]
    pub fn registered_pools(&self) -> usize {
        self.lock().pools.len()
    }

    /// The gate serializing firewall mutations across clusters
    #[must_use]
    pub const fn firewall_gate(&self) -> &tokio::sync::Mutex<()> {
        &self.firewall_gate
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AllocState> {
        // Allocator state is only touched between awaits; a poisoned lock
        // means a panic already unwound a reservation mid-update.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator")
            .field("registered_pools", &self.registered_pools())
            .finish_non_exhaustive()
    }
}
