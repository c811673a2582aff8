//! Scenario file loading and validation

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;

use brume_core::{ClusterName, ClusterSubnet, LaunchSpec, NamespaceRef, ProcessId};

/// One emulated host: its namespace identity plus the containers to run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    /// Cluster name; derives every generated resource name
    pub name: ClusterName,

    /// Process id owning the host's network namespace
    pub pid: i32,

    /// External-facing interface inside the namespace
    pub external_if: String,

    /// Address of the external interface
    pub external_addr: Ipv4Addr,

    /// Explicit subnet; drawn from the allocator sequence when omitted
    #[serde(default)]
    pub subnet: Option<ClusterSubnet>,

    /// Containers to launch on this host
    #[serde(default)]
    pub containers: Vec<LaunchSpec>,
}

impl HostEntry {
    /// The namespace reference the cluster binds to
    #[must_use]
    pub fn namespace(&self) -> NamespaceRef {
        NamespaceRef {
            name: self.name.as_str().to_string(),
            pid: ProcessId::from_raw(self.pid),
            external_if: self.external_if.clone(),
            external_addr: self.external_addr,
        }
    }
}

/// A full scenario: the host set supplied by the topology emulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Hosts in provisioning order
    pub hosts: Vec<HostEntry>,
}

impl Scenario {
    /// Load and validate a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        let scenario: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))?;

        scenario.validate()?;
        Ok(scenario)
    }

    /// Check the host set for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            bail!("Scenario has no hosts");
        }

        let mut names = HashSet::new();
        for host in &self.hosts {
            if !names.insert(host.name.clone()) {
                bail!("Duplicate host name: {}", host.name);
            }
            if host.pid <= 0 {
                bail!("Host {}: invalid pid {}", host.name, host.pid);
            }
        }

        let explicit: Vec<_> = self
            .hosts
            .iter()
            .filter_map(|h| h.subnet.map(|s| (h.name.clone(), s)))
            .collect();
        for (index, (name, subnet)) in explicit.iter().enumerate() {
            for (other_name, other) in &explicit[index + 1..] {
                if subnet.overlaps(other) {
                    bail!(
                        "Hosts {name} and {other_name} have overlapping subnets ({subnet}, {other})"
                    );
                }
            }
        }

        Ok(())
    }
}
