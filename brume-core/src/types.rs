//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::{Error, Result};

/// Cluster identifier with validation
///
/// Every kernel resource a cluster owns (veth ends, bridge, container names)
/// derives its name from this identifier, so it must be unique system-wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterName(String);

impl ClusterName {
    /// Maximum length for cluster names
    ///
    /// The longest derived interface name is `<name>-dport`; interface names
    /// are capped at 15 characters by the kernel.
    pub const MAX_LENGTH: usize = 9;

    /// Create a new `ClusterName` with validation
    ///
    /// # Errors
    /// Returns error if the name is invalid (empty, too long, or contains
    /// invalid characters)
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Validate a cluster name
    fn validate(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidConfig {
                message: "Cluster name cannot be empty".to_string(),
            });
        }

        if name.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidConfig {
                message: format!("Cluster name too long (max {} chars)", Self::MAX_LENGTH),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidConfig {
                message: "Cluster name can only contain alphanumeric, dash, and underscore"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Get the cluster name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the namespace-side veth end
    #[must_use]
    pub fn namespace_end(&self) -> String {
        format!("{}-eth1", self.0)
    }

    /// Name of the bridge-side veth end
    #[must_use]
    pub fn bridge_end(&self) -> String {
        format!("{}-dport", self.0)
    }

    /// Name of the cluster's bridge domain
    #[must_use]
    pub fn bridge_domain(&self) -> String {
        format!("netns-{}", self.0)
    }

    /// Name of the container with the given sequence number
    #[must_use]
    pub fn container_name(&self, sequence: usize) -> String {
        format!("{}-{}", self.0, sequence)
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClusterName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ClusterName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ClusterName> for String {
    fn from(name: ClusterName) -> Self {
        name.0
    }
}

/// Process identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ProcessId(i32);

impl ProcessId {
    /// Create from raw PID
    #[must_use]
    pub const fn from_raw(pid: i32) -> Self {
        Self(pid)
    }

    /// Get the current process ID
    #[must_use]
    pub fn current() -> Self {
        #[allow(clippy::cast_possible_wrap)]
        Self(std::process::id() as i32)
    }

    /// Convert to `nix::unistd::Pid`
    #[must_use]
    pub const fn as_nix_pid(self) -> nix::unistd::Pid {
        nix::unistd::Pid::from_raw(self.0)
    }

    /// Get raw PID value
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<nix::unistd::Pid> for ProcessId {
    fn from(pid: nix::unistd::Pid) -> Self {
        Self(pid.as_raw())
    }
}

impl From<ProcessId> for nix::unistd::Pid {
    fn from(pid: ProcessId) -> Self {
        nix::unistd::Pid::from_raw(pid.0)
    }
}

/// Reference to a network namespace supplied by the topology emulator
///
/// The core never creates namespaces; it only wires resources into the ones
/// described here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRef {
    /// Namespace name (matches the emulated host name)
    pub name: String,
    /// Process owning the namespace
    pub pid: ProcessId,
    /// External-facing interface inside the namespace, e.g. `h1-eth0`
    pub external_if: String,
    /// Address assigned to the external interface
    pub external_addr: Ipv4Addr,
}

/// Record of a launched container
///
/// Records are append-only for the lifetime of a cluster; a relaunch produces
/// a new record, never an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    /// Generated container name, `<cluster>-<sequence>`
    pub name: String,
    /// Image the container was launched from
    pub image: String,
    /// Process id sampled from the runtime at launch time
    pub pid: ProcessId,
}
