//! Subnet value object with gateway derivation

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::{Error, Result};

/// A cluster's `/24` address block
///
/// Every cluster owns exactly one `/24`; the gateway is always the `.1`
/// address of the block. Other components derive addresses from this
/// convention, so it must hold for any subnet accepted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterSubnet(Ipv4Network);

impl ClusterSubnet {
    /// Required prefix length for cluster subnets
    pub const PREFIX: u8 = 24;

    /// Create from a network, validating the `/24` convention
    ///
    /// # Errors
    /// Returns error if the prefix is not `/24` or the address is not the
    /// network address of the block
    pub fn new(network: Ipv4Network) -> Result<Self> {
        if network.prefix() != Self::PREFIX {
            return Err(Error::InvalidConfig {
                message: format!(
                    "Cluster subnets must be /{}, got /{}",
                    Self::PREFIX,
                    network.prefix()
                ),
            });
        }

        if network.ip() != network.network() {
            return Err(Error::InvalidConfig {
                message: format!(
                    "{} is not the network address of the block ({})",
                    network.ip(),
                    network.network()
                ),
            });
        }

        Ok(Self(network))
    }

    /// The `192.168.<index>.0/24` block, as issued by the allocator sequence
    #[must_use]
    pub fn from_index(index: u8) -> Self {
        let network = Ipv4Network::new(Ipv4Addr::new(192, 168, index, 0), Self::PREFIX)
            .expect("prefix 24 is always valid");
        Self(network)
    }

    /// Gateway address of the block, always the `.1` host
    #[must_use]
    pub fn gateway(&self) -> Ipv4Addr {
        let octets = self.0.network().octets();
        Ipv4Addr::new(octets[0], octets[1], octets[2], 1)
    }

    /// Underlying network
    #[must_use]
    pub const fn network(&self) -> Ipv4Network {
        self.0
    }

    /// Network address of the block
    #[must_use]
    pub fn network_addr(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Whether two subnets share any addresses
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.0.contains(other.0.network()) || other.0.contains(self.0.network())
    }
}

impl fmt::Display for ClusterSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClusterSubnet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let network = s.parse::<Ipv4Network>().map_err(|e| Error::InvalidConfig {
            message: format!("Invalid subnet '{s}': {e}"),
        })?;
        Self::new(network)
    }
}

impl TryFrom<String> for ClusterSubnet {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ClusterSubnet> for String {
    fn from(subnet: ClusterSubnet) -> Self {
        subnet.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_derivation() {
        let subnet: ClusterSubnet = "192.168.53.0/24".parse().unwrap();
        assert_eq!(subnet.gateway(), Ipv4Addr::new(192, 168, 53, 1));
    }

    #[test]
    fn test_rejects_non_slash_24() {
        assert!("10.0.0.0/16".parse::<ClusterSubnet>().is_err());
        assert!("10.0.0.0/25".parse::<ClusterSubnet>().is_err());
    }

    #[test]
    fn test_rejects_host_address() {
        assert!("192.168.53.7/24".parse::<ClusterSubnet>().is_err());
    }

    #[test]
    fn test_overlap() {
        let a: ClusterSubnet = "192.168.52.0/24".parse().unwrap();
        let b: ClusterSubnet = "192.168.53.0/24".parse().unwrap();
        let c: ClusterSubnet = "192.168.52.0/24".parse().unwrap();

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(a.overlaps(&a));
    }

    #[test]
    fn test_from_index() {
        let subnet = ClusterSubnet::from_index(11);
        assert_eq!(subnet.to_string(), "192.168.11.0/24");
        assert_eq!(subnet.gateway(), Ipv4Addr::new(192, 168, 11, 1));
    }

    #[test]
    fn test_subnet_serde() {
        let subnet: ClusterSubnet = "192.168.52.0/24".parse().unwrap();
        let json = serde_json::to_string(&subnet).unwrap();
        assert_eq!(json, "\"192.168.52.0/24\"");
        let deserialized: ClusterSubnet = serde_json::from_str(&json).unwrap();
        assert_eq!(subnet, deserialized);
    }
}
