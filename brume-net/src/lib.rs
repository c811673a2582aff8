//! System networking with pluggable backends
//!
//! This crate provides a trait-based abstraction over the kernel networking
//! operations a cluster needs (veth pairs, bridges, NAT rules, static
//! routes), including production and mock implementations, plus the
//! virtual-link and NAT components built on top of it.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod command;
pub mod link;
pub mod mock;
pub mod nat;
pub mod port;

pub use command::CommandNetworking;
pub use link::VirtualLink;
pub use mock::MockNetworking;
pub use nat::NatRuleSet;
pub use port::{NatRule, NetScope, RouteOutcome, StaticRoute, SystemNetworking};

// Re-export commonly used types
pub use brume_core::{ClusterName, ClusterSubnet, ProcessId};
