//! Per-host cluster provisioning and the inter-host route mesh
//!
//! This crate owns the resource lifecycle coordination: each
//! [`HostCluster`] aggregates a virtual link, a bridge domain, a NAT rule
//! set, and containers, created in dependency order and torn down
//! symmetrically, with an [`Allocator`] serializing names and address pools
//! across clusters and a [`RouteMesh`] stitching the finished clusters into
//! a routable whole.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod allocator;
pub mod cluster;
pub mod domain;
pub mod mesh;

pub use allocator::Allocator;
pub use cluster::{ClusterState, HostCluster, TeardownReport};
pub use domain::BridgeDomain;
pub use mesh::{MeshFailure, MeshReport, RouteMesh};

// Re-export commonly used types
pub use brume_core::{ClusterName, ClusterSubnet, LaunchSpec, NamespaceRef, ProcessId};
