//! Container runtime access with pluggable backends
//!
//! This crate provides the runtime port a cluster launches containers
//! through (run/inspect/remove), with a docker-CLI-backed production
//! implementation and a mock for tests, plus the read-only CPU utilization
//! sampler built on the process ids clusters expose.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod docker;
pub mod mock;
pub mod port;
pub mod sampler;

pub use docker::DockerCli;
pub use mock::MockRuntime;
pub use port::{ContainerHandle, ContainerRuntime};
pub use sampler::{CpuSample, UtilizationSampler};

// Re-export commonly used types
pub use brume_core::{ContainerRecord, LaunchSpec, ProcessId};
