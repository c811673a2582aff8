//! Container runtime port for pluggable implementations

use async_trait::async_trait;
use std::fmt;

use brume_core::{LaunchSpec, ProcessId, Result};

/// Opaque handle to a launched container
///
/// Wraps the runtime-scoped container name; valid until the container is
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    /// Create from a runtime-scoped name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The runtime-scoped name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for container runtime backends
///
/// This allows for different implementations:
/// - [`DockerCli`](crate::DockerCli) - Production, drives the docker CLI
/// - [`MockRuntime`](crate::MockRuntime) - Testing with synthetic process ids
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Launch a container attached to a bridge domain
    ///
    /// # Errors
    /// Returns [`brume_core::Error::ContainerLaunch`] if the runtime rejects
    /// the request (image unavailable, domain missing, name taken)
    async fn run(&self, spec: &LaunchSpec, domain: &str, name: &str) -> Result<ContainerHandle>;

    /// Resolve the monitorable process id of a running container
    ///
    /// # Errors
    /// Returns error if the container cannot be inspected
    async fn inspect(&self, handle: &ContainerHandle) -> Result<ProcessId>;

    /// Remove a container, stopping it if necessary
    ///
    /// # Errors
    /// Returns error if removal fails
    async fn remove(&self, handle: &ContainerHandle) -> Result<()>;
}
