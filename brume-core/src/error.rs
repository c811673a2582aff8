//! Error types for Brume

use thiserror::Error;

/// Brume error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Kernel-level link or bridge operation rejected
    #[error("Resource creation failed: {message}")]
    ResourceCreation {
        /// Error message
        message: String,
    },

    /// Target namespace process is gone
    #[error("Namespace unavailable: process {pid} no longer exists")]
    NamespaceUnavailable {
        /// Process id that owned the namespace
        pid: i32,
    },

    /// Subnet overlaps an already-registered address pool
    #[error("Address pool conflict: {subnet} overlaps registered pool {existing}")]
    AddressPoolConflict {
        /// The rejected subnet
        subnet: String,
        /// The registered pool it overlaps
        existing: String,
    },

    /// Interface binding failure
    #[error("Attach error: {message}")]
    Attach {
        /// Error message
        message: String,
    },

    /// Container runtime rejected a launch request
    #[error("Container launch failed: {message}")]
    ContainerLaunch {
        /// Error message
        message: String,
    },

    /// Static route could not be installed
    #[error("Route install failed: {message}")]
    RouteInstall {
        /// Error message
        message: String,
    },

    /// External call exceeded its deadline
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// Operation that timed out
        operation: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),
}

/// Result type alias for Brume operations
pub type Result<T> = std::result::Result<T, Error>;
