//! Typed container launch configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Restart policy applied to a launched container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Maximum restart attempts before the runtime gives up
    pub max_retries: u32,
}

impl RestartPolicy {
    /// Restart up to `max_retries` times on failure
    #[must_use]
    pub const fn on_failure(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Whether the runtime should restart the container at all
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }
}

/// Launch configuration for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
    /// Image reference, e.g. `tz70s/node-server`
    pub image: String,

    /// Restart policy
    #[serde(default)]
    pub restart_policy: RestartPolicy,

    /// Environment variables passed to the container
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Command override; empty means the image default
    #[serde(default)]
    pub command: Vec<String>,
}

impl LaunchSpec {
    /// Create a spec running the image's default command
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            restart_policy: RestartPolicy::default(),
            environment: BTreeMap::new(),
            command: Vec::new(),
        }
    }

    /// Set the restart policy
    #[must_use]
    pub const fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Override the container command
    #[must_use]
    pub fn with_command(mut self, command: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }
}
