//! Mock container runtime for testing (no docker daemon required)

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use brume_core::{Error, LaunchSpec, ProcessId, Result};

use crate::port::{ContainerHandle, ContainerRuntime};

/// First synthetic pid handed out by the mock
const PID_BASE: i32 = 40_000;

/// Mock runtime backend
///
/// Hands out synthetic, monotonically increasing process ids and records
/// which bridge domain every container was attached to.
#[derive(Clone)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    running: HashMap<ContainerHandle, RunningContainer>,
    next_pid: i32,
    known_domains: Option<HashSet<String>>,
    unavailable_images: HashSet<String>,
    fail_next_inspect: bool,
    fail_next_remove: bool,
    removed: Vec<String>,
}

struct RunningContainer {
    domain: String,
    image: String,
    pid: ProcessId,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            running: HashMap::new(),
            next_pid: PID_BASE,
            known_domains: None,
            unavailable_images: HashSet::new(),
            fail_next_inspect: false,
            fail_next_remove: false,
            removed: Vec::new(),
        }
    }
}

impl MockRuntime {
    /// Create a new mock runtime
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Restrict launches to the given domains; others fail like a missing
    /// docker network
    pub async fn restrict_domains(&self, domains: impl IntoIterator<Item = impl Into<String>>) {
        let set = domains.into_iter().map(Into::into).collect();
        self.state.lock().await.known_domains = Some(set);
    }

    /// Mark an image as unavailable; launches of it fail
    pub async fn mark_image_unavailable(&self, image: impl Into<String>) {
        self.state.lock().await.unavailable_images.insert(image.into());
    }

    /// Fail the next `inspect` call
    pub async fn fail_next_inspect(&self) {
        self.state.lock().await.fail_next_inspect = true;
    }

    /// Fail the next `remove` call
    pub async fn fail_next_remove(&self) {
        self.state.lock().await.fail_next_remove = true;
    }

    /// Number of containers currently running
    pub async fn running_count(&self) -> usize {
        self.state.lock().await.running.len()
    }

    /// Domain a running container is attached to
    pub async fn domain_of(&self, handle: &ContainerHandle) -> Option<String> {
        self.state
            .lock()
            .await
            .running
            .get(handle)
            .map(|c| c.domain.clone())
    }

    /// Names of containers that have been removed, in removal order
    pub async fn removed(&self) -> Vec<String> {
        self.state.lock().await.removed.clone()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRuntime").finish_non_exhaustive()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn run(&self, spec: &LaunchSpec, domain: &str, name: &str) -> Result<ContainerHandle> {
        let mut state = self.state.lock().await;

        if state.unavailable_images.contains(&spec.image) {
            return Err(Error::ContainerLaunch {
                message: format!("image {} unavailable", spec.image),
            });
        }

        if let Some(ref known) = state.known_domains
            && !known.contains(domain)
        {
            return Err(Error::ContainerLaunch {
                message: format!("network {domain} not found"),
            });
        }

        let handle = ContainerHandle::new(name);
        if state.running.contains_key(&handle) {
            return Err(Error::ContainerLaunch {
                message: format!("container name {name} already in use"),
            });
        }

        let pid = ProcessId::from_raw(state.next_pid);
        state.next_pid += 1;
        state.running.insert(
            handle.clone(),
            RunningContainer {
                domain: domain.to_string(),
                image: spec.image.clone(),
                pid,
            },
        );

        tracing::debug!(name, image = %spec.image, domain, "Mock: container started");
        Ok(handle)
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ProcessId> {
        let mut state = self.state.lock().await;

        if std::mem::take(&mut state.fail_next_inspect) {
            return Err(Error::ContainerLaunch {
                message: format!("inspect {handle}: injected failure"),
            });
        }

        state
            .running
            .get(handle)
            .map(|c| c.pid)
            .ok_or_else(|| Error::ContainerLaunch {
                message: format!("no such container: {handle}"),
            })
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<()> {
        let mut state = self.state.lock().await;

        if std::mem::take(&mut state.fail_next_remove) {
            return Err(Error::ContainerLaunch {
                message: format!("remove {handle}: injected failure"),
            });
        }

        let container = state
            .running
            .remove(handle)
            .ok_or_else(|| Error::ContainerLaunch {
                message: format!("no such container: {handle}"),
            })?;
        state.removed.push(handle.as_str().to_string());

        tracing::debug!(name = %handle, image = %container.image, "Mock: container removed");
        Ok(())
    }
}
