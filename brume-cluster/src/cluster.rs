//! Host cluster lifecycle management

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use brume_core::{
    ClusterEvent, ClusterName, ClusterSubnet, ContainerRecord, Error, LaunchSpec, NamespaceRef,
    ProcessId, Result,
};
use brume_net::{NatRuleSet, SystemNetworking, VirtualLink};
use brume_runtime::{ContainerHandle, ContainerRuntime};

use crate::allocator::Allocator;
use crate::domain::BridgeDomain;

/// Lifecycle state of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// No resources exist yet
    Unprovisioned,
    /// Link wired into the namespace, NAT installed
    Wired,
    /// Bridge domain created and attached
    Networked,
    /// At least one container running
    Populated,
    /// All resources released; the cluster is not reusable
    TornDown,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Unprovisioned => "unprovisioned",
            Self::Wired => "wired",
            Self::Networked => "networked",
            Self::Populated => "populated",
            Self::TornDown => "torn down",
        };
        write!(f, "{state}")
    }
}

/// Best-effort teardown outcome
///
/// Teardown never raises for individual resource-release failures; whatever
/// could not be released is reported here instead.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Resources that could not be released
    pub warnings: Vec<String>,
}

impl TeardownReport {
    /// Whether every resource was released
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// One namespace-bound network island
///
/// Aggregates a virtual link, a bridge domain, a NAT rule set, and the
/// containers attached to the domain. Resources are created in dependency
/// order (link → addresses → NAT → bridge → containers) and released in
/// reverse; a provisioning failure unwinds the steps that already succeeded
/// before surfacing, so the cluster is never left half-wired.
pub struct HostCluster {
    name: ClusterName,
    namespace: NamespaceRef,
    subnet: ClusterSubnet,
    state: ClusterState,
    link: Option<VirtualLink>,
    nat: Option<NatRuleSet>,
    bridge: Option<BridgeDomain>,
    containers: Vec<ContainerRecord>,
    monitored: BTreeMap<String, ProcessId>,
    net: Arc<dyn SystemNetworking>,
    runtime: Arc<dyn ContainerRuntime>,
    allocator: Arc<Allocator>,
}

impl HostCluster {
    /// Create an unprovisioned cluster for a namespace
    #[must_use]
    pub fn new(
        name: ClusterName,
        namespace: NamespaceRef,
        subnet: ClusterSubnet,
        net: Arc<dyn SystemNetworking>,
        runtime: Arc<dyn ContainerRuntime>,
        allocator: Arc<Allocator>,
    ) -> Self {
        Self {
            name,
            namespace,
            subnet,
            state: ClusterState::Unprovisioned,
            link: None,
            nat: None,
            bridge: None,
            containers: Vec::new(),
            monitored: BTreeMap::new(),
            net,
            runtime,
            allocator,
        }
    }

    /// Cluster name
    #[must_use]
    pub const fn name(&self) -> &ClusterName {
        &self.name
    }

    /// Namespace this cluster is bound to
    #[must_use]
    pub const fn namespace(&self) -> &NamespaceRef {
        &self.namespace
    }

    /// The cluster's address block
    #[must_use]
    pub const fn subnet(&self) -> ClusterSubnet {
        self.subnet
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> ClusterState {
        self.state
    }

    /// Records of launched containers, in launch order
    #[must_use]
    pub fn containers(&self) -> &[ContainerRecord] {
        &self.containers
    }

    /// Monitorable process ids by container name
    ///
    /// Populated at launch time and never mutated afterward; a relaunch
    /// produces a new entry under a new name.
    #[must_use]
    pub const fn monitored_pids(&self) -> &BTreeMap<String, ProcessId> {
        &self.monitored
    }

    /// Wire the cluster: link, addresses, NAT, bridge domain
    ///
    /// Steps run strictly in dependency order; no step begins before the
    /// previous one's side effect is observable. Any failure unwinds the
    /// completed steps in reverse order before the error surfaces, leaving
    /// the system as it was before the call.
    ///
    /// # Errors
    /// Returns the failing step's error; the cluster reports
    /// [`ClusterState::Unprovisioned`] afterwards
    pub async fn provision(&mut self) -> Result<()> {
        if self.state != ClusterState::Unprovisioned {
            return Err(Error::InvalidConfig {
                message: format!("cluster {} is already {}", self.name, self.state),
            });
        }

        self.allocator.reserve_name(&self.name)?;
        info!(cluster = %self.name, subnet = %self.subnet, "Provisioning cluster");

        if let Err(error) = self.wire().await {
            warn!(cluster = %self.name, %error, "Provisioning failed, unwinding");

            let unwind = self.release_resources().await;
            for warning in &unwind {
                warn!(cluster = %self.name, warning = %warning, "Unwind incomplete");
            }
            self.allocator.release_name(&self.name);
            self.state = ClusterState::Unprovisioned;

            return Err(error);
        }

        self.state = ClusterState::Networked;
        ClusterEvent::Provisioned {
            cluster: self.name.clone(),
            subnet: self.subnet,
        }
        .emit_trace();

        Ok(())
    }

    /// The ordered provisioning steps; resources are stored on `self` as
    /// soon as they exist so a failure unwind can see them
    async fn wire(&mut self) -> Result<()> {
        // Virtual link into the namespace, addressed and up
        self.link = Some(VirtualLink::create(self.net.clone(), &self.name).await?);
        let Some(link) = self.link.as_mut() else {
            return Err(Error::InvalidConfig {
                message: "link vanished mid-provision".to_string(),
            });
        };

        link.move_to_namespace(self.namespace.pid).await?;
        link.bring_up().await?;
        link.assign_gateway(&self.subnet).await?;
        let ns_end = link.ns_end().to_string();

        // NAT, serialized against every other cluster's firewall mutations
        let nat = NatRuleSet::for_cluster(
            self.net.clone(),
            self.namespace.pid,
            &self.namespace.external_if,
            &ns_end,
        );
        {
            let _gate = self.allocator.firewall_gate().lock().await;
            nat.install().await?;
        }
        self.nat = Some(nat);
        self.state = ClusterState::Wired;
        debug!(cluster = %self.name, "Cluster wired");

        // Bridge domain, with the bridge-side link end bound into it
        let bridge = BridgeDomain::create(
            self.net.clone(),
            self.allocator.clone(),
            &self.name,
            self.subnet,
        )
        .await?;
        self.bridge = Some(bridge);
        let Some(bridge) = self.bridge.as_ref() else {
            return Err(Error::InvalidConfig {
                message: "bridge vanished mid-provision".to_string(),
            });
        };
        bridge.attach(&self.name.bridge_end()).await?;

        Ok(())
    }

    /// Launch a container attached to this cluster's domain
    ///
    /// Container names are `<cluster>-<sequence>`; the sequence counts
    /// successful launches only, so a failed launch never consumes a number
    /// and adds no partial record.
    ///
    /// # Errors
    /// Returns [`Error::ContainerLaunch`] if the cluster has no bridge
    /// domain or the runtime rejects the request; existing containers and
    /// cluster state are unaffected
    pub async fn launch_container(&mut self, spec: &LaunchSpec) -> Result<ContainerRecord> {
        let Some(bridge) = self.bridge.as_ref() else {
            return Err(Error::ContainerLaunch {
                message: format!("cluster {} is {}, not networked", self.name, self.state),
            });
        };

        let container_name = self.name.container_name(self.containers.len());
        let handle = self
            .runtime
            .run(spec, bridge.name(), &container_name)
            .await?;

        // No partial records: if the process id cannot be resolved the
        // container is removed again before the error surfaces
        let pid = match self.runtime.inspect(&handle).await {
            Ok(pid) => pid,
            Err(error) => {
                if let Err(remove_error) = self.runtime.remove(&handle).await {
                    warn!(
                        container = %container_name,
                        error = %remove_error,
                        "Failed to remove container after inspect failure"
                    );
                }
                return Err(error);
            }
        };

        let record = ContainerRecord {
            name: container_name.clone(),
            image: spec.image.clone(),
            pid,
        };
        self.containers.push(record.clone());
        self.monitored.insert(container_name, pid);
        self.state = ClusterState::Populated;

        ClusterEvent::ContainerLaunched {
            cluster: self.name.clone(),
            container: record.name.clone(),
            pid,
        }
        .emit_trace();

        Ok(record)
    }

    /// Release every resource the cluster still holds, in reverse
    /// dependency order
    ///
    /// Idempotent and best-effort: a second call is a no-op once all
    /// resources are gone, and individual release failures are reported in
    /// the result rather than raised, so one stuck resource never blocks the
    /// rest.
    pub async fn teardown(&mut self) -> TeardownReport {
        if self.state == ClusterState::TornDown {
            debug!(cluster = %self.name, "Teardown already complete");
            return TeardownReport::default();
        }

        info!(cluster = %self.name, state = %self.state, "Tearing down cluster");
        let warnings = self.release_resources().await;
        self.allocator.release_name(&self.name);
        self.state = ClusterState::TornDown;

        if warnings.is_empty() {
            ClusterEvent::TornDown {
                cluster: self.name.clone(),
            }
            .emit_trace();
        } else {
            for warning in &warnings {
                ClusterEvent::TeardownIncomplete {
                    cluster: self.name.clone(),
                    message: warning.clone(),
                }
                .emit_trace();
            }
        }

        TeardownReport { warnings }
    }

    /// Reverse-order release of whatever subset of resources exists
    async fn release_resources(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        // Containers first; one stuck container must not block the rest
        for record in std::mem::take(&mut self.containers) {
            let handle = ContainerHandle::new(&record.name);
            if let Err(error) = self.runtime.remove(&handle).await {
                warn!(container = %record.name, %error, "Failed to remove container");
                warnings.push(format!("container {}: {error}", record.name));
            }
        }
        self.monitored.clear();

        // Bridge domain next; fails softly if still busy
        if let Some(bridge) = self.bridge.take() {
            if let Some(warning) = bridge.destroy().await {
                warnings.push(format!("bridge {warning}"));
            }
        }

        // NAT before the link it references is torn down
        if let Some(nat) = self.nat.take() {
            let _gate = self.allocator.firewall_gate().lock().await;
            warnings.extend(
                nat.remove()
                    .await
                    .into_iter()
                    .map(|w| format!("nat {w}")),
            );
        }

        // Link last; tolerates ends the namespace already took with it
        if let Some(link) = self.link.take() {
            if let Err(error) = link.destroy().await {
                warn!(cluster = %self.name, %error, "Failed to destroy link");
                warnings.push(format!("link: {error}"));
            }
        }

        warnings
    }
}

impl fmt::Debug for HostCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCluster")
            .field("name", &self.name)
            .field("subnet", &self.subnet)
            .field("state", &self.state)
            .field("containers", &self.containers.len())
            .finish_non_exhaustive()
    }
}
