//! Mock networking backend for testing (doesn't touch kernel state)

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Mutex;

use brume_core::{ClusterSubnet, Error, ProcessId, Result};

use crate::port::{NatRule, NetScope, RouteOutcome, StaticRoute, SystemNetworking};

/// Mock networking backend
///
/// Tracks links, bridges, NAT rules, and routes in memory so tests can make
/// resource-existence assertions before and after provisioning, and can
/// inject one-shot failures per operation.
///
/// # Example
/// ```
/// use brume_net::{MockNetworking, NetScope, SystemNetworking};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let net = MockNetworking::new();
///
/// net.create_veth("fog-eth1", "fog-dport").await.unwrap();
/// assert!(net.link_exists(NetScope::Host, "fog-dport").await.unwrap());
///
/// net.delete_link(NetScope::Host, "fog-eth1").await.unwrap();
/// assert!(net.is_pristine().await);
/// # }
/// ```
#[derive(Clone)]
pub struct MockNetworking {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    links: HashMap<(NetScope, String), LinkState>,
    veth_peers: HashMap<String, String>,
    bridges: HashMap<String, ClusterSubnet>,
    attachments: HashMap<String, String>,
    nat_rules: Vec<(NetScope, NatRule)>,
    routes: Vec<(NetScope, StaticRoute)>,
    dead_namespaces: HashSet<ProcessId>,
    failures: HashMap<&'static str, usize>,
    calls: Vec<String>,
}

#[derive(Default)]
struct LinkState {
    up: bool,
    addresses: Vec<(Ipv4Addr, u8)>,
}

impl MockState {
    fn record(&mut self, call: impl Into<String>) {
        self.calls.push(call.into());
    }

    /// Consume a one-shot injected failure for this operation
    fn take_failure(&mut self, operation: &'static str) -> Result<()> {
        match self.failures.get_mut(operation) {
            Some(0) => {
                self.failures.remove(operation);
                Err(Error::ResourceCreation {
                    message: format!("injected failure: {operation}"),
                })
            }
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn scope_of(&self, ifname: &str) -> Option<NetScope> {
        self.links
            .keys()
            .find(|(_, name)| name == ifname)
            .map(|(scope, _)| *scope)
    }

    fn remove_link_and_peer(&mut self, ifname: &str) {
        if let Some(scope) = self.scope_of(ifname) {
            self.links.remove(&(scope, ifname.to_string()));
        }
        self.attachments.remove(ifname);

        // Deleting one veth end takes the peer with it
        if let Some(peer) = self.veth_peers.remove(ifname) {
            self.veth_peers.remove(&peer);
            if let Some(peer_scope) = self.scope_of(&peer) {
                self.links.remove(&(peer_scope, peer.clone()));
            }
            self.attachments.remove(&peer);
        }
    }
}

impl MockNetworking {
    /// Create a new mock backend
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Arm a one-shot failure for the next call of the named operation
    ///
    /// Operation names match the trait methods, e.g. `"install_nat_rule"`.
    pub async fn fail_on(&self, operation: &'static str) {
        self.fail_after(operation, 0).await;
    }

    /// Arm a one-shot failure after `successes` successful calls
    pub async fn fail_after(&self, operation: &'static str, successes: usize) {
        self.state.lock().await.failures.insert(operation, successes);
    }

    /// Mark a namespace's owning process as gone
    ///
    /// Links inside the namespace disappear with it, as they do in the
    /// kernel.
    pub async fn mark_namespace_dead(&self, pid: ProcessId) {
        let mut state = self.state.lock().await;
        state.dead_namespaces.insert(pid);

        let scope = NetScope::Namespace(pid);
        let gone: Vec<String> = state
            .links
            .keys()
            .filter(|(s, _)| *s == scope)
            .map(|(_, name)| name.clone())
            .collect();
        for name in gone {
            state.links.remove(&(scope, name.clone()));
            if let Some(peer) = state.veth_peers.remove(&name) {
                state.veth_peers.remove(&peer);
            }
        }
    }

    /// Number of links across all scopes
    pub async fn link_count(&self) -> usize {
        self.state.lock().await.links.len()
    }

    /// Number of bridges
    pub async fn bridge_count(&self) -> usize {
        self.state.lock().await.bridges.len()
    }

    /// Number of installed NAT rules across all scopes
    pub async fn nat_rule_count(&self) -> usize {
        self.state.lock().await.nat_rules.len()
    }

    /// Number of installed routes across all scopes
    pub async fn route_count(&self) -> usize {
        self.state.lock().await.routes.len()
    }

    /// Routes installed in the given scope
    pub async fn routes_in(&self, scope: NetScope) -> Vec<StaticRoute> {
        self.state
            .lock()
            .await
            .routes
            .iter()
            .filter(|(s, _)| *s == scope)
            .map(|(_, route)| route.clone())
            .collect()
    }

    /// Whether an interface is up in the given scope
    pub async fn link_is_up(&self, scope: NetScope, ifname: &str) -> bool {
        self.state
            .lock()
            .await
            .links
            .get(&(scope, ifname.to_string()))
            .is_some_and(|link| link.up)
    }

    /// Addresses assigned to an interface in the given scope
    pub async fn addresses_of(&self, scope: NetScope, ifname: &str) -> Vec<(Ipv4Addr, u8)> {
        self.state
            .lock()
            .await
            .links
            .get(&(scope, ifname.to_string()))
            .map(|link| link.addresses.clone())
            .unwrap_or_default()
    }

    /// Bridge an interface is attached to, if any
    pub async fn attachment_of(&self, ifname: &str) -> Option<String> {
        self.state.lock().await.attachments.get(ifname).cloned()
    }

    /// Whether no kernel-visible resources remain
    pub async fn is_pristine(&self) -> bool {
        let state = self.state.lock().await;
        state.links.is_empty()
            && state.bridges.is_empty()
            && state.nat_rules.is_empty()
            && state.routes.is_empty()
            && state.attachments.is_empty()
    }

    /// Ordered log of operations performed (for sequencing assertions)
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }
}

impl Default for MockNetworking {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockNetworking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNetworking").finish_non_exhaustive()
    }
}

#[async_trait]
impl SystemNetworking for MockNetworking {
    async fn create_veth(&self, ns_end: &str, bridge_end: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("create_veth {ns_end} {bridge_end}"));
        state.take_failure("create_veth")?;

        for name in [ns_end, bridge_end] {
            if state.scope_of(name).is_some() {
                return Err(Error::ResourceCreation {
                    message: format!("link {name} already exists"),
                });
            }
        }

        state
            .links
            .insert((NetScope::Host, ns_end.to_string()), LinkState::default());
        state.links.insert(
            (NetScope::Host, bridge_end.to_string()),
            LinkState::default(),
        );
        state
            .veth_peers
            .insert(ns_end.to_string(), bridge_end.to_string());
        state
            .veth_peers
            .insert(bridge_end.to_string(), ns_end.to_string());

        Ok(())
    }

    async fn move_to_namespace(&self, ifname: &str, pid: ProcessId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("move_to_namespace {ifname} {pid}"));
        state.take_failure("move_to_namespace")?;

        if state.dead_namespaces.contains(&pid) {
            return Err(Error::NamespaceUnavailable { pid: pid.as_raw() });
        }

        let link = state
            .links
            .remove(&(NetScope::Host, ifname.to_string()))
            .ok_or_else(|| Error::ResourceCreation {
                message: format!("link {ifname} does not exist"),
            })?;
        state
            .links
            .insert((NetScope::Namespace(pid), ifname.to_string()), link);

        Ok(())
    }

    async fn set_link_up(&self, scope: NetScope, ifname: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("set_link_up {scope} {ifname}"));
        state.take_failure("set_link_up")?;

        state
            .links
            .get_mut(&(scope, ifname.to_string()))
            .ok_or_else(|| Error::ResourceCreation {
                message: format!("link {ifname} does not exist in {scope}"),
            })?
            .up = true;

        Ok(())
    }

    async fn assign_address(
        &self,
        scope: NetScope,
        ifname: &str,
        addr: Ipv4Addr,
        prefix: u8,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("assign_address {scope} {ifname} {addr}/{prefix}"));
        state.take_failure("assign_address")?;

        let link = state
            .links
            .get_mut(&(scope, ifname.to_string()))
            .ok_or_else(|| Error::ResourceCreation {
                message: format!("link {ifname} does not exist in {scope}"),
            })?;

        if !link.addresses.contains(&(addr, prefix)) {
            link.addresses.push((addr, prefix));
        }

        Ok(())
    }

    async fn install_nat_rule(&self, scope: NetScope, rule: &NatRule) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("install_nat_rule {scope} {rule}"));
        state.take_failure("install_nat_rule")?;

        state.nat_rules.push((scope, rule.clone()));
        Ok(())
    }

    async fn remove_nat_rule(&self, scope: NetScope, rule: &NatRule) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("remove_nat_rule {scope} {rule}"));
        state.take_failure("remove_nat_rule")?;

        let position = state
            .nat_rules
            .iter()
            .position(|(s, r)| *s == scope && r == rule)
            .ok_or_else(|| Error::ResourceCreation {
                message: format!("no such rule: {rule}"),
            })?;
        state.nat_rules.remove(position);

        Ok(())
    }

    async fn create_bridge(&self, name: &str, subnet: ClusterSubnet) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("create_bridge {name} {subnet}"));
        state.take_failure("create_bridge")?;

        if state.bridges.contains_key(name) {
            return Err(Error::ResourceCreation {
                message: format!("bridge {name} already exists"),
            });
        }

        state.bridges.insert(name.to_string(), subnet);
        Ok(())
    }

    async fn delete_bridge(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("delete_bridge {name}"));
        state.take_failure("delete_bridge")?;

        state
            .bridges
            .remove(name)
            .ok_or_else(|| Error::ResourceCreation {
                message: format!("bridge {name} does not exist"),
            })?;
        state.attachments.retain(|_, bridge| bridge != name);

        Ok(())
    }

    async fn attach_interface(&self, bridge: &str, ifname: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("attach_interface {bridge} {ifname}"));
        state.take_failure("attach_interface")?;

        if !state.bridges.contains_key(bridge) {
            return Err(Error::Attach {
                message: format!("bridge {bridge} does not exist"),
            });
        }
        if !state
            .links
            .contains_key(&(NetScope::Host, ifname.to_string()))
        {
            return Err(Error::Attach {
                message: format!("interface {ifname} does not exist"),
            });
        }
        if let Some(existing) = state.attachments.get(ifname) {
            return Err(Error::Attach {
                message: format!("interface {ifname} already attached to {existing}"),
            });
        }

        state
            .attachments
            .insert(ifname.to_string(), bridge.to_string());
        Ok(())
    }

    async fn add_route(&self, scope: NetScope, route: &StaticRoute) -> Result<RouteOutcome> {
        let mut state = self.state.lock().await;
        state.record(format!("add_route {scope} {route}"));
        state.take_failure("add_route").map_err(|_| {
            Error::RouteInstall {
                message: format!("injected failure: add_route {route}"),
            }
        })?;

        for (s, existing) in &state.routes {
            if *s != scope || existing.dest != route.dest {
                continue;
            }
            if existing.via == route.via && existing.device == route.device {
                return Ok(RouteOutcome::AlreadyPresent);
            }
            return Err(Error::RouteInstall {
                message: format!("{route}: conflicting route already installed: {existing}"),
            });
        }

        state.routes.push((scope, route.clone()));
        Ok(RouteOutcome::Installed)
    }

    async fn delete_link(&self, scope: NetScope, ifname: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(format!("delete_link {scope} {ifname}"));
        state.take_failure("delete_link")?;

        if !state.links.contains_key(&(scope, ifname.to_string())) {
            return Err(Error::ResourceCreation {
                message: format!("cannot find device {ifname} in {scope}"),
            });
        }
        state.remove_link_and_peer(ifname);

        Ok(())
    }

    async fn link_exists(&self, scope: NetScope, ifname: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.links.contains_key(&(scope, ifname.to_string())))
    }

    async fn namespace_alive(&self, pid: ProcessId) -> bool {
        !self.state.lock().await.dead_namespaces.contains(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_veth_lifecycle() {
        let net = MockNetworking::new();

        net.create_veth("fog-eth1", "fog-dport").await.unwrap();
        assert!(net.link_exists(NetScope::Host, "fog-eth1").await.unwrap());
        assert!(net.link_exists(NetScope::Host, "fog-dport").await.unwrap());

        // Creating again collides
        assert!(net.create_veth("fog-eth1", "fog-dport").await.is_err());

        // Deleting one end removes the peer
        net.delete_link(NetScope::Host, "fog-dport").await.unwrap();
        assert!(!net.link_exists(NetScope::Host, "fog-eth1").await.unwrap());
        assert!(net.is_pristine().await);
    }

    #[tokio::test]
    async fn test_move_into_dead_namespace() {
        let net = MockNetworking::new();
        let pid = ProcessId::from_raw(4242);
        net.mark_namespace_dead(pid).await;

        net.create_veth("fog-eth1", "fog-dport").await.unwrap();
        let result = net.move_to_namespace("fog-eth1", pid).await;
        assert!(matches!(
            result,
            Err(Error::NamespaceUnavailable { pid: 4242 })
        ));
    }

    #[tokio::test]
    async fn test_namespace_death_removes_links() {
        let net = MockNetworking::new();
        let pid = ProcessId::from_raw(4242);

        net.create_veth("fog-eth1", "fog-dport").await.unwrap();
        net.move_to_namespace("fog-eth1", pid).await.unwrap();
        assert!(
            net.link_exists(NetScope::Namespace(pid), "fog-eth1")
                .await
                .unwrap()
        );

        net.mark_namespace_dead(pid).await;
        assert!(
            !net.link_exists(NetScope::Namespace(pid), "fog-eth1")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_nat_rules_matched_set() {
        let net = MockNetworking::new();
        let scope = NetScope::Namespace(ProcessId::from_raw(1));
        let rule = NatRule::Masquerade {
            out_if: "h1-eth0".to_string(),
        };

        net.install_nat_rule(scope, &rule).await.unwrap();
        assert_eq!(net.nat_rule_count().await, 1);

        net.remove_nat_rule(scope, &rule).await.unwrap();
        assert_eq!(net.nat_rule_count().await, 0);

        // Removing again fails: the set is matched exactly
        assert!(net.remove_nat_rule(scope, &rule).await.is_err());
    }

    #[tokio::test]
    async fn test_route_idempotence_and_conflict() {
        let net = MockNetworking::new();
        let scope = NetScope::Namespace(ProcessId::from_raw(1));
        let route = StaticRoute {
            dest: "192.168.53.0/24".parse().unwrap(),
            via: Ipv4Addr::new(10, 0, 0, 2),
            device: "h1-eth0".to_string(),
        };

        assert_eq!(
            net.add_route(scope, &route).await.unwrap(),
            RouteOutcome::Installed
        );
        assert_eq!(
            net.add_route(scope, &route).await.unwrap(),
            RouteOutcome::AlreadyPresent
        );
        assert_eq!(net.route_count().await, 1);

        let conflicting = StaticRoute {
            via: Ipv4Addr::new(10, 0, 0, 3),
            ..route
        };
        assert!(net.add_route(scope, &conflicting).await.is_err());
    }

    #[tokio::test]
    async fn test_attach_requires_existing_interface() {
        let net = MockNetworking::new();
        net.create_bridge("netns-fog", "192.168.52.0/24".parse().unwrap())
            .await
            .unwrap();

        let result = net.attach_interface("netns-fog", "fog-dport").await;
        assert!(matches!(result, Err(Error::Attach { .. })));
    }

    #[tokio::test]
    async fn test_failure_injection_is_one_shot() {
        let net = MockNetworking::new();
        net.fail_on("create_bridge").await;

        let subnet = "192.168.52.0/24".parse().unwrap();
        assert!(net.create_bridge("netns-fog", subnet).await.is_err());
        assert!(net.create_bridge("netns-fog", subnet).await.is_ok());
    }
}
