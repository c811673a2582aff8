use std::net::Ipv4Addr;
use std::sync::Arc;

use brume_cluster::*;
use brume_core::Error;
use brume_net::{MockNetworking, NetScope};
use brume_runtime::MockRuntime;

struct Harness {
    net: Arc<MockNetworking>,
    runtime: Arc<MockRuntime>,
    allocator: Arc<Allocator>,
}

impl Harness {
    fn new() -> Self {
        Self {
            net: Arc::new(MockNetworking::new()),
            runtime: Arc::new(MockRuntime::new()),
            allocator: Arc::new(Allocator::new()),
        }
    }

    fn cluster(&self, name: &str, pid: i32, addr: [u8; 4], subnet: &str) -> HostCluster {
        let name = ClusterName::new(name).unwrap();
        let namespace = NamespaceRef {
            name: name.as_str().to_string(),
            pid: ProcessId::from_raw(pid),
            external_if: format!("{name}-eth0"),
            external_addr: Ipv4Addr::from(addr),
        };

        HostCluster::new(
            name,
            namespace,
            subnet.parse().unwrap(),
            self.net.clone(),
            self.runtime.clone(),
            self.allocator.clone(),
        )
    }
}

#[tokio::test]
async fn test_provision_reaches_networked() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("cloud", 12001, [10, 0, 0, 1], "192.168.11.0/24");

    cluster.provision().await.unwrap();
    assert_eq!(cluster.state(), ClusterState::Networked);

    // Link wired: namespace end addressed with the gateway, bridge end
    // attached to the domain
    let scope = NetScope::Namespace(ProcessId::from_raw(12001));
    assert_eq!(
        harness.net.addresses_of(scope, "cloud-eth1").await,
        vec![(Ipv4Addr::new(192, 168, 11, 1), 24)]
    );
    assert!(harness.net.link_is_up(scope, "cloud-eth1").await);
    assert!(harness.net.link_is_up(NetScope::Host, "cloud-dport").await);
    assert_eq!(
        harness.net.attachment_of("cloud-dport").await.as_deref(),
        Some("netns-cloud")
    );
    assert_eq!(harness.net.nat_rule_count().await, 3);
    assert_eq!(harness.net.bridge_count().await, 1);
}

#[tokio::test]
async fn test_provision_then_teardown_leaves_zero_residual_resources() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");

    cluster.provision().await.unwrap();
    cluster.launch_container(&LaunchSpec::new("ubuntu")).await.unwrap();

    let report = cluster.teardown().await;
    assert!(report.is_clean());
    assert_eq!(cluster.state(), ClusterState::TornDown);

    // No dangling interfaces, bridges, NAT rules, routes, or containers
    assert!(harness.net.is_pristine().await);
    assert_eq!(harness.runtime.running_count().await, 0);
    assert_eq!(harness.allocator.registered_pools(), 0);
}

#[tokio::test]
async fn test_teardown_twice_is_idempotent() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");

    cluster.provision().await.unwrap();

    let first = cluster.teardown().await;
    assert!(first.is_clean());

    let second = cluster.teardown().await;
    assert!(second.is_clean());
    assert_eq!(cluster.state(), ClusterState::TornDown);
    assert!(harness.net.is_pristine().await);
}

#[tokio::test]
async fn test_overlapping_subnets_conflict_without_touching_first_cluster() {
    let harness = Harness::new();
    let mut first = harness.cluster("cloud", 12001, [10, 0, 0, 1], "192.168.52.0/24");
    let mut second = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.52.0/24");

    first.provision().await.unwrap();
    let links_before = harness.net.link_count().await;
    let rules_before = harness.net.nat_rule_count().await;

    let result = second.provision().await;
    assert!(matches!(result, Err(Error::AddressPoolConflict { .. })));
    assert_eq!(second.state(), ClusterState::Unprovisioned);

    // The first cluster's resources are unaffected
    assert_eq!(first.state(), ClusterState::Networked);
    assert_eq!(harness.net.link_count().await, links_before);
    assert_eq!(harness.net.nat_rule_count().await, rules_before);
    assert_eq!(harness.net.bridge_count().await, 1);
}

#[tokio::test]
async fn test_forced_nat_failure_unwinds_the_link() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");

    harness.net.fail_on("install_nat_rule").await;

    let result = cluster.provision().await;
    assert!(result.is_err());
    assert_eq!(cluster.state(), ClusterState::Unprovisioned);

    // The veth created in the same call was removed again
    assert_eq!(harness.net.link_count().await, 0);
    assert!(harness.net.is_pristine().await);

    // The name reservation was rolled back too: provisioning can be retried
    cluster.provision().await.unwrap();
    assert_eq!(cluster.state(), ClusterState::Networked);
}

#[tokio::test]
async fn test_attach_failure_unwinds_bridge_nat_and_link() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");

    harness.net.fail_on("attach_interface").await;

    assert!(cluster.provision().await.is_err());
    assert_eq!(cluster.state(), ClusterState::Unprovisioned);
    assert!(harness.net.is_pristine().await);
    assert_eq!(harness.allocator.registered_pools(), 0);
}

#[tokio::test]
async fn test_provision_into_dead_namespace() {
    let harness = Harness::new();
    let pid = ProcessId::from_raw(31337);
    harness.net.mark_namespace_dead(pid).await;

    let mut cluster = harness.cluster("fog", 31337, [10, 0, 0, 2], "192.168.12.0/24");

    let result = cluster.provision().await;
    assert!(matches!(result, Err(Error::NamespaceUnavailable { .. })));
    assert_eq!(cluster.state(), ClusterState::Unprovisioned);
    assert!(harness.net.is_pristine().await);
}

#[tokio::test]
async fn test_sequenced_container_names_and_monitored_pids() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");
    cluster.provision().await.unwrap();

    let spec = LaunchSpec::new("tz70s/busy-wait");
    let a = cluster.launch_container(&spec).await.unwrap();
    let b = cluster.launch_container(&spec).await.unwrap();
    let c = cluster.launch_container(&spec).await.unwrap();

    assert_eq!(a.name, "fog-0");
    assert_eq!(b.name, "fog-1");
    assert_eq!(c.name, "fog-2");
    assert_eq!(cluster.state(), ClusterState::Populated);

    // Three distinct monitored process ids
    let pids: Vec<_> = cluster.monitored_pids().values().copied().collect();
    assert_eq!(pids.len(), 3);
    assert!(pids.windows(2).all(|w| w[0] != w[1]));
}

#[tokio::test]
async fn test_failed_launch_adds_no_record_and_reuses_sequence() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");
    cluster.provision().await.unwrap();

    cluster
        .launch_container(&LaunchSpec::new("ubuntu"))
        .await
        .unwrap();

    harness.runtime.mark_image_unavailable("gone/image").await;
    let result = cluster.launch_container(&LaunchSpec::new("gone/image")).await;
    assert!(matches!(result, Err(Error::ContainerLaunch { .. })));

    // No partial record, prior state intact
    assert_eq!(cluster.containers().len(), 1);
    assert_eq!(cluster.state(), ClusterState::Populated);

    // The failed launch consumed no sequence number
    let next = cluster
        .launch_container(&LaunchSpec::new("ubuntu"))
        .await
        .unwrap();
    assert_eq!(next.name, "fog-1");
}

#[tokio::test]
async fn test_inspect_failure_removes_started_container() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");
    cluster.provision().await.unwrap();

    harness.runtime.fail_next_inspect().await;
    let result = cluster.launch_container(&LaunchSpec::new("ubuntu")).await;

    assert!(result.is_err());
    assert!(cluster.containers().is_empty());
    assert_eq!(harness.runtime.running_count().await, 0);
}

#[tokio::test]
async fn test_launch_before_provision_is_rejected() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");

    let result = cluster.launch_container(&LaunchSpec::new("ubuntu")).await;
    assert!(matches!(result, Err(Error::ContainerLaunch { .. })));
}

#[tokio::test]
async fn test_teardown_continues_past_stuck_container() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");
    cluster.provision().await.unwrap();

    let spec = LaunchSpec::new("ubuntu");
    cluster.launch_container(&spec).await.unwrap();
    cluster.launch_container(&spec).await.unwrap();

    harness.runtime.fail_next_remove().await;
    let report = cluster.teardown().await;

    // One warning for the stuck container, everything else released
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(cluster.state(), ClusterState::TornDown);
    assert!(harness.net.is_pristine().await);
    assert_eq!(harness.runtime.running_count().await, 1);
}

#[tokio::test]
async fn test_teardown_removes_nat_before_link() {
    let harness = Harness::new();
    let mut cluster = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.12.0/24");
    cluster.provision().await.unwrap();
    cluster.launch_container(&LaunchSpec::new("ubuntu")).await.unwrap();

    cluster.teardown().await;

    // NAT removal must precede link teardown in the call log
    let calls = harness.net.calls().await;
    let last_nat_removal = calls
        .iter()
        .rposition(|c| c.starts_with("remove_nat_rule"))
        .unwrap();
    let link_deletion = calls
        .iter()
        .rposition(|c| c.starts_with("delete_link"))
        .unwrap();
    assert!(last_nat_removal < link_deletion, "{calls:?}");
}

#[tokio::test]
async fn test_route_mesh_symmetry() {
    let harness = Harness::new();
    let mut a = harness.cluster("cloud", 12001, [10, 0, 0, 1], "192.168.52.0/24");
    let mut b = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.53.0/24");

    a.provision().await.unwrap();
    b.provision().await.unwrap();

    let mesh = RouteMesh::new(harness.net.clone());
    let report = mesh.build(&[&a, &b]).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.installed, 2);

    // A routes B's subnet via B's external address
    let a_routes = harness
        .net
        .routes_in(NetScope::Namespace(ProcessId::from_raw(12001)))
        .await;
    assert_eq!(a_routes.len(), 1);
    assert_eq!(a_routes[0].dest.to_string(), "192.168.53.0/24");
    assert_eq!(a_routes[0].via, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(a_routes[0].device, "cloud-eth0");

    // And the mirrored route on B
    let b_routes = harness
        .net
        .routes_in(NetScope::Namespace(ProcessId::from_raw(12002)))
        .await;
    assert_eq!(b_routes.len(), 1);
    assert_eq!(b_routes[0].dest.to_string(), "192.168.52.0/24");
    assert_eq!(b_routes[0].via, Ipv4Addr::new(10, 0, 0, 1));
}

#[tokio::test]
async fn test_route_mesh_rebuild_is_idempotent() {
    let harness = Harness::new();
    let mut a = harness.cluster("cloud", 12001, [10, 0, 0, 1], "192.168.52.0/24");
    let mut b = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.53.0/24");
    a.provision().await.unwrap();
    b.provision().await.unwrap();

    let mesh = RouteMesh::new(harness.net.clone());
    mesh.build(&[&a, &b]).await.unwrap();

    let rebuilt = mesh.build(&[&a, &b]).await.unwrap();
    assert!(rebuilt.is_complete());
    assert_eq!(rebuilt.installed, 0);
    assert_eq!(rebuilt.already_present, 2);
    assert_eq!(harness.net.route_count().await, 2);
}

#[tokio::test]
async fn test_route_mesh_collects_per_pair_failures() {
    let harness = Harness::new();
    let mut a = harness.cluster("cloud", 12001, [10, 0, 0, 1], "192.168.52.0/24");
    let mut b = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.53.0/24");
    let mut c = harness.cluster("driver", 12003, [10, 0, 0, 3], "192.168.54.0/24");
    a.provision().await.unwrap();
    b.provision().await.unwrap();
    c.provision().await.unwrap();

    // One bad pair must not abort the rest of the mesh
    harness.net.fail_on("add_route").await;

    let mesh = RouteMesh::new(harness.net.clone());
    let report = mesh.build(&[&a, &b, &c]).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.installed, 5);
}

#[tokio::test]
async fn test_route_mesh_requires_networked_clusters() {
    let harness = Harness::new();
    let mut a = harness.cluster("cloud", 12001, [10, 0, 0, 1], "192.168.52.0/24");
    let b = harness.cluster("fog", 12002, [10, 0, 0, 2], "192.168.53.0/24");
    a.provision().await.unwrap();

    let mesh = RouteMesh::new(harness.net.clone());
    let result = mesh.build(&[&a, &b]).await;
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));
}

#[tokio::test]
async fn test_three_host_scenario_end_to_end() {
    let harness = Harness::new();

    // Subnets drawn from the allocator sequence, as the scenario flow does
    let mut clusters = Vec::new();
    for (name, pid, addr) in [
        ("cloud", 12001, [10, 0, 0, 1]),
        ("fog", 12002, [10, 0, 0, 2]),
        ("driver", 12003, [10, 0, 0, 3]),
    ] {
        let subnet = harness.allocator.next_subnet().unwrap();
        let mut cluster = harness.cluster(name, pid, addr, &subnet.to_string());
        cluster.provision().await.unwrap();
        clusters.push(cluster);
    }

    clusters[0]
        .launch_container(&LaunchSpec::new("tz70s/node-server"))
        .await
        .unwrap();
    clusters[1]
        .launch_container(&LaunchSpec::new("tz70s/busy-wait"))
        .await
        .unwrap();
    clusters[2]
        .launch_container(&LaunchSpec::new("tz70s/busy-wait"))
        .await
        .unwrap();

    let mesh = RouteMesh::new(harness.net.clone());
    let refs: Vec<&HostCluster> = clusters.iter().collect();
    let report = mesh.build(&refs).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.installed, 6);

    // Shutdown in reverse dependency order. Mesh routes live in the
    // emulator's namespaces and go away with them, so only cluster-owned
    // resources are expected to be gone.
    for cluster in clusters.iter_mut().rev() {
        assert!(cluster.teardown().await.is_clean());
    }
    assert_eq!(harness.net.link_count().await, 0);
    assert_eq!(harness.net.bridge_count().await, 0);
    assert_eq!(harness.net.nat_rule_count().await, 0);
    assert_eq!(harness.runtime.running_count().await, 0);
    assert_eq!(harness.allocator.registered_pools(), 0);
}
