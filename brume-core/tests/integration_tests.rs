use brume_core::*;
use std::net::Ipv4Addr;

#[test]
fn test_cluster_name_validation() {
    // Valid names
    assert!(ClusterName::new("cloud").is_ok());
    assert!(ClusterName::new("fog-1").is_ok());
    assert!(ClusterName::new("car_src").is_ok());
    assert!(ClusterName::new("a").is_ok());

    // Invalid names - empty
    assert!(ClusterName::new("").is_err());

    // Invalid names - too long for derived interface names
    assert!(ClusterName::new("a".repeat(10)).is_err());

    // Invalid names - bad characters
    assert!(ClusterName::new("fog@1").is_err());
    assert!(ClusterName::new("fog 1").is_err());
    assert!(ClusterName::new("fog/1").is_err());
    assert!(ClusterName::new("fog.1").is_err());
}

#[test]
fn test_cluster_name_serialization() {
    let name = ClusterName::new("fog-1").unwrap();

    let json = serde_json::to_string(&name).unwrap();
    assert_eq!(json, "\"fog-1\"");

    let deserialized: ClusterName = serde_json::from_str(&json).unwrap();
    assert_eq!(name, deserialized);
}

#[test]
fn test_resource_name_derivation_is_deterministic() {
    let a = ClusterName::new("driver").unwrap();
    let b = ClusterName::new("driver").unwrap();

    assert_eq!(a.namespace_end(), b.namespace_end());
    assert_eq!(a.bridge_end(), b.bridge_end());
    assert_eq!(a.bridge_domain(), b.bridge_domain());
    assert_eq!(a.container_name(5), b.container_name(5));
}

#[test]
fn test_gateway_always_dot_one() {
    for index in [11u8, 52, 53, 254] {
        let subnet = ClusterSubnet::from_index(index);
        let gateway = subnet.gateway();
        assert_eq!(gateway.octets()[3], 1);
        assert_eq!(gateway.octets()[2], index);
    }
}

#[test]
fn test_gateway_derivation_example() {
    let subnet: ClusterSubnet = "192.168.53.0/24".parse().unwrap();
    assert_eq!(subnet.gateway(), Ipv4Addr::new(192, 168, 53, 1));
}

#[test]
fn test_namespace_ref_round_trip() {
    let namespace = NamespaceRef {
        name: "cloud".to_string(),
        pid: ProcessId::from_raw(12001),
        external_if: "cloud-eth0".to_string(),
        external_addr: Ipv4Addr::new(10, 0, 0, 1),
    };

    let json = serde_json::to_string(&namespace).unwrap();
    let deserialized: NamespaceRef = serde_json::from_str(&json).unwrap();
    assert_eq!(namespace, deserialized);
}

#[test]
fn test_launch_spec_from_scenario_json() {
    let json = r#"{
        "image": "tz70s/reactive-city:0.1.6",
        "restart_policy": {"max_retries": 10},
        "environment": {"CLUSTER_HOST_IP": "fog0.docker"},
        "command": ["-r", "analytics", "-l", "fog-west"]
    }"#;

    let spec: LaunchSpec = serde_json::from_str(json).unwrap();
    assert_eq!(spec.image, "tz70s/reactive-city:0.1.6");
    assert!(spec.restart_policy.is_enabled());
    assert_eq!(spec.command.len(), 4);
}

#[test]
fn test_error_display() {
    let err = Error::AddressPoolConflict {
        subnet: "192.168.52.0/24".to_string(),
        existing: "192.168.52.0/24".to_string(),
    };
    let text = format!("{err}");
    assert!(text.contains("Address pool conflict"));
    assert!(text.contains("192.168.52.0/24"));

    let err = Error::NamespaceUnavailable { pid: 4242 };
    assert!(format!("{err}").contains("4242"));
}
