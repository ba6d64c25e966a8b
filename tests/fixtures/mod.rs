// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-vm-provisioner
//!
//! Deterministic resource graphs and backend listings.
//!
//! # Design Principles
//! - Fixtures are the ONLY place that constructs full resource graphs
//! - Every graph uses placeholders the resolver must fill
//! - Backend listings mirror `openstack ... -f json` output

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use cim_vm_provisioner::backend::{FloatingIpInfo, MockBackend, SubnetInfo};
use cim_vm_provisioner::domain::{
    group_subnet_name, AccessPorts, FixedIp, FloatingIp, NetSpec, Port, PortSpec, ResourceGraph,
    ResourceReference, SecurityGroup, Subnet, Vm, VmRole, Volume, NEXT_AVAILABLE,
};
use cim_vm_provisioner::{HeatVmGroupService, ProvisionerConfig, ReservationRegistry};

pub const MEX_NETWORK: &str = "mex-k8s-net-1";
pub const EXTERNAL_NETWORK: &str = "public";

/// `cidr=10.101.X.0/24,floatingipextnet=public`
pub fn net_spec() -> NetSpec {
    NetSpec::new([10, 101], 24)
        .expect("valid net spec")
        .with_floating_ip_external_net(EXTERNAL_NETWORK)
}

pub fn master_port(group: &str) -> String {
    format!("{}-master-port", group)
}

pub fn lb_port(group: &str) -> String {
    format!("{}-lb-port", group)
}

/// Master plus one volume-booted node on a fresh subnet, with a floating
/// IP on the master's external port
pub fn cluster_graph(group: &str) -> ResourceGraph {
    let subnet = group_subnet_name(group);
    let security_group = format!("{}-sg", group);

    let mut graph = ResourceGraph::new(group);
    graph.net_spec = Some(net_spec());

    graph.subnets.push(Subnet {
        name: subnet.clone(),
        network_name: MEX_NETWORK.to_string(),
        cidr: NEXT_AVAILABLE.to_string(),
        gateway_ip: None,
        skip_gateway: false,
        dhcp_enabled: true,
        dns_servers: vec!["1.1.1.1".to_string(), "1.0.0.1".to_string()],
        node_ip_prefix: String::new(),
    });

    graph.ports.push(Port {
        name: master_port(group),
        network_name: MEX_NETWORK.to_string(),
        vnic_type: None,
        fixed_ips: vec![FixedIp {
            address: NEXT_AVAILABLE.to_string(),
            last_ip_octet: Some(10),
            subnet: ResourceReference::new(subnet.clone()),
        }],
        security_groups: vec![
            ResourceReference::preexisting("default"),
            ResourceReference::new(security_group.clone()),
        ],
    });
    graph.ports.push(Port {
        name: format!("{}-node1-port", group),
        network_name: MEX_NETWORK.to_string(),
        vnic_type: None,
        fixed_ips: vec![FixedIp {
            address: NEXT_AVAILABLE.to_string(),
            last_ip_octet: Some(101),
            subnet: ResourceReference::new(subnet),
        }],
        security_groups: vec![],
    });
    graph.ports.push(Port {
        name: lb_port(group),
        network_name: "external-network".to_string(),
        vnic_type: None,
        fixed_ips: vec![],
        security_groups: vec![ResourceReference::new(security_group.clone())],
    });

    graph.security_groups.push(SecurityGroup {
        name: security_group,
        access_ports: AccessPorts {
            remote_cidr: "0.0.0.0/0".to_string(),
            ports: PortSpec::parse_list("tcp:443").expect("valid ports"),
        },
        egress_rules: vec![],
    });

    graph.vms.push(Vm {
        name: "master".to_string(),
        role: VmRole::Master,
        image_name: Some("ubuntu-18.04".to_string()),
        flavor_name: "m1.medium".to_string(),
        compute_availability_zone: None,
        ports: vec![
            ResourceReference::new(master_port(group)),
            ResourceReference::new(lb_port(group)),
        ],
        volumes: vec![],
        deployment_manifest: None,
        command: None,
        user_data: String::new(),
        meta_data: String::new(),
    });
    graph.vms.push(Vm {
        name: "node1".to_string(),
        role: VmRole::Node,
        image_name: None,
        flavor_name: "m1.small".to_string(),
        compute_availability_zone: Some("nova".to_string()),
        ports: vec![ResourceReference::new(format!("{}-node1-port", group))],
        volumes: vec![Volume {
            name: "node1-volume".to_string(),
            image_name: Some("ubuntu-18.04".to_string()),
            size: 40,
            availability_zone: None,
            device_name: "vda".to_string(),
        }],
        deployment_manifest: None,
        command: None,
        user_data: String::new(),
        meta_data: String::new(),
    });

    graph.floating_ips.push(FloatingIp {
        name: format!("{}-fip", group),
        floating_ip_id: NEXT_AVAILABLE.to_string(),
        port: ResourceReference::new(lb_port(group)),
    });
    graph
}

/// Graph without floating IPs
pub fn private_graph(group: &str) -> ResourceGraph {
    let mut graph = cluster_graph(group);
    graph.floating_ips.clear();
    graph
}

pub fn subnet_info(name: &str, cidr: &str) -> SubnetInfo {
    SubnetInfo {
        id: format!("{}-id", name),
        name: name.to_string(),
        network: MEX_NETWORK.to_string(),
        subnet: cidr.to_string(),
    }
}

pub fn floating_ip(id: &str, address: &str, port: Option<&str>) -> FloatingIpInfo {
    FloatingIpInfo {
        id: id.to_string(),
        floating_ip_address: address.to_string(),
        fixed_ip_address: port.map(|_| "10.101.0.5".to_string()),
        port: port.map(str::to_string),
        floating_network: EXTERNAL_NETWORK.to_string(),
        project: "edge".to_string(),
    }
}

/// Three floating IPs, the first two attached
pub fn floating_ip_pool() -> Vec<FloatingIpInfo> {
    vec![
        floating_ip("fip-attached-1", "172.24.4.10", Some("port-a")),
        floating_ip("fip-attached-2", "172.24.4.11", Some("port-b")),
        floating_ip("fip-free", "172.24.4.12", None),
    ]
}

/// Configuration writing documents to `dir`
pub fn config_in(dir: &Path) -> ProvisionerConfig {
    ProvisionerConfig {
        template_dir: dir.to_path_buf(),
        ..ProvisionerConfig::default()
    }
}

/// Service over `backend` with a fresh registry
pub fn service(backend: Arc<MockBackend>, config: &ProvisionerConfig) -> HeatVmGroupService {
    HeatVmGroupService::new(backend, Arc::new(ReservationRegistry::new()), config)
        .expect("template compiles")
}

/// Parse a rendered stack document
pub fn parse_document(document: &str) -> serde_yaml::Value {
    serde_yaml::from_str(document).expect("rendered document is valid YAML")
}
