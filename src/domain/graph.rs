// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM Group Resource Graph
//!
//! The desired-state description of one provisioning group: subnets, ports,
//! security groups, VMs and floating IPs. Entities refer to each other by
//! name; a [`ResourceReference`] marks whether the target already exists in
//! the backend or is created in the same stack.
//!
//! Fields holding [`NEXT_AVAILABLE`] are placeholders the
//! [`ParameterResolver`](crate::resolver::ParameterResolver) fills in.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::network::NetSpec;

/// Placeholder meaning "resolve this dynamically"
pub const NEXT_AVAILABLE: &str = "NextAvailable";

/// Name prefix of the private subnet owned by a group
pub const MEX_SUBNET_PREFIX: &str = "mex-k8s-subnet-";

/// Deterministic name of the private subnet owned by `group_name`
pub fn group_subnet_name(group_name: &str) -> String {
    format!("{}{}", MEX_SUBNET_PREFIX, group_name)
}

/// Graph consistency error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate resource name in group {group}: {name}")]
    DuplicateName { group: String, name: String },

    #[error("{from} references unknown {kind} {target}")]
    DanglingReference {
        from: String,
        kind: &'static str,
        target: String,
    },

    #[error("unresolved placeholder in {field} of {resource}")]
    UnresolvedPlaceholder { resource: String, field: &'static str },
}

/// Reference to another resource by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceReference {
    pub name: String,

    /// Resource exists in the backend already rather than in this graph
    #[serde(default)]
    pub preexisting: bool,
}

impl ResourceReference {
    /// Reference to a resource created in the same graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preexisting: false,
        }
    }

    /// Reference to a resource that already exists in the backend
    pub fn preexisting(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preexisting: true,
        }
    }
}

/// VM role within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmRole {
    #[serde(rename = "mex-agent-node")]
    Agent,
    #[serde(rename = "k8s-master")]
    Master,
    #[serde(rename = "k8s-node")]
    Node,
}

impl VmRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmRole::Agent => "mex-agent-node",
            VmRole::Master => "k8s-master",
            VmRole::Node => "k8s-node",
        }
    }
}

impl std::fmt::Display for VmRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub name: String,
    pub network_name: String,

    /// Concrete CIDR or [`NEXT_AVAILABLE`]
    pub cidr: String,

    #[serde(default)]
    pub gateway_ip: Option<String>,

    /// Leave the gateway unset when resolving
    #[serde(default)]
    pub skip_gateway: bool,

    #[serde(default)]
    pub dhcp_enabled: bool,

    #[serde(default)]
    pub dns_servers: Vec<String>,

    /// Three-octet prefix, derived
    #[serde(default)]
    pub node_ip_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    /// Concrete address or [`NEXT_AVAILABLE`]
    pub address: String,

    /// Host octet appended to the subnet prefix when `address` is a placeholder
    #[serde(default)]
    pub last_ip_octet: Option<u8>,

    pub subnet: ResourceReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub network_name: String,

    #[serde(default)]
    pub vnic_type: Option<String>,

    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,

    /// Empty disables port security
    #[serde(default)]
    pub security_groups: Vec<ResourceReference>,
}

/// Ingress port range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    pub proto: String,
    pub port: u16,
    pub end_port: u16,
}

impl PortSpec {
    /// Parse `tcp:7777,udp:8888-8890`; a missing end port equals the start
    pub fn parse_list(spec: &str) -> Result<Vec<PortSpec>, String> {
        let mut ports = Vec::new();
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (proto, range) = item
                .split_once(':')
                .ok_or_else(|| format!("invalid port spec, expect proto:port: {}", item))?;
            let proto = proto.to_lowercase();
            if !matches!(proto.as_str(), "tcp" | "udp" | "http") {
                return Err(format!("unsupported protocol {} in {}", proto, item));
            }
            let parse = |p: &str| {
                p.parse::<u16>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("invalid port {} in {}", p, item))
            };
            let (port, end_port) = match range.split_once('-') {
                Some((start, end)) => (parse(start)?, parse(end)?),
                None => {
                    let p = parse(range)?;
                    (p, p)
                }
            };
            if end_port < port {
                return Err(format!("end port below start port in {}", item));
            }
            ports.push(PortSpec {
                proto,
                port,
                end_port,
            });
        }
        Ok(ports)
    }
}

/// Ingress allow-list for a security group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPorts {
    #[serde(default)]
    pub remote_cidr: String,

    #[serde(default)]
    pub ports: Vec<PortSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EgressRule {
    #[serde(default)]
    pub protocol: Option<String>,

    #[serde(default)]
    pub remote_cidr: Option<String>,

    #[serde(default)]
    pub port_range_min: Option<u16>,

    #[serde(default)]
    pub port_range_max: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub name: String,

    #[serde(default)]
    pub access_ports: AccessPorts,

    /// Non-empty only when egress is restricted
    #[serde(default)]
    pub egress_rules: Vec<EgressRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,

    #[serde(default)]
    pub image_name: Option<String>,

    /// Size in GB
    pub size: u64,

    #[serde(default)]
    pub availability_zone: Option<String>,

    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vm {
    pub name: String,
    pub role: VmRole,

    /// Inline boot image; absent when booting from a volume
    #[serde(default)]
    pub image_name: Option<String>,

    pub flavor_name: String,

    #[serde(default)]
    pub compute_availability_zone: Option<String>,

    #[serde(default)]
    pub ports: Vec<ResourceReference>,

    #[serde(default)]
    pub volumes: Vec<Volume>,

    #[serde(default)]
    pub deployment_manifest: Option<String>,

    #[serde(default)]
    pub command: Option<String>,

    /// Cloud-config, generated during resolution
    #[serde(default)]
    pub user_data: String,

    /// Role metadata, generated during resolution
    #[serde(default)]
    pub meta_data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub name: String,

    /// Backend floating IP id or [`NEXT_AVAILABLE`]
    pub floating_ip_id: String,

    pub port: ResourceReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterInterface {
    pub router_name: String,
    pub router_port: ResourceReference,
}

impl RouterInterface {
    /// Stack resource name of the attachment
    pub fn resource_name(&self) -> String {
        format!("{}-interface", self.router_name)
    }
}

/// Desired state of one provisioning group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGraph {
    /// Group id; doubles as the stack name
    pub group_name: String,

    #[serde(default)]
    pub net_spec: Option<NetSpec>,

    /// Spread VMs across hosts with a server group
    #[serde(default)]
    pub anti_affinity: bool,

    #[serde(default)]
    pub subnets: Vec<Subnet>,

    #[serde(default)]
    pub ports: Vec<Port>,

    #[serde(default)]
    pub router_interfaces: Vec<RouterInterface>,

    #[serde(default)]
    pub security_groups: Vec<SecurityGroup>,

    #[serde(default)]
    pub vms: Vec<Vm>,

    #[serde(default)]
    pub floating_ips: Vec<FloatingIp>,
}

impl ResourceGraph {
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            net_spec: None,
            anti_affinity: false,
            subnets: Vec::new(),
            ports: Vec::new(),
            router_interfaces: Vec::new(),
            security_groups: Vec::new(),
            vms: Vec::new(),
            floating_ips: Vec::new(),
        }
    }

    pub fn subnet(&self, name: &str) -> Option<&Subnet> {
        self.subnets.iter().find(|s| s.name == name)
    }

    /// Check name uniqueness and that every in-graph reference resolves
    pub fn check_references(&self) -> Result<(), GraphError> {
        let mut names = HashSet::new();
        let resource_names = self
            .subnets
            .iter()
            .map(|s| s.name.clone())
            .chain(self.ports.iter().map(|p| p.name.clone()))
            .chain(self.security_groups.iter().map(|s| s.name.clone()))
            .chain(self.router_interfaces.iter().map(|r| r.resource_name()))
            .chain(
                self.vms
                    .iter()
                    .flat_map(|vm| std::iter::once(vm.name.clone()).chain(vm.volumes.iter().map(|v| v.name.clone()))),
            )
            .chain(self.floating_ips.iter().map(|f| f.name.clone()));
        for name in resource_names {
            if !names.insert(name.clone()) {
                return Err(GraphError::DuplicateName {
                    group: self.group_name.clone(),
                    name,
                });
            }
        }

        let check = |from: &str, kind: &'static str, r: &ResourceReference, exists: bool| {
            if r.preexisting || exists {
                Ok(())
            } else {
                Err(GraphError::DanglingReference {
                    from: from.to_string(),
                    kind,
                    target: r.name.clone(),
                })
            }
        };
        let has_port = |name: &str| self.ports.iter().any(|p| p.name == name);

        for port in &self.ports {
            for fip in &port.fixed_ips {
                check(&port.name, "subnet", &fip.subnet, self.subnet(&fip.subnet.name).is_some())?;
            }
            for sg in &port.security_groups {
                let exists = self.security_groups.iter().any(|s| s.name == sg.name);
                check(&port.name, "security group", sg, exists)?;
            }
        }
        for vm in &self.vms {
            for port in &vm.ports {
                check(&vm.name, "port", port, has_port(&port.name))?;
            }
        }
        for fip in &self.floating_ips {
            check(&fip.name, "port", &fip.port, has_port(&fip.port.name))?;
        }
        for ri in &self.router_interfaces {
            check(&ri.resource_name(), "port", &ri.router_port, has_port(&ri.router_port.name))?;
        }
        Ok(())
    }

    /// Check that no placeholder survived resolution
    pub fn check_resolved(&self) -> Result<(), GraphError> {
        let unresolved = |resource: &str, field: &'static str| GraphError::UnresolvedPlaceholder {
            resource: resource.to_string(),
            field,
        };
        if let Some(s) = self.subnets.iter().find(|s| s.cidr == NEXT_AVAILABLE) {
            return Err(unresolved(&s.name, "cidr"));
        }
        for port in &self.ports {
            if port.fixed_ips.iter().any(|f| f.address == NEXT_AVAILABLE) {
                return Err(unresolved(&port.name, "fixed_ips"));
            }
        }
        if let Some(f) = self
            .floating_ips
            .iter()
            .find(|f| f.floating_ip_id == NEXT_AVAILABLE)
        {
            return Err(unresolved(&f.name, "floating_ip_id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph() -> ResourceGraph {
        let mut g = ResourceGraph::new("cluster1");
        g.subnets.push(Subnet {
            name: "subnet-a".to_string(),
            network_name: "mex-k8s-net-1".to_string(),
            cidr: NEXT_AVAILABLE.to_string(),
            gateway_ip: None,
            skip_gateway: false,
            dhcp_enabled: true,
            dns_servers: vec![],
            node_ip_prefix: String::new(),
        });
        g.ports.push(Port {
            name: "master-port".to_string(),
            network_name: "mex-k8s-net-1".to_string(),
            vnic_type: None,
            fixed_ips: vec![FixedIp {
                address: NEXT_AVAILABLE.to_string(),
                last_ip_octet: Some(10),
                subnet: ResourceReference::new("subnet-a"),
            }],
            security_groups: vec![ResourceReference::preexisting("default")],
        });
        g
    }

    #[test]
    fn test_group_subnet_name() {
        assert_eq!(group_subnet_name("cluster1"), "mex-k8s-subnet-cluster1");
    }

    #[test]
    fn test_references_resolve() {
        assert_eq!(graph().check_references(), Ok(()));
    }

    #[test]
    fn test_dangling_subnet_reference() {
        let mut g = graph();
        g.ports[0].fixed_ips[0].subnet = ResourceReference::new("missing");
        assert!(matches!(
            g.check_references(),
            Err(GraphError::DanglingReference { kind: "subnet", .. })
        ));
    }

    #[test]
    fn test_duplicate_names_across_kinds() {
        let mut g = graph();
        g.ports[0].name = "subnet-a".to_string();
        assert!(matches!(
            g.check_references(),
            Err(GraphError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_unresolved_placeholder_detected() {
        assert!(matches!(
            graph().check_resolved(),
            Err(GraphError::UnresolvedPlaceholder { field: "cidr", .. })
        ));
    }

    #[test]
    fn test_parse_port_list() {
        let ports = PortSpec::parse_list("tcp:7777,UDP:8888-8890").unwrap();
        assert_eq!(
            ports,
            vec![
                PortSpec {
                    proto: "tcp".to_string(),
                    port: 7777,
                    end_port: 7777
                },
                PortSpec {
                    proto: "udp".to_string(),
                    port: 8888,
                    end_port: 8890
                },
            ]
        );
        assert!(PortSpec::parse_list("tcp:0").is_err());
        assert!(PortSpec::parse_list("icmp:1").is_err());
        assert!(PortSpec::parse_list("tcp:20-10").is_err());
        assert!(PortSpec::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_role_serializes_as_backend_name() {
        let json = serde_json::to_string(&VmRole::Master).unwrap();
        assert_eq!(json, "\"k8s-master\"");
    }
}
