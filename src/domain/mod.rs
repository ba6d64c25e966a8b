// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM Group Domain Models
//!
//! Value objects and the resource graph the provisioning pipeline works on.
//!
//! # Value Objects with Invariants
//!
//! - [`NetSpec`] - cloudlet network scheme (`cidr=10.101.X.0/24,...`)
//! - [`Ipv4Block`] - IPv4 CIDR block with overlap checks
//!
//! # Resource Graph
//!
//! - [`ResourceGraph`] - subnets, ports, security groups, VMs, floating IPs
//!   and router interfaces of one group, cross-referenced by name

pub mod graph;
pub mod network;

pub use graph::{
    group_subnet_name, AccessPorts, EgressRule, FixedIp, FloatingIp, GraphError, Port, PortSpec,
    ResourceGraph, ResourceReference, RouterInterface, SecurityGroup, Subnet, Vm, VmRole, Volume,
    MEX_SUBNET_PREFIX, NEXT_AVAILABLE,
};
pub use network::{Ipv4Block, NetSpec, NetSpecError};
