// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Subnet Allocation
//!
//! Creating a group always takes the lowest third octet that is neither
//! reported by the backend nor reserved by another in-flight group.

use std::collections::HashSet;
use std::sync::Arc;

use cim_vm_provisioner::backend::SubnetInfo;
use cim_vm_provisioner::domain::{
    group_subnet_name, NetSpec, ResourceGraph, Subnet, NEXT_AVAILABLE,
};
use cim_vm_provisioner::{
    Action, MockBackend, ParameterResolver, ReservationRegistry, ReservedResources,
};
use proptest::prelude::*;

fn graph() -> ResourceGraph {
    let mut graph = ResourceGraph::new("cluster1");
    graph.net_spec = Some(NetSpec::new([10, 101], 24).unwrap());
    graph.subnets.push(Subnet {
        name: group_subnet_name("cluster1"),
        network_name: "mex-k8s-net-1".to_string(),
        cidr: NEXT_AVAILABLE.to_string(),
        gateway_ip: None,
        skip_gateway: false,
        dhcp_enabled: true,
        dns_servers: vec![],
        node_ip_prefix: String::new(),
    });
    graph
}

proptest! {
    #[test]
    fn prop_lowest_free_octet_is_chosen(
        used in prop::collection::hash_set(0u8..40, 0..30),
        reserved in prop::collection::hash_set(0u8..40, 0..10),
    ) {
        let subnets = used
            .iter()
            .map(|n| SubnetInfo {
                id: format!("id-{}", n),
                name: format!("subnet-{}", n),
                network: "mex-k8s-net-1".to_string(),
                subnet: format!("10.101.{}.0/24", n),
            })
            .collect();
        let backend = Arc::new(MockBackend::new().with_subnets(subnets));
        let registry = Arc::new(ReservationRegistry::new());
        registry
            .reserve_all(
                &ReservedResources {
                    floating_ip_ids: vec![],
                    subnets: reserved.iter().map(|n| format!("10.101.{}.0/24", n)).collect(),
                },
                "other",
            )
            .unwrap();
        let resolver = ParameterResolver::new(backend, registry.clone(), None);

        let mut graph = graph();
        tokio_test::block_on(resolver.resolve(&mut graph, Action::Create)).unwrap();

        let taken: HashSet<u8> = used.union(&reserved).copied().collect();
        let expected = (0u8..=255).find(|n| !taken.contains(n)).unwrap();
        prop_assert_eq!(graph.subnets[0].cidr.clone(), format!("10.101.{}.0/24", expected));
        prop_assert_eq!(
            graph.subnets[0].gateway_ip.clone(),
            Some(format!("10.101.{}.1", expected))
        );
        prop_assert_eq!(
            registry.subnet_owner(&graph.subnets[0].cidr),
            Some("cluster1".to_string())
        );
    }
}
