// Copyright (c) 2025 - Cowboy AI, Inc.
//! Parameter Resolution
//!
//! Fills every `NextAvailable` placeholder of a [`ResourceGraph`] from
//! backend state:
//!
//! 1. Subnet CIDRs: lowest free `<o0>.<o1>.<n>.0/<mask>` on create, the
//!    group's own `mex-k8s-subnet-<group>` on update and delete
//! 2. Gateway (`.1`), node prefix and master address (`.10`)
//! 3. Fixed IPs from `<node prefix>.<last octet>`
//! 4. Per-VM metadata and cloud-config user data
//! 5. Floating IP ids from the external network's free pool
//!
//! Everything claimed is reserved in the [`ReservationRegistry`] under the
//! group name before the resolver returns.

pub mod cloud_config;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::backend::{FloatingIpInfo, StackBackend};
use crate::domain::{group_subnet_name, Ipv4Block, NetSpec, ResourceGraph, VmRole, NEXT_AVAILABLE};
use crate::errors::{Action, ProvisionError, ProvisionResult};
use crate::reservation::{ReservationRegistry, ReservedResources};

use cloud_config::{reindent, user_data_matches, vm_metadata, vm_user_data, EMBED_INDENT};

/// Floating IP id used when rendering without a backend
pub const TEST_FLOATING_IP_ID: &str = "test-fip-id";

/// Resolves placeholders of a resource graph against backend state
pub struct ParameterResolver {
    backend: Arc<dyn StackBackend>,
    registry: Arc<ReservationRegistry>,
    /// Shared network whose subnets make up the used address space
    mex_network: Option<String>,
}

impl ParameterResolver {
    pub fn new(
        backend: Arc<dyn StackBackend>,
        registry: Arc<ReservationRegistry>,
        mex_network: Option<String>,
    ) -> Self {
        Self {
            backend,
            registry,
            mex_network,
        }
    }

    /// Resolve `graph` in place and reserve what was claimed
    ///
    /// On error nothing stays reserved and the graph may be partially
    /// filled; callers discard it.
    #[instrument(skip(self, graph), fields(group = %graph.group_name, %action))]
    pub async fn resolve(
        &self,
        graph: &mut ResourceGraph,
        action: Action,
    ) -> ProvisionResult<ReservedResources> {
        let net_spec = graph
            .net_spec
            .clone()
            .ok_or_else(|| ProvisionError::MissingNetSpec {
                group: graph.group_name.clone(),
            })?;
        graph.check_references()?;

        let mut reserved = ReservedResources::default();
        let master_ip = self
            .resolve_subnets(graph, &net_spec, action, &mut reserved)
            .await?;
        fill_fixed_ips(graph)?;
        self.resolve_vm_data(graph, action, master_ip.as_deref())
            .await?;
        if action != Action::Delete {
            self.resolve_floating_ips(graph, &net_spec, action, &mut reserved)
                .await?;
        }

        self.registry.reserve_all(&reserved, &graph.group_name)?;
        info!(
            subnets = ?reserved.subnets,
            floating_ips = ?reserved.floating_ip_ids,
            "parameters resolved"
        );
        Ok(reserved)
    }

    /// Backend subnets on the shared network, CIDR to name
    async fn used_cidrs(&self, graph: &ResourceGraph, action: Action) -> ProvisionResult<HashMap<String, String>> {
        if action == Action::Test {
            return Ok(HashMap::new());
        }
        let subnets = self
            .backend
            .list_subnets(self.mex_network.as_deref())
            .await
            .map_err(|e| ProvisionError::backend(&graph.group_name, action, &e))?;
        Ok(subnets.into_iter().map(|s| (s.subnet, s.name)).collect())
    }

    /// Returns the master address of the last resolved subnet
    async fn resolve_subnets(
        &self,
        graph: &mut ResourceGraph,
        net_spec: &NetSpec,
        action: Action,
        reserved: &mut ReservedResources,
    ) -> ProvisionResult<Option<String>> {
        if !graph.subnets.iter().any(|s| s.cidr == NEXT_AVAILABLE) {
            return Ok(None);
        }

        let used = self.used_cidrs(graph, action).await?;
        let used_blocks: Vec<Ipv4Block> = used.keys().filter_map(|c| Ipv4Block::new(c).ok()).collect();
        let own_subnet = group_subnet_name(&graph.group_name);
        let mut master_ip = None;

        for idx in 0..graph.subnets.len() {
            if graph.subnets[idx].cidr != NEXT_AVAILABLE {
                continue;
            }

            let mut chosen = None;
            for octet in 0..=u8::MAX {
                let candidate = net_spec.subnet_cidr(octet);
                let eligible = if action.allocates_new() {
                    !used.contains_key(&candidate)
                        && !overlaps_any(&candidate, &used_blocks)
                        && !reserved.subnets.contains(&candidate)
                } else {
                    used.get(&candidate) == Some(&own_subnet)
                };
                if !eligible {
                    continue;
                }
                if let Some(owner) = self.registry.subnet_owner(&candidate) {
                    debug!(subnet = %candidate, reserved_by = %owner, "subnet already reserved");
                    continue;
                }
                chosen = Some((octet, candidate));
                break;
            }

            let (octet, cidr) = match chosen {
                Some(found) => found,
                None if action.allocates_new() => {
                    return Err(ProvisionError::SubnetExhausted {
                        group: graph.group_name.clone(),
                        network_address: net_spec.network_address(),
                        netmask_bits: net_spec.netmask_bits,
                    })
                }
                None => {
                    return Err(ProvisionError::SubnetNotFound {
                        group: graph.group_name.clone(),
                        subnet: own_subnet,
                        action,
                    })
                }
            };

            let prefix = net_spec.node_ip_prefix(octet);
            let subnet = &mut graph.subnets[idx];
            debug!(subnet = %subnet.name, %cidr, "allocated subnet");
            subnet.cidr = cidr.clone();
            if !subnet.skip_gateway {
                subnet.gateway_ip = Some(format!("{}.1", prefix));
            }
            master_ip = Some(format!("{}.10", prefix));
            subnet.node_ip_prefix = prefix;
            reserved.subnets.push(cidr);
        }
        Ok(master_ip)
    }

    async fn resolve_vm_data(
        &self,
        graph: &mut ResourceGraph,
        action: Action,
        master_ip: Option<&str>,
    ) -> ProvisionResult<()> {
        let deployed_user_data = if action == Action::Update {
            self.backend
                .show_stack_template(&graph.group_name)
                .await
                .map_err(|e| ProvisionError::backend(&graph.group_name, action, &e))?
                .server_user_data()
        } else {
            BTreeMap::new()
        };

        for vm in graph.vms.iter_mut() {
            vm.meta_data = reindent(&vm_metadata(vm.role, master_ip), EMBED_INDENT);
            let user_data = reindent(&vm_user_data(vm), EMBED_INDENT);

            if vm.role == VmRole::Master {
                if let Some(deployed) = deployed_user_data.get(&vm.name) {
                    if !user_data_matches(deployed, &user_data) {
                        warn!(vm = %vm.name, "master user data changed");
                        return Err(ProvisionError::MasterUserDataChanged {
                            group: graph.group_name.clone(),
                            vm: vm.name.clone(),
                        });
                    }
                }
            }
            vm.user_data = user_data;
        }
        Ok(())
    }

    async fn resolve_floating_ips(
        &self,
        graph: &mut ResourceGraph,
        net_spec: &NetSpec,
        action: Action,
        reserved: &mut ReservedResources,
    ) -> ProvisionResult<()> {
        if !graph.floating_ips.iter().any(|f| f.floating_ip_id == NEXT_AVAILABLE) {
            return Ok(());
        }

        let external_net = net_spec.floating_ip_external_net.clone().unwrap_or_default();
        let pool: Vec<FloatingIpInfo> = if action == Action::Test {
            Vec::new()
        } else {
            let network = Some(external_net.as_str()).filter(|n| !n.is_empty());
            self.backend
                .list_floating_ips(network)
                .await
                .map_err(|e| ProvisionError::backend(&graph.group_name, action, &e))?
        };

        for fip in graph.floating_ips.iter_mut() {
            if fip.floating_ip_id != NEXT_AVAILABLE {
                continue;
            }
            if action == Action::Test {
                fip.floating_ip_id = TEST_FLOATING_IP_ID.to_string();
                continue;
            }

            let free = pool.iter().find(|candidate| {
                candidate.is_free()
                    && !reserved.floating_ip_ids.contains(&candidate.id)
                    && self.registry.floating_ip_owner(&candidate.id).is_none()
            });
            let Some(free) = free else {
                return Err(ProvisionError::FloatingIpExhausted {
                    group: graph.group_name.clone(),
                    network: external_net,
                });
            };
            debug!(name = %fip.name, id = %free.id, address = %free.floating_ip_address, "allocated floating ip");
            fip.floating_ip_id = free.id.clone();
            reserved.floating_ip_ids.push(free.id.clone());
        }
        Ok(())
    }
}

fn overlaps_any(candidate: &str, used: &[Ipv4Block]) -> bool {
    match Ipv4Block::new(candidate) {
        Ok(block) => used.iter().any(|u| u.overlaps(&block)),
        Err(_) => false,
    }
}

/// Three-octet prefix of a concrete CIDR, e.g. `10.1.2` for `10.1.2.0/24`
fn prefix_of_cidr(cidr: &str) -> Option<String> {
    let address = cidr.split('/').next()?;
    let (prefix, _) = address.rsplit_once('.')?;
    Some(prefix.to_string())
}

/// Replace placeholder fixed IPs with `<node prefix>.<last octet>`
fn fill_fixed_ips(graph: &mut ResourceGraph) -> ProvisionResult<()> {
    let prefixes: HashMap<String, Option<String>> = graph
        .subnets
        .iter()
        .map(|s| {
            let prefix = if !s.node_ip_prefix.is_empty() {
                Some(s.node_ip_prefix.clone())
            } else if s.cidr != NEXT_AVAILABLE {
                prefix_of_cidr(&s.cidr)
            } else {
                None
            };
            (s.name.clone(), prefix)
        })
        .collect();

    for port in graph.ports.iter_mut() {
        for fixed_ip in port.fixed_ips.iter_mut() {
            let last = match fixed_ip.last_ip_octet {
                Some(last) if last != 0 && fixed_ip.address == NEXT_AVAILABLE => last,
                _ => continue,
            };
            let prefix = prefixes
                .get(&fixed_ip.subnet.name)
                .cloned()
                .flatten()
                .ok_or_else(|| ProvisionError::PortSubnetMismatch {
                    port: port.name.clone(),
                    subnet: fixed_ip.subnet.name.clone(),
                })?;
            fixed_ip.address = format!("{}.{}", prefix, last);
            debug!(port = %port.name, address = %fixed_ip.address, "populated fixed ip");
        }
    }
    Ok(())
}
