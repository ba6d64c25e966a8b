// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for the Reservation Registry
//!
//! A batch is reserved completely or not at all, and releasing what was
//! reserved always returns the registry to its previous state.

use std::collections::HashSet;

use cim_vm_provisioner::{ProvisionError, ReservationRegistry, ReservedResources};
use proptest::prelude::*;

fn fip_ids() -> impl Strategy<Value = HashSet<String>> {
    prop::collection::hash_set("fip-[a-f0-9]{2}", 0..6)
}

fn cidrs() -> impl Strategy<Value = HashSet<String>> {
    prop::collection::hash_set((0u8..16).prop_map(|n| format!("10.101.{}.0/24", n)), 0..6)
}

fn batch(fips: &HashSet<String>, subnets: &HashSet<String>) -> ReservedResources {
    let mut floating_ip_ids: Vec<String> = fips.iter().cloned().collect();
    let mut subnets: Vec<String> = subnets.iter().cloned().collect();
    floating_ip_ids.sort();
    subnets.sort();
    ReservedResources {
        floating_ip_ids,
        subnets,
    }
}

proptest! {
    #[test]
    fn prop_reserve_then_release_is_identity(fips in fip_ids(), subnets in cidrs()) {
        let registry = ReservationRegistry::new();
        let resources = batch(&fips, &subnets);

        registry.reserve_all(&resources, "cluster1").unwrap();
        let counts = registry.counts();
        prop_assert_eq!(counts.floating_ips, fips.len());
        prop_assert_eq!(counts.subnets, subnets.len());

        prop_assert!(registry.release_all(&resources).is_ok());
        prop_assert_eq!(registry.counts().floating_ips, 0);
        prop_assert_eq!(registry.counts().subnets, 0);
    }

    #[test]
    fn prop_reserve_all_is_all_or_nothing(
        held_fips in fip_ids(),
        held_subnets in cidrs(),
        new_fips in fip_ids(),
        new_subnets in cidrs(),
    ) {
        let registry = ReservationRegistry::new();
        registry.reserve_all(&batch(&held_fips, &held_subnets), "first").unwrap();
        let before = registry.counts();

        let conflicts = !held_fips.is_disjoint(&new_fips) || !held_subnets.is_disjoint(&new_subnets);
        let result = registry.reserve_all(&batch(&new_fips, &new_subnets), "second");

        if conflicts {
            let is_conflict = matches!(
                result,
                Err(ProvisionError::ReservationConflict { ref owner, .. }) if owner == "first"
            );
            prop_assert!(is_conflict);
            prop_assert_eq!(registry.counts(), before);
        } else {
            prop_assert!(result.is_ok());
            prop_assert_eq!(registry.counts().floating_ips, before.floating_ips + new_fips.len());
            prop_assert_eq!(registry.counts().subnets, before.subnets + new_subnets.len());
        }

        for id in &held_fips {
            prop_assert_eq!(registry.floating_ip_owner(id), Some("first".to_string()));
        }
        for cidr in &held_subnets {
            prop_assert_eq!(registry.subnet_owner(cidr), Some("first".to_string()));
        }
    }

    #[test]
    fn prop_releasing_unreserved_reports_every_entry(fips in fip_ids(), subnets in cidrs()) {
        let registry = ReservationRegistry::new();
        let result = registry.release_all(&batch(&fips, &subnets));

        if fips.is_empty() && subnets.is_empty() {
            prop_assert!(result.is_ok());
        } else {
            let err = result.unwrap_err();
            prop_assert_eq!(err.messages.len(), fips.len() + subnets.len());
        }
    }
}
