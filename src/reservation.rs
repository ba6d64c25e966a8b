// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Reservation Registry
//!
//! Process-local registry of scarce backend resources (floating IP ids and
//! subnet CIDRs) claimed by in-flight stack operations. The backend only
//! reports a subnet or floating IP as used once the stack that owns it has
//! been created, so two groups resolving back to back could otherwise pick
//! the same free entry.
//!
//! The registry lives in memory and guards a single manager process. It
//! does not coordinate several managers sharing one backend.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{ProvisionError, ProvisionResult};

/// Resources claimed by one operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedResources {
    pub floating_ip_ids: Vec<String>,
    pub subnets: Vec<String>,
}

impl ReservedResources {
    pub fn is_empty(&self) -> bool {
        self.floating_ip_ids.is_empty() && self.subnets.is_empty()
    }
}

/// Owner of a reservation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationEntry {
    pub owner: String,
    pub reserved_at: DateTime<Utc>,
}

/// Counts of currently held reservations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationCounts {
    pub floating_ips: usize,
    pub subnets: usize,
}

/// Entries that could not be released
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Errors: {}", .messages.join(","))]
pub struct ReleaseError {
    pub messages: Vec<String>,
}

#[derive(Debug, Default)]
struct Reservations {
    floating_ips: HashMap<String, ReservationEntry>,
    subnets: HashMap<String, ReservationEntry>,
}

#[derive(Debug, Clone, Copy)]
enum ResourceKind {
    FloatingIp,
    Subnet,
}

impl ResourceKind {
    fn label(&self) -> &'static str {
        match self {
            ResourceKind::FloatingIp => "Floating IP",
            ResourceKind::Subnet => "Subnet CIDR",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            ResourceKind::FloatingIp => "fip",
            ResourceKind::Subnet => "cidr",
        }
    }

    fn not_reserved(&self, id: &str) -> String {
        match self {
            ResourceKind::FloatingIp => {
                format!("Floating IP not reserved, cannot be released: {}", id)
            }
            ResourceKind::Subnet => format!("Subnet not reserved, cannot be released: {}", id),
        }
    }
}

impl Reservations {
    fn map(&mut self, kind: ResourceKind) -> &mut HashMap<String, ReservationEntry> {
        match kind {
            ResourceKind::FloatingIp => &mut self.floating_ips,
            ResourceKind::Subnet => &mut self.subnets,
        }
    }

    fn reserve(&mut self, kind: ResourceKind, id: &str, owner: &str) -> ProvisionResult<()> {
        debug!(kind = kind.label(), id, owner, "reserving");
        let map = self.map(kind);
        if let Some(current) = map.get(id) {
            return Err(ProvisionError::ReservationConflict {
                kind: kind.label(),
                kind_key: kind.key(),
                id: id.to_string(),
                owner: current.owner.clone(),
            });
        }
        map.insert(
            id.to_string(),
            ReservationEntry {
                owner: owner.to_string(),
                reserved_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn release(&mut self, kind: ResourceKind, id: &str) -> Result<(), String> {
        debug!(kind = kind.label(), id, "releasing");
        match self.map(kind).remove(id) {
            Some(entry) => {
                let held_ms = (Utc::now() - entry.reserved_at).num_milliseconds();
                debug!(kind = kind.label(), id, owner = %entry.owner, held_ms, "released");
                Ok(())
            }
            None => {
                warn!(kind = kind.label(), id, "not reserved, cannot be released");
                Err(kind.not_reserved(id))
            }
        }
    }
}

/// Mutex-guarded registry of reserved floating IPs and subnet CIDRs
///
/// Construct one per manager and share it by `Arc`.
#[derive(Debug, Default)]
pub struct ReservationRegistry {
    inner: Mutex<Reservations>,
}

impl ReservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Reservations> {
        // No operation panics between map updates; poisoned state is consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve every resource in the batch for `owner`, or none of them
    ///
    /// Floating IPs are reserved before subnets. On the first conflict
    /// everything reserved by this call is released again and the error
    /// names the conflicting id and its current owner.
    pub fn reserve_all(&self, resources: &ReservedResources, owner: &str) -> ProvisionResult<()> {
        let mut inner = self.lock();
        debug!(
            owner,
            floating_ips = ?resources.floating_ip_ids,
            subnets = ?resources.subnets,
            "reserve_all"
        );

        let batch = resources
            .floating_ip_ids
            .iter()
            .map(|id| (ResourceKind::FloatingIp, id))
            .chain(resources.subnets.iter().map(|id| (ResourceKind::Subnet, id)));

        let mut taken: Vec<(ResourceKind, &String)> = Vec::new();
        for (kind, id) in batch {
            if let Err(err) = inner.reserve(kind, id, owner) {
                for (kind, id) in taken.into_iter().rev() {
                    let _ = inner.release(kind, id);
                }
                return Err(err);
            }
            taken.push((kind, id));
        }
        Ok(())
    }

    /// Release every resource in the batch
    ///
    /// Entries that were not reserved are logged and reported, but do not
    /// stop the remaining entries from being released.
    pub fn release_all(&self, resources: &ReservedResources) -> Result<(), ReleaseError> {
        let mut inner = self.lock();
        let mut messages = Vec::new();

        for id in &resources.floating_ip_ids {
            if let Err(msg) = inner.release(ResourceKind::FloatingIp, id) {
                messages.push(msg);
            }
        }
        for id in &resources.subnets {
            if let Err(msg) = inner.release(ResourceKind::Subnet, id) {
                messages.push(msg);
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ReleaseError { messages })
        }
    }

    /// Current owner of a floating IP reservation
    pub fn floating_ip_owner(&self, id: &str) -> Option<String> {
        self.lock().floating_ips.get(id).map(|e| e.owner.clone())
    }

    /// Current owner of a subnet reservation
    pub fn subnet_owner(&self, cidr: &str) -> Option<String> {
        self.lock().subnets.get(cidr).map(|e| e.owner.clone())
    }

    pub fn counts(&self) -> ReservationCounts {
        let inner = self.lock();
        ReservationCounts {
            floating_ips: inner.floating_ips.len(),
            subnets: inner.subnets.len(),
        }
    }
}
