// Copyright (c) 2025 - Cowboy AI, Inc.
//! Service Layer for VM Group Provisioning
//!
//! The caller-facing entry points. A service composes the provisioning
//! pieces into complete create, update and delete operations.
//!
//! # Architecture
//!
//! ```text
//! Client Request (ResourceGraph / group name)
//!     ↓
//! Service Layer (this module)
//!     ↓  ── provisioning lock held ──────────────┐
//! ParameterResolver → ReservationRegistry        │
//!     ↓                                          │
//! TemplateRenderer                               │
//!     ↓                                          │
//! StackLifecycleManager::apply (write + submit) ─┘
//!     ↓
//! StackLifecycleManager::wait_for_stack (poll)
//!     ↓
//! release reservations
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use cim_vm_provisioner::service::{HeatVmGroupService, VmGroupService};
//!
//! let service = HeatVmGroupService::new(backend, registry, &config)?;
//! service.create_vms(graph).await?;
//! service.delete_vms("cluster1").await?;
//! ```

pub mod vm_group;

pub use vm_group::{HeatVmGroupService, VmGroupService};
