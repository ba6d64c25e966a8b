// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM group provisioning for edge cloudlets
//!
//! Resolves a declarative [`ResourceGraph`] of subnets, ports, security
//! groups, VMs and floating IPs against backend state, renders it to a Heat
//! stack document, submits it and polls the stack to completion.

pub mod backend;
pub mod config;
pub mod domain;
pub mod errors;
pub mod reservation;
pub mod resolver;
pub mod service;
pub mod stack;
pub mod state_machine;
pub mod template;

// Re-export commonly used types
pub use backend::{MockBackend, OpenStackCli, StackBackend};
pub use config::ProvisionerConfig;
pub use domain::{NetSpec, ResourceGraph};
pub use errors::{Action, ErrorKind, ProvisionError, ProvisionResult};
pub use reservation::{ReservationRegistry, ReservedResources};
pub use resolver::ParameterResolver;
pub use service::{HeatVmGroupService, VmGroupService};
pub use stack::{ProgressCallback, ProgressKind, StackLifecycleManager, StackSettings};
pub use template::TemplateRenderer;
