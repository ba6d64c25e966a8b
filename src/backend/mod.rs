// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Backend Abstraction
//!
//! The infrastructure-as-a-service backend is reached through one trait
//! method per primitive the provisioning core needs:
//!
//! ```text
//! ParameterResolver ──> list_subnets / list_floating_ips / show_stack_template
//! StackLifecycleManager ──> create_stack / update_stack / show_stack / delete_stack
//! ```
//!
//! Backends report failures as free text. [`classify_backend_output`] is
//! the only place that pattern-matches that text.
//!
//! # Implementations
//!
//! - [`OpenStackCli`] - drives the `openstack` command line client
//! - [`MockBackend`] - in-memory backend with scripted stack statuses

pub mod mock;
pub mod openstack;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{Action, ErrorKind};

pub use mock::{MockBackend, StatusStep};
pub use openstack::OpenStackCli;

/// Subnet as reported by `subnet list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetInfo {
    #[serde(rename = "ID", default)]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Network", default)]
    pub network: String,

    /// CIDR of the subnet
    #[serde(rename = "Subnet")]
    pub subnet: String,
}

/// Floating IP as reported by `floating ip list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIpInfo {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Floating IP Address", default)]
    pub floating_ip_address: String,

    #[serde(rename = "Fixed IP Address", default)]
    pub fixed_ip_address: Option<String>,

    /// Attached port; `None` or empty when the address is free
    #[serde(rename = "Port", default)]
    pub port: Option<String>,

    #[serde(rename = "Floating Network", default)]
    pub floating_network: String,

    #[serde(rename = "Project", default)]
    pub project: String,
}

impl FloatingIpInfo {
    /// Unattached and carrying an address
    pub fn is_free(&self) -> bool {
        self.port.as_deref().map_or(true, str::is_empty) && !self.floating_ip_address.is_empty()
    }
}

/// Stack status as reported by `stack show`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDetail {
    #[serde(default)]
    pub id: String,

    pub stack_name: String,

    pub stack_status: String,

    #[serde(default)]
    pub stack_status_reason: Option<String>,
}

/// One resource of a deployed stack template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackResource {
    #[serde(rename = "type")]
    pub resource_type: String,

    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// Deployed stack template as reported by `stack template show`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackTemplate {
    #[serde(default)]
    pub resources: BTreeMap<String, StackResource>,
}

impl StackTemplate {
    /// User data of every server resource, keyed by resource name
    pub fn server_user_data(&self) -> BTreeMap<String, String> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == "OS::Nova::Server")
            .filter_map(|(name, r)| {
                let user_data = r.properties.get("user_data")?.as_str()?;
                Some((name.clone(), user_data.trim().to_string()))
            })
            .collect()
    }
}

/// Backend command failure
#[derive(Debug, Error)]
pub enum BackendError {
    /// Command ran and failed; `output` is its combined stdout/stderr
    #[error("{command} failed: {output}")]
    Command { command: String, output: String },

    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("cannot unmarshal output of {command}: {source}")]
    Parse {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BackendError {
    /// Raw diagnostic text for classification and error reports
    pub fn output(&self) -> String {
        match self {
            BackendError::Command { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }

    pub fn condition(&self, action: Action) -> BackendCondition {
        classify_backend_output(&self.output(), action)
    }
}

/// Result type for backend primitives
pub type BackendResult<T> = Result<T, BackendError>;

/// Known conditions recognised in backend output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendCondition {
    /// Target does not exist and the action is a delete
    AlreadyGone,
    /// Target does not exist
    NotFound,
    /// Requested CIDR overlaps an existing subnet
    Overlap,
    /// Resource still attached elsewhere
    StillInUse,
    Other,
}

impl BackendCondition {
    /// Error class for this condition; `None` means the action succeeded
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            BackendCondition::AlreadyGone => None,
            BackendCondition::NotFound => Some(ErrorKind::Config),
            BackendCondition::Overlap
            | BackendCondition::StillInUse
            | BackendCondition::Other => Some(ErrorKind::BackendTransient),
        }
    }
}

const NOT_FOUND_MARKERS: &[&str] = &[
    "Stack not found",
    "Could not find resource",
    "could not be found",
    "No stack with a name or ID",
];

/// Map raw backend output to a known condition
pub fn classify_backend_output(output: &str, action: Action) -> BackendCondition {
    if NOT_FOUND_MARKERS.iter().any(|m| output.contains(m)) {
        return if action == Action::Delete {
            BackendCondition::AlreadyGone
        } else {
            BackendCondition::NotFound
        };
    }
    if output.contains("overlap") {
        return BackendCondition::Overlap;
    }
    if output.contains("still in use") || output.contains("is in use") {
        return BackendCondition::StillInUse;
    }
    BackendCondition::Other
}

/// Infrastructure-as-a-service backend primitives
#[async_trait]
pub trait StackBackend: Send + Sync {
    /// Subnets, optionally filtered by network
    async fn list_subnets(&self, network: Option<&str>) -> BackendResult<Vec<SubnetInfo>>;

    /// Floating IPs, optionally filtered by network
    async fn list_floating_ips(&self, network: Option<&str>) -> BackendResult<Vec<FloatingIpInfo>>;

    /// Create a stack from a template file
    async fn create_stack(&self, name: &str, template: &Path) -> BackendResult<()>;

    /// Update a stack from a template file
    async fn update_stack(&self, name: &str, template: &Path) -> BackendResult<()>;

    /// Current status of a stack
    async fn show_stack(&self, name: &str) -> BackendResult<StackDetail>;

    /// Template the stack was last applied with
    async fn show_stack_template(&self, name: &str) -> BackendResult<StackTemplate>;

    /// Start deleting a stack
    async fn delete_stack(&self, name: &str) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Stack not found: cluster1", Action::Delete => BackendCondition::AlreadyGone ; "missing stack on delete")]
    #[test_case("Stack not found: cluster1", Action::Update => BackendCondition::NotFound ; "missing stack on update")]
    #[test_case("ERROR: The Stack (cluster1) could not be found.", Action::Delete => BackendCondition::AlreadyGone ; "heat wording")]
    #[test_case("Invalid input for operation: Requested subnet with cidr: 10.101.2.0/24 for network: x overlaps with another subnet", Action::Create => BackendCondition::Overlap ; "overlap")]
    #[test_case("Unable to complete operation on port p1, port is still in use", Action::Delete => BackendCondition::StillInUse ; "in use")]
    #[test_case("Conflict: quota exceeded", Action::Create => BackendCondition::Other ; "other")]
    fn test_classify(output: &str, action: Action) -> BackendCondition {
        classify_backend_output(output, action)
    }

    #[test]
    fn test_already_gone_is_success() {
        assert_eq!(BackendCondition::AlreadyGone.error_kind(), None);
        assert_eq!(
            BackendCondition::NotFound.error_kind(),
            Some(ErrorKind::Config)
        );
    }

    #[test]
    fn test_floating_ip_list_parses_null_port() {
        let json = r#"[
            {"ID": "fip-1", "Floating IP Address": "172.24.4.10", "Fixed IP Address": null,
             "Port": null, "Floating Network": "public", "Project": "p"},
            {"ID": "fip-2", "Floating IP Address": "172.24.4.11", "Fixed IP Address": "10.101.0.5",
             "Port": "port-9", "Floating Network": "public", "Project": "p"}
        ]"#;
        let fips: Vec<FloatingIpInfo> = serde_json::from_str(json).unwrap();
        assert!(fips[0].is_free());
        assert!(!fips[1].is_free());
    }

    #[test]
    fn test_server_user_data_from_template() {
        let json = r##"{
            "heat_template_version": "2016-10-14",
            "resources": {
                "master": {"type": "OS::Nova::Server", "properties": {"user_data": "  #cloud-config\n  runcmd: []\n"}},
                "master-port": {"type": "OS::Neutron::Port", "properties": {"name": "master-port"}}
            }
        }"##;
        let template: StackTemplate = serde_json::from_str(json).unwrap();
        let user_data = template.server_user_data();
        assert_eq!(user_data.len(), 1);
        assert_eq!(user_data["master"], "#cloud-config\n  runcmd: []");
    }
}
