// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for VM group provisioning
//!
//! Every failure the provisioning core can surface is a [`ProvisionError`].
//! Callers that need to decide between retrying, paging an operator or
//! fixing their input should match on [`ProvisionError::kind`] instead of
//! individual variants.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{classify_backend_output, BackendCondition, BackendError};
use crate::domain::{GraphError, NetSpecError};
use crate::state_machine::TransitionError;

/// Stack operation being performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
    /// Render only; no backend queries, no submission
    Test,
}

impl Action {
    /// Prefix the backend uses for stack status values (`CREATE_COMPLETE` etc.)
    ///
    /// Test never reaches the backend but reports as `CREATE` since it
    /// resolves like a fresh create.
    pub fn status_prefix(&self) -> &'static str {
        match self {
            Action::Create | Action::Test => "CREATE",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }

    /// Whether placeholder CIDRs should be allocated fresh rather than
    /// looked up from the group's existing subnet
    pub fn allocates_new(&self) -> bool {
        matches!(self, Action::Create | Action::Test)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Test => "test",
        };
        write!(f, "{}", s)
    }
}

/// Closed classification of provisioning failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broken input: missing net spec, dangling references. Never retried.
    Config,
    /// Address space or floating-IP pool exhausted. Surfaced verbatim.
    Capacity,
    /// Backend command failed or the stack failed; the caller may retry.
    BackendTransient,
    /// Stack stuck in progress past the budget; needs an operator.
    Timeout,
    /// Caller cancelled the operation.
    Cancelled,
}

/// Errors that can occur while provisioning a VM group
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Netspec is missing for group {group}")]
    MissingNetSpec { group: String },

    #[error("Invalid netspec: {0}")]
    InvalidNetSpec(#[from] NetSpecError),

    #[error("Invalid resource graph: {0}")]
    InvalidGraph(#[from] GraphError),

    #[error("cannot find matching subnet {subnet} for port: {port}")]
    PortSubnetMismatch { port: String, subnet: String },

    #[error("cannot find existing subnet {subnet} for group {group} ({action})")]
    SubnetNotFound {
        group: String,
        subnet: String,
        action: Action,
    },

    #[error(
        "Unable to update {group} as it will redeploy master node {vm}, hence will affect running app instances. Please delete and recreate the cluster instance"
    )]
    MasterUserDataChanged { group: String, vm: String },

    #[error("cannot find subnet cidr in {network_address}/{netmask_bits} for group {group}")]
    SubnetExhausted {
        group: String,
        network_address: String,
        netmask_bits: u8,
    },

    #[error("Unable to allocate a floating IP on network {network} for group {group}")]
    FloatingIpExhausted { group: String, network: String },

    #[error("{kind} already reserved, {kind_key}: {id} reservedBy: {owner}")]
    ReservationConflict {
        kind: &'static str,
        kind_key: &'static str,
        id: String,
        owner: String,
    },

    #[error("template render failed for {group}: {message}")]
    Render { group: String, message: String },

    #[error("{action} of stack {group} failed: {output}")]
    Backend {
        group: String,
        action: Action,
        condition: BackendCondition,
        output: String,
    },

    #[error("Heat Stack {group} failed ({action}): {reason}")]
    StackFailed {
        group: String,
        action: Action,
        reason: String,
    },

    #[error("Stack {group} {action} unexpected status: {status}")]
    UnexpectedStatus {
        group: String,
        action: Action,
        status: String,
    },

    #[error("Heat stack {group} taking too long: still in progress after {elapsed:?} ({action})")]
    StackTimeout {
        group: String,
        action: Action,
        elapsed: Duration,
    },

    #[error("{action} of stack {group} cancelled")]
    Cancelled { group: String, action: Action },

    #[error("stack state error: {0}")]
    Lifecycle(#[from] TransitionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        use ProvisionError::*;

        match self {
            MissingNetSpec { .. }
            | InvalidNetSpec(_)
            | InvalidGraph(_)
            | PortSubnetMismatch { .. }
            | SubnetNotFound { .. }
            | MasterUserDataChanged { .. }
            | ReservationConflict { .. }
            | Render { .. } => ErrorKind::Config,
            SubnetExhausted { .. } | FloatingIpExhausted { .. } => ErrorKind::Capacity,
            Backend { condition, .. } => condition
                .error_kind()
                .unwrap_or(ErrorKind::BackendTransient),
            StackFailed { .. }
            | UnexpectedStatus { .. }
            | Lifecycle(_)
            | Io(_) => ErrorKind::BackendTransient,
            StackTimeout { .. } => ErrorKind::Timeout,
            Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Whether the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::BackendTransient
    }

    pub(crate) fn backend(group: &str, action: Action, err: &BackendError) -> Self {
        let output = err.output();
        ProvisionError::Backend {
            group: group.to_string(),
            action,
            condition: classify_backend_output(&output, action),
            output,
        }
    }
}
