// Copyright (c) 2025 - Cowboy AI, Inc.
//! OpenStack command line backend
//!
//! Every primitive shells out to the `openstack` client and parses its
//! `-f json` output. Credentials come from the usual `OS_*` environment
//! variables of the calling process.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{
    BackendError, BackendResult, FloatingIpInfo, StackBackend, StackDetail, StackTemplate,
    SubnetInfo,
};

/// Default timeout for a single client invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Backend driving the `openstack` client binary
#[derive(Debug, Clone)]
pub struct OpenStackCli {
    program: String,
    command_timeout: Duration,
}

impl Default for OpenStackCli {
    fn default() -> Self {
        Self::new("openstack", DEFAULT_COMMAND_TIMEOUT)
    }
}

impl OpenStackCli {
    pub fn new(program: impl Into<String>, command_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            command_timeout,
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    /// Run the client and return stdout
    ///
    /// On a non-zero exit the error carries stdout and stderr combined,
    /// since the client prints some failures on either stream.
    async fn run(&self, args: &[&str]) -> BackendResult<Vec<u8>> {
        let command = self.describe(args);
        debug!(%command, "running openstack command");

        let output = tokio::time::timeout(
            self.command_timeout,
            Command::new(&self.program)
                .args(args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            warn!(%command, timeout = ?self.command_timeout, "command timed out");
            BackendError::Timeout {
                command: command.clone(),
                after: self.command_timeout,
            }
        })?
        .map_err(|source| BackendError::Spawn {
            command: command.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();
        debug!(%command, output = %combined, "command failed");
        Err(BackendError::Command {
            command,
            output: combined,
        })
    }

    async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> BackendResult<T> {
        let stdout = self.run(args).await?;
        serde_json::from_slice(&stdout).map_err(|source| BackendError::Parse {
            command: self.describe(args),
            source,
        })
    }
}

fn list_args<'a>(resource: &[&'a str], network: Option<&'a str>) -> Vec<&'a str> {
    let mut args: Vec<&str> = resource.to_vec();
    args.push("list");
    if let Some(network) = network {
        args.push("--network");
        args.push(network);
    }
    args.extend(["-f", "json"]);
    args
}

#[async_trait]
impl StackBackend for OpenStackCli {
    async fn list_subnets(&self, network: Option<&str>) -> BackendResult<Vec<SubnetInfo>> {
        self.run_json(&list_args(&["subnet"], network)).await
    }

    async fn list_floating_ips(&self, network: Option<&str>) -> BackendResult<Vec<FloatingIpInfo>> {
        self.run_json(&list_args(&["floating", "ip"], network))
            .await
    }

    async fn create_stack(&self, name: &str, template: &Path) -> BackendResult<()> {
        let template = template.to_string_lossy();
        self.run(&["stack", "create", "--template", &template, name])
            .await
            .map(|_| ())
    }

    async fn update_stack(&self, name: &str, template: &Path) -> BackendResult<()> {
        let template = template.to_string_lossy();
        self.run(&["stack", "update", "--template", &template, name])
            .await
            .map(|_| ())
    }

    async fn show_stack(&self, name: &str) -> BackendResult<StackDetail> {
        self.run_json(&["stack", "show", "-f", "json", name]).await
    }

    async fn show_stack_template(&self, name: &str) -> BackendResult<StackTemplate> {
        self.run_json(&["stack", "template", "show", "-f", "json", name])
            .await
    }

    async fn delete_stack(&self, name: &str) -> BackendResult<()> {
        self.run(&["stack", "delete", "--yes", name]).await.map(|_| ())
    }
}
