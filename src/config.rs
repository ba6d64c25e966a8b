// Copyright (c) 2025 - Cowboy AI, Inc.
//! Provisioner configuration
//!
//! Loaded from environment variables, with defaults for everything:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `MEX_NETWORK_SCHEME` | `cidr=10.101.X.0/24` |
//! | `MEX_NETWORK` | `mex-k8s-net-1` |
//! | `HEAT_TEMPLATE_DIR` | `.` |
//! | `HEAT_POLL_INTERVAL_SECS` | `10` |
//! | `HEAT_STACK_TIMEOUT_SECS` | `1200` |
//! | `OPENSTACK_CLI` | `openstack` |
//! | `OPENSTACK_CMD_TIMEOUT_SECS` | `120` |
//! | `HEAT_TEST_MODE` | `false` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::OpenStackCli;
use crate::domain::{NetSpec, NetSpecError};
use crate::stack::StackSettings;

/// Configuration loading error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("invalid network scheme: {0}")]
    NetSpec(#[from] NetSpecError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// Cloudlet network scheme applied to graphs without a net spec
    #[serde(default = "default_network_scheme")]
    pub network_scheme: String,

    /// Shared network whose subnets make up the used address space
    #[serde(default = "default_mex_network")]
    pub mex_network: Option<String>,

    /// Directory rendered `<group>-heat.yaml` documents are written to
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_stack_timeout")]
    pub stack_timeout_secs: u64,

    #[serde(default = "default_openstack_cli")]
    pub openstack_cli: String,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Render and write documents without submitting them
    #[serde(default)]
    pub test_mode: bool,
}

fn default_network_scheme() -> String {
    "cidr=10.101.X.0/24".to_string()
}

fn default_mex_network() -> Option<String> {
    Some("mex-k8s-net-1".to_string())
}

fn default_template_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_poll_interval() -> u64 {
    10
}

fn default_stack_timeout() -> u64 {
    20 * 60
}

fn default_openstack_cli() -> String {
    "openstack".to_string()
}

fn default_command_timeout() -> u64 {
    120
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            network_scheme: default_network_scheme(),
            mex_network: default_mex_network(),
            template_dir: default_template_dir(),
            poll_interval_secs: default_poll_interval(),
            stack_timeout_secs: default_stack_timeout(),
            openstack_cli: default_openstack_cli(),
            command_timeout_secs: default_command_timeout(),
            test_mode: false,
        }
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { var, value })
}

impl ProvisionerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(scheme) = lookup("MEX_NETWORK_SCHEME") {
            config.network_scheme = scheme;
        }
        if let Some(network) = lookup("MEX_NETWORK") {
            config.mex_network = Some(network).filter(|n| !n.is_empty());
        }
        if let Some(dir) = lookup("HEAT_TEMPLATE_DIR") {
            config.template_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("HEAT_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = parse_var("HEAT_POLL_INTERVAL_SECS", v)?;
        }
        if let Some(v) = lookup("HEAT_STACK_TIMEOUT_SECS") {
            config.stack_timeout_secs = parse_var("HEAT_STACK_TIMEOUT_SECS", v)?;
        }
        if let Some(cli) = lookup("OPENSTACK_CLI") {
            config.openstack_cli = cli;
        }
        if let Some(v) = lookup("OPENSTACK_CMD_TIMEOUT_SECS") {
            config.command_timeout_secs = parse_var("OPENSTACK_CMD_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("HEAT_TEST_MODE") {
            config.test_mode = parse_var("HEAT_TEST_MODE", v.to_lowercase())?;
        }

        config.net_spec()?;
        Ok(config)
    }

    pub fn net_spec(&self) -> Result<NetSpec, NetSpecError> {
        NetSpec::parse(&self.network_scheme)
    }

    pub fn stack_settings(&self) -> StackSettings {
        StackSettings {
            template_dir: self.template_dir.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            stack_timeout: Duration::from_secs(self.stack_timeout_secs),
            test_mode: self.test_mode,
        }
    }

    pub fn openstack_cli(&self) -> OpenStackCli {
        OpenStackCli::new(
            self.openstack_cli.clone(),
            Duration::from_secs(self.command_timeout_secs),
        )
    }
}
