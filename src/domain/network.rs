// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants
//!
//! - [`NetSpec`] - the cloudlet's private address scheme (`10.101.X.0/24`)
//! - [`Ipv4Block`] - an IPv4 CIDR block used for overlap checks against
//!   subnets the backend already reports

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network scheme validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetSpecError {
    #[error("empty netspec")]
    Empty,

    #[error("incorrect netspec item format, expect key=value: {0}")]
    MalformedItem(String),

    #[error("unknown netspec item key: {0}")]
    UnknownKey(String),

    #[error("Missing cidr=(value) in netspec")]
    MissingCidr,

    #[error("invalid CIDR, no net mask: {0}")]
    MissingNetmask(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4)")]
    InvalidPrefixLength(String),

    #[error("invalid network address structure: {0}")]
    InvalidAddress(String),

    #[error("invalid network address delimiter, third octet must be X: {0}")]
    InvalidDelimiter(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),
}

/// Private network scheme for a cloudlet
///
/// The third octet is the per-group delimiter: every VM group gets its own
/// `<octet0>.<octet1>.<n>.0/<mask>` block.
///
/// # Examples
///
/// ```rust
/// use cim_vm_provisioner::domain::NetSpec;
///
/// let spec: NetSpec = "cidr=10.101.X.0/24,floatingipextnet=public".parse().unwrap();
/// assert_eq!(spec.octets, [10, 101]);
/// assert_eq!(spec.netmask_bits, 24);
/// assert_eq!(spec.subnet_cidr(2), "10.101.2.0/24");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetSpec {
    /// Two leading octets of the shared address space
    pub octets: [u8; 2],

    /// Mask bits applied to every group subnet
    pub netmask_bits: u8,

    /// External network floating IPs are allocated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_ip_external_net: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_ip_net: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_ip_subnet: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnic_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_gateway_ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
}

impl NetSpec {
    /// Create a net spec from leading octets and mask
    pub fn new(octets: [u8; 2], netmask_bits: u8) -> Result<Self, NetSpecError> {
        if netmask_bits > 32 {
            return Err(NetSpecError::InvalidPrefixLength(netmask_bits.to_string()));
        }
        Ok(Self {
            octets,
            netmask_bits,
            floating_ip_external_net: None,
            floating_ip_net: None,
            floating_ip_subnet: None,
            vnic_type: None,
            router_gateway_ip: None,
            network_type: None,
        })
    }

    /// Set the floating IP external network
    pub fn with_floating_ip_external_net(mut self, network: impl Into<String>) -> Self {
        self.floating_ip_external_net = Some(network.into());
        self
    }

    /// Parse a `key=value,key=value` network scheme string
    pub fn parse(scheme: &str) -> Result<Self, NetSpecError> {
        if scheme.trim().is_empty() {
            return Err(NetSpecError::Empty);
        }

        let mut cidr = None;
        let mut floating_ip_net = None;
        let mut floating_ip_subnet = None;
        let mut floating_ip_external_net = None;
        let mut vnic_type = None;
        let mut router_gateway_ip = None;
        let mut network_type = None;

        for item in scheme.split(',') {
            let (key, value) = match item.split('=').collect::<Vec<_>>().as_slice() {
                [k, v] => (k.to_lowercase(), v.to_string()),
                _ => return Err(NetSpecError::MalformedItem(item.to_string())),
            };

            match key.as_str() {
                "name" => tracing::debug!("netspec name obsolete"),
                "cidr" => cidr = Some(value),
                "floatingipnet" => floating_ip_net = Some(value),
                "floatingipsubnet" => floating_ip_subnet = Some(value),
                "floatingipextnet" => floating_ip_external_net = Some(value),
                "vnictype" => vnic_type = Some(value),
                "routergateway" => router_gateway_ip = Some(value),
                "networktype" => network_type = Some(value),
                _ => return Err(NetSpecError::UnknownKey(key)),
            }
        }

        let cidr = cidr.ok_or(NetSpecError::MissingCidr)?;
        let (address, mask) = cidr
            .split_once('/')
            .ok_or_else(|| NetSpecError::MissingNetmask(cidr.clone()))?;
        let netmask_bits = mask
            .parse::<u8>()
            .ok()
            .filter(|bits| *bits <= 32)
            .ok_or_else(|| NetSpecError::InvalidPrefixLength(mask.to_string()))?;

        let parts: Vec<&str> = address.split('.').collect();
        if parts.len() != 4 {
            return Err(NetSpecError::InvalidAddress(address.to_string()));
        }
        if parts[2] != "X" {
            return Err(NetSpecError::InvalidDelimiter(address.to_string()));
        }
        let octet = |s: &str| {
            s.parse::<u8>()
                .map_err(|_| NetSpecError::InvalidAddress(address.to_string()))
        };
        let octets = [octet(parts[0])?, octet(parts[1])?];

        Ok(Self {
            octets,
            netmask_bits,
            floating_ip_external_net,
            floating_ip_net,
            floating_ip_subnet,
            vnic_type,
            router_gateway_ip,
            network_type,
        })
    }

    /// Three-octet prefix for the given delimiter octet, e.g. `10.101.2`
    pub fn node_ip_prefix(&self, third_octet: u8) -> String {
        format!("{}.{}.{}", self.octets[0], self.octets[1], third_octet)
    }

    /// Candidate subnet CIDR for the given delimiter octet
    pub fn subnet_cidr(&self, third_octet: u8) -> String {
        format!("{}.0/{}", self.node_ip_prefix(third_octet), self.netmask_bits)
    }

    /// Address range in display form, e.g. `10.101.X.0`
    pub fn network_address(&self) -> String {
        format!("{}.{}.X.0", self.octets[0], self.octets[1])
    }
}

impl FromStr for NetSpec {
    type Err = NetSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cidr={}/{}", self.network_address(), self.netmask_bits)?;
        if let Some(net) = &self.floating_ip_external_net {
            write!(f, ",floatingipextnet={}", net)?;
        }
        Ok(())
    }
}

/// IPv4 CIDR block
///
/// Invariants:
/// - Prefix length 0-32
/// - Host bits are masked off, so `10.0.0.7/24` equals `10.0.0.0/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Block {
    network: u32,
    prefix_length: u8,
}

impl Ipv4Block {
    /// Parse `a.b.c.d/n`
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetSpecError> {
        let cidr = cidr.as_ref();
        let (addr, prefix) = cidr
            .split_once('/')
            .ok_or_else(|| NetSpecError::InvalidCidr(cidr.to_string()))?;
        let address = Ipv4Addr::from_str(addr.trim())
            .map_err(|_| NetSpecError::InvalidCidr(cidr.to_string()))?;
        let prefix_length = prefix
            .trim()
            .parse::<u8>()
            .map_err(|_| NetSpecError::InvalidCidr(cidr.to_string()))?;
        if prefix_length > 32 {
            return Err(NetSpecError::InvalidPrefixLength(prefix_length.to_string()));
        }

        Ok(Self {
            network: u32::from(address) & Self::mask(prefix_length),
            prefix_length,
        })
    }

    fn mask(prefix_length: u8) -> u32 {
        if prefix_length == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_length))
        }
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    /// Prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Whether the two blocks share any address
    pub fn overlaps(&self, other: &Ipv4Block) -> bool {
        let shorter = self.prefix_length.min(other.prefix_length);
        let mask = Self::mask(shorter);
        (self.network & mask) == (other.network & mask)
    }
}

impl fmt::Display for Ipv4Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix_length)
    }
}

impl FromStr for Ipv4Block {
    type Err = NetSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_full_scheme() {
        let spec = NetSpec::parse(
            "cidr=10.101.X.0/24,floatingipnet=public_internal,floatingipsubnet=subnetname,floatingipextnet=public",
        )
        .unwrap();
        assert_eq!(spec.octets, [10, 101]);
        assert_eq!(spec.netmask_bits, 24);
        assert_eq!(spec.floating_ip_net.as_deref(), Some("public_internal"));
        assert_eq!(spec.floating_ip_subnet.as_deref(), Some("subnetname"));
        assert_eq!(spec.floating_ip_external_net.as_deref(), Some("public"));
    }

    #[test]
    fn test_name_key_is_ignored() {
        let spec = NetSpec::parse("name=old,cidr=10.201.X.0/24").unwrap();
        assert_eq!(spec.octets, [10, 201]);
    }

    #[test_case("" => NetSpecError::Empty ; "empty")]
    #[test_case("cidr" => NetSpecError::MalformedItem("cidr".to_string()) ; "no value")]
    #[test_case("color=blue,cidr=10.1.X.0/24" => NetSpecError::UnknownKey("color".to_string()) ; "unknown key")]
    #[test_case("floatingipextnet=public" => NetSpecError::MissingCidr ; "missing cidr")]
    #[test_case("cidr=10.1.X.0" => NetSpecError::MissingNetmask("10.1.X.0".to_string()) ; "no mask")]
    #[test_case("cidr=10.1.X/24" => NetSpecError::InvalidAddress("10.1.X".to_string()) ; "three octets")]
    #[test_case("cidr=10.X.1.0/24" => NetSpecError::InvalidDelimiter("10.X.1.0".to_string()) ; "wrong delimiter")]
    #[test_case("cidr=10.1.X.0/40" => NetSpecError::InvalidPrefixLength("40".to_string()) ; "bad mask")]
    fn test_parse_errors(scheme: &str) -> NetSpecError {
        NetSpec::parse(scheme).unwrap_err()
    }

    #[test]
    fn test_derived_addresses() {
        let spec = NetSpec::new([10, 101], 24).unwrap();
        assert_eq!(spec.node_ip_prefix(7), "10.101.7");
        assert_eq!(spec.subnet_cidr(7), "10.101.7.0/24");
        assert_eq!(spec.network_address(), "10.101.X.0");
    }

    #[test]
    fn test_block_masks_host_bits() {
        let block = Ipv4Block::new("10.0.0.7/24").unwrap();
        assert_eq!(block.to_string(), "10.0.0.0/24");
    }

    #[test_case("10.101.2.0/24", "10.101.2.0/24" => true ; "identical")]
    #[test_case("10.101.2.0/24", "10.101.3.0/24" => false ; "adjacent")]
    #[test_case("10.101.2.0/24", "10.101.2.0/23" => true ; "contained")]
    #[test_case("10.101.4.0/24", "10.101.0.0/22" => false ; "just outside")]
    #[test_case("10.101.2.0/24", "10.101.2.128/25" => true ; "subrange")]
    fn test_overlaps(a: &str, b: &str) -> bool {
        Ipv4Block::new(a).unwrap().overlaps(&Ipv4Block::new(b).unwrap())
    }

    #[test]
    fn test_invalid_block() {
        assert!(Ipv4Block::new("10.0.0.0").is_err());
        assert!(Ipv4Block::new("999.0.0.0/24").is_err());
        assert!(Ipv4Block::new("10.0.0.0/33").is_err());
    }
}
