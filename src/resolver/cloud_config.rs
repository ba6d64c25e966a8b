// Copyright (c) 2025 - Cowboy AI, Inc.
//! Per-VM boot data: cloud-config user data and role metadata

use crate::domain::{Vm, VmRole};

/// Column at which multi-line values are embedded in the stack document
pub const EMBED_INDENT: usize = 16;

/// Master address placeholder when no subnet was resolved
pub const NO_MASTER_IP: &str = "NONE";

const BASE_CLOUD_CONFIG: &str = "#cloud-config
bootcmd:
 - echo VM GROUP CLOUD CONFIG START
 - echo 'APT::Periodic::Enable \"0\";' > /etc/apt/apt.conf.d/10cloudinit-disable
chpasswd: { expire: False }
ssh_pwauth: False
timezone: UTC
runcmd:
 - echo doing ifconfig
 - ifconfig -a";

/// Prefix every line of `text` with `indent` spaces
///
/// No trailing newline is added; an empty input yields one indented empty
/// line.
pub fn reindent(text: &str, indent: usize) -> String {
    let pad = " ".repeat(indent);
    text.split('\n')
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cloud-config user data for `vm`, not yet indented
///
/// A deployment manifest replaces the generated cloud-config entirely.
pub fn vm_user_data(vm: &Vm) -> String {
    if let Some(manifest) = vm.deployment_manifest.as_deref().filter(|m| !m.is_empty()) {
        return manifest.trim_end().to_string();
    }

    let mut config = format!("{}\nhostname: {}", BASE_CLOUD_CONFIG, vm.name);
    if let Some(command) = vm.command.as_deref().filter(|c| !c.is_empty()) {
        // runcmd is the last list in the base config
        config = config.replacen(
            "\nhostname:",
            &format!("\n - {}\nhostname:", command),
            1,
        );
    }
    config
}

/// Role metadata for a VM, not yet indented
pub fn vm_metadata(role: VmRole, master_ip: Option<&str>) -> String {
    let skip_k8s = if role == VmRole::Agent { "yes" } else { "no" };
    format!(
        "skipk8s: {}\nrole: {}\nk8smaster: {}",
        skip_k8s,
        role,
        master_ip.unwrap_or(NO_MASTER_IP)
    )
}

/// Line-wise comparison ignoring surrounding whitespace on each line
pub fn user_data_matches(deployed: &str, generated: &str) -> bool {
    let deployed: Vec<&str> = deployed.trim().split('\n').map(str::trim).collect();
    let generated: Vec<&str> = generated.trim().split('\n').map(str::trim).collect();
    deployed == generated
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vm(role: VmRole) -> Vm {
        Vm {
            name: "master".to_string(),
            role,
            image_name: Some("ubuntu".to_string()),
            flavor_name: "m1.small".to_string(),
            compute_availability_zone: None,
            ports: vec![],
            volumes: vec![],
            deployment_manifest: None,
            command: None,
            user_data: String::new(),
            meta_data: String::new(),
        }
    }

    #[test]
    fn test_reindent_every_line() {
        assert_eq!(reindent("a\nb", 4), "    a\n    b");
        assert_eq!(reindent("", 2), "  ");
    }

    #[test]
    fn test_metadata_for_master() {
        assert_eq!(
            vm_metadata(VmRole::Master, Some("10.101.2.10")),
            "skipk8s: no\nrole: k8s-master\nk8smaster: 10.101.2.10"
        );
        assert!(vm_metadata(VmRole::Agent, None).ends_with("k8smaster: NONE"));
        assert!(vm_metadata(VmRole::Agent, None).starts_with("skipk8s: yes"));
    }

    #[test]
    fn test_command_appended_to_runcmd() {
        let mut v = vm(VmRole::Node);
        v.command = Some("docker run nginx".to_string());
        let data = vm_user_data(&v);
        assert!(data.starts_with("#cloud-config"));
        assert!(data.contains(" - ifconfig -a\n - docker run nginx\nhostname: master"));
    }

    #[test]
    fn test_manifest_replaces_cloud_config() {
        let mut v = vm(VmRole::Node);
        v.deployment_manifest = Some("#cloud-config\nruncmd: []\n".to_string());
        assert_eq!(vm_user_data(&v), "#cloud-config\nruncmd: []");
    }

    #[test]
    fn test_user_data_compare_ignores_indentation() {
        let generated = reindent(&vm_user_data(&vm(VmRole::Master)), EMBED_INDENT);
        let deployed = vm_user_data(&vm(VmRole::Master));
        assert!(user_data_matches(&deployed, &generated));

        let mut changed = vm(VmRole::Master);
        changed.command = Some("reboot".to_string());
        assert!(!user_data_matches(&deployed, &vm_user_data(&changed)));
    }
}
