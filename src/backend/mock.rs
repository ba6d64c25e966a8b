// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory stack backend
//!
//! Holds subnets, floating IPs and stacks in memory. Stack status reported
//! by `show_stack` can be scripted per stack to drive poll loops through
//! in-progress, failed and vanished states.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    BackendError, BackendResult, FloatingIpInfo, StackBackend, StackDetail, StackTemplate,
    SubnetInfo,
};

/// One scripted answer to `show_stack`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusStep {
    Status {
        status: String,
        reason: Option<String>,
    },
    /// Stack no longer exists
    Gone,
}

impl StatusStep {
    pub fn status(status: &str) -> Self {
        StatusStep::Status {
            status: status.to_string(),
            reason: None,
        }
    }

    pub fn failed(status: &str, reason: &str) -> Self {
        StatusStep::Status {
            status: status.to_string(),
            reason: Some(reason.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
struct MockStack {
    document: String,
    status: String,
}

#[derive(Debug, Default)]
struct MockState {
    subnets: Vec<SubnetInfo>,
    floating_ips: Vec<FloatingIpInfo>,
    stacks: HashMap<String, MockStack>,
    templates: HashMap<String, StackTemplate>,
    scripts: HashMap<String, VecDeque<StatusStep>>,
    submit_failure: Option<String>,
    calls: Vec<String>,
}

fn not_found(command: &str, name: &str) -> BackendError {
    BackendError::Command {
        command: command.to_string(),
        output: format!("Stack not found: {}", name),
    }
}

/// Scriptable in-memory [`StackBackend`]
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_subnets(self, subnets: Vec<SubnetInfo>) -> Self {
        self.state().subnets = subnets;
        self
    }

    pub fn with_floating_ips(self, floating_ips: Vec<FloatingIpInfo>) -> Self {
        self.state().floating_ips = floating_ips;
        self
    }

    /// Register the deployed template of an existing stack
    pub fn with_stack_template(self, name: &str, template: StackTemplate) -> Self {
        self.state().templates.insert(name.to_string(), template);
        self
    }

    /// Register an existing stack in the given status
    pub fn with_stack(self, name: &str, status: &str) -> Self {
        self.state().stacks.insert(
            name.to_string(),
            MockStack {
                document: String::new(),
                status: status.to_string(),
            },
        );
        self
    }

    /// Answers for successive `show_stack` calls; the last one repeats
    pub fn script_status(&self, name: &str, steps: Vec<StatusStep>) {
        self.state()
            .scripts
            .insert(name.to_string(), steps.into_iter().collect());
    }

    /// Make every create and update fail with the given output
    pub fn fail_submissions(&self, output: &str) {
        self.state().submit_failure = Some(output.to_string());
    }

    /// Calls received so far, as `"<primitive> <name>"`
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Number of create and update submissions
    pub fn submissions(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.starts_with("create_stack") || c.starts_with("update_stack"))
            .count()
    }

    /// Document last submitted for a stack
    pub fn submitted_document(&self, name: &str) -> Option<String> {
        self.state().stacks.get(name).map(|s| s.document.clone())
    }

    pub fn has_stack(&self, name: &str) -> bool {
        self.state().stacks.contains_key(name)
    }

    async fn submit(&self, primitive: &str, name: &str, template: &Path) -> BackendResult<()> {
        let document = tokio::fs::read_to_string(template)
            .await
            .map_err(|source| BackendError::Spawn {
                command: primitive.to_string(),
                source,
            })?;

        let mut state = self.state();
        state.calls.push(format!("{} {}", primitive, name));
        if let Some(output) = state.submit_failure.clone() {
            return Err(BackendError::Command {
                command: primitive.to_string(),
                output,
            });
        }

        let status = if primitive == "create_stack" {
            "CREATE_COMPLETE"
        } else {
            if !state.stacks.contains_key(name) {
                return Err(not_found(primitive, name));
            }
            "UPDATE_COMPLETE"
        };
        state.stacks.insert(
            name.to_string(),
            MockStack {
                document,
                status: status.to_string(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl StackBackend for MockBackend {
    async fn list_subnets(&self, _network: Option<&str>) -> BackendResult<Vec<SubnetInfo>> {
        let mut state = self.state();
        state.calls.push("list_subnets".to_string());
        Ok(state.subnets.clone())
    }

    async fn list_floating_ips(&self, network: Option<&str>) -> BackendResult<Vec<FloatingIpInfo>> {
        let mut state = self.state();
        state.calls.push("list_floating_ips".to_string());
        Ok(state
            .floating_ips
            .iter()
            .filter(|f| network.map_or(true, |n| f.floating_network == n))
            .cloned()
            .collect())
    }

    async fn create_stack(&self, name: &str, template: &Path) -> BackendResult<()> {
        self.submit("create_stack", name, template).await
    }

    async fn update_stack(&self, name: &str, template: &Path) -> BackendResult<()> {
        self.submit("update_stack", name, template).await
    }

    async fn show_stack(&self, name: &str) -> BackendResult<StackDetail> {
        let mut state = self.state();
        state.calls.push(format!("show_stack {}", name));

        let scripted = state.scripts.get_mut(name).and_then(|steps| {
            if steps.len() > 1 {
                steps.pop_front()
            } else {
                steps.front().cloned()
            }
        });

        let (status, reason) = match scripted {
            Some(StatusStep::Status { status, reason }) => (status, reason),
            Some(StatusStep::Gone) => return Err(not_found("show_stack", name)),
            None => match state.stacks.get(name) {
                Some(stack) => (stack.status.clone(), None),
                None => return Err(not_found("show_stack", name)),
            },
        };

        Ok(StackDetail {
            id: format!("{}-id", name),
            stack_name: name.to_string(),
            stack_status: status,
            stack_status_reason: reason,
        })
    }

    async fn show_stack_template(&self, name: &str) -> BackendResult<StackTemplate> {
        let mut state = self.state();
        state.calls.push(format!("show_stack_template {}", name));
        state
            .templates
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("show_stack_template", name))
    }

    async fn delete_stack(&self, name: &str) -> BackendResult<()> {
        let mut state = self.state();
        state.calls.push(format!("delete_stack {}", name));
        if state.stacks.remove(name).is_none() {
            return Err(not_found("delete_stack", name));
        }
        state.templates.remove(name);
        Ok(())
    }
}
