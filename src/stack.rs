// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack Lifecycle Management
//!
//! Writes rendered documents to `<template_dir>/<group>-heat.yaml`, submits
//! them to the backend and polls the resulting operation until it reaches a
//! terminal state, fails, times out or is cancelled.
//!
//! The manager also owns the provisioning lock. Everything from parameter
//! resolution up to submission runs under it, across all groups; polling
//! does not.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::backend::{BackendCondition, StackBackend};
use crate::errors::{Action, ProvisionError, ProvisionResult};
use crate::state_machine::{
    PollOutcome, StackLifecycle, StackObservation, TrackedMachine,
};

/// Timing and output settings for stack operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSettings {
    pub template_dir: PathBuf,
    pub poll_interval: Duration,
    pub stack_timeout: Duration,
    /// Write documents but never submit or poll
    pub test_mode: bool,
}

impl Default for StackSettings {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("."),
            poll_interval: Duration::from_secs(10),
            stack_timeout: Duration::from_secs(20 * 60),
            test_mode: false,
        }
    }
}

/// Granularity of a progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// A new phase of the operation starts
    Task,
    /// One poll of an operation already under way
    Step,
}

/// Receives progress of stack operations as they run
pub type ProgressCallback = Arc<dyn Fn(ProgressKind, &str) + Send + Sync>;

/// Proof that the caller holds the provisioning lock
pub struct ProvisionGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// Result of applying a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Where the document was written
    pub path: PathBuf,
    /// Whether it went to the backend
    pub submitted: bool,
}

/// Path of the document written for `name`
pub fn document_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}-heat.yaml", name))
}

/// Submits stack documents and drives them to completion
pub struct StackLifecycleManager {
    backend: Arc<dyn StackBackend>,
    settings: StackSettings,
    provision_lock: Mutex<()>,
    progress: Option<ProgressCallback>,
}

impl StackLifecycleManager {
    pub fn new(backend: Arc<dyn StackBackend>, settings: StackSettings) -> Self {
        Self {
            backend,
            settings,
            provision_lock: Mutex::new(()),
            progress: None,
        }
    }

    /// Report submissions and every polled status to `progress`
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, kind: ProgressKind, message: &str) {
        if let Some(progress) = &self.progress {
            progress(kind, message);
        }
    }

    pub fn settings(&self) -> &StackSettings {
        &self.settings
    }

    /// Whether `action` stops after writing the document
    pub fn renders_only(&self, action: Action) -> bool {
        self.settings.test_mode || action == Action::Test
    }

    /// Acquire the provisioning lock
    pub async fn lock(&self) -> ProvisionGuard<'_> {
        ProvisionGuard {
            _guard: self.provision_lock.lock().await,
        }
    }

    /// Acquire the provisioning lock unless `cancel` fires first
    pub async fn lock_or_cancel(
        &self,
        name: &str,
        action: Action,
        cancel: &CancellationToken,
    ) -> ProvisionResult<ProvisionGuard<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(cancelled(name, action)),
            held = self.lock() => Ok(held),
        }
    }

    /// Write `document` and, unless rendering only, submit it
    ///
    /// Does not poll. Requires the provisioning lock.
    #[instrument(skip(self, _held, document))]
    pub async fn apply(
        &self,
        _held: &ProvisionGuard<'_>,
        name: &str,
        action: Action,
        document: &str,
    ) -> ProvisionResult<Applied> {
        tokio::fs::create_dir_all(&self.settings.template_dir).await?;
        let path = document_path(&self.settings.template_dir, name);
        tokio::fs::write(&path, document).await?;
        debug!(path = %path.display(), "wrote stack document");

        if self.renders_only(action) {
            info!(path = %path.display(), "test mode, document not submitted");
            return Ok(Applied {
                path,
                submitted: false,
            });
        }

        let task = match action {
            Action::Update => format!("Updating Heat Stack for {}", name),
            _ => format!("Creating Heat Stack for {}", name),
        };
        self.report(ProgressKind::Task, &task);
        let submitted = match action {
            Action::Update => self.backend.update_stack(name, &path).await,
            _ => self.backend.create_stack(name, &path).await,
        };
        submitted.map_err(|e| {
            warn!(error = %e, "stack submission failed");
            ProvisionError::backend(name, action, &e)
        })?;

        info!("stack submitted");
        Ok(Applied {
            path,
            submitted: true,
        })
    }

    /// Write, submit and poll a new stack
    pub async fn create(
        &self,
        name: &str,
        document: &str,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        self.apply_and_wait(name, Action::Create, document, cancel)
            .await
    }

    /// Write, submit and poll an update of an existing stack
    pub async fn update(
        &self,
        name: &str,
        document: &str,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        self.apply_and_wait(name, Action::Update, document, cancel)
            .await
    }

    async fn apply_and_wait(
        &self,
        name: &str,
        action: Action,
        document: &str,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        let applied = {
            let held = self.lock_or_cancel(name, action, cancel).await?;
            self.apply(&held, name, action, document).await?
        };
        if applied.submitted {
            self.wait_for_stack(name, action, cancel).await?;
        }
        Ok(())
    }

    /// Delete a stack and wait for it to disappear
    ///
    /// A stack that does not exist counts as deleted.
    #[instrument(skip(self, cancel))]
    pub async fn delete(&self, name: &str, cancel: &CancellationToken) -> ProvisionResult<()> {
        if self.settings.test_mode {
            info!("test mode, stack not deleted");
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(cancelled(name, Action::Delete));
        }

        self.report(ProgressKind::Task, &format!("Deleting Heat Stack {}", name));
        if let Err(e) = self.backend.delete_stack(name).await {
            if e.condition(Action::Delete) == BackendCondition::AlreadyGone {
                info!("stack already deleted");
                return Ok(());
            }
            return Err(ProvisionError::backend(name, Action::Delete, &e));
        }
        self.wait_for_stack(name, Action::Delete, cancel).await
    }

    async fn observe(&self, name: &str, action: Action, elapsed: Duration) -> ProvisionResult<StackObservation> {
        match self.backend.show_stack(name).await {
            Ok(detail) => Ok(StackObservation::Status {
                status: detail.stack_status,
                reason: detail.stack_status_reason,
                elapsed,
            }),
            Err(e) => match e.condition(action) {
                BackendCondition::AlreadyGone => Ok(StackObservation::NotFound),
                _ => Err(ProvisionError::backend(name, action, &e)),
            },
        }
    }

    /// Poll the stack every `poll_interval` until the operation finishes
    #[instrument(skip(self, cancel))]
    pub async fn wait_for_stack(
        &self,
        name: &str,
        action: Action,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        let started = Instant::now();
        let mut lifecycle = TrackedMachine::new(StackLifecycle::submitted(
            action,
            self.settings.stack_timeout,
        ));

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(name, action));
            }

            let observation = self.observe(name, action, started.elapsed()).await?;
            debug!(?observation, "stack status");
            if let StackObservation::Status { status, .. } = &observation {
                self.report(ProgressKind::Step, &format!("Heat Stack Status: {}", status));
            }
            let outcome = lifecycle.apply(observation, Utc::now())?;

            match outcome {
                PollOutcome::Wait => {}
                PollOutcome::Succeeded => {
                    info!(
                        state = %lifecycle.state().state,
                        polls = lifecycle.steps().len(),
                        "stack operation complete"
                    );
                    return Ok(());
                }
                PollOutcome::Failed { reason } => {
                    warn!(%reason, "stack operation failed");
                    return Err(ProvisionError::StackFailed {
                        group: name.to_string(),
                        action,
                        reason,
                    });
                }
                PollOutcome::Unexpected { status } => {
                    return Err(ProvisionError::UnexpectedStatus {
                        group: name.to_string(),
                        action,
                        status,
                    });
                }
                PollOutcome::TimedOut { elapsed } => {
                    warn!(?elapsed, "stack operation stuck in progress");
                    return Err(ProvisionError::StackTimeout {
                        group: name.to_string(),
                        action,
                        elapsed,
                    });
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled(name, action)),
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }
}

fn cancelled(name: &str, action: Action) -> ProvisionError {
    info!(group = name, %action, "stack operation cancelled");
    ProvisionError::Cancelled {
        group: name.to_string(),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_path() {
        assert_eq!(
            document_path(Path::new("/tmp/heat"), "cluster1"),
            PathBuf::from("/tmp/heat/cluster1-heat.yaml")
        );
    }

    #[test]
    fn test_default_timing() {
        let settings = StackSettings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(10));
        assert_eq!(settings.stack_timeout, Duration::from_secs(1200));
    }
}
