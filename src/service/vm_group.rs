// Copyright (c) 2025 - Cowboy AI, Inc.
//! VM Group Service
//!
//! Each operation is one transaction against the backend:
//! 1. Take the provisioning lock, unless already cancelled
//! 2. Resolve placeholders and reserve what was claimed
//! 3. Render the stack document
//! 4. Write and submit it, then drop the lock
//! 5. Poll the stack to a terminal state
//! 6. Release the reservations, whatever the outcome

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::backend::StackBackend;
use crate::config::ProvisionerConfig;
use crate::domain::ResourceGraph;
use crate::errors::{Action, ProvisionError, ProvisionResult};
use crate::reservation::{ReservationRegistry, ReservedResources};
use crate::resolver::ParameterResolver;
use crate::stack::{Applied, ProgressCallback, StackLifecycleManager};
use crate::template::TemplateRenderer;

/// VM group service trait
///
/// Defines the caller-facing operations on a group of VMs.
#[async_trait]
pub trait VmGroupService: Send + Sync {
    /// Create the group's stack and wait until it is complete
    async fn create_vms(&self, graph: ResourceGraph) -> ProvisionResult<()>;

    /// Update the group's stack in place and wait until it is complete
    async fn update_vms(&self, graph: ResourceGraph) -> ProvisionResult<()>;

    /// Delete the group's stack; a missing stack counts as deleted
    async fn delete_vms(&self, group_name: &str) -> ProvisionResult<()>;
}

/// [`VmGroupService`] backed by Heat stacks
pub struct HeatVmGroupService {
    resolver: ParameterResolver,
    renderer: TemplateRenderer,
    manager: StackLifecycleManager,
    registry: Arc<ReservationRegistry>,
    cancel: CancellationToken,
}

impl HeatVmGroupService {
    pub fn new(
        backend: Arc<dyn StackBackend>,
        registry: Arc<ReservationRegistry>,
        config: &ProvisionerConfig,
    ) -> ProvisionResult<Self> {
        Ok(Self {
            resolver: ParameterResolver::new(
                backend.clone(),
                registry.clone(),
                config.mex_network.clone(),
            ),
            renderer: TemplateRenderer::new()?,
            manager: StackLifecycleManager::new(backend, config.stack_settings()),
            registry,
            cancel: CancellationToken::new(),
        })
    }

    /// Report stack submissions and polled statuses to `progress`
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.manager = self.manager.with_progress(progress);
        self
    }

    pub fn registry(&self) -> &Arc<ReservationRegistry> {
        &self.registry
    }

    /// Token whose cancellation aborts in-flight waits and refuses new submissions
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolve and render without touching the backend
    ///
    /// Returns the path of the written document.
    pub async fn test_vms(&self, graph: ResourceGraph) -> ProvisionResult<PathBuf> {
        let applied = self.provision(graph, Action::Test).await?;
        Ok(applied.path)
    }

    fn release(&self, group: &str, reserved: &ReservedResources) {
        if reserved.is_empty() {
            return;
        }
        if let Err(e) = self.registry.release_all(reserved) {
            warn!(group, error = %e, "releasing reservations failed");
        }
    }

    /// Locked section: resolve, reserve, render, write and submit
    async fn submit(
        &self,
        graph: &mut ResourceGraph,
        action: Action,
        cancel: &CancellationToken,
    ) -> ProvisionResult<(ReservedResources, Applied)> {
        let held = self
            .manager
            .lock_or_cancel(&graph.group_name, action, cancel)
            .await?;
        let reserved = self.resolver.resolve(graph, action).await?;
        if cancel.is_cancelled() {
            self.release(&graph.group_name, &reserved);
            return Err(ProvisionError::Cancelled {
                group: graph.group_name.clone(),
                action,
            });
        }

        let applied = match self.renderer.render(graph) {
            Ok(document) => {
                self.manager
                    .apply(&held, &graph.group_name, action, &document)
                    .await
            }
            Err(e) => Err(e),
        };
        match applied {
            Ok(applied) => Ok((reserved, applied)),
            Err(e) => {
                self.release(&graph.group_name, &reserved);
                Err(e)
            }
        }
    }

    #[instrument(skip(self, graph), fields(group = %graph.group_name, operation_id = %Uuid::now_v7()))]
    async fn provision(&self, mut graph: ResourceGraph, action: Action) -> ProvisionResult<Applied> {
        info!("provisioning vm group");
        let cancel = self.cancel.child_token();
        let (reserved, applied) = self.submit(&mut graph, action, &cancel).await?;

        let outcome = if applied.submitted {
            self.manager
                .wait_for_stack(&graph.group_name, action, &cancel)
                .await
        } else {
            Ok(())
        };

        self.release(&graph.group_name, &reserved);
        outcome.map(|()| applied)
    }
}

#[async_trait]
impl VmGroupService for HeatVmGroupService {
    async fn create_vms(&self, graph: ResourceGraph) -> ProvisionResult<()> {
        self.provision(graph, Action::Create).await.map(|_| ())
    }

    async fn update_vms(&self, graph: ResourceGraph) -> ProvisionResult<()> {
        self.provision(graph, Action::Update).await.map(|_| ())
    }

    #[instrument(skip(self), fields(operation_id = %Uuid::now_v7()))]
    async fn delete_vms(&self, group_name: &str) -> ProvisionResult<()> {
        info!("deleting vm group");
        let cancel = self.cancel.child_token();
        self.manager.delete(group_name, &cancel).await
    }
}
