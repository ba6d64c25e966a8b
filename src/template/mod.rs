// Copyright (c) 2025 - Cowboy AI, Inc.
//! Heat template rendering
//!
//! Turns a fully resolved [`ResourceGraph`] into a Heat orchestration
//! template (`heat_template_version: 2016-10-14`). Rendering is pure: the
//! same graph always yields the same bytes.

use std::error::Error as _;

use tera::{Context, Tera};
use tracing::debug;

use crate::domain::ResourceGraph;
use crate::errors::{ProvisionError, ProvisionResult};

/// Name the template is registered under; not `.html`, so autoescape is off
pub const TEMPLATE_NAME: &str = "vm_group.yaml";

const VM_GROUP_TEMPLATE: &str = include_str!("vm_group.yaml.tera");

/// Renders resource graphs to Heat YAML documents
pub struct TemplateRenderer {
    tera: Tera,
}

impl TemplateRenderer {
    pub fn new() -> ProvisionResult<Self> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.add_raw_template(TEMPLATE_NAME, VM_GROUP_TEMPLATE)
            .map_err(|e| ProvisionError::Render {
                group: TEMPLATE_NAME.to_string(),
                message: error_chain(&e),
            })?;
        Ok(Self { tera })
    }

    /// Render `graph`
    ///
    /// Fails if a reference dangles or a placeholder was left unresolved.
    pub fn render(&self, graph: &ResourceGraph) -> ProvisionResult<String> {
        graph.check_references()?;
        graph.check_resolved()?;

        let mut context = Context::new();
        context.insert("graph", graph);
        let document = self
            .tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|e| ProvisionError::Render {
                group: graph.group_name.clone(),
                message: error_chain(&e),
            })?;

        debug!(group = %graph.group_name, bytes = document.len(), "rendered stack document");
        Ok(document)
    }
}

/// Tera nests the interesting cause a few levels down
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
