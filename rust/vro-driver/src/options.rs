//! Per-call machine options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::workflow::{TemplateTag, WorkflowTemplate};

/// Options recognised by the lifecycle operations.
///
/// Every field has a default, so an empty document is valid. Unknown keys
/// are rejected when deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MachineOptions {
    pub reservation_policy: Option<String>,
    /// User the request is made on behalf of. Defaults to the configured username.
    pub on_behalf_of: Option<String>,
    pub location: Option<String>,
    pub component: Option<String>,
    pub environment: Option<String>,
    /// Virtual CPU count.
    pub cpu: u32,
    /// Memory in MB.
    pub ram: u32,
    pub image: Option<String>,
    pub is_windows: bool,
    pub ssh_username: Option<String>,
    pub sudo: bool,
    pub ssh_gateway: Option<String>,
    pub cached_installer: bool,
    /// Per-call workflow template overrides, keyed by operation tag.
    pub workflows: BTreeMap<String, WorkflowTemplate>,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            reservation_policy: None,
            on_behalf_of: None,
            location: None,
            component: None,
            environment: None,
            cpu: 1,
            ram: 1024,
            image: None,
            is_windows: false,
            ssh_username: None,
            sudo: false,
            ssh_gateway: None,
            cached_installer: false,
            workflows: BTreeMap::new(),
        }
    }
}

impl MachineOptions {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), String> {
        let mut problems = Vec::new();
        if self.cpu == 0 {
            problems.push("cpu must be at least 1".to_string());
        }
        if self.ram == 0 {
            problems.push("ram must be at least 1 MB".to_string());
        }
        for (key, template) in &self.workflows {
            if key.parse::<TemplateTag>().is_err() {
                problems.push(format!("unknown workflow override '{key}'"));
            } else if template.id.trim().is_empty() {
                problems.push(format!("workflow override '{key}' has an empty id"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("; "))
        }
    }

    /// Per-call override for `tag`, if one was given.
    #[must_use]
    pub fn workflow_override(&self, tag: TemplateTag) -> Option<&WorkflowTemplate> {
        self.workflows.get(tag.as_str())
    }
}
