//! Workflow templates and the catalog that maps lifecycle operations onto them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::client::ClientError;

/// Lifecycle operation tags a workflow template can be registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTag {
    AllocateMachine,
    StartMachine,
    StopMachine,
    DestroyMachine,
    GetMachineInfo,
    ReadyMachine,
}

impl TemplateTag {
    /// Every known tag.
    pub const ALL: [Self; 6] = [
        Self::AllocateMachine,
        Self::StartMachine,
        Self::StopMachine,
        Self::DestroyMachine,
        Self::GetMachineInfo,
        Self::ReadyMachine,
    ];

    /// Tags the dispatcher submits and which therefore must be configured.
    ///
    /// `ready_machine` is accepted in configuration but never submitted:
    /// readiness is computed locally from the allocate execution and the
    /// live instance state.
    pub const REQUIRED: [Self; 5] = [
        Self::AllocateMachine,
        Self::StartMachine,
        Self::StopMachine,
        Self::DestroyMachine,
        Self::GetMachineInfo,
    ];

    /// Configuration key for this tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllocateMachine => "allocate_machine",
            Self::StartMachine => "start_machine",
            Self::StopMachine => "stop_machine",
            Self::DestroyMachine => "destroy_machine",
            Self::GetMachineInfo => "get_machine_info",
            Self::ReadyMachine => "ready_machine",
        }
    }
}

impl std::fmt::Display for TemplateTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TemplateTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s.trim())
            .ok_or_else(|| format!("Unknown workflow tag: {s}"))
    }
}

/// A concrete workflow artifact on the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Human-readable workflow name.
    pub name: String,
    /// Workflow id used in REST paths.
    pub id: String,
}

impl WorkflowTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Immutable mapping from operation tag to workflow template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowCatalog(BTreeMap<TemplateTag, WorkflowTemplate>);

impl WorkflowCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, tag: TemplateTag, template: WorkflowTemplate) -> Self {
        self.0.insert(tag, template);
        self
    }

    /// Build a catalog from string-keyed configuration entries.
    ///
    /// Unknown keys are returned as errors so they can be reported together.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self, Vec<String>>
    where
        I: IntoIterator<Item = (&'a String, &'a WorkflowTemplate)>,
    {
        let mut catalog = Self::new();
        let mut unknown = Vec::new();
        for (key, template) in entries {
            match key.parse::<TemplateTag>() {
                Ok(tag) => {
                    catalog.0.insert(tag, template.clone());
                }
                Err(_) => unknown.push(key.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(catalog)
        } else {
            Err(unknown)
        }
    }

    /// Look up a template, if registered.
    #[must_use]
    pub fn get(&self, tag: TemplateTag) -> Option<&WorkflowTemplate> {
        self.0.get(&tag)
    }

    /// Look up a template or fail with `TemplateNotFound`.
    pub fn resolve(&self, tag: TemplateTag) -> Result<&WorkflowTemplate, ClientError> {
        self.get(tag)
            .ok_or_else(|| ClientError::TemplateNotFound(tag.to_string()))
    }

    /// Tags from [`TemplateTag::REQUIRED`] that are not registered.
    #[must_use]
    pub fn missing_required(&self) -> Vec<TemplateTag> {
        TemplateTag::REQUIRED
            .into_iter()
            .filter(|tag| !self.0.contains_key(tag))
            .collect()
    }

    /// Iterate over registered templates.
    pub fn iter(&self) -> impl Iterator<Item = (TemplateTag, &WorkflowTemplate)> {
        self.0.iter().map(|(tag, template)| (*tag, template))
    }
}
