//! Workflow execution handles and typed parameter values.
//!
//! An [`ExecutionHandle`] is the driver's view of one run of a workflow
//! template on the orchestrator: its identity, last observed state and the
//! output parameters reported so far.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Execution state as reported by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Accepted but not yet running (queued, waiting for input or a signal).
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error or was cancelled.
    Failed,
    /// The orchestrator reported a state this driver does not recognise.
    Unknown,
}

impl ExecutionState {
    /// Map a vRO execution state string onto the driver's state model.
    #[must_use]
    pub fn from_vro(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "waiting" | "waiting-signal" | "scheduled" => Self::Pending,
            "completed" => Self::Completed,
            "failed" | "canceled" | "cancelled" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// True while the execution may still change state.
    #[must_use]
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// True once no further transitions can happen.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A typed workflow parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    /// Absent or untyped value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Numeric value.
    Number(f64),
    /// String value.
    String(String),
    /// Array of values.
    Array(Vec<ParameterValue>),
}

impl ParameterValue {
    /// Build a string array value.
    pub fn strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Array(values.into_iter().map(|v| Self::String(v.into())).collect())
    }

    /// Borrow the value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a boolean. Accepts `"true"`/`"false"` strings.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ParameterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<u32> for ParameterValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

/// Input parameters for a workflow submission, ordered by name.
pub type ParameterMap = BTreeMap<String, ParameterValue>;

/// Output parameters reported by an execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputParameters(BTreeMap<String, ParameterValue>);

impl OutputParameters {
    /// Create an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        self.0.insert(name.into(), value);
    }

    /// Raw access to a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    /// A string parameter, empty strings treated as absent.
    #[must_use]
    pub fn string(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(ParameterValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// A boolean parameter.
    #[must_use]
    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ParameterValue::as_bool)
    }

    /// All string elements of an array parameter.
    ///
    /// A scalar string is treated as a one-element array; missing parameters
    /// and non-string elements yield nothing.
    #[must_use]
    pub fn strings(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(ParameterValue::Array(items)) => items
                .iter()
                .filter_map(ParameterValue::as_str)
                .map(str::to_string)
                .collect(),
            Some(ParameterValue::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no parameters were reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, ParameterValue)> for OutputParameters {
    fn from_iter<T: IntoIterator<Item = (String, ParameterValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One run of a workflow template on the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHandle {
    /// Workflow (template) id the execution belongs to.
    pub workflow_id: String,
    /// Execution id, unique per submission.
    pub execution_id: String,
    /// Workflow name.
    pub name: String,
    /// Last observed state.
    pub state: ExecutionState,
    /// Output parameters reported so far.
    #[serde(default)]
    pub output_parameters: OutputParameters,
}

impl ExecutionHandle {
    /// Handle for a freshly submitted execution.
    #[must_use]
    pub fn pending(
        workflow_id: impl Into<String>,
        execution_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            name: name.into(),
            state: ExecutionState::Pending,
            output_parameters: OutputParameters::new(),
        }
    }

    /// True iff the execution is pending or running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// True iff the execution finished with a failure.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.state == ExecutionState::Failed
    }

    /// Identity of this execution, detached from its state.
    #[must_use]
    pub fn reference(&self) -> ExecutionRef {
        ExecutionRef {
            workflow_name: self.name.clone(),
            workflow_id: self.workflow_id.clone(),
            execution_id: self.execution_id.clone(),
        }
    }
}

/// Identity of an execution, as persisted and reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRef {
    pub workflow_name: String,
    pub workflow_id: String,
    pub execution_id: String,
}
