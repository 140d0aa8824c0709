//! Workflow client contract.

use async_trait::async_trait;
use thiserror::Error;

use super::execution::{ExecutionHandle, ParameterMap};
use super::template::WorkflowTemplate;

/// Errors raised while talking to the orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Transport-level failure reaching the orchestrator.
    #[error("connection to orchestrator failed: {0}")]
    Connection(String),

    /// Credentials were rejected.
    #[error("orchestrator rejected credentials: {0}")]
    Authentication(String),

    /// The workflow tag is not configured, or the orchestrator does not know the workflow.
    #[error("workflow template not found: {0}")]
    TemplateNotFound(String),

    /// The orchestrator does not know the execution.
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// The orchestrator answered with an unexpected status.
    #[error("orchestrator returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// The orchestrator's answer could not be understood.
    #[error("unexpected orchestrator response: {0}")]
    Protocol(String),
}

impl ClientError {
    /// True for failures that may succeed when retried later.
    ///
    /// Rejected credentials count: they are often rotated while a long
    /// provisioning wait is in progress.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Authentication(_) => true,
            Self::Remote { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Submits workflows to, and queries executions on, the orchestration engine.
///
/// `submit` creates exactly one remote execution per call; it is never
/// deduplicated here. Callers that need idempotence must check persisted
/// execution state before submitting.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Start a new execution of `template` with the given inputs.
    async fn submit(
        &self,
        template: &WorkflowTemplate,
        parameters: &ParameterMap,
    ) -> Result<ExecutionHandle, ClientError>;

    /// Fetch the current state of an existing execution.
    async fn query(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> Result<ExecutionHandle, ClientError>;
}

#[async_trait]
impl<T: WorkflowClient + ?Sized> WorkflowClient for std::sync::Arc<T> {
    async fn submit(
        &self,
        template: &WorkflowTemplate,
        parameters: &ParameterMap,
    ) -> Result<ExecutionHandle, ClientError> {
        (**self).submit(template, parameters).await
    }

    async fn query(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> Result<ExecutionHandle, ClientError> {
        (**self).query(workflow_id, execution_id).await
    }
}
