//! Lifecycle operation errors.
//!
//! Every variant names the machine and the operation attempted, so a
//! failure can be correlated with the orchestrator's own job history.

use thiserror::Error;

use crate::driver::Operation;
use crate::reference::StoreError;
use crate::workflow::ClientError;

/// Errors surfaced by [`crate::Driver`] operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The orchestrator call failed (connection, credentials, unknown
    /// workflow or execution, unexpected answer).
    #[error("{operation} '{machine}': {source}")]
    Client {
        machine: String,
        operation: Operation,
        #[source]
        source: ClientError,
    },

    /// The reference was created by a different driver, tenant or business unit.
    #[error("{operation} '{machine}': reference belongs to driver '{found}', this driver is '{expected}'")]
    DriverMismatch {
        machine: String,
        operation: Operation,
        expected: String,
        found: String,
    },

    /// The persisted reference violates a paired-field invariant, or the
    /// orchestrator reported inconsistent VM identities.
    #[error("{operation} '{machine}': inconsistent reference: {detail}")]
    ReferenceConsistency {
        machine: String,
        operation: Operation,
        detail: String,
    },

    /// Allocation produced more than one VM.
    #[error("{operation} '{machine}': allocation provisioned {count} VMs ({names:?}), expected exactly one")]
    MultipleVmsProvisioned {
        machine: String,
        operation: Operation,
        count: usize,
        names: Vec<String>,
    },

    /// A workflow execution finished in the failed state.
    #[error("{operation} '{machine}': workflow '{workflow}' execution {execution_id} failed")]
    WorkflowFailed {
        machine: String,
        operation: Operation,
        workflow: String,
        execution_id: String,
    },

    /// The allocate execution finished in the failed state.
    #[error("{operation} '{machine}': provisioning execution {execution_id} of '{workflow}' failed")]
    ProvisioningFailed {
        machine: String,
        operation: Operation,
        workflow: String,
        execution_id: String,
    },

    /// An execution was still alive when the wait deadline passed.
    #[error("{operation} '{machine}': execution {execution_id} still {state} after {waited_secs}s")]
    ProvisioningTimeout {
        machine: String,
        operation: Operation,
        execution_id: String,
        state: String,
        waited_secs: u64,
    },

    /// The VM exists in the reference but no live instance was found.
    #[error("{operation} '{machine}': instance is not available")]
    InstanceNotReady { machine: String, operation: Operation },

    /// The reference has neither a VM identity nor an execution to wait on.
    #[error("{operation} '{machine}': machine has not been allocated")]
    NotAllocated { machine: String, operation: Operation },

    /// Per-call options were rejected.
    #[error("{operation} '{machine}': invalid options: {detail}")]
    InvalidOptions {
        machine: String,
        operation: Operation,
        detail: String,
    },

    /// Reading or writing the reference failed.
    #[error("{operation} '{machine}': {source}")]
    Store {
        machine: String,
        operation: Operation,
        #[source]
        source: StoreError,
    },
}

impl DriverError {
    /// Machine the failed operation ran against.
    #[must_use]
    pub fn machine(&self) -> &str {
        match self {
            Self::Client { machine, .. }
            | Self::DriverMismatch { machine, .. }
            | Self::ReferenceConsistency { machine, .. }
            | Self::MultipleVmsProvisioned { machine, .. }
            | Self::WorkflowFailed { machine, .. }
            | Self::ProvisioningFailed { machine, .. }
            | Self::ProvisioningTimeout { machine, .. }
            | Self::InstanceNotReady { machine, .. }
            | Self::NotAllocated { machine, .. }
            | Self::InvalidOptions { machine, .. }
            | Self::Store { machine, .. } => machine,
        }
    }

    /// Operation that failed.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Client { operation, .. }
            | Self::DriverMismatch { operation, .. }
            | Self::ReferenceConsistency { operation, .. }
            | Self::MultipleVmsProvisioned { operation, .. }
            | Self::WorkflowFailed { operation, .. }
            | Self::ProvisioningFailed { operation, .. }
            | Self::ProvisioningTimeout { operation, .. }
            | Self::InstanceNotReady { operation, .. }
            | Self::NotAllocated { operation, .. }
            | Self::InvalidOptions { operation, .. }
            | Self::Store { operation, .. } => *operation,
        }
    }

    /// True for failures a later retry may get past: connection problems
    /// and deadlines. Configuration and data-integrity errors are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Client { source, .. } => source.is_transient(),
            Self::ProvisioningTimeout { .. } => true,
            _ => false,
        }
    }
}
