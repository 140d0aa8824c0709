//! Workflow layer: templates, executions and the orchestrator clients.
//!
//! - [`client`]: the [`WorkflowClient`] contract and its error type
//! - [`vro`]: HTTP client for the vRO REST API
//! - [`memory`]: scripted in-memory orchestrator for tests and dry runs
//! - [`poller`]: bounded waiting for executions to finish

pub mod client;
pub mod execution;
pub mod memory;
pub mod poller;
pub mod template;
pub mod vro;

pub use client::{ClientError, WorkflowClient};
pub use execution::{
    ExecutionHandle, ExecutionRef, ExecutionState, OutputParameters, ParameterMap, ParameterValue,
};
pub use memory::{ExecutionScript, ExecutionStep, InMemoryOrchestrator, Submission};
pub use poller::ExecutionPoller;
pub use template::{TemplateTag, WorkflowCatalog, WorkflowTemplate};
pub use vro::VroClient;
