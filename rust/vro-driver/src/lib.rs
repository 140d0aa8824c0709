//! vRO Driver - machine lifecycle over vRealize Orchestrator workflows
//!
//! Translates lifecycle verbs (allocate, ready, start, stop, destroy and
//! get-instance-info) into asynchronous workflow executions on a vRealize
//! Orchestrator, tracks in-flight executions in a durable per-machine
//! reference, and hands back a connectable machine handle once the VM is
//! live.
//!
//! # Architecture
//!
//! - [`workflow`]: templates, executions, the [`workflow::WorkflowClient`]
//!   contract, the vRO HTTP client and the execution poller
//! - [`reference`]: the persisted [`MachineReference`] and its stores
//! - [`driver`]: the lifecycle dispatcher, [`Driver`]
//! - [`machine`]: machine handle assembly (transport + convergence)
//! - [`config`]: configuration loading and validation
//! - [`instance`], [`options`], [`error`], [`logging`]: supporting types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vro_driver::{Driver, DriverConfig, JsonFileReferenceStore, MachineOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(DriverConfig::load(None)?);
//!     let store = Arc::new(JsonFileReferenceStore::new("/var/lib/vro-driver"));
//!     let driver = Driver::connect(config, store)?;
//!
//!     let options = MachineOptions::default();
//!     driver.allocate("web01", &options).await?;
//!     let handle = driver.ready("web01", &options).await?;
//!     println!("{handle:?}");
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions, reason = "types are re-exported at the crate root")]

pub mod config;
pub mod driver;
pub mod error;
pub mod instance;
pub mod logging;
pub mod machine;
pub mod options;
pub mod reference;
pub mod workflow;

pub use config::{ConfigValidator, ConfigurationError, DriverConfig};
pub use driver::{Allocation, Driver, Operation, OperationOutcome};
pub use error::DriverError;
pub use instance::{GuestState, Instance, PowerState};
pub use machine::{ConvergenceStrategy, MachineHandle, Transport};
pub use options::MachineOptions;
pub use reference::{
    InMemoryReferenceStore, JsonFileReferenceStore, MachineReference, ReferenceStore, StoreError,
    VmIdentity,
};
