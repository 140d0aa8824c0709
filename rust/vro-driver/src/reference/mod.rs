//! Persisted machine references.
//!
//! A [`MachineReference`] is the durable record this driver keeps per
//! machine: which driver created it, the most recent workflow execution and,
//! once provisioning succeeded, the identity of the resulting VM. Backends
//! implement [`ReferenceStore`] to persist it between calls and across
//! process restarts.

mod file;

pub use file::JsonFileReferenceStore;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::ExecutionRef;

/// Errors raised by reference store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend I/O failed.
    #[error("reference store I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A persisted record could not be interpreted.
    #[error("corrupt reference record: {0}")]
    Corrupt(String),

    /// A record could not be encoded or decoded.
    #[error("reference serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Identity of a provisioned VM. Name and uuid only ever exist together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmIdentity {
    pub name: String,
    pub uuid: String,
}

/// Durable per-machine record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineReference {
    /// Driver, tenant and business unit that created this record.
    pub driver_url: String,
    pub workflow_name: Option<String>,
    pub workflow_id: Option<String>,
    pub execution_id: Option<String>,
    pub vm_name: Option<String>,
    pub vm_uuid: Option<String>,
    /// When the first allocation was submitted.
    pub allocated_at: Option<DateTime<Utc>>,
    pub is_windows: bool,
    pub ssh_username: Option<String>,
    pub sudo: bool,
    pub ssh_gateway: Option<String>,
}

impl MachineReference {
    /// Empty record owned by `driver_url`.
    #[must_use]
    pub fn new(driver_url: impl Into<String>) -> Self {
        Self {
            driver_url: driver_url.into(),
            workflow_name: None,
            workflow_id: None,
            execution_id: None,
            vm_name: None,
            vm_uuid: None,
            allocated_at: None,
            is_windows: false,
            ssh_username: None,
            sudo: false,
            ssh_gateway: None,
        }
    }

    /// VM identity, present only when both name and uuid are set.
    #[must_use]
    pub fn vm_identity(&self) -> Option<VmIdentity> {
        match (&self.vm_name, &self.vm_uuid) {
            (Some(name), Some(uuid)) => Some(VmIdentity {
                name: name.clone(),
                uuid: uuid.clone(),
            }),
            _ => None,
        }
    }

    /// True once provisioning has produced a VM.
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.vm_uuid.is_some()
    }

    /// The most recently recorded execution, if any.
    #[must_use]
    pub fn execution(&self) -> Option<ExecutionRef> {
        match (&self.workflow_id, &self.execution_id) {
            (Some(workflow_id), Some(execution_id)) => Some(ExecutionRef {
                workflow_name: self.workflow_name.clone().unwrap_or_default(),
                workflow_id: workflow_id.clone(),
                execution_id: execution_id.clone(),
            }),
            _ => None,
        }
    }

    /// Replace the recorded execution triple.
    pub fn record_execution(&mut self, execution: &ExecutionRef) {
        self.workflow_name = Some(execution.workflow_name.clone());
        self.workflow_id = Some(execution.workflow_id.clone());
        self.execution_id = Some(execution.execution_id.clone());
    }

    /// Forget the recorded execution.
    pub fn clear_execution(&mut self) {
        self.workflow_name = None;
        self.workflow_id = None;
        self.execution_id = None;
    }

    /// Record the VM produced by a successful allocation.
    pub fn set_vm_identity(&mut self, identity: VmIdentity) {
        self.vm_name = Some(identity.name);
        self.vm_uuid = Some(identity.uuid);
    }

    /// Check the paired-field invariants.
    ///
    /// `vm_name`/`vm_uuid` and `workflow_id`/`execution_id` are each set
    /// together or not at all.
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.vm_name.is_some() != self.vm_uuid.is_some() {
            return Err(format!(
                "vm_name and vm_uuid must be set together (vm_name={:?}, vm_uuid={:?})",
                self.vm_name, self.vm_uuid
            ));
        }
        if self.workflow_id.is_some() != self.execution_id.is_some() {
            return Err(format!(
                "workflow_id and execution_id must be set together (workflow_id={:?}, execution_id={:?})",
                self.workflow_id, self.execution_id
            ));
        }
        Ok(())
    }

    /// Flatten into the string-keyed layout the host persists.
    ///
    /// Absent optional fields are omitted rather than written empty.
    #[must_use]
    pub fn to_flat_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("driver_url".to_string(), self.driver_url.clone());

        let optional = [
            ("workflow_name", &self.workflow_name),
            ("workflow_id", &self.workflow_id),
            ("execution_id", &self.execution_id),
            ("vm_name", &self.vm_name),
            ("vm_uuid", &self.vm_uuid),
            ("ssh_username", &self.ssh_username),
            ("ssh_gateway", &self.ssh_gateway),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.to_string(), value.clone());
            }
        }

        if let Some(allocated_at) = self.allocated_at {
            map.insert("allocated_at".to_string(), allocated_at.to_rfc3339());
        }
        map.insert("is_windows".to_string(), self.is_windows.to_string());
        map.insert("sudo".to_string(), self.sudo.to_string());
        map
    }

    /// Rebuild a reference from its flat layout.
    ///
    /// Missing optional keys are tolerated. A missing `driver_url`, or a
    /// malformed boolean or timestamp, is reported as [`StoreError::Corrupt`].
    /// Paired-field invariants are not checked here; see
    /// [`Self::check_consistency`].
    pub fn from_flat_map(map: &BTreeMap<String, String>) -> Result<Self, StoreError> {
        let text = |key: &str| map.get(key).filter(|v| !v.is_empty()).cloned();

        let driver_url = text("driver_url")
            .ok_or_else(|| StoreError::Corrupt("missing driver_url".to_string()))?;

        let flag = |key: &str| -> Result<bool, StoreError> {
            match map.get(key).map(|v| v.trim()) {
                None | Some("") => Ok(false),
                Some(value) => value.parse().map_err(|e| {
                    StoreError::Corrupt(format!("{key} is not a boolean: '{value}' ({e})"))
                }),
            }
        };

        let allocated_at = match text("allocated_at") {
            Some(value) => Some(
                DateTime::parse_from_rfc3339(&value)
                    .map_err(|e| {
                        StoreError::Corrupt(format!("allocated_at is not a timestamp: '{value}' ({e})"))
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Self {
            driver_url,
            workflow_name: text("workflow_name"),
            workflow_id: text("workflow_id"),
            execution_id: text("execution_id"),
            vm_name: text("vm_name"),
            vm_uuid: text("vm_uuid"),
            allocated_at,
            is_windows: flag("is_windows")?,
            ssh_username: text("ssh_username"),
            sudo: flag("sudo")?,
            ssh_gateway: text("ssh_gateway"),
        })
    }
}

/// Durable storage for machine references, keyed by machine name.
///
/// Backends provide at-least-once persistence of whole records. Callers
/// always re-read before resuming an operation and never rely on multi-field
/// atomicity beyond a single `write`.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Load the record for `machine`, if one was ever written.
    async fn read(&self, machine: &str) -> Result<Option<MachineReference>, StoreError>;

    /// Persist the record for `machine`, replacing any previous one.
    async fn write(&self, machine: &str, reference: &MachineReference) -> Result<(), StoreError>;
}

/// In-memory reference store for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryReferenceStore {
    records: parking_lot::RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl InMemoryReferenceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw flat record, bypassing validation.
    pub fn insert_raw(&self, machine: &str, record: BTreeMap<String, String>) {
        self.records.write().insert(machine.to_string(), record);
    }

    /// Raw flat record for `machine`.
    #[must_use]
    pub fn raw(&self, machine: &str) -> Option<BTreeMap<String, String>> {
        self.records.read().get(machine).cloned()
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn read(&self, machine: &str) -> Result<Option<MachineReference>, StoreError> {
        let records = self.records.read();
        records
            .get(machine)
            .map(MachineReference::from_flat_map)
            .transpose()
    }

    async fn write(&self, machine: &str, reference: &MachineReference) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(machine.to_string(), reference.to_flat_map());
        Ok(())
    }
}

#[async_trait]
impl<T: ReferenceStore + ?Sized> ReferenceStore for std::sync::Arc<T> {
    async fn read(&self, machine: &str) -> Result<Option<MachineReference>, StoreError> {
        (**self).read(machine).await
    }

    async fn write(&self, machine: &str, reference: &MachineReference) -> Result<(), StoreError> {
        (**self).write(machine, reference).await
    }
}
