//! Shared fixtures for driver integration tests.

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use std::collections::BTreeMap;
use std::sync::Arc;

use vro_driver::workflow::{
    ExecutionScript, InMemoryOrchestrator, OutputParameters, ParameterValue, WorkflowTemplate,
};
use vro_driver::{Driver, DriverConfig, InMemoryReferenceStore, MachineReference, ReferenceStore};

pub const ALLOCATE: &str = "wf-allocate";
pub const START: &str = "wf-start";
pub const STOP: &str = "wf-stop";
pub const DESTROY: &str = "wf-destroy";
pub const INFO: &str = "wf-info";

pub fn config() -> DriverConfig {
    let mut workflows = BTreeMap::new();
    for (tag, name, id) in [
        ("allocate_machine", "Request VM", ALLOCATE),
        ("start_machine", "Power On VM", START),
        ("stop_machine", "Power Off VM", STOP),
        ("destroy_machine", "Destroy VM", DESTROY),
        ("get_machine_info", "Get VM Info", INFO),
    ] {
        workflows.insert(tag.to_string(), WorkflowTemplate::new(name, id));
    }

    DriverConfig {
        url: "https://vro.acme.local:8281".to_string(),
        username: "svc-provision".to_string(),
        password: "s3cret".to_string(),
        tenant: "acme".to_string(),
        business_unit: "web".to_string(),
        workflows,
        ..DriverConfig::default()
    }
}

pub struct Harness {
    pub driver: Driver,
    pub orchestrator: Arc<InMemoryOrchestrator>,
    pub store: Arc<InMemoryReferenceStore>,
}

impl Harness {
    pub fn new() -> Self {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let store = Arc::new(InMemoryReferenceStore::new());
        let driver = Self::driver_over(Arc::clone(&orchestrator), Arc::clone(&store) as Arc<dyn ReferenceStore>);
        Self {
            driver,
            orchestrator,
            store,
        }
    }

    pub fn driver_over(
        orchestrator: Arc<InMemoryOrchestrator>,
        store: Arc<dyn ReferenceStore>,
    ) -> Driver {
        Driver::new(Arc::new(config()), orchestrator, store).expect("valid test config")
    }

    pub async fn reference(&self, machine: &str) -> Option<MachineReference> {
        self.store.read(machine).await.expect("readable reference")
    }

    /// Seed a reference for an already provisioned VM `n1`/`u1`.
    pub async fn seed_provisioned(&self, machine: &str) -> MachineReference {
        let mut reference = MachineReference::new(self.driver.driver_url());
        reference.vm_name = Some("n1".to_string());
        reference.vm_uuid = Some("u1".to_string());
        self.store.write(machine, &reference).await.expect("writable store");
        reference
    }

    /// Make every get-machine-info execution report the given guest and power state.
    pub fn instance_always(&self, guest_state: &str, power_state: &str) {
        self.orchestrator.script_always(
            INFO,
            ExecutionScript::completes_with(instance_outputs(guest_state, power_state)),
        );
    }

    /// Make every get-machine-info execution fail, as for a deleted VM.
    pub fn no_instance(&self) {
        self.orchestrator.script_always(INFO, ExecutionScript::fails());
    }
}

pub fn instance_outputs(guest_state: &str, power_state: &str) -> OutputParameters {
    OutputParameters::new()
        .with("hostName", "web01.acme.local")
        .with("ipAddress", "10.0.0.12")
        .with("vmHost", "esx-07")
        .with("guestState", guest_state)
        .with("powerState", power_state)
}

pub fn allocation_outputs(names: &[&str], uuids: &[&str]) -> OutputParameters {
    OutputParameters::new()
        .with("provisionedVmNames", ParameterValue::strings(names.iter().copied()))
        .with("provisionedVmUuids", ParameterValue::strings(uuids.iter().copied()))
}
