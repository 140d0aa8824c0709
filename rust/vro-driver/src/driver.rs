//! Lifecycle operation dispatcher.
//!
//! [`Driver`] maps allocate, ready, start, stop, destroy and
//! get-instance-info onto workflow executions. The persisted
//! [`MachineReference`] is consulted before every submission so that an
//! operation already in flight, or already done, is never submitted twice,
//! and so that a later process can resume where a crashed one stopped.
//!
//! Per-machine state progression:
//!
//! ```text
//! UNALLOCATED -> ALLOCATING -> ALLOCATED (no VM yet) -> PROVISIONED -> RUNNING <-> STOPPED -> DESTROYED
//! ```
//!
//! Operations on the same machine must be serialized by the caller; the
//! driver holds no per-machine locks.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigResult, ConfigValidator, ConfigurationError, DriverConfig};
use crate::error::DriverError;
use crate::instance::Instance;
use crate::logging::OpTimer;
use crate::machine::{MachineHandle, assemble};
use crate::options::MachineOptions;
use crate::reference::{MachineReference, ReferenceStore, VmIdentity};
use crate::workflow::{
    ClientError, ExecutionHandle, ExecutionPoller, ExecutionRef, ExecutionState, ParameterMap,
    ParameterValue, TemplateTag, VroClient, WorkflowCatalog, WorkflowClient, WorkflowTemplate,
};

/// Lifecycle operation names, as they appear in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Allocate,
    Ready,
    Start,
    Stop,
    Destroy,
    GetInstanceInfo,
    Show,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allocate => write!(f, "allocate"),
            Self::Ready => write!(f, "ready"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Destroy => write!(f, "destroy"),
            Self::GetInstanceInfo => write!(f, "get_instance_info"),
            Self::Show => write!(f, "show"),
        }
    }
}

/// Result of [`Driver::allocate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Allocation {
    /// A new allocate execution was submitted.
    Submitted { execution: ExecutionRef },
    /// A previous allocate execution is still in flight; nothing was submitted.
    InProgress { execution: ExecutionRef },
    /// The allocate execution finished; `ready` will record the VM.
    AwaitingReady { execution: ExecutionRef },
    /// The machine already has a VM. Allocation became an ensure-running start.
    Provisioned { vm: VmIdentity, start: OperationOutcome },
}

/// Result of start, stop and destroy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationOutcome {
    /// Nothing to do; no workflow was submitted.
    Skipped,
    /// Workflow submitted and not waited on, or still running at the deadline.
    Submitted { execution: ExecutionRef },
    /// Workflow submitted and completed.
    Completed { execution: ExecutionRef },
}

/// What to do when a synchronous wait hits the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeoutPolicy {
    Fail,
    Tolerate,
}

/// The machine lifecycle driver.
pub struct Driver {
    config: Arc<DriverConfig>,
    driver_url: String,
    catalog: WorkflowCatalog,
    client: Arc<dyn WorkflowClient>,
    store: Arc<dyn ReferenceStore>,
    poller: ExecutionPoller,
}

impl Driver {
    /// Build a driver over an existing workflow client and reference store.
    ///
    /// The configuration is validated here as well, so a driver is never
    /// built from timing or workflow settings that `load` would reject.
    pub fn new(
        config: Arc<DriverConfig>,
        client: Arc<dyn WorkflowClient>,
        store: Arc<dyn ReferenceStore>,
    ) -> ConfigResult<Self> {
        ConfigValidator::validate(&config)?;
        let catalog = config.catalog()?;
        let poller = ExecutionPoller::new(Arc::clone(&client), config.max_wait(), config.wait_interval());

        Ok(Self {
            driver_url: config.driver_url(),
            config,
            catalog,
            client,
            store,
            poller,
        })
    }

    /// Build a driver talking to the configured orchestrator over HTTP.
    pub fn connect(config: Arc<DriverConfig>, store: Arc<dyn ReferenceStore>) -> ConfigResult<Self> {
        let client = VroClient::new(&config).map_err(|e| {
            ConfigurationError::invalid(
                e.to_string(),
                "Check VRO__URL and the TLS settings of this host",
            )
        })?;
        tracing::info!(
            driver_url = %config.driver_url(),
            verify_ssl = config.verify_ssl,
            max_wait_secs = config.max_wait_secs,
            wait_interval_secs = config.wait_interval_secs,
            "Driver connected"
        );
        Self::new(config, Arc::new(client), store)
    }

    /// Identity stamped into every reference this driver creates.
    #[must_use]
    pub fn driver_url(&self) -> &str {
        &self.driver_url
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Submit the allocate workflow, unless one is in flight or a VM exists.
    ///
    /// Never blocks on the execution. A prior allocate execution that failed
    /// (or that the orchestrator no longer knows) is cleared and resubmitted.
    pub async fn allocate(
        &self,
        machine: &str,
        options: &MachineOptions,
    ) -> Result<Allocation, DriverError> {
        let timer = OpTimer::new(machine, Operation::Allocate);
        let result = self.allocate_inner(machine, options).await;
        timer.finish_with_result(&result);
        result
    }

    /// Wait for allocation, ensure the VM runs and return a connectable handle.
    pub async fn ready(
        &self,
        machine: &str,
        options: &MachineOptions,
    ) -> Result<MachineHandle, DriverError> {
        let timer = OpTimer::new(machine, Operation::Ready);
        let result = self.ready_inner(machine, options).await;
        timer.finish_with_result(&result);
        result
    }

    /// Power the VM on unless the guest is already running.
    pub async fn start(
        &self,
        machine: &str,
        options: &MachineOptions,
        wait: bool,
    ) -> Result<OperationOutcome, DriverError> {
        let timer = OpTimer::new(machine, Operation::Start);
        let result = self.start_inner(machine, options, wait).await;
        timer.finish_with_result(&result);
        result
    }

    /// Power the VM off unless it is absent or already powered off.
    pub async fn stop(
        &self,
        machine: &str,
        options: &MachineOptions,
        wait: bool,
    ) -> Result<OperationOutcome, DriverError> {
        let timer = OpTimer::new(machine, Operation::Stop);
        let result = self.stop_inner(machine, options, wait).await;
        timer.finish_with_result(&result);
        result
    }

    /// Destroy the VM unless it no longer exists.
    ///
    /// A machine whose allocation is recorded but has no VM identity yet is
    /// skipped with a warning, even if that allocation is still building. The
    /// VM it eventually produces is not destroyed; run `ready` first, or
    /// destroy again once the allocation has finished.
    ///
    /// The persisted VM identity is kept; removing the record is up to the host.
    pub async fn destroy(
        &self,
        machine: &str,
        options: &MachineOptions,
        wait: bool,
    ) -> Result<OperationOutcome, DriverError> {
        let timer = OpTimer::new(machine, Operation::Destroy);
        let result = self.destroy_inner(machine, options, wait).await;
        timer.finish_with_result(&result);
        result
    }

    /// Fresh snapshot of the VM, or `None` when there is no VM.
    ///
    /// Performs no remote call when the reference has no VM identity.
    pub async fn instance_info(&self, machine: &str) -> Result<Option<Instance>, DriverError> {
        let timer = OpTimer::new(machine, Operation::GetInstanceInfo);
        let options = MachineOptions::default();
        let result = match self.load(machine, Operation::GetInstanceInfo).await {
            Ok(Some(reference)) => {
                self.fetch_instance(machine, Operation::GetInstanceInfo, &reference, &options)
                    .await
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        timer.finish_with_result(&result);
        result
    }

    /// The persisted reference for `machine`, checked against this driver.
    pub async fn reference(&self, machine: &str) -> Result<Option<MachineReference>, DriverError> {
        self.load(machine, Operation::Show).await
    }

    async fn allocate_inner(
        &self,
        machine: &str,
        options: &MachineOptions,
    ) -> Result<Allocation, DriverError> {
        const OP: Operation = Operation::Allocate;
        check_options(machine, OP, options)?;

        let mut reference = self
            .load(machine, OP)
            .await?
            .unwrap_or_else(|| MachineReference::new(self.driver_url.clone()));

        if let Some(vm) = reference.vm_identity() {
            tracing::info!(
                machine = %machine,
                vm_name = %vm.name,
                vm_uuid = %vm.uuid,
                "Machine already provisioned, ensuring it is running"
            );
            let instance = self.fetch_instance(machine, OP, &reference, options).await?;
            let start = self
                .start_with(machine, OP, &mut reference, options, false, instance)
                .await?;
            return Ok(Allocation::Provisioned { vm, start });
        }

        if let Some(execution) = reference.execution() {
            match self
                .client
                .query(&execution.workflow_id, &execution.execution_id)
                .await
            {
                Ok(handle) if handle.is_alive() || handle.state == ExecutionState::Unknown => {
                    tracing::info!(
                        machine = %machine,
                        execution_id = %execution.execution_id,
                        state = %handle.state,
                        "Allocation already in progress, not resubmitting"
                    );
                    return Ok(Allocation::InProgress { execution });
                }
                Ok(handle) if handle.state == ExecutionState::Completed => {
                    tracing::info!(
                        machine = %machine,
                        execution_id = %execution.execution_id,
                        "Allocation completed, waiting for ready"
                    );
                    return Ok(Allocation::AwaitingReady { execution });
                }
                Ok(handle) => {
                    tracing::warn!(
                        machine = %machine,
                        execution_id = %execution.execution_id,
                        state = %handle.state,
                        "Previous allocation failed, resubmitting"
                    );
                    reference.clear_execution();
                }
                Err(ClientError::ExecutionNotFound(_)) => {
                    tracing::warn!(
                        machine = %machine,
                        execution_id = %execution.execution_id,
                        "Previous allocation unknown to the orchestrator, resubmitting"
                    );
                    reference.clear_execution();
                }
                Err(e) => return Err(client_error(machine, OP, e)),
            }
        }

        let template = self.template(machine, OP, TemplateTag::AllocateMachine, options)?;
        let parameters = self.allocate_parameters(machine, options);
        let handle = self.submit(machine, OP, &template, &parameters).await?;
        let execution = handle.reference();

        reference.record_execution(&execution);
        reference.allocated_at.get_or_insert_with(Utc::now);
        reference.is_windows = options.is_windows;
        reference.ssh_username.clone_from(&options.ssh_username);
        reference.sudo = options.sudo;
        reference.ssh_gateway.clone_from(&options.ssh_gateway);
        self.save(machine, OP, &reference).await?;

        tracing::info!(
            machine = %machine,
            workflow_id = %execution.workflow_id,
            execution_id = %execution.execution_id,
            "Allocation submitted"
        );
        Ok(Allocation::Submitted { execution })
    }

    async fn ready_inner(
        &self,
        machine: &str,
        options: &MachineOptions,
    ) -> Result<MachineHandle, DriverError> {
        const OP: Operation = Operation::Ready;
        check_options(machine, OP, options)?;

        let mut reference = self
            .load(machine, OP)
            .await?
            .ok_or_else(|| DriverError::NotAllocated {
                machine: machine.to_string(),
                operation: OP,
            })?;

        if reference.vm_identity().is_none() {
            let execution = reference.execution().ok_or_else(|| DriverError::NotAllocated {
                machine: machine.to_string(),
                operation: OP,
            })?;
            let vm = self.await_allocation(machine, &execution).await?;

            tracing::info!(
                machine = %machine,
                vm_name = %vm.name,
                vm_uuid = %vm.uuid,
                "Machine provisioned"
            );
            reference.set_vm_identity(vm);
            self.save(machine, OP, &reference).await?;
        }

        let mut instance = self.fetch_instance(machine, OP, &reference, options).await?;
        if !instance.as_ref().is_some_and(Instance::is_running) {
            self.start_with(machine, OP, &mut reference, options, true, instance)
                .await?;
            instance = self.fetch_instance(machine, OP, &reference, options).await?;
        }

        assemble(machine, Some(&reference), instance.as_ref(), options.cached_installer)
    }

    /// Block on the recorded allocate execution and extract the single VM it produced.
    async fn await_allocation(
        &self,
        machine: &str,
        execution: &ExecutionRef,
    ) -> Result<VmIdentity, DriverError> {
        const OP: Operation = Operation::Ready;

        let current = self
            .client
            .query(&execution.workflow_id, &execution.execution_id)
            .await
            .map_err(|e| client_error(machine, OP, e))?;
        let done = self.wait(machine, OP, current).await?;

        match done.state {
            ExecutionState::Completed => {}
            ExecutionState::Failed => {
                return Err(DriverError::ProvisioningFailed {
                    machine: machine.to_string(),
                    operation: OP,
                    workflow: execution.workflow_name.clone(),
                    execution_id: execution.execution_id.clone(),
                });
            }
            ExecutionState::Pending | ExecutionState::Running | ExecutionState::Unknown => {
                return Err(self.timeout(machine, OP, &done));
            }
        }

        let uuids = done.output_parameters.strings("provisionedVmUuids");
        let names = done.output_parameters.strings("provisionedVmNames");

        if uuids.len() > 1 || names.len() > 1 {
            return Err(DriverError::MultipleVmsProvisioned {
                machine: machine.to_string(),
                operation: OP,
                count: uuids.len().max(names.len()),
                names,
            });
        }

        match (names.into_iter().next(), uuids.into_iter().next()) {
            (Some(name), Some(uuid)) => Ok(VmIdentity { name, uuid }),
            (None, None) => Err(DriverError::ReferenceConsistency {
                machine: machine.to_string(),
                operation: OP,
                detail: format!(
                    "execution {} completed without reporting a provisioned VM",
                    execution.execution_id
                ),
            }),
            (name, uuid) => Err(DriverError::ReferenceConsistency {
                machine: machine.to_string(),
                operation: OP,
                detail: format!(
                    "execution {} reported VM names {name:?} but uuids {uuid:?}",
                    execution.execution_id
                ),
            }),
        }
    }

    async fn start_inner(
        &self,
        machine: &str,
        options: &MachineOptions,
        wait: bool,
    ) -> Result<OperationOutcome, DriverError> {
        const OP: Operation = Operation::Start;
        check_options(machine, OP, options)?;

        let Some(mut reference) = self.load(machine, OP).await? else {
            return Err(DriverError::InstanceNotReady {
                machine: machine.to_string(),
                operation: OP,
            });
        };
        let instance = self.fetch_instance(machine, OP, &reference, options).await?;
        self.start_with(machine, OP, &mut reference, options, wait, instance)
            .await
    }

    /// Start against an already fetched instance snapshot.
    async fn start_with(
        &self,
        machine: &str,
        operation: Operation,
        reference: &mut MachineReference,
        options: &MachineOptions,
        wait: bool,
        instance: Option<Instance>,
    ) -> Result<OperationOutcome, DriverError> {
        let (Some(instance), Some(vm)) = (instance, reference.vm_identity()) else {
            return Err(DriverError::InstanceNotReady {
                machine: machine.to_string(),
                operation,
            });
        };

        if instance.is_running() {
            tracing::debug!(machine = %machine, "Guest already running, start skipped");
            return Ok(OperationOutcome::Skipped);
        }

        self.run_vm_workflow(
            machine,
            operation,
            TemplateTag::StartMachine,
            reference,
            &vm,
            options,
            wait,
            TimeoutPolicy::Fail,
        )
        .await
    }

    async fn stop_inner(
        &self,
        machine: &str,
        options: &MachineOptions,
        wait: bool,
    ) -> Result<OperationOutcome, DriverError> {
        const OP: Operation = Operation::Stop;
        check_options(machine, OP, options)?;

        let Some(mut reference) = self.load(machine, OP).await? else {
            tracing::debug!(machine = %machine, "No reference, stop skipped");
            return Ok(OperationOutcome::Skipped);
        };
        let instance = self.fetch_instance(machine, OP, &reference, options).await?;

        let (Some(instance), Some(vm)) = (instance, reference.vm_identity()) else {
            tracing::info!(machine = %machine, "No instance, stop skipped");
            return Ok(OperationOutcome::Skipped);
        };
        if instance.is_powered_off() {
            tracing::debug!(machine = %machine, "Already powered off, stop skipped");
            return Ok(OperationOutcome::Skipped);
        }

        self.run_vm_workflow(
            machine,
            OP,
            TemplateTag::StopMachine,
            &mut reference,
            &vm,
            options,
            wait,
            TimeoutPolicy::Fail,
        )
        .await
    }

    async fn destroy_inner(
        &self,
        machine: &str,
        options: &MachineOptions,
        wait: bool,
    ) -> Result<OperationOutcome, DriverError> {
        const OP: Operation = Operation::Destroy;
        check_options(machine, OP, options)?;

        let Some(mut reference) = self.load(machine, OP).await? else {
            tracing::debug!(machine = %machine, "No reference, destroy skipped");
            return Ok(OperationOutcome::Skipped);
        };
        if reference.vm_identity().is_none() && reference.execution().is_some() {
            tracing::warn!(
                machine = %machine,
                "Machine has no VM yet but an allocation is recorded; it may still be building, destroy skipped"
            );
        }

        let instance = self.fetch_instance(machine, OP, &reference, options).await?;
        let (Some(_), Some(vm)) = (instance, reference.vm_identity()) else {
            tracing::info!(machine = %machine, "No instance, destroy skipped");
            return Ok(OperationOutcome::Skipped);
        };

        self.run_vm_workflow(
            machine,
            OP,
            TemplateTag::DestroyMachine,
            &mut reference,
            &vm,
            options,
            wait,
            TimeoutPolicy::Tolerate,
        )
        .await
    }

    /// Submit a start/stop/destroy workflow for `vm`, persist its identity
    /// and optionally wait for it.
    #[allow(clippy::too_many_arguments, reason = "internal dispatch helper")]
    async fn run_vm_workflow(
        &self,
        machine: &str,
        operation: Operation,
        tag: TemplateTag,
        reference: &mut MachineReference,
        vm: &VmIdentity,
        options: &MachineOptions,
        wait: bool,
        on_timeout: TimeoutPolicy,
    ) -> Result<OperationOutcome, DriverError> {
        let template = self.template(machine, operation, tag, options)?;
        let handle = self
            .submit(machine, operation, &template, &vm_parameters(vm))
            .await?;
        let execution = handle.reference();

        reference.record_execution(&execution);
        self.save(machine, operation, reference).await?;

        if !wait {
            return Ok(OperationOutcome::Submitted { execution });
        }

        let done = self.wait(machine, operation, handle).await?;
        match done.state {
            ExecutionState::Completed => Ok(OperationOutcome::Completed { execution }),
            ExecutionState::Failed => Err(DriverError::WorkflowFailed {
                machine: machine.to_string(),
                operation,
                workflow: template.name,
                execution_id: execution.execution_id,
            }),
            ExecutionState::Pending | ExecutionState::Running | ExecutionState::Unknown => {
                match on_timeout {
                    TimeoutPolicy::Fail => Err(self.timeout(machine, operation, &done)),
                    TimeoutPolicy::Tolerate => {
                        tracing::warn!(
                            machine = %machine,
                            operation = %operation,
                            execution_id = %execution.execution_id,
                            state = %done.state,
                            "Gave up waiting; the workflow keeps running on the orchestrator"
                        );
                        Ok(OperationOutcome::Submitted { execution })
                    }
                }
            }
        }
    }

    /// Run get-machine-info synchronously.
    ///
    /// No VM identity means no instance and no remote call. A failed info
    /// execution also means no instance: most often the VM is gone.
    async fn fetch_instance(
        &self,
        machine: &str,
        operation: Operation,
        reference: &MachineReference,
        options: &MachineOptions,
    ) -> Result<Option<Instance>, DriverError> {
        let Some(vm) = reference.vm_identity() else {
            tracing::debug!(machine = %machine, "No VM identity, no instance");
            return Ok(None);
        };

        let template = self.template(machine, operation, TemplateTag::GetMachineInfo, options)?;
        let handle = self
            .submit(machine, operation, &template, &vm_parameters(&vm))
            .await?;
        let done = self.wait(machine, operation, handle).await?;

        match done.state {
            ExecutionState::Completed => {
                let instance = Instance::from_outputs(&done.output_parameters);
                tracing::debug!(
                    machine = %machine,
                    power_state = %instance.power_state,
                    guest_state = %instance.guest_state,
                    "Instance fetched"
                );
                Ok(Some(instance))
            }
            ExecutionState::Failed => {
                tracing::info!(
                    machine = %machine,
                    execution_id = %done.execution_id,
                    "Instance lookup failed, treating as no instance"
                );
                Ok(None)
            }
            ExecutionState::Pending | ExecutionState::Running | ExecutionState::Unknown => {
                Err(self.timeout(machine, operation, &done))
            }
        }
    }

    fn allocate_parameters(&self, machine: &str, options: &MachineOptions) -> ParameterMap {
        let text = |value: &Option<String>| ParameterValue::from(value.clone().unwrap_or_default());
        let on_behalf_of = options
            .on_behalf_of
            .clone()
            .unwrap_or_else(|| self.config.username.clone());

        let mut parameters = ParameterMap::new();
        parameters.insert("nodename".to_string(), machine.into());
        parameters.insert("tenant".to_string(), self.config.tenant.as_str().into());
        parameters.insert("businessUnit".to_string(), self.config.business_unit.as_str().into());
        parameters.insert("reservationPolicy".to_string(), text(&options.reservation_policy));
        parameters.insert("environment".to_string(), text(&options.environment));
        parameters.insert("onBehalfOf".to_string(), on_behalf_of.into());
        parameters.insert("location".to_string(), text(&options.location));
        parameters.insert("component".to_string(), text(&options.component));
        parameters.insert("coreCount".to_string(), options.cpu.into());
        parameters.insert("ramMB".to_string(), options.ram.into());
        parameters.insert("image".to_string(), text(&options.image));
        parameters
    }

    /// Per-call override first, then the configured catalog.
    fn template(
        &self,
        machine: &str,
        operation: Operation,
        tag: TemplateTag,
        options: &MachineOptions,
    ) -> Result<WorkflowTemplate, DriverError> {
        match options.workflow_override(tag) {
            Some(template) => Ok(template.clone()),
            None => self
                .catalog
                .resolve(tag)
                .cloned()
                .map_err(|e| client_error(machine, operation, e)),
        }
    }

    async fn submit(
        &self,
        machine: &str,
        operation: Operation,
        template: &WorkflowTemplate,
        parameters: &ParameterMap,
    ) -> Result<ExecutionHandle, DriverError> {
        let handle = self
            .client
            .submit(template, parameters)
            .await
            .map_err(|e| client_error(machine, operation, e))?;
        tracing::debug!(
            machine = %machine,
            operation = %operation,
            workflow_id = %handle.workflow_id,
            execution_id = %handle.execution_id,
            "Workflow submitted"
        );
        Ok(handle)
    }

    async fn wait(
        &self,
        machine: &str,
        operation: Operation,
        handle: ExecutionHandle,
    ) -> Result<ExecutionHandle, DriverError> {
        self.poller
            .wait_for(handle)
            .await
            .map_err(|e| client_error(machine, operation, e))
    }

    fn timeout(&self, machine: &str, operation: Operation, handle: &ExecutionHandle) -> DriverError {
        DriverError::ProvisioningTimeout {
            machine: machine.to_string(),
            operation,
            execution_id: handle.execution_id.clone(),
            state: handle.state.to_string(),
            waited_secs: self.poller.max_wait().as_secs(),
        }
    }

    /// Read and check the reference: same driver, paired fields intact.
    async fn load(
        &self,
        machine: &str,
        operation: Operation,
    ) -> Result<Option<MachineReference>, DriverError> {
        let reference = self
            .store
            .read(machine)
            .await
            .map_err(|source| DriverError::Store {
                machine: machine.to_string(),
                operation,
                source,
            })?;

        let Some(reference) = reference else {
            return Ok(None);
        };

        if reference.driver_url != self.driver_url {
            return Err(DriverError::DriverMismatch {
                machine: machine.to_string(),
                operation,
                expected: self.driver_url.clone(),
                found: reference.driver_url,
            });
        }
        reference
            .check_consistency()
            .map_err(|detail| DriverError::ReferenceConsistency {
                machine: machine.to_string(),
                operation,
                detail,
            })?;

        Ok(Some(reference))
    }

    async fn save(
        &self,
        machine: &str,
        operation: Operation,
        reference: &MachineReference,
    ) -> Result<(), DriverError> {
        self.store
            .write(machine, reference)
            .await
            .map_err(|source| DriverError::Store {
                machine: machine.to_string(),
                operation,
                source,
            })
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("driver_url", &self.driver_url)
            .field("catalog", &self.catalog)
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

fn check_options(
    machine: &str,
    operation: Operation,
    options: &MachineOptions,
) -> Result<(), DriverError> {
    options
        .validate()
        .map_err(|detail| DriverError::InvalidOptions {
            machine: machine.to_string(),
            operation,
            detail,
        })
}

fn client_error(machine: &str, operation: Operation, source: ClientError) -> DriverError {
    DriverError::Client {
        machine: machine.to_string(),
        operation,
        source,
    }
}

fn vm_parameters(vm: &VmIdentity) -> ParameterMap {
    let mut parameters = ParameterMap::new();
    parameters.insert("vmName".to_string(), vm.name.as_str().into());
    parameters.insert("vmUuid".to_string(), vm.uuid.as_str().into());
    parameters
}
