//! In-memory orchestrator for tests and dry runs.
//!
//! Executions follow a script of states chosen up front; every successful
//! status query advances the script by one step and the last step repeats
//! forever. All submissions and queries are recorded so callers can assert
//! on what reached the "remote" side.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::client::{ClientError, WorkflowClient};
use super::execution::{ExecutionHandle, ExecutionState, OutputParameters, ParameterMap};
use super::template::WorkflowTemplate;

/// One observable step of a scripted execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStep {
    pub state: ExecutionState,
    pub outputs: OutputParameters,
}

/// Sequence of states an execution walks through as it is queried.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionScript {
    steps: Vec<ExecutionStep>,
}

impl ExecutionScript {
    /// Completes on the first status query.
    #[must_use]
    pub fn completes_with(outputs: OutputParameters) -> Self {
        Self {
            steps: vec![ExecutionStep {
                state: ExecutionState::Completed,
                outputs,
            }],
        }
    }

    /// Fails on the first status query.
    #[must_use]
    pub fn fails() -> Self {
        Self {
            steps: vec![ExecutionStep {
                state: ExecutionState::Failed,
                outputs: OutputParameters::new(),
            }],
        }
    }

    /// Never leaves the running state.
    #[must_use]
    pub fn runs_forever() -> Self {
        Self::running_for(1)
    }

    /// Reports `running` for the first `polls` queries.
    ///
    /// Chain with [`Self::then_completes`] or [`Self::then_fails`]; on its own
    /// the execution stays running.
    #[must_use]
    pub fn running_for(polls: usize) -> Self {
        Self {
            steps: vec![
                ExecutionStep {
                    state: ExecutionState::Running,
                    outputs: OutputParameters::new(),
                };
                polls.max(1)
            ],
        }
    }

    /// Append a successful completion.
    #[must_use]
    pub fn then_completes(mut self, outputs: OutputParameters) -> Self {
        self.steps.push(ExecutionStep {
            state: ExecutionState::Completed,
            outputs,
        });
        self
    }

    /// Append a failure.
    #[must_use]
    pub fn then_fails(mut self) -> Self {
        self.steps.push(ExecutionStep {
            state: ExecutionState::Failed,
            outputs: OutputParameters::new(),
        });
        self
    }
}

/// A workflow submission as the orchestrator received it.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub workflow_name: String,
    pub workflow_id: String,
    pub execution_id: String,
    pub parameters: ParameterMap,
}

#[derive(Debug)]
struct ScriptedExecution {
    name: String,
    script: ExecutionScript,
    cursor: usize,
}

#[derive(Debug, Default)]
struct OrchestratorState {
    known_workflows: HashSet<String>,
    queued_scripts: HashMap<String, VecDeque<ExecutionScript>>,
    standing_scripts: HashMap<String, ExecutionScript>,
    executions: HashMap<(String, String), ScriptedExecution>,
    submissions: Vec<Submission>,
    submit_errors: VecDeque<ClientError>,
    query_errors: VecDeque<ClientError>,
    query_count: usize,
    next_execution: u64,
}

/// In-memory, scripted implementation of [`WorkflowClient`].
#[derive(Debug, Default)]
pub struct InMemoryOrchestrator {
    state: Mutex<OrchestratorState>,
}

impl InMemoryOrchestrator {
    /// Create an orchestrator that accepts any workflow id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict submissions to registered workflows.
    ///
    /// Once at least one workflow is registered, submitting an unregistered
    /// workflow id fails with `TemplateNotFound`.
    pub fn register(&self, template: &WorkflowTemplate) {
        self.state.lock().known_workflows.insert(template.id.clone());
    }

    /// Script the next submission of `workflow_id`.
    pub fn script(&self, workflow_id: &str, script: ExecutionScript) {
        self.state
            .lock()
            .queued_scripts
            .entry(workflow_id.to_string())
            .or_default()
            .push_back(script);
    }

    /// Script every submission of `workflow_id` that has no queued script.
    pub fn script_always(&self, workflow_id: &str, script: ExecutionScript) {
        self.state
            .lock()
            .standing_scripts
            .insert(workflow_id.to_string(), script);
    }

    /// Make the next submission fail with `error`.
    pub fn fail_next_submit(&self, error: ClientError) {
        self.state.lock().submit_errors.push_back(error);
    }

    /// Make the next `count` status queries fail with `error`.
    pub fn fail_next_queries(&self, count: usize, error: ClientError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.query_errors.push_back(error.clone());
        }
    }

    /// Forget an execution, as if the orchestrator had purged it.
    pub fn purge(&self, workflow_id: &str, execution_id: &str) {
        self.state
            .lock()
            .executions
            .remove(&(workflow_id.to_string(), execution_id.to_string()));
    }

    /// Every submission received so far.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    /// Submissions of one workflow id.
    #[must_use]
    pub fn submissions_of(&self, workflow_id: &str) -> Vec<Submission> {
        self.state
            .lock()
            .submissions
            .iter()
            .filter(|s| s.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    /// Number of status queries received, failed ones included.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.state.lock().query_count
    }

    /// Total remote calls (submissions plus queries).
    #[must_use]
    pub fn remote_calls(&self) -> usize {
        let state = self.state.lock();
        state.submissions.len() + state.query_count
    }
}

#[async_trait]
impl WorkflowClient for InMemoryOrchestrator {
    async fn submit(
        &self,
        template: &WorkflowTemplate,
        parameters: &ParameterMap,
    ) -> Result<ExecutionHandle, ClientError> {
        let mut state = self.state.lock();

        if let Some(error) = state.submit_errors.pop_front() {
            return Err(error);
        }
        if !state.known_workflows.is_empty() && !state.known_workflows.contains(&template.id) {
            return Err(ClientError::TemplateNotFound(format!(
                "{} ({})",
                template.name, template.id
            )));
        }

        state.next_execution += 1;
        let execution_id = format!("exec-{:04}-{}", state.next_execution, uuid::Uuid::new_v4().simple());

        let queued = state
            .queued_scripts
            .get_mut(&template.id)
            .and_then(VecDeque::pop_front);
        let script = queued
            .or_else(|| state.standing_scripts.get(&template.id).cloned())
            .unwrap_or_else(|| ExecutionScript::completes_with(OutputParameters::new()));

        state.executions.insert(
            (template.id.clone(), execution_id.clone()),
            ScriptedExecution {
                name: template.name.clone(),
                script,
                cursor: 0,
            },
        );
        state.submissions.push(Submission {
            workflow_name: template.name.clone(),
            workflow_id: template.id.clone(),
            execution_id: execution_id.clone(),
            parameters: parameters.clone(),
        });

        Ok(ExecutionHandle::pending(&template.id, execution_id, &template.name))
    }

    async fn query(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> Result<ExecutionHandle, ClientError> {
        let mut state = self.state.lock();
        state.query_count += 1;

        if let Some(error) = state.query_errors.pop_front() {
            return Err(error);
        }

        let execution = state
            .executions
            .get_mut(&(workflow_id.to_string(), execution_id.to_string()))
            .ok_or_else(|| ClientError::ExecutionNotFound(format!("{workflow_id}/{execution_id}")))?;

        let last = execution.script.steps.len() - 1;
        let step = execution.script.steps[execution.cursor.min(last)].clone();
        execution.cursor += 1;

        Ok(ExecutionHandle {
            workflow_id: workflow_id.to_string(),
            execution_id: execution_id.to_string(),
            name: execution.name.clone(),
            state: step.state,
            output_parameters: step.outputs,
        })
    }
}
