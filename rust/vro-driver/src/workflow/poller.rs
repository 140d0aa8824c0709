//! Execution poller: waits for a workflow execution to leave the alive states.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::client::{ClientError, WorkflowClient};
use super::execution::ExecutionHandle;

/// Repeatedly queries an execution until it terminates or a deadline passes.
///
/// The poller never raises on timeout. It returns the last observed handle,
/// which is still alive in that case; deciding whether that is fatal is the
/// caller's business.
#[derive(Clone)]
pub struct ExecutionPoller {
    client: Arc<dyn WorkflowClient>,
    max_wait: Duration,
    poll_interval: Duration,
}

impl ExecutionPoller {
    #[must_use]
    pub fn new(client: Arc<dyn WorkflowClient>, max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            client,
            max_wait,
            poll_interval,
        }
    }

    /// Upper bound on how long a single wait may take.
    #[must_use]
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Delay between two status queries.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Wait until `handle` is no longer alive or `max_wait` has elapsed.
    ///
    /// Returns within `max_wait + poll_interval`. The last sleep is cut short
    /// at the deadline, and a status query still outstanding one interval
    /// past it is abandoned like a connection failure.
    ///
    /// Connection failures while querying are logged and polling continues;
    /// any other query error aborts the wait.
    pub async fn wait_for(&self, handle: ExecutionHandle) -> Result<ExecutionHandle, ClientError> {
        let started = Instant::now();
        let deadline = started + self.max_wait;
        let query_deadline = deadline + self.poll_interval;
        let mut handle = handle;
        let mut polls = 0u32;

        while handle.is_alive() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
            polls += 1;

            let query = self.client.query(&handle.workflow_id, &handle.execution_id);
            match tokio::time::timeout_at(query_deadline, query).await {
                Ok(Ok(next)) => {
                    if next.state != handle.state {
                        tracing::debug!(
                            workflow_id = %next.workflow_id,
                            execution_id = %next.execution_id,
                            from = %handle.state,
                            to = %next.state,
                            "Execution state changed"
                        );
                    }
                    handle = next;
                }
                Ok(Err(ClientError::Connection(error))) => {
                    tracing::warn!(
                        workflow_id = %handle.workflow_id,
                        execution_id = %handle.execution_id,
                        error = %error,
                        "Status query failed, will retry"
                    );
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    tracing::warn!(
                        workflow_id = %handle.workflow_id,
                        execution_id = %handle.execution_id,
                        "Status query still outstanding past the wait deadline"
                    );
                    break;
                }
            }
        }

        if handle.is_alive() {
            tracing::warn!(
                workflow_id = %handle.workflow_id,
                execution_id = %handle.execution_id,
                state = %handle.state,
                polls,
                waited_ms = started.elapsed().as_millis(),
                "Gave up waiting for execution"
            );
        } else {
            tracing::debug!(
                workflow_id = %handle.workflow_id,
                execution_id = %handle.execution_id,
                state = %handle.state,
                polls,
                "Execution reached terminal state"
            );
        }

        Ok(handle)
    }
}

impl std::fmt::Debug for ExecutionPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPoller")
            .field("max_wait", &self.max_wait)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::execution::{ExecutionState, OutputParameters, ParameterMap};
    use crate::workflow::memory::{ExecutionScript, InMemoryOrchestrator};
    use crate::workflow::template::WorkflowTemplate;

    async fn submit(orchestrator: &Arc<InMemoryOrchestrator>, script: ExecutionScript) -> ExecutionHandle {
        let template = WorkflowTemplate::new("Request VM", "wf-alloc");
        orchestrator.script("wf-alloc", script);
        orchestrator.submit(&template, &ParameterMap::new()).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_terminal_handle() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let handle = submit(
            &orchestrator,
            ExecutionScript::running_for(2).then_completes(OutputParameters::new()),
        )
        .await;

        let poller = ExecutionPoller::new(
            Arc::<InMemoryOrchestrator>::clone(&orchestrator),
            Duration::from_secs(600),
            Duration::from_secs(15),
        );
        let done = poller.wait_for(handle).await.unwrap();

        assert_eq!(done.state, ExecutionState::Completed);
        assert_eq!(orchestrator.query_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_alive_handle_within_bound() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let handle = submit(&orchestrator, ExecutionScript::runs_forever()).await;

        let max_wait = Duration::from_secs(60);
        let interval = Duration::from_secs(15);
        let poller = ExecutionPoller::new(Arc::<InMemoryOrchestrator>::clone(&orchestrator), max_wait, interval);

        let started = Instant::now();
        let last = poller.wait_for(handle).await.unwrap();

        assert!(last.is_alive());
        assert!(started.elapsed() <= max_wait + interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_errors_are_retried() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let handle = submit(&orchestrator, ExecutionScript::completes_with(OutputParameters::new())).await;
        orchestrator.fail_next_queries(2, ClientError::Connection("reset by peer".to_string()));

        let poller = ExecutionPoller::new(
            Arc::<InMemoryOrchestrator>::clone(&orchestrator),
            Duration::from_secs(600),
            Duration::from_secs(1),
        );
        let done = poller.wait_for(handle).await.unwrap();
        assert_eq!(done.state, ExecutionState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_authentication_error_aborts_wait() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let handle = submit(&orchestrator, ExecutionScript::runs_forever()).await;
        orchestrator.fail_next_queries(1, ClientError::Authentication("expired".to_string()));

        let poller = ExecutionPoller::new(
            Arc::<InMemoryOrchestrator>::clone(&orchestrator),
            Duration::from_secs(600),
            Duration::from_secs(1),
        );
        let result = poller.wait_for(handle).await;
        assert!(matches!(result, Err(ClientError::Authentication(_))));
    }

    /// Answers every status query with `running` after `delay`.
    struct StalledOrchestrator {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl WorkflowClient for StalledOrchestrator {
        async fn submit(
            &self,
            template: &WorkflowTemplate,
            _parameters: &ParameterMap,
        ) -> Result<ExecutionHandle, ClientError> {
            Ok(ExecutionHandle::pending(&template.id, "exec-stalled", &template.name))
        }

        async fn query(
            &self,
            workflow_id: &str,
            execution_id: &str,
        ) -> Result<ExecutionHandle, ClientError> {
            tokio::time::sleep(self.delay).await;
            let mut handle = ExecutionHandle::pending(workflow_id, execution_id, "Request VM");
            handle.state = ExecutionState::Running;
            Ok(handle)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_status_query_cannot_outlast_bound() {
        let client = Arc::new(StalledOrchestrator {
            delay: Duration::from_secs(60),
        });
        let handle = client
            .submit(&WorkflowTemplate::new("Request VM", "wf-alloc"), &ParameterMap::new())
            .await
            .unwrap();

        let max_wait = Duration::from_secs(30);
        let interval = Duration::from_secs(15);
        let poller = ExecutionPoller::new(client, max_wait, interval);

        let started = Instant::now();
        let last = poller.wait_for(handle).await.unwrap();

        assert!(last.is_alive());
        assert!(started.elapsed() <= max_wait + interval);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_sleep_is_cut_at_deadline() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let handle = submit(&orchestrator, ExecutionScript::runs_forever()).await;

        let poller = ExecutionPoller::new(
            Arc::<InMemoryOrchestrator>::clone(&orchestrator),
            Duration::from_secs(40),
            Duration::from_secs(15),
        );
        let started = Instant::now();
        let last = poller.wait_for(handle).await.unwrap();

        assert!(last.is_alive());
        assert_eq!(started.elapsed(), Duration::from_secs(40));
        assert_eq!(orchestrator.query_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_handle_is_not_queried() {
        let orchestrator = Arc::new(InMemoryOrchestrator::new());
        let mut handle = submit(&orchestrator, ExecutionScript::runs_forever()).await;
        handle.state = ExecutionState::Failed;

        let poller = ExecutionPoller::new(
            Arc::<InMemoryOrchestrator>::clone(&orchestrator),
            Duration::from_secs(600),
            Duration::from_secs(15),
        );
        let last = poller.wait_for(handle).await.unwrap();
        assert!(last.is_failed());
        assert_eq!(orchestrator.query_count(), 0);
    }
}
