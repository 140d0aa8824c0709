//! vRealize Orchestrator REST client.
//!
//! Talks to `<url>/vco/api/` with HTTP basic authentication on every request.
//! No session is pinned between calls, so a long poll survives credential
//! or session expiry on the orchestrator side.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use super::client::{ClientError, WorkflowClient};
use super::execution::{
    ExecutionHandle, ExecutionState, OutputParameters, ParameterMap, ParameterValue,
};
use super::template::WorkflowTemplate;
use crate::config::DriverConfig;

/// Parameter as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireParameter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ExecutionRequest {
    parameters: Vec<WireParameter>,
}

/// Execution document returned by `GET workflows/{id}/executions/{execution}`.
#[derive(Debug, Deserialize)]
struct ExecutionDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(rename = "output-parameters", default)]
    output_parameters: Vec<WireParameter>,
}

/// HTTP implementation of [`WorkflowClient`] for vRO.
pub struct VroClient {
    http: reqwest::Client,
    api_base: Url,
    username: String,
    password: String,
}

impl VroClient {
    /// Build a client from driver configuration.
    pub fn new(config: &DriverConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {e}")))?;

        let mut base = Url::parse(config.url.trim_end_matches('/'))
            .map_err(|e| ClientError::Protocol(format!("invalid orchestrator url '{}': {e}", config.url)))?;
        let path = format!("{}/vco/api/", base.path().trim_end_matches('/'));
        base.set_path(&path);

        if !config.verify_ssl {
            tracing::warn!(url = %config.url, "TLS certificate verification is disabled");
        }

        Ok(Self {
            http,
            api_base: base,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.api_base
            .join(path)
            .map_err(|e| ClientError::Protocol(format!("cannot build url for '{path}': {e}")))
    }

    fn executions_url(&self, workflow_id: &str) -> Result<Url, ClientError> {
        self.endpoint(&format!("workflows/{workflow_id}/executions"))
    }

    fn execution_url(&self, workflow_id: &str, execution_id: &str) -> Result<Url, ClientError> {
        self.endpoint(&format!("workflows/{workflow_id}/executions/{execution_id}"))
    }
}

#[async_trait]
impl WorkflowClient for VroClient {
    async fn submit(
        &self,
        template: &WorkflowTemplate,
        parameters: &ParameterMap,
    ) -> Result<ExecutionHandle, ClientError> {
        let url = self.executions_url(&template.id)?;
        let body = ExecutionRequest {
            parameters: parameters
                .iter()
                .map(|(name, value)| encode_parameter(name, value))
                .collect(),
        };

        tracing::debug!(
            workflow = %template.name,
            workflow_id = %template.id,
            parameters = parameters.len(),
            "Submitting workflow"
        );

        let response = self
            .http
            .post(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::TemplateNotFound(format!(
                "{} ({})",
                template.name, template.id
            )));
        }
        if !status.is_success() {
            return Err(status_error(status, response.text().await.unwrap_or_default()));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ClientError::Protocol(format!("submission to {url} returned no Location header"))
            })?;
        let execution_id = execution_id_from_location(location).ok_or_else(|| {
            ClientError::Protocol(format!("cannot parse execution id from Location '{location}'"))
        })?;

        tracing::info!(
            workflow = %template.name,
            workflow_id = %template.id,
            execution_id = %execution_id,
            "Workflow execution started"
        );

        Ok(ExecutionHandle::pending(
            template.id.clone(),
            execution_id,
            template.name.clone(),
        ))
    }

    async fn query(
        &self,
        workflow_id: &str,
        execution_id: &str,
    ) -> Result<ExecutionHandle, ClientError> {
        let url = self.execution_url(workflow_id, execution_id)?;

        let response = self
            .http
            .get(url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::ExecutionNotFound(format!("{workflow_id}/{execution_id}")));
        }
        if !status.is_success() {
            return Err(status_error(status, response.text().await.unwrap_or_default()));
        }

        let document: ExecutionDocument = response
            .json()
            .await
            .map_err(|e| ClientError::Protocol(format!("invalid execution document from {url}: {e}")))?;

        Ok(ExecutionHandle {
            workflow_id: workflow_id.to_string(),
            execution_id: document.id.unwrap_or_else(|| execution_id.to_string()),
            name: document.name.unwrap_or_default(),
            state: ExecutionState::from_vro(&document.state),
            output_parameters: decode_outputs(&document.output_parameters),
        })
    }
}

impl std::fmt::Debug for VroClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VroClient")
            .field("api_base", &self.api_base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn transport_error(url: &Url, error: &reqwest::Error) -> ClientError {
    ClientError::Connection(format!("{url}: {error}"))
}

fn status_error(status: StatusCode, body: String) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ClientError::Authentication(format!("HTTP {}", status.as_u16()))
        }
        _ => ClientError::Remote {
            status: status.as_u16(),
            body,
        },
    }
}

/// Extract the execution id from a `Location` header value.
///
/// vRO answers `.../workflows/{id}/executions/{execution}/`; the id is the
/// last non-empty path segment.
fn execution_id_from_location(location: &str) -> Option<String> {
    let path = Url::parse(location)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| location.to_string());
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .filter(|segment| *segment != "executions")
        .map(str::to_string)
}

fn wire_type(value: &ParameterValue) -> String {
    match value {
        ParameterValue::Null | ParameterValue::String(_) => "string".to_string(),
        ParameterValue::Boolean(_) => "boolean".to_string(),
        ParameterValue::Number(_) => "number".to_string(),
        ParameterValue::Array(items) => {
            let element = items.first().map_or_else(|| "string".to_string(), wire_type);
            format!("Array/{element}")
        }
    }
}

fn encode_value(value: &ParameterValue) -> Value {
    match value {
        ParameterValue::Null => json!({ "string": { "value": "" } }),
        ParameterValue::String(s) => json!({ "string": { "value": s } }),
        ParameterValue::Boolean(b) => json!({ "boolean": { "value": b } }),
        ParameterValue::Number(n) => json!({ "number": { "value": n } }),
        ParameterValue::Array(items) => {
            json!({ "array": { "elements": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
    }
}

fn encode_parameter(name: &str, value: &ParameterValue) -> WireParameter {
    WireParameter {
        name: name.to_string(),
        kind: wire_type(value),
        scope: Some("local".to_string()),
        value: Some(encode_value(value)),
    }
}

fn decode_outputs(parameters: &[WireParameter]) -> OutputParameters {
    parameters
        .iter()
        .map(|p| {
            let value = p.value.as_ref().map_or(ParameterValue::Null, decode_value);
            (p.name.clone(), value)
        })
        .collect()
}

fn decode_value(value: &Value) -> ParameterValue {
    let Some(object) = value.as_object() else {
        return ParameterValue::Null;
    };
    let Some((kind, inner)) = object.iter().next() else {
        return ParameterValue::Null;
    };

    match kind.as_str() {
        "string" | "date" | "secure-string" => inner
            .get("value")
            .and_then(Value::as_str)
            .map_or(ParameterValue::Null, |s| ParameterValue::String(s.to_string())),
        "number" => inner
            .get("value")
            .and_then(Value::as_f64)
            .map_or(ParameterValue::Null, ParameterValue::Number),
        "boolean" => inner
            .get("value")
            .and_then(Value::as_bool)
            .map_or(ParameterValue::Null, ParameterValue::Boolean),
        "array" => ParameterValue::Array(
            inner
                .get("elements")
                .and_then(Value::as_array)
                .map(|elements| elements.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        _ => ParameterValue::Null,
    }
}
