//! HTTP client against a fake vRO REST endpoint served by axum.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use serde_json::{Value, json};

use vro_driver::workflow::{
    ClientError, ExecutionState, ParameterMap, ParameterValue, VroClient, WorkflowClient,
    WorkflowTemplate,
};
use vro_driver::{Allocation, Driver, DriverConfig, InMemoryReferenceStore, MachineOptions};

const AUTHORIZATION: &str = "Basic c3ZjLXByb3Zpc2lvbjpzM2NyZXQ=";

#[derive(Default)]
struct FakeVro {
    bodies: Mutex<Vec<(String, Value)>>,
    state: Mutex<String>,
}

type Shared = Arc<FakeVro>;

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == AUTHORIZATION)
}

async fn start_execution(
    State(fake): State<Shared>,
    Path(workflow_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if workflow_id == "missing" {
        return StatusCode::NOT_FOUND.into_response();
    }
    if workflow_id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "workflow engine down").into_response();
    }

    fake.bodies.lock().push((workflow_id.clone(), body));
    let location = format!("/vco/api/workflows/{workflow_id}/executions/exec-42/");
    (StatusCode::ACCEPTED, [(header::LOCATION, location)]).into_response()
}

async fn execution_status(
    State(fake): State<Shared>,
    Path((_workflow_id, execution_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if execution_id == "gone" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let state = fake.state.lock().clone();
    Json(json!({
        "id": execution_id,
        "name": "Request VM",
        "state": state,
        "output-parameters": [
            {
                "name": "provisionedVmNames",
                "type": "Array/string",
                "value": { "array": { "elements": [ { "string": { "value": "n1" } } ] } }
            },
            {
                "name": "provisionedVmUuids",
                "type": "Array/string",
                "value": { "array": { "elements": [ { "string": { "value": "u1" } } ] } }
            },
            {
                "name": "cleanPowerOff",
                "type": "boolean",
                "value": { "boolean": { "value": true } }
            },
            { "name": "unset", "type": "string" }
        ]
    }))
    .into_response()
}

async fn serve() -> (SocketAddr, Shared) {
    let fake = Arc::new(FakeVro {
        state: Mutex::new("completed".to_string()),
        ..FakeVro::default()
    });
    let app = Router::new()
        .route("/vco/api/workflows/{id}/executions", post(start_execution))
        .route(
            "/vco/api/workflows/{id}/executions/{execution}",
            get(execution_status),
        )
        .with_state(Arc::clone(&fake));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, fake)
}

fn config(addr: SocketAddr, password: &str) -> DriverConfig {
    let mut config = DriverConfig {
        url: format!("http://{addr}"),
        username: "svc-provision".to_string(),
        password: password.to_string(),
        tenant: "acme".to_string(),
        business_unit: "web".to_string(),
        wait_interval_secs: 1,
        max_wait_secs: 5,
        request_timeout_secs: 5,
        ..DriverConfig::default()
    };
    for (tag, id) in [
        ("allocate_machine", "wf-allocate"),
        ("start_machine", "wf-start"),
        ("stop_machine", "wf-stop"),
        ("destroy_machine", "wf-destroy"),
        ("get_machine_info", "wf-info"),
    ] {
        config
            .workflows
            .insert(tag.to_string(), WorkflowTemplate::new(tag, id));
    }
    config
}

#[tokio::test]
async fn test_submit_encodes_typed_parameters() {
    let (addr, fake) = serve().await;
    let client = VroClient::new(&config(addr, "s3cret")).unwrap();

    let mut parameters = ParameterMap::new();
    parameters.insert("nodename".to_string(), ParameterValue::from("web01"));
    parameters.insert("coreCount".to_string(), ParameterValue::from(2u32));
    parameters.insert("sudo".to_string(), ParameterValue::from(true));

    let handle = client
        .submit(&WorkflowTemplate::new("Request VM", "wf-allocate"), &parameters)
        .await
        .unwrap();

    assert_eq!(handle.execution_id, "exec-42");
    assert_eq!(handle.workflow_id, "wf-allocate");
    assert_eq!(handle.state, ExecutionState::Pending);

    let bodies = fake.bodies.lock();
    let (workflow_id, body) = &bodies[0];
    assert_eq!(workflow_id, "wf-allocate");

    let params = body["parameters"].as_array().unwrap();
    let find = |name: &str| params.iter().find(|p| p["name"] == name).unwrap().clone();
    assert_eq!(
        find("nodename"),
        json!({ "name": "nodename", "type": "string", "scope": "local",
                "value": { "string": { "value": "web01" } } })
    );
    assert_eq!(find("coreCount")["type"], "number");
    assert_eq!(find("coreCount")["value"]["number"]["value"], 2.0);
    assert_eq!(find("sudo")["value"]["boolean"]["value"], true);
}

#[tokio::test]
async fn test_query_decodes_execution_document() {
    let (addr, _) = serve().await;
    let client = VroClient::new(&config(addr, "s3cret")).unwrap();

    let handle = client.query("wf-allocate", "exec-42").await.unwrap();

    assert_eq!(handle.state, ExecutionState::Completed);
    assert_eq!(handle.execution_id, "exec-42");
    assert_eq!(handle.output_parameters.strings("provisionedVmNames"), vec!["n1"]);
    assert_eq!(handle.output_parameters.strings("provisionedVmUuids"), vec!["u1"]);
    assert_eq!(handle.output_parameters.boolean("cleanPowerOff"), Some(true));
    assert_eq!(handle.output_parameters.get("unset"), Some(&ParameterValue::Null));
}

#[tokio::test]
async fn test_http_errors_are_classified() {
    let (addr, _) = serve().await;
    let client = VroClient::new(&config(addr, "s3cret")).unwrap();
    let none = ParameterMap::new();

    let missing = client
        .submit(&WorkflowTemplate::new("Nope", "missing"), &none)
        .await;
    assert!(matches!(missing, Err(ClientError::TemplateNotFound(_))));

    let gone = client.query("wf-allocate", "gone").await;
    assert!(matches!(gone, Err(ClientError::ExecutionNotFound(_))));

    let broken = client
        .submit(&WorkflowTemplate::new("Broken", "broken"), &none)
        .await;
    assert!(matches!(broken, Err(ClientError::Remote { status: 500, ref body }) if body.contains("engine down")));

    let intruder = VroClient::new(&config(addr, "wrong")).unwrap();
    let denied = intruder.query("wf-allocate", "exec-42").await;
    assert!(matches!(denied, Err(ClientError::Authentication(_))));
}

#[tokio::test]
async fn test_unreachable_orchestrator_is_transient() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = VroClient::new(&config(addr, "s3cret")).unwrap();
    let err = client.query("wf-allocate", "exec-42").await.unwrap_err();

    assert!(matches!(err, ClientError::Connection(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_driver_over_http() {
    let (addr, fake) = serve().await;
    let store = Arc::new(InMemoryReferenceStore::new());
    let driver = Driver::connect(Arc::new(config(addr, "s3cret")), store).unwrap();
    let options = MachineOptions::default();

    let first = driver.allocate("web01", &options).await.unwrap();
    let Allocation::Submitted { execution } = first else {
        panic!("expected submission, got {first:?}");
    };
    assert_eq!(execution.execution_id, "exec-42");

    *fake.state.lock() = "running".to_string();
    let second = driver.allocate("web01", &options).await.unwrap();
    assert_eq!(second, Allocation::InProgress { execution });
    assert_eq!(fake.bodies.lock().len(), 1);
}
