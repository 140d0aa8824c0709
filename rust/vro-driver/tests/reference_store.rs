//! JSON file reference store against a real directory.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use vro_driver::workflow::ExecutionRef;
use vro_driver::{JsonFileReferenceStore, MachineReference, ReferenceStore, StoreError, VmIdentity};

const DRIVER_URL: &str = "vro:https://vro.acme.local:8281/acme/web";

fn sample() -> MachineReference {
    let mut reference = MachineReference::new(DRIVER_URL);
    reference.record_execution(&ExecutionRef {
        workflow_name: "Request VM".to_string(),
        workflow_id: "wf-allocate".to_string(),
        execution_id: "exec-1".to_string(),
    });
    reference.allocated_at = Some(Utc.with_ymd_and_hms(2026, 3, 4, 10, 30, 0).unwrap());
    reference.ssh_username = Some("deploy".to_string());
    reference.sudo = true;
    reference
}

#[tokio::test]
async fn test_write_then_read_preserves_reference() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileReferenceStore::new(dir.path());
    let reference = sample();

    store.write("web01", &reference).await.unwrap();
    let read = store.read("web01").await.unwrap().unwrap();

    assert_eq!(read, reference);
}

#[tokio::test]
async fn test_file_is_flat_string_map() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileReferenceStore::new(dir.path());
    store.write("web01", &sample()).await.unwrap();

    let text = std::fs::read_to_string(dir.path().join("web01.json")).unwrap();
    let map: BTreeMap<String, String> = serde_json::from_str(&text).unwrap();

    assert_eq!(map.get("driver_url").map(String::as_str), Some(DRIVER_URL));
    assert_eq!(map.get("execution_id").map(String::as_str), Some("exec-1"));
    assert_eq!(map.get("sudo").map(String::as_str), Some("true"));
    assert!(!map.contains_key("vm_uuid"));
}

#[tokio::test]
async fn test_missing_and_empty_records_read_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileReferenceStore::new(dir.path().join("not-yet-created"));
    assert!(store.read("web01").await.unwrap().is_none());

    let store = JsonFileReferenceStore::new(dir.path());
    std::fs::write(dir.path().join("web02.json"), "{}").unwrap();
    assert!(store.read("web02").await.unwrap().is_none());
}

#[tokio::test]
async fn test_corrupt_records_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileReferenceStore::new(dir.path());

    std::fs::write(dir.path().join("garbled.json"), "{ not json").unwrap();
    assert!(matches!(
        store.read("garbled").await,
        Err(StoreError::Serialization(_))
    ));

    std::fs::write(dir.path().join("orphan.json"), r#"{"vm_uuid":"u1"}"#).unwrap();
    assert!(matches!(store.read("orphan").await, Err(StoreError::Corrupt(_))));
}

#[tokio::test]
async fn test_overwrite_leaves_no_temporary_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileReferenceStore::new(dir.path());
    let mut reference = sample();
    store.write("web01", &reference).await.unwrap();

    reference.set_vm_identity(VmIdentity {
        name: "n1".to_string(),
        uuid: "u1".to_string(),
    });
    store.write("web01", &reference).await.unwrap();

    let read = store.read("web01").await.unwrap().unwrap();
    assert_eq!(read.vm_uuid.as_deref(), Some("u1"));

    let entries: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["web01.json".to_string()]);
}

#[tokio::test]
async fn test_machines_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileReferenceStore::new(dir.path());
    store.write("web01", &sample()).await.unwrap();

    let other = MachineReference::new(DRIVER_URL);
    store.write("web02", &other).await.unwrap();

    assert_eq!(store.read("web01").await.unwrap().unwrap(), sample());
    assert_eq!(store.read("web02").await.unwrap().unwrap(), other);
}

#[tokio::test]
async fn test_path_like_machine_names_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileReferenceStore::new(dir.path());

    let err = store.write("../escape", &sample()).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
    assert!(!dir.path().parent().unwrap().join("escape.json").exists());
}
