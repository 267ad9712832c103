//! MemoryDataStore Tests
//!
//! Transaction visibility and atomicity against the in-memory backend.
//!
use pretty_assertions::assert_eq;
use serde_json::json;
use sfc_datastore::{Address, DataStore, MemoryDataStore, Partition, ReadWriteTransaction};
use std::sync::Arc;

const PATHS: Address = Address::container("service-function-paths");
const STATE: Address = Address::container("service-functions-state");

#[tokio::test]
async fn test_commit_spans_partitions_atomically() {
    let store = Arc::new(MemoryDataStore::new());

    let mut tx = ReadWriteTransaction::new(store.clone());
    tx.put(Partition::Configuration, PATHS.child("SFP1"), json!({ "name": "SFP1" }))
        .unwrap();
    tx.put(
        Partition::Operational,
        STATE.child("SF1"),
        json!({ "name": "SF1", "sfp": ["SFP1"] }),
    )
    .unwrap();

    store.fail_next_commits(1);
    assert!(tx.commit().await.is_err());
    assert!(store
        .read(Partition::Configuration, &PATHS.child("SFP1"))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .read(Partition::Operational, &STATE.child("SF1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_container_read_is_key_ordered() {
    let store = Arc::new(MemoryDataStore::new());

    let mut tx = ReadWriteTransaction::new(store.clone());
    for name in ["c", "a", "b"] {
        tx.put(Partition::Configuration, PATHS.child(name), json!({ "name": name }))
            .unwrap();
    }
    tx.commit().await.unwrap();

    let all = store
        .read(Partition::Configuration, &PATHS)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(all, json!([{ "name": "a" }, { "name": "b" }, { "name": "c" }]));
}

#[tokio::test]
async fn test_typed_round_trip() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Record {
        name: String,
        hops: Vec<u8>,
    }

    let store = Arc::new(MemoryDataStore::new());
    let record = Record {
        name: "SFP1".to_string(),
        hops: vec![3, 2, 1],
    };

    let mut tx = ReadWriteTransaction::new(store.clone());
    tx.put_typed(Partition::Configuration, PATHS.child("SFP1"), &record)
        .unwrap();
    tx.commit().await.unwrap();

    let tx = ReadWriteTransaction::new(store);
    let read: Option<Record> = tx
        .read_typed(Partition::Configuration, &PATHS.child("SFP1"))
        .await
        .unwrap();
    assert_eq!(read, Some(record));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_commits_all_land() {
    let store = Arc::new(MemoryDataStore::new());

    let mut handles = Vec::new();
    for i in 0..64 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("SFP{i}");
            let mut tx = ReadWriteTransaction::new(store);
            tx.put(Partition::Configuration, PATHS.child(name.clone()), json!({ "name": name }))
                .unwrap();
            tx.commit().await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.entry_count(Partition::Configuration, "service-function-paths"), 64);
    assert_eq!(store.commit_count(), 64);
}
