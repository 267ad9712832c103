//! Stress Test - concurrent path creation
//!
//! Run with: cargo test --package sfc-provider --test stress_test

use sfc_provider::prelude::*;
use sfc_test_utils::{build_chain_of, setup_test_provider};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

const PATHS: u32 = 200;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_creations_get_distinct_ids() {
    let (_, provider) = setup_test_provider();
    let provider = Arc::new(provider);
    provider
        .put_chain(build_chain_of("C1", &["SF1", "SF2"], false))
        .await
        .unwrap();

    let start = Instant::now();
    let tasks: Vec<_> = (0..PATHS)
        .map(|i| {
            let provider = provider.clone();
            tokio::spawn(async move {
                provider
                    .create_path_from_chain("C1", &format!("P{i}"))
                    .await
            })
        })
        .collect();

    let mut ids = BTreeSet::new();
    for task in tasks {
        let created = task.await.unwrap().unwrap();
        assert!(ids.insert(created.forward.path_id.unwrap()), "duplicate path id");
    }
    println!("  {PATHS} paths created in {:.2?}", start.elapsed());

    // Serialized lowest-free allocation leaves no gaps
    assert_eq!(ids, (1..=PATHS).collect::<BTreeSet<_>>());
    assert_eq!(provider.read_all_paths().await.unwrap().len(), PATHS as usize);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_symmetric_creations_keep_pairs_whole() {
    let (_, provider) = setup_test_provider();
    let provider = Arc::new(provider);
    provider
        .put_chain(build_chain_of("C1", &["SF1"], true))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..50)
        .map(|i| {
            let provider = provider.clone();
            tokio::spawn(async move {
                provider
                    .create_path_from_chain("C1", &format!("P{i}"))
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().unwrap().reverse.is_some());
    }

    let paths = provider.read_all_paths().await.unwrap();
    assert_eq!(paths.len(), 100);
    let ids: BTreeSet<_> = paths.iter().filter_map(|p| p.path_id).collect();
    assert_eq!(ids.len(), 100);

    // Removing the function empties the table
    provider
        .delete_service_path_containing_function(&ServiceFunction::new("SF1"))
        .await
        .unwrap();
    assert!(provider.read_all_paths().await.unwrap().is_empty());
}
