//! Trait contract tests for ObjectStore and CapabilitySource.
//!
//! These tests verify the behavioral contracts of the collaborator traits
//! using the in-memory fakes and the filesystem store. Any conforming
//! implementation must pass these.

use std::time::Duration;

use admission_state::fakes::{MemoryObjectStore, StubCapabilitySource};
use admission_state::storage_traits::*;
use admission_state::{FsObjectStore, StorageError};

// ===========================================================================
// ObjectStore contract tests
// ===========================================================================

async fn assert_object_store_contract(store: &dyn ObjectStore) {
    let names: Vec<String> = store
        .list(RELEASE_KIND)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["v11.3.0", "v11.4.0"]);

    let record = store.get(RELEASE_KIND, "v11.4.0").await.unwrap();
    assert_eq!(record.map(|r| r.name), Some("v11.4.0".to_string()));

    assert!(store.get(RELEASE_KIND, "v99.0.0").await.unwrap().is_none());
    assert!(store.list("Cluster").await.unwrap().is_empty());
}

#[tokio::test]
async fn memory_store_satisfies_contract() {
    let store = MemoryObjectStore::with_releases(["v11.4.0", "v11.3.0"]);
    assert_object_store_contract(&store).await;
}

#[tokio::test]
async fn fs_store_satisfies_contract() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path());
    store
        .put(&Record::new(RELEASE_KIND, "v11.4.0"))
        .await
        .unwrap();
    store
        .put(&Record::new(RELEASE_KIND, "v11.3.0"))
        .await
        .unwrap();
    assert_object_store_contract(&store).await;
}

#[tokio::test]
async fn memory_store_injected_failure_is_unavailable() {
    let store = MemoryObjectStore::with_releases(["v11.3.0"]);
    store.fail_with("etcd timeout");

    let err = store.list(RELEASE_KIND).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(ref m) if m == "etcd timeout"));
    assert_eq!(store.list_calls(), 1);
}

#[tokio::test]
async fn memory_store_insert_replaces_by_name() {
    let store = MemoryObjectStore::new();
    store.insert(Record::new(RELEASE_KIND, "v1.0.0"));
    store.insert(Record::new(RELEASE_KIND, "v1.0.0").with_label("a", "b"));

    let all = store.list(RELEASE_KIND).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].labels.get("a"), Some(&"b".to_string()));
}

// ===========================================================================
// CapabilitySource contract tests
// ===========================================================================

#[tokio::test]
async fn stub_source_serves_stubbed_region() {
    let source = StubCapabilitySource::new().with_region(
        "westeurope",
        vec![ResourceSku::new("Standard_D4s_v3").with_capability("vCPUs", "4")],
    );

    let skus = source
        .list_capabilities("westeurope", &region_filter("westeurope"))
        .await
        .unwrap();
    assert_eq!(skus.len(), 1);
    assert_eq!(skus[0].capability("vCPUs"), Some("4"));
}

#[tokio::test]
async fn stub_source_unknown_region_is_empty() {
    let source = StubCapabilitySource::new();
    let skus = source
        .list_capabilities("nowhere", &region_filter("nowhere"))
        .await
        .unwrap();
    assert!(skus.is_empty());
}

#[tokio::test]
async fn stub_source_counts_calls_per_region() {
    let source = StubCapabilitySource::new();
    for region in ["a", "b", "a"] {
        source
            .list_capabilities(region, &region_filter(region))
            .await
            .unwrap();
    }
    assert_eq!(source.calls(), 3);
    assert_eq!(source.calls_for("a"), 2);
    assert_eq!(source.calls_for("b"), 1);
    assert_eq!(source.calls_for("c"), 0);
}

#[tokio::test]
async fn stub_source_failure_and_recovery() {
    let source = StubCapabilitySource::new().with_region("a", vec![ResourceSku::new("x")]);
    source.fail_with("throttled");
    assert!(matches!(
        source.list_capabilities("a", "").await,
        Err(StorageError::Unavailable(_))
    ));

    source.recover();
    assert_eq!(source.list_capabilities("a", "").await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stub_source_latency_is_applied() {
    let source = StubCapabilitySource::new().with_latency(Duration::from_secs(5));
    let started = tokio::time::Instant::now();
    source.list_capabilities("a", "").await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
}
