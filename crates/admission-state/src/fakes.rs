//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `MemoryObjectStore` and `StubCapabilitySource` that satisfy the
//! trait contracts without any external dependencies. Both count calls and
//! can inject latency or failures so engine behaviour around I/O is
//! observable from tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

/// In-memory object store backed by `kind -> name -> Record`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    records: Mutex<BTreeMap<String, BTreeMap<String, Record>>>,
    failure: Mutex<Option<String>>,
    latency: Option<Duration>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that seeds one `Release` record per name.
    pub fn with_releases<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for name in names {
            store.insert(Record::new(RELEASE_KIND, name));
        }
        store
    }

    /// Delay every call by `latency` (builder pattern).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert or replace a record.
    pub fn insert(&self, record: Record) {
        let mut records = self.records.lock().unwrap();
        records
            .entry(record.kind.clone())
            .or_default()
            .insert(record.name.clone(), record);
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    /// Number of `list` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `get` calls served so far.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    async fn before_call(&self) -> StorageResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.failure.lock().unwrap().as_ref() {
            Some(message) => Err(StorageError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, kind: &str) -> StorageResult<Vec<Record>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        let records = self.records.lock().unwrap();
        Ok(records
            .get(kind)
            .map(|by_name| by_name.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, kind: &str, name: &str) -> StorageResult<Option<Record>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.before_call().await?;
        let records = self.records.lock().unwrap();
        Ok(records.get(kind).and_then(|by_name| by_name.get(name)).cloned())
    }
}

// ---------------------------------------------------------------------------
// StubCapabilitySource
// ---------------------------------------------------------------------------

/// Capability source serving canned SKUs per region.
///
/// Regions that were never stubbed answer with an empty list, like an
/// inventory that has no SKUs there.
#[derive(Debug, Default)]
pub struct StubCapabilitySource {
    regions: HashMap<String, Vec<ResourceSku>>,
    failure: Mutex<Option<String>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
    calls_by_region: Mutex<HashMap<String, usize>>,
}

impl StubCapabilitySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `skus` for `region` (builder pattern).
    pub fn with_region(mut self, region: impl Into<String>, skus: Vec<ResourceSku>) -> Self {
        self.regions.insert(region.into(), skus);
        self
    }

    /// Delay every fetch by `latency` (builder pattern).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent fetch fail with `StorageError::Unavailable`.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(message.into());
    }

    /// Clear an injected failure.
    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Total fetches started, failed or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fetches started for one region.
    pub fn calls_for(&self, region: &str) -> usize {
        self.calls_by_region
            .lock()
            .unwrap()
            .get(region)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CapabilitySource for StubCapabilitySource {
    async fn list_capabilities(
        &self,
        region: &str,
        _filter: &str,
    ) -> StorageResult<Vec<ResourceSku>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_region
            .lock()
            .unwrap()
            .entry(region.to_string())
            .or_insert(0) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.failure.lock().unwrap().as_ref() {
            return Err(StorageError::Unavailable(message.clone()));
        }
        Ok(self.regions.get(region).cloned().unwrap_or_default())
    }
}
