//! Collaborator trait definitions for the admission gate
//!
//! These traits define the two I/O boundaries the decision engines consume:
//! - `ObjectStore`: read access to control-plane records (releases, clusters)
//! - `CapabilitySource`: the VM SKU inventory for a region
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ObjectStore - Control-Plane Records
// ---------------------------------------------------------------------------

/// Record kind holding platform releases.
pub const RELEASE_KIND: &str = "Release";

/// A control-plane record as the object store hands it out.
///
/// Only metadata and the raw `spec` are modelled; consumers decode the parts
/// of `spec` they care about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Record kind (e.g. "Release")
    pub kind: String,
    /// Record name, unique per kind
    pub name: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Kind-specific payload
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl Record {
    /// Create a record with empty metadata and a null spec.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            spec: serde_json::Value::Null,
        }
    }

    /// Set an annotation (builder pattern).
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set a label (builder pattern).
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Replace the spec (builder pattern).
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = spec;
        self
    }
}

/// Read-only view of the control-plane datastore.
///
/// Guarantees:
/// - `list(kind)` returns every record of that kind in a stable order.
/// - `get(kind, name)` returns `Ok(None)` for a missing record; errors are
///   reserved for backend failures.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all records of a kind.
    async fn list(&self, kind: &str) -> StorageResult<Vec<Record>>;

    /// Fetch a single record by kind and name.
    async fn get(&self, kind: &str, name: &str) -> StorageResult<Option<Record>>;
}

// ---------------------------------------------------------------------------
// CapabilitySource - VM SKU Inventory
// ---------------------------------------------------------------------------

/// A single name/value capability pair exactly as the inventory reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuCapability {
    pub name: String,
    pub value: String,
}

/// A VM SKU (instance type) with its raw capability list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSku {
    /// Instance type name, e.g. "Standard_D4s_v3"
    pub name: String,
    /// Availability zones offering this SKU in the queried region
    #[serde(default)]
    pub zones: BTreeSet<String>,
    /// Heterogeneous capability pairs
    #[serde(default)]
    pub capabilities: Vec<SkuCapability>,
}

impl ResourceSku {
    /// Create a SKU with no zones and no capabilities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zones: BTreeSet::new(),
            capabilities: Vec::new(),
        }
    }

    /// Append a capability pair (builder pattern).
    pub fn with_capability(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.capabilities.push(SkuCapability {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add an availability zone (builder pattern).
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zones.insert(zone.into());
        self
    }

    /// Value of the first capability whose name matches exactly.
    pub fn capability(&self, name: &str) -> Option<&str> {
        self.capabilities
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }
}

/// Build the inventory filter expression selecting one region.
pub fn region_filter(region: &str) -> String {
    format!("location eq '{}'", region)
}

/// Inventory of VM SKUs per region.
///
/// Pagination is the implementor's concern: callers always receive the
/// fully materialised list for the region.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// List every SKU matching `filter` in `region`.
    async fn list_capabilities(&self, region: &str, filter: &str)
        -> StorageResult<Vec<ResourceSku>>;
}
