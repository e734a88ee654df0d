//! Admission-Core: Decision Engines for the Admission Gate
//!
//! Three engines answer the questions an admission handler asks before a
//! cluster resource change is persisted:
//!
//! - `upgrade`: may a cluster move from one platform release to another?
//! - `vmcaps`: what does a VM instance type offer in a region?
//! - `patch`: which JSON Patch operations turn one object into another?
//!
//! `policy` layers the node-pool and metadata rules on top of them. All I/O
//! goes through the `admission-state` collaborator traits and is bounded by
//! a [`CallContext`].

pub mod catalog;
pub mod context;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod patch;
pub mod policy;
pub mod telemetry;
pub mod upgrade;
pub mod version;
pub mod vmcaps;

pub use catalog::{ComponentVersions, ReleaseCatalog, ReleaseCatalogEntry, IGNORE_ANNOTATION};
pub use context::CallContext;
pub use error::{AdmissionError, ErrorKind, Result};
pub use metrics::METRICS;
pub use obs::RequestSpan;
pub use patch::{
    diff, diff_from_raw, diff_values, filter_by_path_prefix, into_json_patch, PatchOperation,
};
pub use policy::{DataDisk, NodePoolSpec};
pub use telemetry::init_tracing;
pub use upgrade::{validate, ReleaseUpgradeValidator, UpgradeDecision, UpgradeReason};
pub use version::{SemanticVersion, VersionError};
pub use vmcaps::{CapabilityRecord, VmCapabilities};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
