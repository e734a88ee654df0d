//! Admission-State: Collaborator Boundary for the Admission Gate
//!
//! This crate owns every I/O edge the decision engines consume. It provides
//! the object store used to read platform releases and the VM SKU inventory
//! used to answer capability questions.
//!
//! ## Layer 0 - Data/Collaborators
//!
//! Focus: faithful transport of records and SKUs, never policy.
//!
//! ## Key Components
//!
//! - `ObjectStore` / `FsObjectStore`: control-plane records (Release, ...)
//! - `CapabilitySource` / `HttpCapabilitySource`: per-region SKU listings
//! - `fakes`: in-memory implementations with call counting for tests

mod error;
pub mod fakes;
mod fs;
pub mod inventory;
pub mod storage_traits;

pub use error::StorageError;
pub use fs::FsObjectStore;
pub use inventory::{HttpCapabilitySource, InventoryConfig};
pub use storage_traits::{
    region_filter, CapabilitySource, ObjectStore, Record, ResourceSku, SkuCapability,
    StorageResult, RELEASE_KIND,
};
