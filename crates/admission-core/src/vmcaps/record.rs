//! Typed view of a SKU's capability pairs.

use std::collections::BTreeSet;

use admission_state::ResourceSku;
use serde::{Deserialize, Serialize};

use crate::error::{AdmissionError, Result};

pub const CAPABILITY_MEMORY: &str = "MemoryGB";
pub const CAPABILITY_CPUS: &str = "vCPUs";
pub const CAPABILITY_PREMIUM_IO: &str = "PremiumIO";
pub const CAPABILITY_ACCELERATED_NETWORKING: &str = "AcceleratedNetworkingEnabled";

/// Value the inventory reports for a supported boolean capability.
pub const CAPABILITY_SUPPORTED: &str = "True";

/// Fully parsed capabilities of one instance type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityRecord {
    pub instance_type: String,
    #[serde(rename = "memoryGB")]
    pub memory_gb: u64,
    #[serde(rename = "vCPUs")]
    pub vcpus: u64,
    pub supports_premium_storage: bool,
    pub supports_accelerated_networking: bool,
    pub availability_zones: BTreeSet<String>,
}

impl CapabilityRecord {
    /// Parse every capability the record exposes.
    pub fn from_sku(sku: &ResourceSku) -> Result<Self> {
        Ok(Self {
            instance_type: sku.name.clone(),
            memory_gb: numeric_capability(sku, CAPABILITY_MEMORY)?,
            vcpus: numeric_capability(sku, CAPABILITY_CPUS)?,
            supports_premium_storage: capability_supported(sku, CAPABILITY_PREMIUM_IO),
            supports_accelerated_networking: capability_supported(
                sku,
                CAPABILITY_ACCELERATED_NETWORKING,
            ),
            availability_zones: sku.zones.clone(),
        })
    }
}

/// Parse a required integer capability.
///
/// Absent and non-numeric values are both upstream contract breaks.
pub(crate) fn numeric_capability(sku: &ResourceSku, name: &str) -> Result<u64> {
    let raw = sku.capability(name);
    raw.and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| AdmissionError::UpstreamInvalidResponse {
            instance_type: sku.name.clone(),
            capability: name.to_string(),
            value: raw.map(str::to_string),
        })
}

pub(crate) fn capability_supported(sku: &ResourceSku, name: &str) -> bool {
    sku.capability(name)
        .is_some_and(|v| v.eq_ignore_ascii_case(CAPABILITY_SUPPORTED))
}
