//! Node-pool and metadata rules built on the engines.
//!
//! Each check returns `Ok(())` when the object passes and
//! [`AdmissionError::PolicyViolation`] when it does not. Engine errors
//! (unknown SKU, unreachable inventory) pass through unchanged.

use admission_state::{CapabilitySource, ObjectStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::ReleaseCatalog;
use crate::context::CallContext;
use crate::error::{AdmissionError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::patch::{escape_pointer_token, PatchOperation};
use crate::vmcaps::{VmCapabilities, CAPABILITY_ACCELERATED_NETWORKING, CAPABILITY_PREMIUM_IO};

pub const MIN_MEMORY_GB: u64 = 16;
pub const MIN_CPUS: u64 = 4;

pub const STORAGE_STANDARD_LRS: &str = "Standard_LRS";
pub const STORAGE_PREMIUM_LRS: &str = "Premium_LRS";

/// Label naming the release an object belongs to.
pub const RELEASE_VERSION_LABEL: &str = "release.giantswarm.io/version";

/// The node-pool fields the rules look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    pub location: String,
    pub vm_size: String,
    #[serde(default)]
    pub storage_account_type: String,
    #[serde(default)]
    pub accelerated_networking: Option<bool>,
    #[serde(default)]
    pub failure_domain: Option<String>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
}

/// A data disk attached to every node of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub name_suffix: String,
    #[serde(rename = "diskSizeGB")]
    pub disk_size_gb: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lun: Option<i32>,
}

impl DataDisk {
    pub fn new(name_suffix: impl Into<String>, disk_size_gb: i32, lun: i32) -> Self {
        Self {
            name_suffix: name_suffix.into(),
            disk_size_gb,
            lun: Some(lun),
        }
    }
}

/// The docker and kubelet disks every node pool carries.
pub fn desired_data_disks() -> Vec<DataDisk> {
    vec![
        DataDisk::new("docker", 100, 21),
        DataDisk::new("kubelet", 100, 22),
    ]
}

pub const STORAGE_ACCOUNT_TYPE_PATH: &str = "/spec/template/osDisk/managedDisk/storageAccountType";
pub const DATA_DISKS_PATH: &str = "/spec/template/dataDisks";
pub const LOCATION_PATH: &str = "/spec/location";

impl NodePoolSpec {
    /// Failure domain with `""` folded into `None`.
    pub fn effective_failure_domain(&self) -> Option<&str> {
        self.failure_domain.as_deref().filter(|d| !d.is_empty())
    }
}

fn violation(message: impl Into<String>) -> AdmissionError {
    AdmissionError::PolicyViolation(message.into())
}

/// Instance type must offer at least [`MIN_MEMORY_GB`] and [`MIN_CPUS`].
pub async fn check_instance_type<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    pool: &NodePoolSpec,
) -> Result<()> {
    let memory = vmcaps.memory(ctx, &pool.location, &pool.vm_size).await?;
    let cpus = vmcaps.cpus(ctx, &pool.location, &pool.vm_size).await?;
    if memory < MIN_MEMORY_GB {
        return Err(violation(format!(
            "memory has to be at least {} GB, {} offers {}",
            MIN_MEMORY_GB, pool.vm_size, memory
        )));
    }
    if cpus < MIN_CPUS {
        return Err(violation(format!(
            "number of cores has to be at least {}, {} offers {}",
            MIN_CPUS, pool.vm_size, cpus
        )));
    }
    Ok(())
}

/// Storage account type must be standard or premium LRS; premium needs
/// `PremiumIO` on the instance type.
pub async fn check_storage_account_type<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    pool: &NodePoolSpec,
) -> Result<()> {
    let selected = pool.storage_account_type.as_str();
    if selected != STORAGE_STANDARD_LRS && selected != STORAGE_PREMIUM_LRS {
        return Err(violation(format!(
            "storage account type {:?} is invalid, allowed values are {:?} and {:?}",
            selected, STORAGE_STANDARD_LRS, STORAGE_PREMIUM_LRS
        )));
    }
    if selected == STORAGE_PREMIUM_LRS {
        let supported = vmcaps
            .has_capability(ctx, &pool.location, &pool.vm_size, CAPABILITY_PREMIUM_IO)
            .await?;
        if !supported {
            return Err(violation(format!(
                "VM size {} does not support premium storage",
                pool.vm_size
            )));
        }
    }
    Ok(())
}

/// Enabling accelerated networking needs support from the instance type.
/// Disabled or auto-detect is always allowed.
pub async fn check_accelerated_networking<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    pool: &NodePoolSpec,
) -> Result<()> {
    if pool.accelerated_networking != Some(true) {
        return Ok(());
    }
    let supported = vmcaps
        .has_capability(
            ctx,
            &pool.location,
            &pool.vm_size,
            CAPABILITY_ACCELERATED_NETWORKING,
        )
        .await?;
    if !supported {
        return Err(violation(format!(
            "VM size {} does not support accelerated networking",
            pool.vm_size
        )));
    }
    Ok(())
}

pub fn check_accelerated_networking_unchanged(
    old: &NodePoolSpec,
    new: &NodePoolSpec,
) -> Result<()> {
    if old.accelerated_networking != new.accelerated_networking {
        return Err(violation("accelerated networking can't be changed"));
    }
    Ok(())
}

/// The failure domain, when set, must be a zone offering the instance type.
pub async fn check_failure_domain<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    pool: &NodePoolSpec,
) -> Result<()> {
    let Some(domain) = pool.effective_failure_domain() else {
        return Ok(());
    };
    let zones = vmcaps.zones(ctx, &pool.location, &pool.vm_size).await?;
    if !zones.iter().any(|z| z == domain) {
        return Err(violation(format!(
            "failure domain {} is not supported by VM size {} in {}, supported zones are {:?}",
            domain, pool.vm_size, pool.location, zones
        )));
    }
    Ok(())
}

pub fn check_failure_domain_unchanged(old: &NodePoolSpec, new: &NodePoolSpec) -> Result<()> {
    if old.effective_failure_domain() != new.effective_failure_domain() {
        return Err(violation("failure domain can't be changed"));
    }
    Ok(())
}

pub fn check_storage_account_type_unchanged(
    old: &NodePoolSpec,
    new: &NodePoolSpec,
) -> Result<()> {
    if old.storage_account_type != new.storage_account_type {
        return Err(violation("storage account type can't be changed"));
    }
    Ok(())
}

/// Data disks must be exactly [`desired_data_disks`].
pub fn check_data_disks(pool: &NodePoolSpec) -> Result<()> {
    if pool.data_disks != desired_data_disks() {
        return Err(violation("data disks do not have the required value"));
    }
    Ok(())
}

/// A changed VM size must satisfy every per-size rule on its own.
pub async fn check_vm_size_update<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    old: &NodePoolSpec,
    new: &NodePoolSpec,
) -> Result<()> {
    if old.vm_size == new.vm_size {
        return Ok(());
    }
    check_instance_type(vmcaps, ctx, new).await?;
    check_storage_account_type(vmcaps, ctx, new).await?;
    check_accelerated_networking(vmcaps, ctx, new).await
}

/// Every rule for a new node pool.
pub async fn validate_node_pool_create<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    pool: &NodePoolSpec,
) -> Result<()> {
    check_instance_type(vmcaps, ctx, pool).await?;
    check_storage_account_type(vmcaps, ctx, pool).await?;
    check_accelerated_networking(vmcaps, ctx, pool).await?;
    check_data_disks(pool)?;
    check_failure_domain(vmcaps, ctx, pool).await
}

/// Every rule for a node-pool update.
pub async fn validate_node_pool_update<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    old: &NodePoolSpec,
    new: &NodePoolSpec,
) -> Result<()> {
    check_accelerated_networking_unchanged(old, new)?;
    check_failure_domain_unchanged(old, new)?;
    check_storage_account_type_unchanged(old, new)?;
    check_vm_size_update(vmcaps, ctx, old, new).await
}

/// Default an unset storage account type to premium when the instance type
/// supports it, standard otherwise.
pub async fn ensure_storage_account_type<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    pool: &NodePoolSpec,
) -> Result<Option<PatchOperation>> {
    if !pool.storage_account_type.is_empty() {
        return Ok(None);
    }
    let premium = vmcaps
        .has_capability(ctx, &pool.location, &pool.vm_size, CAPABILITY_PREMIUM_IO)
        .await?;
    let value = if premium {
        STORAGE_PREMIUM_LRS
    } else {
        STORAGE_STANDARD_LRS
    };
    Ok(Some(PatchOperation::add(
        STORAGE_ACCOUNT_TYPE_PATH,
        Value::String(value.to_string()),
    )))
}

/// Set the data disks when the pool has none.
pub fn ensure_data_disks(pool: &NodePoolSpec) -> Result<Option<PatchOperation>> {
    if !pool.data_disks.is_empty() {
        return Ok(None);
    }
    let disks = serde_json::to_value(desired_data_disks())?;
    Ok(Some(PatchOperation::add(DATA_DISKS_PATH, disks)))
}

pub fn ensure_location(pool: &NodePoolSpec, default_location: &str) -> Option<PatchOperation> {
    if !pool.location.is_empty() {
        return None;
    }
    Some(PatchOperation::add(
        LOCATION_PATH,
        Value::String(default_location.to_string()),
    ))
}

/// Every defaulting patch for a new node pool, in storage account type,
/// data disks, location order.
///
/// An empty location is resolved against `default_location` before the
/// capability lookup.
pub async fn mutate_node_pool_create<S: CapabilitySource>(
    vmcaps: &VmCapabilities<S>,
    ctx: &CallContext,
    pool: &NodePoolSpec,
    default_location: &str,
) -> Result<Vec<PatchOperation>> {
    let location_patch = ensure_location(pool, default_location);
    let resolved;
    let pool = if location_patch.is_some() {
        resolved = NodePoolSpec {
            location: default_location.to_string(),
            ..pool.clone()
        };
        &resolved
    } else {
        pool
    };

    let mut patches = Vec::new();
    patches.extend(ensure_storage_account_type(vmcaps, ctx, pool).await?);
    patches.extend(ensure_data_disks(pool)?);
    patches.extend(location_patch);

    METRICS.add_patch_ops(patches.len());
    obs::emit_patches_generated(patches.len(), None);
    Ok(patches)
}

/// `add` patch setting `label` to the version of `component` shipped by
/// the object's release, or `None` when the label already has a value.
pub async fn ensure_component_version_label<S: ObjectStore>(
    catalog: &ReleaseCatalog<S>,
    ctx: &CallContext,
    object: &Value,
    component: &str,
    label: &str,
) -> Result<Option<PatchOperation>> {
    let labels = object.pointer("/metadata/labels");
    let label_value = |key: &str| {
        labels
            .and_then(|l| l.get(key))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    };

    if label_value(label).is_some() {
        return Ok(None);
    }

    let release = label_value(RELEASE_VERSION_LABEL)
        .ok_or_else(|| violation(format!("label {} is not set", RELEASE_VERSION_LABEL)))?;
    let versions = match catalog.component_versions(ctx, release).await {
        Ok(versions) => versions,
        Err(AdmissionError::ReleaseNotFound(name)) => {
            return Err(violation(format!("release {} not found", name)))
        }
        Err(err) => return Err(err),
    };
    let version = versions
        .get(component)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            violation(format!(
                "component {} not found in release {}",
                component, release
            ))
        })?;

    Ok(Some(PatchOperation::add(
        format!("/metadata/labels/{}", escape_pointer_token(label)),
        Value::String(version.clone()),
    )))
}
