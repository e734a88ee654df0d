//! VM capability cache.
//!
//! Region tables are fetched wholesale from a [`CapabilitySource`] on first
//! access and kept for the life of the [`VmCapabilities`] value. Lookups
//! take the read side of an async `RwLock`; the populate step replaces a
//! region's table under the write side. A per-region mutex serialises
//! fetches so concurrent first accesses to one region share a single
//! inventory call, while hits on other regions never wait behind it.

mod record;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use admission_state::{region_filter, CapabilitySource, ResourceSku};
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{AdmissionError, Result};
use crate::metrics::METRICS;
use crate::obs;

pub use record::{
    CapabilityRecord, CAPABILITY_ACCELERATED_NETWORKING, CAPABILITY_CPUS, CAPABILITY_MEMORY,
    CAPABILITY_PREMIUM_IO, CAPABILITY_SUPPORTED,
};

/// Instance type to SKU for one region.
type RegionTable = Arc<HashMap<String, ResourceSku>>;

/// Process-lifetime cache of VM SKU capabilities, keyed by region.
pub struct VmCapabilities<S> {
    source: S,
    regions: RwLock<HashMap<String, RegionTable>>,
    populate_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S> VmCapabilities<S>
where
    S: CapabilitySource,
{
    pub fn new(source: S) -> Self {
        Self {
            source,
            regions: RwLock::new(HashMap::new()),
            populate_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Memory of `instance_type` in whole gigabytes.
    pub async fn memory(
        &self,
        ctx: &CallContext,
        region: &str,
        instance_type: &str,
    ) -> Result<u64> {
        let sku = self.resolve(ctx, region, instance_type).await?;
        record::numeric_capability(&sku, CAPABILITY_MEMORY)
    }

    /// Number of vCPUs of `instance_type`.
    pub async fn cpus(&self, ctx: &CallContext, region: &str, instance_type: &str) -> Result<u64> {
        let sku = self.resolve(ctx, region, instance_type).await?;
        record::numeric_capability(&sku, CAPABILITY_CPUS)
    }

    /// Whether capability `name` is reported as supported.
    ///
    /// The name matches exactly; the `True` sentinel matches ignoring case.
    /// An absent capability is unsupported.
    pub async fn has_capability(
        &self,
        ctx: &CallContext,
        region: &str,
        instance_type: &str,
        name: &str,
    ) -> Result<bool> {
        Ok(self
            .capability(ctx, region, instance_type, name)
            .await?
            .is_some_and(|v| v.eq_ignore_ascii_case(CAPABILITY_SUPPORTED)))
    }

    /// Raw value of capability `name`, `None` when the SKU lacks it.
    pub async fn capability(
        &self,
        ctx: &CallContext,
        region: &str,
        instance_type: &str,
        name: &str,
    ) -> Result<Option<String>> {
        if name.is_empty() {
            return Err(AdmissionError::InvalidRequest(
                "capability name can't be empty".to_string(),
            ));
        }
        let sku = self.resolve(ctx, region, instance_type).await?;
        Ok(sku.capability(name).map(str::to_string))
    }

    /// Fully typed capabilities of `instance_type`.
    pub async fn record(
        &self,
        ctx: &CallContext,
        region: &str,
        instance_type: &str,
    ) -> Result<CapabilityRecord> {
        let sku = self.resolve(ctx, region, instance_type).await?;
        CapabilityRecord::from_sku(&sku)
    }

    /// Availability zones offering `instance_type` in `region`.
    pub async fn zones(
        &self,
        ctx: &CallContext,
        region: &str,
        instance_type: &str,
    ) -> Result<Vec<String>> {
        let sku = self.resolve(ctx, region, instance_type).await?;
        Ok(sku.zones.into_iter().collect())
    }

    /// Look up the SKU for `(region, instance_type)`, fetching the region
    /// on first use.
    pub async fn resolve(
        &self,
        ctx: &CallContext,
        region: &str,
        instance_type: &str,
    ) -> Result<ResourceSku> {
        if region.is_empty() {
            return Err(AdmissionError::InvalidRequest(
                "region can't be empty".to_string(),
            ));
        }
        if instance_type.is_empty() {
            return Err(AdmissionError::InvalidRequest(
                "instance type can't be empty".to_string(),
            ));
        }

        let table = self.region_table(ctx, region).await?;
        table
            .get(instance_type)
            .cloned()
            .ok_or_else(|| AdmissionError::SkuNotFound {
                region: region.to_string(),
                instance_type: instance_type.to_string(),
            })
    }

    /// Regions with a non-empty table.
    pub async fn cached_regions(&self) -> Vec<String> {
        let regions = self.regions.read().await;
        let mut names: Vec<String> = regions
            .iter()
            .filter(|(_, table)| !table.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    async fn cached(&self, region: &str) -> Option<RegionTable> {
        self.regions
            .read()
            .await
            .get(region)
            .filter(|table| !table.is_empty())
            .cloned()
    }

    fn populate_lock(&self, region: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .populate_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(region.to_string()).or_default())
    }

    async fn region_table(&self, ctx: &CallContext, region: &str) -> Result<RegionTable> {
        if let Some(table) = self.cached(region).await {
            METRICS.inc_cache_hits();
            return Ok(table);
        }
        METRICS.inc_cache_misses();

        let lock = self.populate_lock(region);
        let _populating = ctx.run("vmcaps.populate", lock.lock()).await?;

        // Another caller may have populated the region while we waited.
        if let Some(table) = self.cached(region).await {
            return Ok(table);
        }

        let filter = region_filter(region);
        debug!(region = %region, filter = %filter, "fetching region capabilities");
        METRICS.inc_region_fetches();
        let fetched = ctx
            .run("vmcaps.fetch", self.source.list_capabilities(region, &filter))
            .await
            .and_then(|listing| listing.map_err(AdmissionError::from));
        let skus = match fetched {
            Ok(skus) => skus,
            Err(err) => {
                obs::emit_fetch_failed(region, &err);
                return Err(err);
            }
        };

        let table: RegionTable = Arc::new(
            skus.into_iter()
                .map(|sku| (sku.name.clone(), sku))
                .collect(),
        );
        self.regions
            .write()
            .await
            .insert(region.to_string(), Arc::clone(&table));
        obs::emit_region_populated(region, table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admission_state::fakes::StubCapabilitySource;

    fn source() -> StubCapabilitySource {
        StubCapabilitySource::new().with_region(
            "westeurope",
            vec![
                ResourceSku::new("Standard_D4s_v3")
                    .with_capability(CAPABILITY_MEMORY, "16")
                    .with_capability(CAPABILITY_CPUS, "4"),
                ResourceSku::new("Standard_A2")
                    .with_capability(CAPABILITY_MEMORY, "3")
                    .with_capability(CAPABILITY_CPUS, "2"),
            ],
        )
    }

    #[tokio::test]
    async fn other_instance_types_come_from_the_region_table() {
        let caps = VmCapabilities::new(source());
        let ctx = CallContext::new();

        assert_eq!(caps.memory(&ctx, "westeurope", "Standard_D4s_v3").await.unwrap(), 16);
        assert_eq!(caps.cpus(&ctx, "westeurope", "Standard_A2").await.unwrap(), 2);
        assert_eq!(caps.source().calls_for("westeurope"), 1);
        assert_eq!(caps.cached_regions().await, vec!["westeurope".to_string()]);
    }

    #[tokio::test]
    async fn unknown_instance_type_in_known_region_is_not_found() {
        let caps = VmCapabilities::new(source());
        let ctx = CallContext::new();
        caps.cpus(&ctx, "westeurope", "Standard_A2").await.unwrap();

        let err = caps
            .cpus(&ctx, "westeurope", "Standard_Nope")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::SkuNotFound { .. }));
        assert!(err.is_not_found());
        assert_eq!(caps.source().calls_for("westeurope"), 1);
    }

    #[tokio::test]
    async fn empty_region_is_fetched_again() {
        let caps = VmCapabilities::new(source());
        let ctx = CallContext::new();
        for _ in 0..2 {
            let err = caps.cpus(&ctx, "nowhere", "Standard_A2").await.unwrap_err();
            assert!(err.is_not_found());
        }
        assert_eq!(caps.source().calls_for("nowhere"), 2);
        assert!(caps.cached_regions().await.is_empty());
    }

    #[tokio::test]
    async fn empty_capability_name_is_rejected_before_fetch() {
        let caps = VmCapabilities::new(source());
        let err = caps
            .has_capability(&CallContext::new(), "westeurope", "Standard_A2", "")
            .await
            .unwrap_err();
        assert!(err.is_invalid_request());
        assert_eq!(caps.source().calls(), 0);
    }
}
