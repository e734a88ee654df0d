//! HTTP client for the VM SKU inventory API
//!
//! Lists compute SKUs for a region from an ARM-compatible endpoint
//! (`/subscriptions/{id}/providers/Microsoft.Compute/skus`), following
//! `nextLink` pagination until the region is fully materialised.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::StorageError;
use crate::storage_traits::{CapabilitySource, ResourceSku, SkuCapability, StorageResult};

/// Resource type of VM SKUs; the inventory also lists disks and others.
pub const VIRTUAL_MACHINES_RESOURCE_TYPE: &str = "virtualMachines";

const DEFAULT_ENDPOINT: &str = "https://management.azure.com";
const DEFAULT_API_VERSION: &str = "2019-04-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Inventory client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Base URL of the management API
    pub endpoint: String,
    /// Subscription whose SKUs are listed
    pub subscription_id: String,
    /// `api-version` query parameter
    pub api_version: String,
    /// Bearer token (optional for local mirrors)
    pub token: Option<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl InventoryConfig {
    /// Create a config for a subscription against the default endpoint.
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            subscription_id: subscription_id.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            token: None,
            request_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Load from environment variables.
    ///
    /// Reads `ADMISSION_SUBSCRIPTION_ID` (required),
    /// `ADMISSION_INVENTORY_ENDPOINT`, `ADMISSION_INVENTORY_API_VERSION` and
    /// `ADMISSION_INVENTORY_TOKEN`.
    pub fn from_env() -> StorageResult<Self> {
        let subscription_id = std::env::var("ADMISSION_SUBSCRIPTION_ID").map_err(|_| {
            StorageError::Unavailable("ADMISSION_SUBSCRIPTION_ID is not set".to_string())
        })?;
        let mut config = Self::new(subscription_id);
        if let Ok(endpoint) = std::env::var("ADMISSION_INVENTORY_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(api_version) = std::env::var("ADMISSION_INVENTORY_API_VERSION") {
            config.api_version = api_version;
        }
        config.token = std::env::var("ADMISSION_INVENTORY_TOKEN").ok();
        Ok(config)
    }

    /// Override the endpoint (builder pattern).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the bearer token (builder pattern).
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn skus_url(&self) -> String {
        format!(
            "{}/subscriptions/{}/providers/Microsoft.Compute/skus",
            self.endpoint.trim_end_matches('/'),
            self.subscription_id
        )
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkuPage {
    #[serde(default)]
    value: Vec<WireSku>,
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSku {
    name: Option<String>,
    resource_type: Option<String>,
    #[serde(default)]
    location_info: Vec<WireLocationInfo>,
    #[serde(default)]
    capabilities: Vec<WireCapability>,
}

#[derive(Debug, Deserialize)]
struct WireLocationInfo {
    location: Option<String>,
    #[serde(default)]
    zones: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireCapability {
    name: Option<String>,
    value: Option<String>,
}

impl WireSku {
    /// Convert to the domain type; SKUs without a name or of another
    /// resource type are dropped.
    fn into_resource_sku(self, region: &str) -> Option<ResourceSku> {
        if self.resource_type.as_deref() != Some(VIRTUAL_MACHINES_RESOURCE_TYPE) {
            return None;
        }
        let name = self.name?;
        let zones: BTreeSet<String> = self
            .location_info
            .into_iter()
            .filter(|info| {
                info.location
                    .as_deref()
                    .map(|l| l.eq_ignore_ascii_case(region))
                    .unwrap_or(false)
            })
            .flat_map(|info| info.zones)
            .collect();
        let capabilities = self
            .capabilities
            .into_iter()
            .filter_map(|c| {
                Some(SkuCapability {
                    name: c.name?,
                    value: c.value?,
                })
            })
            .collect();
        Some(ResourceSku {
            name,
            zones,
            capabilities,
        })
    }
}

fn decode_page(body: &[u8], region: &str) -> StorageResult<(Vec<ResourceSku>, Option<String>)> {
    let page: SkuPage = serde_json::from_slice(body)?;
    let skus = page
        .value
        .into_iter()
        .filter_map(|sku| sku.into_resource_sku(region))
        .collect();
    Ok((skus, page.next_link.filter(|link| !link.is_empty())))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Capability source backed by the HTTP inventory API.
pub struct HttpCapabilitySource {
    config: InventoryConfig,
    http_client: reqwest::Client,
}

impl HttpCapabilitySource {
    /// Create a client from an explicit config.
    pub fn new(config: InventoryConfig) -> StorageResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("admission-gate/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StorageError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Create a client from `InventoryConfig::from_env`.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(InventoryConfig::from_env()?)
    }

    async fn fetch_page(&self, request: reqwest::RequestBuilder) -> StorageResult<Vec<u8>> {
        let request = match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Unavailable(format!(
                "inventory answered {}",
                status
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl CapabilitySource for HttpCapabilitySource {
    #[instrument(skip(self), fields(subscription = %self.config.subscription_id))]
    async fn list_capabilities(
        &self,
        region: &str,
        filter: &str,
    ) -> StorageResult<Vec<ResourceSku>> {
        let first = self.http_client.get(self.config.skus_url()).query(&[
            ("api-version", self.config.api_version.as_str()),
            ("$filter", filter),
        ]);
        let body = self.fetch_page(first).await?;
        let (mut skus, mut next_link) = decode_page(&body, region)?;
        let mut pages = 1usize;

        while let Some(link) = next_link {
            let body = self.fetch_page(self.http_client.get(&link)).await?;
            let (more, next) = decode_page(&body, region)?;
            skus.extend(more);
            next_link = next;
            pages += 1;
        }

        debug!(region = %region, pages = pages, skus = skus.len(), "inventory listed");
        Ok(skus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "value": [
            {
                "name": "Standard_D4s_v3",
                "resourceType": "virtualMachines",
                "locationInfo": [{"location": "westeurope", "zones": ["2", "1", "3"]}],
                "capabilities": [
                    {"name": "vCPUs", "value": "4"},
                    {"name": "MemoryGB", "value": "16"},
                    {"name": "PremiumIO", "value": "True"}
                ]
            },
            {
                "name": "Premium_LRS",
                "resourceType": "disks",
                "capabilities": []
            },
            {
                "resourceType": "virtualMachines",
                "capabilities": []
            }
        ],
        "nextLink": "https://example.invalid/page2"
    }"#;

    #[test]
    fn decode_keeps_only_named_virtual_machines() {
        let (skus, next) = decode_page(PAGE.as_bytes(), "westeurope").unwrap();
        assert_eq!(skus.len(), 1);
        assert_eq!(skus[0].name, "Standard_D4s_v3");
        assert_eq!(skus[0].capability("MemoryGB"), Some("16"));
        assert_eq!(next.as_deref(), Some("https://example.invalid/page2"));
    }

    #[test]
    fn decode_collects_zones_for_the_queried_region() {
        let (skus, _) = decode_page(PAGE.as_bytes(), "WestEurope").unwrap();
        let zones: Vec<_> = skus[0].zones.iter().cloned().collect();
        assert_eq!(zones, vec!["1", "2", "3"]);

        let (skus, _) = decode_page(PAGE.as_bytes(), "northeurope").unwrap();
        assert!(skus[0].zones.is_empty());
    }

    #[test]
    fn empty_next_link_ends_pagination() {
        let (skus, next) = decode_page(br#"{"value": [], "nextLink": ""}"#, "westeurope").unwrap();
        assert!(skus.is_empty());
        assert!(next.is_none());
    }

    #[test]
    fn garbage_body_is_decode_error() {
        let err = decode_page(b"<html>", "westeurope").unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }

    #[test]
    fn skus_url_tolerates_trailing_slash() {
        let config = InventoryConfig::new("sub-1").with_endpoint("http://localhost:8080/");
        assert_eq!(
            config.skus_url(),
            "http://localhost:8080/subscriptions/sub-1/providers/Microsoft.Compute/skus"
        );
    }
}
