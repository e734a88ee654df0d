//! Release catalog reader.
//!
//! Lists every `Release` record from the object store and parses each name
//! as a [`SemanticVersion`]. One unparseable name fails the whole read: the
//! skip scan assumes it sees every release.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use admission_state::{ObjectStore, Record, RELEASE_KIND};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::context::CallContext;
use crate::error::{AdmissionError, Result};
use crate::version::SemanticVersion;

/// Annotation that takes a release out of upgrade checks.
pub const IGNORE_ANNOTATION: &str = "release.giantswarm.io/ignore";

/// One release as the upgrade validator sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseCatalogEntry {
    pub version: SemanticVersion,
    pub raw_name: String,
    pub ignored: bool,
}

impl ReleaseCatalogEntry {
    pub fn new(version: SemanticVersion) -> Self {
        Self {
            raw_name: version.release_name(),
            version,
            ignored: false,
        }
    }

    /// Mark the entry ignored (builder pattern).
    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    /// Build an entry from a `Release` record.
    pub fn from_record(record: &Record) -> Result<Self> {
        let version =
            SemanticVersion::parse(&record.name).map_err(|e| AdmissionError::InvalidRelease {
                name: record.name.clone(),
                reason: e.reason,
            })?;
        let ignored = record
            .annotations
            .get(IGNORE_ANNOTATION)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        Ok(Self {
            version,
            raw_name: record.name.clone(),
            ignored,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReleaseSpec {
    #[serde(default)]
    components: Vec<ReleaseComponent>,
}

#[derive(Debug, Deserialize)]
struct ReleaseComponent {
    name: String,
    #[serde(default)]
    version: String,
}

/// Component name to version, as listed by the release.
pub type ComponentVersions = BTreeMap<String, String>;

/// Reads releases from an [`ObjectStore`].
///
/// Component maps are memoised per release for the life of the reader;
/// release contents never change once published.
pub struct ReleaseCatalog<S> {
    store: S,
    components: RwLock<HashMap<String, Arc<ComponentVersions>>>,
}

impl<S> ReleaseCatalog<S>
where
    S: ObjectStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            components: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every release in the store, in store order.
    pub async fn entries(&self, ctx: &CallContext) -> Result<Vec<ReleaseCatalogEntry>> {
        let records = ctx
            .run("catalog.list", self.store.list(RELEASE_KIND))
            .await??;
        let entries = records
            .iter()
            .map(ReleaseCatalogEntry::from_record)
            .collect::<Result<Vec<_>>>()?;
        debug!(releases = entries.len(), "catalog read");
        Ok(entries)
    }

    /// Component versions shipped by `release` (`v11.3.0` or `11.3.0`).
    pub async fn component_versions(
        &self,
        ctx: &CallContext,
        release: &str,
    ) -> Result<Arc<ComponentVersions>> {
        let name = SemanticVersion::parse(release)
            .map_err(|e| AdmissionError::InvalidRequest(e.to_string()))?
            .release_name();

        if let Some(cached) = self.components.read().await.get(&name) {
            return Ok(Arc::clone(cached));
        }

        let record = ctx
            .run("catalog.get", self.store.get(RELEASE_KIND, &name))
            .await??
            .ok_or_else(|| AdmissionError::ReleaseNotFound(name.clone()))?;

        let spec: ReleaseSpec = if record.spec.is_null() {
            ReleaseSpec {
                components: Vec::new(),
            }
        } else {
            serde_json::from_value(record.spec).map_err(|e| {
                AdmissionError::MalformedRecord(format!("release {}: {}", name, e))
            })?
        };

        let versions: ComponentVersions = spec
            .components
            .into_iter()
            .map(|c| (c.name, c.version))
            .collect();
        let versions = Arc::new(versions);

        self.components
            .write()
            .await
            .entry(name)
            .or_insert_with(|| Arc::clone(&versions));
        Ok(versions)
    }

    /// Whether `release` ships `component` with a non-empty version.
    pub async fn contains_component(
        &self,
        ctx: &CallContext,
        release: &str,
        component: &str,
    ) -> Result<bool> {
        let versions = self.component_versions(ctx, release).await?;
        Ok(versions.get(component).is_some_and(|v| !v.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admission_state::fakes::MemoryObjectStore;
    use serde_json::json;

    #[test]
    fn entry_reads_ignore_annotation_case_insensitively() {
        let record =
            Record::new(RELEASE_KIND, "v11.4.0").with_annotation(IGNORE_ANNOTATION, "TRUE");
        let entry = ReleaseCatalogEntry::from_record(&record).unwrap();
        assert!(entry.ignored);
        assert_eq!(entry.version, SemanticVersion::new(11, 4, 0));
        assert_eq!(entry.raw_name, "v11.4.0");

        let record =
            Record::new(RELEASE_KIND, "v11.4.0").with_annotation(IGNORE_ANNOTATION, "yes");
        assert!(!ReleaseCatalogEntry::from_record(&record).unwrap().ignored);
    }

    #[test]
    fn entry_rejects_unparseable_name() {
        let record = Record::new(RELEASE_KIND, "latest");
        let err = ReleaseCatalogEntry::from_record(&record).unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidRelease { ref name, .. } if name == "latest"));
        assert!(err.is_upstream_invalid_response());
    }

    #[tokio::test]
    async fn component_versions_are_memoised_per_release() {
        let store = MemoryObjectStore::new();
        store.insert(Record::new(RELEASE_KIND, "v13.0.0").with_spec(json!({
            "components": [
                {"name": "azure-operator", "version": "5.0.0"},
                {"name": "cluster-operator", "version": "v0.23.18"},
                {"name": "cert-operator", "version": ""}
            ]
        })));
        let catalog = ReleaseCatalog::new(store);
        let ctx = CallContext::new();

        let versions = catalog.component_versions(&ctx, "13.0.0").await.unwrap();
        assert_eq!(versions["azure-operator"], "5.0.0");
        assert_eq!(versions["cluster-operator"], "v0.23.18");

        assert!(catalog
            .contains_component(&ctx, "v13.0.0", "azure-operator")
            .await
            .unwrap());
        assert!(!catalog
            .contains_component(&ctx, "v13.0.0", "cert-operator")
            .await
            .unwrap());
        assert!(!catalog
            .contains_component(&ctx, "v13.0.0", "app-operator")
            .await
            .unwrap());
        assert_eq!(catalog.store().get_calls(), 1);
    }

    #[tokio::test]
    async fn component_versions_of_missing_release() {
        let catalog = ReleaseCatalog::new(MemoryObjectStore::new());
        let err = catalog
            .component_versions(&CallContext::new(), "v1.0.0")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::ReleaseNotFound(ref n) if n == "v1.0.0"));
        assert!(err.is_not_found());
    }
}
