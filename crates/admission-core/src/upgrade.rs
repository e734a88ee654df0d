//! Release upgrade validation.
//!
//! [`validate`] is the pure rule set; [`ReleaseUpgradeValidator`] reads the
//! catalog through a [`ReleaseCatalog`] and records the outcome.
//!
//! Rules, first match wins:
//! 1. equal versions are allowed without reading the catalog
//! 2. a target missing from the catalog is denied
//! 3. an ignored endpoint is allowed
//! 4. a downgrade is denied
//! 5. crossing between alpha and non-alpha is denied
//! 6. staying on one (major, minor) line is allowed
//! 7. skipping a release on another minor line is denied

use std::fmt;

use admission_state::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::catalog::{ReleaseCatalog, ReleaseCatalogEntry};
use crate::context::CallContext;
use crate::error::{AdmissionError, ErrorKind, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::version::SemanticVersion;

/// Why an upgrade was allowed or denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum UpgradeReason {
    Equal,
    Success,
    ReleaseNotFound,
    Downgrade,
    AlphaBoundary,
    ReleaseSkipped { skipped: SemanticVersion },
}

impl UpgradeReason {
    /// Stable tag, e.g. `release-skipped`.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpgradeReason::Equal => "equal",
            UpgradeReason::Success => "success",
            UpgradeReason::ReleaseNotFound => "release-not-found",
            UpgradeReason::Downgrade => "downgrade",
            UpgradeReason::AlphaBoundary => "alpha-boundary",
            UpgradeReason::ReleaseSkipped { .. } => "release-skipped",
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, UpgradeReason::Equal | UpgradeReason::Success)
    }

    /// Error category for a denial. Allowing reasons map to
    /// `InvalidRequest` since they never become errors.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            UpgradeReason::ReleaseNotFound => ErrorKind::ReleaseNotFound,
            UpgradeReason::Downgrade => ErrorKind::Downgrade,
            UpgradeReason::AlphaBoundary => ErrorKind::AlphaBoundary,
            UpgradeReason::ReleaseSkipped { .. } => ErrorKind::ReleaseSkipped,
            UpgradeReason::Equal | UpgradeReason::Success => ErrorKind::InvalidRequest,
        }
    }
}

impl fmt::Display for UpgradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeDecision {
    pub old: SemanticVersion,
    pub new: SemanticVersion,
    pub allowed: bool,
    #[serde(flatten)]
    pub reason: UpgradeReason,
}

impl UpgradeDecision {
    fn new(old: &SemanticVersion, new: &SemanticVersion, reason: UpgradeReason) -> Self {
        Self {
            old: old.clone(),
            new: new.clone(),
            allowed: reason.is_allowed(),
            reason,
        }
    }

    /// Human readable explanation of the decision.
    pub fn message(&self) -> String {
        match &self.reason {
            UpgradeReason::Equal => format!("release {} is unchanged", self.new),
            UpgradeReason::Success => {
                format!("upgrade from {} to {} is allowed", self.old, self.new)
            }
            UpgradeReason::ReleaseNotFound => format!("release {} not found", self.new),
            UpgradeReason::Downgrade => format!(
                "downgrading from {} to {} is not allowed",
                self.old, self.new
            ),
            UpgradeReason::AlphaBoundary => format!(
                "upgrading from {} to {} crosses an alpha release boundary",
                self.old, self.new
            ),
            UpgradeReason::ReleaseSkipped { skipped } => format!(
                "upgrading from {} to {} skips release {}",
                self.old, self.new, skipped
            ),
        }
    }

    /// `Ok(self)` when allowed, [`AdmissionError::UpgradeDenied`] otherwise.
    pub fn into_result(self) -> Result<Self> {
        if self.allowed {
            Ok(self)
        } else {
            Err(AdmissionError::UpgradeDenied {
                message: self.message(),
                reason: self.reason,
            })
        }
    }
}

/// Decide whether `old` may be upgraded to `new` given the full catalog.
pub fn validate(
    old: &SemanticVersion,
    new: &SemanticVersion,
    catalog: &[ReleaseCatalogEntry],
) -> UpgradeDecision {
    let decide = |reason| UpgradeDecision::new(old, new, reason);

    if old == new {
        return decide(UpgradeReason::Equal);
    }

    if !catalog.iter().any(|e| &e.version == new) {
        return decide(UpgradeReason::ReleaseNotFound);
    }

    // Duplicates parsing to the same version count as ignored if any is.
    let ignored = catalog
        .iter()
        .any(|e| (&e.version == old || &e.version == new) && e.ignored);
    if ignored {
        return decide(UpgradeReason::Success);
    }

    if new < old {
        return decide(UpgradeReason::Downgrade);
    }

    if old.is_alpha() != new.is_alpha() {
        return decide(UpgradeReason::AlphaBoundary);
    }

    if old.same_minor_line(new) {
        return decide(UpgradeReason::Success);
    }

    let mut candidates: Vec<&SemanticVersion> = catalog
        .iter()
        .filter(|e| !e.ignored && !e.version.is_alpha())
        .map(|e| &e.version)
        .collect();
    candidates.sort();

    let skipped = candidates.into_iter().find(|r| {
        *r != old
            && *r != new
            && *r > old
            && *r < new
            && !r.same_minor_line(old)
            && !r.same_minor_line(new)
    });

    match skipped {
        Some(r) => decide(UpgradeReason::ReleaseSkipped { skipped: r.clone() }),
        None => decide(UpgradeReason::Success),
    }
}

/// Upgrade validator backed by a release catalog.
pub struct ReleaseUpgradeValidator<S> {
    catalog: ReleaseCatalog<S>,
}

impl<S> ReleaseUpgradeValidator<S>
where
    S: ObjectStore,
{
    pub fn new(store: S) -> Self {
        Self::from_catalog(ReleaseCatalog::new(store))
    }

    pub fn from_catalog(catalog: ReleaseCatalog<S>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ReleaseCatalog<S> {
        &self.catalog
    }

    /// Validate an upgrade, reading the catalog only when the versions differ.
    ///
    /// Catalog failures are returned as errors; no decision is made without
    /// a fully parsed catalog.
    pub async fn validate(
        &self,
        ctx: &CallContext,
        old: &SemanticVersion,
        new: &SemanticVersion,
    ) -> Result<UpgradeDecision> {
        let decision = if old == new {
            validate(old, new, &[])
        } else {
            let entries = self.catalog.entries(ctx).await?;
            validate(old, new, &entries)
        };

        METRICS.record_upgrade(decision.allowed);
        obs::emit_upgrade_decided(
            &old.to_string(),
            &new.to_string(),
            decision.allowed,
            decision.reason.as_str(),
        );
        Ok(decision)
    }

    /// Parse both release names, then [`validate`](Self::validate).
    pub async fn validate_names(
        &self,
        ctx: &CallContext,
        old: &str,
        new: &str,
    ) -> Result<UpgradeDecision> {
        let parse = |s: &str| {
            SemanticVersion::parse(s).map_err(|e| AdmissionError::InvalidRequest(e.to_string()))
        };
        let (old, new) = (parse(old)?, parse(new)?);
        self.validate(ctx, &old, &new).await
    }
}
