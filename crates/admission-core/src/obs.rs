//! Structured observability hooks for admission decisions.
//!
//! This module provides:
//! - Request-scoped tracing spans via the `RequestSpan` RAII guard
//! - Emission functions for decision events: upgrade verdicts, region
//!   population, inventory failures and generated patches
//!
//! Events are emitted at `info!` level; failures at `warn!`.

use tracing::{info, warn};

/// RAII guard that enters a request-scoped span for one admission review.
///
/// ```ignore
/// let _span = RequestSpan::enter("7d1c0a", "AzureMachinePool");
/// ```
pub struct RequestSpan {
    _span: tracing::span::EnteredSpan,
}

impl RequestSpan {
    /// Create and enter a span tagged with the request uid and object kind.
    pub fn enter(uid: &str, kind: &str) -> Self {
        let span = tracing::info_span!("admission.request", uid = %uid, kind = %kind);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: an upgrade request was decided.
pub fn emit_upgrade_decided(old: &str, new: &str, allowed: bool, reason: &str) {
    info!(
        event = "upgrade.decided",
        old = %old,
        new = %new,
        allowed = allowed,
        reason = %reason,
    );
}

/// Emit event: a region table was fetched and stored.
pub fn emit_region_populated(region: &str, sku_count: usize) {
    info!(event = "vmcaps.region_populated", region = %region, sku_count = sku_count);
}

/// Emit event: fetching a region listing failed (warning level).
pub fn emit_fetch_failed(region: &str, error: &dyn std::fmt::Display) {
    warn!(event = "vmcaps.fetch_failed", region = %region, error = %error);
}

/// Emit event: a patch list was generated.
pub fn emit_patches_generated(op_count: usize, skipped_prefix: Option<&str>) {
    info!(
        event = "patch.generated",
        op_count = op_count,
        skipped_prefix = skipped_prefix.unwrap_or(""),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_span_create() {
        let _span = RequestSpan::enter("uid-1", "AzureCluster");
    }
}
