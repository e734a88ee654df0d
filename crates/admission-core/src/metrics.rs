//! Global atomic counters for admission gate observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a CLI invocation).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    upgrades_allowed: AtomicU64,
    upgrades_denied: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    region_fetches: AtomicU64,
    patch_ops_emitted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            upgrades_allowed: AtomicU64::new(0),
            upgrades_denied: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            region_fetches: AtomicU64::new(0),
            patch_ops_emitted: AtomicU64::new(0),
        }
    }

    /// Record one upgrade decision.
    pub fn record_upgrade(&self, allowed: bool) {
        let (counter, metric) = if allowed {
            (&self.upgrades_allowed, "upgrades_allowed")
        } else {
            (&self.upgrades_denied, "upgrades_denied")
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric, "counter incremented");
    }

    /// A capability lookup served from an already populated region table.
    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    /// A capability lookup that found its region table empty.
    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_misses", "counter incremented");
    }

    /// One call to the inventory for a region listing.
    pub fn inc_region_fetches(&self) {
        self.region_fetches.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "region_fetches", "counter incremented");
    }

    /// Add the number of operations in a generated patch list.
    pub fn add_patch_ops(&self, count: usize) {
        self.patch_ops_emitted
            .fetch_add(count as u64, Ordering::Relaxed);
        tracing::trace!(metric = "patch_ops_emitted", count, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            upgrades_allowed = self.upgrades_allowed(),
            upgrades_denied = self.upgrades_denied(),
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
            region_fetches = self.region_fetches(),
            patch_ops_emitted = self.patch_ops_emitted(),
        );
    }

    pub fn upgrades_allowed(&self) -> u64 {
        self.upgrades_allowed.load(Ordering::Relaxed)
    }

    pub fn upgrades_denied(&self) -> u64 {
        self.upgrades_denied.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn region_fetches(&self) -> u64 {
        self.region_fetches.load(Ordering::Relaxed)
    }

    pub fn patch_ops_emitted(&self) -> u64 {
        self.patch_ops_emitted.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.upgrades_allowed,
            &self.upgrades_denied,
            &self.cache_hits,
            &self.cache_misses,
            &self.region_fetches,
            &self.patch_ops_emitted,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.record_upgrade(true);
        m.record_upgrade(false);
        m.record_upgrade(false);
        assert_eq!(m.upgrades_allowed(), 1);
        assert_eq!(m.upgrades_denied(), 2);

        m.inc_cache_hits();
        m.inc_cache_misses();
        m.inc_region_fetches();
        assert_eq!(m.cache_hits(), 1);
        assert_eq!(m.cache_misses(), 1);
        assert_eq!(m.region_fetches(), 1);

        m.add_patch_ops(3);
        m.add_patch_ops(0);
        assert_eq!(m.patch_ops_emitted(), 3);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.record_upgrade(true);
        m.inc_cache_hits();
        m.add_patch_ops(5);
        m.reset();
        assert_eq!(m.upgrades_allowed(), 0);
        assert_eq!(m.cache_hits(), 0);
        assert_eq!(m.patch_ops_emitted(), 0);
    }
}
