//! Pipeline metrics
//!
//! Plain atomic counters, one per branch the error-handling design names
//! (cache hit/miss, simulation outcome, split-search timeout, recovered
//! partial failures, unhandled errors). A periodic task logs the snapshot;
//! there is no external metrics sink.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct Metrics {
    // Request outcomes
    pub requests_total: AtomicU64,
    pub requests_invalid: AtomicU64,
    pub requests_not_found: AtomicU64,
    pub requests_unhandled_error: AtomicU64,

    // Route cache
    pub route_cache_hits: AtomicU64,
    pub route_cache_misses: AtomicU64,
    pub route_cache_refreshes: AtomicU64,
    pub route_cache_writes: AtomicU64,
    pub route_cache_deserialize_misses: AtomicU64,

    // Discovery
    pub discovery_fallbacks: AtomicU64,
    pub pool_cache_hits: AtomicU64,
    pub pool_cache_misses: AtomicU64,

    // Route finding
    pub routes_found: AtomicU64,
    pub extended_searches: AtomicU64,
    pub extended_routes_found: AtomicU64,

    // Split search
    pub split_search_timeouts: AtomicU64,

    // Gas
    pub gas_conversion_failures: AtomicU64,
    pub l1_gas_failures: AtomicU64,

    // Candidate assembly
    pub candidate_build_failures: AtomicU64,

    // Simulation
    pub simulations_succeeded: AtomicU64,
    pub simulations_failed: AtomicU64,
    pub simulations_unattempted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Metrics {
        Metrics::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Log the current counter values. Called on a timer from main.
    pub fn log_snapshot(&self) {
        info!(
            requests = self.requests_total.load(Ordering::Relaxed),
            invalid = self.requests_invalid.load(Ordering::Relaxed),
            not_found = self.requests_not_found.load(Ordering::Relaxed),
            unhandled = self.requests_unhandled_error.load(Ordering::Relaxed),
            cache_hits = self.route_cache_hits.load(Ordering::Relaxed),
            cache_misses = self.route_cache_misses.load(Ordering::Relaxed),
            cache_refreshes = self.route_cache_refreshes.load(Ordering::Relaxed),
            split_timeouts = self.split_search_timeouts.load(Ordering::Relaxed),
            sim_ok = self.simulations_succeeded.load(Ordering::Relaxed),
            sim_failed = self.simulations_failed.load(Ordering::Relaxed),
            sim_skipped = self.simulations_unattempted.load(Ordering::Relaxed),
            "metrics snapshot"
        );
    }
}
