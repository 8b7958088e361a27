//! Cached-routes repository
//!
//! Winning routes are stored per (chain, direction, pair, USD bucket) so
//! later requests of similar notional reuse them without discovery. Each
//! leg of a winning split is stored independently, letting the split
//! finder recombine legs across requests. Entries soft-expire after the
//! refresh window: a read inside the soft window returns the stale entry
//! immediately and signals exactly one asynchronous refresh.

use crate::chains::Chain;
use crate::config::CacheConfig;
use crate::metrics::Metrics;
use crate::types::{PoolInfo, Protocol, Route, TradeType, UsdBucket};
use alloy::primitives::Address;
use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::store::CacheStore;

/// Serialised projection of one cached route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRoute {
    pub protocol: Protocol,
    pub token_in: Address,
    pub token_out: Address,
    pub pools: Vec<PoolInfo>,
}

impl CachedRoute {
    pub fn from_route(route: &Route) -> CachedRoute {
        CachedRoute {
            protocol: route.protocol,
            token_in: route.token_in,
            token_out: route.token_out,
            pools: route
                .pools
                .iter()
                .map(|p| PoolInfo::from_pool(p, 0.0, 0.0))
                .collect(),
        }
    }

    /// None when any pool projection fails to materialise; the caller
    /// treats that as a cache miss.
    pub fn to_route(&self, chain: Chain) -> Option<Route> {
        let pools = self
            .pools
            .iter()
            .map(|info| info.to_pool())
            .collect::<Option<Vec<_>>>()?;
        Some(Route::new(chain, pools, self.token_in, self.token_out))
    }

    fn identity(&self) -> String {
        let mut pools: Vec<String> = self.pools.iter().map(|p| format!("{:#x}", p.address)).collect();
        pools.sort();
        format!("{}:{}", self.protocol, pools.join("+"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedRoutesEntry {
    inserted_at: DateTime<Utc>,
    routes: Vec<CachedRoute>,
}

/// Result of a repository read.
#[derive(Debug)]
pub struct CacheLookup {
    pub routes: Vec<Route>,
    /// The entry is stale-but-servable; exactly one caller should refresh.
    pub needs_refresh: bool,
}

pub struct CachedRoutesRepository {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    in_flight: DashMap<String, ()>,
    metrics: Arc<Metrics>,
}

impl CachedRoutesRepository {
    pub fn new(
        store: Arc<dyn CacheStore>,
        config: CacheConfig,
        metrics: Arc<Metrics>,
    ) -> CachedRoutesRepository {
        CachedRoutesRepository {
            store,
            config,
            in_flight: DashMap::new(),
            metrics,
        }
    }

    /// The exact store key. Tokens are lowercased hex; callers normalise
    /// native currency to the zero address before keying.
    pub fn cache_key(
        chain: Chain,
        trade_type: TradeType,
        token_in: Address,
        token_out: Address,
        bucket: UsdBucket,
    ) -> String {
        format!(
            "CACHEDROUTE#{}#{}#{:#x}#{:#x}#{}",
            chain.id(),
            trade_type.cache_segment(),
            token_in,
            token_out,
            bucket.as_str()
        )
    }

    pub async fn get(
        &self,
        chain: Chain,
        trade_type: TradeType,
        token_in: Address,
        token_out: Address,
        bucket: UsdBucket,
    ) -> CacheLookup {
        let key = Self::cache_key(chain, trade_type, token_in, token_out, bucket);
        let miss = CacheLookup {
            routes: Vec::new(),
            needs_refresh: false,
        };
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                Metrics::incr(&self.metrics.route_cache_misses);
                return miss;
            }
            Err(e) => {
                warn!("Route cache read failed for {}: {:#}", key, e);
                Metrics::incr(&self.metrics.route_cache_misses);
                return miss;
            }
        };
        let entry: CachedRoutesEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                // Undecodable entries are a miss, not an error.
                warn!("Discarding undecodable route cache entry {}: {}", key, e);
                Metrics::incr(&self.metrics.route_cache_deserialize_misses);
                Metrics::incr(&self.metrics.route_cache_misses);
                return miss;
            }
        };

        let age = (Utc::now() - entry.inserted_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age >= Duration::from_secs(self.config.routes_ttl_secs) {
            Metrics::incr(&self.metrics.route_cache_misses);
            return miss;
        }
        let routes: Vec<Route> = entry
            .routes
            .iter()
            .filter_map(|cached| cached.to_route(chain))
            .filter(|route| route.is_valid())
            .collect();
        if routes.is_empty() {
            Metrics::incr(&self.metrics.route_cache_misses);
            return miss;
        }
        Metrics::incr(&self.metrics.route_cache_hits);
        CacheLookup {
            routes,
            needs_refresh: age >= Duration::from_secs(self.config.routes_refresh_secs),
        }
    }

    /// Single-flight guard for refresh-ahead: the first caller wins and
    /// must call `finish_refresh` when done; everyone else observes the
    /// in-flight refresh and backs off.
    pub fn try_begin_refresh(&self, key: &str) -> bool {
        let entry = self.in_flight.entry(key.to_string());
        match entry {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(());
                Metrics::incr(&self.metrics.route_cache_refreshes);
                true
            }
        }
    }

    pub fn finish_refresh(&self, key: &str) {
        self.in_flight.remove(key);
    }

    /// Store the legs of a winning split. Existing live legs for the key
    /// are kept and de-duplicated so independently discovered routes
    /// accumulate.
    pub async fn insert(
        &self,
        chain: Chain,
        trade_type: TradeType,
        token_in: Address,
        token_out: Address,
        bucket: UsdBucket,
        routes: &[Route],
    ) -> Result<()> {
        let key = Self::cache_key(chain, trade_type, token_in, token_out, bucket);
        let mut merged: Vec<CachedRoute> = Vec::new();
        if let Ok(Some(raw)) = self.store.get(&key).await {
            if let Ok(existing) = serde_json::from_str::<CachedRoutesEntry>(&raw) {
                merged = existing.routes;
            }
        }
        for route in routes {
            let cached = CachedRoute::from_route(route);
            if !merged.iter().any(|r| r.identity() == cached.identity()) {
                merged.push(cached);
            }
        }
        let entry = CachedRoutesEntry {
            inserted_at: Utc::now(),
            routes: merged,
        };
        let raw = serde_json::to_string(&entry)?;
        self.store
            .set(&key, &raw, Duration::from_secs(self.config.routes_ttl_secs))
            .await?;
        Metrics::incr(&self.metrics.route_cache_writes);
        debug!("Cached {} route legs under {}", routes.len(), key);
        Ok(())
    }

    /// Admin deletion of one exact key.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }
}
