//! Read-through caching for pool discovery
//!
//! Wraps any discoverer with two TTL caches: the global all-pools cache
//! (hours) and the narrower tokens-specific cache (minutes). Entries are
//! stored serialised; an entry that fails to deserialise is a miss, not
//! an error. Cache keys embed the inner discoverer's name so competing
//! implementations never collide.

use super::{PoolDiscoverer, PoolQuery};
use crate::chains::Chain;
use crate::config::CacheConfig;
use crate::metrics::Metrics;
use crate::types::{HooksOption, PoolInfo, Protocol};
use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct CachingPoolDiscoverer {
    inner: Arc<dyn PoolDiscoverer>,
    all_pools: Cache<String, Arc<String>>,
    token_pools: Cache<String, Arc<String>>,
    metrics: Arc<Metrics>,
}

impl CachingPoolDiscoverer {
    pub fn new(
        inner: Arc<dyn PoolDiscoverer>,
        cache_config: &CacheConfig,
        metrics: Arc<Metrics>,
    ) -> CachingPoolDiscoverer {
        CachingPoolDiscoverer {
            inner,
            all_pools: Cache::builder()
                .time_to_live(Duration::from_secs(cache_config.all_pools_ttl_secs))
                .max_capacity(256)
                .build(),
            token_pools: Cache::builder()
                .time_to_live(Duration::from_secs(cache_config.token_pools_ttl_secs))
                .max_capacity(100_000)
                .build(),
            metrics,
        }
    }

    fn all_pools_key(&self, chain: Chain, protocol: Protocol) -> String {
        format!("pools#{}#{}#{}", self.inner.name(), chain.id(), protocol)
    }

    /// Tokens are sorted so (a,b) and (b,a) share an entry.
    pub fn tokens_key(
        name: &str,
        chain: Chain,
        protocol: Protocol,
        token_a: Address,
        token_b: Address,
        hooks: HooksOption,
    ) -> String {
        let (t0, t1) = if token_a < token_b {
            (token_a, token_b)
        } else {
            (token_b, token_a)
        };
        format!(
            "pools#{}#{}#{}#{:#x}#{:#x}#{:?}",
            name,
            chain.id(),
            protocol,
            t0,
            t1,
            hooks
        )
    }

    fn decode(raw: &str) -> Option<Vec<PoolInfo>> {
        match serde_json::from_str(raw) {
            Ok(pools) => Some(pools),
            Err(e) => {
                // Deserialisation failure is a miss: refetch, overwrite.
                warn!("Discarding undecodable pool cache entry: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl PoolDiscoverer for CachingPoolDiscoverer {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_pools(&self, chain: Chain, protocol: Protocol) -> Result<Vec<PoolInfo>> {
        let key = self.all_pools_key(chain, protocol);
        if let Some(raw) = self.all_pools.get(&key).await {
            if let Some(pools) = Self::decode(&raw) {
                Metrics::incr(&self.metrics.pool_cache_hits);
                return Ok(pools);
            }
            self.all_pools.invalidate(&key).await;
        }
        Metrics::incr(&self.metrics.pool_cache_misses);
        let pools = self.inner.get_pools(chain, protocol).await?;
        if let Ok(raw) = serde_json::to_string(&pools) {
            self.all_pools.insert(key, Arc::new(raw)).await;
        }
        Ok(pools)
    }

    async fn get_pools_for_tokens(&self, query: &PoolQuery) -> Result<Vec<PoolInfo>> {
        let key = Self::tokens_key(
            self.inner.name(),
            query.chain,
            query.protocol,
            query.token_in,
            query.token_out,
            query.hooks,
        );
        if !query.skip_token_cache {
            if let Some(raw) = self.token_pools.get(&key).await {
                if let Some(pools) = Self::decode(&raw) {
                    Metrics::incr(&self.metrics.pool_cache_hits);
                    return Ok(pools);
                }
                self.token_pools.invalidate(&key).await;
            }
        } else {
            debug!("Token-pool cache read skipped for {}", key);
        }
        Metrics::incr(&self.metrics.pool_cache_misses);
        let pools = self.inner.get_pools_for_tokens(query).await?;
        // Result is written even when the read was skipped.
        if let Ok(raw) = serde_json::to_string(&pools) {
            self.token_pools.insert(key, Arc::new(raw)).await;
        }
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::StaticPoolDiscoverer;
    use super::*;

    fn caching(inner: Arc<StaticPoolDiscoverer>) -> CachingPoolDiscoverer {
        CachingPoolDiscoverer::new(inner, &CacheConfig::default(), Arc::new(Metrics::new()))
    }

    #[test]
    fn test_tokens_key_is_symmetric() {
        let a = addr(1);
        let b = addr(2);
        let key_ab = CachingPoolDiscoverer::tokens_key(
            "indexer",
            Chain::Mainnet,
            Protocol::V3,
            a,
            b,
            HooksOption::HooksInclusive,
        );
        let key_ba = CachingPoolDiscoverer::tokens_key(
            "indexer",
            Chain::Mainnet,
            Protocol::V3,
            b,
            a,
            HooksOption::HooksInclusive,
        );
        assert_eq!(key_ab, key_ba);
    }

    #[test]
    fn test_tokens_key_embeds_discoverer_name() {
        let a = addr(1);
        let b = addr(2);
        let key_x = CachingPoolDiscoverer::tokens_key(
            "indexer",
            Chain::Mainnet,
            Protocol::V3,
            a,
            b,
            HooksOption::HooksInclusive,
        );
        let key_y = CachingPoolDiscoverer::tokens_key(
            "other",
            Chain::Mainnet,
            Protocol::V3,
            a,
            b,
            HooksOption::HooksInclusive,
        );
        assert_ne!(key_x, key_y);
    }

    #[tokio::test]
    async fn test_read_through_serves_cached_copy() {
        let inner = Arc::new(StaticPoolDiscoverer::new("static-test"));
        inner
            .set_pools(
                Chain::Mainnet,
                Protocol::V2,
                vec![v2_info(addr(1), addr(2), 10.0)],
            )
            .await;
        let cached = caching(inner.clone());

        let first = cached.get_pools(Chain::Mainnet, Protocol::V2).await.expect("pools");
        assert_eq!(first.len(), 1);

        // Mutate the source; the cached copy must still be served.
        inner.set_pools(Chain::Mainnet, Protocol::V2, vec![]).await;
        let second = cached.get_pools(Chain::Mainnet, Protocol::V2).await.expect("pools");
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_skip_token_cache_bypasses_read_but_writes() {
        let inner = Arc::new(StaticPoolDiscoverer::new("static-test"));
        inner
            .set_pools(
                Chain::Mainnet,
                Protocol::V2,
                vec![v2_info(addr(1), addr(2), 10.0)],
            )
            .await;
        let cached = caching(inner.clone());

        let mut query = PoolQuery {
            chain: Chain::Mainnet,
            protocol: Protocol::V2,
            token_in: addr(1),
            token_out: addr(2),
            hooks: HooksOption::HooksInclusive,
            skip_token_cache: true,
        };
        let fresh = cached.get_pools_for_tokens(&query).await.expect("pools");
        assert_eq!(fresh.len(), 1);

        // The bypassing call still wrote the entry; a normal read now hits
        // it even after the source changes.
        inner.set_pools(Chain::Mainnet, Protocol::V2, vec![]).await;
        query.skip_token_cache = false;
        let hit = cached.get_pools_for_tokens(&query).await.expect("pools");
        assert_eq!(hit.len(), 1);
    }
}
