//! Protocol dispatch for pool discovery
//!
//! Routes a query to the per-protocol discoverer and always unions in
//! the deterministic direct synthesiser, so a pool deployed seconds ago
//! can still be swapped through. Results are de-duplicated by address
//! (pool id for V4) with the indexed copy winning over the synthesised
//! one, since only the indexed copy carries TVL.

use super::{filter_hooks, PoolDiscoverer, PoolQuery};
use crate::chains::Chain;
use crate::types::{PoolInfo, Protocol};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct DispatchingPoolDiscoverer {
    v2: Arc<dyn PoolDiscoverer>,
    v3: Arc<dyn PoolDiscoverer>,
    v4: Arc<dyn PoolDiscoverer>,
    direct: Arc<dyn PoolDiscoverer>,
}

impl DispatchingPoolDiscoverer {
    pub fn new(
        v2: Arc<dyn PoolDiscoverer>,
        v3: Arc<dyn PoolDiscoverer>,
        v4: Arc<dyn PoolDiscoverer>,
        direct: Arc<dyn PoolDiscoverer>,
    ) -> DispatchingPoolDiscoverer {
        DispatchingPoolDiscoverer { v2, v3, v4, direct }
    }

    fn for_protocol(&self, protocol: Protocol) -> Option<&Arc<dyn PoolDiscoverer>> {
        match protocol {
            Protocol::V2 => Some(&self.v2),
            Protocol::V3 => Some(&self.v3),
            Protocol::V4 => Some(&self.v4),
            Protocol::Mixed => None,
        }
    }

    fn identity(pool: &PoolInfo) -> String {
        match pool.pool_id {
            Some(id) => format!("{:#x}", id),
            None => format!("{:#x}", pool.address),
        }
    }
}

#[async_trait]
impl PoolDiscoverer for DispatchingPoolDiscoverer {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn get_pools(&self, chain: Chain, protocol: Protocol) -> Result<Vec<PoolInfo>> {
        match self.for_protocol(protocol) {
            Some(discoverer) => discoverer.get_pools(chain, protocol).await,
            None => Ok(Vec::new()),
        }
    }

    async fn get_pools_for_tokens(&self, query: &PoolQuery) -> Result<Vec<PoolInfo>> {
        let Some(discoverer) = self.for_protocol(query.protocol) else {
            return Ok(Vec::new());
        };

        let (indexed, direct) = tokio::join!(
            discoverer.get_pools_for_tokens(query),
            self.direct.get_pools_for_tokens(query)
        );
        let indexed = indexed?;
        // Direct synthesis is additive only; its failure never fails the
        // query.
        let direct = direct.unwrap_or_else(|e| {
            debug!("Direct pool synthesis failed: {:#}", e);
            Vec::new()
        });

        let mut seen: HashSet<String> = HashSet::new();
        let mut merged = Vec::with_capacity(indexed.len() + direct.len());
        for pool in indexed.into_iter().chain(direct.into_iter()) {
            if seen.insert(Self::identity(&pool)) {
                merged.push(pool);
            }
        }
        Ok(filter_hooks(merged, query.hooks))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::StaticPoolDiscoverer;
    use super::*;
    use crate::types::HooksOption;

    fn dispatcher(
        v2: Arc<StaticPoolDiscoverer>,
        direct: Arc<StaticPoolDiscoverer>,
    ) -> DispatchingPoolDiscoverer {
        DispatchingPoolDiscoverer::new(
            v2,
            Arc::new(StaticPoolDiscoverer::new("v3-src")),
            Arc::new(StaticPoolDiscoverer::new("v4-src")),
            direct,
        )
    }

    #[tokio::test]
    async fn test_direct_pools_are_unioned_and_deduped() {
        let v2 = Arc::new(StaticPoolDiscoverer::new("v2-src"));
        let shared = v2_info(addr(1), addr(2), 50.0);
        v2.set_pools(Chain::Mainnet, Protocol::V2, vec![shared.clone()])
            .await;

        let direct = Arc::new(StaticPoolDiscoverer::new("direct-src"));
        let mut duplicate = shared.clone();
        duplicate.tvl_eth = 0.0; // synthesised copy carries no TVL
        let brand_new = v2_info(addr(1), addr(7), 0.0);
        direct
            .set_pools(Chain::Mainnet, Protocol::V2, vec![duplicate, brand_new])
            .await;

        let query = PoolQuery {
            chain: Chain::Mainnet,
            protocol: Protocol::V2,
            token_in: addr(1),
            token_out: addr(2),
            hooks: HooksOption::HooksInclusive,
            skip_token_cache: false,
        };
        let pools = dispatcher(v2, direct)
            .get_pools_for_tokens(&query)
            .await
            .expect("pools");
        assert_eq!(pools.len(), 2);
        // Indexed copy wins the dedup: TVL survives
        let dup = pools
            .iter()
            .find(|p| p.involves(&addr(2)))
            .expect("shared pool");
        assert!(dup.tvl_eth > 0.0);
    }

    #[tokio::test]
    async fn test_mixed_protocol_queries_yield_nothing() {
        let query = PoolQuery {
            chain: Chain::Mainnet,
            protocol: Protocol::Mixed,
            token_in: addr(1),
            token_out: addr(2),
            hooks: HooksOption::HooksInclusive,
            skip_token_cache: false,
        };
        let v2 = Arc::new(StaticPoolDiscoverer::new("v2-src"));
        let direct = Arc::new(StaticPoolDiscoverer::new("direct-src"));
        let pools = dispatcher(v2, direct)
            .get_pools_for_tokens(&query)
            .await
            .expect("pools");
        assert!(pools.is_empty());
    }
}
