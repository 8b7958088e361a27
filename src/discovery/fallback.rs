//! Primary/fallback discovery composition
//!
//! The fallback fires when the primary throws OR returns an empty set.
//! Primary errors are logged and swallowed; fallback errors propagate to
//! the caller.

use super::{PoolDiscoverer, PoolQuery};
use crate::chains::Chain;
use crate::metrics::Metrics;
use crate::types::{PoolInfo, Protocol};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub struct FallbackPoolDiscoverer {
    primary: Arc<dyn PoolDiscoverer>,
    fallback: Arc<dyn PoolDiscoverer>,
    metrics: Arc<Metrics>,
}

impl FallbackPoolDiscoverer {
    pub fn new(
        primary: Arc<dyn PoolDiscoverer>,
        fallback: Arc<dyn PoolDiscoverer>,
        metrics: Arc<Metrics>,
    ) -> FallbackPoolDiscoverer {
        FallbackPoolDiscoverer {
            primary,
            fallback,
            metrics,
        }
    }
}

#[async_trait]
impl PoolDiscoverer for FallbackPoolDiscoverer {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn get_pools(&self, chain: Chain, protocol: Protocol) -> Result<Vec<PoolInfo>> {
        match self.primary.get_pools(chain, protocol).await {
            Ok(pools) if !pools.is_empty() => return Ok(pools),
            Ok(_) => {
                warn!(
                    "Primary discoverer {} returned no {} pools for {}; using {}",
                    self.primary.name(),
                    protocol,
                    chain,
                    self.fallback.name()
                );
            }
            Err(e) => {
                warn!(
                    "Primary discoverer {} failed for {} {}: {:#}; using {}",
                    self.primary.name(),
                    chain,
                    protocol,
                    e,
                    self.fallback.name()
                );
            }
        }
        Metrics::incr(&self.metrics.discovery_fallbacks);
        self.fallback.get_pools(chain, protocol).await
    }

    async fn get_pools_for_tokens(&self, query: &PoolQuery) -> Result<Vec<PoolInfo>> {
        match self.primary.get_pools_for_tokens(query).await {
            Ok(pools) if !pools.is_empty() => return Ok(pools),
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Primary discoverer {} failed for pair query on {}: {:#}",
                    self.primary.name(),
                    query.chain,
                    e
                );
            }
        }
        Metrics::incr(&self.metrics.discovery_fallbacks);
        self.fallback.get_pools_for_tokens(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::StaticPoolDiscoverer;
    use super::*;

    struct FailingDiscoverer;

    #[async_trait]
    impl PoolDiscoverer for FailingDiscoverer {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn get_pools(&self, _: Chain, _: Protocol) -> Result<Vec<PoolInfo>> {
            anyhow::bail!("indexer unreachable")
        }
        async fn get_pools_for_tokens(&self, _: &PoolQuery) -> Result<Vec<PoolInfo>> {
            anyhow::bail!("indexer unreachable")
        }
    }

    #[tokio::test]
    async fn test_primary_error_swallowed_fallback_served() {
        let fallback = Arc::new(StaticPoolDiscoverer::new("static-test"));
        fallback
            .set_pools(
                Chain::Mainnet,
                Protocol::V2,
                vec![v2_info(addr(1), addr(2), 10.0)],
            )
            .await;
        let composed = FallbackPoolDiscoverer::new(
            Arc::new(FailingDiscoverer),
            fallback,
            Arc::new(Metrics::new()),
        );
        let pools = composed
            .get_pools(Chain::Mainnet, Protocol::V2)
            .await
            .expect("fallback result");
        assert_eq!(pools.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_primary_triggers_fallback() {
        let primary = Arc::new(StaticPoolDiscoverer::new("primary"));
        let fallback = Arc::new(StaticPoolDiscoverer::new("secondary"));
        fallback
            .set_pools(
                Chain::Mainnet,
                Protocol::V3,
                vec![v3_info(addr(1), addr(2), 500, 10.0)],
            )
            .await;
        let composed =
            FallbackPoolDiscoverer::new(primary, fallback, Arc::new(Metrics::new()));
        let pools = composed
            .get_pools(Chain::Mainnet, Protocol::V3)
            .await
            .expect("fallback result");
        assert_eq!(pools.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_error_propagates() {
        let composed = FallbackPoolDiscoverer::new(
            Arc::new(FailingDiscoverer),
            Arc::new(FailingDiscoverer),
            Arc::new(Metrics::new()),
        );
        assert!(composed.get_pools(Chain::Mainnet, Protocol::V2).await.is_err());
    }
}
