//! Indexer-backed pool discovery
//!
//! Primary pool source: an HTTP indexer that serves PoolInfo projections
//! ranked by TVL. The indexer lags the chain by design; the direct-pool
//! synthesiser covers pools it has not observed yet.

use super::{filter_hooks, filter_unsupported, PoolDiscoverer, PoolQuery};
use crate::chains::Chain;
use crate::types::{PoolInfo, Protocol};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

pub struct IndexerPoolDiscoverer {
    client: reqwest::Client,
    base_url: String,
}

impl IndexerPoolDiscoverer {
    pub fn new(base_url: String) -> IndexerPoolDiscoverer {
        IndexerPoolDiscoverer {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PoolDiscoverer for IndexerPoolDiscoverer {
    fn name(&self) -> &'static str {
        "indexer"
    }

    async fn get_pools(&self, chain: Chain, protocol: Protocol) -> Result<Vec<PoolInfo>> {
        let url = format!(
            "{}/pools?chainId={}&protocol={}",
            self.base_url,
            chain.id(),
            protocol.to_string().to_lowercase()
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Indexer request failed")?
            .error_for_status()
            .context("Indexer returned an error status")?;
        let pools: Vec<PoolInfo> = response
            .json()
            .await
            .context("Indexer returned malformed pool JSON")?;
        debug!(
            "Indexer returned {} {} pools for {}",
            pools.len(),
            protocol,
            chain
        );
        Ok(filter_unsupported(pools))
    }

    async fn get_pools_for_tokens(&self, query: &PoolQuery) -> Result<Vec<PoolInfo>> {
        let url = format!(
            "{}/pools?chainId={}&protocol={}&token0={:#x}&token1={:#x}",
            self.base_url,
            query.chain.id(),
            query.protocol.to_string().to_lowercase(),
            query.token_in.min(query.token_out),
            query.token_in.max(query.token_out),
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Indexer request failed")?
            .error_for_status()
            .context("Indexer returned an error status")?;
        let pools: Vec<PoolInfo> = response
            .json()
            .await
            .context("Indexer returned malformed pool JSON")?;
        Ok(filter_hooks(filter_unsupported(pools), query.hooks))
    }
}

/// Fixed-table discoverer. Serves as the dev/test source and as the
/// fallback behind the indexer when one is configured.
pub struct StaticPoolDiscoverer {
    name: &'static str,
    pools: RwLock<HashMap<(u64, Protocol), Vec<PoolInfo>>>,
}

impl StaticPoolDiscoverer {
    pub fn new(name: &'static str) -> StaticPoolDiscoverer {
        StaticPoolDiscoverer {
            name,
            pools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set_pools(&self, chain: Chain, protocol: Protocol, pools: Vec<PoolInfo>) {
        self.pools
            .write()
            .await
            .insert((chain.id(), protocol), pools);
    }
}

#[async_trait]
impl PoolDiscoverer for StaticPoolDiscoverer {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_pools(&self, chain: Chain, protocol: Protocol) -> Result<Vec<PoolInfo>> {
        let pools = self
            .pools
            .read()
            .await
            .get(&(chain.id(), protocol))
            .cloned()
            .unwrap_or_default();
        Ok(filter_unsupported(pools))
    }

    async fn get_pools_for_tokens(&self, query: &PoolQuery) -> Result<Vec<PoolInfo>> {
        let all = self.get_pools(query.chain, query.protocol).await?;
        let relevant = all
            .into_iter()
            .filter(|p| p.involves(&query.token_in) || p.involves(&query.token_out))
            .collect();
        Ok(filter_hooks(relevant, query.hooks))
    }
}
