//! Pool discovery
//!
//! Produces candidate pool sets for a (chain, protocol, tokenIn, tokenOut)
//! query. Concrete sources are composed in layers: read-through caching,
//! primary/fallback, and a protocol dispatcher that always unions in the
//! deterministic direct-pool synthesiser.

pub mod cache;
pub mod direct;
pub mod dispatch;
pub mod fallback;
pub mod indexer;
pub mod top_pools;

pub use cache::CachingPoolDiscoverer;
pub use direct::DirectPoolDiscoverer;
pub use dispatch::DispatchingPoolDiscoverer;
pub use fallback::FallbackPoolDiscoverer;
pub use indexer::{IndexerPoolDiscoverer, StaticPoolDiscoverer};
pub use top_pools::TopPoolsSelector;

use crate::chains::Chain;
use crate::types::{HooksOption, PoolInfo, Protocol};
use alloy::primitives::{address, Address};
use anyhow::Result;
use async_trait::async_trait;

/// A tokens-specific discovery query.
#[derive(Debug, Clone)]
pub struct PoolQuery {
    pub chain: Chain,
    pub protocol: Protocol,
    pub token_in: Address,
    pub token_out: Address,
    pub hooks: HooksOption,
    /// Bypass the tokens-specific cache read (the result is still written).
    pub skip_token_cache: bool,
}

/// Pool source contract. Every concrete discoverer identifies itself with
/// a stable name; cache keys embed that name so competing implementations
/// never collide.
#[async_trait]
pub trait PoolDiscoverer: Send + Sync {
    fn name(&self) -> &'static str;

    /// The full pool set for one chain and protocol.
    async fn get_pools(&self, chain: Chain, protocol: Protocol) -> Result<Vec<PoolInfo>>;

    /// Pools relevant to a specific token pair.
    async fn get_pools_for_tokens(&self, query: &PoolQuery) -> Result<Vec<PoolInfo>>;
}

/// Tokens that no discoverer may ever return: rebasing or self-destructing
/// contracts that break swap accounting everywhere, not just on V3.
static UNSUPPORTED_TOKENS: &[Address] = &[
    // AMPL
    address!("D46bA6D942050d489DBd938a2C909A5d5039A161"),
    // stETH (rebasing; wstETH routes fine)
    address!("ae7ab96520DE3A18E5e111B5EaAb095312D7fE84"),
];

/// Drop pools touching a token we refuse to route through. Applied after
/// every discovery call, regardless of source.
pub fn filter_unsupported(pools: Vec<PoolInfo>) -> Vec<PoolInfo> {
    pools
        .into_iter()
        .filter(|p| {
            !UNSUPPORTED_TOKENS.contains(&p.token0) && !UNSUPPORTED_TOKENS.contains(&p.token1)
        })
        .collect()
}

/// Apply a V4 hook filter to a pool list. Non-V4 pools pass through.
pub fn filter_hooks(pools: Vec<PoolInfo>, hooks: HooksOption) -> Vec<PoolInfo> {
    pools
        .into_iter()
        .filter(|p| {
            if p.protocol != Protocol::V4 {
                return true;
            }
            hooks.admits(&p.hooks.unwrap_or(Address::ZERO))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use alloy::primitives::U256;

    pub fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from(bytes)
    }

    pub fn v2_info(a: Address, b: Address, tvl: f64) -> PoolInfo {
        let (token0, token1) = if a < b { (a, b) } else { (b, a) };
        let mut raw = [0u8; 20];
        raw[0] = 0x20;
        raw[18] = token0.0[19];
        raw[19] = token1.0[19];
        PoolInfo {
            protocol: Protocol::V2,
            address: Address::from(raw),
            token0,
            token1,
            reserve0: Some(1_000_000),
            reserve1: Some(1_000_000),
            fee: None,
            liquidity: None,
            sqrt_price_x96: None,
            tick_current: None,
            tick_spacing: None,
            hooks: None,
            pool_id: None,
            tvl_eth: tvl,
            tvl_usd: tvl * 3_300.0,
        }
    }

    pub fn v3_info(a: Address, b: Address, fee: u32, tvl: f64) -> PoolInfo {
        let (token0, token1) = if a < b { (a, b) } else { (b, a) };
        let mut raw = [0u8; 20];
        raw[0] = 0x30;
        raw[17] = (fee / 100) as u8;
        raw[18] = token0.0[19];
        raw[19] = token1.0[19];
        PoolInfo {
            protocol: Protocol::V3,
            address: Address::from(raw),
            token0,
            token1,
            reserve0: None,
            reserve1: None,
            fee: Some(fee),
            liquidity: Some(1_000_000),
            sqrt_price_x96: Some(U256::from(1u128 << 96)),
            tick_current: Some(0),
            tick_spacing: None,
            hooks: None,
            pool_id: None,
            tvl_eth: tvl,
            tvl_usd: tvl * 3_300.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;

    #[test]
    fn test_unsupported_filter() {
        let ampl = address!("D46bA6D942050d489DBd938a2C909A5d5039A161");
        let pools = vec![v2_info(addr(1), addr(2), 10.0), v2_info(ampl, addr(2), 10.0)];
        let kept = filter_unsupported(pools);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].token0, addr(1));
    }

    #[test]
    fn test_hook_filter_passes_non_v4() {
        let pools = vec![v2_info(addr(1), addr(2), 10.0)];
        assert_eq!(filter_hooks(pools, HooksOption::HooksOnly).len(), 1);
    }
}
