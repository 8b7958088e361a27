//! Deterministic direct-pool synthesis
//!
//! Pool addresses for a token pair are computable offline: V2 and V3 via
//! CREATE2 against the factory, V4 via the pool-id hash. Synthesising
//! them lets a brand-new pool be swapped through before any indexer has
//! observed it. State for each candidate is read on-chain; candidates
//! that revert (pool never deployed) are skipped.

use super::{filter_unsupported, PoolDiscoverer, PoolQuery};
use crate::chains::Chain;
use crate::contracts::{IStateView, IUniswapV2Pair, IUniswapV3Pool};
use crate::tokens::ChainProviders;
use crate::types::{HooksOption, PoolInfo, Protocol};
use alloy::primitives::{keccak256, Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// V3 fee tiers probed for direct pools.
const V3_FEE_TIERS: [u32; 4] = [100, 500, 3_000, 10_000];

/// V4 (fee, tickSpacing) tuples probed for direct pools. Hooked pools
/// cannot be synthesised — the hook address is free-form — so only
/// hook-less candidates are generated.
const V4_FEE_TIERS: [(u32, i32); 4] = [(100, 1), (500, 10), (3_000, 60), (10_000, 200)];

/// CREATE2 pair address for a V2 factory.
pub fn v2_pair_address(chain: Chain, token_a: Address, token_b: Address) -> Address {
    let info = chain.info();
    let (token0, token1) = sort_tokens(token_a, token_b);
    let mut packed = [0u8; 40];
    packed[..20].copy_from_slice(token0.as_slice());
    packed[20..].copy_from_slice(token1.as_slice());
    let salt = keccak256(packed);
    create2(info.v2_factory, salt, info.v2_init_code_hash)
}

/// CREATE2 pool address for a V3 factory and fee tier.
pub fn v3_pool_address(chain: Chain, token_a: Address, token_b: Address, fee: u32) -> Address {
    let info = chain.info();
    let (token0, token1) = sort_tokens(token_a, token_b);
    // abi.encode(token0, token1, fee): three 32-byte words
    let mut words = [0u8; 96];
    words[12..32].copy_from_slice(token0.as_slice());
    words[44..64].copy_from_slice(token1.as_slice());
    words[64..96].copy_from_slice(&U256::from(fee).to_be_bytes::<32>());
    let salt = keccak256(words);
    create2(info.v3_factory, salt, info.v3_init_code_hash)
}

/// V4 singleton pool id: keccak over the full pool key.
pub fn v4_pool_id(
    token0: Address,
    token1: Address,
    fee: u32,
    tick_spacing: i32,
    hooks: Address,
) -> B256 {
    // abi.encode(currency0, currency1, fee, tickSpacing, hooks)
    let mut words = [0u8; 160];
    words[12..32].copy_from_slice(token0.as_slice());
    words[44..64].copy_from_slice(token1.as_slice());
    words[64..96].copy_from_slice(&U256::from(fee).to_be_bytes::<32>());
    let spacing = U256::from_be_bytes({
        let mut buf = [0u8; 32];
        let val = tick_spacing as i64;
        // int24, sign-extended into the word
        if val < 0 {
            buf = [0xffu8; 32];
        }
        buf[24..].copy_from_slice(&(val as u64).to_be_bytes());
        buf
    });
    words[96..128].copy_from_slice(&spacing.to_be_bytes::<32>());
    words[140..160].copy_from_slice(hooks.as_slice());
    keccak256(words)
}

fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn create2(deployer: Address, salt: B256, init_code_hash: B256) -> Address {
    let mut packed = [0u8; 85];
    packed[0] = 0xff;
    packed[1..21].copy_from_slice(deployer.as_slice());
    packed[21..53].copy_from_slice(salt.as_slice());
    packed[53..85].copy_from_slice(init_code_hash.as_slice());
    Address::from_slice(&keccak256(packed)[12..])
}

/// Discoverer that synthesises deterministic direct pools and reads their
/// state on-chain. Only answers token-pair queries; the all-pools surface
/// is empty by construction.
pub struct DirectPoolDiscoverer {
    providers: Arc<ChainProviders>,
}

impl DirectPoolDiscoverer {
    pub fn new(providers: Arc<ChainProviders>) -> DirectPoolDiscoverer {
        DirectPoolDiscoverer { providers }
    }

    /// The candidate direct pools for a pair, without state. Exposed so
    /// the top-pools selector can re-append synthesised pools when the
    /// ranked direct slice comes back empty.
    pub fn candidates(
        chain: Chain,
        token_a: Address,
        token_b: Address,
        protocol: Protocol,
        hooks: HooksOption,
    ) -> Vec<PoolInfo> {
        let (token0, token1) = sort_tokens(token_a, token_b);
        let mut out = Vec::new();
        match protocol {
            Protocol::V2 => {
                out.push(PoolInfo {
                    protocol: Protocol::V2,
                    address: v2_pair_address(chain, token0, token1),
                    token0,
                    token1,
                    reserve0: Some(0),
                    reserve1: Some(0),
                    fee: None,
                    liquidity: None,
                    sqrt_price_x96: None,
                    tick_current: None,
                    tick_spacing: None,
                    hooks: None,
                    pool_id: None,
                    tvl_eth: 0.0,
                    tvl_usd: 0.0,
                });
            }
            Protocol::V3 => {
                for fee in V3_FEE_TIERS {
                    out.push(PoolInfo {
                        protocol: Protocol::V3,
                        address: v3_pool_address(chain, token0, token1, fee),
                        token0,
                        token1,
                        reserve0: None,
                        reserve1: None,
                        fee: Some(fee),
                        liquidity: Some(0),
                        sqrt_price_x96: Some(U256::ZERO),
                        tick_current: Some(0),
                        tick_spacing: None,
                        hooks: None,
                        pool_id: None,
                        tvl_eth: 0.0,
                        tvl_usd: 0.0,
                    });
                }
            }
            Protocol::V4 => {
                if hooks == HooksOption::HooksOnly {
                    return out; // hooked pool ids are not synthesisable
                }
                for (fee, tick_spacing) in V4_FEE_TIERS {
                    let pool_id = v4_pool_id(token0, token1, fee, tick_spacing, Address::ZERO);
                    out.push(PoolInfo {
                        protocol: Protocol::V4,
                        address: Address::ZERO, // singleton: the id is the identity
                        token0,
                        token1,
                        reserve0: None,
                        reserve1: None,
                        fee: Some(fee),
                        liquidity: Some(0),
                        sqrt_price_x96: Some(U256::ZERO),
                        tick_current: Some(0),
                        tick_spacing: Some(tick_spacing),
                        hooks: Some(Address::ZERO),
                        pool_id: Some(pool_id),
                        tvl_eth: 0.0,
                        tvl_usd: 0.0,
                    });
                }
            }
            Protocol::Mixed => {}
        }
        out
    }

    async fn hydrate(&self, chain: Chain, candidate: PoolInfo) -> Option<PoolInfo> {
        let provider = self.providers.get(chain)?;
        let mut info = candidate;
        match info.protocol {
            Protocol::V2 => {
                let pair = IUniswapV2Pair::new(info.address, provider.clone());
                let reserves = pair.getReserves().call().await.ok()?;
                info.reserve0 = Some(reserves.reserve0.to::<u128>());
                info.reserve1 = Some(reserves.reserve1.to::<u128>());
            }
            Protocol::V3 => {
                let pool = IUniswapV3Pool::new(info.address, provider.clone());
                let slot0 = pool.slot0().call().await.ok()?;
                let liquidity = pool.liquidity().call().await.ok()?;
                info.sqrt_price_x96 = Some(U256::from(slot0.sqrtPriceX96));
                info.tick_current = Some(slot0.tick.as_i32());
                info.liquidity = Some(liquidity);
            }
            Protocol::V4 => {
                let state_view = IStateView::new(chain.info().v4_state_view, provider.clone());
                let pool_id = info.pool_id?;
                let slot0 = state_view.getSlot0(pool_id).call().await.ok()?;
                let liquidity = state_view.getLiquidity(pool_id).call().await.ok()?;
                info.sqrt_price_x96 = Some(U256::from(slot0.sqrtPriceX96));
                info.tick_current = Some(slot0.tick.as_i32());
                info.liquidity = Some(liquidity);
            }
            Protocol::Mixed => return None,
        }
        Some(info)
    }
}

#[async_trait]
impl PoolDiscoverer for DirectPoolDiscoverer {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn get_pools(&self, _chain: Chain, _protocol: Protocol) -> Result<Vec<PoolInfo>> {
        // Direct pools only exist relative to a token pair.
        Ok(Vec::new())
    }

    async fn get_pools_for_tokens(&self, query: &PoolQuery) -> Result<Vec<PoolInfo>> {
        if self.providers.get(query.chain).is_none() {
            debug!("No provider for {}; skipping direct synthesis", query.chain);
            return Ok(Vec::new());
        }
        let candidates = Self::candidates(
            query.chain,
            query.token_in,
            query.token_out,
            query.protocol,
            query.hooks,
        );
        let hydrated = join_all(
            candidates
                .into_iter()
                .map(|c| self.hydrate(query.chain, c)),
        )
        .await;
        let pools: Vec<PoolInfo> = hydrated.into_iter().flatten().collect();
        Ok(filter_unsupported(pools))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    // Canonical mainnet deployments make CREATE2 verifiable offline.
    const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
    const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    #[test]
    fn test_v2_pair_address_matches_mainnet() {
        let pair = v2_pair_address(Chain::Mainnet, WETH, USDC);
        assert_eq!(
            pair,
            address!("B4e16d0168e52d35CaCD2c6185b44281Ec28C9Dc")
        );
        // Argument order must not matter
        assert_eq!(pair, v2_pair_address(Chain::Mainnet, USDC, WETH));
    }

    #[test]
    fn test_v3_pool_address_matches_mainnet() {
        let pool_30bps = v3_pool_address(Chain::Mainnet, USDC, WETH, 3_000);
        assert_eq!(
            pool_30bps,
            address!("8ad599c3A0ff1De082011EFDDc58f1908eb6e6D8")
        );
        let pool_5bps = v3_pool_address(Chain::Mainnet, USDC, WETH, 500);
        assert_eq!(
            pool_5bps,
            address!("88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640")
        );
    }

    #[test]
    fn test_v4_pool_id_depends_on_full_key() {
        let base = v4_pool_id(USDC, WETH, 3_000, 60, Address::ZERO);
        assert_ne!(base, v4_pool_id(USDC, WETH, 500, 60, Address::ZERO));
        assert_ne!(base, v4_pool_id(USDC, WETH, 3_000, 10, Address::ZERO));
        assert_ne!(
            base,
            v4_pool_id(USDC, WETH, 3_000, 60, Address::repeat_byte(1))
        );
    }

    #[test]
    fn test_candidates_respect_hooks_only() {
        let none = DirectPoolDiscoverer::candidates(
            Chain::Mainnet,
            USDC,
            WETH,
            Protocol::V4,
            HooksOption::HooksOnly,
        );
        assert!(none.is_empty());
        let some = DirectPoolDiscoverer::candidates(
            Chain::Mainnet,
            USDC,
            WETH,
            Protocol::V4,
            HooksOption::NoHooks,
        );
        assert_eq!(some.len(), V4_FEE_TIERS.len());
    }
}
