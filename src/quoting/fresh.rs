//! Final-route pool freshness
//!
//! The pipeline runs on cached pool snapshots. Once a winner is chosen,
//! this wrapper re-reads state for exactly the pools on the winning
//! routes. This is the only place on-chain pool state is re-read; a
//! failed read keeps the snapshot values.

use crate::chains::Chain;
use crate::contracts::{IStateView, IUniswapV2Pair, IUniswapV3Pool};
use crate::tokens::ChainProviders;
use crate::types::{Pool, Route};
use alloy::primitives::U256;
use std::sync::Arc;
use tracing::debug;

pub struct FreshPoolDetailsWrapper {
    providers: Arc<ChainProviders>,
}

impl FreshPoolDetailsWrapper {
    pub fn new(providers: Arc<ChainProviders>) -> FreshPoolDetailsWrapper {
        FreshPoolDetailsWrapper { providers }
    }

    pub async fn refresh_routes(&self, chain: Chain, routes: &mut [Route]) {
        for route in routes.iter_mut() {
            for pool in route.pools.iter_mut() {
                if pool.is_synthetic_native_wrapper() {
                    continue;
                }
                self.refresh_pool(chain, pool).await;
            }
        }
    }

    async fn refresh_pool(&self, chain: Chain, pool: &mut Pool) {
        let Some(provider) = self.providers.get(chain) else {
            return;
        };
        match pool {
            Pool::V2(p) => {
                let pair = IUniswapV2Pair::new(p.address, provider.clone());
                match pair.getReserves().call().await {
                    Ok(reserves) => {
                        p.reserve0 = reserves.reserve0.to::<u128>();
                        p.reserve1 = reserves.reserve1.to::<u128>();
                    }
                    Err(e) => debug!("Reserve refresh failed for {:#x}: {}", p.address, e),
                }
            }
            Pool::V3(p) => {
                let contract = IUniswapV3Pool::new(p.address, provider.clone());
                match contract.slot0().call().await {
                    Ok(slot0) => {
                        p.sqrt_price_x96 = U256::from(slot0.sqrtPriceX96);
                        p.tick_current = slot0.tick.as_i32();
                    }
                    Err(e) => debug!("slot0 refresh failed for {:#x}: {}", p.address, e),
                }
                if let Ok(liquidity) = contract.liquidity().call().await {
                    p.liquidity = liquidity;
                }
            }
            Pool::V4(p) => {
                let state_view = IStateView::new(chain.info().v4_state_view, provider.clone());
                match state_view.getSlot0(p.pool_id).call().await {
                    Ok(slot0) => {
                        p.sqrt_price_x96 = U256::from(slot0.sqrtPriceX96);
                        p.tick_current = slot0.tick.as_i32();
                    }
                    Err(e) => debug!("V4 slot0 refresh failed for {:#x}: {}", p.pool_id, e),
                }
                if let Ok(liquidity) = state_view.getLiquidity(p.pool_id).call().await {
                    p.liquidity = liquidity;
                }
            }
        }
    }
}
