//! Gas-cost conversion into the quote token
//!
//! Gas is estimated in native wei; ranking needs it in the quote token.
//! The conversion quotes through the deepest native<->quote pool
//! available, preferring V3, then V2, then V4. A pathological mid-price
//! yields a zero conversion plus an error metric; the quote itself is
//! still returned.

use crate::chains::Chain;
use crate::metrics::Metrics;
use crate::tokens::TokenProvider;
use crate::types::{f64_to_u256, u256_to_f64, Pool, Protocol, QuoteSplit};
use alloy::primitives::{Address, U256};
use std::sync::Arc;
use tracing::debug;

pub struct GasConverter {
    token_provider: Arc<dyn TokenProvider>,
    metrics: Arc<Metrics>,
}

impl GasConverter {
    pub fn new(token_provider: Arc<dyn TokenProvider>, metrics: Arc<Metrics>) -> GasConverter {
        GasConverter {
            token_provider,
            metrics,
        }
    }

    /// Fill `gas_cost_in_quote_token` and `gas_cost_in_usd` on every quote
    /// of every candidate plan.
    pub async fn convert_splits(
        &self,
        chain: Chain,
        quote_token: Address,
        pools: &[Pool],
        splits: &mut [QuoteSplit],
    ) {
        let wrapped = chain.info().wrapped_native;
        let native_usd = self.token_provider.usd_price(chain, wrapped).await;

        let mid_price = if quote_token == wrapped {
            Some(1.0)
        } else {
            self.native_quote_price(chain, quote_token, pools)
        };

        for split in splits.iter_mut() {
            for quote in split.quotes.iter_mut() {
                let Some(gas) = quote.gas_details.as_mut() else {
                    continue;
                };
                gas.gas_cost_in_quote_token = match mid_price {
                    Some(price) if price.is_finite() && price > 0.0 => {
                        if quote_token == wrapped {
                            gas.gas_cost_in_wei
                        } else {
                            f64_to_u256(u256_to_f64(gas.gas_cost_in_wei) * price)
                        }
                    }
                    _ => {
                        Metrics::incr(&self.metrics.gas_conversion_failures);
                        U256::ZERO
                    }
                };
                gas.gas_cost_in_usd = native_usd
                    .map(|usd| usd * gas.gas_cost_in_eth)
                    .unwrap_or(0.0);
            }
        }
    }

    /// Raw native->quote mid-price through the deepest connector pool.
    fn native_quote_price(
        &self,
        chain: Chain,
        quote_token: Address,
        pools: &[Pool],
    ) -> Option<f64> {
        let wrapped = chain.info().wrapped_native;
        let pool = deepest_connector(wrapped, quote_token, pools)?;
        match pool.mid_price(&wrapped) {
            Some(price) => Some(price),
            None => {
                debug!(
                    "Pathological mid-price in connector pool {:#x}",
                    pool.address()
                );
                None
            }
        }
    }
}

/// The deepest pool joining the wrapped native to the quote token, in
/// priority order V3, V2, V4.
fn deepest_connector<'a>(
    wrapped: Address,
    quote_token: Address,
    pools: &'a [Pool],
) -> Option<&'a Pool> {
    for protocol in [Protocol::V3, Protocol::V2, Protocol::V4] {
        let best = pools
            .iter()
            .filter(|p| p.protocol() == protocol)
            .filter(|p| p.involves(&wrapped) && p.involves(&quote_token))
            .max_by_key(|p| depth(p));
        if best.is_some() {
            return best;
        }
    }
    None
}

fn depth(pool: &Pool) -> u128 {
    match pool {
        Pool::V2(p) => p.reserve0 / 2 + p.reserve1 / 2,
        Pool::V3(p) => p.liquidity,
        Pool::V4(p) => p.liquidity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::Chain;
    use crate::tokens::StaticTokenProvider;
    use crate::types::{GasDetails, Quote, Route, V2Pool, V3Pool};

    fn wrapped() -> Address {
        Chain::Mainnet.info().wrapped_native
    }

    fn quote_token() -> Address {
        Address::repeat_byte(0x77)
    }

    fn v2_connector(r_wrapped: u128, r_quote: u128, tag: u8) -> Pool {
        let (token0, token1, reserve0, reserve1) = if wrapped() < quote_token() {
            (wrapped(), quote_token(), r_wrapped, r_quote)
        } else {
            (quote_token(), wrapped(), r_quote, r_wrapped)
        };
        Pool::V2(V2Pool {
            address: Address::repeat_byte(tag),
            token0,
            token1,
            reserve0,
            reserve1,
        })
    }

    fn v3_connector(tick: i32, liquidity: u128, tag: u8) -> Pool {
        let (token0, token1) = if wrapped() < quote_token() {
            (wrapped(), quote_token())
        } else {
            (quote_token(), wrapped())
        };
        Pool::V3(V3Pool {
            address: Address::repeat_byte(tag),
            token0,
            token1,
            fee: 3_000,
            liquidity,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: tick,
        })
    }

    fn split_with_gas(gas_cost_wei: u64) -> QuoteSplit {
        let token_in = Address::repeat_byte(1);
        let token_out = quote_token();
        let pool = Pool::V2(V2Pool {
            address: Address::repeat_byte(0xee),
            token0: token_in.min(token_out),
            token1: token_in.max(token_out),
            reserve0: 1,
            reserve1: 1,
        });
        let mut gas = GasDetails::new(U256::from(1u64), gas_cost_wei);
        gas.gas_cost_in_wei = U256::from(gas_cost_wei);
        gas.gas_cost_in_eth = gas_cost_wei as f64 / 1e18;
        QuoteSplit::singleton(Quote {
            route: Route::new(Chain::Mainnet, vec![pool], token_in, token_out),
            amount: U256::from(100u64),
            quoted: U256::from(100u64),
            gas_details: Some(gas),
            ticks_crossed: Vec::new(),
        })
    }

    fn converter(metrics: Arc<Metrics>) -> GasConverter {
        GasConverter::new(Arc::new(StaticTokenProvider::new()), metrics)
    }

    #[tokio::test]
    async fn test_identity_when_quote_is_wrapped_native() {
        let metrics = Arc::new(Metrics::new());
        let mut splits = vec![split_with_gas(1_000_000)];
        converter(metrics)
            .convert_splits(Chain::Mainnet, wrapped(), &[], &mut splits)
            .await;
        let gas = splits[0].quotes[0].gas_details.as_ref().unwrap();
        assert_eq!(gas.gas_cost_in_quote_token, U256::from(1_000_000u64));
    }

    #[tokio::test]
    async fn test_v3_connector_preferred_over_deeper_v2() {
        let metrics = Arc::new(Metrics::new());
        // tick 0: mid-price 1.0 through V3; the V2 pool would price 2.0
        let pools = vec![
            v2_connector(1_000, 2_000, 0xa0),
            v3_connector(0, 10, 0xb0),
        ];
        let mut splits = vec![split_with_gas(500)];
        converter(metrics)
            .convert_splits(Chain::Mainnet, quote_token(), &pools, &mut splits)
            .await;
        let gas = splits[0].quotes[0].gas_details.as_ref().unwrap();
        assert_eq!(gas.gas_cost_in_quote_token, U256::from(500u64));
    }

    #[tokio::test]
    async fn test_pathological_pool_yields_zero_and_metric() {
        let metrics = Arc::new(Metrics::new());
        // Zero reserves on the wrapped side: the raw ratio degenerates
        let pools = vec![v2_connector(0, 0, 0xa0)];
        let mut splits = vec![split_with_gas(500)];
        converter(metrics.clone())
            .convert_splits(Chain::Mainnet, quote_token(), &pools, &mut splits)
            .await;
        let gas = splits[0].quotes[0].gas_details.as_ref().unwrap();
        assert_eq!(gas.gas_cost_in_quote_token, U256::ZERO);
        assert_eq!(
            metrics
                .gas_conversion_failures
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn test_usd_cost_follows_native_price() {
        let metrics = Arc::new(Metrics::new());
        // 0.001 ETH of gas at the seeded $3300 reference
        let mut splits = vec![split_with_gas(1_000_000_000_000_000)];
        converter(metrics)
            .convert_splits(Chain::Mainnet, wrapped(), &[], &mut splits)
            .await;
        let gas = splits[0].quotes[0].gas_details.as_ref().unwrap();
        assert!((gas.gas_cost_in_usd - 3.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_connector_yields_zero() {
        let metrics = Arc::new(Metrics::new());
        let mut splits = vec![split_with_gas(500)];
        converter(metrics.clone())
            .convert_splits(Chain::Mainnet, quote_token(), &[], &mut splits)
            .await;
        let gas = splits[0].quotes[0].gas_details.as_ref().unwrap();
        assert_eq!(gas.gas_cost_in_quote_token, U256::ZERO);
        assert_eq!(
            metrics
                .gas_conversion_failures
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }
}
