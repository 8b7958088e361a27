//! Sub-route pricing
//!
//! Prices every (route, percentage) pair the allocator produced. Pure V2
//! routes are priced offline from reserves. Pure V3/V4 routes go to the
//! on-chain quoters, batched through Multicall3 so one RPC round-trip
//! covers the whole grid. Mixed routes are priced leg by leg. A failed
//! sub-route yields None and simply drops out of the split search.

use crate::chains::{Chain, MULTICALL3_ADDRESS};
use crate::contracts::{IMulticall3, IQuoterV2, IV4Quoter};
use crate::tokens::ChainProviders;
use crate::types::{Pool, Protocol, Quote, Route, TradeType};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// One Quote per input pair, positionally aligned; None where pricing
    /// failed.
    async fn fetch(
        &self,
        chain: Chain,
        trade_type: TradeType,
        pairs: &[(Route, U256)],
    ) -> Vec<Option<Quote>>;
}

// ── V2 constant-product math ─────────────────────────────────────────────────

/// amountOut = (in * 997 * reserveOut) / (reserveIn * 1000 + in * 997)
pub fn v2_amount_out(amount_in: U256, reserve_in: u128, reserve_out: u128) -> Option<U256> {
    if reserve_in == 0 || reserve_out == 0 || amount_in.is_zero() {
        return None;
    }
    let amount_with_fee = amount_in * U256::from(997u64);
    let numerator = amount_with_fee * U256::from(reserve_out);
    let denominator = U256::from(reserve_in) * U256::from(1_000u64) + amount_with_fee;
    Some(numerator / denominator)
}

/// amountIn = reserveIn * out * 1000 / ((reserveOut - out) * 997) + 1
pub fn v2_amount_in(amount_out: U256, reserve_in: u128, reserve_out: u128) -> Option<U256> {
    if reserve_in == 0 || reserve_out == 0 || amount_out.is_zero() {
        return None;
    }
    let reserve_out = U256::from(reserve_out);
    if amount_out >= reserve_out {
        return None; // cannot drain the pool
    }
    let numerator = U256::from(reserve_in) * amount_out * U256::from(1_000u64);
    let denominator = (reserve_out - amount_out) * U256::from(997u64);
    Some(numerator / denominator + U256::from(1u64))
}

fn v2_leg(
    pool: &Pool,
    token_in: &Address,
    amount: U256,
    trade_type: TradeType,
) -> Option<U256> {
    let Pool::V2(p) = pool else { return None };
    let (reserve_in, reserve_out) = if p.token0 == *token_in {
        (p.reserve0, p.reserve1)
    } else {
        (p.reserve1, p.reserve0)
    };
    match trade_type {
        TradeType::ExactIn => v2_amount_out(amount, reserve_in, reserve_out),
        TradeType::ExactOut => v2_amount_in(amount, reserve_in, reserve_out),
    }
}

/// Chain a pure-V2 route through its reserves. EXACT_OUT walks the path
/// backwards and returns the required input.
pub fn price_v2_route(route: &Route, amount: U256, trade_type: TradeType) -> Option<U256> {
    let path = route.token_path();
    if path.is_empty() {
        return None;
    }
    match trade_type {
        TradeType::ExactIn => {
            let mut current = amount;
            for (i, pool) in route.pools.iter().enumerate() {
                current = v2_leg(pool, &path[i], current, trade_type)?;
            }
            Some(current)
        }
        TradeType::ExactOut => {
            let mut current = amount;
            for (i, pool) in route.pools.iter().enumerate().rev() {
                current = v2_leg(pool, &path[i], current, trade_type)?;
            }
            Some(current)
        }
    }
}

// ── V3 path encoding ─────────────────────────────────────────────────────────

/// tokenIn (20) ++ fee (3) ++ token (20) ++ ... For EXACT_OUT the quoter
/// expects the path reversed (output token first).
pub fn encode_v3_path(route: &Route, trade_type: TradeType) -> Option<Bytes> {
    let path = route.token_path();
    if path.is_empty() {
        return None;
    }
    let mut bytes: Vec<u8> = Vec::with_capacity(path.len() * 23);
    match trade_type {
        TradeType::ExactIn => {
            bytes.extend_from_slice(path[0].as_slice());
            for (i, pool) in route.pools.iter().enumerate() {
                bytes.extend_from_slice(&pool.fee().to_be_bytes()[1..]);
                bytes.extend_from_slice(path[i + 1].as_slice());
            }
        }
        TradeType::ExactOut => {
            bytes.extend_from_slice(path[path.len() - 1].as_slice());
            for (i, pool) in route.pools.iter().enumerate().rev() {
                bytes.extend_from_slice(&pool.fee().to_be_bytes()[1..]);
                bytes.extend_from_slice(path[i].as_slice());
            }
        }
    }
    Some(Bytes::from(bytes))
}

/// V4 quoter path: one PathKey per hop, starting from the exact currency.
fn encode_v4_params(
    route: &Route,
    amount: U256,
    trade_type: TradeType,
) -> Option<IV4Quoter::QuoteExactParams> {
    let path = route.token_path();
    if path.is_empty() {
        return None;
    }
    let (exact_currency, hops): (Address, Vec<(usize, &Pool)>) = match trade_type {
        TradeType::ExactIn => (path[0], route.pools.iter().enumerate().collect()),
        TradeType::ExactOut => (
            path[path.len() - 1],
            route.pools.iter().enumerate().rev().collect(),
        ),
    };
    let mut keys = Vec::with_capacity(hops.len());
    for (i, pool) in hops {
        let Pool::V4(p) = pool else { return None };
        let intermediate = match trade_type {
            TradeType::ExactIn => path[i + 1],
            TradeType::ExactOut => path[i],
        };
        keys.push(IV4Quoter::PathKey {
            intermediateCurrency: intermediate,
            fee: alloy::primitives::aliases::U24::from(p.fee),
            tickSpacing: alloy::primitives::aliases::I24::try_from(p.tick_spacing).ok()?,
            hooks: p.hooks,
            hookData: Bytes::new(),
        });
    }
    Some(IV4Quoter::QuoteExactParams {
        exactCurrency: exact_currency,
        path: keys,
        exactAmount: u128::try_from(amount).ok()?,
    })
}

// ── On-chain fetcher ─────────────────────────────────────────────────────────

pub struct OnChainQuoteFetcher {
    providers: Arc<ChainProviders>,
}

impl OnChainQuoteFetcher {
    pub fn new(providers: Arc<ChainProviders>) -> OnChainQuoteFetcher {
        OnChainQuoteFetcher { providers }
    }

    fn quoter_call(
        chain: Chain,
        route: &Route,
        amount: U256,
        trade_type: TradeType,
    ) -> Option<(Address, Vec<u8>)> {
        let info = chain.info();
        match route.protocol {
            Protocol::V3 => {
                let path = encode_v3_path(route, trade_type)?;
                let data = match trade_type {
                    TradeType::ExactIn => IQuoterV2::quoteExactInputCall {
                        path,
                        amountIn: amount,
                    }
                    .abi_encode(),
                    TradeType::ExactOut => IQuoterV2::quoteExactOutputCall {
                        path,
                        amountOut: amount,
                    }
                    .abi_encode(),
                };
                Some((info.v3_quoter, data))
            }
            Protocol::V4 => {
                let params = encode_v4_params(route, amount, trade_type)?;
                let data = match trade_type {
                    TradeType::ExactIn => IV4Quoter::quoteExactInputCall { params }.abi_encode(),
                    TradeType::ExactOut => IV4Quoter::quoteExactOutputCall { params }.abi_encode(),
                };
                Some((info.v4_quoter, data))
            }
            _ => None,
        }
    }

    fn decode_quoter_return(
        protocol: Protocol,
        trade_type: TradeType,
        data: &[u8],
    ) -> Option<(U256, Vec<u32>)> {
        match (protocol, trade_type) {
            (Protocol::V3, TradeType::ExactIn) => {
                let ret = IQuoterV2::quoteExactInputCall::abi_decode_returns(data).ok()?;
                Some((ret.amountOut, ret.initializedTicksCrossedList))
            }
            (Protocol::V3, TradeType::ExactOut) => {
                let ret = IQuoterV2::quoteExactOutputCall::abi_decode_returns(data).ok()?;
                Some((ret.amountIn, ret.initializedTicksCrossedList))
            }
            (Protocol::V4, TradeType::ExactIn) => {
                let ret = IV4Quoter::quoteExactInputCall::abi_decode_returns(data).ok()?;
                Some((ret.amountOut, Vec::new()))
            }
            (Protocol::V4, TradeType::ExactOut) => {
                let ret = IV4Quoter::quoteExactOutputCall::abi_decode_returns(data).ok()?;
                Some((ret.amountIn, Vec::new()))
            }
            _ => None,
        }
    }

    /// Price a mixed route leg by leg: V2 legs offline, V3/V4 legs via
    /// single-hop quoter calls. The synthetic wrapping leg is 1:1.
    async fn price_mixed(
        &self,
        chain: Chain,
        route: &Route,
        amount: U256,
        trade_type: TradeType,
    ) -> Option<Quote> {
        let path = route.token_path();
        if path.is_empty() {
            return None;
        }
        let legs: Vec<usize> = match trade_type {
            TradeType::ExactIn => (0..route.pools.len()).collect(),
            TradeType::ExactOut => (0..route.pools.len()).rev().collect(),
        };
        let mut current = amount;
        let mut ticks = vec![0u32; route.pools.len()];
        for leg in legs {
            let pool = &route.pools[leg];
            if pool.is_synthetic_native_wrapper() {
                continue; // wrapping is 1:1
            }
            current = match pool {
                Pool::V2(_) => v2_leg(pool, &path[leg], current, trade_type)?,
                Pool::V3(_) | Pool::V4(_) => {
                    let single = Route::new(
                        chain,
                        vec![pool.clone()],
                        path[leg],
                        path[leg + 1],
                    );
                    let (target, data) =
                        Self::quoter_call(chain, &single, current, trade_type)?;
                    let provider = self.providers.get(chain)?;
                    let tx = alloy::rpc::types::TransactionRequest::default()
                        .to(target)
                        .input(Bytes::from(data).into());
                    let raw = match alloy::providers::Provider::call(provider, tx).await {
                        Ok(raw) => raw,
                        Err(e) => {
                            debug!("Mixed-leg quoter call failed: {}", e);
                            return None;
                        }
                    };
                    let (quoted, leg_ticks) =
                        Self::decode_quoter_return(pool.protocol(), trade_type, &raw)?;
                    ticks[leg] = leg_ticks.first().copied().unwrap_or(0);
                    quoted
                }
            };
        }
        Some(Quote {
            route: route.clone(),
            amount,
            quoted: current,
            gas_details: None,
            ticks_crossed: ticks,
        })
    }
}

#[async_trait]
impl QuoteFetcher for OnChainQuoteFetcher {
    async fn fetch(
        &self,
        chain: Chain,
        trade_type: TradeType,
        pairs: &[(Route, U256)],
    ) -> Vec<Option<Quote>> {
        let mut results: Vec<Option<Quote>> = vec![None; pairs.len()];

        // Offline V2 pricing and collection of the batchable quoter calls.
        let mut batch: Vec<(usize, Address, Vec<u8>)> = Vec::new();
        for (idx, (route, amount)) in pairs.iter().enumerate() {
            match route.protocol {
                Protocol::V2 => {
                    if let Some(quoted) = price_v2_route(route, *amount, trade_type) {
                        results[idx] = Some(Quote {
                            route: route.clone(),
                            amount: *amount,
                            quoted,
                            gas_details: None,
                            ticks_crossed: Vec::new(),
                        });
                    }
                }
                Protocol::V3 | Protocol::V4 => {
                    if let Some((target, data)) =
                        Self::quoter_call(chain, route, *amount, trade_type)
                    {
                        batch.push((idx, target, data));
                    }
                }
                Protocol::Mixed => {}
            }
        }

        // One aggregate3 round-trip for the whole quoter grid.
        if !batch.is_empty() {
            if let Some(provider) = self.providers.get(chain) {
                let multicall = IMulticall3::new(MULTICALL3_ADDRESS, provider.clone());
                let calls: Vec<IMulticall3::Call3> = batch
                    .iter()
                    .map(|(_, target, data)| IMulticall3::Call3 {
                        target: *target,
                        allowFailure: true,
                        callData: Bytes::from(data.clone()),
                    })
                    .collect();
                match multicall.aggregate3(calls).call().await {
                    Ok(returned) => {
                        for ((idx, _, _), result) in batch.iter().zip(returned.iter()) {
                            if !result.success {
                                continue;
                            }
                            let (route, amount) = &pairs[*idx];
                            if let Some((quoted, ticks)) = Self::decode_quoter_return(
                                route.protocol,
                                trade_type,
                                &result.returnData,
                            ) {
                                results[*idx] = Some(Quote {
                                    route: route.clone(),
                                    amount: *amount,
                                    quoted,
                                    gas_details: None,
                                    ticks_crossed: ticks,
                                });
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Quoter multicall failed on {}: {}", chain, e);
                    }
                }
            }
        }

        // Mixed routes go leg by leg.
        for (idx, (route, amount)) in pairs.iter().enumerate() {
            if route.protocol == Protocol::Mixed {
                results[idx] = self.price_mixed(chain, route, *amount, trade_type).await;
            }
        }

        results
    }
}

// ── Offline fetcher ──────────────────────────────────────────────────────────

/// Prices every protocol from pool state alone: V2 from reserves, V3/V4
/// through the within-tick sqrt-price math. Used by tests and the no-RPC
/// dev mode; exact inside one tick range, conservative beyond it.
pub struct OfflineQuoteFetcher;

impl OfflineQuoteFetcher {
    /// Returns the counter-amount plus the implied tick crossings.
    fn price_leg(
        pool: &Pool,
        token_in: &Address,
        amount: U256,
        trade_type: TradeType,
    ) -> Option<(U256, u32)> {
        if pool.is_synthetic_native_wrapper() {
            return Some((amount, 0));
        }
        match pool {
            Pool::V2(_) => v2_leg(pool, token_in, amount, trade_type).map(|out| (out, 0)),
            Pool::V3(p) => Self::concentrated_leg(
                p.sqrt_price_x96,
                p.liquidity,
                p.fee,
                p.tick_current,
                super::v3_math::tick_spacing_for_fee(p.fee),
                pool.token0() == *token_in,
                amount,
                trade_type,
            ),
            Pool::V4(p) => Self::concentrated_leg(
                p.sqrt_price_x96,
                p.liquidity,
                p.fee,
                p.tick_current,
                p.tick_spacing,
                pool.token0() == *token_in,
                amount,
                trade_type,
            ),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn concentrated_leg(
        sqrt_price_x96: U256,
        liquidity: u128,
        fee: u32,
        tick_current: i32,
        tick_spacing: i32,
        zero_for_one: bool,
        amount: U256,
        trade_type: TradeType,
    ) -> Option<(U256, u32)> {
        let step = match trade_type {
            TradeType::ExactIn => super::v3_math::swap_exact_in(
                sqrt_price_x96,
                liquidity,
                fee,
                tick_current,
                tick_spacing,
                amount,
                zero_for_one,
            )?,
            TradeType::ExactOut => super::v3_math::swap_exact_out(
                sqrt_price_x96,
                liquidity,
                fee,
                tick_current,
                tick_spacing,
                amount,
                zero_for_one,
            )?,
        };
        Some((step.amount, step.ticks_crossed))
    }
}

#[async_trait]
impl QuoteFetcher for OfflineQuoteFetcher {
    async fn fetch(
        &self,
        _chain: Chain,
        trade_type: TradeType,
        pairs: &[(Route, U256)],
    ) -> Vec<Option<Quote>> {
        pairs
            .iter()
            .map(|(route, amount)| {
                let path = route.token_path();
                if path.is_empty() {
                    return None;
                }
                let mut current = *amount;
                let mut ticks = vec![0u32; route.pools.len()];
                let legs: Vec<usize> = match trade_type {
                    TradeType::ExactIn => (0..route.pools.len()).collect(),
                    TradeType::ExactOut => (0..route.pools.len()).rev().collect(),
                };
                for leg in legs {
                    let (next, crossed) =
                        Self::price_leg(&route.pools[leg], &path[leg], current, trade_type)?;
                    current = next;
                    ticks[leg] = crossed;
                }
                Some(Quote {
                    route: route.clone(),
                    amount: *amount,
                    quoted: current,
                    gas_details: None,
                    ticks_crossed: ticks,
                })
            })
            .collect()
    }
}
