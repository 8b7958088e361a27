//! Method-parameters assembly
//!
//! Builds the Universal Router call for a quote plan: one swap command
//! per route leg run, plus wrap/unwrap framing when the caller trades
//! native currency. The calldata doubles as the payload for the L1 data
//! gas models and the simulator.

use crate::chains::Chain;
use crate::contracts::IUniversalRouter;
use crate::types::{is_native, Protocol, QuoteSplit, Route, TradeType};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use anyhow::{Context, Result};
use serde::Serialize;

use super::fetcher::encode_v3_path;

// Universal Router command bytes.
const CMD_V3_SWAP_EXACT_IN: u8 = 0x00;
const CMD_V3_SWAP_EXACT_OUT: u8 = 0x01;
const CMD_V2_SWAP_EXACT_IN: u8 = 0x08;
const CMD_V2_SWAP_EXACT_OUT: u8 = 0x09;
const CMD_WRAP_ETH: u8 = 0x0b;
const CMD_UNWRAP_WETH: u8 = 0x0c;
const CMD_V4_SWAP: u8 = 0x10;

/// Sentinel recipient meaning "the router itself" (intermediate custody).
const ADDRESS_THIS: Address = Address::repeat_byte(2);

/// Ready-to-submit call description.
#[derive(Debug, Clone, Serialize)]
pub struct MethodParameters {
    pub to: Address,
    pub calldata: Bytes,
    pub value: U256,
}

/// Build the router call for a ranked plan. `native_in` flags that the
/// caller pays in raw native currency (value is attached and wrapped).
pub fn build_method_parameters(
    chain: Chain,
    split: &QuoteSplit,
    trade_type: TradeType,
    recipient: Option<Address>,
    slippage_tolerance: f64,
    deadline_secs: u64,
    native_in: bool,
) -> Result<MethodParameters> {
    let info = chain.info();
    let recipient = recipient.unwrap_or(ADDRESS_THIS);
    let mut commands: Vec<u8> = Vec::new();
    let mut inputs: Vec<Bytes> = Vec::new();
    let mut value = U256::ZERO;

    let total_in: U256 = split
        .quotes
        .iter()
        .fold(U256::ZERO, |acc, q| acc + trade_input(q, trade_type));
    if native_in {
        value = total_in;
        commands.push(CMD_WRAP_ETH);
        inputs.push(Bytes::from(
            (ADDRESS_THIS, total_in).abi_encode_params(),
        ));
    }

    for quote in &split.quotes {
        let amount_in = trade_input(quote, trade_type);
        let amount_out = trade_output(quote, trade_type);
        let min_out = with_slippage_down(amount_out, slippage_tolerance);
        let max_in = with_slippage_up(amount_in, slippage_tolerance);
        append_route_commands(
            &quote.route,
            trade_type,
            recipient,
            amount_in,
            amount_out,
            min_out,
            max_in,
            &mut commands,
            &mut inputs,
        )?;
    }

    if !native_in && is_native_out_plan(split) {
        commands.push(CMD_UNWRAP_WETH);
        inputs.push(Bytes::from((recipient, U256::ZERO).abi_encode_params()));
    }

    let deadline = U256::from(deadline_secs);
    let calldata = IUniversalRouter::executeCall {
        commands: Bytes::from(commands),
        inputs,
        deadline,
    }
    .abi_encode();

    Ok(MethodParameters {
        to: info.universal_router,
        calldata: Bytes::from(calldata),
        value,
    })
}

fn trade_input(quote: &crate::types::Quote, trade_type: TradeType) -> U256 {
    match trade_type {
        TradeType::ExactIn => quote.amount,
        TradeType::ExactOut => quote.quoted,
    }
}

fn trade_output(quote: &crate::types::Quote, trade_type: TradeType) -> U256 {
    match trade_type {
        TradeType::ExactIn => quote.quoted,
        TradeType::ExactOut => quote.amount,
    }
}

fn with_slippage_down(amount: U256, slippage_pct: f64) -> U256 {
    let bps = (slippage_pct * 100.0).round() as u64;
    amount - amount * U256::from(bps) / U256::from(10_000u64)
}

fn with_slippage_up(amount: U256, slippage_pct: f64) -> U256 {
    let bps = (slippage_pct * 100.0).round() as u64;
    amount + amount * U256::from(bps) / U256::from(10_000u64)
}

fn is_native_out_plan(split: &QuoteSplit) -> bool {
    split
        .quotes
        .first()
        .map(|q| is_native(&q.route.token_out))
        .unwrap_or(false)
}

/// One swap command per maximal monoprotocol run. Intermediate runs pay
/// out to the router; the final run pays the recipient.
#[allow(clippy::too_many_arguments)]
fn append_route_commands(
    route: &Route,
    trade_type: TradeType,
    recipient: Address,
    amount_in: U256,
    amount_out: U256,
    min_out: U256,
    max_in: U256,
    commands: &mut Vec<u8>,
    inputs: &mut Vec<Bytes>,
) -> Result<()> {
    // The synthetic wrapping leg never reaches calldata.
    let pools: Vec<_> = route
        .pools
        .iter()
        .filter(|p| !p.is_synthetic_native_wrapper())
        .cloned()
        .collect();
    if pools.is_empty() {
        anyhow::bail!("route has no real pools");
    }
    let sub_route = Route::new(route.chain, pools, route.token_in, route.token_out);

    match sub_route.protocol {
        Protocol::V2 => {
            let path = sub_route.token_path();
            match trade_type {
                TradeType::ExactIn => {
                    commands.push(CMD_V2_SWAP_EXACT_IN);
                    inputs.push(Bytes::from(
                        (recipient, amount_in, min_out, path, true).abi_encode_params(),
                    ));
                }
                TradeType::ExactOut => {
                    commands.push(CMD_V2_SWAP_EXACT_OUT);
                    inputs.push(Bytes::from(
                        (recipient, amount_out, max_in, path, true).abi_encode_params(),
                    ));
                }
            }
        }
        Protocol::V3 => {
            let path = encode_v3_path(&sub_route, trade_type)
                .context("v3 path encoding failed")?;
            match trade_type {
                TradeType::ExactIn => {
                    commands.push(CMD_V3_SWAP_EXACT_IN);
                    inputs.push(Bytes::from(
                        (recipient, amount_in, min_out, path, true).abi_encode_params(),
                    ));
                }
                TradeType::ExactOut => {
                    commands.push(CMD_V3_SWAP_EXACT_OUT);
                    inputs.push(Bytes::from(
                        (recipient, amount_out, max_in, path, true).abi_encode_params(),
                    ));
                }
            }
        }
        Protocol::V4 => {
            // V4 rides a single command whose payload carries the encoded
            // path; hook data is never attached here.
            let path = encode_v3_path(&sub_route, trade_type)
                .context("v4 path encoding failed")?;
            commands.push(CMD_V4_SWAP);
            inputs.push(Bytes::from(
                (recipient, amount_in, min_out, path, true).abi_encode_params(),
            ));
        }
        Protocol::Mixed => {
            // Per-run commands, intermediate custody at the router.
            let runs = split_runs(&sub_route);
            let last = runs.len() - 1;
            for (i, run) in runs.into_iter().enumerate() {
                let run_recipient = if i == last { recipient } else { ADDRESS_THIS };
                // Sizing inside a mixed chain is settled on-chain; only
                // the outermost amounts are constrained.
                let (run_in, run_min_out) = if i == 0 {
                    (amount_in, U256::ZERO)
                } else {
                    (U256::ZERO, U256::ZERO)
                };
                let run_min_out = if i == last { min_out } else { run_min_out };
                append_route_commands(
                    &run,
                    trade_type,
                    run_recipient,
                    run_in,
                    amount_out,
                    run_min_out,
                    max_in,
                    commands,
                    inputs,
                )?;
            }
        }
    }
    Ok(())
}

/// Split a mixed route into monoprotocol sub-routes.
fn split_runs(route: &Route) -> Vec<Route> {
    let path = route.token_path();
    let mut runs = Vec::new();
    let mut start = 0usize;
    for i in 1..=route.pools.len() {
        let boundary = i == route.pools.len()
            || route.pools[i].protocol() != route.pools[start].protocol();
        if boundary {
            runs.push(Route::new(
                route.chain,
                route.pools[start..i].to_vec(),
                path[start],
                path[i],
            ));
            start = i;
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Pool, Quote, V2Pool, V3Pool};

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from(bytes)
    }

    fn v2(a: Address, b: Address, tag: u8) -> Pool {
        let (token0, token1) = if a < b { (a, b) } else { (b, a) };
        Pool::V2(V2Pool {
            address: Address::repeat_byte(tag),
            token0,
            token1,
            reserve0: 1_000_000,
            reserve1: 1_000_000,
        })
    }

    fn v3(a: Address, b: Address, tag: u8) -> Pool {
        let (token0, token1) = if a < b { (a, b) } else { (b, a) };
        Pool::V3(V3Pool {
            address: Address::repeat_byte(tag),
            token0,
            token1,
            fee: 500,
            liquidity: 1_000,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: 0,
        })
    }

    fn quote(route: Route, amount: u64, quoted: u64) -> Quote {
        Quote {
            route,
            amount: U256::from(amount),
            quoted: U256::from(quoted),
            gas_details: None,
            ticks_crossed: Vec::new(),
        }
    }

    #[test]
    fn test_single_v3_route_calldata() {
        let route = Route::new(Chain::Mainnet, vec![v3(addr(1), addr(2), 0xb0)], addr(1), addr(2));
        let split = QuoteSplit::singleton(quote(route, 1_000, 990));
        let params = build_method_parameters(
            Chain::Mainnet,
            &split,
            TradeType::ExactIn,
            Some(addr(0x99)),
            0.5,
            1_800,
            false,
        )
        .expect("params");
        assert_eq!(params.to, Chain::Mainnet.info().universal_router);
        assert_eq!(params.value, U256::ZERO);
        // execute(bytes,bytes[],uint256) selector
        assert_eq!(&params.calldata[..4], &IUniversalRouter::executeCall::SELECTOR);
    }

    #[test]
    fn test_native_input_attaches_value_and_wraps() {
        let wrapped = Chain::Mainnet.info().wrapped_native;
        let route = Route::new(
            Chain::Mainnet,
            vec![v3(wrapped, addr(2), 0xb0)],
            wrapped,
            addr(2),
        );
        let split = QuoteSplit::singleton(quote(route, 5_000, 4_900));
        let params = build_method_parameters(
            Chain::Mainnet,
            &split,
            TradeType::ExactIn,
            Some(addr(0x99)),
            0.5,
            1_800,
            true,
        )
        .expect("params");
        assert_eq!(params.value, U256::from(5_000u64));
    }

    #[test]
    fn test_slippage_bounds() {
        assert_eq!(
            with_slippage_down(U256::from(10_000u64), 0.5),
            U256::from(9_950u64)
        );
        assert_eq!(
            with_slippage_up(U256::from(10_000u64), 0.5),
            U256::from(10_050u64)
        );
        // 0% slippage is the identity
        assert_eq!(
            with_slippage_down(U256::from(10_000u64), 0.0),
            U256::from(10_000u64)
        );
    }

    #[test]
    fn test_mixed_route_emits_per_run_commands() {
        let route = Route::new(
            Chain::Mainnet,
            vec![v2(addr(1), addr(3), 0xa0), v3(addr(3), addr(2), 0xb0)],
            addr(1),
            addr(2),
        );
        assert_eq!(route.protocol, Protocol::Mixed);
        let split = QuoteSplit::singleton(quote(route, 1_000, 950));
        let params = build_method_parameters(
            Chain::Mainnet,
            &split,
            TradeType::ExactIn,
            Some(addr(0x99)),
            0.5,
            1_800,
            false,
        )
        .expect("params");
        let decoded = IUniversalRouter::executeCall::abi_decode(&params.calldata)
            .expect("decode");
        assert_eq!(decoded.commands.len(), 2);
        assert_eq!(decoded.commands[0], CMD_V2_SWAP_EXACT_IN);
        assert_eq!(decoded.commands[1], CMD_V3_SWAP_EXACT_IN);
        assert_eq!(decoded.inputs.len(), 2);
    }
}
