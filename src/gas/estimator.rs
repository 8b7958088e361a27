//! Execution-gas estimation
//!
//! Closed-form formulas over route structure, with per-chain constants:
//!
//!   V2:    BASE_SWAP_COST_V2 + COST_PER_EXTRA_HOP_V2 * (hops-1)
//!   V3/V4: BASE_SWAP_COST + COST_PER_HOP*hops
//!          + SINGLE_HOP_OVERHEAD (hops == 1)
//!          + COST_PER_INIT_TICK * sum(max(0, ticksCrossed[i]-1))
//!          + TOKEN_OVERHEAD
//!   MIXED: the path is partitioned into maximal monoprotocol runs and
//!          each run is charged with its protocol's formula.
//!
//! Rollups add an L1 data term on top; an L1 failure never fails the
//! estimate, it just contributes zero.

use crate::chains::Chain;
use crate::types::{GasDetails, Pool, Protocol, Route};
use alloy::primitives::U256;
use std::collections::HashSet;

use super::l1::L1GasEstimator;

pub struct GasEstimator {
    l1: L1GasEstimator,
}

impl GasEstimator {
    pub fn new(l1: L1GasEstimator) -> GasEstimator {
        GasEstimator { l1 }
    }

    /// Full estimate: execution formula plus the rollup L1 term.
    /// `calldata` is the router calldata for the trade (used by the L1
    /// models only; pass the real bytes on OP-stack, anything on chains
    /// without an L1 term).
    pub async fn estimate(
        &self,
        route: &Route,
        ticks_crossed: &[u32],
        gas_price_wei: U256,
        calldata: &[u8],
    ) -> GasDetails {
        let execution = GasDetails::new(
            gas_price_wei,
            execution_gas(route, ticks_crossed),
        );
        let chain = route.chain;
        if chain == Chain::Arbitrum || chain.is_op_stack() {
            let l1 = self.l1.l1_gas(chain, calldata, gas_price_wei).await;
            GasDetails::combine(&execution, &l1)
        } else {
            execution
        }
    }
}

/// The execution-side gas formula. Pure; exposed for the offline callers
/// and tests.
pub fn execution_gas(route: &Route, ticks_crossed: &[u32]) -> u64 {
    let gas = route.chain.info().gas;
    let mut total = 0u64;

    // Maximal monoprotocol runs; a monoprotocol route is one run, so the
    // mixed partition degenerates to the plain formula.
    let mut offset = 0usize;
    for run in protocol_runs(&route.pools) {
        let hops = run.len() as u64;
        match run[0].protocol() {
            Protocol::V2 => {
                total += gas.base_swap_cost_v2 + gas.cost_per_extra_hop_v2 * (hops - 1);
            }
            Protocol::V3 | Protocol::V4 => {
                total += gas.base_swap_cost + gas.cost_per_hop * hops;
                if hops == 1 {
                    total += gas.single_hop_overhead;
                }
                let ticks: u64 = run
                    .iter()
                    .enumerate()
                    .map(|(i, _)| {
                        ticks_crossed
                            .get(offset + i)
                            .map(|t| (*t).saturating_sub(1) as u64)
                            .unwrap_or(0)
                    })
                    .sum();
                total += gas.cost_per_init_tick * ticks;
            }
            Protocol::Mixed => unreachable!("pools never carry the mixed tag"),
        }
        offset += run.len();
    }

    total + token_overhead(route)
}

/// Fixed surcharge for routes touching known expensive-transfer tokens.
fn token_overhead(route: &Route) -> u64 {
    let info = route.chain.info();
    let mut charged: HashSet<_> = HashSet::new();
    let mut total = 0u64;
    for token in route.token_path() {
        if charged.insert(token) {
            total += info.token_gas_overhead(&token);
        }
    }
    total
}

/// Split the pool path into maximal same-protocol runs.
fn protocol_runs(pools: &[Pool]) -> Vec<&[Pool]> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    for i in 1..pools.len() {
        if pools[i].protocol() != pools[start].protocol() {
            runs.push(&pools[start..i]);
            start = i;
        }
    }
    if start < pools.len() {
        runs.push(&pools[start..]);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{V2Pool, V3Pool};
    use alloy::primitives::{address, Address};

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
            fee: 3_000,
            liquidity: 1_000,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: 0,
        })
    }

    #[test]
    fn test_single_hop_v2_gas() {
        let route = Route::new(
            Chain::Mainnet,
            vec![v2(addr(1), addr(2), 0xa0)],
            addr(1),
            addr(2),
        );
        assert_eq!(execution_gas(&route, &[]), 135_000);
        // At 1000 wei gas price the wei cost follows directly
        let details = GasDetails::new(U256::from(1_000u64), execution_gas(&route, &[]));
        assert_eq!(details.gas_cost_in_wei, U256::from(135_000_000u64));
    }

    #[test]
    fn test_two_hop_v2_gas() {
        let route = Route::new(
            Chain::Mainnet,
            vec![v2(addr(1), addr(3), 0xa0), v2(addr(3), addr(2), 0xa1)],
            addr(1),
            addr(2),
        );
        assert_eq!(execution_gas(&route, &[]), 135_000 + 50_000);
    }

    #[test]
    fn test_single_hop_v3_with_one_tick_crossed() {
        let route = Route::new(
            Chain::Mainnet,
            vec![v3(addr(1), addr(2), 0xb0)],
            addr(1),
            addr(2),
        );
        // initializedTicks = [2]: one chargeable crossing
        assert_eq!(
            execution_gas(&route, &[2]),
            2_000 + 80_000 + 15_000 + 31_000
        );
        // No single-hop overhead beyond one hop, and untracked ticks are free
        let two_hop = Route::new(
            Chain::Mainnet,
            vec![v3(addr(1), addr(3), 0xb0), v3(addr(3), addr(2), 0xb1)],
            addr(1),
            addr(2),
        );
        assert_eq!(execution_gas(&two_hop, &[]), 2_000 + 160_000);
    }

    #[test]
    fn test_arbitrum_base_cost_applies() {
        let route = Route::new(
            Chain::Arbitrum,
            vec![v3(addr(1), addr(2), 0xb0)],
            addr(1),
            addr(2),
        );
        assert_eq!(execution_gas(&route, &[0]), 5_000 + 80_000 + 15_000);
    }

    #[test]
    fn test_mixed_formula_partitions_runs() {
        // V2, V2, V3: one two-hop V2 run plus one single-hop V3 run
        let route = Route::new(
            Chain::Mainnet,
            vec![
                v2(addr(1), addr(3), 0xa0),
                v2(addr(3), addr(4), 0xa1),
                v3(addr(4), addr(2), 0xb0),
            ],
            addr(1),
            addr(2),
        );
        assert_eq!(route.protocol, Protocol::Mixed);
        let expected_v2 = 135_000 + 50_000;
        let expected_v3 = 2_000 + 80_000 + 15_000;
        assert_eq!(execution_gas(&route, &[0, 0, 1]), expected_v2 + expected_v3);
    }

    #[test]
    fn test_mixed_law_monoprotocol_route() {
        // The mixed partition of an all-V3 route equals the plain formula
        let route = Route::new(
            Chain::Mainnet,
            vec![v3(addr(1), addr(3), 0xb0), v3(addr(3), addr(2), 0xb1)],
            addr(1),
            addr(2),
        );
        let runs = protocol_runs(&route.pools);
        assert_eq!(runs.len(), 1);
        assert_eq!(execution_gas(&route, &[3, 2]), 2_000 + 160_000 + 31_000 * 3);
    }

    #[test]
    fn test_expensive_token_surcharge() {
        let aave = address!("7Fc66500c84A76Ad7e9c93437bFc5Ac33E2DDaE9");
        let plain = Route::new(
            Chain::Mainnet,
            vec![v3(addr(1), addr(2), 0xb0)],
            addr(1),
            addr(2),
        );
        let (t_in, t_out) = if aave < addr(2) { (aave, addr(2)) } else { (addr(2), aave) };
        let touching = Route::new(
            Chain::Mainnet,
            vec![v3(t_in, t_out, 0xb1)],
            t_in,
            t_out,
        );
        assert_eq!(
            execution_gas(&touching, &[]),
            execution_gas(&plain, &[]) + 150_000
        );
    }
}
