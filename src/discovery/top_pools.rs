//! Top-pools selection
//!
//! Reduces a raw pool list to a small, diverse set for route finding:
//! direct pairs, one-hop pools on either side, second-hop pools for the
//! surfaced intermediaries, the overall TVL top, base-token pairs, and
//! the native/wrapped connectors. Slices de-duplicate against a shared
//! selected set; membership lookups run over a precomputed token->pools
//! index so the whole routine stays O(pools).

use crate::chains::Chain;
use crate::config::TopPoolsConfig;
use crate::types::{PoolInfo, Protocol};
use alloy::primitives::Address;
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub struct TopPoolsSelector {
    config: TopPoolsConfig,
}

impl TopPoolsSelector {
    pub fn new(config: TopPoolsConfig) -> TopPoolsSelector {
        TopPoolsSelector { config }
    }

    /// Select the routing pool set for one (tokenIn, tokenOut) pair.
    /// `synthesized_directs` are the deterministic direct candidates; they
    /// are appended when the ranked direct slice comes back empty so a
    /// brand-new direct pool can still win.
    pub fn select(
        &self,
        chain: Chain,
        pools: &[PoolInfo],
        token_in: Address,
        token_out: Address,
        synthesized_directs: &[PoolInfo],
    ) -> Vec<PoolInfo> {
        let info = chain.info();

        // TVL-descending ordering, applied once; every slice below keeps it.
        let mut ranked: Vec<&PoolInfo> = pools.iter().collect();
        ranked.sort_by(|a, b| {
            b.tvl_eth
                .partial_cmp(&a.tvl_eth)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        // token -> ranked pool indices
        let mut by_token: HashMap<Address, Vec<usize>> = HashMap::new();
        for (idx, pool) in ranked.iter().enumerate() {
            by_token.entry(pool.token0).or_default().push(idx);
            by_token.entry(pool.token1).or_default().push(idx);
        }

        let mut selected_ids: HashSet<String> = HashSet::new();
        let mut selected: Vec<PoolInfo> = Vec::new();
        let push = |pool: &PoolInfo, selected: &mut Vec<PoolInfo>, ids: &mut HashSet<String>| {
            if ids.insert(identity(pool)) {
                selected.push(pool.clone());
                true
            } else {
                false
            }
        };

        // 1. Direct pairs, blocked-list filtered for V3.
        let mut direct_count = 0usize;
        for pool in &ranked {
            if direct_count >= self.config.top_n_direct_pairs {
                break;
            }
            if !(pool.involves(&token_in) && pool.involves(&token_out)) {
                continue;
            }
            if self.v3_direct_blocked(chain, pool) {
                continue;
            }
            if push(pool, &mut selected, &mut selected_ids) {
                direct_count += 1;
            }
        }

        // 2 + 3. One-hop pools touching exactly one endpoint.
        let mut intermediaries: Vec<Address> = Vec::new();
        for (own, other) in [(token_in, token_out), (token_out, token_in)] {
            let mut taken = 0usize;
            if let Some(indices) = by_token.get(&own) {
                for &idx in indices {
                    if taken >= self.config.top_n_one_hop_pairs {
                        break;
                    }
                    let pool = ranked[idx];
                    if pool.involves(&other) {
                        continue;
                    }
                    if push(pool, &mut selected, &mut selected_ids) {
                        taken += 1;
                    }
                    if let Some(mid) = other_side(pool, &own) {
                        if mid != other && !intermediaries.contains(&mid) {
                            intermediaries.push(mid);
                        }
                    }
                }
            }
        }

        // 4. Second-hop pools for every surfaced intermediary.
        for mid in &intermediaries {
            let mut taken = 0usize;
            if let Some(indices) = by_token.get(mid) {
                for &idx in indices {
                    if taken >= self.config.top_n_second_hop_pairs {
                        break;
                    }
                    if push(ranked[idx], &mut selected, &mut selected_ids) {
                        taken += 1;
                    }
                }
            }
        }

        // 5. Overall TVL top.
        let mut taken = 0usize;
        for pool in &ranked {
            if taken >= self.config.top_n_pairs {
                break;
            }
            if push(pool, &mut selected, &mut selected_ids) {
                taken += 1;
            }
        }

        // 6. Base-token pairs against either endpoint, global cap.
        let mut base_taken = 0usize;
        'base: for base in info.base_tokens {
            if let Some(indices) = by_token.get(base) {
                for &idx in indices {
                    if base_taken >= self.config.top_n_with_base_token {
                        break 'base;
                    }
                    let pool = ranked[idx];
                    if !(pool.involves(&token_in) || pool.involves(&token_out)) {
                        continue;
                    }
                    if push(pool, &mut selected, &mut selected_ids) {
                        base_taken += 1;
                    }
                }
            }
        }

        // 7. Best native/wrapped connector for each endpoint.
        let wrapped = info.wrapped_native;
        for endpoint in [token_in, token_out] {
            if endpoint == wrapped {
                continue;
            }
            if let Some(indices) = by_token.get(&wrapped) {
                for &idx in indices {
                    let pool = ranked[idx];
                    if pool.involves(&endpoint) {
                        push(pool, &mut selected, &mut selected_ids);
                        break; // ranked order: first hit is the deepest
                    }
                }
            }
        }

        // Direct slice came back empty: append the synthesised direct
        // pools so a pool no indexer has seen yet can still be routed.
        if direct_count == 0 && !selected.is_empty() {
            for pool in synthesized_directs {
                if self.v3_direct_blocked(chain, pool) {
                    continue;
                }
                push(pool, &mut selected, &mut selected_ids);
            }
        }

        debug!(
            "Selected {} of {} pools for {:#x}/{:#x} ({} direct)",
            selected.len(),
            pools.len(),
            token_in,
            token_out,
            direct_count
        );
        selected
    }

    fn v3_direct_blocked(&self, chain: Chain, pool: &PoolInfo) -> bool {
        if pool.protocol != Protocol::V3 {
            return false;
        }
        let info = chain.info();
        info.blocked_v3_tokens.contains(&pool.token0)
            || info.blocked_v3_tokens.contains(&pool.token1)
            || info.blocked_v3_pools.contains(&pool.address)
    }
}

fn identity(pool: &PoolInfo) -> String {
    match pool.pool_id {
        Some(id) => format!("{:#x}", id),
        None => format!("{:#x}", pool.address),
    }
}

fn other_side(pool: &PoolInfo, token: &Address) -> Option<Address> {
    if pool.token0 == *token {
        Some(pool.token1)
    } else if pool.token1 == *token {
        Some(pool.token0)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    fn selector() -> TopPoolsSelector {
        TopPoolsSelector::new(TopPoolsConfig {
            top_n_direct_pairs: 2,
            top_n_one_hop_pairs: 2,
            top_n_second_hop_pairs: 1,
            top_n_pairs: 3,
            top_n_with_base_token: 2,
        })
    }

    #[test]
    fn test_direct_pairs_capped_and_sorted_by_tvl() {
        let token_in = addr(1);
        let token_out = addr(2);
        let pools = vec![
            v3_info(token_in, token_out, 500, 5.0),
            v3_info(token_in, token_out, 3_000, 50.0),
            v3_info(token_in, token_out, 10_000, 1.0),
        ];
        // Zero out the overall-top slice so only the direct cap applies.
        let selector = TopPoolsSelector::new(TopPoolsConfig {
            top_n_direct_pairs: 2,
            top_n_one_hop_pairs: 2,
            top_n_second_hop_pairs: 1,
            top_n_pairs: 0,
            top_n_with_base_token: 2,
        });
        let selected = selector.select(Chain::Mainnet, &pools, token_in, token_out, &[]);
        // Cap of 2 applies to direct pairs; deepest two survive
        let directs: Vec<_> = selected
            .iter()
            .filter(|p| p.involves(&token_in) && p.involves(&token_out))
            .collect();
        assert_eq!(directs.len(), 2);
        assert_eq!(directs[0].fee, Some(3_000));
        assert_eq!(directs[1].fee, Some(500));
    }

    #[test]
    fn test_one_hop_and_second_hop_slices() {
        let token_in = addr(1);
        let token_out = addr(2);
        let mid = addr(3);
        let far = addr(4);
        let pools = vec![
            v2_info(token_in, mid, 40.0),  // one-hop on the in side
            v2_info(mid, token_out, 30.0), // one-hop on the out side
            v2_info(mid, far, 20.0),       // second-hop via mid
        ];
        let selected = selector().select(Chain::Mainnet, &pools, token_in, token_out, &[]);
        assert!(selected.iter().any(|p| p.involves(&far)));
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_no_duplicates_across_slices() {
        let token_in = addr(1);
        let token_out = addr(2);
        // One pool qualifies for direct, top-TVL and base-token slices at
        // once; it must appear exactly once.
        let pools = vec![v2_info(token_in, token_out, 99.0)];
        let selected = selector().select(Chain::Mainnet, &pools, token_in, token_out, &[]);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_blocked_v3_token_excluded_from_direct() {
        let blocked = Chain::Mainnet.info().blocked_v3_tokens[0];
        let token_out = addr(2);
        let pools = vec![v3_info(blocked, token_out, 3_000, 50.0)];
        // The block list gates the direct slice only; keep the overall-top
        // slice out of the way.
        let selector = TopPoolsSelector::new(TopPoolsConfig {
            top_n_pairs: 0,
            ..TopPoolsConfig::default()
        });
        let selected = selector.select(Chain::Mainnet, &pools, blocked, token_out, &[]);
        let directs: Vec<_> = selected
            .iter()
            .filter(|p| p.involves(&blocked) && p.involves(&token_out))
            .filter(|p| p.protocol == Protocol::V3)
            .collect();
        assert!(directs.is_empty());
    }

    #[test]
    fn test_synthesized_directs_appended_when_direct_slice_empty() {
        let token_in = addr(1);
        let token_out = addr(2);
        let mid = addr(3);
        // No indexed direct pool, but the union is non-empty.
        let pools = vec![v2_info(token_in, mid, 10.0), v2_info(mid, token_out, 10.0)];
        let synthesized = vec![v2_info(token_in, token_out, 0.0)];
        let selected =
            selector().select(Chain::Mainnet, &pools, token_in, token_out, &synthesized);
        assert!(selected
            .iter()
            .any(|p| p.involves(&token_in) && p.involves(&token_out)));
    }

    #[test]
    fn test_native_connector_selected() {
        let wrapped = Chain::Mainnet.info().wrapped_native;
        let token_in = addr(1);
        let token_out = addr(2);
        let pools = vec![
            v2_info(token_in, token_out, 90.0),
            v2_info(wrapped, token_in, 1.0),
            v2_info(wrapped, token_in, 2.0),
        ];
        let selected = selector().select(Chain::Mainnet, &pools, token_in, token_out, &[]);
        // The single deepest wrapped connector for token_in is included
        let connectors: Vec<_> = selected
            .iter()
            .filter(|p| p.involves(&wrapped) && p.involves(&token_in))
            .collect();
        assert!(!connectors.is_empty());
        assert!(connectors.iter().any(|p| p.tvl_eth == 2.0));
    }
}
