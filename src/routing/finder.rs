//! Route enumeration
//!
//! Depth-bounded DFS over the candidate pool set. Paths chain tokens
//! end-to-end, never revisit a token, and stay protocol-pure unless mixed
//! routing is allowed. Depth is lazily extended: when the normal search
//! yields too few routes (or only trivial one-hop ones) the search is
//! re-run deeper and the strictly-longer routes are unioned in.

use crate::chains::Chain;
use crate::config::RoutingConfig;
use crate::metrics::Metrics;
use crate::types::{Pool, Protocol, Route};
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct RouteFinder {
    config: RoutingConfig,
    metrics: Arc<Metrics>,
}

impl RouteFinder {
    pub fn new(config: RoutingConfig, metrics: Arc<Metrics>) -> RouteFinder {
        RouteFinder { config, metrics }
    }

    /// Enumerate routes from `token_in` to `token_out` over `pools`.
    /// Endpoints are the wrapped form when the caller traded native; with
    /// `allow_mixed` set and any V4 pool present, a synthetic ETH<->WETH
    /// wrapping pool joins the set so routes can cross the boundary.
    pub fn find_routes(
        &self,
        chain: Chain,
        pools: &[Pool],
        token_in: Address,
        token_out: Address,
        allow_mixed: bool,
    ) -> Vec<Route> {
        let mut pool_set: Vec<Pool> = pools
            .iter()
            .filter(|p| p.is_routable())
            .cloned()
            .collect();
        if allow_mixed && pool_set.iter().any(|p| p.protocol() == Protocol::V4) {
            pool_set.push(Pool::synthetic_native_wrapper(chain));
        }

        let mut routes = self.search(chain, &pool_set, token_in, token_out, allow_mixed, self.config.max_hops);
        Metrics::add(&self.metrics.routes_found, routes.len() as u64);

        let all_single_hop = !routes.is_empty() && routes.iter().all(|r| r.hops() == 1);
        if routes.len() < self.config.min_routes_threshold || all_single_hop {
            Metrics::incr(&self.metrics.extended_searches);
            let extended: Vec<Route> = self
                .search(
                    chain,
                    &pool_set,
                    token_in,
                    token_out,
                    allow_mixed,
                    self.config.max_hops_extended,
                )
                .into_iter()
                .filter(|r| r.hops() > self.config.max_hops)
                .take(self.config.max_extended_routes)
                .collect();
            Metrics::add(&self.metrics.extended_routes_found, extended.len() as u64);
            debug!(
                "Extended search added {} routes beyond {} hops",
                extended.len(),
                self.config.max_hops
            );
            routes.extend(extended);
        }
        routes
    }

    fn search(
        &self,
        chain: Chain,
        pools: &[Pool],
        token_in: Address,
        token_out: Address,
        allow_mixed: bool,
        max_hops: usize,
    ) -> Vec<Route> {
        // token -> indices of pools touching it
        let mut by_token: HashMap<Address, Vec<usize>> = HashMap::new();
        for (idx, pool) in pools.iter().enumerate() {
            by_token.entry(pool.token0()).or_default().push(idx);
            by_token.entry(pool.token1()).or_default().push(idx);
        }

        let mut state = SearchState {
            chain,
            pools,
            by_token: &by_token,
            token_out,
            allow_mixed,
            max_hops,
            token_in,
            path: Vec::new(),
            visited: vec![token_in],
            routes: Vec::new(),
        };
        state.descend(token_in, None);
        state.routes
    }
}

struct SearchState<'a> {
    chain: Chain,
    pools: &'a [Pool],
    by_token: &'a HashMap<Address, Vec<usize>>,
    token_out: Address,
    allow_mixed: bool,
    max_hops: usize,
    token_in: Address,
    path: Vec<usize>,
    visited: Vec<Address>,
    routes: Vec<Route>,
}

impl<'a> SearchState<'a> {
    /// `protocol` is the route protocol pinned by the first real pool when
    /// mixing is disallowed; the synthetic wrapper never pins it.
    fn descend(&mut self, current: Address, protocol: Option<Protocol>) {
        if self.path.len() >= self.max_hops {
            return;
        }
        let Some(candidates) = self.by_token.get(&current) else {
            return;
        };
        // Indices are copied out so the borrow does not pin `self`.
        let candidates: Vec<usize> = candidates.clone();
        for idx in candidates {
            if self.path.contains(&idx) {
                continue;
            }
            let pool = &self.pools[idx];
            let synthetic = pool.is_synthetic_native_wrapper();
            if !self.allow_mixed && !synthetic {
                if let Some(pinned) = protocol {
                    if pool.protocol() != pinned {
                        continue;
                    }
                }
            }
            let Some(next) = pool.other_token(&current) else {
                continue;
            };
            if self.visited.contains(&next) {
                continue;
            }

            self.path.push(idx);
            self.visited.push(next);
            if next == self.token_out {
                let route_pools: Vec<Pool> =
                    self.path.iter().map(|&i| self.pools[i].clone()).collect();
                self.routes.push(Route::new(
                    self.chain,
                    route_pools,
                    self.token_in,
                    self.token_out,
                ));
            } else {
                let pinned = if synthetic {
                    protocol
                } else {
                    protocol.or(Some(pool.protocol()))
                };
                self.descend(next, pinned);
            }
            self.visited.pop();
            self.path.pop();
        }
    }
}
