//! Quote pipeline orchestration
//!
//! Sequences the whole request: validation, token resolution, the cached
//! route fast path, discovery, route finding, pricing, gas modelling,
//! split search, ranking, simulation and response assembly. Recovery
//! happens at the narrowest component; this layer surfaces only 400, 404
//! and 500.

use crate::cache::{CacheStore, CachedRoutesRepository, MemoryStore, RedisStore};
use crate::chains::Chain;
use crate::config::RouterConfig;
use crate::discovery::{
    CachingPoolDiscoverer, DirectPoolDiscoverer, DispatchingPoolDiscoverer,
    FallbackPoolDiscoverer, IndexerPoolDiscoverer, PoolDiscoverer, PoolQuery,
    StaticPoolDiscoverer, TopPoolsSelector,
};
use crate::gas::{GasConverter, GasEstimator, L1GasEstimator};
use crate::metrics::Metrics;
use crate::quoting::{
    build_method_parameters, DisabledSimulator, EthCallSimulator, FreshPoolDetailsWrapper,
    MethodParameters, OfflineQuoteFetcher, OnChainQuoteFetcher, QuoteFetcher, SimulationOutcome,
    SimulationRequest, Simulator,
};
use crate::routing::{BestSplitParams, QuoteBestSplitFinder, QuoteSelector, RouteFinder, RouteQuoteAllocator};
use crate::rpc::proto::{PoolInRoute, QuoteRequest, QuoteResponse, TokenInRoute};
use crate::tokens::{ChainProviders, RpcTokenProvider, TokenMeta, TokenProvider};
use crate::types::{
    fine_bucket_label, is_native, u256_to_f64, HooksOption, Protocol, Quote, QuoteSplit,
    QuoteType, Route, SimulationStatus, TradeType, UsdBucket, NATIVE_ADDRESS,
};
use alloy::primitives::{Address, U256};
use anyhow::Result;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fallback gas price when the chain RPC cannot be asked (30 gwei).
const DEFAULT_GAS_PRICE_WEI: u64 = 30_000_000_000;

/// Router deadline applied when the request does not carry one.
const DEFAULT_DEADLINE_SECS: u64 = 1_800;

const DEFAULT_SLIPPAGE_PCT: f64 = 0.5;
const MAX_SLIPPAGE_PCT: f64 = 20.0;

#[derive(Debug, Error)]
pub enum QuoteError {
    /// Bad request; surfaced verbatim with a 400.
    #[error("{0}")]
    Validation(String),
    /// Nothing routable survived the pipeline; 404.
    #[error("{0}")]
    NotFound(String),
    /// Anything unclassified; 500.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub struct QuoteEngine {
    config: RouterConfig,
    providers: Arc<ChainProviders>,
    tokens: Arc<dyn TokenProvider>,
    discoverer: Arc<dyn PoolDiscoverer>,
    top_pools: TopPoolsSelector,
    route_finder: RouteFinder,
    allocator: RouteQuoteAllocator,
    fetcher: Arc<dyn QuoteFetcher>,
    gas_estimator: GasEstimator,
    gas_converter: GasConverter,
    split_finder: QuoteBestSplitFinder,
    simulator: Arc<dyn Simulator>,
    routes_cache: Arc<CachedRoutesRepository>,
    fresh: FreshPoolDetailsWrapper,
    pub metrics: Arc<Metrics>,
}

impl QuoteEngine {
    /// Production wiring: indexer-backed discovery behind the read-through
    /// cache with an empty-source fallback, on-chain quoters, eth_call
    /// simulation, Redis-or-memory route cache.
    pub async fn from_config(config: RouterConfig) -> Result<Arc<QuoteEngine>> {
        let metrics = Arc::new(Metrics::new());
        let providers = Arc::new(ChainProviders::from_urls(&config.rpc_urls)?);
        let tokens: Arc<dyn TokenProvider> = Arc::new(RpcTokenProvider::new(
            providers.clone(),
            config.cache.token_meta_ttl_secs,
        ));
        let store: Arc<dyn CacheStore> = match &config.redis_url {
            Some(url) => Arc::new(RedisStore::connect(url).await?),
            None => Arc::new(MemoryStore::new()),
        };

        let primary: Arc<dyn PoolDiscoverer> = match &config.indexer_url {
            Some(url) => Arc::new(IndexerPoolDiscoverer::new(url.clone())),
            None => Arc::new(StaticPoolDiscoverer::new("empty")),
        };
        let cached_primary = Arc::new(CachingPoolDiscoverer::new(
            primary,
            &config.cache,
            metrics.clone(),
        ));
        let fallback: Arc<dyn PoolDiscoverer> = Arc::new(StaticPoolDiscoverer::new("empty"));
        let per_protocol: Arc<dyn PoolDiscoverer> = Arc::new(FallbackPoolDiscoverer::new(
            cached_primary,
            fallback,
            metrics.clone(),
        ));
        let direct: Arc<dyn PoolDiscoverer> =
            Arc::new(DirectPoolDiscoverer::new(providers.clone()));
        let discoverer: Arc<dyn PoolDiscoverer> = Arc::new(DispatchingPoolDiscoverer::new(
            per_protocol.clone(),
            per_protocol.clone(),
            per_protocol,
            direct,
        ));

        let fetcher: Arc<dyn QuoteFetcher> = if config.rpc_urls.is_empty() {
            Arc::new(OfflineQuoteFetcher)
        } else {
            Arc::new(OnChainQuoteFetcher::new(providers.clone()))
        };
        let simulator: Arc<dyn Simulator> = if config.simulation.enabled {
            Arc::new(EthCallSimulator::new(providers.clone()))
        } else {
            Arc::new(DisabledSimulator)
        };

        Ok(Self::with_components(
            config, providers, tokens, discoverer, fetcher, simulator, store, metrics,
        ))
    }

    /// Explicit wiring, used by tests and bespoke deployments.
    #[allow(clippy::too_many_arguments)]
    pub fn with_components(
        config: RouterConfig,
        providers: Arc<ChainProviders>,
        tokens: Arc<dyn TokenProvider>,
        discoverer: Arc<dyn PoolDiscoverer>,
        fetcher: Arc<dyn QuoteFetcher>,
        simulator: Arc<dyn Simulator>,
        store: Arc<dyn CacheStore>,
        metrics: Arc<Metrics>,
    ) -> Arc<QuoteEngine> {
        let routes_cache = Arc::new(CachedRoutesRepository::new(
            store,
            config.cache.clone(),
            metrics.clone(),
        ));
        Arc::new(QuoteEngine {
            top_pools: TopPoolsSelector::new(config.top_pools.clone()),
            route_finder: RouteFinder::new(config.routing.clone(), metrics.clone()),
            allocator: RouteQuoteAllocator::new(config.routing.percentage_step),
            gas_estimator: GasEstimator::new(L1GasEstimator::new(
                providers.clone(),
                config.gas.clone(),
                metrics.clone(),
            )),
            gas_converter: GasConverter::new(tokens.clone(), metrics.clone()),
            split_finder: QuoteBestSplitFinder::new(metrics.clone()),
            fresh: FreshPoolDetailsWrapper::new(providers.clone()),
            routes_cache,
            config,
            providers,
            tokens,
            discoverer,
            fetcher,
            simulator,
            metrics,
        })
    }

    pub fn routes_cache(&self) -> &Arc<CachedRoutesRepository> {
        &self.routes_cache
    }

    // ── Request entry point ──────────────────────────────────────────────

    pub async fn quote(
        self: &Arc<Self>,
        request: QuoteRequest,
    ) -> Result<QuoteResponse, QuoteError> {
        Metrics::incr(&self.metrics.requests_total);
        let ctx = self.validate(&request)?;
        let info = ctx.chain.info();

        // Concurrent look-ups: token metadata, block number (when the
        // response wants it), gas price (fresh when the pair demands it).
        let gas_price_required = info.pair_requires_gas_price(&ctx.wrapped_in, &ctx.wrapped_out);
        let (meta_in, meta_out, block_number, gas_price) = tokio::join!(
            self.tokens.get_token(ctx.chain, ctx.wrapped_in),
            self.tokens.get_token(ctx.chain, ctx.wrapped_out),
            self.block_number_if_wanted(ctx.chain),
            self.gas_price(ctx.chain, gas_price_required)
        );
        let meta_in = meta_in.ok_or_else(|| {
            QuoteError::Validation(format!("Could not find token {:#x}", ctx.wrapped_in))
        })?;
        let meta_out = meta_out.ok_or_else(|| {
            QuoteError::Validation(format!("Could not find token {:#x}", ctx.wrapped_out))
        })?;
        let gas_price = gas_price?;

        // Fee-on-transfer is V2-only; V3/V4 accounting breaks on it.
        let mut protocols = ctx.protocols.clone();
        if meta_in.is_fee_on_transfer() || meta_out.is_fee_on_transfer() {
            debug!("FOT token detected; restricting to V2");
            protocols = vec![Protocol::V2];
        }

        // EXACT_OUT with a portion fee: route for the inflated output so
        // the user still receives the requested amount net of portion.
        let mut routed_amount = ctx.amount;
        if ctx.trade_type == TradeType::ExactOut && ctx.portion_bips > 0 {
            routed_amount =
                ctx.amount * U256::from(10_000 + ctx.portion_bips) / U256::from(10_000u32);
        }

        // USD notional buckets: coarse for the cache key, fine for metrics.
        let fixed_side_meta = match ctx.trade_type {
            TradeType::ExactIn => &meta_in,
            TradeType::ExactOut => &meta_out,
        };
        let (bucket, fine_bucket) = notional_buckets(fixed_side_meta, routed_amount);
        debug!("Notional buckets: {} / {}", bucket, fine_bucket);

        // Cached-route fast path.
        let all_protocols = [Protocol::V2, Protocol::V3, Protocol::V4]
            .iter()
            .all(|p| protocols.contains(p));
        let cacheable = ctx.quote_type == QuoteType::Fast
            && all_protocols
            && ctx.hooks == HooksOption::HooksInclusive;
        let mut hits_cached_routes = false;
        let mut routes: Vec<Route> = Vec::new();
        if cacheable {
            let lookup = self
                .routes_cache
                .get(ctx.chain, ctx.trade_type, ctx.key_in, ctx.key_out, bucket)
                .await;
            if !lookup.routes.is_empty() {
                hits_cached_routes = true;
                routes = lookup.routes;
                if lookup.needs_refresh {
                    self.spawn_refresh(&ctx, bucket);
                }
            }
        }

        if routes.is_empty() {
            routes = self
                .discover_and_find_routes(
                    ctx.chain,
                    ctx.wrapped_in,
                    ctx.wrapped_out,
                    &protocols,
                    ctx.hooks,
                    ctx.force_mixed,
                    ctx.quote_type == QuoteType::Fresh,
                )
                .await?;
        }
        routes.retain(|r| r.is_valid());
        if routes.is_empty() {
            Metrics::incr(&self.metrics.requests_not_found);
            return Err(QuoteError::NotFound("No route found".to_string()));
        }

        // Price the percentage grid and model gas per sub-route.
        let pairs = self.allocator.allocate(&routes, routed_amount);
        let fetched = self
            .fetcher
            .fetch(ctx.chain, ctx.trade_type, &pairs)
            .await;
        let mut by_percentage: HashMap<u32, Vec<Quote>> = HashMap::new();
        for quote in fetched.into_iter().flatten() {
            let mut quote = quote;
            self.attach_gas(&ctx, &mut quote, gas_price).await;
            by_percentage
                .entry(quote.percentage())
                .or_default()
                .push(quote);
        }
        if by_percentage.is_empty() {
            Metrics::incr(&self.metrics.requests_not_found);
            return Err(QuoteError::NotFound("No route could be priced".to_string()));
        }

        let mut candidates = self
            .split_finder
            .find(
                ctx.trade_type,
                by_percentage,
                &BestSplitParams {
                    percentage_step: self.config.routing.percentage_step,
                    max_splits: self.config.routing.max_splits,
                    max_split_routes: self.config.routing.max_split_routes,
                    timeout: Duration::from_millis(self.config.routing.route_split_timeout_ms),
                },
            )
            .await
            .map_err(|e| QuoteError::Internal(e))?;
        if candidates.is_empty() {
            Metrics::incr(&self.metrics.requests_not_found);
            return Err(QuoteError::NotFound("No split summed to 100%".to_string()));
        }

        // Express gas in the quote token, rank, keep the top N.
        let quote_token = match ctx.trade_type {
            TradeType::ExactIn => ctx.wrapped_out,
            TradeType::ExactOut => ctx.wrapped_in,
        };
        let pool_union: Vec<crate::types::Pool> = routes
            .iter()
            .flat_map(|r| r.pools.iter().cloned())
            .collect();
        self.gas_converter
            .convert_splits(ctx.chain, quote_token, &pool_union, &mut candidates)
            .await;
        let ranked = QuoteSelector::select(
            ctx.trade_type,
            candidates,
            self.config.simulation.simulate_top_n.max(1),
        );

        // Simulate in order; first success wins.
        let Some((mut winner, method_parameters, simulation)) =
            self.simulate_candidates(&ctx, ranked).await
        else {
            Metrics::incr(&self.metrics.requests_not_found);
            return Err(QuoteError::NotFound("No candidate survived".to_string()));
        };

        // Re-read pool state for the chosen routes only.
        {
            let mut winner_routes: Vec<Route> =
                winner.quotes.iter().map(|q| q.route.clone()).collect();
            self.fresh
                .refresh_routes(ctx.chain, &mut winner_routes)
                .await;
            for (quote, fresh_route) in winner.quotes.iter_mut().zip(winner_routes) {
                quote.route = fresh_route;
            }
        }

        // Write back on a cacheable miss with a non-failed simulation.
        if cacheable && !hits_cached_routes && simulation.status != SimulationStatus::Failed {
            let legs: Vec<Route> = winner.quotes.iter().map(|q| q.route.clone()).collect();
            if let Err(e) = self
                .routes_cache
                .insert(ctx.chain, ctx.trade_type, ctx.key_in, ctx.key_out, bucket, &legs)
                .await
            {
                warn!("Route cache write failed: {:#}", e);
            }
        }

        self.assemble_response(
            &ctx,
            winner,
            method_parameters,
            simulation,
            hits_cached_routes,
            block_number,
            gas_price,
            bucket,
        )
        .await
        .map_err(QuoteError::Internal)
    }

    // ── Validation ───────────────────────────────────────────────────────

    fn validate(&self, request: &QuoteRequest) -> Result<RequestContext, QuoteError> {
        let chain = Chain::from_id(request.token_in_chain_id)
            .ok_or_else(|| QuoteError::Validation("Unsupported chain".to_string()))?;
        if request.token_in_chain_id != request.token_out_chain_id {
            return Err(QuoteError::Validation(
                "Token in and out must be on the same chain".to_string(),
            ));
        }
        let token_in = parse_token(request.token_in_address.trim())?;
        let token_out = parse_token(request.token_out_address.trim())?;

        let info = chain.info();
        let wrapped_in = if is_native(&token_in) { info.wrapped_native } else { token_in };
        let wrapped_out = if is_native(&token_out) { info.wrapped_native } else { token_out };
        // Case folds in parsing; ETH aliases WETH through wrapping.
        if wrapped_in == wrapped_out {
            return Err(QuoteError::Validation(
                "Token in and out must not be the same".to_string(),
            ));
        }

        let amount = U256::from_str_radix(request.amount.trim(), 10)
            .map_err(|_| QuoteError::Validation("Invalid amount".to_string()))?;
        if amount.is_zero() {
            return Err(QuoteError::Validation(
                "Amount must be greater than 0".to_string(),
            ));
        }

        let trade_type = match request.trade_type.as_str() {
            "EXACT_IN" | "exactIn" => TradeType::ExactIn,
            "EXACT_OUT" | "exactOut" => TradeType::ExactOut,
            _ => return Err(QuoteError::Validation("Invalid trade type".to_string())),
        };
        let quote_type = match request.quote_type.as_deref() {
            None | Some("FAST") => QuoteType::Fast,
            Some("FRESH") => QuoteType::Fresh,
            _ => return Err(QuoteError::Validation("Invalid quote type".to_string())),
        };

        let slippage = request.slippage_tolerance.unwrap_or(DEFAULT_SLIPPAGE_PCT);
        if !(0.0..=MAX_SLIPPAGE_PCT).contains(&slippage) {
            return Err(QuoteError::Validation(
                "Slippage tolerance must not exceed 20".to_string(),
            ));
        }

        let recipient = match &request.recipient {
            Some(raw) => Some(raw.parse::<Address>().map_err(|_| {
                QuoteError::Validation("Invalid recipient address".to_string())
            })?),
            None => None,
        };
        let simulate_from = match &request.simulate_from_address {
            Some(raw) => Some(raw.parse::<Address>().map_err(|_| {
                QuoteError::Validation("Invalid simulateFromAddress".to_string())
            })?),
            None => None,
        };

        let protocols = match &request.protocols {
            Some(raw) => crate::types::Protocol::parse_list(raw)
                .ok_or_else(|| QuoteError::Validation("Invalid protocols".to_string()))?,
            None => vec![Protocol::V2, Protocol::V3, Protocol::V4, Protocol::Mixed],
        };
        if protocols == [Protocol::Mixed] {
            return Err(QuoteError::Validation(
                "Mixed protocol must not be requested alone".to_string(),
            ));
        }

        let hooks = match request.hooks_options.as_deref() {
            None | Some("HOOKS_INCLUSIVE") => HooksOption::HooksInclusive,
            Some("HOOKS_ONLY") => HooksOption::HooksOnly,
            Some("NO_HOOKS") => HooksOption::NoHooks,
            _ => return Err(QuoteError::Validation("Invalid hooksOptions".to_string())),
        };

        let portion_bips = request.portion_bips.unwrap_or(0);
        if portion_bips > 10_000 {
            return Err(QuoteError::Validation("Invalid portionBips".to_string()));
        }

        Ok(RequestContext {
            chain,
            token_in,
            token_out,
            wrapped_in,
            wrapped_out,
            key_in: if is_native(&token_in) { NATIVE_ADDRESS } else { token_in },
            key_out: if is_native(&token_out) { NATIVE_ADDRESS } else { token_out },
            amount,
            trade_type,
            quote_type,
            protocols,
            hooks,
            force_mixed: request.force_mixed.unwrap_or(false),
            recipient,
            simulate_from,
            slippage,
            deadline_secs: request.deadline.unwrap_or(DEFAULT_DEADLINE_SECS),
            portion_bips,
        })
    }

    // ── Pipeline stages ──────────────────────────────────────────────────

    async fn block_number_if_wanted(&self, chain: Chain) -> Option<u64> {
        if !self.config.include_block_number {
            return None;
        }
        match self.providers.block_number(chain).await {
            Ok(block) => Some(block),
            Err(e) => {
                debug!("Block number fetch failed: {:#}", e);
                None
            }
        }
    }

    async fn gas_price(&self, chain: Chain, required: bool) -> Result<U256, QuoteError> {
        match self.providers.gas_price(chain).await {
            Ok(price) => Ok(U256::from(price)),
            Err(e) if required => Err(QuoteError::Internal(
                e.context("Gas price fetch failed for a pair that requires it"),
            )),
            Err(e) => {
                debug!("Gas price fetch failed, using default: {:#}", e);
                Ok(U256::from(DEFAULT_GAS_PRICE_WEI))
            }
        }
    }

    /// Per-protocol discovery fan-out, top-pool selection, then route
    /// enumeration. Mixed routes come from a second pass over the union.
    #[allow(clippy::too_many_arguments)]
    async fn discover_and_find_routes(
        &self,
        chain: Chain,
        wrapped_in: Address,
        wrapped_out: Address,
        protocols: &[Protocol],
        hooks: HooksOption,
        force_mixed: bool,
        skip_token_cache: bool,
    ) -> Result<Vec<Route>, QuoteError> {
        let want_mixed = force_mixed || protocols.contains(&Protocol::Mixed);
        let mut concrete: Vec<Protocol> = protocols
            .iter()
            .copied()
            .filter(|p| *p != Protocol::Mixed)
            .collect();
        if want_mixed && concrete.is_empty() {
            concrete = Protocol::concrete().to_vec();
        }

        let discoveries = join_all(concrete.iter().map(|protocol| {
            let query = PoolQuery {
                chain,
                protocol: *protocol,
                token_in: wrapped_in,
                token_out: wrapped_out,
                hooks,
                skip_token_cache,
            };
            async move { (*protocol, self.discoverer.get_pools_for_tokens(&query).await) }
        }))
        .await;

        let mut per_protocol: HashMap<Protocol, Vec<crate::types::Pool>> = HashMap::new();
        for (protocol, result) in discoveries {
            let infos = result.map_err(|e| QuoteError::Internal(e))?;
            let synthesized =
                DirectPoolDiscoverer::candidates(chain, wrapped_in, wrapped_out, protocol, hooks);
            let selected =
                self.top_pools
                    .select(chain, &infos, wrapped_in, wrapped_out, &synthesized);
            let pools: Vec<crate::types::Pool> =
                selected.iter().filter_map(|info| info.to_pool()).collect();
            per_protocol.insert(protocol, pools);
        }

        let mut routes: Vec<Route> = Vec::new();
        if !force_mixed {
            for protocol in &concrete {
                if let Some(pools) = per_protocol.get(protocol) {
                    routes.extend(self.route_finder.find_routes(
                        chain,
                        pools,
                        wrapped_in,
                        wrapped_out,
                        false,
                    ));
                }
            }
        }
        if want_mixed {
            let union: Vec<crate::types::Pool> =
                per_protocol.values().flatten().cloned().collect();
            let mixed = self
                .route_finder
                .find_routes(chain, &union, wrapped_in, wrapped_out, true)
                .into_iter()
                .filter(|r| r.protocol == Protocol::Mixed);
            routes.extend(mixed);
        }
        Ok(routes)
    }

    /// Gas details for one priced sub-route. Calldata is only built on
    /// chains with an L1 data term.
    async fn attach_gas(&self, ctx: &RequestContext, quote: &mut Quote, gas_price: U256) {
        let needs_calldata = ctx.chain == Chain::Arbitrum || ctx.chain.is_op_stack();
        let calldata = if needs_calldata {
            build_method_parameters(
                ctx.chain,
                &QuoteSplit::singleton(quote.clone()),
                ctx.trade_type,
                ctx.recipient,
                ctx.slippage,
                ctx.deadline_secs,
                is_native(&ctx.token_in),
            )
            .map(|p| p.calldata.to_vec())
            .unwrap_or_default()
        } else {
            Vec::new()
        };
        let ticks = quote.ticks_crossed.clone();
        quote.gas_details = Some(
            self.gas_estimator
                .estimate(&quote.route, &ticks, gas_price, &calldata)
                .await,
        );
    }

    /// Try the ranked candidates in order. Returns the winning split, its
    /// method parameters (when they could be built) and the simulation
    /// outcome; None only for an empty candidate list.
    async fn simulate_candidates(
        self: &Arc<Self>,
        ctx: &RequestContext,
        ranked: Vec<QuoteSplit>,
    ) -> Option<(QuoteSplit, Option<MethodParameters>, SimulationOutcome)> {
        let native_in = is_native(&ctx.token_in);
        let mut first: Option<(QuoteSplit, Option<MethodParameters>)> = None;
        let mut last_failure: Option<SimulationOutcome> = None;

        for candidate in &ranked {
            let params = match build_method_parameters(
                ctx.chain,
                candidate,
                ctx.trade_type,
                ctx.recipient.or(ctx.simulate_from),
                ctx.slippage,
                ctx.deadline_secs,
                native_in,
            ) {
                Ok(params) => params,
                Err(e) => {
                    // Build failure skips the candidate, never the request.
                    Metrics::incr(&self.metrics.candidate_build_failures);
                    debug!("Calldata build failed, skipping candidate: {:#}", e);
                    if first.is_none() {
                        first = Some((candidate.clone(), None));
                    }
                    continue;
                }
            };
            if first.is_none() {
                first = Some((candidate.clone(), Some(params.clone())));
            }

            let Some(from) = ctx.simulate_from else {
                // No from-address: simulation cannot run at all.
                Metrics::incr(&self.metrics.simulations_unattempted);
                return Some((
                    candidate.clone(),
                    Some(params),
                    SimulationOutcome::unattempted(),
                ));
            };
            let outcome = self
                .simulator
                .simulate(&SimulationRequest {
                    chain: ctx.chain,
                    from,
                    to: params.to,
                    calldata: params.calldata.clone(),
                    value: params.value,
                })
                .await;
            match outcome.status {
                SimulationStatus::Succeeded => {
                    Metrics::incr(&self.metrics.simulations_succeeded);
                    return Some((candidate.clone(), Some(params), outcome));
                }
                SimulationStatus::Unattempted => {
                    Metrics::incr(&self.metrics.simulations_unattempted);
                    return Some((candidate.clone(), Some(params), outcome));
                }
                SimulationStatus::Failed => {
                    Metrics::incr(&self.metrics.simulations_failed);
                    debug!(
                        "Simulation failed for candidate: {:?}",
                        outcome.description
                    );
                    last_failure = Some(outcome);
                }
            }
        }

        // Every candidate failed (or none could be built): return the
        // best-by-amount candidate and report the failure.
        let (winner, params) = match first {
            Some(pair) => pair,
            None => (ranked.into_iter().next()?, None),
        };
        let outcome = last_failure.unwrap_or_else(SimulationOutcome::unattempted);
        Some((winner, params, outcome))
    }

    fn spawn_refresh(&self, ctx: &RequestContext, bucket: UsdBucket) {
        if self.config.sync_handler || self.config.skip_async_cache_update {
            return;
        }
        let key = CachedRoutesRepository::cache_key(
            ctx.chain,
            ctx.trade_type,
            ctx.key_in,
            ctx.key_out,
            bucket,
        );
        if !self.routes_cache.try_begin_refresh(&key) {
            return; // a refresh is already in flight
        }
        let chain = ctx.chain;
        let trade_type = ctx.trade_type;
        let (wrapped_in, wrapped_out) = (ctx.wrapped_in, ctx.wrapped_out);
        let (key_in, key_out) = (ctx.key_in, ctx.key_out);
        let routes_cache = self.routes_cache.clone();
        let discoverer = self.discoverer.clone();
        let top_pools = TopPoolsSelector::new(self.config.top_pools.clone());
        let route_finder = RouteFinder::new(self.config.routing.clone(), self.metrics.clone());
        tokio::spawn(async move {
            let mut routes: Vec<Route> = Vec::new();
            for protocol in Protocol::concrete() {
                let query = PoolQuery {
                    chain,
                    protocol,
                    token_in: wrapped_in,
                    token_out: wrapped_out,
                    hooks: HooksOption::HooksInclusive,
                    skip_token_cache: true,
                };
                let Ok(infos) = discoverer.get_pools_for_tokens(&query).await else {
                    continue;
                };
                let synthesized = DirectPoolDiscoverer::candidates(
                    chain,
                    wrapped_in,
                    wrapped_out,
                    protocol,
                    HooksOption::HooksInclusive,
                );
                let selected =
                    top_pools.select(chain, &infos, wrapped_in, wrapped_out, &synthesized);
                let pools: Vec<crate::types::Pool> =
                    selected.iter().filter_map(|info| info.to_pool()).collect();
                routes.extend(route_finder.find_routes(
                    chain,
                    &pools,
                    wrapped_in,
                    wrapped_out,
                    false,
                ));
            }
            if !routes.is_empty() {
                if let Err(e) = routes_cache
                    .insert(chain, trade_type, key_in, key_out, bucket, &routes)
                    .await
                {
                    warn!("Refresh-ahead cache write failed: {:#}", e);
                }
            }
            routes_cache.finish_refresh(&key);
            info!("Refreshed cached routes for {}", key);
        });
    }

    // ── Response assembly ────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    async fn assemble_response(
        &self,
        ctx: &RequestContext,
        winner: QuoteSplit,
        method_parameters: Option<MethodParameters>,
        simulation: SimulationOutcome,
        hits_cached_routes: bool,
        block_number: Option<u64>,
        gas_price: U256,
        bucket: UsdBucket,
    ) -> Result<QuoteResponse> {
        let total_quoted = winner.total_quoted();
        let total_adjusted = winner.total_gas_adjusted(ctx.trade_type);
        let gas_use = winner.total_gas_use();
        let gas_quote: U256 = winner
            .quotes
            .iter()
            .filter_map(|q| q.gas_details.as_ref())
            .fold(U256::ZERO, |acc, g| acc + g.gas_cost_in_quote_token);
        let gas_usd: f64 = winner
            .quotes
            .iter()
            .filter_map(|q| q.gas_details.as_ref())
            .map(|g| g.gas_cost_in_usd)
            .sum();

        // Portion accounting. EXACT_IN nets the portion out of the
        // reported output; EXACT_OUT already routed the inflated input.
        let portion_amount = if ctx.portion_bips > 0 {
            Some(match ctx.trade_type {
                TradeType::ExactIn => {
                    total_quoted * U256::from(ctx.portion_bips) / U256::from(10_000u32)
                }
                TradeType::ExactOut => {
                    ctx.amount * U256::from(ctx.portion_bips) / U256::from(10_000u32)
                }
            })
        } else {
            None
        };
        let net_quoted = match (ctx.trade_type, portion_amount) {
            (TradeType::ExactIn, Some(portion)) => total_quoted - portion,
            _ => total_quoted,
        };

        let token_meta = self.route_token_metadata(ctx, &winner).await;
        let route_wire = self.wire_routes(ctx, &winner, portion_amount, &token_meta);
        let route_string = winner
            .quotes
            .iter()
            .map(|q| q.route.route_string())
            .collect::<Vec<_>>()
            .join(", ");
        let price_impact = price_impact_pct(&winner, ctx.trade_type);

        Ok(QuoteResponse {
            block_number: block_number.map(|b| b.to_string()),
            quote_amount: net_quoted.to_string(),
            quote_gas_adjusted: total_adjusted.to_string(),
            gas_price_wei: gas_price.to_string(),
            gas_use_estimate: gas_use.to_string(),
            gas_use_estimate_quote: gas_quote.to_string(),
            gas_use_estimate_usd: format!("{:.2}", gas_usd),
            route_string,
            route: route_wire,
            hits_cached_routes,
            simulation_status: simulation.status,
            simulation_error: simulation.status == SimulationStatus::Failed,
            simulation_description: simulation.description,
            method_parameters,
            portion_amount: portion_amount.map(|p| p.to_string()),
            price_impact: format!("{:.4}", price_impact),
            quote_id: Uuid::new_v4().to_string(),
            usd_bucket: bucket.as_str().to_string(),
        })
    }

    async fn route_token_metadata(
        &self,
        ctx: &RequestContext,
        winner: &QuoteSplit,
    ) -> HashMap<Address, TokenMeta> {
        let mut unique: Vec<Address> = Vec::new();
        for quote in &winner.quotes {
            for token in quote.route.token_path() {
                if !unique.contains(&token) {
                    unique.push(token);
                }
            }
        }
        let metas = join_all(
            unique
                .iter()
                .map(|token| self.tokens.get_token(ctx.chain, *token)),
        )
        .await;
        unique
            .into_iter()
            .zip(metas)
            .filter_map(|(addr, meta)| meta.map(|m| (addr, m)))
            .collect()
    }

    /// Wire-shape the winner: synthetic pools stripped, orientation
    /// following the caller's tokenIn, amountIn on first legs, amountOut
    /// on last legs (net of portion on the final route).
    fn wire_routes(
        &self,
        ctx: &RequestContext,
        winner: &QuoteSplit,
        portion_amount: Option<U256>,
        token_meta: &HashMap<Address, TokenMeta>,
    ) -> Vec<Vec<PoolInRoute>> {
        let token_wire = |addr: Address| -> TokenInRoute {
            match token_meta.get(&addr) {
                Some(meta) => TokenInRoute {
                    address: format!("{:#x}", addr),
                    decimals: meta.decimals,
                    symbol: meta.symbol.clone(),
                    chain_id: ctx.chain.id(),
                    buy_fee_bps: meta.buy_fee_bps,
                    sell_fee_bps: meta.sell_fee_bps,
                },
                None => TokenInRoute {
                    address: format!("{:#x}", addr),
                    decimals: 18,
                    symbol: "UNKNOWN".to_string(),
                    chain_id: ctx.chain.id(),
                    buy_fee_bps: 0,
                    sell_fee_bps: 0,
                },
            }
        };

        let last_route = winner.quotes.len().saturating_sub(1);
        winner
            .quotes
            .iter()
            .enumerate()
            .map(|(route_idx, quote)| {
                // Synthetic wrapping legs are stripped from the shape.
                let pools: Vec<_> = quote
                    .route
                    .pools
                    .iter()
                    .filter(|p| !p.is_synthetic_native_wrapper())
                    .collect();
                let mut current = if pools
                    .first()
                    .map(|p| p.involves(&quote.route.token_in))
                    .unwrap_or(false)
                {
                    quote.route.token_in
                } else {
                    // The stripped wrapper moved the entry point to the
                    // wrapped form.
                    ctx.chain.info().wrapped_native
                };
                let last_pool = pools.len().saturating_sub(1);
                pools
                    .iter()
                    .enumerate()
                    .map(|(i, pool)| {
                        let next = pool.other_token(&current).unwrap_or(quote.route.token_out);
                        let mut wire = PoolInRoute::from_pool(
                            pool,
                            token_wire(current),
                            token_wire(next),
                        );
                        if i == 0 {
                            let amount_in = match ctx.trade_type {
                                TradeType::ExactIn => quote.amount,
                                TradeType::ExactOut => quote.quoted,
                            };
                            wire.amount_in = Some(amount_in.to_string());
                        }
                        if i == last_pool {
                            let mut amount_out = match ctx.trade_type {
                                TradeType::ExactIn => quote.quoted,
                                TradeType::ExactOut => quote.amount,
                            };
                            if ctx.trade_type == TradeType::ExactIn && route_idx == last_route {
                                if let Some(portion) = portion_amount {
                                    amount_out = amount_out.saturating_sub(portion);
                                }
                            }
                            wire.amount_out = Some(amount_out.to_string());
                        }
                        current = next;
                        wire
                    })
                    .collect()
            })
            .collect()
    }
}

/// Parsed and validated request.
struct RequestContext {
    chain: Chain,
    token_in: Address,
    token_out: Address,
    wrapped_in: Address,
    wrapped_out: Address,
    /// Cache-key forms: native normalised to the zero address.
    key_in: Address,
    key_out: Address,
    amount: U256,
    trade_type: TradeType,
    quote_type: QuoteType,
    protocols: Vec<Protocol>,
    hooks: HooksOption,
    force_mixed: bool,
    recipient: Option<Address>,
    simulate_from: Option<Address>,
    slippage: f64,
    deadline_secs: u64,
    portion_bips: u32,
}

/// Native currency is addressable by symbol or the zero address.
fn parse_token(raw: &str) -> Result<Address, QuoteError> {
    match raw.to_ascii_uppercase().as_str() {
        "ETH" | "MATIC" | "POL" | "NATIVE" => return Ok(NATIVE_ADDRESS),
        _ => {}
    }
    raw.parse::<Address>()
        .map_err(|_| QuoteError::Validation(format!("Invalid token address {}", raw)))
}

fn notional_buckets(meta: &TokenMeta, amount: U256) -> (UsdBucket, String) {
    match meta.usd_price {
        Some(price) => {
            let scale = 10f64.powi(meta.decimals as i32);
            let notional = u256_to_f64(amount) / scale * price;
            (UsdBucket::from_usd(notional), fine_bucket_label(notional))
        }
        // No price source: a wrong bucket only fragments the cache.
        None => (UsdBucket::Usd100, "unknown".to_string()),
    }
}

/// Mid-price expectation vs the realised quote, in percent, clamped.
fn price_impact_pct(winner: &QuoteSplit, trade_type: TradeType) -> f64 {
    let mut spot_total = 0.0f64;
    let mut actual_total = 0.0f64;
    for quote in &winner.quotes {
        let path = quote.route.token_path();
        if path.is_empty() {
            return 0.0;
        }
        let mut spot = u256_to_f64(quote.amount);
        for (i, pool) in quote.route.pools.iter().enumerate() {
            let Some(price) = pool.mid_price(&path[i]) else {
                return 0.0;
            };
            match trade_type {
                TradeType::ExactIn => spot *= price,
                TradeType::ExactOut => {
                    if price == 0.0 {
                        return 0.0;
                    }
                    spot /= price;
                }
            }
        }
        spot_total += spot;
        actual_total += u256_to_f64(quote.quoted);
    }
    if spot_total == 0.0 {
        return 0.0;
    }
    let impact = match trade_type {
        TradeType::ExactIn => (spot_total - actual_total) / spot_total * 100.0,
        TradeType::ExactOut => (actual_total - spot_total) / spot_total * 100.0,
    };
    impact.clamp(-100.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::StaticPoolDiscoverer;
    use crate::tokens::StaticTokenProvider;
    use crate::types::PoolInfo;

    const USDC_MAINNET: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn base_request() -> QuoteRequest {
        serde_json::from_value(serde_json::json!({
            "tokenInAddress": "ETH",
            "tokenInChainId": 1,
            "tokenOutAddress": USDC_MAINNET,
            "tokenOutChainId": 1,
            "amount": "1000000000000000000",
            "tradeType": "EXACT_IN",
        }))
        .expect("request")
    }

    fn wrapped() -> Address {
        Chain::Mainnet.info().wrapped_native
    }

    fn usdc() -> Address {
        USDC_MAINNET.parse().expect("usdc")
    }

    /// A deep WETH/USDC V2 pool (1 ETH ~ 3300 USDC at 18/6 decimals).
    fn weth_usdc_pool() -> PoolInfo {
        let (token0, token1) = if wrapped() < usdc() {
            (wrapped(), usdc())
        } else {
            (usdc(), wrapped())
        };
        let (reserve0, reserve1) = if token0 == wrapped() {
            (1_000_000_000_000_000_000_000u128, 3_300_000_000_000u128)
        } else {
            (3_300_000_000_000u128, 1_000_000_000_000_000_000_000u128)
        };
        PoolInfo {
            protocol: Protocol::V2,
            address: Address::repeat_byte(0xaa),
            token0,
            token1,
            reserve0: Some(reserve0),
            reserve1: Some(reserve1),
            fee: None,
            liquidity: None,
            sqrt_price_x96: None,
            tick_current: None,
            tick_spacing: None,
            hooks: None,
            pool_id: None,
            tvl_eth: 1_000.0,
            tvl_usd: 3_300_000.0,
        }
    }

    async fn engine_with_pool() -> Arc<QuoteEngine> {
        let discoverer = Arc::new(StaticPoolDiscoverer::new("static-test"));
        discoverer
            .set_pools(Chain::Mainnet, Protocol::V2, vec![weth_usdc_pool()])
            .await;
        QuoteEngine::with_components(
            RouterConfig::default(),
            Arc::new(ChainProviders::from_urls(&HashMap::new()).expect("providers")),
            Arc::new(StaticTokenProvider::new()),
            discoverer,
            Arc::new(OfflineQuoteFetcher),
            Arc::new(DisabledSimulator),
            Arc::new(MemoryStore::new()),
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test]
    async fn test_same_token_rejected() {
        let engine = engine_with_pool().await;
        let mut request = base_request();
        request.token_in_address = "0x1111111111111111111111111111111111111111".to_string();
        request.token_out_address = "0x1111111111111111111111111111111111111111".to_string();
        let err = engine.quote(request).await.expect_err("must reject");
        match err {
            QuoteError::Validation(msg) => {
                assert_eq!(msg, "Token in and out must not be the same")
            }
            other => panic!("wrong error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eth_weth_aliases_to_same_token() {
        let engine = engine_with_pool().await;
        let mut request = base_request();
        request.token_in_address = "ETH".to_string();
        request.token_out_address = format!("{:#x}", wrapped());
        let err = engine.quote(request).await.expect_err("must reject");
        assert!(matches!(err, QuoteError::Validation(msg) if msg.contains("must not be the same")));
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let engine = engine_with_pool().await;
        let mut request = base_request();
        request.amount = "0".to_string();
        let err = engine.quote(request).await.expect_err("must reject");
        assert!(matches!(err, QuoteError::Validation(msg) if msg.contains("greater than 0")));
    }

    #[tokio::test]
    async fn test_slippage_boundary() {
        let engine = engine_with_pool().await;
        let mut request = base_request();
        request.slippage_tolerance = Some(21.0);
        assert!(matches!(
            engine.quote(request).await,
            Err(QuoteError::Validation(_))
        ));
        // Exactly 20 is accepted (and succeeds end to end)
        let mut request = base_request();
        request.slippage_tolerance = Some(20.0);
        assert!(engine.quote(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_mixed_alone_rejected() {
        let engine = engine_with_pool().await;
        let mut request = base_request();
        request.protocols = Some("mixed".to_string());
        assert!(matches!(
            engine.quote(request).await,
            Err(QuoteError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_chain_rejected() {
        let engine = engine_with_pool().await;
        let mut request = base_request();
        request.token_in_chain_id = 56;
        request.token_out_chain_id = 56;
        assert!(matches!(
            engine.quote(request).await,
            Err(QuoteError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_no_routes_is_404() {
        let discoverer = Arc::new(StaticPoolDiscoverer::new("static-test"));
        let engine = QuoteEngine::with_components(
            RouterConfig::default(),
            Arc::new(ChainProviders::from_urls(&HashMap::new()).expect("providers")),
            Arc::new(StaticTokenProvider::new()),
            discoverer,
            Arc::new(OfflineQuoteFetcher),
            Arc::new(DisabledSimulator),
            Arc::new(MemoryStore::new()),
            Arc::new(Metrics::new()),
        );
        let err = engine.quote(base_request()).await.expect_err("no pools");
        assert!(matches!(err, QuoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_quote_end_to_end_and_cache_hit() {
        let engine = engine_with_pool().await;

        let first = engine.quote(base_request()).await.expect("first quote");
        assert!(!first.hits_cached_routes);
        assert_eq!(first.simulation_status, SimulationStatus::Unattempted);
        assert!(!first.route.is_empty());
        // ~3300 USDC minus the 0.3% fee, 6 decimals
        let out: u128 = first.quote_amount.parse().expect("amount");
        assert!(out > 3_000_000_000 && out < 3_300_000_000);
        assert_eq!(first.usd_bucket, "USD_1_000");

        // Same pair, same bucket: the second quote rides the cache.
        let second = engine.quote(base_request()).await.expect("second quote");
        assert!(second.hits_cached_routes);
        assert_eq!(first.route_string, second.route_string);
    }

    #[tokio::test]
    async fn test_exact_out_portion_inflates_routing() {
        let engine = engine_with_pool().await;
        let mut request = base_request();
        request.trade_type = "EXACT_OUT".to_string();
        request.amount = "1000000000".to_string(); // 1000 USDC out
        request.token_in_address = format!("{:#x}", wrapped());
        request.token_out_address = USDC_MAINNET.to_string();
        request.portion_bips = Some(100); // 1%

        let response = engine.quote(request).await.expect("quote");
        // Portion of the requested output
        assert_eq!(response.portion_amount.as_deref(), Some("10000000"));
        // The routed input covers 1010 USDC of output
        let needed: u128 = response.quote_amount.parse().expect("amount");
        assert!(needed > 0);
    }

    #[tokio::test]
    async fn test_first_pool_oriented_from_caller_token_in() {
        let engine = engine_with_pool().await;
        let response = engine.quote(base_request()).await.expect("quote");
        let first_leg = &response.route[0][0];
        // Caller traded native; the first real pool starts at wrapped
        assert_eq!(
            first_leg.token_in.address,
            format!("{:#x}", wrapped())
        );
        assert!(first_leg.amount_in.is_some());
        let last_leg = response.route[0].last().expect("leg");
        assert!(last_leg.amount_out.is_some());
    }
}
