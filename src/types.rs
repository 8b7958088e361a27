//! Core data structures for the route quoting pipeline
//!
//! Pools are a tagged union over the supported AMM protocols (V2/V3/V4);
//! every protocol-polymorphic operation (gas formula, mid-price, wire
//! conversion) dispatches on the tag, never on a class hierarchy.

use crate::chains::Chain;
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The native currency pseudo-address (ETH on mainnet, the chain's
/// ether-like asset elsewhere). Cache keys and route endpoints normalise
/// native to this value.
pub const NATIVE_ADDRESS: Address = Address::ZERO;

/// Sentinel tick spacing for the synthetic V4 ETH<->WETH wrapping pool.
/// i32::MAX is far outside the on-chain tick-spacing domain (bounded by
/// 32767), so the response strip-filter can never hit a real pool.
pub const FAKE_TICK_SPACING: i32 = i32::MAX;

/// Returns true for the native-currency pseudo-address.
pub fn is_native(addr: &Address) -> bool {
    *addr == NATIVE_ADDRESS
}

// ── Enums ────────────────────────────────────────────────────────────────────

/// AMM protocol families we can route through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    V2,
    V3,
    V4,
    /// A route whose pools span more than one protocol. Only valid as a
    /// route tag, never as a pool tag.
    Mixed,
}

impl Protocol {
    /// Parse the comma-separated request form: "v2,v3,v4,mixed"
    pub fn parse_list(s: &str) -> Option<Vec<Protocol>> {
        let mut out = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.to_ascii_lowercase().as_str() {
                "v2" => out.push(Protocol::V2),
                "v3" => out.push(Protocol::V3),
                "v4" => out.push(Protocol::V4),
                "mixed" => out.push(Protocol::Mixed),
                _ => return None,
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// The concrete pool protocols (everything except Mixed).
    pub fn concrete() -> [Protocol; 3] {
        [Protocol::V2, Protocol::V3, Protocol::V4]
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::V2 => write!(f, "V2"),
            Protocol::V3 => write!(f, "V3"),
            Protocol::V4 => write!(f, "V4"),
            Protocol::Mixed => write!(f, "MIXED"),
        }
    }
}

/// Trade direction: amount fixed on the input or the output side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeType {
    ExactIn,
    ExactOut,
}

impl TradeType {
    /// Stable cache-key segment. Never change these strings: cache keys
    /// must survive deploys.
    pub fn cache_segment(&self) -> &'static str {
        match self {
            TradeType::ExactIn => "EXACT_IN",
            TradeType::ExactOut => "EXACT_OUT",
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.cache_segment())
    }
}

/// Quote freshness requested by the caller. Fast quotes may be served from
/// the hot route cache; Fresh quotes always re-run discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteType {
    Fast,
    Fresh,
}

/// V4 hook filtering for pool discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HooksOption {
    /// Keep hooked and hook-less pools.
    HooksInclusive,
    /// Keep only pools with a non-zero hooks address.
    HooksOnly,
    /// Keep only zero-hook pools.
    NoHooks,
}

impl HooksOption {
    pub fn admits(&self, hooks: &Address) -> bool {
        match self {
            HooksOption::HooksInclusive => true,
            HooksOption::HooksOnly => *hooks != Address::ZERO,
            HooksOption::NoHooks => *hooks == Address::ZERO,
        }
    }
}

/// Outcome of the post-ranking simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationStatus {
    Unattempted,
    Succeeded,
    Failed,
}

// ── Pools ────────────────────────────────────────────────────────────────────

/// Constant-product pool (Uniswap V2 and forks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V2Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: u128,
    pub reserve1: u128,
}

/// Concentrated-liquidity pool (Uniswap V3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    /// Fee in hundredths of a bip (24-bit on chain: 500, 3000, 10000, ...)
    pub fee: u32,
    pub liquidity: u128,
    /// Q64.96 sqrt price (160-bit on chain)
    pub sqrt_price_x96: U256,
    /// Current tick (signed 24-bit on chain)
    pub tick_current: i32,
}

/// V4 pool: V3 fields plus tick spacing, hooks and the singleton pool id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V4Pool {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee: u32,
    pub liquidity: u128,
    pub sqrt_price_x96: U256,
    pub tick_current: i32,
    pub tick_spacing: i32,
    pub hooks: Address,
    pub pool_id: B256,
}

/// Tagged pool variant. token0 < token1 by address in every variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pool {
    V2(V2Pool),
    V3(V3Pool),
    V4(V4Pool),
}

impl Pool {
    pub fn protocol(&self) -> Protocol {
        match self {
            Pool::V2(_) => Protocol::V2,
            Pool::V3(_) => Protocol::V3,
            Pool::V4(_) => Protocol::V4,
        }
    }

    pub fn address(&self) -> Address {
        match self {
            Pool::V2(p) => p.address,
            Pool::V3(p) => p.address,
            Pool::V4(p) => p.address,
        }
    }

    pub fn token0(&self) -> Address {
        match self {
            Pool::V2(p) => p.token0,
            Pool::V3(p) => p.token0,
            Pool::V4(p) => p.token0,
        }
    }

    pub fn token1(&self) -> Address {
        match self {
            Pool::V2(p) => p.token1,
            Pool::V3(p) => p.token1,
            Pool::V4(p) => p.token1,
        }
    }

    pub fn involves(&self, token: &Address) -> bool {
        self.token0() == *token || self.token1() == *token
    }

    /// The opposite side of the pair, or None if the token is not in it.
    pub fn other_token(&self, token: &Address) -> Option<Address> {
        if self.token0() == *token {
            Some(self.token1())
        } else if self.token1() == *token {
            Some(self.token0())
        } else {
            None
        }
    }

    pub fn fee(&self) -> u32 {
        match self {
            Pool::V2(_) => 3000, // fixed 0.30%
            Pool::V3(p) => p.fee,
            Pool::V4(p) => p.fee,
        }
    }

    /// True if this is the synthetic ETH<->WETH wrapping pool inserted
    /// during mixed-route enumeration.
    pub fn is_synthetic_native_wrapper(&self) -> bool {
        matches!(self, Pool::V4(p) if p.tick_spacing == FAKE_TICK_SPACING)
    }

    /// Synthetic zero-fee V4 pool connecting the native currency to its
    /// wrapped form. Kept for enumeration and pricing, stripped from the
    /// response shape.
    pub fn synthetic_native_wrapper(chain: Chain) -> Pool {
        let wrapped = chain.info().wrapped_native;
        // token0 < token1 holds: the native pseudo-address is all zeros.
        Pool::V4(V4Pool {
            address: Address::ZERO,
            token0: NATIVE_ADDRESS,
            token1: wrapped,
            fee: 0,
            liquidity: u128::MAX,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: 0,
            tick_spacing: FAKE_TICK_SPACING,
            hooks: Address::ZERO,
            pool_id: B256::ZERO,
        })
    }

    /// Whether the pool may participate in route construction.
    /// Zero-liquidity V3 pools are dropped; zero-liquidity V4 pools are
    /// dropped only when they also carry no hooks (a hook can source
    /// liquidity externally).
    pub fn is_routable(&self) -> bool {
        match self {
            Pool::V2(p) => p.reserve0 > 0 && p.reserve1 > 0,
            Pool::V3(p) => p.liquidity > 0,
            Pool::V4(p) => p.liquidity > 0 || p.hooks != Address::ZERO,
        }
    }

    /// Raw mid-price of `token_in` in units of the opposite token, with no
    /// decimal adjustment. V2 uses the reserve ratio; V3/V4 use the
    /// tick-based price (sqrtPriceX96 squaring loses precision in f64,
    /// tick never does).
    pub fn mid_price(&self, token_in: &Address) -> Option<f64> {
        let zero_for_one = self.token0() == *token_in;
        if !zero_for_one && self.token1() != *token_in {
            return None;
        }
        let price_token1_per_token0 = match self {
            Pool::V2(p) => {
                if p.reserve0 == 0 {
                    return Some(0.0);
                }
                p.reserve1 as f64 / p.reserve0 as f64
            }
            Pool::V3(p) => 1.0001_f64.powi(p.tick_current),
            Pool::V4(p) => 1.0001_f64.powi(p.tick_current),
        };
        if zero_for_one {
            Some(price_token1_per_token0)
        } else if price_token1_per_token0 == 0.0 {
            None // division by zero — pathological pool
        } else {
            Some(1.0 / price_token1_per_token0)
        }
    }
}

// ── PoolInfo (cached/serialised projection) ──────────────────────────────────

/// Serialised projection of a pool used by discovery and top-pool
/// selection. Includes approximate TVL for ranking but no mid-price.
/// Immutable once read; freshness for final routes comes from
/// `quoting::fresh` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub protocol: Protocol,
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve0: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve1: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqrt_price_x96: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_current: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_spacing: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_id: Option<B256>,
    /// Approximate TVL in native units, for ranking only.
    #[serde(default)]
    pub tvl_eth: f64,
    /// Approximate TVL in USD, for ranking only.
    #[serde(default)]
    pub tvl_usd: f64,
}

impl PoolInfo {
    /// Materialise the full Pool variant. Returns None when the projection
    /// is missing protocol-required fields; callers treat that as a cache
    /// miss, not an error.
    pub fn to_pool(&self) -> Option<Pool> {
        if self.token0 >= self.token1 {
            return None;
        }
        match self.protocol {
            Protocol::V2 => Some(Pool::V2(V2Pool {
                address: self.address,
                token0: self.token0,
                token1: self.token1,
                reserve0: self.reserve0?,
                reserve1: self.reserve1?,
            })),
            Protocol::V3 => Some(Pool::V3(V3Pool {
                address: self.address,
                token0: self.token0,
                token1: self.token1,
                fee: self.fee?,
                liquidity: self.liquidity?,
                sqrt_price_x96: self.sqrt_price_x96?,
                tick_current: self.tick_current?,
            })),
            Protocol::V4 => Some(Pool::V4(V4Pool {
                address: self.address,
                token0: self.token0,
                token1: self.token1,
                fee: self.fee?,
                liquidity: self.liquidity?,
                sqrt_price_x96: self.sqrt_price_x96?,
                tick_current: self.tick_current?,
                tick_spacing: self.tick_spacing?,
                hooks: self.hooks.unwrap_or(Address::ZERO),
                pool_id: self.pool_id?,
            })),
            Protocol::Mixed => None,
        }
    }

    pub fn from_pool(pool: &Pool, tvl_eth: f64, tvl_usd: f64) -> PoolInfo {
        let mut info = PoolInfo {
            protocol: pool.protocol(),
            address: pool.address(),
            token0: pool.token0(),
            token1: pool.token1(),
            reserve0: None,
            reserve1: None,
            fee: None,
            liquidity: None,
            sqrt_price_x96: None,
            tick_current: None,
            tick_spacing: None,
            hooks: None,
            pool_id: None,
            tvl_eth,
            tvl_usd,
        };
        match pool {
            Pool::V2(p) => {
                info.reserve0 = Some(p.reserve0);
                info.reserve1 = Some(p.reserve1);
            }
            Pool::V3(p) => {
                info.fee = Some(p.fee);
                info.liquidity = Some(p.liquidity);
                info.sqrt_price_x96 = Some(p.sqrt_price_x96);
                info.tick_current = Some(p.tick_current);
            }
            Pool::V4(p) => {
                info.fee = Some(p.fee);
                info.liquidity = Some(p.liquidity);
                info.sqrt_price_x96 = Some(p.sqrt_price_x96);
                info.tick_current = Some(p.tick_current);
                info.tick_spacing = Some(p.tick_spacing);
                info.hooks = Some(p.hooks);
                info.pool_id = Some(p.pool_id);
            }
        }
        info
    }

    pub fn involves(&self, token: &Address) -> bool {
        self.token0 == *token || self.token1 == *token
    }
}

// ── Routes ───────────────────────────────────────────────────────────────────

/// Ordered path of pools from token_in to token_out. Endpoints are always
/// the wrapped form when the caller traded native currency; the synthetic
/// wrapping pool handles the native<->wrapped step inside mixed routes.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub chain: Chain,
    pub pools: Vec<Pool>,
    pub token_in: Address,
    pub token_out: Address,
    /// V2|V3|V4 when every (non-synthetic) pool shares a protocol, MIXED
    /// otherwise.
    pub protocol: Protocol,
    /// Share of the trade assigned to this route during split search,
    /// in percent. 100 outside of split search.
    pub percentage: u32,
}

impl Route {
    /// Build a route, deriving the protocol tag. The synthetic wrapping
    /// pool is ignored for tagging.
    pub fn new(chain: Chain, pools: Vec<Pool>, token_in: Address, token_out: Address) -> Route {
        let mut protocols: Vec<Protocol> = pools
            .iter()
            .filter(|p| !p.is_synthetic_native_wrapper())
            .map(|p| p.protocol())
            .collect();
        protocols.sort_by_key(|p| *p as u8);
        protocols.dedup();
        let protocol = match protocols.as_slice() {
            [single] => *single,
            [] => Protocol::V4, // wrapping-only path
            _ => Protocol::Mixed,
        };
        Route {
            chain,
            pools,
            token_in,
            token_out,
            protocol,
            percentage: 100,
        }
    }

    pub fn with_percentage(mut self, percentage: u32) -> Route {
        self.percentage = percentage;
        self
    }

    /// The ordered token path: token_in, every intermediate, token_out.
    /// Empty when the pools do not chain.
    pub fn token_path(&self) -> Vec<Address> {
        let mut path = vec![self.token_in];
        let mut current = self.token_in;
        for pool in &self.pools {
            match pool.other_token(&current) {
                Some(next) => {
                    path.push(next);
                    current = next;
                }
                None => return Vec::new(),
            }
        }
        path
    }

    /// Structural validity: pools chain end-to-end, no token is revisited,
    /// and the endpoints match. Invalid routes are dropped before pricing.
    pub fn is_valid(&self) -> bool {
        if self.pools.is_empty() {
            return false;
        }
        let path = self.token_path();
        if path.len() != self.pools.len() + 1 {
            return false;
        }
        if path[0] != self.token_in || path[path.len() - 1] != self.token_out {
            return false;
        }
        // No cycles: every token in the path is distinct
        let mut seen: Vec<Address> = Vec::with_capacity(path.len());
        for token in &path {
            if seen.contains(token) {
                return false;
            }
            seen.push(*token);
        }
        true
    }

    pub fn contains_pool(&self, address: &Address) -> bool {
        self.pools.iter().any(|p| p.address() == *address)
    }

    /// True when any pool endpoint touches the raw native currency
    /// (relevant only for routes traversing the synthetic wrapper).
    pub fn touches_native(&self) -> bool {
        self.pools
            .iter()
            .any(|p| is_native(&p.token0()) || is_native(&p.token1()))
    }

    pub fn touches_wrapped_native(&self) -> bool {
        let wrapped = self.chain.info().wrapped_native;
        self.pools
            .iter()
            .any(|p| p.token0() == wrapped || p.token1() == wrapped)
    }

    pub fn hops(&self) -> usize {
        self.pools.len()
    }

    /// Human-readable form, also used as a deterministic tie-break key:
    /// "[V3] 0xtokenIn -(500)-> 0xmid -(3000)-> 0xtokenOut @ 50%"
    pub fn route_string(&self) -> String {
        let mut s = format!("[{}] {:#x}", self.protocol, self.token_in);
        let mut current = self.token_in;
        for pool in &self.pools {
            let next = pool.other_token(&current).unwrap_or(self.token_out);
            s.push_str(&format!(" -({})-> {:#x}", pool.fee(), next));
            current = next;
        }
        s.push_str(&format!(" @ {}%", self.percentage));
        s
    }
}

// ── Quotes ───────────────────────────────────────────────────────────────────

/// Gas accounting for one route. Produced by the estimator in native
/// units; the converter fills the quote-token and USD fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GasDetails {
    pub gas_price_wei: U256,
    pub gas_cost_in_wei: U256,
    pub gas_use: u64,
    /// Display-only float form of the wei cost.
    pub gas_cost_in_eth: f64,
    pub gas_cost_in_quote_token: U256,
    pub gas_cost_in_usd: f64,
}

impl GasDetails {
    pub fn new(gas_price_wei: U256, gas_use: u64) -> GasDetails {
        let gas_cost_in_wei = gas_price_wei * U256::from(gas_use);
        GasDetails {
            gas_price_wei,
            gas_cost_in_wei,
            gas_use,
            gas_cost_in_eth: u256_to_f64(gas_cost_in_wei) / 1e18,
            gas_cost_in_quote_token: U256::ZERO,
            gas_cost_in_usd: 0.0,
        }
    }

    /// Sum the route-execution and L1 data components. Additive in wei,
    /// gas units and the display float alike.
    pub fn combine(route: &GasDetails, l1: &GasDetails) -> GasDetails {
        GasDetails {
            gas_price_wei: route.gas_price_wei,
            gas_cost_in_wei: route.gas_cost_in_wei + l1.gas_cost_in_wei,
            gas_use: route.gas_use + l1.gas_use,
            gas_cost_in_eth: route.gas_cost_in_eth + l1.gas_cost_in_eth,
            gas_cost_in_quote_token: route.gas_cost_in_quote_token
                + l1.gas_cost_in_quote_token,
            gas_cost_in_usd: route.gas_cost_in_usd + l1.gas_cost_in_usd,
        }
    }
}

/// A priced sub-route: one route at one percentage with its quoted
/// counter-amount and the opaque per-protocol quoter extras.
#[derive(Debug, Clone)]
pub struct Quote {
    pub route: Route,
    /// The portioned fixed-side amount this quote was priced for.
    pub amount: U256,
    /// The quoted counter-amount: output for EXACT_IN, input for EXACT_OUT.
    pub quoted: U256,
    pub gas_details: Option<GasDetails>,
    /// Initialised ticks crossed per leg, from the V3/V4 quoter response.
    /// Empty for V2 legs.
    pub ticks_crossed: Vec<u32>,
}

impl Quote {
    pub fn percentage(&self) -> u32 {
        self.route.percentage
    }

    /// Quote adjusted by the gas cost expressed in the quote token.
    /// EXACT_IN: output minus gas. EXACT_OUT: required input plus gas.
    pub fn gas_adjusted(&self, trade_type: TradeType) -> U256 {
        let gas = self
            .gas_details
            .as_ref()
            .map(|g| g.gas_cost_in_quote_token)
            .unwrap_or(U256::ZERO);
        match trade_type {
            TradeType::ExactIn => self.quoted.saturating_sub(gas),
            TradeType::ExactOut => self.quoted.saturating_add(gas),
        }
    }
}

/// An ordered set of quotes whose route percentages sum to exactly 100.
#[derive(Debug, Clone)]
pub struct QuoteSplit {
    pub quotes: Vec<Quote>,
}

impl QuoteSplit {
    pub fn singleton(quote: Quote) -> QuoteSplit {
        QuoteSplit {
            quotes: vec![quote],
        }
    }

    pub fn percent_sum(&self) -> u32 {
        self.quotes.iter().map(|q| q.percentage()).sum()
    }

    pub fn total_quoted(&self) -> U256 {
        self.quotes.iter().fold(U256::ZERO, |acc, q| acc + q.quoted)
    }

    pub fn total_gas_adjusted(&self, trade_type: TradeType) -> U256 {
        self.quotes
            .iter()
            .fold(U256::ZERO, |acc, q| acc + q.gas_adjusted(trade_type))
    }

    pub fn total_gas_use(&self) -> u64 {
        self.quotes
            .iter()
            .filter_map(|q| q.gas_details.as_ref())
            .map(|g| g.gas_use)
            .sum()
    }

    /// Split invariants: positive percentages summing to 100, no shared
    /// pool address between legs, no native-endpoint route combined with a
    /// wrapped-endpoint route.
    pub fn is_well_formed(&self) -> bool {
        if self.percent_sum() != 100 {
            return false;
        }
        if self.quotes.iter().any(|q| q.percentage() == 0) {
            return false;
        }
        for (i, a) in self.quotes.iter().enumerate() {
            for b in self.quotes.iter().skip(i + 1) {
                if a.route
                    .pools
                    .iter()
                    .any(|p| b.route.contains_pool(&p.address()))
                {
                    return false;
                }
                let native_a = a.route.touches_native();
                let native_b = b.route.touches_native();
                if (native_a && !native_b && b.route.touches_wrapped_native())
                    || (native_b && !native_a && a.route.touches_wrapped_native())
                {
                    return false;
                }
            }
        }
        true
    }
}

// ── USD buckets ──────────────────────────────────────────────────────────────

/// Coarse quantisation of the trade's USD notional, used to key the hot
/// route cache. Boundaries must be stable across deploys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UsdBucket {
    Usd1,
    Usd10,
    Usd100,
    Usd1K,
    Usd10K,
    Usd50K,
    Usd100K,
    Usd500K,
    Usd1M,
}

impl UsdBucket {
    pub fn from_usd(notional: f64) -> UsdBucket {
        if notional < 10.0 {
            UsdBucket::Usd1
        } else if notional < 100.0 {
            UsdBucket::Usd10
        } else if notional < 1_000.0 {
            UsdBucket::Usd100
        } else if notional < 10_000.0 {
            UsdBucket::Usd1K
        } else if notional < 50_000.0 {
            UsdBucket::Usd10K
        } else if notional < 100_000.0 {
            UsdBucket::Usd50K
        } else if notional < 500_000.0 {
            UsdBucket::Usd100K
        } else if notional < 1_000_000.0 {
            UsdBucket::Usd500K
        } else {
            UsdBucket::Usd1M
        }
    }

    /// The stable string used inside cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            UsdBucket::Usd1 => "USD_1",
            UsdBucket::Usd10 => "USD_10",
            UsdBucket::Usd100 => "USD_100",
            UsdBucket::Usd1K => "USD_1_000",
            UsdBucket::Usd10K => "USD_10_000",
            UsdBucket::Usd50K => "USD_50_000",
            UsdBucket::Usd100K => "USD_100_000",
            UsdBucket::Usd500K => "USD_500_000",
            UsdBucket::Usd1M => "USD_1_000_000",
        }
    }

    pub fn parse(s: &str) -> Option<UsdBucket> {
        match s {
            "USD_1" => Some(UsdBucket::Usd1),
            "USD_10" => Some(UsdBucket::Usd10),
            "USD_100" => Some(UsdBucket::Usd100),
            "USD_1_000" => Some(UsdBucket::Usd1K),
            "USD_10_000" => Some(UsdBucket::Usd10K),
            "USD_50_000" => Some(UsdBucket::Usd50K),
            "USD_100_000" => Some(UsdBucket::Usd100K),
            "USD_500_000" => Some(UsdBucket::Usd500K),
            "USD_1_000_000" => Some(UsdBucket::Usd1M),
            _ => None,
        }
    }
}

impl fmt::Display for UsdBucket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fine-grained bucket label used for metric dimensions only. Powers of
/// ten below 1k, then 5k steps. Never used in cache keys.
pub fn fine_bucket_label(notional: f64) -> String {
    if notional < 1.0 {
        return "lt_1".to_string();
    }
    if notional < 1_000.0 {
        let mut boundary = 1.0;
        while boundary * 10.0 <= notional {
            boundary *= 10.0;
        }
        return format!("usd_{}", boundary as u64);
    }
    let step = ((notional / 5_000.0).floor() as u64) * 5_000;
    format!("usd_{}", step.max(1_000))
}

// ── Numeric helpers ──────────────────────────────────────────────────────────

/// Lossy U256 -> f64 for display and ranking math. Values beyond u128
/// fall back to a string parse.
pub fn u256_to_f64(v: U256) -> f64 {
    match TryInto::<u128>::try_into(v) {
        Ok(small) => small as f64,
        Err(_) => v.to_string().parse::<f64>().unwrap_or(f64::MAX),
    }
}

/// Saturating f64 -> U256 for converted gas costs. Negative and
/// non-finite inputs map to zero.
pub fn f64_to_u256(v: f64) -> U256 {
    if !v.is_finite() || v <= 0.0 {
        return U256::ZERO;
    }
    if v < u128::MAX as f64 {
        U256::from(v as u128)
    } else {
        U256::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from(bytes)
    }

    fn v2_pool(a: Address, b: Address, r0: u128, r1: u128) -> Pool {
        let (token0, token1) = if a < b { (a, b) } else { (b, a) };
        let mut raw = [0u8; 20];
        raw[0] = 0x20;
        raw[19] = token0.0[19] ^ token1.0[19];
        Pool::V2(V2Pool {
            address: Address::from(raw),
            token0,
            token1,
            reserve0: r0,
            reserve1: r1,
        })
    }

    fn v3_pool(a: Address, b: Address, fee: u32, liquidity: u128) -> Pool {
        let (token0, token1) = if a < b { (a, b) } else { (b, a) };
        let mut raw = [0u8; 20];
        raw[0] = 0x30;
        raw[18] = (fee / 100) as u8;
        raw[19] = token0.0[19] ^ token1.0[19];
        Pool::V3(V3Pool {
            address: Address::from(raw),
            token0,
            token1,
            fee,
            liquidity,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: 0,
        })
    }

    #[test]
    fn test_route_token_path_and_validity() {
        let route = Route::new(
            Chain::Mainnet,
            vec![
                v2_pool(addr(1), addr(2), 10, 10),
                v2_pool(addr(2), addr(3), 10, 10),
            ],
            addr(1),
            addr(3),
        );
        assert_eq!(route.token_path(), vec![addr(1), addr(2), addr(3)]);
        assert!(route.is_valid());
        // Distinct tokens == len(path) + 1
        assert_eq!(route.token_path().len(), route.pools.len() + 1);
    }

    #[test]
    fn test_route_cycle_rejected() {
        // a -> b -> a revisits a token
        let route = Route::new(
            Chain::Mainnet,
            vec![
                v2_pool(addr(1), addr(2), 10, 10),
                v2_pool(addr(2), addr(1), 10, 10),
            ],
            addr(1),
            addr(1),
        );
        assert!(!route.is_valid());
    }

    #[test]
    fn test_route_endpoint_mismatch_rejected() {
        let route = Route::new(
            Chain::Mainnet,
            vec![v2_pool(addr(1), addr(2), 10, 10)],
            addr(1),
            addr(3),
        );
        assert!(!route.is_valid());
    }

    #[test]
    fn test_mixed_tagging_ignores_synthetic_pool() {
        let wrapped = Chain::Mainnet.info().wrapped_native;
        let synthetic = Pool::synthetic_native_wrapper(Chain::Mainnet);
        let v3 = v3_pool(wrapped, addr(9), 3000, 1_000);
        let route = Route::new(Chain::Mainnet, vec![synthetic, v3], NATIVE_ADDRESS, addr(9));
        // One real protocol — not mixed despite the synthetic V4 leg
        assert_eq!(route.protocol, Protocol::V3);

        let v2 = v2_pool(addr(9), addr(8), 10, 10);
        let v3b = v3_pool(addr(8), addr(7), 500, 1_000);
        let mixed = Route::new(Chain::Mainnet, vec![v2, v3b], addr(9), addr(7));
        assert_eq!(mixed.protocol, Protocol::Mixed);
    }

    #[test]
    fn test_pool_routability() {
        assert!(!v3_pool(addr(1), addr(2), 500, 0).is_routable());
        assert!(v3_pool(addr(1), addr(2), 500, 5).is_routable());
        // Zero-liquidity V4 with hooks stays routable
        let hooked = Pool::V4(V4Pool {
            address: addr(10),
            token0: addr(1),
            token1: addr(2),
            fee: 3000,
            liquidity: 0,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: 0,
            tick_spacing: 60,
            hooks: address!("0000000000000000000000000000000000000bad"),
            pool_id: B256::ZERO,
        });
        assert!(hooked.is_routable());
        let hookless = Pool::V4(V4Pool {
            address: addr(10),
            token0: addr(1),
            token1: addr(2),
            fee: 3000,
            liquidity: 0,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: 0,
            tick_spacing: 60,
            hooks: Address::ZERO,
            pool_id: B256::ZERO,
        });
        assert!(!hookless.is_routable());
    }

    #[test]
    fn test_gas_details_combine_is_additive() {
        let route = GasDetails::new(U256::from(1_000u64), 135_000);
        let l1 = GasDetails::new(U256::from(1_000u64), 20_000);
        let combined = GasDetails::combine(&route, &l1);
        assert_eq!(combined.gas_use, 155_000);
        assert_eq!(
            combined.gas_cost_in_wei,
            route.gas_cost_in_wei + l1.gas_cost_in_wei
        );
        assert!(
            (combined.gas_cost_in_eth - (route.gas_cost_in_eth + l1.gas_cost_in_eth)).abs()
                < 1e-12
        );
    }

    #[test]
    fn test_usd_bucket_boundaries() {
        assert_eq!(UsdBucket::from_usd(0.5), UsdBucket::Usd1);
        assert_eq!(UsdBucket::from_usd(9.99), UsdBucket::Usd1);
        assert_eq!(UsdBucket::from_usd(10.0), UsdBucket::Usd10);
        assert_eq!(UsdBucket::from_usd(999.0), UsdBucket::Usd100);
        assert_eq!(UsdBucket::from_usd(1_000.0), UsdBucket::Usd1K);
        assert_eq!(UsdBucket::from_usd(2_000_000.0), UsdBucket::Usd1M);
        // Round-trip through the stable string form
        assert_eq!(UsdBucket::parse("USD_1_000"), Some(UsdBucket::Usd1K));
        assert_eq!(UsdBucket::Usd1K.as_str(), "USD_1_000");
    }

    #[test]
    fn test_split_well_formedness() {
        let q = |pool: Pool, pct: u32| Quote {
            route: Route::new(Chain::Mainnet, vec![pool], addr(1), addr(2))
                .with_percentage(pct),
            amount: U256::from(100u64),
            quoted: U256::from(100u64),
            gas_details: None,
            ticks_crossed: Vec::new(),
        };
        let a = v2_pool(addr(1), addr(2), 10, 10);
        let b = v3_pool(addr(1), addr(2), 500, 1_000);

        let ok = QuoteSplit {
            quotes: vec![q(a.clone(), 50), q(b.clone(), 50)],
        };
        assert!(ok.is_well_formed());

        // Shared pool address
        let shared = QuoteSplit {
            quotes: vec![q(a.clone(), 50), q(a.clone(), 50)],
        };
        assert!(!shared.is_well_formed());

        // Percentages must sum to 100
        let short = QuoteSplit {
            quotes: vec![q(a, 50), q(b, 40)],
        };
        assert!(!short.is_well_formed());
    }

    #[test]
    fn test_protocol_list_parsing() {
        assert_eq!(
            Protocol::parse_list("v2,v3"),
            Some(vec![Protocol::V2, Protocol::V3])
        );
        assert_eq!(
            Protocol::parse_list("V4, mixed"),
            Some(vec![Protocol::V4, Protocol::Mixed])
        );
        assert_eq!(Protocol::parse_list("v5"), None);
        assert_eq!(Protocol::parse_list(""), None);
    }
}
