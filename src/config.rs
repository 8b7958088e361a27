//! Configuration management
//!
//! Settings come from a TOML file with env-var overrides on top
//! (.env loaded via dotenv). Every component receives the immutable
//! `RouterConfig` by reference at construction; there are no
//! process-wide config singletons.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// RPC endpoint per chain id. Overridable via RPC_URL_<chainId>.
    #[serde(default)]
    pub rpc_urls: HashMap<u64, String>,

    /// Route cache backend. None = in-memory store (dev / tests).
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Base URL of the pool indexer used as the primary discovery source.
    #[serde(default)]
    pub indexer_url: Option<String>,

    /// Include the current block number in responses (costs one RPC per
    /// request when enabled).
    #[serde(default)]
    pub include_block_number: bool,

    /// Process runs as a synchronous handler: asynchronous cache refresh
    /// must not be spawned because the process may be frozen mid-task.
    #[serde(default)]
    pub sync_handler: bool,

    /// Opt-out for refresh-ahead even in server mode.
    #[serde(default)]
    pub skip_async_cache_update: bool,

    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub top_pools: TopPoolsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Route enumeration and split search bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,
    #[serde(default = "default_max_hops_extended")]
    pub max_hops_extended: usize,
    /// Below this many routes the extended search kicks in.
    #[serde(default = "default_min_routes_threshold")]
    pub min_routes_threshold: usize,
    #[serde(default = "default_max_extended_routes")]
    pub max_extended_routes: usize,
    /// Percentage step for split search. Must divide 100 and lie in [5,100].
    #[serde(default = "default_percentage_step")]
    pub percentage_step: u32,
    /// Maximum number of legs in a split.
    #[serde(default = "default_max_splits")]
    pub max_splits: usize,
    /// Candidate plans kept after each split-search level.
    #[serde(default = "default_max_split_routes")]
    pub max_split_routes: usize,
    /// Wall-clock budget for the split search, independent of the request
    /// deadline.
    #[serde(default = "default_route_split_timeout_ms")]
    pub route_split_timeout_ms: u64,
}

fn default_max_hops() -> usize { 3 }
fn default_max_hops_extended() -> usize { 4 }
fn default_min_routes_threshold() -> usize { 4 }
fn default_max_extended_routes() -> usize { 10 }
fn default_percentage_step() -> u32 { 5 }
fn default_max_splits() -> usize { 7 }
fn default_max_split_routes() -> usize { 5 }
fn default_route_split_timeout_ms() -> u64 { 1_500 }

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            max_hops: default_max_hops(),
            max_hops_extended: default_max_hops_extended(),
            min_routes_threshold: default_min_routes_threshold(),
            max_extended_routes: default_max_extended_routes(),
            percentage_step: default_percentage_step(),
            max_splits: default_max_splits(),
            max_split_routes: default_max_split_routes(),
            route_split_timeout_ms: default_route_split_timeout_ms(),
        }
    }
}

/// Per-slice caps for the top-pools selection.
#[derive(Debug, Clone, Deserialize)]
pub struct TopPoolsConfig {
    #[serde(default = "default_top_n_direct_pairs")]
    pub top_n_direct_pairs: usize,
    #[serde(default = "default_top_n_one_hop_pairs")]
    pub top_n_one_hop_pairs: usize,
    #[serde(default = "default_top_n_second_hop_pairs")]
    pub top_n_second_hop_pairs: usize,
    #[serde(default = "default_top_n_pairs")]
    pub top_n_pairs: usize,
    #[serde(default = "default_top_n_with_base_token")]
    pub top_n_with_base_token: usize,
}

fn default_top_n_direct_pairs() -> usize { 3 }
fn default_top_n_one_hop_pairs() -> usize { 5 }
fn default_top_n_second_hop_pairs() -> usize { 2 }
fn default_top_n_pairs() -> usize { 8 }
fn default_top_n_with_base_token() -> usize { 4 }

impl Default for TopPoolsConfig {
    fn default() -> Self {
        TopPoolsConfig {
            top_n_direct_pairs: default_top_n_direct_pairs(),
            top_n_one_hop_pairs: default_top_n_one_hop_pairs(),
            top_n_second_hop_pairs: default_top_n_second_hop_pairs(),
            top_n_pairs: default_top_n_pairs(),
            top_n_with_base_token: default_top_n_with_base_token(),
        }
    }
}

/// TTLs for the pool caches and the hot route cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Global all-pools cache (read-through, per discoverer name).
    #[serde(default = "default_all_pools_ttl_secs")]
    pub all_pools_ttl_secs: u64,
    /// Narrower tokens-specific pool cache.
    #[serde(default = "default_token_pools_ttl_secs")]
    pub token_pools_ttl_secs: u64,
    /// Hard TTL for cached routes.
    #[serde(default = "default_routes_ttl_secs")]
    pub routes_ttl_secs: u64,
    /// Soft expiry: reads older than this trigger one refresh-ahead.
    #[serde(default = "default_routes_refresh_secs")]
    pub routes_refresh_secs: u64,
    /// Token metadata cache.
    #[serde(default = "default_token_meta_ttl_secs")]
    pub token_meta_ttl_secs: u64,
}

fn default_all_pools_ttl_secs() -> u64 { 6 * 3_600 }
fn default_token_pools_ttl_secs() -> u64 { 5 * 60 }
fn default_routes_ttl_secs() -> u64 { 24 * 3_600 }
fn default_routes_refresh_secs() -> u64 { 6 * 3_600 }
fn default_token_meta_ttl_secs() -> u64 { 3_600 }

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            all_pools_ttl_secs: default_all_pools_ttl_secs(),
            token_pools_ttl_secs: default_token_pools_ttl_secs(),
            routes_ttl_secs: default_routes_ttl_secs(),
            routes_refresh_secs: default_routes_refresh_secs(),
            token_meta_ttl_secs: default_token_meta_ttl_secs(),
        }
    }
}

/// L1 data-gas model knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct GasConfig {
    /// When true, Arbitrum L1 sizing compresses a fixed-length placeholder
    /// instead of real calldata.
    #[serde(default = "default_true")]
    pub arbitrum_approximate_calldata: bool,
    /// Placeholder calldata length in bytes.
    #[serde(default = "default_arbitrum_calldata_bytes")]
    pub arbitrum_calldata_bytes: usize,
}

fn default_true() -> bool { true }
fn default_arbitrum_calldata_bytes() -> usize { 1_000 }

impl Default for GasConfig {
    fn default() -> Self {
        GasConfig {
            arbitrum_approximate_calldata: default_true(),
            arbitrum_calldata_bytes: default_arbitrum_calldata_bytes(),
        }
    }
}

/// Simulation step configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How many ranked candidates to simulate before giving up.
    #[serde(default = "default_simulate_top_n")]
    pub simulate_top_n: usize,
}

fn default_simulate_top_n() -> usize { 3 }

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            enabled: default_true(),
            simulate_top_n: default_simulate_top_n(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            listen_addr: default_listen_addr(),
            rpc_urls: HashMap::new(),
            redis_url: None,
            indexer_url: None,
            include_block_number: false,
            sync_handler: false,
            skip_async_cache_update: false,
            routing: RoutingConfig::default(),
            top_pools: TopPoolsConfig::default(),
            cache: CacheConfig::default(),
            gas: GasConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Load the TOML file (if any), then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<RouterConfig> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", p.display()))?
            }
            None => RouterConfig::default(),
        };

        if let Ok(addr) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            config.redis_url = Some(url);
        }
        if let Ok(url) = std::env::var("INDEXER_URL") {
            config.indexer_url = Some(url);
        }
        // RPC_URL_1=https://..., RPC_URL_8453=https://...
        for (key, value) in std::env::vars() {
            if let Some(id) = key.strip_prefix("RPC_URL_") {
                if let Ok(chain_id) = id.parse::<u64>() {
                    config.rpc_urls.insert(chain_id, value);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Programmer-error checks, applied once at startup.
    pub fn validate(&self) -> Result<()> {
        let step = self.routing.percentage_step;
        if !(5..=100).contains(&step) || 100 % step != 0 {
            anyhow::bail!(
                "percentage_step must divide 100 and lie in [5,100], got {}",
                step
            );
        }
        if self.routing.max_hops_extended < self.routing.max_hops {
            anyhow::bail!("max_hops_extended must be >= max_hops");
        }
        if self.cache.routes_refresh_secs >= self.cache.routes_ttl_secs {
            anyhow::bail!("routes_refresh_secs must be below routes_ttl_secs");
        }
        Ok(())
    }
}
