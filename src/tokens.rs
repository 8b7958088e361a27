//! Token metadata and per-chain RPC providers
//!
//! TokenProvider answers decimals/symbol/fee-on-transfer/USD-price
//! questions for the pipeline. The RPC implementation reads ERC-20
//! metadata on demand and keeps it in a TTL cache; a static seed table
//! covers the majors so the hot path never waits on RPC for them.

use crate::chains::Chain;
use crate::contracts::IERC20;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Metadata for one token on one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenMeta {
    pub chain: Chain,
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
    /// Fee-on-transfer charged when buying, in bips. 0 for normal tokens.
    pub buy_fee_bps: u32,
    /// Fee-on-transfer charged when selling, in bips.
    pub sell_fee_bps: u32,
    /// Approximate USD price, when known. None means "no price source".
    pub usd_price: Option<f64>,
}

impl TokenMeta {
    pub fn is_fee_on_transfer(&self) -> bool {
        self.buy_fee_bps > 0 || self.sell_fee_bps > 0
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Resolve metadata; None when the token does not exist on the chain.
    async fn get_token(&self, chain: Chain, address: Address) -> Option<TokenMeta>;

    /// USD price of a token, when a source exists.
    async fn usd_price(&self, chain: Chain, address: Address) -> Option<f64> {
        self.get_token(chain, address).await.and_then(|t| t.usd_price)
    }
}

// ── Per-chain provider map ───────────────────────────────────────────────────

/// One HTTP provider per configured chain, built once and shared across
/// requests.
pub struct ChainProviders {
    providers: HashMap<Chain, DynProvider>,
}

impl ChainProviders {
    pub fn from_urls(rpc_urls: &HashMap<u64, String>) -> Result<ChainProviders> {
        let mut providers = HashMap::new();
        for (chain_id, url) in rpc_urls {
            let Some(chain) = Chain::from_id(*chain_id) else {
                warn!("Ignoring RPC url for unsupported chain id {}", chain_id);
                continue;
            };
            let parsed = url
                .parse()
                .with_context(|| format!("Invalid RPC url for chain {}", chain))?;
            let provider = ProviderBuilder::new().connect_http(parsed).erased();
            providers.insert(chain, provider);
        }
        Ok(ChainProviders { providers })
    }

    pub fn get(&self, chain: Chain) -> Option<&DynProvider> {
        self.providers.get(&chain)
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.providers.keys().copied().collect()
    }

    pub async fn block_number(&self, chain: Chain) -> Result<u64> {
        let provider = self
            .get(chain)
            .with_context(|| format!("No RPC provider for chain {}", chain))?;
        Ok(provider.get_block_number().await?)
    }

    pub async fn gas_price(&self, chain: Chain) -> Result<u128> {
        let provider = self
            .get(chain)
            .with_context(|| format!("No RPC provider for chain {}", chain))?;
        Ok(provider.get_gas_price().await?)
    }
}

// ── RPC-backed token provider ────────────────────────────────────────────────

pub struct RpcTokenProvider {
    providers: Arc<ChainProviders>,
    cache: Cache<(u64, Address), TokenMeta>,
}

impl RpcTokenProvider {
    pub fn new(providers: Arc<ChainProviders>, ttl_secs: u64) -> RpcTokenProvider {
        RpcTokenProvider {
            providers,
            cache: Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(50_000)
                .build(),
        }
    }

    async fn fetch_erc20(&self, chain: Chain, address: Address) -> Option<TokenMeta> {
        let provider = self.providers.get(chain)?;
        let contract = IERC20::new(address, provider.clone());
        let decimals = match contract.decimals().call().await {
            Ok(d) => d,
            Err(e) => {
                debug!("decimals() failed for {:#x} on {}: {}", address, chain, e);
                return None;
            }
        };
        // A missing symbol is not fatal; some tokens return bytes32 or
        // nothing at all.
        let symbol = contract
            .symbol()
            .call()
            .await
            .unwrap_or_else(|_| "UNKNOWN".to_string());
        Some(TokenMeta {
            chain,
            address,
            decimals,
            symbol,
            buy_fee_bps: 0,
            sell_fee_bps: 0,
            usd_price: None,
        })
    }
}

#[async_trait]
impl TokenProvider for RpcTokenProvider {
    async fn get_token(&self, chain: Chain, address: Address) -> Option<TokenMeta> {
        if let Some(seed) = seed_token(chain, address) {
            return Some(seed);
        }
        let key = (chain.id(), address);
        if let Some(hit) = self.cache.get(&key).await {
            return Some(hit);
        }
        let meta = self.fetch_erc20(chain, address).await?;
        self.cache.insert(key, meta.clone()).await;
        Some(meta)
    }
}

/// Static seed metadata for the majors: stables pinned at $1, wrapped
/// natives at a coarse reference price. Prices here feed USD bucketing
/// and gas display only, never execution amounts.
fn seed_token(chain: Chain, address: Address) -> Option<TokenMeta> {
    let info = chain.info();
    let meta = |decimals: u8, symbol: &str, usd: Option<f64>| TokenMeta {
        chain,
        address,
        decimals,
        symbol: symbol.to_string(),
        buy_fee_bps: 0,
        sell_fee_bps: 0,
        usd_price: usd,
    };

    if address == info.wrapped_native {
        let (symbol, price) = match chain {
            Chain::Polygon => ("WMATIC", 0.50),
            _ => ("WETH", 3_300.0),
        };
        return Some(meta(18, symbol, Some(price)));
    }

    for base in info.base_tokens {
        if *base != address {
            continue;
        }
        // Per-chain base lists hold stables plus one or two majors; pick
        // decimals/symbol off the well-known deployments.
        let symbol_guess = match chain {
            Chain::Mainnet => match address {
                a if a == info.base_tokens[0] => ("USDC", 6, Some(1.0)),
                a if a == info.base_tokens[1] => ("USDT", 6, Some(1.0)),
                a if a == info.base_tokens[2] => ("DAI", 18, Some(1.0)),
                a if a == info.base_tokens[3] => ("WBTC", 8, Some(65_000.0)),
                _ => ("TOKEN", 18, None),
            },
            Chain::Polygon => match address {
                a if a == info.base_tokens[0] => ("USDC.e", 6, Some(1.0)),
                a if a == info.base_tokens[1] => ("USDT", 6, Some(1.0)),
                a if a == info.base_tokens[2] => ("WETH", 18, Some(3_300.0)),
                _ => ("TOKEN", 18, None),
            },
            Chain::Arbitrum => match address {
                a if a == info.base_tokens[0] => ("USDC", 6, Some(1.0)),
                _ => ("USDT", 6, Some(1.0)),
            },
            _ => match address {
                a if a == info.base_tokens[0] => ("USDC", 6, Some(1.0)),
                _ => ("DAI", 18, Some(1.0)),
            },
        };
        let (symbol, decimals, usd) = symbol_guess;
        return Some(meta(decimals, symbol, usd));
    }
    None
}

// ── Fixed-table provider (tests, offline tooling) ────────────────────────────

/// TokenProvider over a fixed table. Used by tests and by the dev server
/// when no RPC endpoints are configured.
#[derive(Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<(u64, Address), TokenMeta>,
}

impl StaticTokenProvider {
    pub fn new() -> StaticTokenProvider {
        StaticTokenProvider {
            tokens: HashMap::new(),
        }
    }

    pub fn with_token(mut self, meta: TokenMeta) -> StaticTokenProvider {
        self.tokens.insert((meta.chain.id(), meta.address), meta);
        self
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, chain: Chain, address: Address) -> Option<TokenMeta> {
        if let Some(meta) = self.tokens.get(&(chain.id(), address)) {
            return Some(meta.clone());
        }
        seed_token(chain, address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_table_covers_wrapped_native() {
        let provider = StaticTokenProvider::new();
        let wrapped = Chain::Mainnet.info().wrapped_native;
        let meta = provider.get_token(Chain::Mainnet, wrapped).await.expect("seed");
        assert_eq!(meta.symbol, "WETH");
        assert_eq!(meta.decimals, 18);
        assert!(meta.usd_price.is_some());
    }

    #[tokio::test]
    async fn test_static_override_wins() {
        let chain = Chain::Mainnet;
        let addr = Address::repeat_byte(0x42);
        let provider = StaticTokenProvider::new().with_token(TokenMeta {
            chain,
            address: addr,
            decimals: 9,
            symbol: "FOT".to_string(),
            buy_fee_bps: 300,
            sell_fee_bps: 100,
            usd_price: Some(0.10),
        });
        let meta = provider.get_token(chain, addr).await.expect("static");
        assert!(meta.is_fee_on_transfer());
        assert_eq!(meta.decimals, 9);
        // Unknown tokens resolve to nothing
        assert!(provider
            .get_token(chain, Address::repeat_byte(0x43))
            .await
            .is_none());
    }
}
