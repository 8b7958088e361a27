//! Wire types for the quote surface
//!
//! Request fields arrive as query parameters; responses are JSON. The
//! PoolInRoute projection is lossless for the fields it carries: a pool
//! can be rebuilt from its wire form.

use crate::quoting::MethodParameters;
use crate::types::{
    Pool, PoolInfo, Protocol, SimulationStatus, V2Pool, V3Pool, V4Pool,
};
use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in_address: String,
    pub token_in_chain_id: u64,
    pub token_out_address: String,
    pub token_out_chain_id: u64,
    /// Decimal string, arbitrary precision.
    pub amount: String,
    pub trade_type: String,
    #[serde(default)]
    pub quote_type: Option<String>,
    /// Comma-separated subset of {v2,v3,v4,mixed}.
    #[serde(default)]
    pub protocols: Option<String>,
    #[serde(default)]
    pub force_mixed: Option<bool>,
    #[serde(default)]
    pub hooks_options: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    /// Percent, at most 20.
    #[serde(default)]
    pub slippage_tolerance: Option<f64>,
    /// Seconds from now.
    #[serde(default)]
    pub deadline: Option<u64>,
    #[serde(default)]
    pub portion_bips: Option<u32>,
    #[serde(default)]
    pub portion_recipient: Option<String>,
    #[serde(default)]
    pub permit_signature: Option<String>,
    #[serde(default)]
    pub permit_nonce: Option<String>,
    #[serde(default)]
    pub permit_expiration: Option<u64>,
    #[serde(default)]
    pub permit_amount: Option<String>,
    #[serde(default)]
    pub permit_sig_deadline: Option<u64>,
    #[serde(default)]
    pub simulate_from_address: Option<String>,
    #[serde(default)]
    pub debug_logs: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInRoute {
    pub address: String,
    pub decimals: u8,
    pub symbol: String,
    pub chain_id: u64,
    pub buy_fee_bps: u32,
    pub sell_fee_bps: u32,
}

/// One pool of one route leg, oriented so tokenIn is what enters it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInRoute {
    #[serde(rename = "type")]
    pub pool_type: String,
    pub address: String,
    pub token_in: TokenInRoute,
    pub token_out: TokenInRoute,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_out: Option<String>,
    // V2
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserve0: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserve1: Option<String>,
    // V3 / V4
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_current: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqrt_price_x96: Option<String>,
    /// Compatibility alias of sqrt_price_x96.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqrt_ratio_x96: Option<String>,
    // V4 only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_spacing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<String>,
}

impl PoolInRoute {
    pub fn from_pool(pool: &Pool, token_in: TokenInRoute, token_out: TokenInRoute) -> PoolInRoute {
        let mut wire = PoolInRoute {
            pool_type: match pool.protocol() {
                Protocol::V2 => "v2-pool",
                Protocol::V3 => "v3-pool",
                Protocol::V4 => "v4-pool",
                Protocol::Mixed => unreachable!("pools never carry the mixed tag"),
            }
            .to_string(),
            address: format!("{:#x}", pool.address()),
            token_in,
            token_out,
            amount_in: None,
            amount_out: None,
            reserve0: None,
            reserve1: None,
            liquidity: None,
            fee: None,
            tick_current: None,
            sqrt_price_x96: None,
            sqrt_ratio_x96: None,
            tick_spacing: None,
            hooks: None,
        };
        match pool {
            Pool::V2(p) => {
                wire.reserve0 = Some(p.reserve0.to_string());
                wire.reserve1 = Some(p.reserve1.to_string());
            }
            Pool::V3(p) => {
                wire.liquidity = Some(p.liquidity.to_string());
                wire.fee = Some(p.fee.to_string());
                wire.tick_current = Some(p.tick_current.to_string());
                wire.sqrt_price_x96 = Some(p.sqrt_price_x96.to_string());
                wire.sqrt_ratio_x96 = Some(p.sqrt_price_x96.to_string());
            }
            Pool::V4(p) => {
                wire.liquidity = Some(p.liquidity.to_string());
                wire.fee = Some(p.fee.to_string());
                wire.tick_current = Some(p.tick_current.to_string());
                wire.sqrt_price_x96 = Some(p.sqrt_price_x96.to_string());
                wire.sqrt_ratio_x96 = Some(p.sqrt_price_x96.to_string());
                wire.tick_spacing = Some(p.tick_spacing.to_string());
                wire.hooks = Some(format!("{:#x}", p.hooks));
            }
        }
        wire
    }

    /// Rebuild the internal pool. The wire form does not carry the V4
    /// pool id, so it is reconstituted as zero.
    pub fn to_pool(&self) -> Option<Pool> {
        let address: Address = self.address.parse().ok()?;
        let a: Address = self.token_in.address.parse().ok()?;
        let b: Address = self.token_out.address.parse().ok()?;
        let (token0, token1) = if a < b { (a, b) } else { (b, a) };
        match self.pool_type.as_str() {
            "v2-pool" => Some(Pool::V2(V2Pool {
                address,
                token0,
                token1,
                reserve0: self.reserve0.as_ref()?.parse().ok()?,
                reserve1: self.reserve1.as_ref()?.parse().ok()?,
            })),
            "v3-pool" => Some(Pool::V3(V3Pool {
                address,
                token0,
                token1,
                fee: self.fee.as_ref()?.parse().ok()?,
                liquidity: self.liquidity.as_ref()?.parse().ok()?,
                sqrt_price_x96: U256::from_str_radix(self.sqrt_price_x96.as_ref()?, 10).ok()?,
                tick_current: self.tick_current.as_ref()?.parse().ok()?,
            })),
            "v4-pool" => Some(Pool::V4(V4Pool {
                address,
                token0,
                token1,
                fee: self.fee.as_ref()?.parse().ok()?,
                liquidity: self.liquidity.as_ref()?.parse().ok()?,
                sqrt_price_x96: U256::from_str_radix(self.sqrt_price_x96.as_ref()?, 10).ok()?,
                tick_current: self.tick_current.as_ref()?.parse().ok()?,
                tick_spacing: self.tick_spacing.as_ref()?.parse().ok()?,
                hooks: self.hooks.as_ref()?.parse().ok()?,
                pool_id: B256::ZERO,
            })),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<String>,
    pub quote_amount: String,
    pub quote_gas_adjusted: String,
    pub gas_price_wei: String,
    pub gas_use_estimate: String,
    pub gas_use_estimate_quote: String,
    #[serde(rename = "gasUseEstimateUSD")]
    pub gas_use_estimate_usd: String,
    pub route_string: String,
    pub route: Vec<Vec<PoolInRoute>>,
    pub hits_cached_routes: bool,
    pub simulation_status: SimulationStatus,
    pub simulation_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_parameters: Option<MethodParameters>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portion_amount: Option<String>,
    /// Percent, clamped to [-100, 100].
    pub price_impact: String,
    pub quote_id: String,
    pub usd_bucket: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRoutesQuery {
    pub chain_id: u64,
    pub trade_type: String,
    pub token_in: String,
    pub token_out: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheKeyQuery {
    pub key: String,
}

/// Projection served by the cached-routes admin read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRouteView {
    pub protocol: Protocol,
    pub route_string: String,
    pub pools: Vec<PoolInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(addr: &str) -> TokenInRoute {
        TokenInRoute {
            address: addr.to_string(),
            decimals: 18,
            symbol: "T".to_string(),
            chain_id: 1,
            buy_fee_bps: 0,
            sell_fee_bps: 0,
        }
    }

    #[test]
    fn test_v3_pool_wire_round_trip() {
        let pool = Pool::V3(V3Pool {
            address: Address::repeat_byte(0xb0),
            token0: Address::repeat_byte(1),
            token1: Address::repeat_byte(2),
            fee: 500,
            liquidity: 123_456,
            sqrt_price_x96: U256::from(1u128 << 96),
            tick_current: -887,
        });
        let wire = PoolInRoute::from_pool(
            &pool,
            token("0x0101010101010101010101010101010101010101"),
            token("0x0202020202020202020202020202020202020202"),
        );
        assert_eq!(wire.pool_type, "v3-pool");
        assert_eq!(wire.sqrt_price_x96, wire.sqrt_ratio_x96);
        let rebuilt = wire.to_pool().expect("round trip");
        assert_eq!(rebuilt, pool);
    }

    #[test]
    fn test_v2_pool_wire_round_trip() {
        let pool = Pool::V2(V2Pool {
            address: Address::repeat_byte(0xa0),
            token0: Address::repeat_byte(1),
            token1: Address::repeat_byte(2),
            reserve0: 42,
            reserve1: 99,
        });
        let wire = PoolInRoute::from_pool(
            &pool,
            token("0x0101010101010101010101010101010101010101"),
            token("0x0202020202020202020202020202020202020202"),
        );
        assert_eq!(wire.pool_type, "v2-pool");
        assert_eq!(wire.reserve0.as_deref(), Some("42"));
        let rebuilt = wire.to_pool().expect("round trip");
        assert_eq!(rebuilt, pool);
    }

    #[test]
    fn test_request_defaults_from_query() {
        let request: QuoteRequest = serde_json::from_value(serde_json::json!({
            "tokenInAddress": "ETH",
            "tokenInChainId": 1,
            "tokenOutAddress": "0x0202020202020202020202020202020202020202",
            "tokenOutChainId": 1,
            "amount": "1000000000000000000",
            "tradeType": "EXACT_IN",
        }))
        .expect("parse");
        assert!(request.protocols.is_none());
        assert!(request.slippage_tolerance.is_none());
        assert_eq!(request.amount, "1000000000000000000");
    }
}
