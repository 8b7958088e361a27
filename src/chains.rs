//! Per-chain static tables
//!
//! Every chain-dependent constant lives here: wrapped native, protocol
//! factory addresses, routing base tokens, OP-stack membership and the
//! gas-formula constants. Components take these through `Chain::info()`
//! instead of carrying their own address books.

use alloy::primitives::{address, b256, Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported EVM chains, by canonical chain id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Chain {
    Mainnet,
    Optimism,
    Polygon,
    Base,
    Arbitrum,
}

impl Chain {
    pub fn from_id(id: u64) -> Option<Chain> {
        match id {
            1 => Some(Chain::Mainnet),
            10 => Some(Chain::Optimism),
            137 => Some(Chain::Polygon),
            8453 => Some(Chain::Base),
            42161 => Some(Chain::Arbitrum),
            _ => None,
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Chain::Mainnet => 1,
            Chain::Optimism => 10,
            Chain::Polygon => 137,
            Chain::Base => 8453,
            Chain::Arbitrum => 42161,
        }
    }

    pub fn all() -> [Chain; 5] {
        [
            Chain::Mainnet,
            Chain::Optimism,
            Chain::Polygon,
            Chain::Base,
            Chain::Arbitrum,
        ]
    }

    pub fn is_op_stack(&self) -> bool {
        self.info().op_stack
    }

    pub fn info(&self) -> &'static ChainInfo {
        match self {
            Chain::Mainnet => &MAINNET,
            Chain::Optimism => &OPTIMISM,
            Chain::Polygon => &POLYGON,
            Chain::Base => &BASE,
            Chain::Arbitrum => &ARBITRUM,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Chain::Mainnet => write!(f, "mainnet"),
            Chain::Optimism => write!(f, "optimism"),
            Chain::Polygon => write!(f, "polygon"),
            Chain::Base => write!(f, "base"),
            Chain::Arbitrum => write!(f, "arbitrum"),
        }
    }
}

/// Closed-form gas constants per chain (execution side).
#[derive(Debug, Clone, Copy)]
pub struct GasConstants {
    /// V3/V4 base cost per swap
    pub base_swap_cost: u64,
    /// V3/V4 cost per hop
    pub cost_per_hop: u64,
    /// V3/V4 cost per initialised tick crossed
    pub cost_per_init_tick: u64,
    /// Extra charged on single-hop V3/V4 routes
    pub single_hop_overhead: u64,
    /// V2 base swap cost
    pub base_swap_cost_v2: u64,
    /// V2 cost per hop beyond the first
    pub cost_per_extra_hop_v2: u64,
}

const STANDARD_GAS: GasConstants = GasConstants {
    base_swap_cost: 2_000,
    cost_per_hop: 80_000,
    cost_per_init_tick: 31_000,
    single_hop_overhead: 15_000,
    base_swap_cost_v2: 135_000,
    cost_per_extra_hop_v2: 50_000,
};

// Arbitrum pays a higher per-swap base on the execution side.
const ARBITRUM_GAS: GasConstants = GasConstants {
    base_swap_cost: 5_000,
    ..STANDARD_GAS
};

/// Everything the pipeline needs to know about one chain.
#[derive(Debug)]
pub struct ChainInfo {
    pub chain_id: u64,
    pub wrapped_native: Address,
    pub v2_factory: Address,
    pub v2_init_code_hash: B256,
    pub v3_factory: Address,
    pub v3_init_code_hash: B256,
    pub v4_pool_manager: Address,
    /// V4 periphery lens for reading singleton pool state.
    pub v4_state_view: Address,
    pub v3_quoter: Address,
    pub v4_quoter: Address,
    pub universal_router: Address,
    /// Stablecoins and majors used as routing intermediaries.
    pub base_tokens: &'static [Address],
    pub op_stack: bool,
    pub gas: GasConstants,
    /// Tokens whose transfer cost warrants a fixed gas surcharge, with the
    /// surcharge in gas units.
    pub expensive_transfer_tokens: &'static [(Address, u64)],
    /// Tokens excluded from V3 direct-pair selection (rebasing and other
    /// pathological transfer semantics).
    pub blocked_v3_tokens: &'static [Address],
    /// Individual pools excluded from V3 direct-pair selection.
    pub blocked_v3_pools: &'static [Address],
    /// Pairs that must be quoted with a fresh on-chain gas price.
    pub gas_price_required_pairs: &'static [(Address, Address)],
}

impl ChainInfo {
    pub fn is_base_token(&self, token: &Address) -> bool {
        self.base_tokens.contains(token)
    }

    pub fn token_gas_overhead(&self, token: &Address) -> u64 {
        self.expensive_transfer_tokens
            .iter()
            .find(|(addr, _)| addr == token)
            .map(|(_, cost)| *cost)
            .unwrap_or(0)
    }

    pub fn pair_requires_gas_price(&self, a: &Address, b: &Address) -> bool {
        self.gas_price_required_pairs
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

/// Multicall3 is deployed at the same address on every supported chain.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// OP-stack GasPriceOracle predeploy (L1 data fee oracle).
pub const OP_GAS_PRICE_ORACLE: Address = address!("420000000000000000000000000000000000000F");

/// Arbitrum ArbGasInfo precompile.
pub const ARB_GAS_INFO: Address = address!("000000000000000000000000000000000000006C");

// ── Mainnet ──────────────────────────────────────────────────────────────────

const MAINNET_WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
const MAINNET_USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
const MAINNET_USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
const MAINNET_DAI: Address = address!("6B175474E89094C44Da98b954EedeAC495271d0F");
const MAINNET_WBTC: Address = address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599");

static MAINNET: ChainInfo = ChainInfo {
    chain_id: 1,
    wrapped_native: MAINNET_WETH,
    v2_factory: address!("5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f"),
    v2_init_code_hash: b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"),
    v3_factory: address!("1F98431c8aD98523631AE4a59f267346ea31F984"),
    v3_init_code_hash: b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54"),
    v4_pool_manager: address!("000000000004444c5dc75cB358380D2e3dE08A90"),
    v4_state_view: address!("7fFE42C4a5DEeA5b0feC41C94C136Cf115597227"),
    v3_quoter: address!("61fFE014bA17989E743c5F6cB21bF9697530B21e"),
    v4_quoter: address!("52F0E24D1c21C8A0cB1e5a5dD6198556BD9E1203"),
    universal_router: address!("66a9893cC07D91D95644AEDD05D03f95e1dBA8Af"),
    base_tokens: &[MAINNET_USDC, MAINNET_USDT, MAINNET_DAI, MAINNET_WBTC, MAINNET_WETH],
    op_stack: false,
    gas: STANDARD_GAS,
    expensive_transfer_tokens: &[
        // AAVE and LDO both run hook-heavy transfer paths
        (address!("7Fc66500c84A76Ad7e9c93437bFc5Ac33E2DDaE9"), 150_000),
        (address!("5A98FcBEA516Cf06857215779Fd812CA3beF1B32"), 150_000),
    ],
    blocked_v3_tokens: &[
        // AMPL — rebasing supply breaks V3 accounting
        address!("D46bA6D942050d489DBd938a2C909A5d5039A161"),
    ],
    blocked_v3_pools: &[],
    gas_price_required_pairs: &[(MAINNET_WETH, MAINNET_USDC)],
};

// ── Optimism ─────────────────────────────────────────────────────────────────

const OP_WETH: Address = address!("4200000000000000000000000000000000000006");
const OP_USDC: Address = address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85");
const OP_DAI: Address = address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1");

static OPTIMISM: ChainInfo = ChainInfo {
    chain_id: 10,
    wrapped_native: OP_WETH,
    v2_factory: address!("0c3c1c532F1e39EdF36BE9Fe0bE1410313E074Bf"),
    v2_init_code_hash: b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"),
    v3_factory: address!("1F98431c8aD98523631AE4a59f267346ea31F984"),
    v3_init_code_hash: b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54"),
    v4_pool_manager: address!("9a13F98Cb987694C9F086b1F5eB990EeA8264Ec3"),
    v4_state_view: address!("c18a3169788F4F75A170290584EcA6395C75Ecdb"),
    v3_quoter: address!("61fFE014bA17989E743c5F6cB21bF9697530B21e"),
    v4_quoter: address!("1f3131A13296Fb91c90870043742C3cdBfF1a8D7"),
    universal_router: address!("851116D9223fabED8E56C0E6b8Ad0c31d98B3507"),
    base_tokens: &[OP_USDC, OP_DAI, OP_WETH],
    op_stack: true,
    gas: STANDARD_GAS,
    expensive_transfer_tokens: &[],
    blocked_v3_tokens: &[],
    blocked_v3_pools: &[],
    gas_price_required_pairs: &[],
};

// ── Polygon ──────────────────────────────────────────────────────────────────

const POLYGON_WMATIC: Address = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");
const POLYGON_USDCE: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
const POLYGON_USDT: Address = address!("c2132D05D31c914a87C6611C10748AEb04B58e8F");
const POLYGON_WETH: Address = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");

static POLYGON: ChainInfo = ChainInfo {
    chain_id: 137,
    wrapped_native: POLYGON_WMATIC,
    v2_factory: address!("5757371414417b8C6CAad45bAeF941aBc7d3Ab32"),
    v2_init_code_hash: b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"),
    v3_factory: address!("1F98431c8aD98523631AE4a59f267346ea31F984"),
    v3_init_code_hash: b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54"),
    v4_pool_manager: address!("67366782805870060151383F4BbFF9daB53e5cD6"),
    v4_state_view: address!("5eA1bD7974c8A611cBAB0bDCAFcB1D9CC9b3BA5a"),
    v3_quoter: address!("61fFE014bA17989E743c5F6cB21bF9697530B21e"),
    v4_quoter: address!("b3d5c3dFc3a7aebff71895A7191796BFfC2c81b9"),
    universal_router: address!("1095692A6237d83C6a72F3F5eFEdb9A670C49223"),
    base_tokens: &[POLYGON_USDCE, POLYGON_USDT, POLYGON_WETH, POLYGON_WMATIC],
    op_stack: false,
    gas: STANDARD_GAS,
    expensive_transfer_tokens: &[],
    blocked_v3_tokens: &[],
    blocked_v3_pools: &[],
    gas_price_required_pairs: &[],
};

// ── Base ─────────────────────────────────────────────────────────────────────

const BASE_WETH: Address = address!("4200000000000000000000000000000000000006");
const BASE_USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");
const BASE_DAI: Address = address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb");

static BASE: ChainInfo = ChainInfo {
    chain_id: 8453,
    wrapped_native: BASE_WETH,
    v2_factory: address!("8909Dc15e40173Ff4699343b6eB8132c65e18eC6"),
    v2_init_code_hash: b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"),
    v3_factory: address!("33128a8fC17869897dcE68Ed026d694621f6FDfD"),
    v3_init_code_hash: b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54"),
    v4_pool_manager: address!("498581fF718922c3f8e6A244956aF099B2652b2b"),
    v4_state_view: address!("A3c0c9b65baD0b08107Aa264b0f3dB444b867A71"),
    v3_quoter: address!("3d4e44Eb1374240CE5F1B871ab261CD16335B76a"),
    v4_quoter: address!("0d5e0F971ED27FBfF6c2837bf31316121532048D"),
    universal_router: address!("6fF5693b99212Da76ad316178A184AB56D299b43"),
    base_tokens: &[BASE_USDC, BASE_DAI, BASE_WETH],
    op_stack: true,
    gas: STANDARD_GAS,
    expensive_transfer_tokens: &[],
    blocked_v3_tokens: &[],
    blocked_v3_pools: &[],
    gas_price_required_pairs: &[],
};

// ── Arbitrum ─────────────────────────────────────────────────────────────────

const ARB_WETH: Address = address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1");
const ARB_USDC: Address = address!("af88d065e77c8cC2239327C5EDb3A432268e5831");
const ARB_USDT: Address = address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9");

static ARBITRUM: ChainInfo = ChainInfo {
    chain_id: 42161,
    wrapped_native: ARB_WETH,
    v2_factory: address!("f1D7CC64Fb4452F05c498126312eBE29f30Fbcf9"),
    v2_init_code_hash: b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"),
    v3_factory: address!("1F98431c8aD98523631AE4a59f267346ea31F984"),
    v3_init_code_hash: b256!("e34f199b19b2b4f47f68442619d555527d244f78a3297ea89325f843f87b8b54"),
    v4_pool_manager: address!("360E68faCcca8cA495c1B759Fd9EEe466db9FB32"),
    v4_state_view: address!("76Fd297e2D437cd7f76d50F01AfE6160f86e9990"),
    v3_quoter: address!("61fFE014bA17989E743c5F6cB21bF9697530B21e"),
    v4_quoter: address!("3972c00f7ed4885e145823eb7C655375D275A1C5"),
    universal_router: address!("A51afAFe0263b40EdaEf0Df8781eA9aa03E381a3"),
    base_tokens: &[ARB_USDC, ARB_USDT, ARB_WETH],
    op_stack: false,
    gas: ARBITRUM_GAS,
    expensive_transfer_tokens: &[],
    blocked_v3_tokens: &[],
    blocked_v3_pools: &[],
    gas_price_required_pairs: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_round_trip() {
        for chain in Chain::all() {
            assert_eq!(Chain::from_id(chain.id()), Some(chain));
            assert_eq!(chain.info().chain_id, chain.id());
        }
        assert_eq!(Chain::from_id(56), None);
    }

    #[test]
    fn test_op_stack_membership() {
        assert!(Chain::Optimism.is_op_stack());
        assert!(Chain::Base.is_op_stack());
        assert!(!Chain::Mainnet.is_op_stack());
        assert!(!Chain::Arbitrum.is_op_stack());
    }

    #[test]
    fn test_gas_constants_table() {
        // Arbitrum carries a higher base swap cost; everything else standard
        assert_eq!(Chain::Arbitrum.info().gas.base_swap_cost, 5_000);
        for chain in [Chain::Mainnet, Chain::Optimism, Chain::Polygon, Chain::Base] {
            assert_eq!(chain.info().gas.base_swap_cost, 2_000);
        }
        for chain in Chain::all() {
            let gas = chain.info().gas;
            assert_eq!(gas.cost_per_hop, 80_000);
            assert_eq!(gas.cost_per_init_tick, 31_000);
            assert_eq!(gas.single_hop_overhead, 15_000);
            assert_eq!(gas.base_swap_cost_v2, 135_000);
            assert_eq!(gas.cost_per_extra_hop_v2, 50_000);
        }
    }

    #[test]
    fn test_mainnet_token_overheads() {
        let info = Chain::Mainnet.info();
        let aave = address!("7Fc66500c84A76Ad7e9c93437bFc5Ac33E2DDaE9");
        assert_eq!(info.token_gas_overhead(&aave), 150_000);
        assert_eq!(info.token_gas_overhead(&MAINNET_USDC), 0);
    }

    #[test]
    fn test_gas_price_pair_lookup_is_symmetric() {
        let info = Chain::Mainnet.info();
        assert!(info.pair_requires_gas_price(&MAINNET_WETH, &MAINNET_USDC));
        assert!(info.pair_requires_gas_price(&MAINNET_USDC, &MAINNET_WETH));
        assert!(!info.pair_requires_gas_price(&MAINNET_DAI, &MAINNET_USDT));
    }
}
