//! Trade simulation
//!
//! Ranked candidates are dry-run in order; the first success wins. The
//! eth_call implementation needs a from-address holding the input token;
//! without one, the disabled strategy reports Unattempted and the
//! pipeline carries on.

use crate::chains::Chain;
use crate::tokens::ChainProviders;
use crate::types::SimulationStatus;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SimulationRequest {
    pub chain: Chain,
    pub from: Address,
    pub to: Address,
    pub calldata: Bytes,
    pub value: U256,
}

#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub status: SimulationStatus,
    pub gas_used: Option<u64>,
    pub description: Option<String>,
}

impl SimulationOutcome {
    pub fn unattempted() -> SimulationOutcome {
        SimulationOutcome {
            status: SimulationStatus::Unattempted,
            gas_used: None,
            description: None,
        }
    }
}

#[async_trait]
pub trait Simulator: Send + Sync {
    async fn simulate(&self, request: &SimulationRequest) -> SimulationOutcome;
}

/// eth_call + eth_estimateGas against the chain's RPC.
pub struct EthCallSimulator {
    providers: Arc<ChainProviders>,
}

impl EthCallSimulator {
    pub fn new(providers: Arc<ChainProviders>) -> EthCallSimulator {
        EthCallSimulator { providers }
    }
}

#[async_trait]
impl Simulator for EthCallSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> SimulationOutcome {
        let Some(provider) = self.providers.get(request.chain) else {
            return SimulationOutcome::unattempted();
        };
        let tx = TransactionRequest::default()
            .from(request.from)
            .to(request.to)
            .input(request.calldata.clone().into())
            .value(request.value);

        if let Err(e) = provider.call(tx.clone()).await {
            debug!("Simulation call reverted: {}", e);
            return SimulationOutcome {
                status: SimulationStatus::Failed,
                gas_used: None,
                description: Some(e.to_string()),
            };
        }
        let gas_used = provider.estimate_gas(tx).await.ok();
        SimulationOutcome {
            status: SimulationStatus::Succeeded,
            gas_used,
            description: None,
        }
    }
}

/// Trivial strategy used when simulation is switched off or no
/// from-address is available.
pub struct DisabledSimulator;

#[async_trait]
impl Simulator for DisabledSimulator {
    async fn simulate(&self, _request: &SimulationRequest) -> SimulationOutcome {
        SimulationOutcome::unattempted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_simulator_reports_unattempted() {
        let request = SimulationRequest {
            chain: Chain::Mainnet,
            from: Address::ZERO,
            to: Address::ZERO,
            calldata: Bytes::new(),
            value: U256::ZERO,
        };
        let outcome = DisabledSimulator.simulate(&request).await;
        assert_eq!(outcome.status, SimulationStatus::Unattempted);
        assert!(outcome.description.is_none());
    }
}
