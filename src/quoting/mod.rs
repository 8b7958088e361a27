//! Pricing and submission plumbing
//!
//! The fetcher prices (route, percentage) pairs through on-chain quoters
//! or offline AMM math; the params builder produces router calldata; the
//! fresh wrapper re-reads pool state for final routes only; the
//! simulator dry-runs the winning calldata.

pub mod fetcher;
pub mod fresh;
pub mod params;
pub mod simulator;
pub mod v3_math;

pub use fetcher::{OfflineQuoteFetcher, OnChainQuoteFetcher, QuoteFetcher};
pub use fresh::FreshPoolDetailsWrapper;
pub use params::{build_method_parameters, MethodParameters};
pub use simulator::{DisabledSimulator, EthCallSimulator, SimulationOutcome, SimulationRequest, Simulator};
