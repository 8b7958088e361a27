//! Gas modelling
//!
//! Execution gas is a closed-form formula over route structure; rollups
//! add an L1 data component (oracle calls on OP-stack, a compression
//! model on Arbitrum). The converter expresses the total in the quote
//! token so ranking can subtract it from outputs.

pub mod converter;
pub mod estimator;
pub mod l1;

pub use converter::GasConverter;
pub use estimator::GasEstimator;
pub use l1::L1GasEstimator;
