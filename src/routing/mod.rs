//! Route enumeration, sizing and selection
//!
//! The finder enumerates acyclic pool paths; the allocator fans each
//! route into size-partitioned copies; the split finder composes priced
//! sub-routes into full plans; the selector gas-adjusts and ranks them.

pub mod allocator;
pub mod finder;
pub mod selector;
pub mod split;

pub use allocator::RouteQuoteAllocator;
pub use finder::RouteFinder;
pub use selector::QuoteSelector;
pub use split::{BestSplitParams, QuoteBestSplitFinder};
