//! Quote plan ranking
//!
//! Gas-adjusts whole plans and returns the top N. EXACT_IN ranks by
//! output minus gas (descending); EXACT_OUT by required input plus gas
//! (ascending). Ties break toward fewer routes, then a stable
//! route-string comparison so reruns are deterministic.

use crate::types::{QuoteSplit, TradeType};
use std::cmp::Ordering;

pub struct QuoteSelector;

impl QuoteSelector {
    /// Rank candidates and keep the best `top_n`.
    pub fn select(
        trade_type: TradeType,
        mut candidates: Vec<QuoteSplit>,
        top_n: usize,
    ) -> Vec<QuoteSplit> {
        candidates.sort_by(|a, b| {
            let amount_order = match trade_type {
                TradeType::ExactIn => b
                    .total_gas_adjusted(trade_type)
                    .cmp(&a.total_gas_adjusted(trade_type)),
                TradeType::ExactOut => a
                    .total_gas_adjusted(trade_type)
                    .cmp(&b.total_gas_adjusted(trade_type)),
            };
            amount_order
                .then_with(|| a.quotes.len().cmp(&b.quotes.len()))
                .then_with(|| route_key(a).cmp(&route_key(b)))
        });
        candidates.truncate(top_n);
        candidates
    }
}

fn route_key(split: &QuoteSplit) -> String {
    let mut keys: Vec<String> = split
        .quotes
        .iter()
        .map(|q| q.route.route_string())
        .collect();
    keys.sort();
    keys.join("|")
}
