//! Best-split search
//!
//! Composes priced sub-routes into plans whose percentages sum to exactly
//! 100. Level k enumerates ordered partitions of 100 into k step-multiple
//! parts; at every leg only the top two non-conflicting quotes are
//! explored. The search runs under its own wall-clock budget, independent
//! of the request deadline, and returns whatever it has when that budget
//! runs out.

use crate::metrics::Metrics;
use crate::types::{Quote, QuoteSplit, TradeType};
use alloy::primitives::U256;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// At each percentage, only the top quotes surviving the conflict filters
/// are recursed into.
const MAX_VALID_QUOTES_PER_PERCENTAGE: usize = 2;

/// Minimum relative improvement between consecutive levels (0.01%).
const MIN_IMPROVEMENT_PCT_PER_LEVEL: f64 = 0.0001;

/// Levels always explored before the improvement cut-off may fire.
const MIN_SPLIT_LEVELS_BEFORE_EARLY_EXIT: usize = 3;

#[derive(Debug, Clone)]
pub struct BestSplitParams {
    /// Must divide 100 and lie in [5,100].
    pub percentage_step: u32,
    /// Maximum number of legs.
    pub max_splits: usize,
    /// Candidate plans kept after each level.
    pub max_split_routes: usize,
    /// Wall-clock budget.
    pub timeout: Duration,
}

pub struct QuoteBestSplitFinder {
    metrics: Arc<Metrics>,
}

impl QuoteBestSplitFinder {
    pub fn new(metrics: Arc<Metrics>) -> QuoteBestSplitFinder {
        QuoteBestSplitFinder { metrics }
    }

    /// Produce split plans, best first. `quotes_by_percentage` maps each
    /// grid percentage to its quotes; ordering inside is re-established
    /// here so callers need not pre-sort.
    pub async fn find(
        &self,
        trade_type: TradeType,
        mut quotes_by_percentage: HashMap<u32, Vec<Quote>>,
        params: &BestSplitParams,
    ) -> Result<Vec<QuoteSplit>> {
        let step = params.percentage_step;
        if !(5..=100).contains(&step) || 100 % step != 0 {
            // Programmer error: the grid was built with a different step.
            anyhow::bail!("invalid percentage step {}", step);
        }

        for quotes in quotes_by_percentage.values_mut() {
            sort_best_first(quotes, trade_type);
        }

        let deadline = Instant::now() + params.timeout;
        let mut timed_out = false;

        // Level 1: every 100% quote is a singleton plan.
        let mut results: Vec<QuoteSplit> = quotes_by_percentage
            .get(&100)
            .map(|quotes| {
                quotes
                    .iter()
                    .map(|q| QuoteSplit::singleton(q.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let mut seen: HashSet<String> = results.iter().map(combo_key).collect();
        let mut best_prev = best_total(&results, trade_type);

        for level in 2..=params.max_splits {
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            let mut added: Vec<QuoteSplit> = Vec::new();
            let mut partial: Vec<Quote> = Vec::new();
            self.descend(
                &quotes_by_percentage,
                step,
                level,
                100,
                &mut partial,
                &mut seen,
                &mut added,
                deadline,
                &mut timed_out,
            );

            let no_new = added.is_empty();
            results.extend(added);
            trim(&mut results, trade_type, params.max_split_routes);

            if no_new {
                debug!("Split search: no new combinations at level {}", level);
                break;
            }
            let best_now = best_total(&results, trade_type);
            if level >= MIN_SPLIT_LEVELS_BEFORE_EARLY_EXIT
                && !improved_enough(best_prev, best_now, trade_type)
            {
                debug!("Split search: improvement below cut-off at level {}", level);
                break;
            }
            best_prev = best_now;
            if timed_out {
                break;
            }
            // Let the timeout checker and sibling requests run.
            tokio::task::yield_now().await;
        }

        if timed_out {
            Metrics::incr(&self.metrics.split_search_timeouts);
        }

        sort_splits_best_first(&mut results, trade_type);
        Ok(results)
    }

    /// Choose a quote for the next leg. `remaining` is the percentage not
    /// yet assigned; `legs_left` counts this leg inclusive. The final leg
    /// always receives exactly the remainder.
    #[allow(clippy::too_many_arguments)]
    fn descend(
        &self,
        quotes_by_percentage: &HashMap<u32, Vec<Quote>>,
        step: u32,
        legs_left: usize,
        remaining: u32,
        partial: &mut Vec<Quote>,
        seen: &mut HashSet<String>,
        out: &mut Vec<QuoteSplit>,
        deadline: Instant,
        timed_out: &mut bool,
    ) {
        if *timed_out || Instant::now() >= deadline {
            *timed_out = true;
            return;
        }
        // More legs than the step grid can fill.
        if remaining < step * legs_left as u32 {
            return;
        }

        let percentages: Vec<u32> = if legs_left == 1 {
            vec![remaining]
        } else {
            // Leave at least one step per remaining leg; no part may take
            // the whole trade.
            let max_part = (remaining - step * (legs_left as u32 - 1)).min(100 - step);
            (1..=max_part / step).map(|i| i * step).collect()
        };

        for percentage in percentages {
            let Some(candidates) = quotes_by_percentage.get(&percentage) else {
                continue;
            };
            let mut explored = 0usize;
            for candidate in candidates {
                if explored >= MAX_VALID_QUOTES_PER_PERCENTAGE {
                    break;
                }
                if conflicts(candidate, partial) {
                    continue;
                }
                explored += 1;

                partial.push(candidate.clone());
                if legs_left == 1 {
                    let split = QuoteSplit {
                        quotes: partial.clone(),
                    };
                    let key = combo_key(&split);
                    if seen.insert(key) {
                        out.push(split);
                    }
                } else {
                    self.descend(
                        quotes_by_percentage,
                        step,
                        legs_left - 1,
                        remaining - percentage,
                        partial,
                        seen,
                        out,
                        deadline,
                        timed_out,
                    );
                }
                partial.pop();
                if *timed_out {
                    return;
                }
            }
        }
    }
}

/// A candidate conflicts with the partial combination when it shares a
/// pool address with any chosen route, or when it would pair a
/// native-currency route with a wrapped-native one.
fn conflicts(candidate: &Quote, partial: &[Quote]) -> bool {
    for chosen in partial {
        if candidate
            .route
            .pools
            .iter()
            .any(|p| chosen.route.contains_pool(&p.address()))
        {
            return true;
        }
        let cand_native = candidate.route.touches_native();
        let chosen_native = chosen.route.touches_native();
        if (cand_native && !chosen_native && chosen.route.touches_wrapped_native())
            || (chosen_native && !cand_native && candidate.route.touches_wrapped_native())
        {
            return true;
        }
    }
    false
}

/// Deduplication key: per leg the sorted pool addresses plus percentage,
/// legs themselves sorted, so {A@50,B@50} and {B@50,A@50} collide.
fn combo_key(split: &QuoteSplit) -> String {
    let mut legs: Vec<String> = split
        .quotes
        .iter()
        .map(|q| {
            let mut pools: Vec<String> = q
                .route
                .pools
                .iter()
                .map(|p| format!("{:#x}", p.address()))
                .collect();
            pools.sort();
            format!("{}@{}", pools.join("+"), q.percentage())
        })
        .collect();
    legs.sort();
    legs.join("|")
}

fn sort_best_first(quotes: &mut [Quote], trade_type: TradeType) {
    match trade_type {
        TradeType::ExactIn => quotes.sort_by(|a, b| b.quoted.cmp(&a.quoted)),
        TradeType::ExactOut => quotes.sort_by(|a, b| a.quoted.cmp(&b.quoted)),
    }
}

fn sort_splits_best_first(splits: &mut [QuoteSplit], trade_type: TradeType) {
    match trade_type {
        TradeType::ExactIn => splits.sort_by(|a, b| b.total_quoted().cmp(&a.total_quoted())),
        TradeType::ExactOut => splits.sort_by(|a, b| a.total_quoted().cmp(&b.total_quoted())),
    }
}

/// Singletons at 100% are kept unconditionally; the rest is ranked and
/// truncated.
fn trim(results: &mut Vec<QuoteSplit>, trade_type: TradeType, max_split_routes: usize) {
    let mut singletons = Vec::new();
    let mut others = Vec::new();
    for split in results.drain(..) {
        if split.quotes.len() == 1 && split.quotes[0].percentage() == 100 {
            singletons.push(split);
        } else {
            others.push(split);
        }
    }
    sort_splits_best_first(&mut others, trade_type);
    others.truncate(max_split_routes);
    singletons.extend(others);
    *results = singletons;
}

fn best_total(results: &[QuoteSplit], trade_type: TradeType) -> Option<U256> {
    let totals = results.iter().map(|s| s.total_quoted());
    match trade_type {
        TradeType::ExactIn => totals.max(),
        TradeType::ExactOut => totals.min(),
    }
}

fn improved_enough(prev: Option<U256>, now: Option<U256>, trade_type: TradeType) -> bool {
    let (Some(prev), Some(now)) = (prev, now) else {
        return now.is_some();
    };
    if prev.is_zero() {
        return now > prev;
    }
    let prev_f = crate::types::u256_to_f64(prev);
    let now_f = crate::types::u256_to_f64(now);
    let improvement = match trade_type {
        TradeType::ExactIn => (now_f - prev_f) / prev_f,
        TradeType::ExactOut => (prev_f - now_f) / prev_f,
    };
    improvement >= MIN_IMPROVEMENT_PCT_PER_LEVEL
}
