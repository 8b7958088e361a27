//! Concentrated-liquidity swap math
//!
//! Within-tick pricing for V3/V4 pools from (sqrtPriceX96, liquidity,
//! fee) alone. Exact within one tick range; beyond it the single-range
//! assumption degrades, so results carry the crossing count and callers
//! can discount accordingly. All intermediates run in U256 with checked
//! arithmetic; any overflow prices the leg as unquotable.
//!
//! Formulas follow the canonical SqrtPriceMath/SwapMath pair:
//!   zeroForOne:  sqrtP' = ceil(L<<96 * sqrtP / (L<<96 + dx * sqrtP))
//!   oneForZero:  sqrtP' = sqrtP + (dy << 96) / L
//!   dy = L * |sqrtP' - sqrtP| / 2^96
//!   dx = L * |sqrtP' - sqrtP| << 96 / (sqrtP' * sqrtP)

use alloy::primitives::U256;

/// Result of a within-tick swap computation.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapStep {
    /// The counter-amount: output for exact-in, required input for
    /// exact-out.
    pub amount: U256,
    pub sqrt_price_after: U256,
    /// Tick-range crossings implied by the price move (0 when the swap
    /// settles inside the current range).
    pub ticks_crossed: u32,
}

fn q96() -> U256 {
    U256::from(1u128) << 96
}

/// New sqrt price after adding `amount` of token0. Price moves down;
/// rounding is up so the pool never undercharges.
fn next_sqrt_price_from_amount0(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
) -> Option<U256> {
    if amount.is_zero() {
        return Some(sqrt_price_x96);
    }
    if sqrt_price_x96.is_zero() || liquidity == 0 {
        return None;
    }
    let numerator1: U256 = U256::from(liquidity) << 96;

    // Precise path: ceil(numerator1 * sqrtP / (numerator1 + amount * sqrtP))
    if let Some(product) = amount.checked_mul(sqrt_price_x96) {
        if let Some(denominator) = numerator1.checked_add(product) {
            if let Some(full_num) = numerator1.checked_mul(sqrt_price_x96) {
                if !denominator.is_zero() {
                    let result = (full_num + denominator - U256::from(1u8)) / denominator;
                    if !result.is_zero() {
                        return Some(result);
                    }
                }
            }
        }
    }

    // Overflow fallback: ceil(numerator1 / (numerator1 / sqrtP + amount))
    let quotient = numerator1 / sqrt_price_x96;
    let denominator = quotient.checked_add(amount)?;
    if denominator.is_zero() {
        return None;
    }
    let result = (numerator1 + denominator - U256::from(1u8)) / denominator;
    if result.is_zero() {
        None
    } else {
        Some(result)
    }
}

/// New sqrt price after adding `amount` of token1. Price moves up.
fn next_sqrt_price_from_amount1(
    sqrt_price_x96: U256,
    liquidity: u128,
    amount: U256,
) -> Option<U256> {
    if amount.is_zero() {
        return Some(sqrt_price_x96);
    }
    if liquidity == 0 {
        return None;
    }
    let quotient = amount.checked_mul(q96())? / U256::from(liquidity);
    sqrt_price_x96.checked_add(quotient)
}

/// token1 moved between two sqrt prices: L * |Δ sqrtP| / 2^96
fn amount1_delta(liquidity: u128, sqrt_a: U256, sqrt_b: U256) -> Option<U256> {
    let (lower, upper) = if sqrt_a <= sqrt_b { (sqrt_a, sqrt_b) } else { (sqrt_b, sqrt_a) };
    U256::from(liquidity)
        .checked_mul(upper - lower)
        .map(|v| v / q96())
}

/// token0 moved between two sqrt prices: (L << 96) * |Δ sqrtP| / (sqrtA * sqrtB)
fn amount0_delta(liquidity: u128, sqrt_a: U256, sqrt_b: U256) -> Option<U256> {
    if sqrt_a.is_zero() || sqrt_b.is_zero() {
        return None;
    }
    let (lower, upper) = if sqrt_a <= sqrt_b { (sqrt_a, sqrt_b) } else { (sqrt_b, sqrt_a) };
    let numerator1: U256 = U256::from(liquidity) << 96;
    // Two-step division keeps the intermediate inside 256 bits.
    numerator1
        .checked_mul(upper - lower)
        .map(|v| v / upper / lower)
        .or_else(|| {
            let partial = numerator1 / upper;
            partial.checked_mul(upper - lower).map(|v| v / lower)
        })
}

/// Exact-in swap of `amount_in` (fee charged on the input side).
/// `zero_for_one` says token0 enters.
pub fn swap_exact_in(
    sqrt_price_x96: U256,
    liquidity: u128,
    fee: u32,
    tick_current: i32,
    tick_spacing: i32,
    amount_in: U256,
    zero_for_one: bool,
) -> Option<SwapStep> {
    if amount_in.is_zero() || liquidity == 0 || fee >= 1_000_000 {
        return None;
    }
    let after_fee = amount_in.checked_mul(U256::from(1_000_000 - fee))? / U256::from(1_000_000u32);
    if after_fee.is_zero() {
        return None;
    }

    let sqrt_after = if zero_for_one {
        next_sqrt_price_from_amount0(sqrt_price_x96, liquidity, after_fee)?
    } else {
        next_sqrt_price_from_amount1(sqrt_price_x96, liquidity, after_fee)?
    };
    // Direction sanity: the price must move against the input side.
    if zero_for_one && sqrt_after >= sqrt_price_x96 {
        return None;
    }
    if !zero_for_one && sqrt_after <= sqrt_price_x96 {
        return None;
    }

    let amount_out = if zero_for_one {
        amount1_delta(liquidity, sqrt_after, sqrt_price_x96)?
    } else {
        amount0_delta(liquidity, sqrt_after, sqrt_price_x96)?
    };
    Some(SwapStep {
        amount: amount_out,
        sqrt_price_after: sqrt_after,
        ticks_crossed: crossings(tick_current, sqrt_after, tick_spacing),
    })
}

/// Exact-out swap: the input required to withdraw `amount_out`.
/// `zero_for_one` keeps the exact-in orientation (token0 enters).
pub fn swap_exact_out(
    sqrt_price_x96: U256,
    liquidity: u128,
    fee: u32,
    tick_current: i32,
    tick_spacing: i32,
    amount_out: U256,
    zero_for_one: bool,
) -> Option<SwapStep> {
    if amount_out.is_zero() || liquidity == 0 || fee >= 1_000_000 {
        return None;
    }

    // Move the price exactly far enough to release amount_out.
    let sqrt_after = if zero_for_one {
        // token1 leaves: sqrtP' = sqrtP - (out << 96) / L
        let quotient = amount_out.checked_mul(q96())? / U256::from(liquidity);
        sqrt_price_x96.checked_sub(quotient)?
    } else {
        // token0 leaves: sqrtP' = ceil(L<<96 * sqrtP / (L<<96 - out * sqrtP))
        let numerator1: U256 = U256::from(liquidity) << 96;
        let product = amount_out.checked_mul(sqrt_price_x96)?;
        let denominator = numerator1.checked_sub(product)?;
        if denominator.is_zero() {
            return None;
        }
        match numerator1.checked_mul(sqrt_price_x96) {
            Some(full_num) => (full_num + denominator - U256::from(1u8)) / denominator,
            // Overflow fallback: sqrtP' = ceil(numerator1 / (numerator1/sqrtP - out))
            None => {
                let quotient = (numerator1 / sqrt_price_x96).checked_sub(amount_out)?;
                if quotient.is_zero() {
                    return None;
                }
                (numerator1 + quotient - U256::from(1u8)) / quotient
            }
        }
    };
    if sqrt_after.is_zero() {
        return None;
    }

    let amount_in_net = if zero_for_one {
        amount0_delta(liquidity, sqrt_after, sqrt_price_x96)?
    } else {
        amount1_delta(liquidity, sqrt_after, sqrt_price_x96)?
    };
    // Gross the fee back up; +1 keeps the inversion conservative.
    let amount_in = amount_in_net
        .checked_mul(U256::from(1_000_000u32))?
        / U256::from(1_000_000 - fee)
        + U256::from(1u8);

    Some(SwapStep {
        amount: amount_in,
        sqrt_price_after: sqrt_after,
        ticks_crossed: crossings(tick_current, sqrt_after, tick_spacing),
    })
}

/// Tick implied by a sqrt price; f64 log is enough for range checks.
pub fn tick_from_sqrt_price_x96(sqrt_price_x96: U256) -> i32 {
    let q96_f = 2.0_f64.powi(96);
    let sqrt_price_f = if sqrt_price_x96 > U256::from(u128::MAX) {
        let shifted: U256 = sqrt_price_x96 >> 64;
        let shifted_f: u128 = shifted.try_into().unwrap_or(u128::MAX);
        shifted_f as f64 / (q96_f / 2.0_f64.powi(64))
    } else {
        let raw: u128 = sqrt_price_x96.try_into().unwrap_or(u128::MAX);
        raw as f64 / q96_f
    };
    if sqrt_price_f <= 0.0 {
        return i32::MIN;
    }
    (2.0 * sqrt_price_f.ln() / 1.0001_f64.ln()).floor() as i32
}

fn crossings(tick_current: i32, sqrt_after: U256, tick_spacing: i32) -> u32 {
    let spacing = tick_spacing.max(1);
    let tick_after = tick_from_sqrt_price_x96(sqrt_after);
    let moved = (tick_after - tick_current).abs();
    ((moved + spacing - 1) / spacing) as u32
}

/// Tick spacing for the standard fee tiers (dynamic-fee pools fall back
/// to the minimum).
pub fn tick_spacing_for_fee(fee: u32) -> i32 {
    match fee {
        100 => 1,
        500 => 10,
        3_000 => 60,
        10_000 => 200,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIQ: u128 = 10_000_000_000_000_000_000; // deep range

    fn sqrt_at_tick_zero() -> U256 {
        U256::from(1u128) << 96
    }

    #[test]
    fn test_exact_in_zero_for_one_moves_price_down() {
        let step = swap_exact_in(
            sqrt_at_tick_zero(),
            LIQ,
            3_000,
            0,
            60,
            U256::from(1_000_000u64),
            true,
        )
        .expect("step");
        assert!(step.sqrt_price_after < sqrt_at_tick_zero());
        // At a 1:1 price the output is the input minus the 0.3% fee and
        // a sliver of impact
        let out: u64 = step.amount.to::<u64>();
        assert!(out > 996_000 && out < 998_000, "out = {}", out);
        assert_eq!(step.ticks_crossed, 0);
    }

    #[test]
    fn test_exact_in_one_for_zero_moves_price_up() {
        let step = swap_exact_in(
            sqrt_at_tick_zero(),
            LIQ,
            500,
            0,
            10,
            U256::from(1_000_000u64),
            false,
        )
        .expect("step");
        assert!(step.sqrt_price_after > sqrt_at_tick_zero());
        let out: u64 = step.amount.to::<u64>();
        assert!(out > 999_000 && out < 1_000_000);
    }

    #[test]
    fn test_exact_out_inverts_exact_in() {
        let amount_in = U256::from(5_000_000u64);
        let forward = swap_exact_in(
            sqrt_at_tick_zero(),
            LIQ,
            3_000,
            0,
            60,
            amount_in,
            true,
        )
        .expect("forward");
        let back = swap_exact_out(
            sqrt_at_tick_zero(),
            LIQ,
            3_000,
            0,
            60,
            forward.amount,
            true,
        )
        .expect("back");
        // Conservative rounding: never cheaper than the forward input
        assert!(back.amount >= amount_in);
        let slack = back.amount - amount_in;
        assert!(slack <= U256::from(25u64), "slack = {}", slack);
    }

    #[test]
    fn test_zero_liquidity_is_unquotable() {
        assert!(swap_exact_in(
            sqrt_at_tick_zero(),
            0,
            500,
            0,
            10,
            U256::from(1u64),
            true
        )
        .is_none());
    }

    #[test]
    fn test_large_trade_counts_tick_crossings() {
        // Shallow liquidity: a big trade walks multiple ranges
        let step = swap_exact_in(
            sqrt_at_tick_zero(),
            1_000_000_000,
            500,
            0,
            10,
            U256::from(100_000_000u64),
            true,
        );
        if let Some(step) = step {
            assert!(step.ticks_crossed > 0);
        }
    }

    #[test]
    fn test_tick_from_sqrt_price() {
        assert_eq!(tick_from_sqrt_price_x96(sqrt_at_tick_zero()), 0);
        // sqrt(1.0001^100) * 2^96: ~tick 100
        let sqrt_100 = 1.0001_f64.powi(50) * 2.0_f64.powi(96);
        let tick = tick_from_sqrt_price_x96(U256::from(sqrt_100 as u128));
        assert!((99..=100).contains(&tick), "tick = {}", tick);
    }

    #[test]
    fn test_fee_tier_spacings() {
        assert_eq!(tick_spacing_for_fee(100), 1);
        assert_eq!(tick_spacing_for_fee(500), 10);
        assert_eq!(tick_spacing_for_fee(3_000), 60);
        assert_eq!(tick_spacing_for_fee(10_000), 200);
        assert_eq!(tick_spacing_for_fee(123), 1);
    }
}
