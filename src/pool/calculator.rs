//! Price Calculator
//!
//! Tick alignment, pool spot price and relative price difference, all in
//! integer arithmetic. These values gate monetary decisions, so nothing here
//! touches floating point.

use alloy::primitives::{U256, U512};
use rust_decimal::Decimal;

/// 1e18, the fixed-point scale every price in the keeper is expressed in.
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Basis points denominator.
pub const BPS: u64 = 10_000;

/// Largest usable tick (int24 price bounds); the smallest is its negation.
pub const MAX_TICK: i32 = 887_272;

/// Price calculator for hook-managed pools
pub struct PriceCalculator;

impl PriceCalculator {
    /// `floor(tick / spacing) * spacing`. `spacing` must be positive.
    ///
    /// Floors toward negative infinity, so the result is always a multiple
    /// of `spacing` and never above `tick`. Works in i64 so `tick ± width`
    /// can be aligned before it is range-checked.
    pub fn align_down(tick: i64, spacing: i64) -> i64 {
        debug_assert!(spacing > 0, "spacing must be positive");
        tick.div_euclid(spacing) * spacing
    }

    /// True when `tick` lies within the int24 price bounds.
    pub fn is_valid_tick(tick: i64) -> bool {
        (-i64::from(MAX_TICK)..=i64::from(MAX_TICK)).contains(&tick)
    }

    /// Distance from a boundary that counts as "near the edge":
    /// `max(1, floor(width * edge_bps / 10000))`.
    pub fn edge_threshold(range_width: i64, edge_bps: u32) -> i64 {
        (range_width * i64::from(edge_bps) / BPS as i64).max(1)
    }

    /// Spot price of token0 in token1 as an 18-decimal fixed-point number,
    /// decimal-adjusted: `sqrtP² · 1e18 / 2¹⁹² · 10^decimals0 / 10^decimals1`.
    ///
    /// Computed in 512 bits; a result above `U256::MAX` saturates.
    pub fn spot_price_x18(sqrt_price_x96: U256, decimals0: u8, decimals1: u8) -> U256 {
        let sqrt = U512::from(sqrt_price_x96);
        let ten = U512::from(10u64);
        let Some(scale1) = ten.checked_pow(U512::from(decimals1)) else {
            return U256::ZERO;
        };
        let scaled = sqrt
            .checked_mul(sqrt)
            .and_then(|sq| sq.checked_mul(U512::from(WAD)))
            .map(|p| p >> 192usize)
            .and_then(|p| p.checked_mul(ten.checked_pow(U512::from(decimals0))?))
            .map(|p| p / scale1);
        match scaled {
            Some(value) => saturate_u256(value),
            None => U256::MAX,
        }
    }

    /// `|a - b| * 10000 / ((a + b) / 2)`; 10000 when either side is zero.
    pub fn relative_diff_bps(a: U256, b: U256) -> U256 {
        if a.is_zero() || b.is_zero() {
            return U256::from(BPS);
        }
        let diff = if a > b { a - b } else { b - a };
        let avg = a.saturating_add(b) / U256::from(2u64);
        diff.saturating_mul(U256::from(BPS)) / avg
    }

    /// Human-readable form of an 18-decimal value, for log lines only.
    /// `None` when the value is too large to render.
    pub fn to_decimal(value_x18: U256) -> Option<Decimal> {
        let raw = u128::try_from(value_x18).ok()?;
        let raw = i128::try_from(raw).ok()?;
        Decimal::try_from_i128_with_scale(raw, 18)
            .ok()
            .map(|d| d.normalize())
    }
}

fn saturate_u256(value: U512) -> U256 {
    let limbs = value.as_limbs();
    if limbs[4..].iter().any(|&limb| limb != 0) {
        return U256::MAX;
    }
    U256::from_limbs([limbs[0], limbs[1], limbs[2], limbs[3]])
}
