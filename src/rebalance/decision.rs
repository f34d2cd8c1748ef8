//! Rebalance Decision Engine
//!
//! Turns one pool snapshot, the pool's recent history and a reference price
//! into a `Decision`. No I/O happens here: the coordinator reads the chain
//! and the oracle, this module only judges.
//!
//! Evaluation order (first match wins):
//!     1. not initialized                      → Skip(NotInitialized)
//!     2. liquidity / shares below floor       → Skip(MinLiquidity / MinShares)
//!     3. range width <= 0, spacing 0, or a
//!        spacing override that is not a
//!        multiple of the pool's spacing       → Skip(InvalidRange)
//!     4. spot moved > max slippage since the
//!        previous price sample                → Skip(MaxSlippage)
//!     5. oracle read failed                   → Skip(OracleError)
//!     6. spot vs oracle > max deviation       → Skip(OracleDeviation)
//!     7. tick outside [lower, upper]          → Rebalance(OutOfRange)
//!     8. tick within edge threshold           → Rebalance(NearEdge)
//!     9. otherwise                            → Skip(InRange)
//!
//! Steps 1-4 are `screen`; steps 5-9 are `conclude`. The split lets the
//! coordinator skip the oracle round trip for pools that fail a cheap gate.

use crate::pool::PriceCalculator;
use crate::rebalance::history::PoolHistory;
use crate::types::{
    Decision, PoolConfig, PoolSnapshot, RebalancePlan, RebalanceTrigger, SkipReason,
};
use alloy::primitives::U256;

/// Process-wide gates shared by every pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionLimits {
    /// Minimum active liquidity; 0 disables the gate.
    pub min_liquidity: u128,
    /// Minimum total shares; 0 disables the gate.
    pub min_shares: U256,
    /// Replaces every pool's own `maxDeviationBps` when set.
    pub max_deviation_override: Option<U256>,
}

/// A snapshot that passed every oracle-independent gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screened {
    pub current_tick: i32,
    pub active_lower: i32,
    pub active_upper: i32,
    pub tick_spacing: i32,
    pub spot_price: U256,
    pub max_deviation_bps: U256,
    pub volatility_bps: u32,
    new_lower: i64,
    new_upper: i64,
    edge_bps: u32,
}

impl Screened {
    fn range_width(&self) -> i64 {
        i64::from(self.active_upper) - i64::from(self.active_lower)
    }

    fn plan(&self, trigger: RebalanceTrigger) -> Decision {
        if !PriceCalculator::is_valid_tick(self.new_lower)
            || !PriceCalculator::is_valid_tick(self.new_upper)
        {
            return Decision::Skip(SkipReason::InvalidNewRange);
        }
        let plan = RebalancePlan {
            trigger,
            current_tick: self.current_tick,
            active_lower: self.active_lower,
            active_upper: self.active_upper,
            // Both within ±MAX_TICK, so they fit
            new_lower: self.new_lower as i32,
            new_upper: self.new_upper as i32,
            volatility_bps: self.volatility_bps,
        };
        if plan.is_valid_range() {
            Decision::Rebalance(plan)
        } else {
            Decision::Skip(SkipReason::InvalidNewRange)
        }
    }
}

/// Oracle-independent gates. Returns the data `conclude` needs, or the
/// first reason to leave the pool alone.
pub fn screen(
    snapshot: &PoolSnapshot,
    history: &PoolHistory<'_>,
    config: &PoolConfig,
    limits: &DecisionLimits,
) -> Result<Screened, SkipReason> {
    if !snapshot.is_initialized {
        return Err(SkipReason::NotInitialized);
    }
    if limits.min_liquidity > 0 && snapshot.active_liquidity < limits.min_liquidity {
        return Err(SkipReason::MinLiquidity);
    }
    if !limits.min_shares.is_zero() && snapshot.total_shares < limits.min_shares {
        return Err(SkipReason::MinShares);
    }

    if snapshot.range_width() <= 0 {
        return Err(SkipReason::InvalidRange);
    }
    let tick_spacing = effective_spacing(snapshot.tick_spacing, config.tick_spacing_override)
        .ok_or(SkipReason::InvalidRange)?;

    let spot_price = PriceCalculator::spot_price_x18(
        snapshot.sqrt_price_x96,
        snapshot.decimals0,
        snapshot.decimals1,
    );
    if let Some(previous) = history.previous_price() {
        let moved = PriceCalculator::relative_diff_bps(spot_price, previous);
        if moved > U256::from(config.max_slippage_bps) {
            return Err(SkipReason::MaxSlippage);
        }
    }

    let tick = i64::from(snapshot.current_tick);
    let half_width = i64::from(config.half_width);
    let spacing = i64::from(tick_spacing);
    Ok(Screened {
        current_tick: snapshot.current_tick,
        active_lower: snapshot.active_tick_lower,
        active_upper: snapshot.active_tick_upper,
        tick_spacing,
        spot_price,
        max_deviation_bps: limits
            .max_deviation_override
            .unwrap_or(snapshot.max_deviation_bps),
        volatility_bps: history.volatility_bps(),
        new_lower: PriceCalculator::align_down(tick - half_width, spacing),
        new_upper: PriceCalculator::align_down(tick + half_width, spacing),
        edge_bps: config.edge_bps,
    })
}

/// Spacing used to align the new range. An override must be a positive
/// multiple of the pool's own spacing, or every aligned tick would be off
/// the pool's grid.
fn effective_spacing(pool_spacing: i32, spacing_override: Option<i32>) -> Option<i32> {
    let pool_spacing = pool_spacing.checked_abs().filter(|s| *s > 0)?;
    match spacing_override.filter(|s| *s != 0) {
        None => Some(pool_spacing),
        Some(o) if o > 0 && o % pool_spacing == 0 => Some(o),
        Some(_) => None,
    }
}

/// Oracle-dependent tail. `None` means the oracle read failed.
pub fn conclude(screened: &Screened, oracle_price: Option<U256>) -> Decision {
    let Some(oracle_price) = oracle_price else {
        return Decision::Skip(SkipReason::OracleError);
    };
    let deviation = PriceCalculator::relative_diff_bps(screened.spot_price, oracle_price);
    if deviation > screened.max_deviation_bps {
        return Decision::Skip(SkipReason::OracleDeviation);
    }

    let tick = screened.current_tick;
    if tick < screened.active_lower || tick > screened.active_upper {
        return screened.plan(RebalanceTrigger::OutOfRange);
    }

    let threshold = PriceCalculator::edge_threshold(screened.range_width(), screened.edge_bps);
    let to_lower = i64::from(tick) - i64::from(screened.active_lower);
    let to_upper = i64::from(screened.active_upper) - i64::from(tick);
    if to_lower < threshold || to_upper < threshold {
        return screened.plan(RebalanceTrigger::NearEdge);
    }

    Decision::Skip(SkipReason::InRange)
}

/// Full decision in one call: `screen`, then `conclude` against an
/// already-read oracle result.
pub fn decide<E>(
    snapshot: &PoolSnapshot,
    oracle_price: &Result<U256, E>,
    history: &PoolHistory<'_>,
    config: &PoolConfig,
    limits: &DecisionLimits,
) -> Decision {
    match screen(snapshot, history, config, limits) {
        Ok(screened) => conclude(&screened, oracle_price.as_ref().ok().copied()),
        Err(reason) => Decision::Skip(reason),
    }
}
