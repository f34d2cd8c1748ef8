//! Core data structures shared by the reader, the decision engine and the
//! coordinator.

use alloy::primitives::{Address, B256, U256};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// 32-byte pool key as used by the pool manager and the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub B256);

impl PoolId {
    pub fn as_b256(&self) -> B256 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PoolId {
    type Err = alloy::hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        B256::from_str(s.trim()).map(PoolId)
    }
}

impl From<B256> for PoolId {
    fn from(value: B256) -> Self {
        PoolId(value)
    }
}

/// Pool key plus a human-readable label. Immutable once discovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolIdentity {
    pub id: PoolId,
    pub label: String,
}

impl PoolIdentity {
    pub fn new(id: PoolId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }

    /// Identity for a pool learned from a `PoolInitialized` event; the id
    /// doubles as the label.
    pub fn discovered(id: PoolId) -> Self {
        Self {
            id,
            label: id.to_string(),
        }
    }
}

/// Per-pool tunables, fixed at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Ticks on each side of the current tick for a new range.
    pub half_width: i32,
    /// Edge proximity, as a fraction of the active range width.
    pub edge_bps: u32,
    /// Largest spot move since the previous sample that still allows action.
    pub max_slippage_bps: u32,
    /// Used instead of the hook-reported tick spacing when set.
    pub tick_spacing_override: Option<i32>,
    /// Optional second feed; the reference price becomes base / quote.
    pub quote_feed: Option<Address>,
}

/// A pool the keeper knows about together with its tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    pub identity: PoolIdentity,
    pub config: PoolConfig,
}

/// Point-in-time read of hook and pool-manager state for one pool.
///
/// Built fresh for every decision and never cached beyond it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub active_tick_lower: i32,
    pub active_tick_upper: i32,
    pub active_liquidity: u128,
    pub total_shares: U256,
    pub tick_spacing: i32,
    pub decimals0: u8,
    pub decimals1: u8,
    pub price_feed: Address,
    pub price_feed_inverted: bool,
    pub max_deviation_bps: U256,
    pub is_initialized: bool,
    /// Current tick from `getSlot0`.
    pub current_tick: i32,
    /// sqrtPriceX96 from `getSlot0`.
    pub sqrt_price_x96: U256,
}

impl PoolSnapshot {
    pub fn range_width(&self) -> i64 {
        i64::from(self.active_tick_upper) - i64::from(self.active_tick_lower)
    }
}

/// Why a pool was queued for out-of-cycle evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkReason {
    TickCrossed,
    PoolInitialized,
}

impl fmt::Display for WorkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkReason::TickCrossed => write!(f, "tick-crossed"),
            WorkReason::PoolInitialized => write!(f, "pool-initialized"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub pool_id: PoolId,
    pub reason: WorkReason,
    pub enqueued_at_millis: i64,
}

/// Reason a pool was left alone this cycle.
///
/// `Cooldown` and `RateLimited` come from the coordinator's eligibility
/// check; every other variant is produced by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotInitialized,
    MinLiquidity,
    MinShares,
    InvalidRange,
    MaxSlippage,
    OracleError,
    OracleDeviation,
    InRange,
    InvalidNewRange,
    Cooldown,
    RateLimited,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotInitialized => "not-initialized",
            SkipReason::MinLiquidity => "min-liquidity",
            SkipReason::MinShares => "min-shares",
            SkipReason::InvalidRange => "invalid-range",
            SkipReason::MaxSlippage => "max-slippage",
            SkipReason::OracleError => "oracle-error",
            SkipReason::OracleDeviation => "oracle-deviation",
            SkipReason::InRange => "in-range",
            SkipReason::InvalidNewRange => "invalid-new-range",
            SkipReason::Cooldown => "cooldown",
            SkipReason::RateLimited => "rate-limited",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which condition fired a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebalanceTrigger {
    OutOfRange,
    NearEdge,
}

impl fmt::Display for RebalanceTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceTrigger::OutOfRange => write!(f, "out-of-range"),
            RebalanceTrigger::NearEdge => write!(f, "near-edge"),
        }
    }
}

/// Everything the `maintain` call and the decision log line need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalancePlan {
    pub trigger: RebalanceTrigger,
    pub current_tick: i32,
    pub active_lower: i32,
    pub active_upper: i32,
    pub new_lower: i32,
    pub new_upper: i32,
    pub volatility_bps: u32,
}

impl RebalancePlan {
    pub fn is_valid_range(&self) -> bool {
        self.new_lower < self.new_upper
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    Rebalance(RebalancePlan),
}

impl Decision {
    pub fn is_rebalance(&self) -> bool {
        matches!(self, Decision::Rebalance(_))
    }
}

/// Confirmed `maintain` transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintainReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}
