//! Rebalance Limiter: per-pool cooldown and hourly rate cap
//!
//! Purpose:
//!     Keeps the keeper from thrashing a pool whose price oscillates around
//!     a range edge. Two independent gates are applied before any `maintain`
//!     submission:
//!     - cooldown: a minimum gap since the last confirmed rebalance
//!     - rate cap: at most N confirmed rebalances within a sliding hour
//!
//! Design:
//!     - Key: pool id
//!     - Timestamps are epoch millis supplied by the caller's clock
//!     - Ledger entries older than 60 minutes are pruned on every check and
//!       every record, so memory stays bounded by the hourly cap
//!     - Only confirmed receipts are recorded; dry runs and failures never
//!       touch the limiter

use crate::types::PoolId;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Sliding window for the hourly rate cap.
pub const RATE_WINDOW_MILLIS: i64 = 60 * 60 * 1_000;

/// Cooldown and rate-limit state for every pool.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_rebalance: HashMap<PoolId, i64>,
    ledger: HashMap<PoolId, VecDeque<i64>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while less than `cooldown_secs` has passed since the last
    /// recorded rebalance. Pools never rebalanced are not on cooldown.
    pub fn is_on_cooldown(&self, pool_id: &PoolId, now_millis: i64, cooldown_secs: u64) -> bool {
        let Some(last) = self.last_rebalance.get(pool_id) else {
            return false;
        };
        let cooldown_millis = i64::try_from(cooldown_secs.saturating_mul(1_000)).unwrap_or(i64::MAX);
        now_millis.saturating_sub(*last) < cooldown_millis
    }

    /// Prunes the pool's ledger, then checks it against the hourly cap.
    pub fn can_rebalance(&mut self, pool_id: &PoolId, now_millis: i64, max_per_hour: u32) -> bool {
        let count = match self.ledger.get_mut(pool_id) {
            Some(entries) => {
                prune(entries, now_millis);
                entries.len()
            }
            None => 0,
        };
        count < max_per_hour as usize
    }

    /// Records a confirmed rebalance. Starts the cooldown and appends to
    /// the hourly ledger.
    pub fn record_rebalance(&mut self, pool_id: PoolId, now_millis: i64) {
        self.last_rebalance.insert(pool_id, now_millis);
        let entries = self.ledger.entry(pool_id).or_default();
        entries.push_back(now_millis);
        prune(entries, now_millis);
        debug!(pool = %pool_id, recent = entries.len(), "rebalance recorded");
    }

    /// Rebalances inside the current window, as of the last prune.
    pub fn recent_count(&self, pool_id: &PoolId) -> usize {
        self.ledger.get(pool_id).map_or(0, VecDeque::len)
    }

    pub fn last_rebalance_millis(&self, pool_id: &PoolId) -> Option<i64> {
        self.last_rebalance.get(pool_id).copied()
    }
}

fn prune(entries: &mut VecDeque<i64>, now_millis: i64) {
    let cutoff = now_millis.saturating_sub(RATE_WINDOW_MILLIS);
    while entries.front().is_some_and(|ts| *ts < cutoff) {
        entries.pop_front();
    }
}
