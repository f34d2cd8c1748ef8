//! Pool Snapshot Reader
//!
//! Reads hook-level range/accounting state (`getPoolState`) and the pool
//! manager's `getSlot0` for one pool and merges them into a `PoolSnapshot`.
//! Both calls are independent and issued concurrently. There is no retry
//! here: a failed read skips the pool for the current cycle only.

use crate::client::SentinelClient;
use crate::contracts::{IPoolManager, ISentinelHook};
use crate::error::ChainError;
use crate::types::{PoolId, PoolSnapshot};
use alloy::primitives::aliases::I24;
use alloy::primitives::U256;
use alloy::providers::Provider;
use async_trait::async_trait;
use std::future::IntoFuture;
use tracing::debug;

/// Source of fresh on-chain pool state.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn read_snapshot(&self, pool_id: PoolId) -> Result<PoolSnapshot, ChainError>;
}

#[async_trait]
impl<P> SnapshotSource for SentinelClient<P>
where
    P: Provider + Clone + 'static,
{
    async fn read_snapshot(&self, pool_id: PoolId) -> Result<PoolSnapshot, ChainError> {
        let hook = ISentinelHook::new(self.hook_address(), self.provider().clone());
        let manager = IPoolManager::new(self.pool_manager_address(), self.provider().clone());

        let state_call = hook.getPoolState(pool_id.as_b256());
        let slot0_call = manager.getSlot0(pool_id.as_b256());
        let (state_res, slot0_res) = tokio::join!(
            self.timed(state_call.call().into_future()),
            self.timed(slot0_call.call().into_future())
        );

        let state = state_res?;
        let slot0 = slot0_res?;
        let snapshot = merge_snapshot(&state, U256::from(slot0.sqrtPriceX96), slot0.tick)?;

        debug!(
            pool = %pool_id,
            tick = snapshot.current_tick,
            lower = snapshot.active_tick_lower,
            upper = snapshot.active_tick_upper,
            liquidity = snapshot.active_liquidity,
            "snapshot read"
        );
        Ok(snapshot)
    }
}

fn tick_to_i32(value: I24, field: &str) -> Result<i32, ChainError> {
    i32::try_from(value).map_err(|e| ChainError::Conversion(format!("{}: {}", field, e)))
}

/// Combines the hook's pool state with the pool manager's slot0.
pub(crate) fn merge_snapshot(
    state: &ISentinelHook::PoolState,
    sqrt_price_x96: U256,
    tick: I24,
) -> Result<PoolSnapshot, ChainError> {
    Ok(PoolSnapshot {
        active_tick_lower: tick_to_i32(state.activeTickLower, "activeTickLower")?,
        active_tick_upper: tick_to_i32(state.activeTickUpper, "activeTickUpper")?,
        active_liquidity: state.activeLiquidity,
        total_shares: state.totalShares,
        tick_spacing: tick_to_i32(state.tickSpacing, "tickSpacing")?.abs(),
        decimals0: state.decimals0,
        decimals1: state.decimals1,
        price_feed: state.priceFeed,
        price_feed_inverted: state.priceFeedInverted,
        max_deviation_bps: state.maxDeviationBps,
        is_initialized: state.isInitialized,
        current_tick: tick_to_i32(tick, "tick")?,
        sqrt_price_x96,
    })
}
