//! In-memory chain for unit tests.
//!
//! Implements the three chain seams with scripted responses and records
//! every `maintain` it receives.

use crate::error::{ChainError, OracleError};
use crate::oracle::{FeedSource, RoundData};
use crate::pool::SnapshotSource;
use crate::rebalance::executor::MaintainSubmitter;
use crate::types::{MaintainReceipt, PoolId, PoolSnapshot};
use alloy::primitives::{Address, B256, I256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

const Q96: u128 = 1 << 96;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintainCall {
    pub pool_id: PoolId,
    pub new_lower: i32,
    pub new_upper: i32,
    pub volatility_bps: u32,
}

#[derive(Default)]
pub struct MockChain {
    snapshots: Mutex<HashMap<PoolId, Result<PoolSnapshot, ChainError>>>,
    feeds: Mutex<HashMap<Address, (RoundData, u8)>>,
    decimals_calls: AtomicUsize,
    round_reads: AtomicUsize,
    snapshot_reads: AtomicUsize,
    maintain_calls: Mutex<Vec<MaintainCall>>,
    maintain_failure: Mutex<Option<ChainError>>,
    next_block: AtomicU64,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            next_block: AtomicU64::new(100),
            ..Default::default()
        }
    }

    pub fn set_snapshot(&self, pool_id: PoolId, snapshot: PoolSnapshot) {
        self.snapshots.lock().unwrap().insert(pool_id, Ok(snapshot));
    }

    pub fn fail_snapshot(&self, pool_id: PoolId, err: ChainError) {
        self.snapshots.lock().unwrap().insert(pool_id, Err(err));
    }

    pub fn set_feed(&self, feed: Address, round: RoundData, decimals: u8) {
        self.feeds.lock().unwrap().insert(feed, (round, decimals));
    }

    /// Every later `maintain` fails with `err`; `None` restores success.
    pub fn fail_maintain(&self, err: Option<ChainError>) {
        *self.maintain_failure.lock().unwrap() = err;
    }

    pub fn decimals_calls(&self) -> usize {
        self.decimals_calls.load(Ordering::SeqCst)
    }

    pub fn round_reads(&self) -> usize {
        self.round_reads.load(Ordering::SeqCst)
    }

    pub fn snapshot_reads(&self) -> usize {
        self.snapshot_reads.load(Ordering::SeqCst)
    }

    pub fn maintain_calls(&self) -> Vec<MaintainCall> {
        self.maintain_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotSource for MockChain {
    async fn read_snapshot(&self, pool_id: PoolId) -> Result<PoolSnapshot, ChainError> {
        self.snapshot_reads.fetch_add(1, Ordering::SeqCst);
        self.snapshots
            .lock()
            .unwrap()
            .get(&pool_id)
            .cloned()
            .unwrap_or_else(|| Err(ChainError::Rpc(format!("unknown pool {}", pool_id))))
    }
}

#[async_trait]
impl FeedSource for MockChain {
    async fn latest_round_data(&self, feed: Address) -> Result<RoundData, OracleError> {
        self.round_reads.fetch_add(1, Ordering::SeqCst);
        self.feeds
            .lock()
            .unwrap()
            .get(&feed)
            .map(|(round, _)| round.clone())
            .ok_or_else(|| OracleError::Rpc(format!("unknown feed {}", feed)))
    }

    async fn feed_decimals(&self, feed: Address) -> Result<u8, OracleError> {
        self.decimals_calls.fetch_add(1, Ordering::SeqCst);
        self.feeds
            .lock()
            .unwrap()
            .get(&feed)
            .map(|(_, decimals)| *decimals)
            .ok_or_else(|| OracleError::Rpc(format!("unknown feed {}", feed)))
    }
}

#[async_trait]
impl MaintainSubmitter for MockChain {
    async fn submit_maintain(
        &self,
        pool_id: PoolId,
        new_lower: i32,
        new_upper: i32,
        volatility_bps: u32,
    ) -> Result<MaintainReceipt, ChainError> {
        self.maintain_calls.lock().unwrap().push(MaintainCall {
            pool_id,
            new_lower,
            new_upper,
            volatility_bps,
        });
        // Give other tasks a chance to run while the "transaction" is pending
        tokio::task::yield_now().await;

        if let Some(err) = self.maintain_failure.lock().unwrap().clone() {
            return Err(err);
        }
        let block = self.next_block.fetch_add(1, Ordering::SeqCst);
        Ok(MaintainReceipt {
            tx_hash: B256::with_last_byte(block as u8),
            block_number: Some(block),
        })
    }
}

pub fn pool_id(byte: u8) -> PoolId {
    PoolId(B256::repeat_byte(byte))
}

/// Initialized pool with range [-600, 600], spacing 60 and spot price 1.0,
/// priced by `feed`.
pub fn snapshot_at(tick: i32, feed: Address) -> PoolSnapshot {
    PoolSnapshot {
        active_tick_lower: -600,
        active_tick_upper: 600,
        active_liquidity: 1_000_000,
        total_shares: U256::from(1_000u64),
        tick_spacing: 60,
        decimals0: 18,
        decimals1: 18,
        price_feed: feed,
        price_feed_inverted: false,
        max_deviation_bps: U256::from(500u64),
        is_initialized: true,
        current_tick: tick,
        sqrt_price_x96: U256::from(Q96),
    }
}

/// Fresh 8-decimal round answering 1.0.
pub fn parity_round() -> RoundData {
    RoundData {
        round_id: U256::from(1u64),
        answer: I256::try_from(100_000_000i64).unwrap(),
        started_at: U256::from(1_700_000_000u64),
        updated_at: U256::from(1_700_000_000u64),
        answered_in_round: U256::from(1u64),
    }
}
