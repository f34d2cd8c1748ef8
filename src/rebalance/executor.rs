//! `maintain()` submission.
//!
//! Sends the range transition to the hook and waits for one confirmation.
//! A mined-but-reverted transaction is an error: the caller must only touch
//! cooldown and rate-limit state after `Ok`.

use crate::client::SentinelClient;
use crate::contracts::ISentinelHook;
use crate::error::ChainError;
use crate::types::{MaintainReceipt, PoolId};
use alloy::network::ReceiptResponse;
use alloy::primitives::aliases::I24;
use alloy::primitives::U256;
use alloy::providers::Provider;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

/// Upper bound on waiting for the receipt once the transaction is accepted.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(180);

/// Chain write used by the coordinator.
#[async_trait]
pub trait MaintainSubmitter: Send + Sync {
    async fn submit_maintain(
        &self,
        pool_id: PoolId,
        new_lower: i32,
        new_upper: i32,
        volatility_bps: u32,
    ) -> Result<MaintainReceipt, ChainError>;
}

fn to_i24(value: i32, field: &str) -> Result<I24, ChainError> {
    I24::try_from(value).map_err(|e| ChainError::Conversion(format!("{} {}: {}", field, value, e)))
}

#[async_trait]
impl<P> MaintainSubmitter for SentinelClient<P>
where
    P: Provider + Clone + 'static,
{
    async fn submit_maintain(
        &self,
        pool_id: PoolId,
        new_lower: i32,
        new_upper: i32,
        volatility_bps: u32,
    ) -> Result<MaintainReceipt, ChainError> {
        let lower = to_i24(new_lower, "newLower")?;
        let upper = to_i24(new_upper, "newUpper")?;

        let hook = ISentinelHook::new(self.hook_address(), self.provider().clone());
        let call = hook.maintain(pool_id.as_b256(), lower, upper, U256::from(volatility_bps));
        let pending = self.timed(call.send()).await?;
        let tx_hash = *pending.tx_hash();
        info!(pool = %pool_id, tx = %tx_hash, "maintain submitted");

        let receipt = pending
            .with_timeout(Some(RECEIPT_TIMEOUT))
            .get_receipt()
            .await
            .map_err(|e| ChainError::Rpc(format!("receipt for {}: {}", tx_hash, e)))?;

        if !receipt.status() {
            return Err(ChainError::Reverted(receipt.transaction_hash()));
        }

        Ok(MaintainReceipt {
            tx_hash: receipt.transaction_hash(),
            block_number: receipt.block_number(),
        })
    }
}
