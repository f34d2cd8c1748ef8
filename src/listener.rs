//! Hook Event Listener: push-based work for the coordinator
//!
//! Purpose:
//!     Subscribes to the hook's `TickCrossed` and `PoolInitialized` logs over
//!     WebSocket and turns each into a queued `WorkItem`. Delivery is best
//!     effort: the periodic sweep is what guarantees every pool is looked at,
//!     so a dead subscription degrades latency, never correctness.
//!
//! Design:
//!     - One WS session at a time; on error, wait `RECONNECT_DELAY` and retry
//!     - The attempt counter resets once a subscription is established
//!     - After `MAX_RECONNECTS` consecutive failures the listener gives up
//!       and returns; the keeper keeps running on sweeps alone

use crate::clock::Clock;
use crate::contracts::ISentinelHook::{PoolInitialized, TickCrossed};
use crate::rebalance::WorkQueue;
use crate::types::{PoolId, WorkReason};
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const MAX_RECONNECTS: u32 = 20;
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Log filter for both hook events.
pub fn hook_event_filter(hook: Address) -> Filter {
    Filter::new()
        .address(hook)
        .event_signature(vec![TickCrossed::SIGNATURE_HASH, PoolInitialized::SIGNATURE_HASH])
}

/// Maps a hook log to the pool it concerns. `None` for anything else.
pub fn decode_hook_log(log: &Log) -> Option<(PoolId, WorkReason)> {
    let topic0 = *log.topic0()?;
    if topic0 == TickCrossed::SIGNATURE_HASH {
        let event = log.log_decode::<TickCrossed>().ok()?;
        Some((PoolId(event.inner.data.poolId), WorkReason::TickCrossed))
    } else if topic0 == PoolInitialized::SIGNATURE_HASH {
        let event = log.log_decode::<PoolInitialized>().ok()?;
        Some((PoolId(event.inner.data.poolId), WorkReason::PoolInitialized))
    } else {
        None
    }
}

/// Runs subscriptions until reconnects are exhausted.
pub async fn run_event_listener(ws_url: String, hook: Address, queue: WorkQueue, clock: Arc<dyn Clock>) {
    info!(hook = %hook, "event listener starting");
    let mut failures = 0u32;

    loop {
        match run_session(&ws_url, hook, &queue, clock.as_ref(), &mut failures).await {
            Ok(()) => {
                info!("event listener exited cleanly");
                return;
            }
            Err(e) => {
                failures += 1;
                if failures > MAX_RECONNECTS {
                    error!(
                        "event listener: {} reconnects exhausted, continuing on sweeps only: {:#}",
                        MAX_RECONNECTS, e
                    );
                    return;
                }
                warn!(
                    "event listener error (reconnect {}/{}): {:#}, retrying in {:?}",
                    failures, MAX_RECONNECTS, e, RECONNECT_DELAY
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// One WS session. Always ends in `Err` when the stream drops.
async fn run_session(
    ws_url: &str,
    hook: Address,
    queue: &WorkQueue,
    clock: &dyn Clock,
    failures: &mut u32,
) -> Result<()> {
    let provider = ProviderBuilder::new()
        .connect_ws(WsConnect::new(ws_url))
        .await
        .context("event listener WS connect failed")?;

    let subscription = provider
        .subscribe_logs(&hook_event_filter(hook))
        .await
        .context("hook log subscription failed")?;
    *failures = 0;
    info!("hook log subscription active");

    let mut stream = subscription.into_stream();
    while let Some(log) = stream.next().await {
        match decode_hook_log(&log) {
            Some((pool_id, reason)) => {
                let queued = queue.enqueue(pool_id, reason, clock.now_millis());
                debug!(pool = %pool_id, %reason, queued, block = ?log.block_number, "hook event");
            }
            None => debug!(tx = ?log.transaction_hash, "ignoring undecodable hook log"),
        }
    }

    Err(anyhow!("hook log subscription closed"))
}
