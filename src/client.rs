//! Alloy-backed chain adapter.
//!
//! One provider, two contract addresses, one timeout. The seams the engine
//! depends on (`SnapshotSource`, `FeedSource`, `MaintainSubmitter`) are
//! implemented for this type next to the code that uses them.

use crate::error::{with_timeout, ChainError};
use alloy::primitives::Address;
use alloy::providers::Provider;
use std::fmt::Display;
use std::future::IntoFuture;
use std::time::Duration;

/// Talks to the Sentinel hook, the pool manager and price feeds.
#[derive(Debug, Clone)]
pub struct SentinelClient<P> {
    provider: P,
    hook: Address,
    pool_manager: Address,
    rpc_timeout: Duration,
}

impl<P: Provider + Clone + 'static> SentinelClient<P> {
    pub fn new(provider: P, hook: Address, pool_manager: Address, rpc_timeout: Duration) -> Self {
        Self {
            provider,
            hook,
            pool_manager,
            rpc_timeout,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn hook_address(&self) -> Address {
        self.hook
    }

    pub fn pool_manager_address(&self) -> Address {
        self.pool_manager
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Bounds one RPC future by the configured timeout.
    pub(crate) async fn timed<F, T, E>(&self, call: F) -> Result<T, ChainError>
    where
        F: IntoFuture<Output = Result<T, E>>,
        E: Display,
    {
        with_timeout(self.rpc_timeout, call).await
    }
}
