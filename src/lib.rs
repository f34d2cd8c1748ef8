//! Sentinel Range Keeper Library
//!
//! Watches hook-managed liquidity pools and re-centers their active tick
//! range when price leaves it or drifts close to an edge. Shared by the
//! long-running keeper and the one-shot `rebalance-check` binary.

pub mod client;
pub mod clock;
pub mod config;
pub mod contracts;
pub mod error;
pub mod listener;
pub mod oneshot;
pub mod oracle;
pub mod pool;
pub mod rebalance;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use client::SentinelClient;
pub use config::AgentConfig;
pub use error::{ChainError, OracleError};
pub use rebalance::{CycleReport, ExecutionCoordinator, WorkQueue};
pub use types::{Decision, PoolConfig, PoolEntry, PoolId, PoolSnapshot, RebalancePlan, SkipReason};
