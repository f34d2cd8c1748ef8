//! Rebalance policy and execution
//!
//! - `decision`: pure go/no-go/what-range judgement for one pool
//! - `history` / `limiter`: per-pool observations and rate limiting
//! - `queue`: event-fed work queue
//! - `executor`: the `maintain()` chain write
//! - `coordinator`: the single-flight cycle that ties them together

pub mod coordinator;
pub mod decision;
pub mod executor;
pub mod history;
pub mod limiter;
pub mod queue;

pub use coordinator::{
    CoordinatorSettings, CycleReport, CycleSummary, ExecutionCoordinator, PoolOutcome, PoolResult,
};
pub use decision::{conclude, decide, screen, DecisionLimits, Screened};
pub use executor::MaintainSubmitter;
pub use history::{HistoryStore, PoolHistory};
pub use limiter::RateLimiter;
pub use queue::WorkQueue;
