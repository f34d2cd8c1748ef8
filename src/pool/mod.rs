//! Pool state access for the keeper
//!
//! Reads the hook's view of each pool together with the pool manager's
//! slot0, and provides the integer price/tick helpers the decision engine
//! is built on.

pub mod calculator;
pub mod snapshot;

pub use calculator::{PriceCalculator, BPS, MAX_TICK, WAD};
pub use snapshot::SnapshotSource;
