//! One-shot evaluation for serverless hosts.
//!
//! Evaluates a single pool once, with no history carried between calls, and
//! renders the result in the two shapes automation networks expect:
//! a Gelato-style `{canExec, callData, message}` executor payload, or a
//! Chainlink-Functions-style `{newLower, newUpper, volatilityBps}` answer.
//!
//! Without history the volatility estimate is always the insufficient-data
//! bucket and the slippage gate never fires.

use crate::contracts::ISentinelHook;
use crate::error::ChainError;
use crate::oracle::{FeedSource, OracleReader};
use crate::pool::SnapshotSource;
use crate::rebalance::{conclude, screen, DecisionLimits, PoolHistory};
use crate::types::{Decision, PoolEntry, RebalancePlan, SkipReason};
use alloy::primitives::aliases::I24;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Reads, screens, prices and concludes one pool.
pub async fn evaluate_once<C>(
    chain: Arc<C>,
    entry: &PoolEntry,
    limits: &DecisionLimits,
) -> Result<Decision, ChainError>
where
    C: SnapshotSource + FeedSource + 'static,
{
    let snapshot = chain.read_snapshot(entry.identity.id).await?;
    let screened = match screen(&snapshot, &PoolHistory::empty(), &entry.config, limits) {
        Ok(screened) => screened,
        Err(reason) => return Ok(Decision::Skip(reason)),
    };

    let oracle = OracleReader::new(chain);
    let price = oracle
        .read_reference_price(
            snapshot.price_feed,
            entry.config.quote_feed,
            snapshot.price_feed_inverted,
        )
        .await;
    if let Err(e) = &price {
        warn!(pool = %entry.identity.label, error = %e, "oracle read failed");
    }
    Ok(conclude(&screened, price.ok()))
}

/// ABI-encoded `maintain(poolId, newLower, newUpper, volatility)` for `plan`.
pub fn encode_maintain(entry: &PoolEntry, plan: &RebalancePlan) -> Result<Bytes, ChainError> {
    let tick = |v: i32| {
        I24::try_from(v).map_err(|e| ChainError::Conversion(format!("tick {}: {}", v, e)))
    };
    let call = ISentinelHook::maintainCall {
        poolId: entry.identity.id.as_b256(),
        newLower: tick(plan.new_lower)?,
        newUpper: tick(plan.new_upper)?,
        volatility: U256::from(plan.volatility_bps),
    };
    Ok(Bytes::from(call.abi_encode()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallData {
    pub to: Address,
    pub data: Bytes,
}

/// Gelato Web3 Function result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorPayload {
    pub can_exec: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_data: Option<Vec<CallData>>,
    pub message: String,
}

impl ExecutorPayload {
    fn no_exec(message: String) -> Self {
        Self {
            can_exec: false,
            call_data: None,
            message,
        }
    }

    /// Builds the payload for an evaluation result. With `simulate` set a
    /// rebalance is reported but never marked executable.
    pub fn from_evaluation(
        hook: Address,
        entry: &PoolEntry,
        evaluation: &Result<Decision, ChainError>,
        simulate: bool,
    ) -> Self {
        let label = &entry.identity.label;
        let plan = match evaluation {
            Err(e) => return Self::no_exec(format!("Failed to get pool state: {}", e)),
            Ok(Decision::Skip(reason)) => return Self::no_exec(format!("{}: {}", label, reason)),
            Ok(Decision::Rebalance(plan)) => plan,
        };

        let range = format!("[{}, {}]", plan.new_lower, plan.new_upper);
        if simulate {
            return Self::no_exec(format!("Simulation: {} would rebalance to {}", label, range));
        }
        match encode_maintain(entry, plan) {
            Ok(data) => Self {
                can_exec: true,
                call_data: Some(vec![CallData { to: hook, data }]),
                message: format!("Rebalancing {} ({}): new range {}", label, plan.trigger, range),
            },
            Err(e) => Self::no_exec(format!("{}: {}", label, e)),
        }
    }
}

/// Chainlink Functions result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RangeAnswer {
    #[serde(rename_all = "camelCase")]
    Range {
        new_lower: i32,
        new_upper: i32,
        volatility_bps: u32,
    },
    #[serde(rename_all = "camelCase")]
    Skip { skip_reason: SkipReason },
    Error { error: String },
}

impl RangeAnswer {
    pub fn from_evaluation(evaluation: &Result<Decision, ChainError>) -> Self {
        match evaluation {
            Ok(Decision::Rebalance(plan)) => RangeAnswer::Range {
                new_lower: plan.new_lower,
                new_upper: plan.new_upper,
                volatility_bps: plan.volatility_bps,
            },
            Ok(Decision::Skip(reason)) => RangeAnswer::Skip {
                skip_reason: *reason,
            },
            Err(e) => RangeAnswer::Error {
                error: e.to_string(),
            },
        }
    }
}
