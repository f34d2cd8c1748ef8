//! Reference Price Oracle
//!
//! Reads Chainlink-style aggregators, rejects stale or non-positive rounds,
//! and normalizes answers to 18-decimal fixed point so deviation checks are
//! independent of each feed's own precision.
//!
//! Rules:
//!     - `updatedAt == 0` or `answeredInRound < roundId` → `Stale`
//!     - `answer <= 0` → `Invalid`
//!     - fewer than 18 feed decimals: multiply; more: truncating divide
//!     - inverted feeds return `1e36 / price`
//!
//! A pool may also name a quote feed; its reference price is then
//! `base * 1e18 / quote`, computed before any inversion.

pub mod chainlink;

use crate::error::OracleError;
use alloy::primitives::{Address, I256, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// 1e18 as U256.
fn wad() -> U256 {
    U256::from(crate::pool::WAD)
}

/// Raw `latestRoundData()` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundData {
    pub round_id: U256,
    pub answer: I256,
    pub started_at: U256,
    pub updated_at: U256,
    pub answered_in_round: U256,
}

/// Raw aggregator access.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn latest_round_data(&self, feed: Address) -> Result<RoundData, OracleError>;
    async fn feed_decimals(&self, feed: Address) -> Result<u8, OracleError>;
}

/// Validates and normalizes feed answers.
pub struct OracleReader<F> {
    source: Arc<F>,
    /// Feed decimals never change; cache them per feed address
    decimals_cache: DashMap<Address, u8>,
}

impl<F: FeedSource> OracleReader<F> {
    pub fn new(source: Arc<F>) -> Self {
        Self {
            source,
            decimals_cache: DashMap::new(),
        }
    }

    /// Latest price of `feed` in 18 decimals, inverted when asked.
    pub async fn read_price(&self, feed: Address, inverted: bool) -> Result<U256, OracleError> {
        let price = self.read_normalized(feed).await?;
        if inverted {
            invert_price(price)
        } else {
            Ok(price)
        }
    }

    /// Reference price for a pool: `feed`, or `feed / quote` when a quote
    /// feed is configured, then inverted when asked.
    pub async fn read_reference_price(
        &self,
        feed: Address,
        quote: Option<Address>,
        inverted: bool,
    ) -> Result<U256, OracleError> {
        let Some(quote) = quote else {
            return self.read_price(feed, inverted).await;
        };
        let base_price = self.read_normalized(feed).await?;
        let quote_price = self.read_normalized(quote).await?;
        let ratio = ratio_price(base_price, quote_price)?;
        if inverted {
            invert_price(ratio)
        } else {
            Ok(ratio)
        }
    }

    async fn read_normalized(&self, feed: Address) -> Result<U256, OracleError> {
        if feed == Address::ZERO {
            return Err(OracleError::Invalid("no price feed".to_string()));
        }
        let round = self.source.latest_round_data(feed).await?;
        let answer = validate_round(&round)?;
        let decimals = self.decimals(feed).await?;
        let price = normalize_to_wad(answer, decimals)?;
        debug!(feed = %feed, decimals, round = %round.round_id, price = %price, "oracle price");
        Ok(price)
    }

    async fn decimals(&self, feed: Address) -> Result<u8, OracleError> {
        if let Some(decimals) = self.decimals_cache.get(&feed) {
            return Ok(*decimals);
        }
        let decimals = self.source.feed_decimals(feed).await?;
        self.decimals_cache.insert(feed, decimals);
        Ok(decimals)
    }
}

/// Returns the positive answer of a finalized, fresh round.
pub fn validate_round(round: &RoundData) -> Result<U256, OracleError> {
    if round.updated_at.is_zero() || round.answered_in_round < round.round_id {
        return Err(OracleError::Stale {
            round_id: round.round_id,
            answered_in_round: round.answered_in_round,
            updated_at: round.updated_at,
        });
    }
    if round.answer <= I256::ZERO {
        return Err(OracleError::Invalid(round.answer.to_string()));
    }
    Ok(round.answer.into_raw())
}

/// Scales a raw answer with `decimals` places to 18 decimals.
pub fn normalize_to_wad(answer: U256, decimals: u8) -> Result<U256, OracleError> {
    let ten = U256::from(10u64);
    let price = match decimals.cmp(&18) {
        std::cmp::Ordering::Equal => answer,
        std::cmp::Ordering::Less => {
            let factor = ten.pow(U256::from(18 - decimals));
            answer
                .checked_mul(factor)
                .ok_or_else(|| OracleError::Invalid(format!("{} overflows at {} decimals", answer, decimals)))?
        }
        std::cmp::Ordering::Greater => match ten.checked_pow(U256::from(decimals - 18)) {
            Some(divisor) => answer / divisor,
            None => U256::ZERO,
        },
    };
    if price.is_zero() {
        return Err(OracleError::Invalid(format!(
            "{} truncates to zero at {} decimals",
            answer, decimals
        )));
    }
    Ok(price)
}

/// `1e36 / price`.
pub fn invert_price(price: U256) -> Result<U256, OracleError> {
    if price.is_zero() {
        return Err(OracleError::Inverted);
    }
    Ok(wad() * wad() / price)
}

/// `base * 1e18 / quote`.
pub fn ratio_price(base: U256, quote: U256) -> Result<U256, OracleError> {
    if quote.is_zero() {
        return Err(OracleError::Invalid("zero quote price".to_string()));
    }
    let scaled = base
        .checked_mul(wad())
        .ok_or_else(|| OracleError::Invalid(format!("{} overflows when scaled", base)))?;
    Ok(scaled / quote)
}
