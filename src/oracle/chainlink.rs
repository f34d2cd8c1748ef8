//! Chainlink aggregator reads over alloy.

use super::{FeedSource, RoundData};
use crate::client::SentinelClient;
use crate::contracts::AggregatorV3Interface;
use crate::error::OracleError;
use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use async_trait::async_trait;
use std::future::IntoFuture;

#[async_trait]
impl<P> FeedSource for SentinelClient<P>
where
    P: Provider + Clone + 'static,
{
    async fn latest_round_data(&self, feed: Address) -> Result<RoundData, OracleError> {
        let aggregator = AggregatorV3Interface::new(feed, self.provider().clone());
        let call = aggregator.latestRoundData();
        let round = self.timed(call.call().into_future()).await?;

        Ok(RoundData {
            round_id: U256::from(round.roundId),
            answer: round.answer,
            started_at: round.startedAt,
            updated_at: round.updatedAt,
            answered_in_round: U256::from(round.answeredInRound),
        })
    }

    async fn feed_decimals(&self, feed: Address) -> Result<u8, OracleError> {
        let aggregator = AggregatorV3Interface::new(feed, self.provider().clone());
        let call = aggregator.decimals();
        Ok(self.timed(call.call().into_future()).await?)
    }
}
