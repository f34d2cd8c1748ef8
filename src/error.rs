//! Per-call error types.
//!
//! Startup and binaries use `anyhow`; anything that can fail inside a cycle
//! returns one of these so the coordinator can log it against the pool and
//! move on.

use alloy::primitives::{B256, U256};
use std::fmt::Display;
use std::future::IntoFuture;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the hook or the pool manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("rpc failure: {0}")]
    Rpc(String),
    #[error("rpc call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transaction {0} reverted")]
    Reverted(B256),
    #[error("value does not fit: {0}")]
    Conversion(String),
}

/// Failure producing a usable reference price.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("stale round (round {round_id}, answered in {answered_in_round}, updated at {updated_at})")]
    Stale {
        round_id: U256,
        answered_in_round: U256,
        updated_at: U256,
    },
    #[error("invalid price: {0}")]
    Invalid(String),
    #[error("cannot invert a zero price")]
    Inverted,
    #[error("feed rpc failure: {0}")]
    Rpc(String),
    #[error("feed call timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ChainError> for OracleError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Timeout(limit) => OracleError::Timeout(limit),
            other => OracleError::Rpc(other.to_string()),
        }
    }
}

/// Runs one RPC future under `limit`, folding the transport error into
/// `ChainError::Rpc` and the elapsed deadline into `ChainError::Timeout`.
pub async fn with_timeout<F, T, E>(limit: Duration, call: F) -> Result<T, ChainError>
where
    F: IntoFuture<Output = Result<T, E>>,
    E: Display,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ChainError::Rpc(e.to_string())),
        Err(_) => Err(ChainError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_value_through() {
        let value = with_timeout(Duration::from_millis(50), async { Ok::<_, String>(7u8) }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn test_with_timeout_maps_transport_error() {
        let err = with_timeout(Duration::from_millis(50), async {
            Err::<u8, _>("connection reset")
        })
        .await
        .unwrap_err();
        assert_eq!(err, ChainError::Rpc("connection reset".to_string()));
    }

    #[tokio::test]
    async fn test_with_timeout_fires() {
        let err = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<u8, String>(1)
        })
        .await
        .unwrap_err();
        assert_eq!(err, ChainError::Timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_chain_timeout_becomes_oracle_timeout() {
        let err: OracleError = ChainError::Timeout(Duration::from_secs(1)).into();
        assert_eq!(err, OracleError::Timeout(Duration::from_secs(1)));
    }
}
