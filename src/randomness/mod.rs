//! Randomness commitment: per-round seeds and the oracle handshake
//!
//! A round's seed is `SHA-256(lock address ‖ last randomness)`. Binding the
//! lock address stops a fulfillment from being replayed into another round;
//! chaining the previous round's randomness stops an old fulfillment from
//! being reused to bias a future one.
//!
//! Waiting on the oracle is a single suspend point with a bounded wait. A
//! cancelled or timed-out wait leaves nothing registered, so the round stays
//! Locked and the same seed can simply be polled again.

pub mod local;

use crate::common::config::OracleConfig;
use crate::common::types::{Address, Randomness, Seed};
use crate::errors::{FairroundResult, OracleError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

pub use local::LocalOracle;

/// Confirmation level a fulfillment must reach before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    Processed,
    Confirmed,
    Finalized,
}

impl std::str::FromStr for Durability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Durability::Processed),
            "confirmed" => Ok(Durability::Confirmed),
            "finalized" => Ok(Durability::Finalized),
            other => Err(format!("unknown durability level '{}'", other)),
        }
    }
}

/// Acknowledgement that the oracle holds a request for `seed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHandle {
    pub seed: Seed,
    /// False when the oracle already knew this seed.
    pub newly_accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OraclePoll {
    Pending,
    Fulfilled(Randomness),
}

/// External verifiable-randomness oracle.
///
/// Requests are keyed by seed: submitting the same seed twice must not
/// create a second request.
#[async_trait]
pub trait RandomnessOracle: Send + Sync {
    async fn request(&self, seed: &Seed) -> Result<RequestHandle, OracleError>;

    async fn poll(&self, seed: &Seed, durability: Durability) -> Result<OraclePoll, OracleError>;
}

pub fn derive_seed(lock: &Address, last_randomness: &Randomness) -> Seed {
    let mut hasher = Sha256::new();
    hasher.update(lock.as_ref());
    hasher.update(last_randomness.as_ref());
    hasher.finalize().into()
}

/// Drives the request/await handshake against an oracle.
pub struct RandomnessCommitment<O: RandomnessOracle + ?Sized> {
    oracle: Arc<O>,
    config: OracleConfig,
}

impl<O: RandomnessOracle + ?Sized> RandomnessCommitment<O> {
    pub fn new(oracle: Arc<O>, config: OracleConfig) -> Self {
        Self { oracle, config }
    }

    pub fn oracle(&self) -> &Arc<O> {
        &self.oracle
    }

    pub fn default_durability(&self) -> Durability {
        self.config.durability
    }

    /// Submits `seed`, retrying only transport failures. Once the oracle has
    /// accepted the request it is never re-submitted.
    pub async fn request_randomness(&self, seed: &Seed) -> FairroundResult<RequestHandle> {
        let mut attempt = 0u32;
        loop {
            match self.oracle.request(seed).await {
                Ok(handle) => {
                    tracing::info!(
                        seed = %hex::encode(seed),
                        newly_accepted = handle.newly_accepted,
                        "Randomness requested"
                    );
                    return Ok(handle);
                }
                Err(OracleError::Transport(reason)) if attempt < self.config.request_retries => {
                    attempt += 1;
                    tracing::warn!(
                        seed = %hex::encode(seed),
                        attempt,
                        "Randomness request transport failure, retrying: {}",
                        reason
                    );
                    tokio::time::sleep(self.poll_interval()).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Suspends until the oracle reports `seed` fulfilled at `durability`,
    /// or fails with `RandomnessTimeout` after the configured timeout.
    pub async fn await_fulfillment(
        &self,
        seed: &Seed,
        durability: Durability,
    ) -> FairroundResult<Randomness> {
        let timeout = self.timeout();
        let interval = self.poll_interval();

        let wait = async {
            loop {
                match self.oracle.poll(seed, durability).await {
                    Ok(OraclePoll::Fulfilled(randomness)) => return Ok(randomness),
                    Ok(OraclePoll::Pending) => {
                        tracing::debug!(seed = %hex::encode(seed), ?durability, "Randomness pending");
                    }
                    Err(OracleError::Transport(reason)) => {
                        tracing::debug!(seed = %hex::encode(seed), "Oracle poll failed: {}", reason);
                    }
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(interval).await;
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                tracing::warn!(
                    seed = %hex::encode(seed),
                    timeout_ms = timeout.as_millis() as u64,
                    "Randomness not fulfilled in time; round needs operator attention"
                );
                Err(OracleError::RandomnessTimeout {
                    seed: hex::encode(seed),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FairroundError;

    fn fast_config() -> OracleConfig {
        OracleConfig {
            timeout_ms: 200,
            poll_interval_ms: 5,
            request_retries: 2,
            durability: Durability::Confirmed,
        }
    }

    #[test]
    fn test_seed_binds_lock_and_previous_randomness() {
        let lock_a = Address::new([1u8; 32]);
        let lock_b = Address::new([2u8; 32]);
        let prev = Randomness::new([7u8; 64]);

        assert_eq!(derive_seed(&lock_a, &prev), derive_seed(&lock_a, &prev));
        assert_ne!(derive_seed(&lock_a, &prev), derive_seed(&lock_b, &prev));
        assert_ne!(
            derive_seed(&lock_a, &prev),
            derive_seed(&lock_a, &Randomness::new([8u8; 64]))
        );
    }

    #[test]
    fn test_durability_ordering_and_parsing() {
        assert!(Durability::Processed < Durability::Confirmed);
        assert!(Durability::Confirmed < Durability::Finalized);
        assert_eq!("Finalized".parse::<Durability>().unwrap(), Durability::Finalized);
        assert!("eventually".parse::<Durability>().is_err());
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried_with_same_seed() {
        let oracle = Arc::new(LocalOracle::from_seed_bytes(&[5u8; 32]).unwrap());
        oracle.fail_next_requests(2);
        let commitment = RandomnessCommitment::new(oracle.clone(), fast_config());

        let seed = [3u8; 32];
        let handle = commitment.request_randomness(&seed).await.unwrap();
        assert!(handle.newly_accepted);
        assert_eq!(oracle.request_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let oracle = Arc::new(LocalOracle::from_seed_bytes(&[5u8; 32]).unwrap());
        oracle.fail_next_requests(10);
        let commitment = RandomnessCommitment::new(oracle.clone(), fast_config());

        let err = commitment.request_randomness(&[3u8; 32]).await.unwrap_err();
        assert!(matches!(err, FairroundError::Oracle(OracleError::Transport(_))));
        assert_eq!(oracle.request_count(), 0);
    }

    #[tokio::test]
    async fn test_await_times_out_when_never_fulfilled() {
        let oracle = Arc::new(LocalOracle::from_seed_bytes(&[5u8; 32]).unwrap());
        let commitment = RandomnessCommitment::new(oracle, fast_config());
        let seed = [9u8; 32];
        commitment.request_randomness(&seed).await.unwrap();

        let err = commitment
            .await_fulfillment(&seed, Durability::Confirmed)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, FairroundError::Oracle(OracleError::RandomnessTimeout { .. })));
    }

    #[tokio::test]
    async fn test_await_returns_once_durability_reached() {
        let oracle = Arc::new(LocalOracle::from_seed_bytes(&[5u8; 32]).unwrap());
        let commitment = RandomnessCommitment::new(oracle.clone(), fast_config());
        let seed = [4u8; 32];
        commitment.request_randomness(&seed).await.unwrap();

        let background = oracle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            background.fulfill(&seed, Durability::Processed).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            background.fulfill(&seed, Durability::Finalized).unwrap();
        });

        let randomness = commitment
            .await_fulfillment(&seed, Durability::Confirmed)
            .await
            .unwrap();
        assert!(LocalOracle::verify(&oracle.public_key(), &seed, &randomness));
    }
}
