use crate::common::types::{Randomness, Seed};
use crate::errors::OracleError;
use crate::randomness::{Durability, OraclePoll, RandomnessOracle, RequestHandle};
use async_trait::async_trait;
use dashmap::DashMap;
use schnorrkel::{context::SigningContext, ExpansionMode, Keypair, MiniSecretKey, PublicKey, Signature};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"fairround-randomness";

#[derive(Debug, Clone, Copy)]
struct RequestState {
    randomness: Option<Randomness>,
    durability: Durability,
}

/// In-process VRF oracle.
///
/// Fulfills a seed with a schnorrkel signature over it, so the 64 bytes of
/// randomness are verifiable against the oracle's public key. Durability is
/// simulated: `fulfill` can be called again with a higher level to mimic
/// additional confirmations.
pub struct LocalOracle {
    keypair: Arc<Keypair>,
    requests: DashMap<Seed, RequestState>,
    auto_fulfill: Option<Durability>,
    failures_pending: AtomicU32,
}

impl LocalOracle {
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
            requests: DashMap::new(),
            auto_fulfill: None,
            failures_pending: AtomicU32::new(0),
        }
    }

    /// Create an oracle with a random keypair (for testing)
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng))
    }

    pub fn from_seed_bytes(seed: &[u8; 32]) -> Result<Self, OracleError> {
        let mini = MiniSecretKey::from_bytes(seed).map_err(|e| OracleError::Rejected {
            seed: String::new(),
            reason: format!("invalid oracle key seed: {:?}", e),
        })?;
        Ok(Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519)))
    }

    /// Fulfill every request immediately at `durability`.
    pub fn with_auto_fulfill(mut self, durability: Durability) -> Self {
        self.auto_fulfill = Some(durability);
        self
    }

    /// Make the next `count` requests fail with a transport error.
    pub fn fail_next_requests(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public.to_bytes()
    }

    /// Reveal randomness for a requested seed, or raise the durability of an
    /// existing fulfillment. The revealed bytes never change once written.
    pub fn fulfill(&self, seed: &Seed, durability: Durability) -> Result<Randomness, OracleError> {
        let mut state = self.requests.get_mut(seed).ok_or_else(|| OracleError::Rejected {
            seed: hex::encode(seed),
            reason: "seed was never requested".to_string(),
        })?;

        let randomness = match state.randomness {
            Some(existing) => existing,
            None => {
                let revealed = self.sign_seed(seed);
                state.randomness = Some(revealed);
                revealed
            }
        };
        state.durability = state.durability.max(durability);

        tracing::debug!(seed = %hex::encode(seed), durability = ?state.durability, "Local oracle fulfilled seed");
        Ok(randomness)
    }

    fn sign_seed(&self, seed: &Seed) -> Randomness {
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let signature = self.keypair.sign(ctx.bytes(seed));
        Randomness::new(signature.to_bytes())
    }

    /// Public check that `randomness` is this oracle's signature over `seed`.
    pub fn verify(public_key: &[u8; 32], seed: &Seed, randomness: &Randomness) -> bool {
        let Ok(public_key) = PublicKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_bytes(randomness.as_ref()) else {
            return false;
        };
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        public_key.verify(ctx.bytes(seed), &signature).is_ok()
    }
}

#[async_trait]
impl RandomnessOracle for LocalOracle {
    async fn request(&self, seed: &Seed) -> Result<RequestHandle, OracleError> {
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(OracleError::Transport("simulated transport failure".to_string()));
        }

        let mut newly_accepted = false;
        self.requests.entry(*seed).or_insert_with(|| {
            newly_accepted = true;
            RequestState {
                randomness: None,
                durability: Durability::Processed,
            }
        });

        if let Some(level) = self.auto_fulfill {
            self.fulfill(seed, level)?;
        }

        Ok(RequestHandle {
            seed: *seed,
            newly_accepted,
        })
    }

    async fn poll(&self, seed: &Seed, durability: Durability) -> Result<OraclePoll, OracleError> {
        let state = self
            .requests
            .get(seed)
            .map(|s| *s)
            .ok_or_else(|| OracleError::Rejected {
                seed: hex::encode(seed),
                reason: "seed was never requested".to_string(),
            })?;

        match state.randomness {
            Some(randomness) if state.durability >= durability => Ok(OraclePoll::Fulfilled(randomness)),
            _ => Ok(OraclePoll::Pending),
        }
    }
}
