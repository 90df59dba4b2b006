//! Settlement authorization
//!
//! A payout needs two ed25519 attestations from the game's operator key:
//! one over the raw randomness revealed for the round, and one over the
//! canonical bet message binding a bet address to the round's crash point.
//! Anyone holding both signatures may submit a settlement; they can relay
//! the operator's outcome but never forge one.
//!
//! Bet message layout (48 bytes, fixed width):
//!
//! ```text
//! bet address (32) | crash point numerator (8, LE) | crash point denominator (8, LE)
//! ```

use crate::common::types::{Address, Randomness, SignatureBytes};
use crate::crash;
use crate::errors::{
    AttestationKind, AuthorizationError, FairroundResult, IntegrityError, SequencingError,
};
use crate::math::{Fraction, FRACTION_WIRE_LEN};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use serde::{Deserialize, Serialize};

pub const BET_MESSAGE_LEN: usize = 32 + FRACTION_WIRE_LEN;

/// Canonical message the operator signs for each bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetMessage {
    pub bet: Address,
    pub crash_point: Fraction,
}

impl BetMessage {
    pub fn new(bet: Address, crash_point: Fraction) -> Self {
        Self { bet, crash_point }
    }

    pub fn encode(&self) -> [u8; BET_MESSAGE_LEN] {
        let mut out = [0u8; BET_MESSAGE_LEN];
        out[..32].copy_from_slice(self.bet.as_ref());
        self.crash_point.pack_into(&mut out[32..]);
        out
    }

    pub fn decode(bytes: &[u8]) -> FairroundResult<Self> {
        if bytes.len() != BET_MESSAGE_LEN {
            return Err(IntegrityError::MalformedField {
                field: "bet message",
                expected: BET_MESSAGE_LEN,
                actual: bytes.len(),
            }
            .into());
        }
        Ok(Self {
            bet: Address::from_slice(&bytes[..32])?,
            crash_point: Fraction::from_bytes(&bytes[32..])?,
        })
    }
}

/// `verify(publicKey, message, signature) → bool` with strict ed25519 rules.
pub fn verify(public_key: &Address, message: &[u8], signature: &SignatureBytes) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let signature = Signature::from_bytes(signature.as_bytes());
    key.verify_strict(message, &signature).is_ok()
}

/// Both operator attestations needed to settle one bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementProof {
    pub randomness: Randomness,
    pub randomness_signature: SignatureBytes,
    pub crash_point: Fraction,
    pub bet_signature: SignatureBytes,
}

/// What the round's stored state says, as seen by the authorizer.
pub struct RoundView<'a> {
    pub game: Address,
    pub round: u64,
    pub operator: Address,
    pub win_rate: Fraction,
    pub stored_randomness: Option<&'a Randomness>,
}

/// Checks a settlement proof for `bet` and returns the canonical crash point.
///
/// Fails fast with `RoundNotFulfilled` before randomness exists, with
/// `StaleRandomness` when the proof carries other bytes than the stored
/// ones, and with `InvalidAttestation` when either signature fails or the
/// attested crash point differs from the derived one.
pub fn authorize_settlement(
    view: &RoundView<'_>,
    bet: &Address,
    proof: &SettlementProof,
) -> FairroundResult<Fraction> {
    let stored = view.stored_randomness.ok_or(SequencingError::RoundNotFulfilled {
        game: view.game,
        round: view.round,
    })?;

    if *stored != proof.randomness {
        return Err(IntegrityError::StaleRandomness {
            game: view.game,
            round: view.round,
        }
        .into());
    }

    let invalid = |kind| AuthorizationError::InvalidAttestation {
        kind,
        game: view.game,
        round: view.round,
    };

    if !verify(&view.operator, stored.as_ref(), &proof.randomness_signature) {
        return Err(invalid(AttestationKind::Randomness).into());
    }

    let message = BetMessage::new(*bet, proof.crash_point).encode();
    if !verify(&view.operator, &message, &proof.bet_signature) {
        return Err(invalid(AttestationKind::Bet).into());
    }

    let derived = crash::crash_point(proof.randomness_signature.as_ref(), view.win_rate)?;
    if derived != proof.crash_point {
        tracing::warn!(
            game = %view.game,
            round = view.round,
            bet = %bet,
            attested = %proof.crash_point,
            derived = %derived,
            "Attested crash point disagrees with derivation"
        );
        return Err(invalid(AttestationKind::Bet).into());
    }

    Ok(derived)
}

/// Operator key that produces attestations.
pub struct OperatorSigner {
    key: SigningKey,
}

impl OperatorSigner {
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    pub fn from_secret_hex(secret: &str) -> FairroundResult<Self> {
        let malformed = |actual| IntegrityError::MalformedField {
            field: "secret key",
            expected: SECRET_KEY_LENGTH,
            actual,
        };
        let bytes = hex::decode(secret.trim_start_matches("0x")).map_err(|_| malformed(secret.len() / 2))?;
        let key: [u8; SECRET_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| malformed(bytes.len()))?;
        Ok(Self::from_secret_bytes(&key))
    }

    /// Random key (for testing and local simulation)
    pub fn generate() -> Self {
        use rand_core::OsRng;
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Operator identity: the 32-byte ed25519 public key.
    pub fn identity(&self) -> Address {
        Address::new(self.key.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.key.sign(message).to_bytes())
    }

    pub fn attest_randomness(&self, randomness: &Randomness) -> SignatureBytes {
        self.sign(randomness.as_ref())
    }

    pub fn attest_bet(&self, bet: &Address, crash_point: Fraction) -> SignatureBytes {
        self.sign(&BetMessage::new(*bet, crash_point).encode())
    }

    /// Builds the full proof for one bet: signs the randomness, derives the
    /// crash point from that signature and signs the bet message.
    pub fn settlement_proof(
        &self,
        randomness: &Randomness,
        bet: &Address,
        win_rate: Fraction,
    ) -> FairroundResult<SettlementProof> {
        let randomness_signature = self.attest_randomness(randomness);
        let crash_point = crash::crash_point(randomness_signature.as_ref(), win_rate)?;
        Ok(SettlementProof {
            randomness: *randomness,
            randomness_signature,
            crash_point,
            bet_signature: self.attest_bet(bet, crash_point),
        })
    }
}
