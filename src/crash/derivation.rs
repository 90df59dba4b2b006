//! Crash point derivation
//!
//! The outcome is derived from the operator's signature over the revealed
//! randomness, not from the randomness itself: nobody can compute the crash
//! point before the operator has signed, and anyone holding the operator's
//! public key can check the signature afterwards.
//!
//! `crash_point = (2^32 / (r + 1)) × win_rate`, where `r` is the first four
//! bytes (little-endian) of `SHA-256(signature)`. The result is not clamped
//! here; clamping to max-odd is a settlement-time decision.

use crate::errors::{FairroundError, FairroundResult};
use crate::math::Fraction;
use sha2::{Digest, Sha256};

pub const CRASH_SCALE: u64 = 1 << 32;

/// The 32-bit sample `r` taken from the signature digest.
pub fn sample(randomness_sig: &[u8]) -> u32 {
    let digest: [u8; 32] = Sha256::digest(randomness_sig).into();
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Crash point for a known sample. `r + 1` keeps the denominator non-zero
/// and caps the multiplier at `2^32 × win_rate`. The win rate is taken in
/// lowest terms, so any rate accepted by game validation derives without
/// overflow.
pub fn crash_point_from_sample(r: u32, win_rate: Fraction) -> FairroundResult<Fraction> {
    let scale = Fraction::new(CRASH_SCALE, u64::from(r) + 1)?;
    scale.try_mul(win_rate.reduced()).map_err(FairroundError::from)
}

pub fn crash_point(randomness_sig: &[u8], win_rate: Fraction) -> FairroundResult<Fraction> {
    crash_point_from_sample(sample(randomness_sig), win_rate)
}
