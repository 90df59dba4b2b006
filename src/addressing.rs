//! Deterministic entity addressing
//!
//! Every entity address is a SHA-256 digest over a domain tag followed by
//! fixed-width inputs, so any party can compute where a lock or bet lives
//! from public round metadata alone.

use crate::common::types::Address;
use sha2::{Digest, Sha256};

const GAME_DOMAIN: &[u8] = b"fairround:game";
const LOCK_DOMAIN: &[u8] = b"fairround:lock";
const BET_DOMAIN: &[u8] = b"fairround:bet";
const POOL_DOMAIN: &[u8] = b"fairround:pool";

fn derive(domain: &[u8], parts: &[&[u8]]) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    Address::new(hasher.finalize().into())
}

/// Game identity from its owner and an owner-chosen 8-byte game index.
pub fn game_address(owner: &Address, game_index: u64) -> Address {
    derive(GAME_DOMAIN, &[owner.as_ref(), &game_index.to_le_bytes()])
}

/// Lock identity for one round of a game.
pub fn lock_address(game: &Address, round: u64) -> Address {
    derive(LOCK_DOMAIN, &[game.as_ref(), &round.to_le_bytes()])
}

/// Bet identity for one player within one round.
pub fn bet_address(lock: &Address, player: &Address) -> Address {
    derive(BET_DOMAIN, &[lock.as_ref(), player.as_ref()])
}

/// Token account holding a game's stakes and liquidity.
pub fn pool_address(game: &Address) -> Address {
    derive(POOL_DOMAIN, &[game.as_ref()])
}
