//! fairround - provably-fair crash round settlement
//!
//! An operator commits to a per-round randomness seed before the outcome is
//! known, an oracle reveals the randomness, and every payout is checked
//! against two operator attestations before any tokens move.
//!
//! Layering, leaf first: [`math::Fraction`] → [`addressing`] →
//! [`randomness`] → [`crash`] → [`attestation`] → [`round::CrashEngine`].

pub mod addressing;
pub mod attestation;
pub mod common;
pub mod crash;
pub mod errors;
pub mod ledger;
pub mod logging;
pub mod math;
pub mod metrics;
pub mod randomness;
pub mod round;
pub mod transfer;
pub mod vault;

pub use attestation::{authorize_settlement, BetMessage, OperatorSigner, SettlementProof};
pub use common::config::{ConfigLoader, FairroundConfig};
pub use common::types::{Address, Randomness, SignatureBytes};
pub use crash::{crash_point, resolve, BetOutcome, CashOut};
pub use errors::{FairroundError, FairroundResult};
pub use ledger::{Ledger, MemoryLedger, RocksLedger};
pub use math::Fraction;
pub use randomness::{Durability, LocalOracle, RandomnessCommitment, RandomnessOracle};
pub use round::{CrashEngine, GameParams, RoundPhase, SettlementReceipt};
pub use transfer::{MemoryBank, TokenTransfer};
