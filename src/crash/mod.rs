//! Crash outcome: deterministic crash point derivation and per-bet payout policy

pub mod derivation;
pub mod resolution;

pub use derivation::{crash_point, crash_point_from_sample, sample, CRASH_SCALE};
pub use resolution::{resolve, BetOutcome, CashOut, Resolution};
