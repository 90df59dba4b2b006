//! Exact arithmetic used for probabilities, odds and payouts

pub mod fraction;

pub use fraction::{Fraction, FRACTION_WIRE_LEN};
