use crate::errors::{ArithmeticError, ConfigurationError, FairroundResult, IntegrityError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Wire width: numerator (8 bytes LE) followed by denominator (8 bytes LE).
pub const FRACTION_WIRE_LEN: usize = 16;

/// Exact non-negative rational number.
///
/// Not reduced to lowest terms: `2/4` and `1/2` are distinct values on the
/// wire but compare equal. Comparison cross-multiplies in `u128`, so it can
/// never overflow.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawFraction", into = "RawFraction")]
pub struct Fraction {
    numerator: u64,
    denominator: u64,
}

#[derive(Serialize, Deserialize)]
struct RawFraction {
    numerator: u64,
    denominator: u64,
}

impl TryFrom<RawFraction> for Fraction {
    type Error = ConfigurationError;

    fn try_from(raw: RawFraction) -> Result<Self, Self::Error> {
        Fraction::new(raw.numerator, raw.denominator)
    }
}

impl From<Fraction> for RawFraction {
    fn from(f: Fraction) -> Self {
        RawFraction {
            numerator: f.numerator,
            denominator: f.denominator,
        }
    }
}

impl Fraction {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self, ConfigurationError> {
        if denominator == 0 {
            return Err(ConfigurationError::InvalidFraction {
                numerator,
                denominator,
            });
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    pub const fn zero() -> Self {
        Self {
            numerator: 0,
            denominator: 1,
        }
    }

    pub const fn one() -> Self {
        Self {
            numerator: 1,
            denominator: 1,
        }
    }

    pub const fn from_integer(value: u64) -> Self {
        Self {
            numerator: value,
            denominator: 1,
        }
    }

    pub fn numerator(&self) -> u64 {
        self.numerator
    }

    pub fn denominator(&self) -> u64 {
        self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// Exact product. Fails instead of wrapping when either component
    /// leaves the `u64` range.
    pub fn try_mul(self, other: Self) -> Result<Self, ArithmeticError> {
        let numerator = self.numerator.checked_mul(other.numerator);
        let denominator = self.denominator.checked_mul(other.denominator);
        match (numerator, denominator) {
            (Some(numerator), Some(denominator)) => Ok(Self {
                numerator,
                denominator,
            }),
            _ => Err(ArithmeticError::FractionOverflow {
                left: self.to_string(),
                right: other.to_string(),
            }),
        }
    }

    /// `floor(amount × self)`. The remainder is truncated so a payout is
    /// never rounded up.
    pub fn mul_u64(self, amount: u64) -> Result<u64, ArithmeticError> {
        let scaled = self.numerator as u128 * amount as u128 / self.denominator as u128;
        u64::try_from(scaled).map_err(|_| {
            ArithmeticError::AmountOverflow(format!("{} × {} exceeds u64", amount, self))
        })
    }

    /// Same value in lowest terms.
    pub fn reduced(self) -> Self {
        let divisor = gcd(self.numerator, self.denominator);
        Self {
            numerator: self.numerator / divisor,
            denominator: self.denominator / divisor,
        }
    }

    pub fn min(self, other: Self) -> Self {
        if other < self {
            other
        } else {
            self
        }
    }

    pub fn to_bytes(self) -> [u8; FRACTION_WIRE_LEN] {
        let mut out = [0u8; FRACTION_WIRE_LEN];
        self.pack_into(&mut out);
        out
    }

    /// Writes the 16-byte wire form into the head of `dst`.
    pub fn pack_into(self, dst: &mut [u8]) {
        dst[0..8].copy_from_slice(&self.numerator.to_le_bytes());
        dst[8..16].copy_from_slice(&self.denominator.to_le_bytes());
    }

    pub fn from_bytes(bytes: &[u8]) -> FairroundResult<Self> {
        if bytes.len() != FRACTION_WIRE_LEN {
            return Err(IntegrityError::MalformedField {
                field: "fraction",
                expected: FRACTION_WIRE_LEN,
                actual: bytes.len(),
            }
            .into());
        }
        let mut num = [0u8; 8];
        let mut den = [0u8; 8];
        num.copy_from_slice(&bytes[0..8]);
        den.copy_from_slice(&bytes[8..16]);
        Ok(Self::new(u64::from_le_bytes(num), u64::from_le_bytes(den))?)
    }

    /// Parses `"n/d"` or a bare integer.
    pub fn parse(s: &str) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidValue {
            field: "fraction".to_string(),
            value: s.to_string(),
            reason: "expected <numerator>/<denominator>".to_string(),
        };
        match s.split_once('/') {
            Some((n, d)) => {
                let n = n.trim().parse().map_err(|_| invalid())?;
                let d = d.trim().parse().map_err(|_| invalid())?;
                Self::new(n, d)
            }
            None => Ok(Self::from_integer(s.trim().parse().map_err(|_| invalid())?)),
        }
    }

    fn cross(&self, other: &Self) -> (u128, u128) {
        (
            self.numerator as u128 * other.denominator as u128,
            other.numerator as u128 * self.denominator as u128,
        )
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    // gcd(0, 0) only arises for 0/0, which `new` rejects
    a.max(1)
}

impl Default for Fraction {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for Fraction {
    fn eq(&self, other: &Self) -> bool {
        let (left, right) = self.cross(other);
        left == right
    }
}

impl Eq for Fraction {}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left, right) = self.cross(other);
        left.cmp(&right)
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl fmt::Debug for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fraction({}/{})", self.numerator, self.denominator)
    }
}
