//! Fixed-width byte types shared across the protocol
//!
//! Identities, randomness and signatures all have a fixed width on the wire.
//! They serialize as lowercase hex strings so configuration files, JSON
//! receipts and stored entities stay readable.

use crate::errors::IntegrityError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub const ADDRESS_LEN: usize = 32;
pub const RANDOMNESS_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_bytes(self) -> [u8; $len] {
                self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Parse from a slice, rejecting any other width.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, IntegrityError> {
                let arr: [u8; $len] = bytes.try_into().map_err(|_| IntegrityError::MalformedField {
                    field: $field,
                    expected: $len,
                    actual: bytes.len(),
                })?;
                Ok(Self(arr))
            }

            pub fn from_hex(s: &str) -> Result<Self, IntegrityError> {
                let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|_| IntegrityError::MalformedField {
                    field: $field,
                    expected: $len,
                    actual: s.len() / 2,
                })?;
                Self::from_slice(&bytes)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 32-byte entity identity. Player and operator identities are their
    /// ed25519 public keys; games, locks and bets use derived addresses.
    Address,
    ADDRESS_LEN,
    "address"
);

fixed_bytes!(
    /// Raw randomness revealed by the oracle for one round.
    Randomness,
    RANDOMNESS_LEN,
    "randomness"
);

fixed_bytes!(
    /// 64-byte ed25519 signature.
    SignatureBytes,
    SIGNATURE_LEN,
    "signature"
);

/// 32-byte randomness request seed.
pub type Seed = [u8; 32];
