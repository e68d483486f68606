//! Conversion of owner identifiers into ledger keys.

use std::{fmt, str::FromStr};

use num::{bigint::BigUint, traits::ToPrimitive};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// The integer key under which the digest of a record is anchored in the ledger.
///
/// The contract keys are `uint256`, but owner identifiers are restricted to the lower 128 bits of
/// that domain. Larger identifiers are rejected with [`OwnerKeyError::Overflow`] instead of being
/// truncated.
pub struct OwnerKey(u128);

impl OwnerKey {
    pub fn new(key: u128) -> Self {
        Self(key)
    }

    pub fn get(self) -> u128 {
        self.0
    }

    /// Encodes the key as a 32 bytes big endian word, which is the ABI encoding of an `uint256`.
    ///
    /// The upper 16 bytes of the word are always zero.
    pub fn to_word(self) -> [u8; 32] {
        let mut word = [0_u8; 32];
        word[16..].copy_from_slice(&self.0.to_be_bytes());
        word
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
/// Errors related to the conversion of an owner identifier into an [`OwnerKey`].
pub enum OwnerKeyError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier `{0}` is neither a decimal nor a 0x-prefixed hexadecimal integer")]
    InvalidDigits(String),
    #[error("identifier `{0}` exceeds the range of a ledger key")]
    Overflow(String),
}

impl FromStr for OwnerKey {
    type Err = OwnerKeyError;

    /// Parses a decimal or a `0x`-prefixed hexadecimal identifier.
    ///
    /// The digits are parsed with arbitrary precision first, so that an identifier which is a
    /// valid integer but too large for a ledger key is reported as an overflow.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (digits, radix) = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (trimmed, 10),
        };
        if digits.is_empty() {
            return Err(if trimmed.is_empty() {
                OwnerKeyError::Empty
            } else {
                OwnerKeyError::InvalidDigits(trimmed.to_string())
            });
        }
        // `parse_bytes` tolerates `_` separators and signs are not digits, so check explicitly
        if !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(OwnerKeyError::InvalidDigits(trimmed.to_string()));
        }

        let big = BigUint::parse_bytes(digits.as_bytes(), radix)
            .ok_or_else(|| OwnerKeyError::InvalidDigits(trimmed.to_string()))?;
        big.to_u128()
            .map(OwnerKey)
            .ok_or_else(|| OwnerKeyError::Overflow(trimmed.to_string()))
    }
}
