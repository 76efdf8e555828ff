//! 256-bit unsigned integer used for block hashes, merkle roots and targets
//!
//! Values are stored as four little-endian 64-bit limbs, matching the
//! little-endian byte layout used on the wire.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Size of a UInt256 in bytes
pub const UINT256_SIZE: usize = 32;

/// Number of hex characters in the textual form
const HEX_LENGTH: usize = UINT256_SIZE * 2;

/// UInt256 construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UInt256Error {
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),
}

/// Fixed 32-byte little-endian integer
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct UInt256 {
    /// limbs[0] is the least significant
    limbs: [u64; 4],
}

impl UInt256 {
    /// The canonical zero value
    pub const ZERO: UInt256 = UInt256 { limbs: [0; 4] };

    /// Build from 32 little-endian bytes
    pub fn from_bytes(bytes: [u8; UINT256_SIZE]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, limb) in limbs.iter_mut().enumerate() {
            let mut part = [0u8; 8];
            part.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            *limb = u64::from_le_bytes(part);
        }
        Self { limbs }
    }

    /// Build from a slice that must be exactly 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self, UInt256Error> {
        let array: [u8; UINT256_SIZE] =
            bytes.try_into().map_err(|_| UInt256Error::InvalidLength {
                expected: UINT256_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self::from_bytes(array))
    }

    /// Build from limbs, least significant first
    pub const fn from_limbs(limbs: [u64; 4]) -> Self {
        Self { limbs }
    }

    /// Build from a small integer
    pub const fn from_u64(value: u64) -> Self {
        Self {
            limbs: [value, 0, 0, 0],
        }
    }

    /// Limbs, least significant first
    pub fn limbs(&self) -> [u64; 4] {
        self.limbs
    }

    /// Little-endian byte representation
    pub fn to_bytes(&self) -> [u8; UINT256_SIZE] {
        let mut bytes = [0u8; UINT256_SIZE];
        for (i, limb) in self.limbs.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&limb.to_le_bytes());
        }
        bytes
    }

    pub fn is_zero(&self) -> bool {
        self.limbs == [0; 4]
    }

    /// Decode a compact ("nBits") difficulty target.
    ///
    /// Returns `None` for negative, zero or overflowing encodings.
    pub fn from_compact(bits: u32) -> Option<Self> {
        let size = (bits >> 24) as usize;
        let mut word = bits & 0x007f_ffff;
        let negative = word != 0 && (bits & 0x0080_0000) != 0;
        let overflow = word != 0
            && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

        if negative || overflow {
            return None;
        }

        let mut bytes = [0u8; UINT256_SIZE];
        if size <= 3 {
            word >>= 8 * (3 - size);
            bytes[..4].copy_from_slice(&word.to_le_bytes());
        } else {
            let offset = size - 3;
            for (i, byte) in word.to_le_bytes()[..3].iter().enumerate() {
                if offset + i < UINT256_SIZE {
                    bytes[offset + i] = *byte;
                }
            }
        }

        let target = Self::from_bytes(bytes);
        if target.is_zero() {
            None
        } else {
            Some(target)
        }
    }
}

impl Ord for UInt256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..4).rev() {
            match self.limbs[i].cmp(&other.limbs[i]) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for UInt256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Only the low-order limb feeds the hasher. Hash values are uniformly
// distributed in their low bits so this is enough for map buckets.
impl Hash for UInt256 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.limbs[0]);
    }
}

impl FromStr for UInt256 {
    type Err = UInt256Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        if digits.len() != HEX_LENGTH {
            return Err(UInt256Error::InvalidLength {
                expected: HEX_LENGTH,
                actual: digits.len(),
            });
        }

        let mut bytes = hex::decode(digits).map_err(|e| UInt256Error::InvalidHex(e.to_string()))?;
        bytes.reverse();
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.to_bytes();
        bytes.reverse();
        f.write_str(&hex::encode(bytes))
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt256({})", self)
    }
}

impl From<[u8; UINT256_SIZE]> for UInt256 {
    fn from(bytes: [u8; UINT256_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl Serialize for UInt256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UInt256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
