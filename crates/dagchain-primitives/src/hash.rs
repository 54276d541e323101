use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Size of a [`Hash`] in bytes.
pub const HASH_SIZE: usize = 32;

/// Error returned when parsing a [`Hash`] from its hex representation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseHashError {
    #[error("Invalid hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("Invalid hash length: {0}, expected {HASH_SIZE}")]
    InvalidLength(usize),
}

/// 32-byte double SHA-256 digest identifying blocks and transactions.
///
/// The textual form is the byte-reversed hex string, and [`Ord`] agrees with the
/// lexicographic order of that string.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Self = Self([0u8; HASH_SIZE]);

    pub const fn from_byte_array(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Constructs a hash from a slice, returns `None` if the length is not [`HASH_SIZE`].
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; HASH_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_byte_array(self) -> [u8; HASH_SIZE] {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Computes `sha256(sha256(data))`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(&first);
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&second);
        Self(out)
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({self})")
    }
}

impl FromStr for Hash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = hex::decode(s)?;
        if bytes.len() != HASH_SIZE {
            return Err(ParseHashError::InvalidLength(bytes.len()));
        }
        bytes.reverse();
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let hash = Hash::from_byte_array(bytes);
        let s = hash.to_string();
        assert!(s.starts_with("01"));
        assert!(s.ends_with("ab"));
        assert_eq!(s.parse::<Hash>().unwrap(), hash);
    }

    #[test]
    fn test_ordering_matches_string_ordering() {
        for _ in 0..100 {
            let mut a = [0u8; HASH_SIZE];
            let mut b = [0u8; HASH_SIZE];
            fastrand::fill(&mut a);
            fastrand::fill(&mut b);
            let (a, b) = (Hash::from_byte_array(a), Hash::from_byte_array(b));
            assert_eq!(a.cmp(&b), a.to_string().cmp(&b.to_string()));
        }
    }

    #[test]
    fn test_parse_invalid_length() {
        assert_eq!(
            "abcd".parse::<Hash>(),
            Err(ParseHashError::InvalidLength(2))
        );
    }

    #[test]
    fn test_parse_invalid_hex() {
        let err = "zz".repeat(HASH_SIZE).parse::<Hash>().unwrap_err();
        assert_eq!(
            err,
            ParseHashError::InvalidHex(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        );
    }
}
