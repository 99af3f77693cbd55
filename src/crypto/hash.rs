//! BLAKE3 hashing and 256-bit views of hashes
//!
//! Block ids, transaction ids, kernel hashes and stake modifiers are all
//! BLAKE3 digests. Consensus comparisons read a digest as a big-endian
//! unsigned 256-bit integer.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte hash output
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash (genesis parent, genesis stake modifier)
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Interpret the digest as a big-endian 256-bit integer
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }

    /// Big-endian encoding of a 256-bit integer
    pub fn from_u256(value: &U256) -> Self {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        Hash(bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

/// Hash arbitrary bytes using BLAKE3
pub fn hash_bytes(data: &[u8]) -> Hash {
    Hash(*blake3::hash(data).as_bytes())
}

/// Hash two hashes together, left then right
pub fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&left.0);
    hasher.update(&right.0);
    Hash(*hasher.finalize().as_bytes())
}

/// Hash of hash, used for address checksums
pub fn double_hash(data: &[u8]) -> Hash {
    let first = hash_bytes(data);
    hash_bytes(&first.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(hash_bytes(b"kernel"), hash_bytes(b"kernel"));
        assert_ne!(hash_bytes(b"kernel"), hash_bytes(b"modifier"));
    }

    #[test]
    fn test_hash_pair_matches_concatenation() {
        let left = hash_bytes(b"left");
        let right = hash_bytes(b"right");

        let mut joined = Vec::new();
        joined.extend_from_slice(&left.0);
        joined.extend_from_slice(&right.0);

        assert_eq!(hash_pair(&left, &right), hash_bytes(&joined));
        assert_ne!(hash_pair(&left, &right), hash_pair(&right, &left));
    }

    #[test]
    fn test_u256_is_big_endian() {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        assert_eq!(Hash(bytes).to_u256(), U256::one());

        let mut high = [0u8; 32];
        high[0] = 0x80;
        assert_eq!(Hash(high).to_u256(), U256::one() << 255);
    }

    #[test]
    fn test_u256_conversion_preserves_digest() {
        let hash = hash_bytes(b"digest");
        assert_eq!(Hash::from_u256(&hash.to_u256()), hash);
    }

    #[test]
    fn test_hex_rejects_short_input() {
        assert!(Hash::from_hex("abcd").is_err());
        let hash = hash_bytes(b"hex");
        assert_eq!(Hash::from_hex(&hash.to_hex()).unwrap(), hash);
    }
}
