//! Compact target arithmetic
//!
//! Difficulty targets travel as 32-bit compact values: a one-byte exponent
//! (size in bytes) and a 23-bit mantissa with a sign bit. Everything here is
//! exact integer arithmetic on `U256`. Malformed encodings (negative,
//! overflowing or zero) expand to `None`, which callers treat as
//! "target not met"; nothing in this module panics on attacker input.

use primitive_types::U256;

use crate::crypto::Hash;

const MANTISSA_MASK: u32 = 0x007f_ffff;
const SIGN_BIT: u32 = 0x0080_0000;

/// Raw result of decoding a compact value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCompact {
    pub value: U256,
    pub negative: bool,
    pub overflow: bool,
}

/// Decode a compact value, reporting sign and overflow separately
pub fn decode_compact(bits: u32) -> DecodedCompact {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    let value = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from(word)
    } else if overflow || word == 0 {
        U256::zero()
    } else {
        U256::from(word) << (8 * (size - 3)) as usize
    };

    let negative = word != 0 && bits & SIGN_BIT != 0;

    DecodedCompact { value, negative, overflow }
}

/// Expand a compact target; `None` for negative, overflowing or zero targets
pub fn expand_compact(bits: u32) -> Option<U256> {
    let decoded = decode_compact(bits);
    if decoded.negative || decoded.overflow || decoded.value.is_zero() {
        return None;
    }
    Some(decoded.value)
}

/// Encode a target in compact form (rounds down to 23 mantissa bits)
pub fn compact_from_target(target: &U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (*target >> (8 * (size - 3))).low_u32()
    };

    // keep the sign bit clear by moving one byte into the exponent
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}

/// `hash <= target`, reading the hash as a big-endian integer
pub fn hash_meets_target(hash: &Hash, target: &U256) -> bool {
    hash.to_u256() <= *target
}

/// Proof-of-work check against a compact target and the network limit
pub fn check_proof_of_work(hash: &Hash, bits: u32, pow_limit: &U256) -> bool {
    match expand_compact(bits) {
        Some(target) if target <= *pow_limit => hash_meets_target(hash, &target),
        _ => false,
    }
}

/// Stake-weighted target: `expand(bits) * weight`, saturating at 2^256 - 1
pub fn weighted_target(bits: u32, weight: u64) -> Option<U256> {
    let base = expand_compact(bits)?;
    Some(base.checked_mul(U256::from(weight)).unwrap_or(U256::MAX))
}

/// Expected number of hashes to hit a target: `2^256 / (target + 1)`
pub fn block_proof(bits: u32) -> U256 {
    match expand_compact(bits) {
        // computed as (~target / (target + 1)) + 1 to stay within 256 bits
        Some(target) => (!target / (target + U256::one())) + U256::one(),
        None => U256::zero(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_exponents_shift_mantissa_down() {
        assert_eq!(decode_compact(0x01003456).value, U256::zero());
        assert_eq!(decode_compact(0x01123456).value, U256::from(0x12));
        assert_eq!(decode_compact(0x02123456).value, U256::from(0x1234));
        assert_eq!(decode_compact(0x03123456).value, U256::from(0x123456));
        assert_eq!(decode_compact(0x04123456).value, U256::from(0x12345600u64));
    }

    #[test]
    fn test_compact_encoding_vectors() {
        assert_eq!(compact_from_target(&U256::from(0x12)), 0x01120000);
        assert_eq!(compact_from_target(&U256::from(0x1234)), 0x02123400);
        assert_eq!(compact_from_target(&U256::from(0x92340000u64)), 0x05009234);
        assert_eq!(compact_from_target(&U256::zero()), 0);

        let bitcoin_limit = U256::from(0xffff) << 208;
        assert_eq!(expand_compact(0x1d00ffff), Some(bitcoin_limit));
        assert_eq!(compact_from_target(&bitcoin_limit), 0x1d00ffff);
    }

    #[test]
    fn test_negative_mantissa_is_rejected() {
        let decoded = decode_compact(0x04923456);
        assert!(decoded.negative);
        assert_eq!(expand_compact(0x04923456), None);
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert!(decode_compact(0xff123456).overflow);
        assert!(decode_compact(0x21010000).overflow);
        assert!(!decode_compact(0x2100ffff).overflow);
        assert_eq!(expand_compact(0xff123456), None);
    }

    #[test]
    fn test_zero_target_is_rejected() {
        assert_eq!(expand_compact(0), None);
        assert_eq!(expand_compact(0x1d000000), None);
    }

    #[test]
    fn test_hash_comparison_is_inclusive() {
        let target = U256::from(0x1234);
        assert!(hash_meets_target(&Hash::from_u256(&target), &target));
        assert!(!hash_meets_target(&Hash::from_u256(&(target + U256::one())), &target));
    }

    #[test]
    fn test_pow_respects_limit() {
        let limit = U256::MAX >> 16;
        assert!(check_proof_of_work(&Hash::zero(), 0x1f00ffff, &limit));
        // easier than the limit
        assert!(!check_proof_of_work(&Hash::zero(), 0x2100ffff, &limit));
        // malformed
        assert!(!check_proof_of_work(&Hash::zero(), 0x04923456, &limit));
    }

    #[test]
    fn test_weighted_target_saturates() {
        assert_eq!(weighted_target(0x1d00ffff, 2), Some((U256::from(0xffff) << 208) * U256::from(2)));
        assert_eq!(weighted_target(0x2100ffff, u64::MAX), Some(U256::MAX));
        assert_eq!(weighted_target(0x04923456, 10), None);
    }

    #[test]
    fn test_block_proof_grows_with_difficulty() {
        let easy = block_proof(0x1f00ffff);
        let hard = block_proof(0x1d00ffff);
        assert!(hard > easy);
        assert_eq!(block_proof(0x04923456), U256::zero());
        // target 0xff..ff >> 1 needs two hashes on average
        assert_eq!(block_proof(compact_from_target(&(U256::MAX >> 1))), U256::from(2));
    }
}
