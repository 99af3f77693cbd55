//! Transaction merkle root

use super::{hash_pair, Hash};

/// Compute the merkle root of a list of hashes
///
/// Empty input yields the zero hash; an odd level duplicates its last entry.
/// That makes `[a, b, c]` and `[a, b, c, c]` share a root, so block checks
/// must reject repeated transactions before trusting the root.
pub fn compute_merkle_root(hashes: &[Hash]) -> Hash {
    let mut level: Vec<Hash> = hashes.to_vec();
    if level.is_empty() {
        return Hash::zero();
    }

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [single] => hash_pair(single, single),
                _ => unreachable!("chunks(2) yields one or two items"),
            })
            .collect();
    }

    level[0]
}
