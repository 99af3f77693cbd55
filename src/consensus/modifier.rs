//! Stake modifier chain
//!
//! Every block carries a 256-bit stake modifier:
//!
//! ```text
//! modifier(genesis) = 0
//! modifier(B)       = H(modifier(parent(B)) || kernel(B))
//! ```
//!
//! where `kernel(B)` is the block's proof-of-stake hash, or its block hash
//! for PoW blocks. The modifier a kernel commits to is the one of the block
//! it builds on, so future kernels cannot be ground before that block exists.

use tracing::warn;

use crate::crypto::{hash_pair, Hash};
use crate::storage::{BlockIndex, ChainView};

/// Modifier of the genesis block
pub const GENESIS_STAKE_MODIFIER: Hash = Hash::zero();

/// Modifier for a block whose parent is `prev` and whose kernel is `kernel`
///
/// `prev` is `None` only for the genesis block. A parent whose own modifier
/// was never computed is a broken caller invariant and aborts.
pub fn compute_stake_modifier(prev: Option<&BlockIndex>, kernel: &Hash) -> Hash {
    let Some(prev) = prev else {
        return GENESIS_STAKE_MODIFIER;
    };

    let Some(prev_modifier) = prev.stake_modifier else {
        panic!(
            "stake modifier requested on top of block {} (height {}) whose modifier is unset",
            prev.hash, prev.height
        );
    };

    hash_pair(&prev_modifier, kernel)
}

/// Modifier of `index`, from its cache or folded forward from the nearest
/// cached ancestor
///
/// Returns `None` when an ancestor is missing from the view; the caller may
/// retry once more of the chain is known.
pub fn resolve_stake_modifier<V>(view: &V, index: &BlockIndex) -> Option<Hash>
where
    V: ChainView + ?Sized,
{
    if let Some(modifier) = index.stake_modifier {
        return Some(modifier);
    }

    let mut pending = vec![index];
    let mut modifier = loop {
        let cursor = pending[pending.len() - 1];
        if cursor.is_genesis() {
            pending.pop();
            break GENESIS_STAKE_MODIFIER;
        }
        let Some(parent) = view.lookup_index(&cursor.prev_hash) else {
            warn!(
                height = cursor.height,
                parent = %cursor.prev_hash,
                "stake modifier unavailable: ancestor missing"
            );
            return None;
        };
        match parent.stake_modifier {
            Some(cached) => break cached,
            None => pending.push(parent),
        }
    };

    for block in pending.iter().rev() {
        modifier = hash_pair(&modifier, &block.kernel());
    }
    Some(modifier)
}
