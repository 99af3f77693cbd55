//! Block index entries and the read-only chain view
//!
//! `ChainView` is the seam between consensus code and the chain service:
//! kernel validation, retargeting and behavior replay only ever read
//! through it.

use serde::{Deserialize, Serialize};

use crate::consensus::{Block, ProofOfStake};
use crate::crypto::Hash;
use crate::storage::UTXO;
use crate::validation::OutPoint;

/// Per-block record kept by the chain service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
    pub hash: Hash,
    pub prev_hash: Hash,
    pub height: u64,
    pub time: u64,
    pub bits: u32,
    /// Accumulated chain trust, big-endian
    pub chain_work: Hash,
    /// Kernel proof for PoS blocks, `None` for PoW blocks
    pub proof_of_stake: Option<ProofOfStake>,
    /// Outpoint staked by this block's coinstake
    pub prevout_stake: Option<OutPoint>,
    /// Cached stake modifier; absent until the block is connected
    pub stake_modifier: Option<Hash>,
}

impl BlockIndex {
    pub fn is_proof_of_stake(&self) -> bool {
        self.proof_of_stake.is_some()
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }

    /// Entropy this block contributes to the modifier chain
    pub fn kernel(&self) -> Hash {
        self.proof_of_stake
            .as_ref()
            .map(|pos| pos.hash_proof_of_stake)
            .unwrap_or(self.hash)
    }
}

/// Read access to the chain service
pub trait ChainView {
    /// Any known block index, active chain or not
    fn lookup_index(&self, hash: &Hash) -> Option<&BlockIndex>;

    /// Active-chain block index at `height`
    fn index_at(&self, height: u64) -> Option<&BlockIndex>;

    /// Active-chain tip
    fn tip(&self) -> &BlockIndex;

    /// Unspent output lookup
    fn coin(&self, outpoint: &OutPoint) -> Option<&UTXO>;

    /// Full block contents for an index entry
    fn read_block(&self, index: &BlockIndex) -> Option<Block>;

    /// Ancestor of `index` at `height`, walking parent links
    fn ancestor<'a>(&'a self, index: &'a BlockIndex, height: u64) -> Option<&'a BlockIndex> {
        if height > index.height {
            return None;
        }
        if self.index_at(index.height).is_some_and(|active| active.hash == index.hash) {
            return self.index_at(height);
        }

        let mut cursor = index;
        while cursor.height > height {
            cursor = self.lookup_index(&cursor.prev_hash)?;
        }
        Some(cursor)
    }
}
