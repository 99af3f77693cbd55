//! Chain state management
//!
//! Owns the active chain: block index records, full blocks, the UTXO set
//! and per-block undo data. Blocks are connected only on top of the tip,
//! after validation; each connected index gets its chain trust and stake
//! modifier filled in.

use std::collections::HashMap;

use primitive_types::U256;
use thiserror::Error;
use tracing::debug;

use super::{BlockIndex, ChainView, UTXOSet, UTXO};
use crate::consensus::{block_proof, compute_stake_modifier, Block, ProofOfStake};
use crate::crypto::Hash;
use crate::validation::OutPoint;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("block {block} does not extend tip {tip}")]
    NotOnTip { block: Hash, tip: Hash },
    #[error("cannot disconnect the genesis block")]
    GenesisRevert,
    #[error("no undo data for block {0}")]
    MissingUndo(Hash),
}

#[derive(Debug)]
pub struct ChainState {
    pub utxo_set: UTXOSet,
    by_hash: HashMap<Hash, BlockIndex>,
    /// Active chain, indexed by height
    active: Vec<Hash>,
    blocks: HashMap<Hash, Block>,
    undo: HashMap<Hash, Vec<(OutPoint, UTXO)>>,
}

impl ChainState {
    pub fn new(genesis: &Block) -> Self {
        let hash = genesis.hash();
        let index = BlockIndex {
            hash,
            prev_hash: genesis.header.prev_hash,
            height: 0,
            time: genesis.header.timestamp,
            bits: genesis.header.bits,
            chain_work: Hash::from_u256(&block_proof(genesis.header.bits)),
            proof_of_stake: None,
            prevout_stake: None,
            stake_modifier: Some(compute_stake_modifier(None, &hash)),
        };

        let mut utxo_set = UTXOSet::new();
        for tx in &genesis.transactions {
            utxo_set.apply_transaction(tx, 0);
        }

        Self {
            utxo_set,
            by_hash: HashMap::from([(hash, index)]),
            active: vec![hash],
            blocks: HashMap::from([(hash, genesis.clone())]),
            undo: HashMap::new(),
        }
    }

    pub fn height(&self) -> u64 {
        (self.active.len() - 1) as u64
    }

    pub fn tip_hash(&self) -> Hash {
        self.tip().hash
    }

    pub fn block(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Connect a validated block on top of the tip
    pub fn apply_block(&mut self, block: &Block, proof: Option<ProofOfStake>) -> Result<&BlockIndex, StateError> {
        let prev = self.tip();
        let hash = block.hash();
        if block.header.prev_hash != prev.hash {
            return Err(StateError::NotOnTip { block: hash, tip: prev.hash });
        }

        let work = prev
            .chain_work
            .to_u256()
            .checked_add(block_proof(block.header.bits))
            .unwrap_or(U256::MAX);

        let mut index = BlockIndex {
            hash,
            prev_hash: prev.hash,
            height: prev.height + 1,
            time: block.header.timestamp,
            bits: block.header.bits,
            chain_work: Hash::from_u256(&work),
            proof_of_stake: proof,
            prevout_stake: block.coinstake().map(|tx| tx.inputs[0].prevout),
            stake_modifier: None,
        };
        index.stake_modifier = Some(compute_stake_modifier(Some(prev), &index.kernel()));

        let mut spent = Vec::new();
        for tx in &block.transactions {
            spent.extend(self.utxo_set.apply_transaction(tx, index.height));
        }

        debug!(
            height = index.height,
            hash = %hash,
            pos = index.is_proof_of_stake(),
            "connected block"
        );

        self.undo.insert(hash, spent);
        self.blocks.insert(hash, block.clone());
        self.active.push(hash);
        self.by_hash.insert(hash, index);
        Ok(&self.by_hash[&hash])
    }

    /// Disconnect the tip, restoring the coins it spent
    pub fn revert_tip(&mut self) -> Result<Block, StateError> {
        if self.active.len() == 1 {
            return Err(StateError::GenesisRevert);
        }
        let hash = self.tip_hash();
        let spent = self.undo.remove(&hash).ok_or(StateError::MissingUndo(hash))?;
        let block = self.blocks.remove(&hash).ok_or(StateError::MissingUndo(hash))?;

        for tx in block.transactions.iter().rev() {
            self.utxo_set.revert_transaction(tx, &spent);
        }

        self.active.pop();
        self.by_hash.remove(&hash);
        debug!(height = self.height() + 1, hash = %hash, "disconnected block");
        Ok(block)
    }
}

impl ChainView for ChainState {
    fn lookup_index(&self, hash: &Hash) -> Option<&BlockIndex> {
        self.by_hash.get(hash)
    }

    fn index_at(&self, height: u64) -> Option<&BlockIndex> {
        let hash = self.active.get(usize::try_from(height).ok()?)?;
        self.by_hash.get(hash)
    }

    fn tip(&self) -> &BlockIndex {
        // the active chain always holds genesis
        &self.by_hash[&self.active[self.active.len() - 1]]
    }

    fn coin(&self, outpoint: &OutPoint) -> Option<&UTXO> {
        self.utxo_set.get(outpoint)
    }

    fn read_block(&self, index: &BlockIndex) -> Option<Block> {
        self.blocks.get(&index.hash).cloned()
    }
}
