//! Proof-of-work miner
//!
//! Assembles candidate blocks up to the last PoW height and grinds the
//! header nonce against the required target.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::behavior::{NetworkProof, StorageNode};
use crate::config::ConsensusParams;
use crate::consensus::{check_proof_of_work, max_block_payout, next_target_required, Block, BlockHeader};
use crate::crypto::{compute_merkle_root, Hash};
use crate::storage::{ChainState, ChainView};
use crate::validation::Transaction;

#[derive(Debug)]
pub enum MiningResult {
    Success(Block),
    /// Stop signal raised
    Interrupted,
    /// Nothing to produce at this height
    NoWork,
}

/// Fees paid by `transactions` against the chain's coins
pub(crate) fn collect_fees(transactions: &[Transaction], chain: &ChainState) -> u64 {
    transactions
        .iter()
        .fold(0u64, |fees, tx| fees.saturating_add(tx.fee(&chain.utxo_set)))
}

/// Seconds since the Unix epoch
pub fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Assemble a block from its parts, committing to the transactions and proof
pub(crate) fn assemble(
    prev_hash: Hash,
    timestamp: u64,
    bits: u32,
    transactions: Vec<Transaction>,
    net_proof: Option<NetworkProof>,
) -> Block {
    let tx_hashes: Vec<Hash> = transactions.iter().map(|tx| tx.hash()).collect();
    let proof_hash = net_proof.as_ref().map(NetworkProof::hash).unwrap_or_default();
    let header = BlockHeader::new(1, prev_hash, compute_merkle_root(&tx_hashes), proof_hash, timestamp, bits, 0);
    let mut block = Block::new(header, transactions);
    block.net_proof = net_proof;
    block
}

#[derive(Clone)]
pub struct Miner {
    miner_pubkey_hash: Hash,
    stop_signal: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(miner_pubkey_hash: Hash) -> Self {
        Self { miner_pubkey_hash, stop_signal: Arc::new(AtomicBool::new(false)) }
    }

    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.stop_signal.store(false, Ordering::SeqCst);
    }

    /// Candidate PoW block on the current tip; `None` once mining has ended
    pub fn assemble_block(
        &self,
        chain: &ChainState,
        params: &ConsensusParams,
        transactions: Vec<Transaction>,
        snapshot: Option<Vec<StorageNode>>,
        now: u64,
    ) -> Option<Block> {
        let prev = chain.tip();
        let height = prev.height + 1;
        if height > params.last_pow_block {
            return None;
        }

        let reward = max_block_payout(height, false, collect_fees(&transactions, chain), params);

        let mut all_txs = vec![Transaction::coinbase(reward, self.miner_pubkey_hash, height)];
        all_txs.extend(transactions);

        let bits = next_target_required(chain, prev, false, params);
        let timestamp = now.max(prev.time + 1);
        let net_proof = snapshot.map(|nodes| NetworkProof::new(height, nodes));
        Some(assemble(prev.hash, timestamp, bits, all_txs, net_proof))
    }

    /// Grind the nonce until the header meets its target
    pub fn mine_block(&self, mut block: Block, params: &ConsensusParams) -> MiningResult {
        loop {
            if self.stop_signal.load(Ordering::SeqCst) {
                return MiningResult::Interrupted;
            }
            if check_proof_of_work(&block.hash(), block.header.bits, &params.pow_limit) {
                return MiningResult::Success(block);
            }

            block.header.nonce = block.header.nonce.wrapping_add(1);
            if block.header.nonce == 0 {
                block.header.timestamp += 1;
            }
        }
    }
}
