//! Proof-of-stake block producer
//!
//! Scans the wallet's coins for a kernel inside a short window ahead of the
//! tip, then builds, commits and signs the block around the winning coin.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::miner::{assemble, collect_fees, MiningResult};
use crate::behavior::{NetworkProof, StorageNode};
use crate::config::ConsensusParams;
use crate::consensus::{max_block_payout, next_target_required, search_kernel, sign_block, KernelHit};
use crate::storage::{ChainState, ChainView};
use crate::validation::Transaction;
use crate::wallet::{StakeCandidate, Wallet};

#[derive(Clone)]
pub struct Staker {
    /// How far past `now` the kernel search may look, in seconds
    search_window: u64,
    stop_signal: Arc<AtomicBool>,
}

impl Staker {
    pub fn new(search_window: u64) -> Self {
        Self { search_window, stop_signal: Arc::new(AtomicBool::new(false)) }
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

    /// First wallet coin with a kernel in the search window
    pub fn find_kernel(
        &self,
        chain: &ChainState,
        wallet: &Wallet,
        params: &ConsensusParams,
        now: u64,
    ) -> Option<(StakeCandidate, KernelHit)> {
        let prev = chain.tip();
        let bits = next_target_required(chain, prev, true, params);
        let start = now.max(prev.time + 1);
        let window = start..=start.saturating_add(self.search_window);

        let candidates = wallet.stake_candidates(&chain.utxo_set);
        debug!(height = prev.height + 1, candidates = candidates.len(), bits, "searching for kernel");

        for candidate in candidates {
            if self.stop_signal.load(Ordering::SeqCst) {
                return None;
            }
            if let Some(hit) = search_kernel(chain, prev, bits, &candidate.outpoint, window.clone(), params) {
                return Some((candidate, hit));
            }
        }
        None
    }

    /// Build and sign a PoS block on the current tip
    pub fn stake_block(
        &self,
        chain: &ChainState,
        wallet: &Wallet,
        params: &ConsensusParams,
        transactions: Vec<Transaction>,
        snapshot: Option<Vec<StorageNode>>,
        now: u64,
    ) -> MiningResult {
        let prev = chain.tip();
        let height = prev.height + 1;
        if height <= params.last_pow_block {
            return MiningResult::NoWork;
        }

        let Some((candidate, hit)) = self.find_kernel(chain, wallet, params, now) else {
            return if self.stop_signal.load(Ordering::SeqCst) {
                MiningResult::Interrupted
            } else {
                MiningResult::NoWork
            };
        };

        let Some(keypair) = wallet.key(&candidate.coin.pubkey_hash) else {
            return MiningResult::NoWork;
        };

        let reward = max_block_payout(height, true, collect_fees(&transactions, chain), params);
        let coinstake = match wallet.create_coinstake(&candidate, reward) {
            Ok(tx) => tx,
            Err(err) => {
                debug!(%err, "coinstake not created");
                return MiningResult::NoWork;
            }
        };

        let mut all_txs = vec![Transaction::coinbase(0, keypair.pubkey_hash(), height), coinstake];
        all_txs.extend(transactions);

        let bits = next_target_required(chain, prev, true, params);
        let net_proof = snapshot.map(|nodes| NetworkProof::new(height, nodes));
        let mut block = assemble(prev.hash, hit.time, bits, all_txs, net_proof);

        if !sign_block(&mut block, keypair.private_key()) {
            return MiningResult::NoWork;
        }

        info!(
            height,
            time = hit.time,
            prevout = %candidate.outpoint,
            hash_proof = %hit.proof.hash_proof_of_stake,
            "kernel found"
        );
        MiningResult::Success(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::consensus::{check_block, contextual_check_block, Block, BlockHeader};
    use crate::crypto::{compute_merkle_root, hash_bytes, Hash, PrivateKey};
    use crate::storage::UTXO;
    use crate::validation::{OutPoint, TxInput};

    const BASE_TIME: u64 = 1_000_000;

    fn params() -> ConsensusParams {
        let mut params = ConsensusParams::for_network(Network::Regtest);
        params.last_pow_block = 1;
        params.stake_min_age = 0;
        params.stake_min_confirmations = 1;
        params.pos_limit = primitive_types::U256::MAX;
        params
    }

    fn block(prev: Hash, time: u64, txs: Vec<Transaction>) -> Block {
        let hashes: Vec<Hash> = txs.iter().map(|tx| tx.hash()).collect();
        Block::new(BlockHeader::new(1, prev, compute_merkle_root(&hashes), Hash::zero(), time, 0x207fffff, 0), txs)
    }

    /// Genesis plus one PoW block paying the wallet
    fn funded_chain(wallet: &mut Wallet) -> ChainState {
        let owner = wallet.generate_key().pubkey_hash();
        let genesis = block(Hash::zero(), BASE_TIME, vec![Transaction::coinbase(0, Hash::zero(), 0)]);
        let mut chain = ChainState::new(&genesis);
        let funding = block(genesis.hash(), BASE_TIME + 16, vec![Transaction::coinbase(1_000_000, owner, 1)]);
        chain.apply_block(&funding, None).unwrap();
        chain
    }

    #[test]
    fn test_staked_block_validates() {
        let params = params();
        let mut wallet = Wallet::new();
        let chain = funded_chain(&mut wallet);
        let staker = Staker::new(3_600);

        let snapshot = vec![StorageNode { ip: 0x0a000001, space: 10, mode: 1, stat: 1, reg: 1 }];
        let MiningResult::Success(block) =
            staker.stake_block(&chain, &wallet, &params, vec![], Some(snapshot), BASE_TIME + 100)
        else {
            panic!("no stake found");
        };

        assert!(block.is_proof_of_stake());
        assert_eq!(block.header.timestamp & 15, 0);
        assert_eq!(block.net_proof.as_ref().map(|p| p.height), Some(2));
        check_block(&block, &params).unwrap();
        let proof = contextual_check_block(&chain, chain.tip(), &block, &params).unwrap();
        assert!(proof.is_some());
    }

    #[test]
    fn test_nothing_to_stake_during_pow_phase() {
        let mut params = params();
        params.last_pow_block = 10;
        let mut wallet = Wallet::new();
        let chain = funded_chain(&mut wallet);
        let result = Staker::new(60).stake_block(&chain, &wallet, &params, vec![], None, BASE_TIME);
        assert!(matches!(result, MiningResult::NoWork));
    }

    #[test]
    fn test_empty_wallet_finds_nothing() {
        let params = params();
        let mut funded = Wallet::new();
        let chain = funded_chain(&mut funded);
        let result = Staker::new(60).stake_block(&chain, &Wallet::new(), &params, vec![], None, BASE_TIME);
        assert!(matches!(result, MiningResult::NoWork));
    }

    #[test]
    fn test_stop_signal_interrupts_search() {
        let params = params();
        let mut wallet = Wallet::new();
        let chain = funded_chain(&mut wallet);
        let staker = Staker::new(60);
        staker.stop();
        let result = staker.stake_block(&chain, &wallet, &params, vec![], None, BASE_TIME);
        assert!(matches!(result, MiningResult::Interrupted));
    }

    #[test]
    fn test_huge_fees_saturate_the_coinstake() {
        let params = params();
        let mut wallet = Wallet::new();
        let mut chain = funded_chain(&mut wallet);
        let key = PrivateKey::generate();
        let mut transactions = Vec::new();
        for tag in [b"x", b"y"] {
            let outpoint = OutPoint::new(hash_bytes(tag), 0);
            chain.utxo_set.add(outpoint, UTXO { amount: u64::MAX, pubkey_hash: key.public_key().key_id(), height: 1 });
            transactions.push(Transaction::new(vec![TxInput::unsigned(outpoint, key.public_key())], vec![]));
        }

        let result = Staker::new(3_600).stake_block(&chain, &wallet, &params, transactions, None, BASE_TIME + 100);
        let MiningResult::Success(block) = result else {
            panic!("no stake found");
        };
        assert_eq!(block.transactions[1].outputs[1].amount, u64::MAX);
    }
}
