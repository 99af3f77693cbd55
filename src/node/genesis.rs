//! Genesis blocks per network
//!
//! Each network's genesis is a single coinbase committing to the genesis
//! message, stamped with that network's genesis time and bits. It pays
//! nothing and is never checked for proof of work.

use crate::config::ConsensusParams;
use crate::consensus::{Block, BlockHeader};
use crate::constants::GENESIS_MESSAGE;
use crate::crypto::{compute_merkle_root, hash_bytes, Hash};
use crate::validation::Transaction;

const GENESIS_VERSION: u32 = 1;

/// Build the genesis block for `params.network`
///
/// Deterministic: the same parameters always give the same block.
pub fn create_genesis_block(params: &ConsensusParams) -> Block {
    let coinbase = Transaction::coinbase(0, hash_bytes(GENESIS_MESSAGE.as_bytes()), 0);
    let merkle_root = compute_merkle_root(&[coinbase.hash()]);

    let header = BlockHeader::new(
        GENESIS_VERSION,
        Hash::zero(),
        merkle_root,
        Hash::zero(),
        params.genesis_time,
        params.genesis_bits,
        0,
    );
    Block::new(header, vec![coinbase])
}

pub fn genesis_hash(params: &ConsensusParams) -> Hash {
    create_genesis_block(params).hash()
}

#[derive(Debug)]
pub struct GenesisInfo {
    pub hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u64,
    pub bits: u32,
}

impl GenesisInfo {
    pub fn new(params: &ConsensusParams) -> Self {
        let genesis = create_genesis_block(params);
        Self {
            hash: genesis.hash(),
            merkle_root: genesis.header.merkle_root,
            timestamp: genesis.header.timestamp,
            bits: genesis.header.bits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;

    #[test]
    fn test_genesis_is_deterministic() {
        let params = ConsensusParams::for_network(Network::Main);
        assert_eq!(create_genesis_block(&params).hash(), genesis_hash(&params));
    }

    #[test]
    fn test_networks_have_distinct_genesis() {
        let main = genesis_hash(&ConsensusParams::for_network(Network::Main));
        let test = genesis_hash(&ConsensusParams::for_network(Network::Test));
        let regtest = genesis_hash(&ConsensusParams::for_network(Network::Regtest));
        assert_ne!(main, test);
        assert_ne!(test, regtest);
    }

    #[test]
    fn test_genesis_shape() {
        let params = ConsensusParams::for_network(Network::Regtest);
        let genesis = create_genesis_block(&params);
        assert!(genesis.is_genesis());
        assert!(!genesis.is_proof_of_stake());
        assert!(genesis.net_proof.is_none());
        assert_eq!(genesis.transactions.len(), 1);
        assert_eq!(genesis.transactions[0].outputs[0].amount, 0);
    }

    #[test]
    fn test_genesis_info() {
        let params = ConsensusParams::for_network(Network::Devnet);
        let info = GenesisInfo::new(&params);
        assert_eq!(info.timestamp, params.genesis_time);
        assert_eq!(info.bits, params.genesis_bits);
    }
}
