//! Block structure
//!
//! A block is a header, its transactions, an optional storage-network proof
//! committed to by the header, and, for proof-of-stake blocks, the staker's
//! signature over the header hash.

use serde::{Deserialize, Serialize};

use crate::behavior::NetworkProof;
use crate::crypto::{Hash, SchnorrSignature};
use crate::validation::Transaction;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: Hash,
    pub merkle_root: Hash,
    /// Hash of the embedded network proof, zero when none is carried
    pub proof_hash: Hash,
    /// Seconds since Unix epoch
    pub timestamp: u64,
    /// Difficulty target (compact representation)
    pub bits: u32,
    /// PoW nonce, zero for PoS blocks
    pub nonce: u64,
}

impl BlockHeader {
    pub fn new(
        version: u32,
        prev_hash: Hash,
        merkle_root: Hash,
        proof_hash: Hash,
        timestamp: u64,
        bits: u32,
        nonce: u64,
    ) -> Self {
        Self { version, prev_hash, merkle_root, proof_hash, timestamp, bits, nonce }
    }

    /// Serialize the header for hashing
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(120);
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.prev_hash.0);
        bytes.extend_from_slice(&self.merkle_root.0);
        bytes.extend_from_slice(&self.proof_hash.0);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&self.bits.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn hash(&self) -> Hash {
        crate::crypto::hash_bytes(&self.to_bytes())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Storage-network attestation carried by post-PoW blocks
    #[serde(with = "net_proof_bytes")]
    pub net_proof: Option<NetworkProof>,
    /// Staker signature over the header hash (PoS only)
    pub signature: Option<SchnorrSignature>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions, net_proof: None, signature: None }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn prev_hash(&self) -> &Hash {
        &self.header.prev_hash
    }

    pub fn is_genesis(&self) -> bool {
        self.header.prev_hash == Hash::zero()
    }

    /// Coinstake sits right after the coinbase
    pub fn is_proof_of_stake(&self) -> bool {
        self.transactions.get(1).is_some_and(|tx| tx.is_coinstake())
    }

    pub fn coinstake(&self) -> Option<&Transaction> {
        self.transactions.get(1).filter(|tx| tx.is_coinstake())
    }

    /// Commitment expected in `header.proof_hash` for the carried proof
    pub fn expected_proof_hash(&self) -> Hash {
        self.net_proof
            .as_ref()
            .map(NetworkProof::hash)
            .unwrap_or_else(Hash::zero)
    }
}

/// Net proofs travel in their wire form and are schema-checked when read back
mod net_proof_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::behavior::NetworkProof;

    pub fn serialize<S: Serializer>(proof: &Option<NetworkProof>, serializer: S) -> Result<S::Ok, S::Error> {
        proof.as_ref().map(NetworkProof::to_bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NetworkProof>, D::Error> {
        Option::<Vec<u8>>::deserialize(deserializer)?
            .map(|bytes| NetworkProof::decode(&bytes).map_err(D::Error::custom))
            .transpose()
    }
}
