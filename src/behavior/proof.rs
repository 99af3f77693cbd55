//! Network-proof wire records
//!
//! Each post-PoW block may embed a snapshot of the storage network: the
//! storage nodes seen by the block producer and their self-reported flags.
//! The record is fixed-width little-endian and versioned; decoding goes
//! through a size-limited bincode codec and rejects unknown versions,
//! oversized node lists and trailing bytes.

use std::net::Ipv4Addr;

use bincode::Options;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{hash_bytes, Hash};

/// Current network-proof record version
pub const NETWORK_PROOF_VERSION: u8 = 1;

/// Upper bound on storage nodes listed in one proof
pub const MAX_PROOF_NODES: usize = 4096;

/// Encoded size of one `StorageNode`
const STORAGE_NODE_SIZE: usize = 4 + 8 + 3;

/// Encoded size of the fixed part: version, height, node count
const PROOF_HEADER_SIZE: usize = 1 + 8 + 8;

const MAX_PROOF_BYTES: u64 = (PROOF_HEADER_SIZE + MAX_PROOF_NODES * STORAGE_NODE_SIZE) as u64;

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("malformed network proof: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("unsupported network proof version {0}")]
    UnsupportedVersion(u8),
    #[error("network proof lists {0} nodes, limit is {MAX_PROOF_NODES}")]
    TooManyNodes(usize),
}

/// One storage node as attested in a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    /// IPv4 address as a big-endian u32
    pub ip: u32,
    /// Declared storage capacity
    pub space: u64,
    pub mode: u8,
    pub stat: u8,
    pub reg: u8,
}

impl StorageNode {
    /// Reported mode, status and registration all set
    pub fn is_active(&self) -> bool {
        self.mode > 0 && self.stat > 0 && self.reg > 0
    }

    pub fn addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip)
    }
}

/// The node list of a proof
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    pub nodes: Vec<StorageNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProof {
    pub version: u8,
    /// Height of the block carrying this proof
    pub height: u64,
    pub proof: StorageProof,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_PROOF_BYTES)
        .reject_trailing_bytes()
}

impl NetworkProof {
    pub fn new(height: u64, nodes: Vec<StorageNode>) -> Self {
        Self { version: NETWORK_PROOF_VERSION, height, proof: StorageProof { nodes } }
    }

    pub fn nodes(&self) -> &[StorageNode] {
        &self.proof.nodes
    }

    /// Canonical wire bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let nodes = &self.proof.nodes;
        let mut bytes = Vec::with_capacity(PROOF_HEADER_SIZE + nodes.len() * STORAGE_NODE_SIZE);
        bytes.push(self.version);
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&(nodes.len() as u64).to_le_bytes());
        for node in nodes {
            bytes.extend_from_slice(&node.ip.to_le_bytes());
            bytes.extend_from_slice(&node.space.to_le_bytes());
            bytes.extend_from_slice(&[node.mode, node.stat, node.reg]);
        }
        bytes
    }

    /// Decode and schema-check a wire record
    pub fn decode(bytes: &[u8]) -> Result<Self, ProofError> {
        let proof: NetworkProof = codec().deserialize(bytes)?;
        proof.check()?;
        Ok(proof)
    }

    /// Version and size limits
    pub fn check(&self) -> Result<(), ProofError> {
        if self.version != NETWORK_PROOF_VERSION {
            return Err(ProofError::UnsupportedVersion(self.version));
        }
        if self.proof.nodes.len() > MAX_PROOF_NODES {
            return Err(ProofError::TooManyNodes(self.proof.nodes.len()));
        }
        Ok(())
    }

    /// Commitment stored in the block header
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(ip: u32, active: bool) -> StorageNode {
        let flag = u8::from(active);
        StorageNode { ip, space: 1 << 40, mode: flag, stat: flag, reg: flag }
    }

    #[test]
    fn test_wire_layout_matches_codec() {
        let proof = NetworkProof::new(1001, vec![node(0x0A000001, true), node(0x0A000002, false)]);
        let bytes = proof.to_bytes();

        assert_eq!(bytes.len(), PROOF_HEADER_SIZE + 2 * STORAGE_NODE_SIZE);
        assert_eq!(codec().serialize(&proof).unwrap(), bytes);
        assert_eq!(NetworkProof::decode(&bytes).unwrap(), proof);
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut proof = NetworkProof::new(5, vec![]);
        proof.version = 9;
        assert!(matches!(
            NetworkProof::decode(&proof.to_bytes()),
            Err(ProofError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_and_truncated_bytes() {
        let mut bytes = NetworkProof::new(5, vec![node(1, true)]).to_bytes();
        bytes.push(0);
        assert!(matches!(NetworkProof::decode(&bytes), Err(ProofError::Malformed(_))));

        bytes.truncate(bytes.len() - 3);
        assert!(matches!(NetworkProof::decode(&bytes), Err(ProofError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_count() {
        let mut bytes = vec![NETWORK_PROOF_VERSION];
        bytes.extend_from_slice(&7u64.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(NetworkProof::decode(&bytes).is_err());
    }

    #[test]
    fn test_active_flags_and_address() {
        let n = node(0x0A000001, true);
        assert!(n.is_active());
        assert_eq!(n.addr(), Ipv4Addr::new(10, 0, 0, 1));

        let partial = StorageNode { reg: 0, ..n };
        assert!(!partial.is_active());
    }
}
