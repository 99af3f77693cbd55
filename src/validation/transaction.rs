//! Transaction structure and classification
//!
//! UTXO-based transactions with Schnorr-signed inputs. A block's first
//! transaction is the coinbase; a proof-of-stake block's second transaction
//! is the coinstake that spends the staked kernel output.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{hash_bytes, Hash, PublicKey, SchnorrSignature};
use crate::storage::{UTXOSet, UTXO};

/// Reference to a transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub const NULL_INDEX: u32 = u32::MAX;

    pub fn new(hash: Hash, index: u32) -> Self {
        Self { hash, index }
    }

    /// The null outpoint spent by coinbase inputs
    pub fn null() -> Self {
        Self { hash: Hash::zero(), index: Self::NULL_INDEX }
    }

    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == Self::NULL_INDEX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// A transaction input referencing a previous output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
    /// Signature over the transaction signing hash
    pub signature: SchnorrSignature,
    pub public_key: PublicKey,
}

impl TxInput {
    /// Input with an empty signature, to be signed later
    pub fn unsigned(prevout: OutPoint, public_key: PublicKey) -> Self {
        Self { prevout, signature: SchnorrSignature::empty(), public_key }
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in base units
    pub amount: u64,
    /// Owner key id
    pub pubkey_hash: Hash,
    /// Token script, empty for plain payments
    #[serde(default)]
    pub script: Vec<u8>,
}

impl TxOutput {
    pub fn new(amount: u64, pubkey_hash: Hash) -> Self {
        Self { amount, pubkey_hash, script: Vec::new() }
    }

    /// Zero-value, ownerless output marking a coinstake
    pub fn empty() -> Self {
        Self::new(0, Hash::zero())
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0 && self.pubkey_hash.is_zero() && self.script.is_empty()
    }

    pub fn is_token(&self) -> bool {
        !self.script.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Lock time (block height or timestamp)
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self { version: 1, inputs, outputs, lock_time: 0 }
    }

    /// Coinbase paying `reward` to `miner_pubkey_hash`, tagged with the block height
    ///
    /// The height goes in the lock time so coinbases of different blocks
    /// never share a txid.
    pub fn coinbase(reward: u64, miner_pubkey_hash: Hash, height: u64) -> Self {
        Self {
            version: 1,
            inputs: vec![TxInput {
                prevout: OutPoint::null(),
                signature: SchnorrSignature::empty(),
                public_key: PublicKey([0u8; 32]),
            }],
            outputs: vec![TxOutput::new(reward, miner_pubkey_hash)],
            lock_time: height as u32,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Spends a real kernel output and carries an empty first output
    pub fn is_coinstake(&self) -> bool {
        !self.inputs.is_empty()
            && !self.inputs[0].prevout.is_null()
            && self.outputs.len() >= 2
            && self.outputs[0].is_empty()
    }

    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes_for_signing())
    }

    /// Digest signed by every input (signatures excluded)
    pub fn signing_hash(&self) -> Hash {
        self.hash()
    }

    fn to_bytes_for_signing(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.version.to_le_bytes());

        bytes.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            bytes.extend_from_slice(&input.prevout.hash.0);
            bytes.extend_from_slice(&input.prevout.index.to_le_bytes());
        }

        bytes.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            bytes.extend_from_slice(&output.amount.to_le_bytes());
            bytes.extend_from_slice(&output.pubkey_hash.0);
            bytes.extend_from_slice(&(output.script.len() as u32).to_le_bytes());
            bytes.extend_from_slice(&output.script);
        }

        bytes.extend_from_slice(&self.lock_time.to_le_bytes());
        bytes
    }

    /// Verify one input's signature and ownership of the coin it spends
    pub fn verify_input(&self, index: usize, coin: &UTXO) -> bool {
        let Some(input) = self.inputs.get(index) else {
            return false;
        };
        input.public_key.key_id() == coin.pubkey_hash
            && input.public_key.verify(&self.signing_hash(), &input.signature)
    }

    /// Verify all input signatures against the UTXO set
    pub fn verify_signatures(&self, utxo_set: &UTXOSet) -> bool {
        if self.is_coinbase() {
            return true;
        }

        self.inputs.iter().enumerate().all(|(index, input)| {
            utxo_set
                .get(&input.prevout)
                .is_some_and(|coin| self.verify_input(index, coin))
        })
    }

    /// Total value of the coins spent (missing inputs count as zero)
    pub fn total_input_value(&self, utxo_set: &UTXOSet) -> u64 {
        self.inputs
            .iter()
            .filter_map(|input| utxo_set.get(&input.prevout).map(|utxo| utxo.amount))
            .fold(0u64, u64::saturating_add)
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().fold(0u64, |total, o| total.saturating_add(o.amount))
    }

    pub fn fee(&self, utxo_set: &UTXOSet) -> u64 {
        self.total_input_value(utxo_set).saturating_sub(self.total_output_value())
    }
}
