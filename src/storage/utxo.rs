//! UTXO set implementation
//!
//! In-memory database of unspent transaction outputs, keyed by outpoint.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::Hash;
use crate::validation::{OutPoint, Transaction};

/// Unspent Transaction Output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UTXO {
    /// Amount in base units
    pub amount: u64,
    /// Owner key id
    pub pubkey_hash: Hash,
    /// Height of the block that created this output
    pub height: u64,
}

/// Set of all unspent transaction outputs
#[derive(Debug, Default, Clone)]
pub struct UTXOSet {
    utxos: HashMap<OutPoint, UTXO>,
}

impl UTXOSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UTXO> {
        self.utxos.get(outpoint)
    }

    pub fn add(&mut self, outpoint: OutPoint, utxo: UTXO) {
        self.utxos.insert(outpoint, utxo);
    }

    pub fn remove(&mut self, outpoint: &OutPoint) -> Option<UTXO> {
        self.utxos.remove(outpoint)
    }

    /// Apply a transaction, returning the coins it spent
    ///
    /// Empty outputs (the coinstake marker) never enter the set.
    pub fn apply_transaction(&mut self, tx: &Transaction, height: u64) -> Vec<(OutPoint, UTXO)> {
        let mut spent = Vec::new();
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                if let Some(utxo) = self.remove(&input.prevout) {
                    spent.push((input.prevout, utxo));
                }
            }
        }

        let tx_hash = tx.hash();
        for (index, output) in tx.outputs.iter().enumerate() {
            if output.is_empty() {
                continue;
            }
            self.add(
                OutPoint::new(tx_hash, index as u32),
                UTXO { amount: output.amount, pubkey_hash: output.pubkey_hash, height },
            );
        }

        spent
    }

    /// Undo a transaction: drop what it created, restore what it spent
    pub fn revert_transaction(&mut self, tx: &Transaction, spent: &[(OutPoint, UTXO)]) {
        let tx_hash = tx.hash();
        for index in 0..tx.outputs.len() {
            self.remove(&OutPoint::new(tx_hash, index as u32));
        }

        for (outpoint, utxo) in spent {
            if tx.inputs.iter().any(|input| input.prevout == *outpoint) {
                self.add(*outpoint, utxo.clone());
            }
        }
    }

    /// All coins owned by a key id
    pub fn get_by_pubkey_hash(&self, pubkey_hash: &Hash) -> Vec<(OutPoint, &UTXO)> {
        let mut owned: Vec<_> = self
            .utxos
            .iter()
            .filter(|(_, utxo)| utxo.pubkey_hash == *pubkey_hash)
            .map(|(outpoint, utxo)| (*outpoint, utxo))
            .collect();
        owned.sort_by_key(|(outpoint, _)| *outpoint);
        owned
    }

    pub fn get_balance(&self, pubkey_hash: &Hash) -> u64 {
        self.get_by_pubkey_hash(pubkey_hash)
            .iter()
            .fold(0u64, |total, (_, utxo)| total.saturating_add(utxo.amount))
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}
