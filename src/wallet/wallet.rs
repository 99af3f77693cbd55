//! Wallet implementation
//!
//! Key storage, spendable and stakeable coin selection, and signing of
//! payments and coinstakes. Nothing here is consensus critical.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::crypto::{Hash, PrivateKey, PublicKey, SchnorrSignature};
use crate::storage::{UTXOSet, UTXO};
use crate::token::{Token, TokenError};
use crate::validation::{OutPoint, Transaction, TxInput, TxOutput};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("wallet holds no keys")]
    NoKeys,
    #[error("invalid private key")]
    InvalidKey,
    #[error("invalid address: {0}")]
    InvalidAddress(&'static str),
    #[error("no key for {0}")]
    UnknownKey(Hash),
    #[error("wallet file i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wallet file corrupt: {0}")]
    Corrupt(#[from] bincode::Error),
    #[error(transparent)]
    Token(#[from] TokenError),
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    pub public_key: PublicKey,
    pub address: String,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        let private_key = PrivateKey::from_bytes(bytes).map_err(|_| WalletError::InvalidKey)?;
        Ok(Self::from_private_key(private_key))
    }

    fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        let address = public_key.to_address();
        Self { private_key, public_key, address }
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.private_key.to_bytes()
    }

    /// Owner id used in outputs
    pub fn pubkey_hash(&self) -> Hash {
        self.public_key.key_id()
    }

    pub fn sign(&self, message: &Hash) -> SchnorrSignature {
        self.private_key.sign(message)
    }
}

/// A wallet coin that could be staked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeCandidate {
    pub outpoint: OutPoint,
    pub coin: UTXO,
}

#[derive(Debug, Default)]
pub struct Wallet {
    /// pubkey_hash -> keypair
    keys: HashMap<Hash, KeyPair>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate_key(&mut self) -> &KeyPair {
        self.insert(KeyPair::generate())
    }

    pub fn import_key(&mut self, bytes: &[u8; 32]) -> Result<&KeyPair, WalletError> {
        Ok(self.insert(KeyPair::from_private_key_bytes(bytes)?))
    }

    fn insert(&mut self, keypair: KeyPair) -> &KeyPair {
        self.keys.entry(keypair.pubkey_hash()).or_insert(keypair)
    }

    pub fn key(&self, pubkey_hash: &Hash) -> Option<&KeyPair> {
        self.keys.get(pubkey_hash)
    }

    pub fn get_key_for_address(&self, address: &str) -> Option<&KeyPair> {
        let pubkey_hash = super::address_to_pubkey_hash(address).ok()?;
        self.keys.get(&pubkey_hash)
    }

    /// Key ids in a stable order
    pub fn get_pubkey_hashes(&self) -> Vec<Hash> {
        let mut hashes: Vec<Hash> = self.keys.keys().copied().collect();
        hashes.sort();
        hashes
    }

    pub fn get_addresses(&self) -> Vec<&str> {
        self.keys.values().map(|kp| kp.address.as_str()).collect()
    }

    pub fn get_balance(&self, utxo_set: &UTXOSet) -> u64 {
        self.keys.keys().fold(0u64, |total, pkh| total.saturating_add(utxo_set.get_balance(pkh)))
    }

    /// Every non-zero coin this wallet could stake, ordered by outpoint
    pub fn stake_candidates(&self, utxo_set: &UTXOSet) -> Vec<StakeCandidate> {
        let mut candidates: Vec<StakeCandidate> = self
            .get_pubkey_hashes()
            .iter()
            .flat_map(|pkh| utxo_set.get_by_pubkey_hash(pkh))
            .filter(|(_, coin)| coin.amount > 0)
            .map(|(outpoint, coin)| StakeCandidate { outpoint, coin: coin.clone() })
            .collect();
        candidates.sort_by_key(|c| c.outpoint);
        candidates
    }

    /// Signed coinstake spending `candidate` and paying it back with `reward`
    pub fn create_coinstake(&self, candidate: &StakeCandidate, reward: u64) -> Result<Transaction, WalletError> {
        let keypair = self
            .keys
            .get(&candidate.coin.pubkey_hash)
            .ok_or(WalletError::UnknownKey(candidate.coin.pubkey_hash))?;

        let mut tx = Transaction::new(
            vec![TxInput::unsigned(candidate.outpoint, keypair.public_key.clone())],
            vec![
                TxOutput::empty(),
                TxOutput::new(candidate.coin.amount.saturating_add(reward), keypair.pubkey_hash()),
            ],
        );
        tx.inputs[0].signature = keypair.sign(&tx.signing_hash());
        Ok(tx)
    }

    /// Pick coins covering `total_needed`; at least one coin is always spent
    fn select_coins(&self, utxo_set: &UTXOSet, total_needed: u64) -> Result<(Vec<(OutPoint, &KeyPair)>, u64), WalletError> {
        let mut selected: Vec<(OutPoint, &KeyPair)> = Vec::new();
        let mut total_input: u64 = 0;
        'select: for pubkey_hash in &self.get_pubkey_hashes() {
            let keypair = &self.keys[pubkey_hash];
            for (outpoint, utxo) in utxo_set.get_by_pubkey_hash(pubkey_hash) {
                if total_input >= total_needed && !selected.is_empty() {
                    break 'select;
                }
                // zero-value coins carry tokens
                if utxo.amount == 0 {
                    continue;
                }
                selected.push((outpoint, keypair));
                total_input = total_input.saturating_add(utxo.amount);
            }
        }

        if total_input < total_needed || selected.is_empty() {
            return Err(WalletError::InsufficientFunds { have: total_input, need: total_needed.max(1) });
        }
        Ok((selected, total_input))
    }

    fn sign_inputs(selected: &[(OutPoint, &KeyPair)], outputs: Vec<TxOutput>) -> Transaction {
        let inputs = selected
            .iter()
            .map(|(outpoint, keypair)| TxInput::unsigned(*outpoint, keypair.public_key.clone()))
            .collect();
        let mut tx = Transaction::new(inputs, outputs);

        let signing_hash = tx.signing_hash();
        for (input, (_, keypair)) in tx.inputs.iter_mut().zip(selected) {
            input.signature = keypair.sign(&signing_hash);
        }
        tx
    }

    /// Create and sign a payment
    pub fn create_transaction(
        &self,
        utxo_set: &UTXOSet,
        recipient_pubkey_hash: Hash,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, WalletError> {
        let total_needed = amount.saturating_add(fee);
        let change_pubkey_hash = *self.get_pubkey_hashes().first().ok_or(WalletError::NoKeys)?;
        let (selected, total_input) = self.select_coins(utxo_set, total_needed)?;

        let mut outputs = vec![TxOutput::new(amount, recipient_pubkey_hash)];
        let change = total_input - total_needed;
        if change > 0 {
            outputs.push(TxOutput::new(change, change_pubkey_hash));
        }
        Ok(Self::sign_inputs(&selected, outputs))
    }

    /// Issue a new token named `name`, owned by the wallet's first key
    ///
    /// The token id is seeded from the first coin spent, so it cannot repeat.
    pub fn create_token_issuance(&self, utxo_set: &UTXOSet, name: &str, fee: u64) -> Result<(Transaction, Token), WalletError> {
        let owner_hash = *self.get_pubkey_hashes().first().ok_or(WalletError::NoKeys)?;
        let owner = self.keys[&owner_hash].public_key.clone();
        let (selected, total_input) = self.select_coins(utxo_set, fee)?;

        let token = Token::issuance(name, selected[0].0.hash)?;
        let mut outputs = vec![token.to_output(&owner, 0)];
        let change = total_input - fee;
        if change > 0 {
            outputs.push(TxOutput::new(change, owner_hash));
        }
        Ok((Self::sign_inputs(&selected, outputs), token))
    }

    /// Write the private keys to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        let secrets: Vec<[u8; 32]> = self
            .get_pubkey_hashes()
            .iter()
            .map(|pkh| self.keys[pkh].private_key_bytes())
            .collect();
        fs::write(path, bincode::serialize(&secrets)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let secrets: Vec<[u8; 32]> = bincode::deserialize(&fs::read(path)?)?;
        let mut wallet = Self::new();
        for secret in &secrets {
            wallet.import_key(secret)?;
        }
        Ok(wallet)
    }
}
