//! Proof-of-stake block signatures
//!
//! A PoS block is signed over its header hash by the key that spent the
//! kernel input. That key must also own the first paying output of the
//! coinstake. PoW blocks carry no signature.

use crate::consensus::Block;
use crate::crypto::PrivateKey;

/// Sign a PoS block with the staking key; `false` if the key does not
/// match the coinstake
pub fn sign_block(block: &mut Block, key: &PrivateKey) -> bool {
    let Some(coinstake) = block.coinstake() else {
        return false;
    };
    let public_key = key.public_key();
    if coinstake.inputs[0].public_key != public_key || coinstake.outputs[1].pubkey_hash != public_key.key_id() {
        return false;
    }
    block.signature = Some(key.sign(&block.hash()));
    true
}

pub fn check_block_signature(block: &Block) -> bool {
    let Some(coinstake) = block.coinstake() else {
        return block.signature.is_none();
    };
    let Some(signature) = &block.signature else {
        return false;
    };

    let public_key = &coinstake.inputs[0].public_key;
    coinstake.outputs[1].pubkey_hash == public_key.key_id() && public_key.verify(&block.hash(), signature)
}
