//! Block acceptance
//!
//! `check_block` covers everything decidable from the block alone;
//! `contextual_check_block` adds the rules that need the parent and the
//! coin view: height gating, retarget, the stake kernel, inputs and payout.

use std::collections::HashSet;

use thiserror::Error;

use super::difficulty::next_target_required;
use super::kernel::{check_coinstake_timestamp, check_proof_of_stake, StakeError};
use super::rewards::max_block_payout;
use super::signature::check_block_signature;
use super::target::check_proof_of_work;
use super::{Block, ProofOfStake};
use crate::behavior::ProofError;
use crate::config::ConsensusParams;
use crate::crypto::{compute_merkle_root, Hash};
use crate::storage::{BlockIndex, ChainView};
use crate::validation::OutPoint;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("block has no coinbase")]
    MissingCoinbase,
    #[error("coinbase or coinstake at unexpected position {0}")]
    MisplacedTransaction(usize),
    #[error("merkle root mismatch")]
    BadMerkleRoot,
    #[error("transaction {0} appears twice")]
    DuplicateTransaction(Hash),
    #[error("header does not commit to the carried network proof")]
    BadProofHash,
    #[error("network proof names height {found}, block is at {expected}")]
    ProofHeightMismatch { expected: u64, found: u64 },
    #[error("invalid network proof: {0}")]
    InvalidNetworkProof(#[from] ProofError),
    #[error("block signature invalid")]
    BadSignature,
    #[error("proof of work does not meet target")]
    HighHash,
    #[error("previous block mismatch")]
    BadPrevHash,
    #[error("incorrect difficulty bits {found:#010x}, expected {expected:#010x}")]
    BadBits { expected: u32, found: u32 },
    #[error("timestamp {time} not after parent time {prev_time}")]
    TimeTooOld { time: u64, prev_time: u64 },
    #[error("PoW block at height {0} is past the last PoW block")]
    PowAfterLastPowBlock(u64),
    #[error("PoS block at height {0} is before staking starts")]
    PosBeforeLastPowBlock(u64),
    #[error("coinstake timestamp {time} invalid at height {height}")]
    CoinstakeTimestamp { height: u64, time: u64 },
    #[error("proof of stake rejected: {0}")]
    InvalidProofOfStake(#[from] StakeError),
    #[error("input {0} missing or spent")]
    MissingInput(OutPoint),
    #[error("input {0} spent twice in block")]
    DoubleSpend(OutPoint),
    #[error("transaction {0} has an invalid signature")]
    BadTransactionSignature(Hash),
    #[error("transaction {0} spends more than its inputs")]
    Overspend(Hash),
    #[error("block pays {paid}, at most {allowed} allowed")]
    BadReward { paid: u64, allowed: u64 },
}

/// Structural checks that need no chain context
pub fn check_block(block: &Block, params: &ConsensusParams) -> Result<(), ValidationError> {
    match block.transactions.first() {
        Some(tx) if tx.is_coinbase() => {}
        _ => return Err(ValidationError::MissingCoinbase),
    }
    for (position, tx) in block.transactions.iter().enumerate().skip(1) {
        if tx.is_coinbase() || (tx.is_coinstake() && position != 1) {
            return Err(ValidationError::MisplacedTransaction(position));
        }
    }

    let tx_hashes: Vec<Hash> = block.transactions.iter().map(|tx| tx.hash()).collect();
    let mut unique = HashSet::with_capacity(tx_hashes.len());
    if let Some(repeated) = tx_hashes.iter().find(|hash| !unique.insert(**hash)) {
        return Err(ValidationError::DuplicateTransaction(*repeated));
    }
    if compute_merkle_root(&tx_hashes) != block.header.merkle_root {
        return Err(ValidationError::BadMerkleRoot);
    }

    if block.header.proof_hash != block.expected_proof_hash() {
        return Err(ValidationError::BadProofHash);
    }
    if let Some(proof) = &block.net_proof {
        proof.check()?;
    }

    if !check_block_signature(block) {
        return Err(ValidationError::BadSignature);
    }

    if !block.is_proof_of_stake() && !check_proof_of_work(&block.hash(), block.header.bits, &params.pow_limit) {
        return Err(ValidationError::HighHash);
    }

    Ok(())
}

/// Rules that depend on the parent block and the coin view
///
/// Returns the kernel proof for PoS blocks.
pub fn contextual_check_block<V>(
    view: &V,
    prev: &BlockIndex,
    block: &Block,
    params: &ConsensusParams,
) -> Result<Option<ProofOfStake>, ValidationError>
where
    V: ChainView + ?Sized,
{
    let height = prev.height + 1;
    let proof_of_stake = block.is_proof_of_stake();
    let time = block.header.timestamp;

    if block.header.prev_hash != prev.hash {
        return Err(ValidationError::BadPrevHash);
    }
    if !proof_of_stake && height > params.last_pow_block {
        return Err(ValidationError::PowAfterLastPowBlock(height));
    }
    if proof_of_stake && height <= params.last_pow_block {
        return Err(ValidationError::PosBeforeLastPowBlock(height));
    }

    let expected = next_target_required(view, prev, proof_of_stake, params);
    if block.header.bits != expected {
        return Err(ValidationError::BadBits { expected, found: block.header.bits });
    }

    if time <= prev.time {
        return Err(ValidationError::TimeTooOld { time, prev_time: prev.time });
    }

    if let Some(proof) = &block.net_proof {
        if proof.height != height {
            return Err(ValidationError::ProofHeightMismatch { expected: height, found: proof.height });
        }
    }

    let kernel = match block.coinstake() {
        Some(coinstake) => {
            if !check_coinstake_timestamp(height, time) {
                return Err(ValidationError::CoinstakeTimestamp { height, time });
            }
            Some(check_proof_of_stake(view, prev, coinstake, time, block.header.bits, params)?)
        }
        None => None,
    };

    let mut spent = HashSet::new();
    let mut fees: u64 = 0;
    let mut minted: u64 = block.transactions[0].total_output_value();

    for tx in block.transactions.iter().skip(1) {
        let mut input_value: u64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            if !spent.insert(input.prevout) {
                return Err(ValidationError::DoubleSpend(input.prevout));
            }
            let coin = view.coin(&input.prevout).ok_or(ValidationError::MissingInput(input.prevout))?;
            if !tx.verify_input(index, coin) {
                return Err(ValidationError::BadTransactionSignature(tx.hash()));
            }
            input_value = input_value.saturating_add(coin.amount);
        }

        let output_value = tx.total_output_value();
        if tx.is_coinstake() {
            minted = minted.saturating_add(output_value.saturating_sub(input_value));
        } else if output_value > input_value {
            return Err(ValidationError::Overspend(tx.hash()));
        } else {
            fees = fees.saturating_add(input_value - output_value);
        }
    }

    let allowed = max_block_payout(height, proof_of_stake, fees, params);
    if minted > allowed {
        return Err(ValidationError::BadReward { paid: minted, allowed });
    }

    Ok(kernel)
}
