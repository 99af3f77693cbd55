//! Block subsidy schedule
//!
//! Flat subsidies: mined blocks pay 50 coins, staked blocks pay a 5 coin
//! stake reward. Either may additionally claim the fees of the block.

use crate::config::ConsensusParams;
use crate::constants::COIN;

pub const POW_SUBSIDY: u64 = 50 * COIN;

pub const POS_SUBSIDY: u64 = 5 * COIN;

/// Newly minted value allowed at `height`
pub fn block_subsidy(height: u64, proof_of_stake: bool, params: &ConsensusParams) -> u64 {
    if height == 0 {
        return 0;
    }
    if proof_of_stake {
        POS_SUBSIDY
    } else if height <= params.last_pow_block {
        POW_SUBSIDY
    } else {
        0
    }
}

/// Upper bound on what a block may pay out beyond its inputs
pub fn max_block_payout(height: u64, proof_of_stake: bool, fees: u64, params: &ConsensusParams) -> u64 {
    block_subsidy(height, proof_of_stake, params).saturating_add(fees)
}
