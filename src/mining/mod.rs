//! Mining module - proof-of-work mining and proof-of-stake block production

mod miner;
mod staker;

pub use miner::*;
pub use staker::*;
