//! PAC Node Core Library
//!
//! Hybrid PoW/PoS consensus: proof-of-stake kernel validation, stake
//! modifier chaining, and the storage-node behavior scoring engine that
//! folds per-block network proofs into a health registry.

pub mod behavior;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod mining;
pub mod node;
pub mod storage;
pub mod token;
pub mod validation;
pub mod wallet;

/// Protocol constants - consensus critical, not configurable
pub mod constants {
    /// Base units per coin (8 decimal places)
    pub const COIN: u64 = 100_000_000;

    /// Upper bound on any single amount
    pub const MAX_MONEY: u64 = 21_000_000 * COIN;

    /// Coinstake timestamps must have these low bits clear (16 second grid)
    pub const STAKE_TIMESTAMP_MASK: u64 = (1 << 4) - 1;

    /// Health gained by a storage node reporting active signals
    pub const SCORE_INCREASE: i32 = 10;

    /// Health lost by a registered storage node absent from a proof
    pub const SCORE_DECREASE: i32 = 5;

    /// Health ceiling, also the health of a newly sighted node
    pub const HEALTH_MAX: i32 = 100;

    /// Health floor
    pub const HEALTH_MIN: i32 = 0;

    /// Chain name (short form for addresses)
    pub const CHAIN_NAME: &str = "PAC";

    /// Genesis coinbase message
    pub const GENESIS_MESSAGE: &str =
        "pacprotocol aug2022 ~ setting the standard for masternode technology";
}
