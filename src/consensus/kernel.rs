//! Proof-of-stake kernel
//!
//! A staked output is eligible to produce a block at time `t` when
//!
//! ```text
//! H(modifier || block_from_time || prevout.hash || prevout.index || t)
//!     <= expand(bits) * amount
//! ```
//!
//! where `modifier` is the stake modifier of the block being built on and
//! `block_from_time` is the timestamp of the block that created the output.
//! The check is a pure function of its inputs, so every node reaches the
//! same verdict. Routine negatives (misaligned time, immature stake, target
//! not met) come back as `StakeError` values and never abort the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::modifier::resolve_stake_modifier;
use super::target::{hash_meets_target, weighted_target};
use crate::config::ConsensusParams;
use crate::constants::STAKE_TIMESTAMP_MASK;
use crate::crypto::{hash_bytes, Hash};
use crate::storage::{BlockIndex, ChainView};
use crate::validation::{OutPoint, Transaction};

/// Outcome of a successful kernel check, recorded in the block index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfStake {
    pub hash_proof_of_stake: Hash,
    pub target_proof_of_stake: Hash,
}

/// A staked output tried at one timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelCandidate {
    pub prevout: OutPoint,
    pub amount: u64,
    /// Timestamp of the block that created `prevout`
    pub block_from_time: u64,
    /// Candidate coinstake / block time
    pub time_tx: u64,
}

impl KernelCandidate {
    /// Serialized kernel preimage under `modifier`
    pub fn preimage(&self, modifier: &Hash) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + 8 + 32 + 4 + 8);
        bytes.extend_from_slice(&modifier.0);
        bytes.extend_from_slice(&self.block_from_time.to_le_bytes());
        bytes.extend_from_slice(&self.prevout.hash.0);
        bytes.extend_from_slice(&self.prevout.index.to_le_bytes());
        bytes.extend_from_slice(&self.time_tx.to_le_bytes());
        bytes
    }

    pub fn age(&self) -> Option<u64> {
        self.time_tx.checked_sub(self.block_from_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakeError {
    #[error("coinstake time {0} is not on the stake timestamp grid")]
    MisalignedTimestamp(u64),
    #[error("coinstake time {time_tx} precedes kernel block time {block_from_time}")]
    TimeViolation { time_tx: u64, block_from_time: u64 },
    #[error("stake age {age}s is below the minimum {min}s")]
    ImmatureStake { age: u64, min: u64 },
    #[error("stake age {age}s exceeds the maximum {max}s")]
    StaleStake { age: u64, max: u64 },
    #[error("stake amount {0} is outside the permitted range")]
    AmountOutOfRange(u64),
    #[error("compact target {0:#010x} is malformed")]
    MalformedTarget(u32),
    #[error("kernel hash {hash} exceeds target {target}")]
    TargetNotMet { hash: Hash, target: Hash },
    #[error("kernel input {0} is missing or spent")]
    MissingInput(OutPoint),
    #[error("kernel input at depth {depth}, {required} confirmations required")]
    InsufficientDepth { depth: u64, required: u64 },
    #[error("stake modifier unavailable: no ancestor at height {0}")]
    ModifierUnavailable(u64),
    #[error("transaction is not a coinstake")]
    NotCoinstake,
    #[error("coinstake kernel input signature is invalid")]
    InvalidKernelSignature,
}

impl StakeError {
    /// Outcomes that occur routinely while scanning for a kernel
    pub fn is_expected_negative(&self) -> bool {
        matches!(
            self,
            StakeError::MisalignedTimestamp(_)
                | StakeError::TimeViolation { .. }
                | StakeError::ImmatureStake { .. }
                | StakeError::StaleStake { .. }
                | StakeError::AmountOutOfRange(_)
                | StakeError::MalformedTarget(_)
                | StakeError::TargetNotMet { .. }
                | StakeError::InsufficientDepth { .. }
        )
    }
}

/// Coinstake block times must sit on the 16 second grid
pub fn check_coinstake_timestamp(height: u64, time: u64) -> bool {
    let aligned = time & STAKE_TIMESTAMP_MASK == 0;
    if !aligned {
        trace!(height, time, "coinstake timestamp off the stake grid");
    }
    aligned
}

/// Check a kernel candidate against the weighted target
pub fn check_stake_kernel_hash(
    modifier: &Hash,
    bits: u32,
    candidate: &KernelCandidate,
    params: &ConsensusParams,
) -> Result<ProofOfStake, StakeError> {
    check_stake_kernel_hash_with(modifier, bits, candidate, params, hash_bytes)
}

/// `check_stake_kernel_hash` with the kernel hash function supplied
///
/// Every cheap rejection happens before `hasher` is called.
pub fn check_stake_kernel_hash_with<F>(
    modifier: &Hash,
    bits: u32,
    candidate: &KernelCandidate,
    params: &ConsensusParams,
    mut hasher: F,
) -> Result<ProofOfStake, StakeError>
where
    F: FnMut(&[u8]) -> Hash,
{
    if candidate.time_tx & STAKE_TIMESTAMP_MASK != 0 {
        return Err(StakeError::MisalignedTimestamp(candidate.time_tx));
    }

    let age = candidate.age().ok_or(StakeError::TimeViolation {
        time_tx: candidate.time_tx,
        block_from_time: candidate.block_from_time,
    })?;
    if age < params.stake_min_age {
        return Err(StakeError::ImmatureStake { age, min: params.stake_min_age });
    }
    if age > params.stake_max_age {
        return Err(StakeError::StaleStake { age, max: params.stake_max_age });
    }

    if candidate.amount < params.stake_min_value || candidate.amount > params.stake_max_value {
        return Err(StakeError::AmountOutOfRange(candidate.amount));
    }

    let target = weighted_target(bits, candidate.amount).ok_or(StakeError::MalformedTarget(bits))?;

    let hash = hasher(&candidate.preimage(modifier));
    let target_hash = Hash::from_u256(&target);
    if !hash_meets_target(&hash, &target) {
        return Err(StakeError::TargetNotMet { hash, target: target_hash });
    }

    debug!(
        prevout = %candidate.prevout,
        time = candidate.time_tx,
        hash = %hash,
        "stake kernel meets target"
    );
    Ok(ProofOfStake { hash_proof_of_stake: hash, target_proof_of_stake: target_hash })
}

/// A kernel found for an outpoint at some timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelHit {
    pub proof: ProofOfStake,
    /// Timestamp of the block that created the staked output
    pub block_from_time: u64,
    /// Timestamp at which the kernel meets its target
    pub time: u64,
}

/// Resolve the staked coin for `prevout` on top of `prev`
fn resolve_kernel_input<V>(
    view: &V,
    prev: &BlockIndex,
    prevout: &OutPoint,
    params: &ConsensusParams,
) -> Result<(u64, u64, Hash), StakeError>
where
    V: ChainView + ?Sized,
{
    let coin = view.coin(prevout).ok_or(StakeError::MissingInput(*prevout))?;

    let depth = (prev.height + 1).saturating_sub(coin.height);
    if depth < params.stake_min_confirmations {
        return Err(StakeError::InsufficientDepth {
            depth,
            required: params.stake_min_confirmations,
        });
    }

    let block_from = view
        .ancestor(prev, coin.height)
        .ok_or(StakeError::ModifierUnavailable(coin.height))?;
    let modifier =
        resolve_stake_modifier(view, prev).ok_or(StakeError::ModifierUnavailable(prev.height))?;

    Ok((coin.amount, block_from.time, modifier))
}

/// Kernel check for one outpoint at one time, as used by the staker
///
/// Also checks the output exists unspent and has enough confirmations.
pub fn check_kernel<V>(
    view: &V,
    prev: &BlockIndex,
    bits: u32,
    time: u64,
    prevout: &OutPoint,
    params: &ConsensusParams,
) -> Result<KernelHit, StakeError>
where
    V: ChainView + ?Sized,
{
    let (amount, block_from_time, modifier) = resolve_kernel_input(view, prev, prevout, params)?;
    let candidate = KernelCandidate { prevout: *prevout, amount, block_from_time, time_tx: time };
    let proof = check_stake_kernel_hash(&modifier, bits, &candidate, params)?;
    Ok(KernelHit { proof, block_from_time, time })
}

/// Scan `window` in ascending grid-aligned steps; the first hit wins
pub fn search_kernel<V>(
    view: &V,
    prev: &BlockIndex,
    bits: u32,
    prevout: &OutPoint,
    window: std::ops::RangeInclusive<u64>,
    params: &ConsensusParams,
) -> Option<KernelHit>
where
    V: ChainView + ?Sized,
{
    let (amount, block_from_time, modifier) = match resolve_kernel_input(view, prev, prevout, params) {
        Ok(resolved) => resolved,
        Err(err) => {
            trace!(prevout = %prevout, %err, "kernel input not stakeable");
            return None;
        }
    };

    let step = STAKE_TIMESTAMP_MASK + 1;
    let mut time = window.start().checked_add(STAKE_TIMESTAMP_MASK)? & !STAKE_TIMESTAMP_MASK;
    while time <= *window.end() {
        let candidate = KernelCandidate { prevout: *prevout, amount, block_from_time, time_tx: time };
        match check_stake_kernel_hash(&modifier, bits, &candidate, params) {
            Ok(proof) => return Some(KernelHit { proof, block_from_time, time }),
            Err(StakeError::StaleStake { .. }) | Err(StakeError::MalformedTarget(_)) => return None,
            Err(_) => {}
        }
        time = time.checked_add(step)?;
    }
    None
}

/// Validate the coinstake of a block built on `prev` at `time`
pub fn check_proof_of_stake<V>(
    view: &V,
    prev: &BlockIndex,
    tx: &Transaction,
    time: u64,
    bits: u32,
    params: &ConsensusParams,
) -> Result<ProofOfStake, StakeError>
where
    V: ChainView + ?Sized,
{
    if !tx.is_coinstake() {
        return Err(StakeError::NotCoinstake);
    }

    let prevout = tx.inputs[0].prevout;
    let coin = match view.coin(&prevout) {
        Some(coin) => coin,
        None => {
            warn!(prevout = %prevout, height = prev.height + 1, "coinstake kernel input not found");
            return Err(StakeError::MissingInput(prevout));
        }
    };

    if !tx.verify_input(0, coin) {
        return Err(StakeError::InvalidKernelSignature);
    }

    let (amount, block_from_time, modifier) = resolve_kernel_input(view, prev, &prevout, params)?;
    let candidate = KernelCandidate { prevout, amount, block_from_time, time_tx: time };
    check_stake_kernel_hash(&modifier, bits, &candidate, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConsensusParams, Network};
    use crate::consensus::{compute_stake_modifier, Block};
    use crate::crypto::PrivateKey;
    use crate::storage::UTXO;
    use crate::validation::{TxInput, TxOutput};
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Expands past every kernel hash once weighted by a non-trivial amount
    const EASY_BITS: u32 = 0x2100ffff;
    /// Practically unreachable
    const HARD_BITS: u32 = 0x03000001;

    fn params() -> ConsensusParams {
        let mut params = ConsensusParams::for_network(Network::Regtest);
        params.stake_min_age = 600;
        params.stake_max_age = 30 * 24 * 60 * 60;
        params.stake_min_confirmations = 1;
        params
    }

    fn candidate(block_from_time: u64, time_tx: u64) -> KernelCandidate {
        KernelCandidate {
            prevout: OutPoint::new(hash_bytes(b"staked tx"), 1),
            amount: 1_000 * crate::constants::COIN,
            block_from_time,
            time_tx,
        }
    }

    #[test]
    fn test_kernel_check_is_deterministic() {
        let modifier = hash_bytes(b"modifier");
        let c = candidate(1_600_000_000, 1_600_000_000 + 4_096);
        let first = check_stake_kernel_hash(&modifier, 0x1d00ffff, &c, &params());
        let second = check_stake_kernel_hash(&modifier, 0x1d00ffff, &c, &params());
        assert_eq!(first, second);
    }

    #[test]
    fn test_min_age_boundary() {
        let p = params();
        let modifier = hash_bytes(b"modifier");
        let time_tx = 1_600_000_000u64 & !STAKE_TIMESTAMP_MASK;

        let exact = candidate(time_tx - p.stake_min_age, time_tx);
        assert!(check_stake_kernel_hash(&modifier, EASY_BITS, &exact, &p).is_ok());

        let young = candidate(time_tx - p.stake_min_age + 1, time_tx);
        assert_eq!(
            check_stake_kernel_hash(&modifier, EASY_BITS, &young, &p),
            Err(StakeError::ImmatureStake { age: p.stake_min_age - 1, min: p.stake_min_age })
        );
    }

    #[test]
    fn test_max_age_boundary() {
        let p = params();
        let modifier = hash_bytes(b"modifier");
        let time_tx = 1_700_000_000u64 & !STAKE_TIMESTAMP_MASK;

        let oldest = candidate(time_tx - p.stake_max_age, time_tx);
        assert!(check_stake_kernel_hash(&modifier, EASY_BITS, &oldest, &p).is_ok());

        let stale = candidate(time_tx - p.stake_max_age - 1, time_tx);
        assert!(matches!(
            check_stake_kernel_hash(&modifier, EASY_BITS, &stale, &p),
            Err(StakeError::StaleStake { .. })
        ));
    }

    #[test]
    fn test_time_before_kernel_block_is_rejected() {
        let c = candidate(1_600_000_032, 1_600_000_000);
        assert!(matches!(
            check_stake_kernel_hash(&Hash::zero(), EASY_BITS, &c, &params()),
            Err(StakeError::TimeViolation { .. })
        ));
    }

    #[test]
    fn test_misaligned_time_never_hashes() {
        let calls = Cell::new(0);
        let counting = |data: &[u8]| {
            calls.set(calls.get() + 1);
            hash_bytes(data)
        };

        let base = 1_600_000_000u64 & !STAKE_TIMESTAMP_MASK;
        for offset in 1..=STAKE_TIMESTAMP_MASK {
            let c = candidate(base - 10_000, base + offset);
            let result = check_stake_kernel_hash_with(&Hash::zero(), EASY_BITS, &c, &params(), counting);
            assert_eq!(result, Err(StakeError::MisalignedTimestamp(base + offset)));
        }
        assert_eq!(calls.get(), 0);

        let aligned = candidate(base - 10_000, base);
        assert!(check_stake_kernel_hash_with(&Hash::zero(), EASY_BITS, &aligned, &params(), counting).is_ok());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_malformed_bits_is_a_plain_negative() {
        let c = candidate(1_600_000_000 - 10_000, 1_600_000_000);
        let err = check_stake_kernel_hash(&Hash::zero(), 0x04923456, &c, &params()).unwrap_err();
        assert_eq!(err, StakeError::MalformedTarget(0x04923456));
        assert!(err.is_expected_negative());
    }

    #[test]
    fn test_target_not_met_reports_hash_and_target() {
        let c = candidate(1_600_000_000 - 10_000, 1_600_000_000);
        match check_stake_kernel_hash(&Hash::zero(), HARD_BITS, &c, &params()) {
            Err(StakeError::TargetNotMet { hash, target }) => {
                assert_eq!(hash, hash_bytes(&c.preimage(&Hash::zero())));
                assert!(hash.to_u256() > target.to_u256());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_amount_bounds() {
        let mut p = params();
        p.stake_min_value = 10;
        let mut c = candidate(1_600_000_000 - 10_000, 1_600_000_000);
        c.amount = 9;
        assert_eq!(
            check_stake_kernel_hash(&Hash::zero(), EASY_BITS, &c, &p),
            Err(StakeError::AmountOutOfRange(9))
        );
    }

    #[test]
    fn test_coinstake_timestamp_grid() {
        assert!(check_coinstake_timestamp(1001, 1_600_000_000));
        assert!(!check_coinstake_timestamp(1001, 1_600_000_001));
        assert!(!check_coinstake_timestamp(1001, 1_600_000_015));
        assert!(check_coinstake_timestamp(1001, 1_600_000_016));
    }

    #[test]
    fn test_expected_negative_classification() {
        assert!(StakeError::TargetNotMet { hash: Hash::zero(), target: Hash::zero() }.is_expected_negative());
        assert!(!StakeError::MissingInput(OutPoint::null()).is_expected_negative());
        assert!(!StakeError::ModifierUnavailable(3).is_expected_negative());
        assert!(!StakeError::InvalidKernelSignature.is_expected_negative());
    }

    /// Minimal chain service for the view-driven checks
    struct StakeChain {
        blocks: Vec<BlockIndex>,
        coins: HashMap<OutPoint, UTXO>,
    }

    impl StakeChain {
        /// Heights 0..=tip spaced `spacing` seconds apart, modifiers cached
        fn new(tip: u64, spacing: u64) -> Self {
            let mut blocks: Vec<BlockIndex> = Vec::new();
            for height in 0..=tip {
                let hash = hash_bytes(&height.to_le_bytes());
                let mut index = BlockIndex {
                    hash,
                    prev_hash: blocks.last().map(|b| b.hash).unwrap_or_default(),
                    height,
                    time: 1_600_000_000 + height * spacing,
                    bits: EASY_BITS,
                    chain_work: Hash::zero(),
                    proof_of_stake: None,
                    prevout_stake: None,
                    stake_modifier: None,
                };
                index.stake_modifier = Some(compute_stake_modifier(blocks.last(), &index.kernel()));
                blocks.push(index);
            }
            Self { blocks, coins: HashMap::new() }
        }

        fn tip_index(&self) -> BlockIndex {
            self.blocks.last().unwrap().clone()
        }
    }

    impl ChainView for StakeChain {
        fn lookup_index(&self, hash: &Hash) -> Option<&BlockIndex> {
            self.blocks.iter().find(|b| b.hash == *hash)
        }
        fn index_at(&self, height: u64) -> Option<&BlockIndex> {
            self.blocks.get(height as usize)
        }
        fn tip(&self) -> &BlockIndex {
            self.blocks.last().unwrap()
        }
        fn coin(&self, outpoint: &OutPoint) -> Option<&UTXO> {
            self.coins.get(outpoint)
        }
        fn read_block(&self, _: &BlockIndex) -> Option<Block> {
            None
        }
    }

    fn signed_coinstake(key: &PrivateKey, prevout: OutPoint, amount: u64) -> Transaction {
        let owner = key.public_key().key_id();
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(prevout, key.public_key())],
            vec![TxOutput::empty(), TxOutput::new(amount, owner)],
        );
        tx.inputs[0].signature = key.sign(&tx.signing_hash());
        tx
    }

    #[test]
    fn test_check_kernel_requires_existing_input() {
        let chain = StakeChain::new(20, 160);
        let prevout = OutPoint::new(hash_bytes(b"nowhere"), 0);
        let time = chain.tip_index().time + 16;
        assert_eq!(
            check_kernel(&chain, &chain.tip_index(), EASY_BITS, time, &prevout, &params()),
            Err(StakeError::MissingInput(prevout))
        );
    }

    #[test]
    fn test_check_kernel_enforces_confirmations() {
        let mut chain = StakeChain::new(20, 160);
        let prevout = OutPoint::new(hash_bytes(b"fresh"), 0);
        chain.coins.insert(prevout, UTXO { amount: 50, pubkey_hash: Hash::zero(), height: 19 });

        let mut p = params();
        p.stake_min_confirmations = 5;
        let time = chain.tip_index().time + 16;
        assert_eq!(
            check_kernel(&chain, &chain.tip_index(), EASY_BITS, time, &prevout, &p),
            Err(StakeError::InsufficientDepth { depth: 2, required: 5 })
        );
    }

    #[test]
    fn test_check_kernel_reports_block_from_time() {
        let mut chain = StakeChain::new(20, 160);
        let prevout = OutPoint::new(hash_bytes(b"mature"), 0);
        chain.coins.insert(prevout, UTXO { amount: 5_000, pubkey_hash: Hash::zero(), height: 3 });

        let time = chain.tip_index().time + 16;
        let hit = check_kernel(&chain, &chain.tip_index(), EASY_BITS, time, &prevout, &params()).unwrap();
        assert_eq!(hit.block_from_time, chain.blocks[3].time);
        assert_eq!(hit.time, time);
    }

    #[test]
    fn test_search_kernel_returns_first_aligned_hit() {
        let mut chain = StakeChain::new(20, 160);
        let prevout = OutPoint::new(hash_bytes(b"mature"), 0);
        chain.coins.insert(prevout, UTXO { amount: 5_000, pubkey_hash: Hash::zero(), height: 3 });

        let start = chain.tip_index().time + 1;
        let hit = search_kernel(&chain, &chain.tip_index(), EASY_BITS, &prevout, start..=start + 64, &params())
            .unwrap();
        assert_eq!(hit.time, (start + STAKE_TIMESTAMP_MASK) & !STAKE_TIMESTAMP_MASK);

        assert!(search_kernel(&chain, &chain.tip_index(), HARD_BITS, &prevout, start..=start + 64, &params())
            .is_none());
    }

    #[test]
    fn test_search_kernel_skips_immature_window() {
        let mut chain = StakeChain::new(20, 16);
        let prevout = OutPoint::new(hash_bytes(b"young"), 0);
        chain.coins.insert(prevout, UTXO { amount: 5_000, pubkey_hash: Hash::zero(), height: 18 });

        let p = params();
        let from = chain.blocks[18].time;
        let hit = search_kernel(&chain, &chain.tip_index(), EASY_BITS, &prevout, from..=from + 2 * p.stake_min_age, &p)
            .unwrap();
        // first grid time at or past the minimum age
        let mature = from + p.stake_min_age;
        assert_eq!(hit.time, (mature + STAKE_TIMESTAMP_MASK) & !STAKE_TIMESTAMP_MASK);
    }

    #[test]
    fn test_check_proof_of_stake_accepts_signed_coinstake() {
        let key = PrivateKey::generate();
        let mut chain = StakeChain::new(20, 160);
        let prevout = OutPoint::new(hash_bytes(b"stake"), 1);
        chain.coins.insert(prevout, UTXO { amount: 5_000, pubkey_hash: key.public_key().key_id(), height: 2 });

        let tx = signed_coinstake(&key, prevout, 5_100);
        let time = chain.tip_index().time + 32;
        let proof = check_proof_of_stake(&chain, &chain.tip_index(), &tx, time, EASY_BITS, &params()).unwrap();

        let expected = check_kernel(&chain, &chain.tip_index(), EASY_BITS, time, &prevout, &params()).unwrap();
        assert_eq!(proof, expected.proof);
    }

    #[test]
    fn test_check_proof_of_stake_rejects_foreign_signature() {
        let owner = PrivateKey::generate();
        let thief = PrivateKey::generate();
        let mut chain = StakeChain::new(20, 160);
        let prevout = OutPoint::new(hash_bytes(b"stake"), 1);
        chain.coins.insert(prevout, UTXO { amount: 5_000, pubkey_hash: owner.public_key().key_id(), height: 2 });

        let tx = signed_coinstake(&thief, prevout, 5_100);
        let time = chain.tip_index().time + 32;
        assert_eq!(
            check_proof_of_stake(&chain, &chain.tip_index(), &tx, time, EASY_BITS, &params()),
            Err(StakeError::InvalidKernelSignature)
        );
    }

    #[test]
    fn test_check_proof_of_stake_rejects_non_coinstake() {
        let chain = StakeChain::new(3, 160);
        let tx = Transaction::coinbase(10, Hash::zero(), 4);
        assert_eq!(
            check_proof_of_stake(&chain, &chain.tip_index(), &tx, 0, EASY_BITS, &params()),
            Err(StakeError::NotCoinstake)
        );
    }
}
