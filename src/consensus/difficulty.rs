//! Difficulty retargeting
//!
//! Per-block exponential retarget, computed separately for the PoW and PoS
//! chains:
//!
//! ```text
//! new = prev * ((interval - 1) * spacing + 2 * actual) / ((interval + 1) * spacing)
//! ```
//!
//! where `actual` is the spacing between the last two blocks of the same
//! kind and `interval = timespan / spacing`.

use primitive_types::{U256, U512};
use tracing::trace;

use super::target::{compact_from_target, expand_compact};
use crate::config::ConsensusParams;
use crate::storage::{BlockIndex, ChainView};

/// Most recent block at or before `index` of the requested kind
///
/// Stops at genesis when no such block exists.
pub fn last_block_of_kind<'a, V>(view: &'a V, index: &'a BlockIndex, proof_of_stake: bool) -> &'a BlockIndex
where
    V: ChainView + ?Sized,
{
    let mut cursor = index;
    while !cursor.is_genesis() && cursor.is_proof_of_stake() != proof_of_stake {
        match view.lookup_index(&cursor.prev_hash) {
            Some(parent) => cursor = parent,
            None => break,
        }
    }
    cursor
}

/// Compact target required of the block following `prev`
pub fn next_target_required<V>(view: &V, prev: &BlockIndex, proof_of_stake: bool, params: &ConsensusParams) -> u32
where
    V: ChainView + ?Sized,
{
    let limit = if proof_of_stake { params.pos_limit } else { params.pow_limit };
    let limit_bits = compact_from_target(&limit);

    let last = last_block_of_kind(view, prev, proof_of_stake);
    if last.is_genesis() {
        return limit_bits;
    }
    if !proof_of_stake && params.pow_no_retargeting {
        return last.bits;
    }

    let Some(before) = view
        .lookup_index(&last.prev_hash)
        .map(|parent| last_block_of_kind(view, parent, proof_of_stake))
    else {
        return limit_bits;
    };
    if before.is_genesis() {
        return limit_bits;
    }

    let spacing = if proof_of_stake { params.pos_target_spacing } else { params.pow_target_spacing }.max(1);
    let timespan = if proof_of_stake { params.pos_target_timespan } else { params.pow_target_timespan };
    let interval = (timespan / spacing).max(1);

    let actual = match last.time.checked_sub(before.time) {
        Some(actual) => actual.min(spacing.saturating_mul(10)),
        None => spacing,
    };

    let Some(prev_target) = expand_compact(last.bits) else {
        return limit_bits;
    };

    // products of two u64 values cannot overflow 256 bits
    let numerator = U256::from(interval - 1) * U256::from(spacing) + U256::from(actual) * U256::from(2u8);
    let denominator = U512::from((U256::from(interval) + U256::one()) * U256::from(spacing));
    let scaled = prev_target.full_mul(numerator) / denominator;

    let next = match U256::try_from(scaled) {
        Ok(next) if !next.is_zero() && next <= limit => next,
        _ => limit,
    };

    trace!(height = prev.height + 1, proof_of_stake, actual, bits = compact_from_target(&next), "retarget");
    compact_from_target(&next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::consensus::{Block, ProofOfStake};
    use crate::crypto::{hash_bytes, Hash};
    use crate::storage::UTXO;
    use crate::validation::OutPoint;

    struct Line(Vec<BlockIndex>);

    impl Line {
        /// Blocks after genesis as (pos, seconds since parent, bits)
        fn build(blocks: &[(bool, u64, u32)]) -> Self {
            let mut line = vec![BlockIndex {
                hash: hash_bytes(b"genesis"),
                prev_hash: Hash::zero(),
                height: 0,
                time: 1_659_283_200,
                bits: 0x1f00ffff,
                chain_work: Hash::zero(),
                proof_of_stake: None,
                prevout_stake: None,
                stake_modifier: Some(Hash::zero()),
            }];
            for (pos, gap, bits) in blocks {
                let parent = line.last().unwrap().clone();
                let height = parent.height + 1;
                line.push(BlockIndex {
                    hash: hash_bytes(&height.to_le_bytes()),
                    prev_hash: parent.hash,
                    height,
                    time: parent.time + gap,
                    bits: *bits,
                    chain_work: Hash::zero(),
                    proof_of_stake: pos.then(|| ProofOfStake {
                        hash_proof_of_stake: hash_bytes(b"k"),
                        target_proof_of_stake: Hash::zero(),
                    }),
                    prevout_stake: None,
                    stake_modifier: None,
                });
            }
            Line(line)
        }
    }

    impl ChainView for Line {
        fn lookup_index(&self, hash: &Hash) -> Option<&BlockIndex> {
            self.0.iter().find(|b| b.hash == *hash)
        }
        fn index_at(&self, height: u64) -> Option<&BlockIndex> {
            self.0.get(height as usize)
        }
        fn tip(&self) -> &BlockIndex {
            self.0.last().unwrap()
        }
        fn coin(&self, _: &OutPoint) -> Option<&UTXO> {
            None
        }
        fn read_block(&self, _: &BlockIndex) -> Option<Block> {
            None
        }
    }

    const BITS: u32 = 0x1e00ffff;

    #[test]
    fn test_first_blocks_use_limit() {
        let params = ConsensusParams::for_network(Network::Main);
        let line = Line::build(&[(false, 150, BITS)]);
        assert_eq!(
            next_target_required(&line, line.tip(), false, &params),
            compact_from_target(&params.pow_limit)
        );
        // first PoS block
        assert_eq!(
            next_target_required(&line, line.tip(), true, &params),
            compact_from_target(&params.pos_limit)
        );
    }

    #[test]
    fn test_on_schedule_keeps_target() {
        let params = ConsensusParams::for_network(Network::Main);
        let line = Line::build(&[(false, 150, BITS), (false, 150, BITS), (false, 150, BITS)]);
        assert_eq!(next_target_required(&line, line.tip(), false, &params), BITS);
    }

    #[test]
    fn test_fast_blocks_tighten_slow_blocks_relax() {
        let params = ConsensusParams::for_network(Network::Main);
        let base = expand_compact(BITS).unwrap();

        let fast = Line::build(&[(false, 150, BITS), (false, 150, BITS), (false, 10, BITS)]);
        let fast_next = expand_compact(next_target_required(&fast, fast.tip(), false, &params)).unwrap();
        assert!(fast_next < base);

        let slow = Line::build(&[(false, 150, BITS), (false, 150, BITS), (false, 900, BITS)]);
        let slow_next = expand_compact(next_target_required(&slow, slow.tip(), false, &params)).unwrap();
        assert!(slow_next > base);
    }

    #[test]
    fn test_pos_retarget_ignores_pow_blocks() {
        let params = ConsensusParams::for_network(Network::Main);
        let pos_bits = 0x1c00ffff;
        let line = Line::build(&[
            (false, 150, BITS),
            (true, 150, pos_bits),
            (false, 150, BITS),
            (true, 150, pos_bits),
        ]);
        // PoS spacing measured between the two PoS blocks is 300s
        let next = expand_compact(next_target_required(&line, line.tip(), true, &params)).unwrap();
        assert!(next > expand_compact(pos_bits).unwrap());
    }

    #[test]
    fn test_regtest_pow_does_not_retarget() {
        let params = ConsensusParams::for_network(Network::Regtest);
        let line = Line::build(&[(false, 150, 0x207fffff), (false, 150, 0x207fffff), (false, 1, 0x207fffff)]);
        assert_eq!(next_target_required(&line, line.tip(), false, &params), 0x207fffff);
    }

    #[test]
    fn test_result_is_clamped_to_limit() {
        let params = ConsensusParams::for_network(Network::Main);
        let limit_bits = compact_from_target(&params.pow_limit);
        let line = Line::build(&[(false, 150, limit_bits), (false, 150, limit_bits), (false, 1500, limit_bits)]);
        assert_eq!(next_target_required(&line, line.tip(), false, &params), limit_bits);
    }

    #[test]
    fn test_huge_spacing_does_not_overflow() {
        let mut params = ConsensusParams::for_network(Network::Devnet);
        let pos_bits = 0x1c00ffff;
        let line = Line::build(&[(true, 150, pos_bits), (true, 150, pos_bits), (true, 150, pos_bits)]);

        for spacing in [2_000_000_000_000_000_000, u64::MAX] {
            params.pos_target_spacing = spacing;
            let next = next_target_required(&line, line.tip(), true, &params);
            assert!(expand_compact(next).unwrap() <= params.pos_limit);
        }
    }
}
