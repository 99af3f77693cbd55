//! Storage-node behavior scoring
//!
//! Folds the network proof of every post-PoW block into a health score per
//! storage node. A node listed with active signals gains `SCORE_INCREASE`,
//! a listed node without them is left alone, and every registered node
//! missing from the proof loses `SCORE_DECREASE`. Health stays in
//! `[HEALTH_MIN, HEALTH_MAX]` and each height is folded in at most once.
//!
//! The registry is memory only. It is rebuilt from block data by `init`
//! at startup and after a reorg, since a folded proof cannot be undone.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::{debug, info};

use super::NetworkProof;
use crate::config::ConsensusParams;
use crate::constants::{HEALTH_MAX, HEALTH_MIN, SCORE_DECREASE, SCORE_INCREASE};
use crate::storage::ChainView;

#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error("block at height {0} unavailable for behavior replay")]
    MissingBlock(u64),
}

/// Score record for one storage node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHistory {
    pub ipaddr: u32,
    /// Declared space at first sighting
    pub space: u64,
    pub health: i32,
}

impl NodeHistory {
    pub fn addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ipaddr)
    }
}

#[derive(Debug, Default)]
pub struct NodeBehavior {
    nodes: HashMap<u32, NodeHistory>,
    seen: BTreeSet<u64>,
}

impl NodeBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the active chain: every height past the last PoW block
    pub fn init<V>(&mut self, view: &V, params: &ConsensusParams) -> Result<(), BehaviorError>
    where
        V: ChainView + ?Sized,
    {
        self.nodes.clear();
        self.seen.clear();

        let tip = view.tip().height;
        if tip <= params.last_pow_block {
            return Ok(());
        }

        for height in params.last_pow_block + 1..=tip {
            let block = view
                .index_at(height)
                .and_then(|index| view.read_block(index))
                .ok_or(BehaviorError::MissingBlock(height))?;
            if let Some(proof) = &block.net_proof {
                self.add_proof(proof);
            }
        }

        info!(target: "storage", nodes = self.nodes.len(), tip, "behavior registry rebuilt");
        Ok(())
    }

    /// Fold one proof in; `false` if its height was already processed
    pub fn add_proof(&mut self, proof: &NetworkProof) -> bool {
        let height = proof.height;
        if self.have_seen(height) {
            return false;
        }

        let mut seen_nodes = HashSet::new();
        for node in proof.nodes() {
            let entry = self.nodes.entry(node.ip).or_insert(NodeHistory {
                ipaddr: node.ip,
                space: node.space,
                health: HEALTH_MAX,
            });
            if node.is_active() {
                entry.health = (entry.health + SCORE_INCREASE).min(HEALTH_MAX);
            }
            seen_nodes.insert(node.ip);
            debug!(target: "storage", height, ip = %node.addr(), score = entry.health, "node sighted");
        }

        for entry in self.nodes.values_mut() {
            if seen_nodes.contains(&entry.ipaddr) {
                continue;
            }
            entry.health = (entry.health - SCORE_DECREASE).max(HEALTH_MIN);
            debug!(target: "storage", height, ip = %entry.addr(), score = entry.health, "node absent");
        }

        self.set_seen(height);
        true
    }

    pub fn have_seen(&self, height: u64) -> bool {
        self.seen.contains(&height)
    }

    pub fn set_seen(&mut self, height: u64) {
        self.seen.insert(height);
    }

    pub fn have_node(&self, ipaddr: u32) -> bool {
        self.nodes.contains_key(&ipaddr)
    }

    pub fn node(&self, ipaddr: u32) -> Option<&NodeHistory> {
        self.nodes.get(&ipaddr)
    }

    /// Overwrite the record with the same address; `false` if there is none
    pub fn replace_node(&mut self, history: NodeHistory) -> bool {
        match self.nodes.get_mut(&history.ipaddr) {
            Some(existing) => {
                *existing = history;
                true
            }
            None => false,
        }
    }

    /// Register a node; `false` if the address is already known
    pub fn add_node(&mut self, history: NodeHistory) -> bool {
        if self.have_node(history.ipaddr) {
            return false;
        }
        self.nodes.insert(history.ipaddr, history);
        true
    }

    /// All records, ordered by address
    pub fn nodes(&self) -> Vec<NodeHistory> {
        let mut nodes: Vec<_> = self.nodes.values().copied().collect();
        nodes.sort_by_key(|n| n.ipaddr);
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
