//! Chain service
//!
//! Owns the chain state, its on-disk copy, the storage-node behavior
//! registry and the token ledger, and keeps them in step as blocks are
//! connected and disconnected. A failed write is rolled back in memory so
//! the node never runs ahead of its store.

use thiserror::Error;
use tracing::{info, warn};

use super::genesis::create_genesis_block;
use crate::behavior::{BehaviorError, NodeBehavior};
use crate::config::{ConfigError, ConsensusParams, NodeConfig};
use crate::consensus::{check_block, contextual_check_block, Block, ProofOfStake, ValidationError};
use crate::crypto::Hash;
use crate::storage::db::{BlockStore, ChainDB, DbError};
use crate::storage::{BlockIndex, ChainState, ChainView, StateError};
use crate::token::{Token, TokenError, TokenLedger};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("invalid block: {0}")]
    Invalid(#[from] ValidationError),
    #[error("invalid token output: {0}")]
    Token(#[from] TokenError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Behavior(#[from] BehaviorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("stored genesis {stored} does not match {expected}")]
    GenesisMismatch { stored: Hash, expected: Hash },
}

pub struct Node {
    params: ConsensusParams,
    chain: ChainState,
    behavior: NodeBehavior,
    tokens: TokenLedger,
    db: Box<dyn BlockStore>,
}

impl Node {
    /// Open the node's database under the configured data directory
    pub fn open(config: &NodeConfig) -> Result<Self, NodeError> {
        let params = config.consensus_params()?;
        config.ensure_directories()?;
        let db = ChainDB::open(config.data_dir.join("chain"))?;
        Self::with_db(db, params)
    }

    /// Load the stored chain, replay it and rebuild the behavior registry
    /// and token ledger
    ///
    /// Stored blocks were validated when first connected and are not
    /// checked again.
    pub fn with_db<S: BlockStore + 'static>(db: S, params: ConsensusParams) -> Result<Self, NodeError> {
        let genesis = create_genesis_block(&params);
        let mut chain = ChainState::new(&genesis);
        let mut tokens = TokenLedger::new();

        match db.hash_at(0)? {
            Some(stored) if stored != genesis.hash() => {
                return Err(NodeError::GenesisMismatch { stored, expected: genesis.hash() });
            }
            Some(_) => {}
            None => db.save_block(&genesis, chain.tip())?,
        }

        for (index, block) in db.load_chain()? {
            chain.apply_block(&block, index.proof_of_stake)?;
            let issued = tokens.check_block(&block, index.height)?;
            tokens.connect(issued, index.height);
        }

        let mut behavior = NodeBehavior::new();
        behavior.init(&chain, &params)?;

        info!(
            network = %params.network,
            height = chain.height(),
            tip = %chain.tip_hash(),
            storage_nodes = behavior.len(),
            tokens = tokens.len(),
            "chain loaded"
        );
        Ok(Self { params, chain, behavior, tokens, db: Box::new(db) })
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn chain(&self) -> &ChainState {
        &self.chain
    }

    pub fn behavior(&self) -> &NodeBehavior {
        &self.behavior
    }

    pub fn tokens(&self) -> &TokenLedger {
        &self.tokens
    }

    pub fn height(&self) -> u64 {
        self.chain.height()
    }

    /// Validate and connect a block on top of the tip
    ///
    /// Nothing changes unless the block is also written to the store.
    pub fn process_block(&mut self, block: &Block) -> Result<BlockIndex, NodeError> {
        let hash = block.hash();
        let (kernel, issued) = match self.validate(block) {
            Ok(checked) => checked,
            Err(err) => {
                info!(%hash, %err, "block rejected");
                return Err(err);
            }
        };

        let index = self.chain.apply_block(block, kernel)?.clone();
        if let Err(err) = self.db.save_block(block, &index) {
            warn!(height = index.height, %hash, %err, "block not persisted, disconnecting");
            self.chain.revert_tip()?;
            return Err(err.into());
        }

        self.tokens.connect(issued, index.height);
        if index.height > self.params.last_pow_block {
            if let Some(proof) = &block.net_proof {
                self.behavior.add_proof(proof);
            }
        }

        info!(height = index.height, %hash, pos = index.is_proof_of_stake(), "block accepted");
        Ok(index)
    }

    fn validate(&self, block: &Block) -> Result<(Option<ProofOfStake>, Vec<Token>), NodeError> {
        check_block(block, &self.params)?;
        let kernel = contextual_check_block(&self.chain, self.chain.tip(), block, &self.params)?;
        let issued = self.tokens.check_block(block, self.chain.height() + 1)?;
        Ok((kernel, issued))
    }

    /// Disconnect the tip; the behavior registry is rebuilt from what remains
    ///
    /// If the store cannot drop the block it is reconnected in memory.
    pub fn disconnect_tip(&mut self) -> Result<Block, NodeError> {
        let height = self.chain.height();
        let kernel = self.chain.tip().proof_of_stake;
        let block = self.chain.revert_tip()?;

        if let Err(err) = self.db.remove_tip(height, &self.chain.tip_hash()) {
            warn!(height, %err, "tip removal not persisted, reconnecting");
            self.chain.apply_block(&block, kernel)?;
            return Err(err.into());
        }

        self.tokens.disconnect_block(&block);
        if height > self.params.last_pow_block {
            if let Err(err) = self.behavior.init(&self.chain, &self.params) {
                warn!(target: "storage", %err, "behavior rebuild failed");
                return Err(err.into());
            }
        }
        Ok(block)
    }
}
