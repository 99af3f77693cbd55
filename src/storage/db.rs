//! Block persistence on sled
//!
//! Blocks and their index records are stored keyed by hash, with a height
//! table for the active chain. The UTXO set, stake modifiers and behavior
//! registry are rebuilt by replaying blocks on open.

use std::path::Path;

use sled::{Db, Tree};
use thiserror::Error;

use crate::consensus::Block;
use crate::crypto::Hash;
use crate::storage::BlockIndex;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("height table references unknown block {0}")]
    MissingBlock(Hash),
}

/// Persistence the node writes through
pub trait BlockStore: Send {
    /// Persist a connected block as the new tip
    fn save_block(&self, block: &Block, index: &BlockIndex) -> Result<(), DbError>;

    /// Forget the tip at `height`; `new_tip` becomes the tip
    fn remove_tip(&self, height: u64, new_tip: &Hash) -> Result<(), DbError>;

    /// Active-chain block hash at `height`
    fn hash_at(&self, height: u64) -> Result<Option<Hash>, DbError>;

    /// Stored active chain above genesis, in height order
    fn load_chain(&self) -> Result<Vec<(BlockIndex, Block)>, DbError>;
}

#[derive(Debug, Clone)]
pub struct ChainDB {
    db: Db,
    blocks_tree: Tree,
    index_tree: Tree,
    heights_tree: Tree,
    metadata_tree: Tree,
}

const TIP_KEY: &str = "tip_hash";

impl ChainDB {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Self::from_db(sled::open(path)?)
    }

    /// Throwaway database, removed on drop
    pub fn temporary() -> Result<Self, DbError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self, DbError> {
        Ok(Self {
            blocks_tree: db.open_tree("blocks")?,
            index_tree: db.open_tree("block_index")?,
            heights_tree: db.open_tree("heights")?,
            metadata_tree: db.open_tree("metadata")?,
            db,
        })
    }

    /// Persist a connected block as the new tip
    pub fn save_block(&self, block: &Block, index: &BlockIndex) -> Result<(), DbError> {
        let key = index.hash.0;
        self.blocks_tree.insert(key, bincode::serialize(block)?)?;
        self.index_tree.insert(key, bincode::serialize(index)?)?;
        self.heights_tree.insert(index.height.to_be_bytes(), &key[..])?;
        self.metadata_tree.insert(TIP_KEY, &key[..])?;
        self.db.flush()?;
        Ok(())
    }

    /// Forget the tip at `height`; `new_tip` becomes the tip
    pub fn remove_tip(&self, height: u64, new_tip: &Hash) -> Result<(), DbError> {
        if let Some(hash) = self.heights_tree.remove(height.to_be_bytes())? {
            self.blocks_tree.remove(&hash)?;
            self.index_tree.remove(&hash)?;
        }
        self.metadata_tree.insert(TIP_KEY, &new_tip.0[..])?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get_block(&self, hash: &Hash) -> Result<Option<Block>, DbError> {
        match self.blocks_tree.get(hash.0)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_index(&self, hash: &Hash) -> Result<Option<BlockIndex>, DbError> {
        match self.index_tree.get(hash.0)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Active-chain block hash at `height`
    pub fn hash_at(&self, height: u64) -> Result<Option<Hash>, DbError> {
        Ok(self.heights_tree.get(height.to_be_bytes())?.and_then(|bytes| {
            let bytes: [u8; 32] = bytes[..].try_into().ok()?;
            Some(Hash(bytes))
        }))
    }

    pub fn tip(&self) -> Result<Option<Hash>, DbError> {
        Ok(self.metadata_tree.get(TIP_KEY)?.and_then(|bytes| {
            let bytes: [u8; 32] = bytes[..].try_into().ok()?;
            Some(Hash(bytes))
        }))
    }

    /// Stored active chain above genesis, in height order
    pub fn load_chain(&self) -> Result<Vec<(BlockIndex, Block)>, DbError> {
        let mut chain = Vec::new();
        // big-endian height keys iterate in height order
        for item in self.heights_tree.range(1u64.to_be_bytes()..) {
            let (_, value) = item?;
            let hash = match <[u8; 32]>::try_from(&value[..]) {
                Ok(bytes) => Hash(bytes),
                Err(_) => continue,
            };
            let index = self.get_index(&hash)?.ok_or(DbError::MissingBlock(hash))?;
            let block = self.get_block(&hash)?.ok_or(DbError::MissingBlock(hash))?;
            chain.push((index, block));
        }
        Ok(chain)
    }
}

impl BlockStore for ChainDB {
    fn save_block(&self, block: &Block, index: &BlockIndex) -> Result<(), DbError> {
        ChainDB::save_block(self, block, index)
    }

    fn remove_tip(&self, height: u64, new_tip: &Hash) -> Result<(), DbError> {
        ChainDB::remove_tip(self, height, new_tip)
    }

    fn hash_at(&self, height: u64) -> Result<Option<Hash>, DbError> {
        ChainDB::hash_at(self, height)
    }

    fn load_chain(&self) -> Result<Vec<(BlockIndex, Block)>, DbError> {
        ChainDB::load_chain(self)
    }
}
