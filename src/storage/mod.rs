//! Storage module - UTXO set, block index, chain state and persistence

mod index;
mod state;
mod utxo;
pub mod db;

pub use index::*;
pub use state::*;
pub use utxo::*;
