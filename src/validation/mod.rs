//! Validation module - transactions and outpoints

mod transaction;

pub use transaction::*;
