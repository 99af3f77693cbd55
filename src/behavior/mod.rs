//! Behavior module - storage-network proofs and node health scoring

mod proof;
mod registry;

pub use proof::*;
pub use registry::*;
