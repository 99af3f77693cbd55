//! Consensus module - blocks, targets, stake kernel, retargeting and validation

mod block;
mod difficulty;
mod kernel;
mod modifier;
mod rewards;
mod signature;
mod target;
mod validation;

pub use block::*;
pub use difficulty::*;
pub use kernel::*;
pub use modifier::*;
pub use rewards::*;
pub use signature::*;
pub use target::*;
pub use validation::*;
