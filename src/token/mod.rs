//! Token module - token records, output scripts and the issuance ledger

mod ledger;
mod token;

pub use ledger::*;
pub use token::*;
