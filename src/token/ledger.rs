//! Issued-token registry, keyed by id and by name
//!
//! Driven by the chain: every token output of a block is checked before the
//! block connects, issuances are recorded with their height, and a
//! disconnected block takes its issuances with it.

use std::collections::HashMap;

use tracing::debug;

use super::{check_token_name, check_token_value, token_output_spendable, Token, TokenError, TokenKind};
use crate::consensus::Block;

#[derive(Debug, Default)]
pub struct TokenLedger {
    /// Token and the height it was issued at
    by_uid: HashMap<u64, (Token, u64)>,
    by_name: HashMap<String, u64>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issuance rules against what is already recorded
    fn check_issuance(&self, token: &Token) -> Result<(), TokenError> {
        if !token.is_issuance() {
            return Err(TokenError::NotIssuance);
        }
        check_token_name(&token.name)?;
        if self.by_name.contains_key(&token.name) {
            return Err(TokenError::DuplicateName(token.name.clone()));
        }
        if self.by_uid.contains_key(&token.uid) {
            return Err(TokenError::DuplicateId(token.uid));
        }
        Ok(())
    }

    /// Check the token outputs of a block connecting at `height`
    ///
    /// Returns the new issuances, origin transaction filled in, ready for
    /// [`TokenLedger::connect`]. Transfers must name a recorded token whose
    /// issuance is mature.
    pub fn check_block(&self, block: &Block, height: u64) -> Result<Vec<Token>, TokenError> {
        let mut issued: Vec<Token> = Vec::new();

        for tx in &block.transactions {
            for output in tx.outputs.iter().filter(|output| output.is_token()) {
                check_token_value(output.amount)?;
                let (mut token, owner) = Token::from_script(&output.script)?;
                if owner.key_id() != output.pubkey_hash {
                    return Err(TokenError::OwnerMismatch);
                }

                match token.kind {
                    TokenKind::Issuance => {
                        if issued.iter().any(|t| t.name == token.name) {
                            return Err(TokenError::DuplicateName(token.name));
                        }
                        if issued.iter().any(|t| t.uid == token.uid) {
                            return Err(TokenError::DuplicateId(token.uid));
                        }
                        self.check_issuance(&token)?;
                        token.origin_tx = tx.hash();
                        issued.push(token);
                    }
                    TokenKind::Transfer => {
                        let issued_at = match self.by_uid.get(&token.uid) {
                            Some((known, issued_at)) if known.name == token.name => *issued_at,
                            _ => return Err(TokenError::UnknownToken(token.uid)),
                        };
                        let confirmations = height.saturating_sub(issued_at);
                        if !token_output_spendable(confirmations) {
                            return Err(TokenError::Immature { uid: token.uid, confirmations });
                        }
                    }
                    TokenKind::None => return Err(TokenError::MalformedScript),
                }
            }
        }
        Ok(issued)
    }

    /// Record issuances returned by [`TokenLedger::check_block`]
    pub fn connect(&mut self, issued: Vec<Token>, height: u64) {
        for token in issued {
            debug!(target: "token", uid = %token.uid_hex(), name = %token.name, height, "token issued");
            self.by_name.insert(token.name.clone(), token.uid);
            self.by_uid.insert(token.uid, (token, height));
        }
    }

    /// Undo the issuances of a disconnected block, returning how many went
    pub fn disconnect_block(&mut self, block: &Block) -> usize {
        block
            .transactions
            .iter()
            .rev()
            .flat_map(|tx| tx.outputs.iter().rev())
            .filter(|output| output.is_token())
            .filter_map(|output| Token::from_script(&output.script).ok())
            .filter(|(token, _)| token.is_issuance())
            .filter(|(token, _)| self.undo_issuance(token.uid, &token.name))
            .count()
    }

    pub fn by_uid(&self, uid: u64) -> Option<&Token> {
        self.by_uid.get(&uid).map(|(token, _)| token)
    }

    pub fn by_name(&self, name: &str) -> Option<&Token> {
        self.by_name.get(name).and_then(|uid| self.by_uid(*uid))
    }

    /// Height the token was issued at
    pub fn issued_at(&self, uid: u64) -> Option<u64> {
        self.by_uid.get(&uid).map(|(_, height)| *height)
    }

    /// Remove an issuance; both id and name must match the recorded token
    fn undo_issuance(&mut self, uid: u64, name: &str) -> bool {
        match self.by_uid.get(&uid) {
            Some((token, _)) if token.name == name => {
                self.by_uid.remove(&uid);
                self.by_name.remove(name);
                debug!(target: "token", uid, name, "token issuance undone");
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}
