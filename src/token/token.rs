//! Token records and the token output script
//!
//! A token output carries a script naming the token and its owner:
//!
//! ```text
//! tag(1) | version(1) | kind(u16 LE) | uid(u64 LE) | name_len(1) | name | owner(32)
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::{hash_pair, hash_bytes, Hash, PublicKey};
use crate::validation::TxOutput;

/// Hex digits in a rendered token id
pub const TOKEN_IDRANGE: usize = 16;

/// Confirmations beyond the first before a token output can be spent
pub const TOKEN_MINCONFS: u64 = 1;

pub const TOKENNAME_MINLEN: usize = 3;

pub const TOKENNAME_MAXLEN: usize = 12;

/// Largest amount a single token output may carry
pub const TOKEN_VALUEMAX: u64 = i32::MAX as u64;

pub const TOKEN_CURRENT_VERSION: u8 = 0x01;

/// First byte of every token script
pub const TOKEN_SCRIPT_TAG: u8 = 0xb3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token name '{0}' must be {TOKENNAME_MINLEN}-{TOKENNAME_MAXLEN} alphanumeric characters")]
    InvalidName(String),
    #[error("token amount {0} exceeds the maximum")]
    ValueTooLarge(u64),
    #[error("malformed token script")]
    MalformedScript,
    #[error("unknown token kind {0}")]
    UnknownKind(u16),
    #[error("unsupported token version {0}")]
    UnsupportedVersion(u8),
    #[error("token name '{0}' already issued")]
    DuplicateName(String),
    #[error("token id {0:016x} already issued")]
    DuplicateId(u64),
    #[error("not an issuance")]
    NotIssuance,
    #[error("token id {0:016x} was never issued")]
    UnknownToken(u64),
    #[error("token id {uid:016x} has {confirmations} confirmations")]
    Immature { uid: u64, confirmations: u64 },
    #[error("token script owner does not match the output")]
    OwnerMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    None,
    Issuance,
    Transfer,
}

impl TokenKind {
    pub fn code(&self) -> u16 {
        match self {
            TokenKind::None => 0,
            TokenKind::Issuance => 1,
            TokenKind::Transfer => 2,
        }
    }

    pub fn from_code(code: u16) -> Result<Self, TokenError> {
        match code {
            0 => Ok(TokenKind::None),
            1 => Ok(TokenKind::Issuance),
            2 => Ok(TokenKind::Transfer),
            other => Err(TokenError::UnknownKind(other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub version: u8,
    pub kind: TokenKind,
    pub uid: u64,
    pub name: String,
    /// Transaction that issued the token
    pub origin_tx: Hash,
}

// Tokens are identified by id and name only
impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid && self.name == other.name
    }
}

impl Eq for Token {}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(version={:#04x}, kind={:?}, uid={}, name='{}', origin={})",
            self.version,
            self.kind,
            self.uid_hex(),
            self.name,
            self.origin_tx
        )
    }
}

pub fn check_token_name(name: &str) -> Result<(), TokenError> {
    let valid = (TOKENNAME_MINLEN..=TOKENNAME_MAXLEN).contains(&name.len())
        && name.bytes().all(|b| b.is_ascii_alphanumeric());
    if valid {
        Ok(())
    } else {
        Err(TokenError::InvalidName(name.to_string()))
    }
}

pub fn check_token_value(amount: u64) -> Result<(), TokenError> {
    if amount > TOKEN_VALUEMAX {
        return Err(TokenError::ValueTooLarge(amount));
    }
    Ok(())
}

/// Token outputs need `TOKEN_MINCONFS + 1` confirmations to be spent
pub fn token_output_spendable(confirmations: u64) -> bool {
    confirmations >= TOKEN_MINCONFS + 1
}

impl Token {
    /// New issuance; the id is derived from `seed` and the name
    ///
    /// The origin transaction is filled in once the issuance is connected.
    pub fn issuance(name: &str, seed: Hash) -> Result<Self, TokenError> {
        check_token_name(name)?;
        let digest = hash_pair(&seed, &hash_bytes(name.as_bytes()));
        let mut uid = [0u8; 8];
        uid.copy_from_slice(&digest.0[..8]);
        Ok(Self {
            version: TOKEN_CURRENT_VERSION,
            kind: TokenKind::Issuance,
            uid: u64::from_le_bytes(uid),
            name: name.to_string(),
            origin_tx: Hash::zero(),
        })
    }

    /// Transfer record for an issued token
    pub fn transfer(&self) -> Self {
        Self { kind: TokenKind::Transfer, ..self.clone() }
    }

    pub fn is_issuance(&self) -> bool {
        self.kind == TokenKind::Issuance
    }

    pub fn is_transfer(&self) -> bool {
        self.kind == TokenKind::Transfer
    }

    pub fn uid_hex(&self) -> String {
        format!("{:0width$x}", self.uid, width = TOKEN_IDRANGE)
    }

    /// Build the output script paying this token to `owner`
    pub fn to_script(&self, owner: &PublicKey) -> Vec<u8> {
        let mut script = Vec::with_capacity(1 + 1 + 2 + 8 + 1 + self.name.len() + 32);
        script.push(TOKEN_SCRIPT_TAG);
        script.push(self.version);
        script.extend_from_slice(&self.kind.code().to_le_bytes());
        script.extend_from_slice(&self.uid.to_le_bytes());
        script.push(self.name.len() as u8);
        script.extend_from_slice(self.name.as_bytes());
        script.extend_from_slice(&owner.0);
        script
    }

    /// Output holding `amount` units of this token for `owner`
    pub fn to_output(&self, owner: &PublicKey, amount: u64) -> TxOutput {
        TxOutput { script: self.to_script(owner), ..TxOutput::new(amount, owner.key_id()) }
    }

    /// Parse a token script; the origin transaction is not carried and comes back zero
    pub fn from_script(script: &[u8]) -> Result<(Self, PublicKey), TokenError> {
        let mut reader = ScriptReader(script);
        if reader.take(1)?[0] != TOKEN_SCRIPT_TAG {
            return Err(TokenError::MalformedScript);
        }
        let version = reader.take(1)?[0];
        if version != TOKEN_CURRENT_VERSION {
            return Err(TokenError::UnsupportedVersion(version));
        }
        let kind = TokenKind::from_code(u16::from_le_bytes(reader.array()?))?;
        let uid = u64::from_le_bytes(reader.array()?);
        let name_len = reader.take(1)?[0] as usize;
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| TokenError::MalformedScript)?
            .to_string();
        check_token_name(&name)?;
        let owner = PublicKey::from_bytes(&reader.array()?).map_err(|_| TokenError::MalformedScript)?;
        if !reader.0.is_empty() {
            return Err(TokenError::MalformedScript);
        }

        Ok((Self { version, kind, uid, name, origin_tx: Hash::zero() }, owner))
    }
}

struct ScriptReader<'a>(&'a [u8]);

impl<'a> ScriptReader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], TokenError> {
        if self.0.len() < len {
            return Err(TokenError::MalformedScript);
        }
        let (head, rest) = self.0.split_at(len);
        self.0 = rest;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], TokenError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}
