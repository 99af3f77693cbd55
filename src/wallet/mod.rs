//! Wallet module - keys, stake candidates and signing

mod wallet;

pub use wallet::*;

use crate::constants::CHAIN_NAME;
use crate::crypto::{double_hash, Hash};

/// Decode an address back to its owner id
///
/// Format: "PAC" + Base58(key_id[0:20] + checksum[0:4])
pub fn address_to_pubkey_hash(address: &str) -> Result<Hash, WalletError> {
    let encoded = address
        .strip_prefix(CHAIN_NAME)
        .ok_or(WalletError::InvalidAddress("bad prefix"))?;
    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| WalletError::InvalidAddress("bad base58"))?;
    if decoded.len() != 24 {
        return Err(WalletError::InvalidAddress("bad length"));
    }

    let (body, checksum) = decoded.split_at(20);
    if checksum != &double_hash(body).0[..4] {
        return Err(WalletError::InvalidAddress("bad checksum"));
    }

    let mut id = [0u8; 32];
    id[..20].copy_from_slice(body);
    Ok(Hash(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    #[test]
    fn test_address_decodes_to_key_id() {
        let public_key = PrivateKey::generate().public_key();
        assert_eq!(address_to_pubkey_hash(&public_key.to_address()).unwrap(), public_key.key_id());
    }

    #[test]
    fn test_damaged_address_is_rejected() {
        let mut address = PrivateKey::generate().public_key().to_address();
        let last = address.pop().unwrap();
        address.push(if last == '2' { '3' } else { '2' });
        assert!(address_to_pubkey_hash(&address).is_err());
        assert!(address_to_pubkey_hash("RH1111").is_err());
    }
}
