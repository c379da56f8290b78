//! Base58 addresses bound to a coin type

use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coins::CoinType;
use crate::error::AddressFormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    PubkeyHash,
    ScriptHash,
}

/// Immutable address value: coin, kind and the 20-byte hash it routes to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitAddress {
    coin: CoinType,
    kind: AddressKind,
    hash: [u8; 20],
}

impl BitAddress {
    pub fn from_pubkey_hash(coin: CoinType, hash: PubkeyHash) -> Self {
        Self {
            coin,
            kind: AddressKind::PubkeyHash,
            hash: hash.to_byte_array(),
        }
    }

    pub fn from_public_key(coin: CoinType, key: &PublicKey) -> Self {
        Self::from_pubkey_hash(coin, key.pubkey_hash())
    }

    pub fn from_script_hash(coin: CoinType, hash: [u8; 20]) -> Self {
        Self {
            coin,
            kind: AddressKind::ScriptHash,
            hash,
        }
    }

    /// Parse a base58check address, accepting only the version bytes of `coin`
    pub fn parse(coin: CoinType, s: &str) -> Result<Self, AddressFormatError> {
        let payload = bitcoin::base58::decode_check(s)
            .map_err(|e| AddressFormatError::Base58(e.to_string()))?;

        if payload.len() != 21 {
            return Err(AddressFormatError::InvalidLength(payload.len()));
        }

        let version = payload[0];
        let kind = if version == coin.p2pkh_header() {
            AddressKind::PubkeyHash
        } else if version == coin.p2sh_header() {
            AddressKind::ScriptHash
        } else {
            return Err(AddressFormatError::WrongNetwork { version, coin });
        };

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);

        Ok(Self { coin, kind, hash })
    }

    pub fn coin(&self) -> CoinType {
        self.coin
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn is_p2sh(&self) -> bool {
        self.kind == AddressKind::ScriptHash
    }

    pub fn hash160(&self) -> &[u8; 20] {
        &self.hash
    }

    /// The public key hash, `None` for script-hash addresses
    pub fn pubkey_hash(&self) -> Option<PubkeyHash> {
        match self.kind {
            AddressKind::PubkeyHash => Some(PubkeyHash::from_byte_array(self.hash)),
            AddressKind::ScriptHash => None,
        }
    }

    fn version(&self) -> u8 {
        match self.kind {
            AddressKind::PubkeyHash => self.coin.p2pkh_header(),
            AddressKind::ScriptHash => self.coin.p2sh_header(),
        }
    }
}

impl fmt::Display for BitAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.version());
        payload.extend_from_slice(&self.hash);
        f.write_str(&bitcoin::base58::encode_check(&payload))
    }
}
