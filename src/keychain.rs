//! Deterministic key chain for one BIP44 account
//!
//! The account talks to its keys only through the [`KeyChain`] trait.
//! [`SimpleHdKeyChain`] is the implementation used by default: an account
//! level extended key with an external (`0`) and internal (`1`) leaf chain,
//! each with an issuance cursor and a materialized look-ahead window.
//!
//! ## Bookkeeping
//!
//! - `issued`: number of keys handed out on a chain. The current unused key
//!   is the one at index `issued`.
//! - `last_used`: highest index reported through `mark_pub_hash_as_used`.
//! - window: keys `[0, issued + lookahead)` are derived and indexed by public
//!   key hash, so usage of any watched address can be resolved.
//!
//! Encryption never mutates a chain in place: `to_encrypted` and
//! `to_decrypted` return a new boxed chain carrying the same bookkeeping.

use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{self, All, Secp256k1, SecretKey};
use bitcoin::{PubkeyHash, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::address::BitAddress;
use crate::coins::CoinType;
use crate::crypter::{AesKey, EncryptedData, KeyCrypter};
use crate::error::{KeyChainError, KeyCrypterError};

/// Default number of keys derived ahead of the issuance cursor
pub const DEFAULT_LOOKAHEAD: u32 = 20;

/// Largest look-ahead accepted from configuration
pub const MAX_LOOKAHEAD: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyPurpose {
    ReceiveFunds,
    Change,
    Refund,
}

impl KeyPurpose {
    /// Receive and refund keys share the external chain
    pub fn chain(&self) -> ChainKind {
        match self {
            Self::ReceiveFunds | Self::Refund => ChainKind::External,
            Self::Change => ChainKind::Internal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    External,
    Internal,
}

impl ChainKind {
    pub fn child_number(&self) -> ChildNumber {
        match self {
            Self::External => ChildNumber::Normal { index: 0 },
            Self::Internal => ChildNumber::Normal { index: 1 },
        }
    }
}

/// Handle to one leaf of the derivation tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    chain: ChainKind,
    index: u32,
    public_key: PublicKey,
}

impl DerivedKey {
    pub fn chain(&self) -> ChainKind {
        self.chain
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn child_number(&self) -> ChildNumber {
        ChildNumber::Normal { index: self.index }
    }

    pub fn is_external(&self) -> bool {
        self.chain == ChainKind::External
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn pubkey_hash(&self) -> PubkeyHash {
        self.public_key.pubkey_hash()
    }

    pub fn address(&self, coin: CoinType) -> BitAddress {
        BitAddress::from_public_key(coin, &self.public_key)
    }
}

/// Key source consumed by the account
///
/// Implementations must keep every key in the look-ahead window resolvable
/// through `find_key_from_pub_hash` and `find_key_from_pub_key`.
pub trait KeyChain: Send + Sync + fmt::Debug {
    /// Account level extended public key
    fn root_key(&self) -> &Xpub;

    fn account_index(&self) -> u32;

    fn lookahead(&self) -> u32;

    /// Index of the key `current_unused_key` would return
    fn current_unused_index(&self, purpose: KeyPurpose) -> u32;

    fn current_unused_key(&self, purpose: KeyPurpose) -> Result<DerivedKey, KeyChainError>;

    /// Issue the current unused key and advance the cursor past it
    fn get_key(&mut self, purpose: KeyPurpose) -> Result<DerivedKey, KeyChainError>;

    fn last_issued_key(&self, purpose: KeyPurpose) -> Option<DerivedKey>;

    fn last_used_key(&self, purpose: KeyPurpose) -> Option<DerivedKey>;

    fn num_issued_external_keys(&self) -> u32;

    fn issued_external_keys(&self) -> Vec<DerivedKey>;

    /// Every materialized key on both chains
    fn active_keys(&self) -> Vec<DerivedKey>;

    fn find_key_from_pub_hash(&self, hash: &PubkeyHash) -> Option<DerivedKey>;

    fn find_key_from_pub_key(&self, pubkey: &[u8]) -> Option<DerivedKey>;

    fn is_external(&self, key: &DerivedKey) -> bool;

    /// Returns false when the hash does not belong to this chain
    fn mark_pub_hash_as_used(&mut self, hash: &PubkeyHash) -> Result<bool, KeyChainError>;

    fn is_encrypted(&self) -> bool;

    fn key_crypter(&self) -> Option<&KeyCrypter>;

    fn to_encrypted(
        &self,
        crypter: &KeyCrypter,
        aes_key: &AesKey,
    ) -> Result<Box<dyn KeyChain>, KeyCrypterError>;

    fn to_decrypted(&self, aes_key: &AesKey) -> Result<Box<dyn KeyChain>, KeyCrypterError>;

    /// Private key for `key`, unwrapping encrypted material with `aes_key`
    fn signing_key(
        &self,
        key: &DerivedKey,
        aes_key: Option<&AesKey>,
    ) -> Result<SecretKey, KeyChainError>;

    /// Derive keys up to the look-ahead bound on both chains
    fn maybe_look_ahead(&mut self) -> Result<(), KeyChainError>;

    fn to_key_records(&self) -> Vec<KeyRecord>;
}

#[derive(Clone)]
enum RootSecret {
    Plain(Xpriv),
    Encrypted {
        crypter: KeyCrypter,
        data: EncryptedData,
    },
    WatchingOnly,
}

#[derive(Debug, Clone)]
struct LeafChain {
    kind: ChainKind,
    parent: Xpub,
    issued: u32,
    last_used: Option<u32>,
    keys: Vec<PublicKey>,
}

impl LeafChain {
    fn new(secp: &Secp256k1<All>, root: &Xpub, kind: ChainKind) -> Result<Self, KeyChainError> {
        Ok(Self {
            kind,
            parent: root.ckd_pub(secp, kind.child_number())?,
            issued: 0,
            last_used: None,
            keys: Vec::new(),
        })
    }

    fn cached(&self, index: u32) -> Option<DerivedKey> {
        self.keys.get(index as usize).map(|public_key| DerivedKey {
            chain: self.kind,
            index,
            public_key: *public_key,
        })
    }

    fn key(&self, secp: &Secp256k1<All>, index: u32) -> Result<DerivedKey, KeyChainError> {
        if let Some(key) = self.cached(index) {
            return Ok(key);
        }
        Ok(DerivedKey {
            chain: self.kind,
            index,
            public_key: derive_leaf(secp, &self.parent, index)?,
        })
    }
}

fn derive_leaf(
    secp: &Secp256k1<All>,
    parent: &Xpub,
    index: u32,
) -> Result<PublicKey, KeyChainError> {
    let child = parent.ckd_pub(secp, ChildNumber::from_normal_idx(index)?)?;
    Ok(PublicKey::new(child.public_key))
}

/// BIP32 account chain with external/internal leaf chains
#[derive(Clone)]
pub struct SimpleHdKeyChain {
    secp: Secp256k1<All>,
    root: Xpub,
    secret: RootSecret,
    lookahead: u32,
    external: LeafChain,
    internal: LeafChain,
    by_hash: HashMap<PubkeyHash, (ChainKind, u32)>,
    by_pubkey: HashMap<secp256k1::PublicKey, (ChainKind, u32)>,
    creation_time: i64,
}

impl SimpleHdKeyChain {
    /// Chain over an account level extended private key
    pub fn new(root: Xpriv) -> Result<Self, KeyChainError> {
        Self::with_lookahead(root, DEFAULT_LOOKAHEAD)
    }

    pub fn with_lookahead(root: Xpriv, lookahead: u32) -> Result<Self, KeyChainError> {
        let secp = Secp256k1::new();
        let xpub = Xpub::from_priv(&secp, &root);
        Self::build(secp, xpub, RootSecret::Plain(root), lookahead)
    }

    /// Public-only chain: addresses and ownership work, signing does not
    pub fn watching(root: Xpub, lookahead: u32) -> Result<Self, KeyChainError> {
        Self::build(Secp256k1::new(), root, RootSecret::WatchingOnly, lookahead)
    }

    /// Derive the BIP44 account `m/44'/<coin>'/<account>'` from a master key
    pub fn from_master(
        master: &Xpriv,
        coin: CoinType,
        account: u32,
        lookahead: u32,
    ) -> Result<Self, KeyChainError> {
        let secp = Secp256k1::new();
        let path = DerivationPath::from_str(&coin.bip44_path(account))?;
        let account_key = master.derive_priv(&secp, &path)?;

        log::debug!("Derived account key at {} for {}", path, coin);

        Self::with_lookahead(account_key, lookahead)
    }

    /// Import an account from a BIP39 mnemonic phrase
    pub fn from_mnemonic(
        words: &str,
        passphrase: &str,
        coin: CoinType,
        account: u32,
        lookahead: u32,
    ) -> Result<Self, KeyChainError> {
        let mnemonic =
            Mnemonic::parse(words).map_err(|e| KeyChainError::Mnemonic(e.to_string()))?;
        let seed = mnemonic.to_seed(passphrase);
        let master = Xpriv::new_master(coin.network_kind(), &seed)?;

        Self::from_master(&master, coin, account, lookahead)
    }

    /// Restore a chain written by [`KeyChain::to_key_records`]
    pub fn from_key_records(records: &[KeyRecord]) -> Result<Self, KeyChainError> {
        let (xpub, lookahead, creation_time, secret) = records
            .iter()
            .find_map(|record| match record {
                KeyRecord::Root {
                    xpub,
                    lookahead,
                    creation_time,
                    secret,
                } => Some((xpub, *lookahead, *creation_time, secret)),
                KeyRecord::Chain { .. } => None,
            })
            .ok_or_else(|| KeyChainError::InvalidRecord("missing root record".into()))?;

        let root = Xpub::from_str(xpub)?;
        let secret = match secret {
            SecretRecord::Plain { xprv } => {
                let xprv = Xpriv::from_str(xprv)?;
                if Xpub::from_priv(&Secp256k1::new(), &xprv) != root {
                    return Err(KeyChainError::InvalidRecord(
                        "private key does not match root public key".into(),
                    ));
                }
                RootSecret::Plain(xprv)
            }
            SecretRecord::Encrypted { crypter, data } => RootSecret::Encrypted {
                crypter: crypter.clone(),
                data: data.clone(),
            },
            SecretRecord::WatchingOnly => RootSecret::WatchingOnly,
        };

        let mut chain = Self::build(Secp256k1::new(), root, secret, lookahead)?;
        chain.creation_time = creation_time;

        for record in records {
            if let KeyRecord::Chain {
                chain: kind,
                issued,
                last_used,
            } = record
            {
                let leaf = chain.leaf_mut(*kind);
                leaf.issued = *issued;
                leaf.last_used = *last_used;
            }
        }
        chain.maybe_look_ahead()?;

        Ok(chain)
    }

    fn build(
        secp: Secp256k1<All>,
        root: Xpub,
        secret: RootSecret,
        lookahead: u32,
    ) -> Result<Self, KeyChainError> {
        let external = LeafChain::new(&secp, &root, ChainKind::External)?;
        let internal = LeafChain::new(&secp, &root, ChainKind::Internal)?;

        let mut chain = Self {
            secp,
            root,
            secret,
            lookahead: lookahead.max(1),
            external,
            internal,
            by_hash: HashMap::new(),
            by_pubkey: HashMap::new(),
            creation_time: chrono::Utc::now().timestamp(),
        };
        chain.maybe_look_ahead()?;
        Ok(chain)
    }

    fn leaf(&self, kind: ChainKind) -> &LeafChain {
        match kind {
            ChainKind::External => &self.external,
            ChainKind::Internal => &self.internal,
        }
    }

    fn leaf_mut(&mut self, kind: ChainKind) -> &mut LeafChain {
        match kind {
            ChainKind::External => &mut self.external,
            ChainKind::Internal => &mut self.internal,
        }
    }

    /// Unwrap the account private key, checking it matches the public root
    fn decrypt_root(
        &self,
        crypter: &KeyCrypter,
        data: &EncryptedData,
        aes_key: &AesKey,
    ) -> Result<Xpriv, KeyCrypterError> {
        let bytes = crypter.decrypt(data, aes_key)?;
        let xpriv = Xpriv::decode(&bytes).map_err(|_| KeyCrypterError::InvalidKey)?;

        if Xpub::from_priv(&self.secp, &xpriv) != self.root {
            return Err(KeyCrypterError::InvalidKey);
        }
        Ok(xpriv)
    }

    fn with_secret(&self, secret: RootSecret) -> Box<dyn KeyChain> {
        let mut chain = self.clone();
        chain.secret = secret;
        Box::new(chain)
    }
}

impl KeyChain for SimpleHdKeyChain {
    fn root_key(&self) -> &Xpub {
        &self.root
    }

    fn account_index(&self) -> u32 {
        match self.root.child_number {
            ChildNumber::Normal { index } | ChildNumber::Hardened { index } => index,
        }
    }

    fn lookahead(&self) -> u32 {
        self.lookahead
    }

    fn current_unused_index(&self, purpose: KeyPurpose) -> u32 {
        self.leaf(purpose.chain()).issued
    }

    fn current_unused_key(&self, purpose: KeyPurpose) -> Result<DerivedKey, KeyChainError> {
        let leaf = self.leaf(purpose.chain());
        leaf.key(&self.secp, leaf.issued)
    }

    fn get_key(&mut self, purpose: KeyPurpose) -> Result<DerivedKey, KeyChainError> {
        let leaf = self.leaf_mut(purpose.chain());
        let index = leaf.issued;
        leaf.issued += 1;
        self.maybe_look_ahead()?;

        log::debug!("Issued {:?} key at index {}", purpose, index);

        self.leaf(purpose.chain()).key(&self.secp, index)
    }

    fn last_issued_key(&self, purpose: KeyPurpose) -> Option<DerivedKey> {
        let leaf = self.leaf(purpose.chain());
        leaf.issued.checked_sub(1).and_then(|index| leaf.cached(index))
    }

    fn last_used_key(&self, purpose: KeyPurpose) -> Option<DerivedKey> {
        let leaf = self.leaf(purpose.chain());
        leaf.last_used.and_then(|index| leaf.cached(index))
    }

    fn num_issued_external_keys(&self) -> u32 {
        self.external.issued
    }

    fn issued_external_keys(&self) -> Vec<DerivedKey> {
        (0..self.external.issued)
            .filter_map(|index| self.external.cached(index))
            .collect()
    }

    fn active_keys(&self) -> Vec<DerivedKey> {
        [&self.external, &self.internal]
            .into_iter()
            .flat_map(|leaf| (0..leaf.keys.len() as u32).filter_map(move |i| leaf.cached(i)))
            .collect()
    }

    fn find_key_from_pub_hash(&self, hash: &PubkeyHash) -> Option<DerivedKey> {
        let (kind, index) = self.by_hash.get(hash)?;
        self.leaf(*kind).cached(*index)
    }

    fn find_key_from_pub_key(&self, pubkey: &[u8]) -> Option<DerivedKey> {
        let pubkey = PublicKey::from_slice(pubkey).ok()?;
        let (kind, index) = self.by_pubkey.get(&pubkey.inner)?;
        self.leaf(*kind).cached(*index)
    }

    fn is_external(&self, key: &DerivedKey) -> bool {
        key.is_external()
    }

    fn mark_pub_hash_as_used(&mut self, hash: &PubkeyHash) -> Result<bool, KeyChainError> {
        let Some(&(kind, index)) = self.by_hash.get(hash) else {
            return Ok(false);
        };

        let leaf = self.leaf_mut(kind);
        leaf.last_used = Some(leaf.last_used.map_or(index, |used| used.max(index)));
        if index >= leaf.issued {
            leaf.issued = index + 1;
        }
        self.maybe_look_ahead()?;
        Ok(true)
    }

    fn is_encrypted(&self) -> bool {
        matches!(self.secret, RootSecret::Encrypted { .. })
    }

    fn key_crypter(&self) -> Option<&KeyCrypter> {
        match &self.secret {
            RootSecret::Encrypted { crypter, .. } => Some(crypter),
            _ => None,
        }
    }

    fn to_encrypted(
        &self,
        crypter: &KeyCrypter,
        aes_key: &AesKey,
    ) -> Result<Box<dyn KeyChain>, KeyCrypterError> {
        let xpriv = match &self.secret {
            RootSecret::Plain(xpriv) => *xpriv,
            RootSecret::Encrypted {
                crypter: current,
                data,
            } => {
                if current != crypter {
                    return Err(KeyCrypterError::CrypterMismatch);
                }
                self.decrypt_root(current, data, aes_key)?
            }
            RootSecret::WatchingOnly => return Err(KeyCrypterError::WatchingOnly),
        };

        let plain = xpriv.encode();
        let data = crypter.encrypt(&plain, aes_key)?;

        // Make sure the material can be recovered before dropping the plaintext
        if crypter.decrypt(&data, aes_key)?.as_slice() != plain.as_slice() {
            return Err(KeyCrypterError::Cipher("encryption round trip failed".into()));
        }

        Ok(self.with_secret(RootSecret::Encrypted {
            crypter: crypter.clone(),
            data,
        }))
    }

    fn to_decrypted(&self, aes_key: &AesKey) -> Result<Box<dyn KeyChain>, KeyCrypterError> {
        match &self.secret {
            RootSecret::Encrypted { crypter, data } => {
                let xpriv = self.decrypt_root(crypter, data, aes_key)?;
                Ok(self.with_secret(RootSecret::Plain(xpriv)))
            }
            _ => Err(KeyCrypterError::NotEncrypted),
        }
    }

    fn signing_key(
        &self,
        key: &DerivedKey,
        aes_key: Option<&AesKey>,
    ) -> Result<SecretKey, KeyChainError> {
        let xpriv = match &self.secret {
            RootSecret::Plain(xpriv) => *xpriv,
            RootSecret::Encrypted { crypter, data } => {
                let aes_key = aes_key.ok_or(KeyChainError::KeyIsEncrypted)?;
                self.decrypt_root(crypter, data, aes_key)
                    .map_err(|_| KeyChainError::KeyIsEncrypted)?
            }
            RootSecret::WatchingOnly => return Err(KeyChainError::MissingPrivateKey),
        };

        let path = [key.chain.child_number(), ChildNumber::from_normal_idx(key.index)?];
        let derived = xpriv.derive_priv(&self.secp, &path)?;
        Ok(derived.private_key)
    }

    fn maybe_look_ahead(&mut self) -> Result<(), KeyChainError> {
        for kind in [ChainKind::External, ChainKind::Internal] {
            let target = self.leaf(kind).issued.saturating_add(self.lookahead) as usize;

            while self.leaf(kind).keys.len() < target {
                let leaf = self.leaf(kind);
                let index = leaf.keys.len() as u32;
                let public_key = derive_leaf(&self.secp, &leaf.parent, index)?;

                self.leaf_mut(kind).keys.push(public_key);
                self.by_hash.insert(public_key.pubkey_hash(), (kind, index));
                self.by_pubkey.insert(public_key.inner, (kind, index));
            }
        }
        Ok(())
    }

    fn to_key_records(&self) -> Vec<KeyRecord> {
        let secret = match &self.secret {
            RootSecret::Plain(xpriv) => SecretRecord::Plain {
                xprv: xpriv.to_string(),
            },
            RootSecret::Encrypted { crypter, data } => SecretRecord::Encrypted {
                crypter: crypter.clone(),
                data: data.clone(),
            },
            RootSecret::WatchingOnly => SecretRecord::WatchingOnly,
        };

        vec![
            KeyRecord::Root {
                xpub: self.root.to_string(),
                lookahead: self.lookahead,
                creation_time: self.creation_time,
                secret,
            },
            KeyRecord::Chain {
                chain: ChainKind::External,
                issued: self.external.issued,
                last_used: self.external.last_used,
            },
            KeyRecord::Chain {
                chain: ChainKind::Internal,
                issued: self.internal.issued,
                last_used: self.internal.last_used,
            },
        ]
    }
}

impl fmt::Debug for SimpleHdKeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleHdKeyChain")
            .field("root", &self.root.to_string())
            .field("encrypted", &self.is_encrypted())
            .field("lookahead", &self.lookahead)
            .field("issued_external", &self.external.issued)
            .field("issued_internal", &self.internal.issued)
            .finish()
    }
}

/// Persistent form of a key chain, one root record plus one per leaf chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyRecord {
    Root {
        xpub: String,
        lookahead: u32,
        creation_time: i64,
        secret: SecretRecord,
    },
    Chain {
        chain: ChainKind,
        issued: u32,
        last_used: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretRecord {
    Plain { xprv: String },
    Encrypted { crypter: KeyCrypter, data: EncryptedData },
    WatchingOnly,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypter::KdfParams;
    use bitcoin::hashes::Hash;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_chain(lookahead: u32) -> SimpleHdKeyChain {
        SimpleHdKeyChain::from_mnemonic(MNEMONIC, "", CoinType::Bitcoin, 0, lookahead)
            .expect("valid mnemonic")
    }

    fn test_crypter() -> (KeyCrypter, AesKey) {
        let crypter = KeyCrypter::new(KdfParams {
            memory_kb: 256,
            iterations: 1,
            parallelism: 1,
        });
        let key = crypter.derive_key("hunter2").unwrap();
        (crypter, key)
    }

    #[test]
    fn test_bip44_first_receive_address() {
        let chain = test_chain(5);
        let key = chain.current_unused_key(KeyPurpose::ReceiveFunds).unwrap();

        assert_eq!(key.index(), 0);
        assert_eq!(
            key.address(CoinType::Bitcoin).to_string(),
            "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA"
        );
        assert_eq!(chain.account_index(), 0);
    }

    #[test]
    fn test_get_key_advances_cursor() {
        let mut chain = test_chain(5);

        let issued = chain.get_key(KeyPurpose::ReceiveFunds).unwrap();
        assert_eq!(issued.index(), 0);
        assert_eq!(chain.current_unused_index(KeyPurpose::ReceiveFunds), 1);
        assert_eq!(chain.last_issued_key(KeyPurpose::ReceiveFunds), Some(issued));
        assert_eq!(chain.num_issued_external_keys(), 1);

        // Change keys live on their own chain
        assert_eq!(chain.current_unused_index(KeyPurpose::Change), 0);
        assert!(chain.last_issued_key(KeyPurpose::Change).is_none());
    }

    #[test]
    fn test_refund_shares_external_chain() {
        let mut chain = test_chain(5);
        chain.get_key(KeyPurpose::Refund).unwrap();
        assert_eq!(chain.current_unused_index(KeyPurpose::ReceiveFunds), 1);
    }

    #[test]
    fn test_window_follows_cursor() {
        let mut chain = test_chain(5);
        assert_eq!(chain.active_keys().len(), 10);

        chain.get_key(KeyPurpose::ReceiveFunds).unwrap();
        chain.get_key(KeyPurpose::ReceiveFunds).unwrap();
        assert_eq!(chain.active_keys().len(), 12);
    }

    #[test]
    fn test_mark_used_past_cursor_moves_cursor() {
        let mut chain = test_chain(5);
        let far = chain
            .active_keys()
            .into_iter()
            .find(|k| k.is_external() && k.index() == 3)
            .unwrap();

        assert!(chain.mark_pub_hash_as_used(&far.pubkey_hash()).unwrap());
        assert_eq!(chain.current_unused_index(KeyPurpose::ReceiveFunds), 4);
        assert_eq!(chain.last_used_key(KeyPurpose::ReceiveFunds), Some(far.clone()));

        // Lower indices do not move the cursor back nor lower last_used
        let first = chain.issued_external_keys().remove(0);
        assert!(chain.mark_pub_hash_as_used(&first.pubkey_hash()).unwrap());
        assert_eq!(chain.current_unused_index(KeyPurpose::ReceiveFunds), 4);
        assert_eq!(chain.last_used_key(KeyPurpose::ReceiveFunds), Some(far));
    }

    #[test]
    fn test_mark_unknown_hash() {
        let mut chain = test_chain(5);
        let foreign = PubkeyHash::from_byte_array([1u8; 20]);
        assert!(!chain.mark_pub_hash_as_used(&foreign).unwrap());
    }

    #[test]
    fn test_find_key_from_pub_key() {
        let chain = test_chain(5);
        let key = chain.current_unused_key(KeyPurpose::Change).unwrap();

        let found = chain.find_key_from_pub_key(&key.public_key().to_bytes()).unwrap();
        assert_eq!(found, key);
        assert!(chain.find_key_from_pub_key(&[2u8; 10]).is_none());
    }

    #[test]
    fn test_signing_key_matches_public_key() {
        let chain = test_chain(5);
        let key = chain.current_unused_key(KeyPurpose::ReceiveFunds).unwrap();
        let secret = chain.signing_key(&key, None).unwrap();

        let secp = Secp256k1::new();
        assert_eq!(secret.public_key(&secp), key.public_key().inner);
    }

    #[test]
    fn test_encrypted_chain_requires_key_to_sign() {
        let (crypter, aes_key) = test_crypter();
        let chain = test_chain(5);
        let encrypted = chain.to_encrypted(&crypter, &aes_key).unwrap();
        let key = encrypted.current_unused_key(KeyPurpose::ReceiveFunds).unwrap();

        assert!(encrypted.is_encrypted());
        assert!(matches!(
            encrypted.signing_key(&key, None),
            Err(KeyChainError::KeyIsEncrypted)
        ));

        let wrong = crypter.derive_key("not it").unwrap();
        assert!(matches!(
            encrypted.signing_key(&key, Some(&wrong)),
            Err(KeyChainError::KeyIsEncrypted)
        ));

        assert_eq!(
            encrypted.signing_key(&key, Some(&aes_key)).unwrap(),
            chain.signing_key(&key, None).unwrap()
        );
    }

    #[test]
    fn test_reencrypt_with_other_crypter_fails() {
        let (crypter, aes_key) = test_crypter();
        let (other, other_key) = test_crypter();
        let encrypted = test_chain(5).to_encrypted(&crypter, &aes_key).unwrap();

        assert_eq!(
            encrypted.to_encrypted(&other, &other_key).unwrap_err(),
            KeyCrypterError::CrypterMismatch
        );
        assert!(encrypted.to_encrypted(&crypter, &aes_key).unwrap().is_encrypted());
    }

    #[test]
    fn test_decrypt_plain_chain_fails() {
        let (_, aes_key) = test_crypter();
        assert_eq!(
            test_chain(5).to_decrypted(&aes_key).unwrap_err(),
            KeyCrypterError::NotEncrypted
        );
    }

    #[test]
    fn test_watching_chain() {
        let xpub = *test_chain(5).root_key();
        let chain = SimpleHdKeyChain::watching(xpub, 5).unwrap();
        let key = chain.current_unused_key(KeyPurpose::ReceiveFunds).unwrap();

        assert!(matches!(
            chain.signing_key(&key, None),
            Err(KeyChainError::MissingPrivateKey)
        ));
        let (crypter, aes_key) = test_crypter();
        assert_eq!(
            chain.to_encrypted(&crypter, &aes_key).unwrap_err(),
            KeyCrypterError::WatchingOnly
        );
    }

    #[test]
    fn test_key_records_restore_bookkeeping() {
        let mut chain = test_chain(5);
        chain.get_key(KeyPurpose::ReceiveFunds).unwrap();
        chain.get_key(KeyPurpose::Change).unwrap();
        let used = chain.issued_external_keys().remove(0);
        chain.mark_pub_hash_as_used(&used.pubkey_hash()).unwrap();

        let json = serde_json::to_string(&chain.to_key_records()).unwrap();
        let records: Vec<KeyRecord> = serde_json::from_str(&json).unwrap();
        let restored = SimpleHdKeyChain::from_key_records(&records).unwrap();

        assert_eq!(restored.root_key(), chain.root_key());
        assert_eq!(restored.current_unused_index(KeyPurpose::ReceiveFunds), 1);
        assert_eq!(restored.current_unused_index(KeyPurpose::Change), 1);
        assert_eq!(restored.last_used_key(KeyPurpose::ReceiveFunds), Some(used));
        assert_eq!(restored.active_keys(), chain.active_keys());
    }

    #[test]
    fn test_key_records_without_root() {
        let records = vec![KeyRecord::Chain {
            chain: ChainKind::External,
            issued: 1,
            last_used: None,
        }];
        assert!(matches!(
            SimpleHdKeyChain::from_key_records(&records),
            Err(KeyChainError::InvalidRecord(_))
        ));
    }
}
