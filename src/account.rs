//! HD account: one BIP44 account of one coin
//!
//! [`HdAccount`] owns a key chain and a usage ledger behind a single mutex.
//! Every public operation takes the guard once, works on [`AccountState`] and
//! drops the guard before any persistence or subscription callback runs.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bitcoin::bip32::{Fingerprint, Xpriv, Xpub};
use bitcoin::PubkeyHash;
use sha2::{Digest, Sha256};

use crate::address::BitAddress;
use crate::coins::CoinType;
use crate::config::AccountConfig;
use crate::crypter::{AesKey, KeyCrypter};
use crate::error::{AccountError, KeyChainError, KeyCrypterError, WalletAccountError};
use crate::keychain::{DerivedKey, KeyChain, KeyPurpose, KeyRecord, SimpleHdKeyChain};
use crate::ledger::UsageLedger;
use crate::lookahead::{can_issue_fresh, maximum_key_index};
use crate::message::{
    recover_address, sign_message_hash, signed_message_hash, MessageStatus, SignedMessage,
};
use crate::transaction::{CompletionError, SendRequest, TransactionCompleter};
use crate::Result;

/// Persists the wallet holding this account
pub trait WalletSaver: Send + Sync {
    fn save_now(&self);
}

/// Subscribes addresses with a sync layer, skipping ones already subscribed
pub trait AddressWatcher: Send + Sync {
    fn subscribe_if_needed(&self, account_id: &str, addresses: &[BitAddress]);
}

/// State guarded by the account lock
struct AccountState {
    keys: Box<dyn KeyChain>,
    ledger: UsageLedger,
}

impl AccountState {
    fn current_address(&self, purpose: KeyPurpose, coin: CoinType) -> Result<BitAddress> {
        Ok(self.keys.current_unused_key(purpose)?.address(coin))
    }

    fn last_used_address(&self, purpose: KeyPurpose, coin: CoinType) -> Option<BitAddress> {
        self.keys.last_used_key(purpose).map(|key| key.address(coin))
    }

    /// Register every active address as watched, returning all of them
    fn watch_active(&mut self, coin: CoinType) -> Vec<BitAddress> {
        let active: Vec<BitAddress> = self
            .keys
            .active_keys()
            .iter()
            .map(|key| key.address(coin))
            .collect();

        for address in &active {
            self.ledger.watch(address);
        }
        active
    }

    /// Advance the receive cursor if the look-ahead window allows it
    fn issue_fresh_receive(&mut self, coin: CoinType) -> Result<BitAddress> {
        let current = self.keys.current_unused_index(KeyPurpose::ReceiveFunds);
        let maximum = maximum_key_index(&self.ledger, self.keys.as_ref());

        if current >= maximum {
            log::warn!(
                "⚠️  Cannot issue receive key past index {} (maximum {})",
                current,
                maximum
            );
            return Err(AccountError::LookAheadExceeded { current, maximum });
        }

        self.keys.get_key(KeyPurpose::ReceiveFunds)?;
        self.current_address(KeyPurpose::ReceiveFunds, coin)
    }

    fn mark_chain_used(&mut self, address: &BitAddress) -> Result<()> {
        if let Some(hash) = address.pubkey_hash() {
            if !self.keys.mark_pub_hash_as_used(&hash)? {
                log::debug!("Address {} is not derived by this account", address);
            }
        }
        Ok(())
    }
}

pub struct HdAccount {
    id: String,
    coin: CoinType,
    state: Mutex<AccountState>,
    saver: Option<Arc<dyn WalletSaver>>,
    watcher: Option<Arc<dyn AddressWatcher>>,
    completer: Option<Arc<dyn TransactionCompleter>>,
}

impl HdAccount {
    /// Account over an account level key `m/44'/coin'/account'`
    pub fn new(root: Xpriv, coin: CoinType) -> Result<Self> {
        let keys = SimpleHdKeyChain::new(root)?;
        Ok(Self::with_key_chain(Box::new(keys), coin))
    }

    /// Restore account `account` of `config.coin` from a BIP39 phrase
    pub fn from_mnemonic(
        words: &str,
        passphrase: &str,
        account: u32,
        config: &AccountConfig,
    ) -> Result<Self> {
        let keys = SimpleHdKeyChain::from_mnemonic(
            words,
            passphrase,
            config.coin,
            account,
            config.lookahead,
        )?;
        Ok(Self::with_key_chain(Box::new(keys), config.coin))
    }

    pub fn with_key_chain(keys: Box<dyn KeyChain>, coin: CoinType) -> Self {
        let id = account_id(coin, keys.root_key());
        log::info!("📂 Opened {} account {} ({})", coin, keys.account_index(), &id[..8]);

        Self {
            id,
            coin,
            state: Mutex::new(AccountState {
                keys,
                ledger: UsageLedger::new(),
            }),
            saver: None,
            watcher: None,
            completer: None,
        }
    }

    pub fn with_saver(mut self, saver: Arc<dyn WalletSaver>) -> Self {
        self.saver = Some(saver);
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<dyn AddressWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn with_completer(mut self, completer: Arc<dyn TransactionCompleter>) -> Self {
        self.completer = Some(completer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, AccountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save_now(&self) {
        if let Some(saver) = &self.saver {
            saver.save_now();
        }
    }

    fn subscribe(&self, addresses: &[BitAddress]) {
        if let Some(watcher) = &self.watcher {
            watcher.subscribe_if_needed(&self.id, addresses);
        }
    }

    fn check_coin(&self, address: &BitAddress) -> Result<()> {
        if address.coin() != self.coin {
            return Err(AccountError::WrongAddressType {
                expected: self.coin,
                found: address.coin(),
            });
        }
        Ok(())
    }

    // ===== Identity =====

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn coin_type(&self) -> CoinType {
        self.coin
    }

    pub fn account_index(&self) -> u32 {
        self.lock().keys.account_index()
    }

    /// Compressed account root public key
    pub fn public_key(&self) -> Vec<u8> {
        self.lock().keys.root_key().public_key.serialize().to_vec()
    }

    /// Account xpub re-rooted at depth 1 with a zero parent fingerprint
    pub fn public_key_serialized(&self) -> String {
        let root = *self.lock().keys.root_key();
        let rerooted = Xpub {
            network: root.network,
            depth: 1,
            parent_fingerprint: Fingerprint::from([0u8; 4]),
            child_number: root.child_number,
            public_key: root.public_key,
            chain_code: root.chain_code,
        };
        rerooted.to_string()
    }

    // ===== Addresses =====

    /// Address of the current unused key for `purpose`
    ///
    /// Active addresses are registered as watched and handed to the address
    /// watcher once the lock is released.
    pub fn current_address(&self, purpose: KeyPurpose) -> Result<BitAddress> {
        self.address(purpose, false)
    }

    /// Current address, or the last used one when `manual` is set and the
    /// chain has seen usage
    pub fn address(&self, purpose: KeyPurpose, manual: bool) -> Result<BitAddress> {
        let (address, active) = {
            let mut state = self.lock();
            let used = if manual {
                state.last_used_address(purpose, self.coin)
            } else {
                None
            };
            let address = match used {
                Some(address) => address,
                None => state.current_address(purpose, self.coin)?,
            };
            (address, state.watch_active(self.coin))
        };

        self.subscribe(&active);
        Ok(address)
    }

    pub fn receive_address(&self) -> Result<BitAddress> {
        self.current_address(KeyPurpose::ReceiveFunds)
    }

    pub fn receive_address_manual(&self, manual: bool) -> Result<BitAddress> {
        self.address(KeyPurpose::ReceiveFunds, manual)
    }

    pub fn change_address(&self) -> Result<BitAddress> {
        self.current_address(KeyPurpose::Change)
    }

    pub fn refund_address(&self) -> Result<BitAddress> {
        self.current_address(KeyPurpose::Refund)
    }

    pub fn refund_address_manual(&self, manual: bool) -> Result<BitAddress> {
        self.address(KeyPurpose::Refund, manual)
    }

    pub fn last_used_address(&self, purpose: KeyPurpose) -> Option<BitAddress> {
        self.lock().last_used_address(purpose, self.coin)
    }

    pub fn last_issued_address(&self, purpose: KeyPurpose) -> Option<BitAddress> {
        self.lock()
            .keys
            .last_issued_key(purpose)
            .map(|key| key.address(self.coin))
    }

    pub fn can_create_fresh_receive_address(&self) -> bool {
        let state = self.lock();
        can_issue_fresh(&state.ledger, state.keys.as_ref())
    }

    /// Issue a new receive address, bounded by the look-ahead window
    ///
    /// Returns the new current receive address. On success the grown window
    /// is handed to the address watcher. The wallet is saved after the lock
    /// is released whether or not issuance succeeded.
    pub fn fresh_receive_address(&self) -> Result<BitAddress> {
        self.fresh_receive_address_manual(false)
    }

    /// Like [`HdAccount::fresh_receive_address`], but in manual mode returns
    /// the last used receive address when there is one
    ///
    /// A key is minted either way.
    pub fn fresh_receive_address_manual(&self, manual: bool) -> Result<BitAddress> {
        let (result, active) = {
            let mut state = self.lock();
            match state.issue_fresh_receive(self.coin) {
                Ok(fresh) => {
                    let last_used = state.last_used_address(KeyPurpose::ReceiveFunds, self.coin);
                    let address = match last_used {
                        Some(used) if manual => used,
                        _ => fresh,
                    };
                    (Ok(address), state.watch_active(self.coin))
                }
                Err(e) => (Err(e), Vec::new()),
            }
        };

        if !active.is_empty() {
            self.subscribe(&active);
        }
        self.save_now();
        result
    }

    pub fn number_issued_receive_addresses(&self) -> u32 {
        self.lock().keys.num_issued_external_keys()
    }

    /// Issued receive addresses, newest first
    pub fn issued_receive_addresses(&self) -> Vec<BitAddress> {
        let mut keys = self.lock().keys.issued_external_keys();
        keys.sort_by(|a, b| b.index().cmp(&a.index()));
        keys.iter().map(|key| key.address(self.coin)).collect()
    }

    pub fn active_addresses(&self) -> Vec<BitAddress> {
        self.lock()
            .keys
            .active_keys()
            .iter()
            .map(|key| key.address(self.coin))
            .collect()
    }

    pub fn used_addresses(&self) -> Vec<BitAddress> {
        self.lock().ledger.used_addresses().cloned().collect()
    }

    pub fn has_used_addresses(&self) -> bool {
        self.number_issued_receive_addresses() != 0
    }

    pub fn can_create_new_addresses(&self) -> bool {
        true
    }

    pub fn address_status(&self, address: &BitAddress) -> Option<String> {
        self.lock().ledger.status(address).map(str::to_owned)
    }

    // ===== Usage =====

    /// Record that `address` has been seen in a transaction
    ///
    /// Keeps an already known status. Marking twice is the same as once.
    pub fn mark_address_as_used(&self, address: &BitAddress) -> Result<()> {
        self.check_coin(address)?;

        let mut state = self.lock();
        state.ledger.mark_used_if_unknown(address);
        state.mark_chain_used(address)
    }

    /// Store the latest status token reported for `address`
    pub fn update_address_status(
        &self,
        address: &BitAddress,
        status: impl Into<String>,
    ) -> Result<()> {
        self.check_coin(address)?;

        let mut state = self.lock();
        state.ledger.mark_used(address, status);
        state.mark_chain_used(address)
    }

    /// Derive keys up to the look-ahead bound, may run on a background thread
    pub fn maybe_initialize_all_keys(&self) -> Result<()> {
        self.lock().keys.maybe_look_ahead()?;
        Ok(())
    }

    // ===== Ownership =====

    pub fn is_address_mine(&self, address: &BitAddress) -> bool {
        if address.coin() != self.coin {
            return false;
        }
        match address.pubkey_hash() {
            Some(hash) => self.is_pub_key_hash_mine(&hash),
            None => self.is_pay_to_script_hash_mine(address.hash160()),
        }
    }

    pub fn is_pub_key_hash_mine(&self, hash: &PubkeyHash) -> bool {
        self.find_key_from_pub_hash(hash).is_some()
    }

    pub fn is_pub_key_mine(&self, pubkey: &[u8]) -> bool {
        self.find_key_from_pub_key(pubkey).is_some()
    }

    /// Accounts hold no redeem scripts
    pub fn is_pay_to_script_hash_mine(&self, _script_hash: &[u8; 20]) -> bool {
        false
    }

    pub fn find_key_from_pub_hash(&self, hash: &PubkeyHash) -> Option<DerivedKey> {
        self.lock().keys.find_key_from_pub_hash(hash)
    }

    pub fn find_key_from_pub_key(&self, pubkey: &[u8]) -> Option<DerivedKey> {
        self.lock().keys.find_key_from_pub_key(pubkey)
    }

    // ===== Encryption =====

    pub fn is_encryptable(&self) -> bool {
        true
    }

    pub fn is_encrypted(&self) -> bool {
        self.lock().keys.is_encrypted()
    }

    pub fn key_crypter(&self) -> Option<KeyCrypter> {
        self.lock().keys.key_crypter().cloned()
    }

    /// Wrap the private key material under `crypter`
    ///
    /// An already encrypted account accepts only its own crypter and a key
    /// that opens it. On failure the account is left unchanged.
    pub fn encrypt(&self, crypter: &KeyCrypter, aes_key: &AesKey) -> Result<()> {
        let mut state = self.lock();
        let encrypted = state.keys.to_encrypted(crypter, aes_key)?;
        state.keys = encrypted;

        log::info!("🔒 Encrypted account {}", self);
        Ok(())
    }

    pub fn decrypt(&self, aes_key: &AesKey) -> Result<()> {
        let mut state = self.lock();
        let decrypted = state.keys.to_decrypted(aes_key)?;
        state.keys = decrypted;

        log::info!("🔓 Decrypted account {}", self);
        Ok(())
    }

    // ===== Messages =====

    /// Sign `request.message()` with the key behind `request.address()`
    pub fn sign_message(&self, request: &SignedMessage, aes_key: Option<&AesKey>) -> SignedMessage {
        let address = match BitAddress::parse(self.coin, request.address()) {
            Ok(address) => address,
            Err(e) => {
                log::debug!("Cannot sign for {}: {}", request.address(), e);
                return request.with_status(MessageStatus::AddressMalformed);
            }
        };

        let state = self.lock();
        let Some(key) = address
            .pubkey_hash()
            .and_then(|hash| state.keys.find_key_from_pub_hash(&hash))
        else {
            return request.with_status(MessageStatus::MissingPrivateKey);
        };

        match state.keys.signing_key(&key, aes_key) {
            Ok(secret) => {
                let hash = signed_message_hash(self.coin, request.message());
                request.signed(sign_message_hash(&secret, hash))
            }
            Err(KeyChainError::KeyIsEncrypted) => {
                request.with_status(MessageStatus::KeyIsEncrypted)
            }
            Err(e) => {
                log::debug!("No signing key for {}: {}", address, e);
                request.with_status(MessageStatus::MissingPrivateKey)
            }
        }
    }

    /// Check that `request` carries a signature by its address
    ///
    /// Only needs the coin type, so no lock is taken.
    pub fn verify_message(&self, request: &SignedMessage) -> SignedMessage {
        let Some(recovered) = request
            .signature()
            .and_then(|signature| recover_address(self.coin, request.message(), signature))
        else {
            return request.with_status(MessageStatus::InvalidMessageSignature);
        };

        let Ok(address) = BitAddress::parse(self.coin, request.address()) else {
            return request.with_status(MessageStatus::AddressMalformed);
        };

        if recovered.hash160() == address.hash160() {
            request.with_status(MessageStatus::VerifiedOk)
        } else {
            request.with_status(MessageStatus::InvalidSigningAddress)
        }
    }

    // ===== Transactions =====

    /// Build a send request without broadcasting anything
    ///
    /// A password is only accepted on encrypted accounts; it is stretched
    /// with the account's crypter into the request's AES key.
    pub fn send_coins_offline(
        &self,
        to: &BitAddress,
        amount: u64,
        password: Option<&str>,
    ) -> Result<SendRequest> {
        self.check_coin(to)?;

        let mut request = SendRequest::to(to.clone(), amount);
        if let Some(password) = password {
            let crypter = self.key_crypter().ok_or(KeyCrypterError::NotEncrypted)?;
            request.aes_key = Some(crypter.derive_key(password)?);
        }
        Ok(request)
    }

    /// Select inputs, add change and sign through the transaction completer
    ///
    /// # Panics
    ///
    /// Panics if `request` was already completed.
    pub fn complete_transaction(&self, request: &mut SendRequest) -> Result<()> {
        assert!(!request.completed, "send request already completed");
        let completer = self.completer()?;

        let state = self.lock();
        completer
            .complete_tx(state.keys.as_ref(), request)
            .map_err(completion_error)?;
        request.completed = true;

        log::debug!("Completed send of {} to {}", request.amount, request.to);
        Ok(())
    }

    /// Sign the inputs of `request` this account has keys for
    pub fn sign_transaction(&self, request: &mut SendRequest) -> Result<()> {
        let completer = self.completer()?;

        let state = self.lock();
        completer
            .sign_transaction(state.keys.as_ref(), request)
            .map_err(completion_error)?;
        Ok(())
    }

    fn completer(&self) -> Result<Arc<dyn TransactionCompleter>> {
        self.completer
            .clone()
            .ok_or(AccountError::WalletAccount(WalletAccountError::NoCompleter))
    }

    // ===== Persistence =====

    pub fn serialize_key_chain(&self) -> Vec<KeyRecord> {
        self.lock().keys.to_key_records()
    }
}

fn completion_error(error: CompletionError) -> AccountError {
    let error = match error {
        CompletionError::InsufficientFunds { missing } => {
            WalletAccountError::InsufficientFunds { missing }
        }
        CompletionError::Failed(reason) => WalletAccountError::Completion(reason),
    };
    AccountError::WalletAccount(error)
}

/// Hex SHA-256 of the coin id and the compressed account public key
fn account_id(coin: CoinType, root: &Xpub) -> String {
    let mut hasher = Sha256::new();
    hasher.update(coin.id().as_bytes());
    hasher.update(root.public_key.serialize());
    hex::encode(hasher.finalize())
}

impl fmt::Display for HdAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HdAccount {} {}", &self.id[..4], self.coin.name())
    }
}

impl fmt::Debug for HdAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdAccount")
            .field("id", &self.id)
            .field("coin", &self.coin)
            .field("keys", &self.lock().keys)
            .finish()
    }
}
