//! Common test utilities for HD pocket integration tests
//!
//! This module provides shared test infrastructure including:
//! - Logging setup
//! - Deterministic accounts with a small look-ahead window
//! - Cheap key crypters
//! - Recording collaborators (saver, watcher, transaction completer)

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hd_pocket::{
    AccountConfig, AddressWatcher, BitAddress, CoinType, CompletionError, KdfParams, KeyChain,
    KeyCrypter, HdAccount, SendRequest, TransactionCompleter, WalletSaver,
};

pub const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub const LOOKAHEAD: u32 = 5;

pub const FIRST_RECEIVE_ADDRESS: &str = "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA";

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

pub fn test_config(coin: CoinType) -> AccountConfig {
    AccountConfig {
        coin,
        lookahead: LOOKAHEAD,
        kdf: light_kdf(),
    }
}

/// Bitcoin account 0 of the all-"abandon" phrase, look-ahead 5
pub fn test_account() -> HdAccount {
    init_logging();
    HdAccount::from_mnemonic(MNEMONIC, "", 0, &test_config(CoinType::Bitcoin))
        .expect("Failed to restore test account")
}

pub fn light_kdf() -> KdfParams {
    KdfParams {
        memory_kb: 256,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn test_crypter() -> KeyCrypter {
    KeyCrypter::new(light_kdf())
}

/// Counts `save_now` calls
#[derive(Default)]
pub struct RecordingSaver {
    saves: AtomicUsize,
}

impl RecordingSaver {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl WalletSaver for RecordingSaver {
    fn save_now(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

/// Keeps every subscription batch
#[derive(Default)]
pub struct RecordingWatcher {
    batches: Mutex<Vec<(String, Vec<BitAddress>)>>,
}

impl RecordingWatcher {
    pub fn batches(&self) -> Vec<(String, Vec<BitAddress>)> {
        self.batches.lock().unwrap().clone()
    }
}

impl AddressWatcher for RecordingWatcher {
    fn subscribe_if_needed(&self, account_id: &str, addresses: &[BitAddress]) {
        self.batches
            .lock()
            .unwrap()
            .push((account_id.to_string(), addresses.to_vec()));
    }
}

/// Completer with a fixed balance; signing only counts calls
pub struct MockCompleter {
    pub balance: u64,
    pub signed: AtomicUsize,
}

impl MockCompleter {
    pub fn with_balance(balance: u64) -> Arc<Self> {
        Arc::new(Self {
            balance,
            signed: AtomicUsize::new(0),
        })
    }
}

impl TransactionCompleter for MockCompleter {
    fn complete_tx(
        &self,
        keys: &dyn KeyChain,
        request: &mut SendRequest,
    ) -> Result<(), CompletionError> {
        let amount = if request.empty_wallet {
            self.balance
        } else {
            request.amount
        };
        if amount > self.balance {
            return Err(CompletionError::InsufficientFunds {
                missing: amount - self.balance,
            });
        }
        if keys.is_encrypted() && request.aes_key.is_none() {
            return Err(CompletionError::Failed("key chain is encrypted".into()));
        }
        request.amount = amount;
        Ok(())
    }

    fn sign_transaction(
        &self,
        _keys: &dyn KeyChain,
        _request: &mut SendRequest,
    ) -> Result<(), CompletionError> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Address of the external key at `index`, from the active window
pub fn receive_address_at(account: &HdAccount, index: u32) -> BitAddress {
    let found = account
        .active_addresses()
        .into_iter()
        .find(|address| {
            address
                .pubkey_hash()
                .and_then(|hash| account.find_key_from_pub_hash(&hash))
                .map(|key| key.is_external() && key.index() == index)
                .unwrap_or(false)
        });
    found.unwrap_or_else(|| panic!("no active receive key at index {}", index))
}
