//! HD Pocket: one BIP44 account of a multi-coin wallet
//!
//! This crate manages the keys, addresses and usage state of a single
//! hierarchical deterministic account, keeping receive address issuance
//! inside the BIP44 gap limit so a restore from seed always finds the funds.
//!
//! # Architecture
//!
//! - **HdAccount**: the account surface, all state behind one lock
//! - **KeyChain**: external/internal BIP32 chains with a look-ahead window
//! - **UsageLedger**: last known status per watched address
//! - **KeyCrypter**: Argon2id + AES-256-GCM wrapping of private key material
//! - **Messages**: `signmessage` compatible signing and verification
//!
//! # Example
//!
//! ```ignore
//! use hd_pocket::{AccountConfig, HdAccount, SignedMessage};
//!
//! let config = AccountConfig::from_env();
//! let account = HdAccount::from_mnemonic(&words, "", 0, &config)?;
//!
//! // Hand out a new receive address, bounded by the look-ahead window
//! let address = account.fresh_receive_address()?;
//!
//! // Prove ownership
//! let request = SignedMessage::unsigned(address.to_string(), "hello");
//! let signed = account.sign_message(&request, None);
//! let verified = account.verify_message(&signed);
//! ```

// Public modules
pub mod account;
pub mod address;
pub mod coins;
pub mod config;
pub mod crypter;
pub mod error;
pub mod keychain;
pub mod ledger;
pub mod lookahead;
pub mod message;
pub mod transaction;

// Re-exports for convenience
pub use account::{AddressWatcher, HdAccount, WalletSaver};
pub use address::{AddressKind, BitAddress};
pub use coins::CoinType;
pub use config::AccountConfig;
pub use crypter::{AesKey, EncryptedData, KdfParams, KeyCrypter};
pub use error::{
    AccountError, AddressFormatError, KeyChainError, KeyCrypterError, WalletAccountError,
};
pub use keychain::{
    ChainKind, DerivedKey, KeyChain, KeyPurpose, KeyRecord, SecretRecord, SimpleHdKeyChain,
    DEFAULT_LOOKAHEAD, MAX_LOOKAHEAD,
};
pub use ledger::UsageLedger;
pub use message::{MessageStatus, SignedMessage};
pub use transaction::{CompletionError, SendRequest, TransactionCompleter};

// Common result type
pub type Result<T> = std::result::Result<T, AccountError>;
