//! Error types for HD pocket operations
//!
//! One enum per concern (addresses, key chain, key encryption, transaction
//! completion), composed into [`AccountError`] for the account surface.
//! Message signing and verification never fail with these; their outcomes
//! are reported through [`crate::message::MessageStatus`].

use thiserror::Error;

use crate::coins::CoinType;

/// Core error type for account operations
#[derive(Error, Debug)]
pub enum AccountError {
    /// Fresh receive address requested past the BIP44 look-ahead window
    #[error("BIP44 key look-ahead exceeded: current key index {current}, maximum {maximum}")]
    LookAheadExceeded { current: u32, maximum: u32 },

    #[error(transparent)]
    WalletAccount(#[from] WalletAccountError),

    #[error("Key encryption error: {0}")]
    KeyEncryption(#[from] KeyCrypterError),

    #[error("Key chain error: {0}")]
    KeyChain(#[from] KeyChainError),

    #[error("Invalid address: {0}")]
    Address(#[from] AddressFormatError),

    /// An address of another coin was handed to this account
    #[error("Wrong address type: expected {expected}, found {found}")]
    WrongAddressType { expected: CoinType, found: CoinType },
}

/// Errors surfaced from transaction completion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletAccountError {
    #[error("Insufficient funds: missing {missing} units")]
    InsufficientFunds { missing: u64 },

    #[error("Transaction completion failed: {0}")]
    Completion(String),

    #[error("No transaction completer configured for this account")]
    NoCompleter,
}

#[derive(Error, Debug)]
pub enum KeyChainError {
    #[error("BIP32 error: {0}")]
    Bip32(#[from] bitcoin::bip32::Error),

    #[error("Key is encrypted and no valid decryption key was supplied")]
    KeyIsEncrypted,

    #[error("Key chain holds no private key material")]
    MissingPrivateKey,

    #[error("Invalid key record: {0}")]
    InvalidRecord(String),

    #[error("Invalid mnemonic: {0}")]
    Mnemonic(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyCrypterError {
    /// Authentication failed, the AES key does not match the encrypted data
    #[error("Could not decrypt key material: invalid key")]
    InvalidKey,

    #[error("Key chain is not encrypted")]
    NotEncrypted,

    #[error("Key chain is already encrypted with a different key crypter")]
    CrypterMismatch,

    #[error("Watching-only key chain has no key material to encrypt")]
    WatchingOnly,

    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("Cipher error: {0}")]
    Cipher(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("Base58 decoding failed: {0}")]
    Base58(String),

    #[error("Invalid address payload length: {0}")]
    InvalidLength(usize),

    #[error("Version byte {version} is not valid for {coin}")]
    WrongNetwork { version: u8, coin: CoinType },
}
