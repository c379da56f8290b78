//! Transaction completion seam
//!
//! Coin selection, fee calculation and input signing live outside this crate.
//! The account hands a [`SendRequest`] and its key chain to a
//! [`TransactionCompleter`] while holding its lock.

use bitcoin::Transaction;

use crate::address::BitAddress;
use crate::crypter::AesKey;
use crate::keychain::KeyChain;

/// Spend request, filled in by the completer
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub to: BitAddress,
    /// Amount in the coin's smallest unit
    pub amount: u64,
    /// Fee rate override, per kilobyte
    pub fee_per_kb: Option<u64>,
    /// Key used to unwrap encrypted signing keys
    pub aes_key: Option<AesKey>,
    /// Send everything, `amount` is ignored
    pub empty_wallet: bool,
    /// Built transaction, set by the completer
    pub tx: Option<Transaction>,
    /// Set once `complete_transaction` succeeded
    pub completed: bool,
}

impl SendRequest {
    pub fn to(address: BitAddress, amount: u64) -> Self {
        Self {
            to: address,
            amount,
            fee_per_kb: None,
            aes_key: None,
            empty_wallet: false,
            tx: None,
            completed: false,
        }
    }

    pub fn empty_wallet(address: BitAddress) -> Self {
        Self {
            empty_wallet: true,
            ..Self::to(address, 0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    InsufficientFunds { missing: u64 },
    Failed(String),
}

/// Builds and signs transactions for an account
///
/// `sign_transaction` may leave inputs unsigned when the key chain cannot
/// provide their keys; that is not an error.
pub trait TransactionCompleter: Send + Sync {
    fn complete_tx(
        &self,
        keys: &dyn KeyChain,
        request: &mut SendRequest,
    ) -> Result<(), CompletionError>;

    fn sign_transaction(
        &self,
        keys: &dyn KeyChain,
        request: &mut SendRequest,
    ) -> Result<(), CompletionError>;
}
