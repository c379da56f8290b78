//! BIP44 look-ahead gate for fresh receive addresses
//!
//! Wallets restoring from a seed stop scanning after LOOKAHEAD unused
//! addresses in a row, so the receive cursor must never run further than
//! that past the last address seen used:
//!
//! - no used external key: the cursor may reach `LOOKAHEAD - 1`
//! - last used external key at `i`: the cursor may reach `i + LOOKAHEAD`
//!
//! A fresh address may be minted while the current unused index is strictly
//! below that maximum. Both functions scan the whole ledger and expect the
//! caller to hold the account lock.

use crate::keychain::{KeyChain, KeyPurpose};
use crate::ledger::UsageLedger;

/// Highest index the receive cursor may stand on after minting
pub fn maximum_key_index(ledger: &UsageLedger, keys: &dyn KeyChain) -> u32 {
    let lookahead = keys.lookahead();

    let last_used = ledger
        .used_addresses()
        .filter_map(|address| address.pubkey_hash())
        .filter_map(|hash| keys.find_key_from_pub_hash(&hash))
        .filter(|key| keys.is_external(key))
        .map(|key| key.index())
        .max();

    let maximum = match last_used {
        Some(index) => index.saturating_add(lookahead),
        None => lookahead.saturating_sub(1),
    };

    log::debug!("Maximum key index for new key is {}", maximum);
    maximum
}

pub fn can_issue_fresh(ledger: &UsageLedger, keys: &dyn KeyChain) -> bool {
    keys.current_unused_index(KeyPurpose::ReceiveFunds) < maximum_key_index(ledger, keys)
}
