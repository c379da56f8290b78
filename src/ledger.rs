//! Usage ledger: last known status per address
//!
//! `Some(status)` (the empty string included) means the address has been
//! observed used; `None` means it is watched but was never seen used.
//! Entries are only ever added or updated.

use std::collections::HashMap;

use crate::address::BitAddress;

#[derive(Debug, Clone, Default)]
pub struct UsageLedger {
    statuses: HashMap<BitAddress, Option<String>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an address as watched without marking it used
    ///
    /// Returns true when the address was not in the ledger before.
    pub fn watch(&mut self, address: &BitAddress) -> bool {
        if self.statuses.contains_key(address) {
            return false;
        }
        self.statuses.insert(address.clone(), None);
        true
    }

    /// Record an observed status, overwriting any previous one
    pub fn mark_used(&mut self, address: &BitAddress, status: impl Into<String>) {
        self.statuses.insert(address.clone(), Some(status.into()));
    }

    /// Record usage, keeping the existing status if one is already known
    pub fn mark_used_if_unknown(&mut self, address: &BitAddress) {
        let entry = self.statuses.entry(address.clone()).or_insert(None);
        if entry.is_none() {
            *entry = Some(String::new());
        }
    }

    pub fn status(&self, address: &BitAddress) -> Option<&str> {
        self.statuses.get(address).and_then(|s| s.as_deref())
    }

    pub fn is_used(&self, address: &BitAddress) -> bool {
        self.status(address).is_some()
    }

    pub fn is_watched(&self, address: &BitAddress) -> bool {
        self.statuses.contains_key(address)
    }

    /// Addresses with a present status
    pub fn used_addresses(&self) -> impl Iterator<Item = &BitAddress> {
        self.statuses
            .iter()
            .filter(|(_, status)| status.is_some())
            .map(|(address, _)| address)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
