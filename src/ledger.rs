//! Balance-effect records for an address or a whole wallet

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// LedgerEntry: net effect of one transaction on one scope.
///
/// `addr` is `None` for wallet-wide entries. `block_height` is `None` for
/// zero-conf entries. Everything except `is_valid` and `block_height` is
/// fixed at creation; those two follow reorganizations.
///
/// Equality and ordering compare chain position only: height, then index,
/// with zero-conf entries after every confirmed one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub addr: Option<Hash160>,
    pub value: i64,
    pub block_height: Option<u32>,
    pub tx_hash: Hash,
    pub tx_index: u32,
    pub timestamp: u64,
    pub is_sent_to_self: bool,
    pub is_change_back: bool,
    pub is_valid: bool,
}

impl LedgerEntry {
    pub fn new(
        addr: Option<Hash160>,
        value: i64,
        block_height: Option<u32>,
        tx_hash: Hash,
        tx_index: u32,
        timestamp: u64,
    ) -> Self {
        LedgerEntry {
            addr,
            value,
            block_height,
            tx_hash,
            tx_index,
            timestamp,
            is_sent_to_self: false,
            is_change_back: false,
            is_valid: true,
        }
    }

    pub fn is_zero_conf(&self) -> bool {
        self.block_height.is_none()
    }

    /// Chronological key: confirmed heights ascending, zero-conf last
    pub fn sort_key(&self) -> (bool, u32, u32) {
        (
            self.block_height.is_none(),
            self.block_height.unwrap_or(0),
            self.tx_index,
        )
    }
}

impl PartialEq for LedgerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.sort_key() == other.sort_key()
    }
}

impl Eq for LedgerEntry {}

impl PartialOrd for LedgerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LedgerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Stable chronological sort
pub fn sort_ledger(entries: &mut [LedgerEntry]) {
    entries.sort_by_key(LedgerEntry::sort_key);
}

/// Apply a reorg report to one ledger.
///
/// Entries of invalidated transactions become invalid. Entries of affected
/// transactions still on the main chain take their new height; nothing is
/// revalidated unless the transaction is back on the main chain.
pub fn apply_reorg(
    entries: &mut [LedgerEntry],
    invalidated: &HashSet<Hash>,
    affected: &HashSet<Hash>,
    chain: &impl TxLookup,
) {
    for entry in entries.iter_mut() {
        if invalidated.contains(&entry.tx_hash) {
            entry.is_valid = false;
        }
        if affected.contains(&entry.tx_hash) {
            if let Some(height) = chain.main_branch_height(&entry.tx_hash) {
                entry.block_height = Some(height);
                entry.is_valid = true;
            }
        }
    }
}

/// Restore entries of a transaction confirmed again at `height`.
///
/// Returns true if any entry changed.
pub fn revalidate(entries: &mut [LedgerEntry], tx_hash: &Hash, height: u32) -> bool {
    let mut changed = false;
    for entry in entries.iter_mut().filter(|e| e.tx_hash == *tx_hash) {
        if !entry.is_valid || entry.block_height != Some(height) {
            entry.is_valid = true;
            entry.block_height = Some(height);
            changed = true;
        }
    }
    changed
}

/// Drop entries marked invalid
pub fn remove_invalid(entries: &mut Vec<LedgerEntry>) {
    entries.retain(|e| e.is_valid);
}
