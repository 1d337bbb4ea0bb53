//! A watched address: seen window, spend-relation references and ledgers

use crate::config::SpendPolicy;
use crate::ledger::{self, LedgerEntry};
use crate::txio::{TxIOPair, UnspentTxOut};
use crate::types::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// BtcAddress: ℋ₁₆₀ × references into the owning wallet's TxIOPair map.
///
/// The address never owns a [`TxIOPair`]; it keeps outpoint keys into the
/// wallet's map, confirmed and zero-conf separately. An outpoint promoted
/// from zero-conf to confirmed sits in both sets until the next zero-conf
/// clear, so every query walks their union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtcAddress {
    hash160: Hash160,
    first_seen_height: Option<u32>,
    first_seen_time: u64,
    last_seen_height: Option<u32>,
    last_seen_time: u64,
    relevant_txio: BTreeSet<OutPoint>,
    relevant_txio_zc: BTreeSet<OutPoint>,
    ledger: Vec<LedgerEntry>,
    ledger_zc: Vec<LedgerEntry>,
}

impl BtcAddress {
    pub fn new(hash160: Hash160) -> Self {
        BtcAddress {
            hash160,
            first_seen_height: None,
            first_seen_time: 0,
            last_seen_height: None,
            last_seen_time: 0,
            relevant_txio: BTreeSet::new(),
            relevant_txio_zc: BTreeSet::new(),
            ledger: Vec::new(),
            ledger_zc: Vec::new(),
        }
    }

    /// Address with a known activity window, e.g. restored from a wallet file
    pub fn with_seen(
        hash160: Hash160,
        first_seen_time: u64,
        first_seen_height: Option<u32>,
        last_seen_time: u64,
        last_seen_height: Option<u32>,
    ) -> Self {
        BtcAddress {
            first_seen_height,
            first_seen_time,
            last_seen_height,
            last_seen_time,
            ..Self::new(hash160)
        }
    }

    pub fn hash160(&self) -> Hash160 {
        self.hash160
    }

    pub fn first_seen_height(&self) -> Option<u32> {
        self.first_seen_height
    }

    pub fn first_seen_time(&self) -> u64 {
        self.first_seen_time
    }

    pub fn last_seen_height(&self) -> Option<u32> {
        self.last_seen_height
    }

    pub fn last_seen_time(&self) -> u64 {
        self.last_seen_time
    }

    pub(crate) fn mark_seen(&mut self, height: Option<u32>, time: u64) {
        if self.first_seen_time == 0 {
            self.first_seen_height = height;
            self.first_seen_time = time;
        }
        self.mark_last_seen(height, time);
    }

    pub(crate) fn mark_last_seen(&mut self, height: Option<u32>, time: u64) {
        self.last_seen_height = height;
        self.last_seen_time = time;
    }

    pub(crate) fn add_txio(&mut self, outpoint: OutPoint, is_zero_conf: bool) {
        if is_zero_conf {
            self.relevant_txio_zc.insert(outpoint);
        } else {
            self.relevant_txio.insert(outpoint);
        }
    }

    pub(crate) fn add_ledger_entry(&mut self, entry: LedgerEntry) {
        if entry.is_zero_conf() {
            self.ledger_zc.push(entry);
        } else {
            self.ledger.push(entry);
        }
    }

    pub(crate) fn clear_zero_conf(&mut self) {
        self.ledger_zc.clear();
        self.relevant_txio_zc.clear();
    }

    /// Outpoints of every relation this address takes part in
    pub fn txio_outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.relevant_txio.union(&self.relevant_txio_zc)
    }

    pub fn num_txio(&self) -> usize {
        self.txio_outpoints().count()
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub fn ledger_zc(&self) -> &[LedgerEntry] {
        &self.ledger_zc
    }

    // ========================================================================
    // BALANCES
    // ========================================================================

    fn txios<'a>(
        &'a self,
        txio_map: &'a BTreeMap<OutPoint, TxIOPair>,
    ) -> impl Iterator<Item = &'a TxIOPair> + 'a {
        self.txio_outpoints().filter_map(move |op| txio_map.get(op))
    }

    pub fn spendable_balance(
        &self,
        txio_map: &BTreeMap<OutPoint, TxIOPair>,
        current_height: u32,
        chain: &impl TxLookup,
        policy: &SpendPolicy,
    ) -> Amount {
        self.txios(txio_map)
            .filter(|txio| txio.is_spendable(current_height, chain, policy))
            .map(TxIOPair::value)
            .sum()
    }

    pub fn unconfirmed_balance(
        &self,
        txio_map: &BTreeMap<OutPoint, TxIOPair>,
        current_height: u32,
        chain: &impl TxLookup,
        policy: &SpendPolicy,
    ) -> Amount {
        self.txios(txio_map)
            .filter(|txio| txio.is_mine_but_unconfirmed(current_height, chain, policy))
            .map(TxIOPair::value)
            .sum()
    }

    pub fn full_balance(&self, txio_map: &BTreeMap<OutPoint, TxIOPair>, chain: &impl TxLookup) -> Amount {
        self.txios(txio_map)
            .filter(|txio| txio.is_unspent(chain))
            .map(TxIOPair::value)
            .sum()
    }

    pub fn spendable_tx_out_list(
        &self,
        txio_map: &BTreeMap<OutPoint, TxIOPair>,
        current_height: u32,
        chain: &impl TxLookup,
        policy: &SpendPolicy,
    ) -> Vec<UnspentTxOut> {
        self.txios(txio_map)
            .filter(|txio| txio.is_spendable(current_height, chain, policy))
            .filter_map(|txio| txio.to_unspent(current_height, chain))
            .collect()
    }

    pub fn full_tx_out_list(
        &self,
        txio_map: &BTreeMap<OutPoint, TxIOPair>,
        current_height: u32,
        chain: &impl TxLookup,
    ) -> Vec<UnspentTxOut> {
        self.txios(txio_map)
            .filter(|txio| txio.is_unspent(chain))
            .filter_map(|txio| txio.to_unspent(current_height, chain))
            .collect()
    }

    // ========================================================================
    // LEDGER MAINTENANCE
    // ========================================================================

    /// Returns the number of entries removed
    pub fn remove_invalid_entries(&mut self) -> usize {
        let before = self.ledger.len();
        ledger::remove_invalid(&mut self.ledger);
        before - self.ledger.len()
    }

    pub fn sort_ledger(&mut self) {
        ledger::sort_ledger(&mut self.ledger);
    }

    pub(crate) fn apply_reorg(
        &mut self,
        invalidated: &HashSet<Hash>,
        affected: &HashSet<Hash>,
        chain: &impl TxLookup,
    ) {
        ledger::apply_reorg(&mut self.ledger, invalidated, affected, chain);
    }

    pub(crate) fn revalidate(&mut self, tx_hash: &Hash, height: u32) -> bool {
        ledger::revalidate(&mut self.ledger, tx_hash, height)
    }
}
