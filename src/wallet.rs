//! Watch-list wallet: relevance filters, transaction scanning and balances
//!
//! The wallet owns every [`TxIOPair`] in one outpoint-keyed map; addresses
//! only hold outpoint keys into it. Chain state is never stored here: all
//! confirmation questions go through a [`TxLookup`].

use crate::address::BtcAddress;
use crate::config::SpendPolicy;
use crate::ledger::{self, LedgerEntry};
use crate::reorganization::ReorgReport;
use crate::script::script_contains;
use crate::serialize::hash_to_display_hex;
use crate::transaction::{TxOutView, TxRef};
use crate::txio::{TxIOPair, UnspentTxOut};
use crate::types::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Outcome of scanning one transaction against a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxScan {
    /// Touches no watched address or owned outpoint
    NotRelevant,
    /// Relevant, but every relation was already recorded
    Unchanged,
    /// New relations and ledger entries were recorded
    Recorded,
    /// Zero-conf transaction conflicting with known state; nothing changed
    Rejected(String),
}

/// BtcWallet: ordered watch-list × TxIOPair map × ledgers
#[derive(Debug, Clone, Default)]
pub struct BtcWallet {
    addresses: Vec<BtcAddress>,
    address_ids: HashMap<Hash160, usize>,
    txio_map: BTreeMap<OutPoint, TxIOPair>,
    ledger: Vec<LedgerEntry>,
    ledger_zc: Vec<LedgerEntry>,
    tx_set: HashSet<Hash>,
    non_std_txio: BTreeMap<OutPoint, TxIOPair>,
    non_std_unspent: BTreeSet<OutPoint>,
    policy: SpendPolicy,
}

impl BtcWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SpendPolicy) -> Self {
        BtcWallet {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &SpendPolicy {
        &self.policy
    }

    // ========================================================================
    // WATCH-LIST
    // ========================================================================

    /// Watch `hash160`; returns false if it was already watched
    pub fn add_address(&mut self, hash160: Hash160) -> bool {
        self.insert_address(BtcAddress::new(hash160))
    }

    pub fn add_address_with_seen(
        &mut self,
        hash160: Hash160,
        first_seen_time: u64,
        first_seen_height: Option<u32>,
        last_seen_time: u64,
        last_seen_height: Option<u32>,
    ) -> bool {
        self.insert_address(BtcAddress::with_seen(
            hash160,
            first_seen_time,
            first_seen_height,
            last_seen_time,
            last_seen_height,
        ))
    }

    fn insert_address(&mut self, address: BtcAddress) -> bool {
        if self.address_ids.contains_key(&address.hash160()) {
            return false;
        }
        self.address_ids.insert(address.hash160(), self.addresses.len());
        self.addresses.push(address);
        true
    }

    pub fn has_address(&self, hash160: &Hash160) -> bool {
        self.address_ids.contains_key(hash160)
    }

    pub fn address(&self, hash160: &Hash160) -> Option<&BtcAddress> {
        self.address_ids.get(hash160).map(|&id| &self.addresses[id])
    }

    /// Watched addresses in insertion order
    pub fn addresses(&self) -> &[BtcAddress] {
        &self.addresses
    }

    pub fn num_addresses(&self) -> usize {
        self.addresses.len()
    }

    pub fn address_hashes(&self) -> impl Iterator<Item = Hash160> + '_ {
        self.addresses.iter().map(BtcAddress::hash160)
    }

    pub fn txio_map(&self) -> &BTreeMap<OutPoint, TxIOPair> {
        &self.txio_map
    }

    pub fn is_outpoint_mine(&self, tx_hash: &Hash, index: u32) -> bool {
        self.txio_map.contains_key(&OutPoint::new(*tx_hash, index))
    }

    /// Hashes of every transaction that ever produced a ledger entry
    pub fn relevant_tx_hashes(&self) -> &HashSet<Hash> {
        &self.tx_set
    }

    /// Non-standard outputs mentioning a watched hash160
    pub fn non_std_outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.non_std_txio.keys()
    }

    pub fn non_std_unspent(&self) -> &BTreeSet<OutPoint> {
        &self.non_std_unspent
    }

    // ========================================================================
    // RELEVANCE FILTERS
    // ========================================================================

    /// IsMineBulkFilter: 𝒯𝒳 → (relevant, input is ours)
    ///
    /// 1. Any input spending an outpoint in the TxIOPair map → (true, true)
    /// 2. Any standard output paying a watched hash160 → (true, false)
    /// 3. Any non-standard output embedding a watched hash160 → (true, false)
    ///
    /// Never mutates the wallet.
    pub fn is_mine_bulk_filter(&self, tx: &TxRef) -> (bool, bool) {
        for i in 0..tx.num_inputs() {
            if let Some(outpoint) = tx.outpoint(i) {
                if self.txio_map.contains_key(&outpoint) {
                    return (true, true);
                }
            }
        }

        for txout in tx.outputs() {
            match txout.recipient() {
                Some(recipient) => {
                    if self.address_ids.contains_key(&recipient) {
                        return (true, false);
                    }
                }
                None => {
                    if self.non_std_owner(&txout).is_some() {
                        return (true, false);
                    }
                }
            }
        }

        (false, false)
    }

    /// Bulk filter against this wallet's own watch-list
    pub fn prefilter_tx(
        &self,
        tx: &TxRef,
        our_outpoints: &mut HashSet<OutPoint>,
        relevant: &mut Vec<Hash>,
    ) -> bool {
        prefilter_tx(tx, |h| self.address_ids.contains_key(h), our_outpoints, relevant)
    }

    fn non_std_owner(&self, txout: &TxOutView<'_>) -> Option<Hash160> {
        self.addresses
            .iter()
            .map(BtcAddress::hash160)
            .find(|h| script_contains(txout.script_pubkey, h))
    }

    // ========================================================================
    // SCANNING
    // ========================================================================

    /// ScanTx: 𝒯𝒳 × ℕ × 𝕋 × ℕ? → TxScan
    ///
    /// `height` is `None` for zero-conf transactions.
    ///
    /// 1. Reject irrelevant transactions via the bulk filter
    /// 2. Zero-conf only: reject conflicts with known spends or bindings
    /// 3. For each input spending one of our outputs, bind the spend and
    ///    record a negative address entry
    /// 4. For each output paying a watched address, bind (or promote) the
    ///    relation and record a positive address entry
    /// 5. Record one wallet entry with the net amount if anything was new
    pub fn scan_tx(
        &mut self,
        tx: &TxRef,
        tx_index: u32,
        time: u64,
        height: Option<u32>,
        chain: &impl TxLookup,
    ) -> TxScan {
        let (is_relevant, any_tx_in_is_ours) = self.is_mine_bulk_filter(tx);
        if !is_relevant {
            return TxScan::NotRelevant;
        }

        let is_zero_conf = height.is_none();
        let tx_hash = tx.hash();
        if is_zero_conf {
            if let Some(reason) = self.zero_conf_conflict(tx, chain) {
                warn!(tx = %hash_to_display_hex(&tx_hash), %reason, "rejected zero-conf transaction");
                return TxScan::Rejected(reason);
            }
        }

        let is_coinbase = tx.is_coinbase();
        let mut total: i64 = 0;
        let mut any_new_tx_in = false;
        let mut any_new_tx_out = false;
        let mut tx_out_is_ours = vec![false; tx.num_outputs()];

        for txin in tx.inputs() {
            if txin.is_coinbase() {
                continue;
            }
            let outpoint = txin.prevout;

            let txio = match self.txio_map.get_mut(&outpoint) {
                Some(txio) => txio,
                None => {
                    if let Some(non_std) = self.non_std_txio.get_mut(&outpoint) {
                        non_std.set_tx_in(tx_hash, txin.index, is_zero_conf);
                        self.non_std_unspent.remove(&outpoint);
                    }
                    continue;
                }
            };
            let addr_id = match txio.recipient().and_then(|r| self.address_ids.get(&r)) {
                Some(&id) => id,
                None => continue,
            };

            let value = txio.value() as i64;
            total -= value;

            if txio.has_tx_in_in_main(chain) {
                continue;
            }
            if !txio.set_tx_in(tx_hash, txin.index, is_zero_conf) {
                continue;
            }
            any_new_tx_in = true;

            let address = &mut self.addresses[addr_id];
            address.add_txio(outpoint, is_zero_conf);
            address.add_ledger_entry(LedgerEntry::new(
                Some(address.hash160()),
                -value,
                height,
                tx_hash,
                txin.index,
                time,
            ));
            address.mark_last_seen(height, time);
        }

        for txout in tx.outputs() {
            let recipient = match txout.recipient() {
                Some(recipient) => recipient,
                None => {
                    self.scan_non_std(tx_hash, &txout, height);
                    continue;
                }
            };
            let addr_id = match self.address_ids.get(&recipient) {
                Some(&id) => id,
                None => continue,
            };

            total += txout.value as i64;
            tx_out_is_ours[txout.index as usize] = true;

            let outpoint = OutPoint::new(tx_hash, txout.index);
            let txio = self.txio_map.entry(outpoint).or_default();
            let already_bound =
                txio.has_tx_out_in_main(chain) || (is_zero_conf && txio.has_tx_out_zc());
            if already_bound || !txio.set_tx_out(tx_hash, &txout, is_zero_conf) {
                continue;
            }
            if any_tx_in_is_ours {
                txio.set_tx_out_from_self();
            }
            if is_coinbase {
                txio.set_from_coinbase();
            }
            any_new_tx_out = true;

            let address = &mut self.addresses[addr_id];
            address.add_txio(outpoint, is_zero_conf);
            address.add_ledger_entry(LedgerEntry::new(
                Some(address.hash160()),
                txout.value as i64,
                height,
                tx_hash,
                txout.index,
                time,
            ));
            address.mark_seen(height, time);
        }

        // A transaction mined again after a reorg is already bound
        let refreshed = match height {
            Some(height) => self.revalidate_entries(&tx_hash, height),
            None => false,
        };
        if !any_new_tx_in && !any_new_tx_out {
            return if refreshed { TxScan::Recorded } else { TxScan::Unchanged };
        }

        let any_tx_out_is_ours = tx_out_is_ours.iter().any(|&ours| ours);
        let all_tx_out_is_ours = tx_out_is_ours.iter().all(|&ours| ours);
        let is_sent_to_self = any_tx_in_is_ours && all_tx_out_is_ours;

        let mut entry = LedgerEntry::new(None, total, height, tx_hash, tx_index, time);
        entry.is_sent_to_self = is_sent_to_self;
        entry.is_change_back = any_tx_in_is_ours && any_tx_out_is_ours && !is_sent_to_self;

        debug!(
            tx = %hash_to_display_hex(&tx_hash),
            ?height,
            value = total,
            "recorded wallet transaction"
        );

        self.tx_set.insert(tx_hash);
        if is_zero_conf {
            self.ledger_zc.push(entry);
        } else {
            self.ledger.push(entry);
        }
        TxScan::Recorded
    }

    /// Reason a zero-conf transaction cannot be layered on current state
    fn zero_conf_conflict(&self, tx: &TxRef, chain: &impl TxLookup) -> Option<String> {
        for txin in tx.inputs() {
            let txio = match self.txio_map.get(&txin.prevout) {
                Some(txio) => txio,
                None => continue,
            };
            if !txio.recipient().map_or(false, |r| self.address_ids.contains_key(&r)) {
                continue;
            }
            if txio.has_tx_in_zc() {
                return Some(format!(
                    "input {} double-spends an output already spent by a zero-conf transaction",
                    txin.index
                ));
            }
            if txio.has_tx_in_in_main(chain) {
                return Some(format!(
                    "input {} spends an output already spent on the main chain",
                    txin.index
                ));
            }
        }

        let tx_hash = tx.hash();
        for txout in tx.outputs() {
            if !txout.recipient().map_or(false, |r| self.address_ids.contains_key(&r)) {
                continue;
            }
            if let Some(txio) = self.txio_map.get(&OutPoint::new(tx_hash, txout.index)) {
                if txio.has_tx_out_in_main(chain) {
                    return Some(format!("output {} is already confirmed", txout.index));
                }
                if txio.has_tx_out_zc() {
                    return Some(format!("output {} is already in the zero-conf pool", txout.index));
                }
            }
        }
        None
    }

    /// Track an unclassifiable output that embeds a watched hash160
    fn scan_non_std(&mut self, tx_hash: Hash, txout: &TxOutView<'_>, height: Option<u32>) {
        let owner = match self.non_std_owner(txout) {
            Some(owner) => owner,
            None => return,
        };

        warn!(
            ?height,
            tx = %hash_to_display_hex(&tx_hash),
            output = txout.index,
            hash160 = %hex::encode(owner),
            script = %hex::encode(txout.script_pubkey),
            "non-standard output references a watched address"
        );

        let outpoint = OutPoint::new(tx_hash, txout.index);
        self.non_std_unspent.insert(outpoint);
        self.non_std_txio.entry(outpoint).or_insert_with(|| {
            let mut txio = TxIOPair::new();
            txio.set_tx_out(tx_hash, txout, height.is_none());
            txio
        });
    }

    /// Drop every zero-conf-derived ledger entry and binding.
    ///
    /// Relations that only existed through a zero-conf output are removed.
    pub fn clear_zero_conf(&mut self) {
        self.ledger_zc.clear();
        for address in &mut self.addresses {
            address.clear_zero_conf();
        }

        for txio in self.txio_map.values_mut() {
            txio.clear_zc_fields();
        }
        self.txio_map.retain(|_, txio| txio.has_tx_out());

        for txio in self.non_std_txio.values_mut() {
            txio.clear_zc_fields();
        }
        self.non_std_txio.retain(|_, txio| txio.has_tx_out());
        self.non_std_unspent = self
            .non_std_txio
            .iter()
            .filter(|(_, txio)| !txio.has_tx_in())
            .map(|(op, _)| *op)
            .collect();
    }

    /// Restore wallet and address entries of a transaction confirmed at `height`
    fn revalidate_entries(&mut self, tx_hash: &Hash, height: u32) -> bool {
        let mut changed = ledger::revalidate(&mut self.ledger, tx_hash, height);
        for address in &mut self.addresses {
            changed |= address.revalidate(tx_hash, height);
        }
        if changed {
            debug!(tx = %hash_to_display_hex(tx_hash), height, "revalidated ledger entries");
        }
        changed
    }

    /// Mark and re-height confirmed ledger entries after a reorganization
    pub fn apply_reorg(&mut self, report: &ReorgReport, chain: &impl TxLookup) {
        ledger::apply_reorg(&mut self.ledger, &report.invalidated, &report.affected, chain);
        for address in &mut self.addresses {
            address.apply_reorg(&report.invalidated, &report.affected, chain);
        }
    }

    // ========================================================================
    // BALANCES
    // ========================================================================

    pub fn spendable_balance(&self, current_height: u32, chain: &impl TxLookup) -> Amount {
        self.txio_map
            .values()
            .filter(|txio| txio.is_spendable(current_height, chain, &self.policy))
            .map(TxIOPair::value)
            .sum()
    }

    pub fn unconfirmed_balance(&self, current_height: u32, chain: &impl TxLookup) -> Amount {
        self.txio_map
            .values()
            .filter(|txio| txio.is_mine_but_unconfirmed(current_height, chain, &self.policy))
            .map(TxIOPair::value)
            .sum()
    }

    pub fn full_balance(&self, chain: &impl TxLookup) -> Amount {
        self.txio_map
            .values()
            .filter(|txio| txio.is_unspent(chain))
            .map(TxIOPair::value)
            .sum()
    }

    pub fn spendable_tx_out_list(&self, current_height: u32, chain: &impl TxLookup) -> Vec<UnspentTxOut> {
        self.txio_map
            .values()
            .filter(|txio| txio.is_spendable(current_height, chain, &self.policy))
            .filter_map(|txio| txio.to_unspent(current_height, chain))
            .collect()
    }

    pub fn full_tx_out_list(&self, current_height: u32, chain: &impl TxLookup) -> Vec<UnspentTxOut> {
        self.txio_map
            .values()
            .filter(|txio| txio.is_unspent(chain))
            .filter_map(|txio| txio.to_unspent(current_height, chain))
            .collect()
    }

    /// Zero for addresses that are not watched
    pub fn address_spendable_balance(
        &self,
        hash160: &Hash160,
        current_height: u32,
        chain: &impl TxLookup,
    ) -> Amount {
        self.address(hash160).map_or(0, |a| {
            a.spendable_balance(&self.txio_map, current_height, chain, &self.policy)
        })
    }

    pub fn address_unconfirmed_balance(
        &self,
        hash160: &Hash160,
        current_height: u32,
        chain: &impl TxLookup,
    ) -> Amount {
        self.address(hash160).map_or(0, |a| {
            a.unconfirmed_balance(&self.txio_map, current_height, chain, &self.policy)
        })
    }

    pub fn address_full_balance(&self, hash160: &Hash160, chain: &impl TxLookup) -> Amount {
        self.address(hash160)
            .map_or(0, |a| a.full_balance(&self.txio_map, chain))
    }

    pub fn address_spendable_tx_out_list(
        &self,
        hash160: &Hash160,
        current_height: u32,
        chain: &impl TxLookup,
    ) -> Vec<UnspentTxOut> {
        self.address(hash160).map_or_else(Vec::new, |a| {
            a.spendable_tx_out_list(&self.txio_map, current_height, chain, &self.policy)
        })
    }

    pub fn address_full_tx_out_list(
        &self,
        hash160: &Hash160,
        current_height: u32,
        chain: &impl TxLookup,
    ) -> Vec<UnspentTxOut> {
        self.address(hash160)
            .map_or_else(Vec::new, |a| a.full_tx_out_list(&self.txio_map, current_height, chain))
    }

    // ========================================================================
    // LEDGERS
    // ========================================================================

    /// Confirmed ledger of the wallet, or of one watched address
    pub fn ledger(&self, addr: Option<&Hash160>) -> &[LedgerEntry] {
        match addr {
            None => &self.ledger,
            Some(hash160) => self.address(hash160).map(BtcAddress::ledger).unwrap_or(&[]),
        }
    }

    pub fn ledger_zc(&self, addr: Option<&Hash160>) -> &[LedgerEntry] {
        match addr {
            None => &self.ledger_zc,
            Some(hash160) => self.address(hash160).map(BtcAddress::ledger_zc).unwrap_or(&[]),
        }
    }

    /// Returns the number of wallet-level entries removed
    pub fn remove_invalid_entries(&mut self) -> usize {
        let before = self.ledger.len();
        ledger::remove_invalid(&mut self.ledger);
        for address in &mut self.addresses {
            address.remove_invalid_entries();
        }
        before - self.ledger.len()
    }

    pub fn sort_ledger(&mut self) {
        ledger::sort_ledger(&mut self.ledger);
        for address in &mut self.addresses {
            address.sort_ledger();
        }
    }
}

/// PrefilterTx: 𝒯𝒳 × watch-list → relevant?
///
/// Cheap first pass over bulk-loaded blocks.
///
/// 1. If any input spends an outpoint in `our_outpoints`, the tx is relevant
/// 2. Every standard output paying a watched hash160 is added to
///    `our_outpoints`, so later spends of it are recognized
/// 3. Relevant hashes are pushed onto `relevant` once each
pub fn prefilter_tx(
    tx: &TxRef,
    is_watched: impl Fn(&Hash160) -> bool,
    our_outpoints: &mut HashSet<OutPoint>,
    relevant: &mut Vec<Hash>,
) -> bool {
    let tx_hash = tx.hash();
    let mut added = false;

    for i in 0..tx.num_inputs() {
        if let Some(outpoint) = tx.outpoint(i) {
            if our_outpoints.contains(&outpoint) {
                relevant.push(tx_hash);
                added = true;
                break;
            }
        }
    }

    for txout in tx.outputs() {
        if let Some(recipient) = txout.recipient() {
            if is_watched(&recipient) {
                if !added {
                    relevant.push(tx_hash);
                    added = true;
                }
                our_outpoints.insert(OutPoint::new(tx_hash, txout.index));
            }
        }
    }

    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::p2pkh_script;
    use std::collections::HashMap;

    const ALICE: Hash160 = [0xa1; 20];
    const BOB: Hash160 = [0xb0; 20];
    const CAROL: Hash160 = [0xc0; 20];

    #[derive(Default)]
    struct FakeChain(HashMap<Hash, u32>);

    impl FakeChain {
        fn confirm(&mut self, tx: &TxRef, height: u32) {
            self.0.insert(tx.hash(), height);
        }
    }

    impl TxLookup for FakeChain {
        fn main_branch_height(&self, tx_hash: &Hash) -> Option<u32> {
            self.0.get(tx_hash).copied()
        }

        fn contains_tx(&self, tx_hash: &Hash) -> bool {
            self.0.contains_key(tx_hash)
        }
    }

    fn create_test_tx(inputs: &[OutPoint], outputs: &[(Hash160, Amount)]) -> TxRef {
        let tx = Transaction {
            version: 1,
            inputs: inputs
                .iter()
                .map(|&prevout| TransactionInput {
                    prevout,
                    script_sig: vec![0x51],
                    sequence: 0xffffffff,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|(h, value)| TransactionOutput {
                    value: *value,
                    script_pubkey: p2pkh_script(h),
                })
                .collect(),
            lock_time: 0,
        };
        TxRef::from_transaction(&tx).unwrap()
    }

    fn create_test_coinbase(to: Hash160, value: Amount) -> TxRef {
        create_test_tx(&[OutPoint::new([0; 32], 0xffffffff)], &[(to, value)])
    }

    fn create_test_wallet() -> BtcWallet {
        let mut wallet = BtcWallet::new();
        wallet.add_address(ALICE);
        wallet.add_address(BOB);
        wallet
    }

    fn funding_tx(to: Hash160, value: Amount) -> TxRef {
        create_test_tx(&[OutPoint::new([0xee; 32], 0)], &[(to, value)])
    }

    #[test]
    fn test_add_address_ignores_duplicates() {
        let mut wallet = create_test_wallet();
        assert!(!wallet.add_address(ALICE));
        assert!(wallet.add_address_with_seen(CAROL, 10, Some(1), 20, Some(2)));
        assert_eq!(wallet.num_addresses(), 3);
        let order: Vec<Hash160> = wallet.address_hashes().collect();
        assert_eq!(order, vec![ALICE, BOB, CAROL]);
        assert_eq!(wallet.address(&CAROL).unwrap().first_seen_time(), 10);
    }

    #[test]
    fn test_bulk_filter() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let fund = funding_tx(ALICE, 500);
        assert_eq!(wallet.is_mine_bulk_filter(&fund), (true, false));

        chain.confirm(&fund, 1);
        wallet.scan_tx(&fund, 1, 0, Some(1), &chain);
        let spend = create_test_tx(&[OutPoint::new(fund.hash(), 0)], &[(CAROL, 500)]);
        assert_eq!(wallet.is_mine_bulk_filter(&spend), (true, true));

        let unrelated = funding_tx(CAROL, 1);
        assert_eq!(wallet.is_mine_bulk_filter(&unrelated), (false, false));
        assert_eq!(wallet.scan_tx(&unrelated, 0, 0, Some(2), &chain), TxScan::NotRelevant);
    }

    #[test]
    fn test_prefilter_tracks_spends_of_discovered_outputs() {
        let wallet = create_test_wallet();
        let fund = funding_tx(ALICE, 500);
        let spend = create_test_tx(&[OutPoint::new(fund.hash(), 0)], &[(CAROL, 200), (ALICE, 300)]);
        let other = funding_tx(CAROL, 1);

        let mut ours = HashSet::new();
        let mut relevant = Vec::new();
        assert!(wallet.prefilter_tx(&fund, &mut ours, &mut relevant));
        assert!(!wallet.prefilter_tx(&other, &mut ours, &mut relevant));
        assert!(wallet.prefilter_tx(&spend, &mut ours, &mut relevant));

        assert_eq!(relevant, vec![fund.hash(), spend.hash()]);
        assert!(ours.contains(&OutPoint::new(fund.hash(), 0)));
        assert!(ours.contains(&OutPoint::new(spend.hash(), 1)));
        assert_eq!(ours.len(), 2);
    }

    #[test]
    fn test_receive_then_spend_ledger() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let fund = funding_tx(ALICE, 5);
        let spend = create_test_tx(&[OutPoint::new(fund.hash(), 0)], &[(CAROL, 5)]);
        chain.confirm(&fund, 100);
        chain.confirm(&spend, 101);

        assert_eq!(wallet.scan_tx(&fund, 3, 1000, Some(100), &chain), TxScan::Recorded);
        assert_eq!(wallet.full_balance(&chain), 5);
        assert_eq!(wallet.scan_tx(&spend, 1, 1100, Some(101), &chain), TxScan::Recorded);
        assert_eq!(wallet.full_balance(&chain), 0);

        let entries = wallet.ledger(Some(&ALICE));
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].value, entries[0].block_height), (5, Some(100)));
        assert_eq!((entries[1].value, entries[1].block_height), (-5, Some(101)));

        let wallet_entries = wallet.ledger(None);
        assert_eq!(wallet_entries.len(), 2);
        assert_eq!(wallet_entries[0].tx_index, 3);
        assert_eq!(wallet_entries[1].value, -5);
        assert!(!wallet_entries[1].is_sent_to_self);
        assert!(!wallet_entries[1].is_change_back);

        let alice = wallet.address(&ALICE).unwrap();
        assert_eq!(alice.first_seen_height(), Some(100));
        assert_eq!(alice.last_seen_height(), Some(101));

        // Rescanning confirmed history records nothing twice
        assert_eq!(wallet.scan_tx(&fund, 3, 1000, Some(100), &chain), TxScan::Unchanged);
        assert_eq!(wallet.scan_tx(&spend, 1, 1100, Some(101), &chain), TxScan::Unchanged);
        assert_eq!(wallet.ledger(None).len(), 2);
    }

    #[test]
    fn test_coinbase_maturity() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let coinbase = create_test_coinbase(ALICE, 50);
        chain.confirm(&coinbase, 10);

        wallet.scan_tx(&coinbase, 0, 0, Some(10), &chain);
        let maturity = wallet.policy().coinbase_maturity;
        assert_eq!(wallet.full_balance(&chain), 50);
        assert_eq!(wallet.spendable_balance(10, &chain), 0);
        assert_eq!(wallet.spendable_balance(10 + maturity - 1, &chain), 0);
        assert_eq!(wallet.spendable_balance(10 + maturity, &chain), 50);
        assert_eq!(wallet.unconfirmed_balance(10, &chain), 50);
        assert!(wallet.txio_map().values().all(TxIOPair::is_from_coinbase));
    }

    #[test]
    fn test_sent_to_self_and_change() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let fund = funding_tx(ALICE, 100);
        chain.confirm(&fund, 1);
        wallet.scan_tx(&fund, 0, 0, Some(1), &chain);

        let to_self = create_test_tx(&[OutPoint::new(fund.hash(), 0)], &[(BOB, 60), (ALICE, 40)]);
        chain.confirm(&to_self, 2);
        wallet.scan_tx(&to_self, 1, 0, Some(2), &chain);
        let entry = wallet.ledger(None).last().unwrap().clone();
        assert!(entry.is_sent_to_self);
        assert!(!entry.is_change_back);
        assert_eq!(entry.value, 0);

        let with_change =
            create_test_tx(&[OutPoint::new(to_self.hash(), 0)], &[(CAROL, 50), (BOB, 10)]);
        chain.confirm(&with_change, 3);
        wallet.scan_tx(&with_change, 1, 0, Some(3), &chain);
        let entry = wallet.ledger(None).last().unwrap().clone();
        assert!(!entry.is_sent_to_self);
        assert!(entry.is_change_back);
        assert_eq!(entry.value, -50);

        let change = &wallet.txio_map()[&OutPoint::new(with_change.hash(), 1)];
        assert!(change.is_tx_out_from_self());
        assert_eq!(wallet.full_balance(&chain), 50);
        assert_eq!(wallet.address_full_balance(&BOB, &chain), 10);
        assert_eq!(wallet.address_full_balance(&CAROL, &chain), 0);
    }

    #[test]
    fn test_zero_conf_spend_and_double_spend() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let fund = funding_tx(ALICE, 100);
        chain.confirm(&fund, 1);
        wallet.scan_tx(&fund, 0, 0, Some(1), &chain);

        let spend = create_test_tx(&[OutPoint::new(fund.hash(), 0)], &[(CAROL, 70), (ALICE, 30)]);
        assert_eq!(wallet.scan_tx(&spend, 0, 50, None, &chain), TxScan::Recorded);
        assert_eq!(wallet.ledger_zc(None).len(), 1);
        assert_eq!(wallet.ledger_zc(Some(&ALICE)).len(), 2);
        assert_eq!(wallet.full_balance(&chain), 30);
        // Self-sent zero-conf change is spendable, never "unconfirmed"
        assert_eq!(wallet.spendable_balance(10, &chain), 30);
        assert_eq!(wallet.unconfirmed_balance(10, &chain), 0);

        let double = create_test_tx(&[OutPoint::new(fund.hash(), 0)], &[(CAROL, 100)]);
        assert!(matches!(
            wallet.scan_tx(&double, 0, 60, None, &chain),
            TxScan::Rejected(_)
        ));
        assert_eq!(wallet.ledger_zc(None).len(), 1);

        // Replaying the same zero-conf tx is a conflict too
        assert!(matches!(
            wallet.scan_tx(&spend, 0, 50, None, &chain),
            TxScan::Rejected(_)
        ));
    }

    #[test]
    fn test_confirmation_promotes_zero_conf() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let fund = funding_tx(ALICE, 100);
        assert_eq!(wallet.scan_tx(&fund, 0, 5, None, &chain), TxScan::Recorded);
        let outpoint = OutPoint::new(fund.hash(), 0);
        assert!(wallet.txio_map()[&outpoint].has_tx_out_zc());
        assert_eq!(wallet.unconfirmed_balance(0, &chain), 100);

        chain.confirm(&fund, 7);
        assert_eq!(wallet.scan_tx(&fund, 2, 5, Some(7), &chain), TxScan::Recorded);
        let txio = &wallet.txio_map()[&outpoint];
        assert!(txio.has_tx_out());
        assert!(!txio.has_tx_out_zc());

        wallet.clear_zero_conf();
        assert!(wallet.ledger_zc(None).is_empty());
        assert!(wallet.ledger_zc(Some(&ALICE)).is_empty());
        assert_eq!(wallet.full_balance(&chain), 100);
        assert_eq!(wallet.ledger(Some(&ALICE))[0].block_height, Some(7));
    }

    #[test]
    fn test_clear_zero_conf_drops_zero_conf_only_relations() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let fund = funding_tx(ALICE, 100);
        chain.confirm(&fund, 1);
        wallet.scan_tx(&fund, 0, 0, Some(1), &chain);

        let incoming = funding_tx(BOB, 9);
        wallet.scan_tx(&incoming, 0, 0, None, &chain);
        let spend = create_test_tx(&[OutPoint::new(fund.hash(), 0)], &[(CAROL, 100)]);
        wallet.scan_tx(&spend, 0, 0, None, &chain);
        assert_eq!(wallet.txio_map().len(), 2);
        assert_eq!(wallet.full_balance(&chain), 9);

        wallet.clear_zero_conf();
        assert_eq!(wallet.txio_map().len(), 1);
        assert_eq!(wallet.full_balance(&chain), 100);
        assert!(!wallet.is_outpoint_mine(&incoming.hash(), 0));
        assert!(wallet.is_outpoint_mine(&fund.hash(), 0));
    }

    #[test]
    fn test_non_standard_output_tracked_outside_balance() {
        let chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let mut script = vec![0x6a, 0x14];
        script.extend_from_slice(&ALICE);
        let tx = Transaction {
            version: 1,
            inputs: vec![TransactionInput {
                prevout: OutPoint::new([0xee; 32], 1),
                script_sig: vec![],
                sequence: 0,
            }],
            outputs: vec![TransactionOutput { value: 77, script_pubkey: script }],
            lock_time: 0,
        };
        let tx = TxRef::from_transaction(&tx).unwrap();

        assert_eq!(wallet.is_mine_bulk_filter(&tx), (true, false));
        assert_eq!(wallet.scan_tx(&tx, 0, 0, Some(4), &chain), TxScan::Unchanged);
        assert_eq!(wallet.non_std_outpoints().count(), 1);
        assert!(wallet.non_std_unspent().contains(&OutPoint::new(tx.hash(), 0)));
        assert_eq!(wallet.full_balance(&chain), 0);
    }

    #[test]
    fn test_apply_reorg_and_cleanup() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let displaced = funding_tx(ALICE, 10);
        let common = funding_tx(BOB, 20);
        chain.confirm(&displaced, 10);
        chain.confirm(&common, 10);
        wallet.scan_tx(&displaced, 1, 0, Some(10), &chain);
        wallet.scan_tx(&common, 2, 0, Some(10), &chain);

        chain.0.remove(&displaced.hash());
        chain.confirm(&common, 11);
        let report = ReorgReport {
            invalidated: [displaced.hash()].into_iter().collect(),
            affected: [displaced.hash(), common.hash()].into_iter().collect(),
        };
        wallet.apply_reorg(&report, &chain);

        let entries = wallet.ledger(None);
        assert!(!entries[0].is_valid);
        assert!(entries[1].is_valid);
        assert_eq!(entries[1].block_height, Some(11));
        assert!(!wallet.ledger(Some(&ALICE))[0].is_valid);
        assert_eq!(wallet.full_balance(&chain), 20);

        assert_eq!(wallet.remove_invalid_entries(), 1);
        assert!(wallet.ledger(Some(&ALICE)).is_empty());
        wallet.sort_ledger();
        assert_eq!(wallet.ledger(None).len(), 1);
    }

    #[test]
    fn test_displaced_tx_mined_again_is_revalidated() {
        let mut chain = FakeChain::default();
        let mut wallet = create_test_wallet();
        let displaced = funding_tx(ALICE, 10);
        chain.confirm(&displaced, 10);
        wallet.scan_tx(&displaced, 1, 0, Some(10), &chain);

        chain.0.remove(&displaced.hash());
        let report = ReorgReport {
            invalidated: [displaced.hash()].into_iter().collect(),
            affected: [displaced.hash()].into_iter().collect(),
        };
        wallet.apply_reorg(&report, &chain);
        assert!(!wallet.ledger(None)[0].is_valid);

        chain.confirm(&displaced, 12);
        assert_eq!(wallet.scan_tx(&displaced, 0, 0, Some(12), &chain), TxScan::Recorded);
        assert_eq!(wallet.scan_tx(&displaced, 0, 0, Some(12), &chain), TxScan::Unchanged);

        let entries = wallet.ledger(None);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_valid);
        assert_eq!(entries[0].block_height, Some(12));
        assert_eq!(wallet.ledger(Some(&ALICE))[0].block_height, Some(12));
        assert_eq!(wallet.remove_invalid_entries(), 0);
        assert_eq!(wallet.full_balance(&chain), 10);
    }
}
