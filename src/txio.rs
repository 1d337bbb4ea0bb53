//! Spend relations: one output paired with the input that spends it

use crate::config::SpendPolicy;
use crate::transaction::TxOutView;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Position of an input or output: `(tx hash, index within that tx)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxSlot {
    pub tx_hash: Hash,
    pub index: u32,
}

impl TxSlot {
    pub fn new(tx_hash: Hash, index: u32) -> Self {
        TxSlot { tx_hash, index }
    }
}

/// TxIOPair: 𝒪 × 𝒪? × ℐ? × ℐ?
///
/// One output locus and the (at most one) input spending it, each slot kept
/// separately for confirmed and zero-conf bindings. Only transaction hashes
/// are stored; whether a binding is currently on the main chain is asked of
/// a [`TxLookup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIOPair {
    tx_out: Option<TxSlot>,
    tx_out_zc: Option<TxSlot>,
    tx_in: Option<TxSlot>,
    tx_in_zc: Option<TxSlot>,
    amount: Amount,
    recipient: Option<Hash160>,
    script_pubkey: ByteString,
    is_tx_out_from_self: bool,
    is_from_coinbase: bool,
}

/// An unspent output of a watched address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentTxOut {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script: ByteString,
    /// `None` while the output is only in the zero-conf pool
    pub height: Option<u32>,
    pub num_confirmations: u32,
}

impl TxIOPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_amount(amount: Amount) -> Self {
        TxIOPair {
            amount,
            ..Self::default()
        }
    }

    // ========================================================================
    // BINDINGS
    // ========================================================================

    /// Bind the output side.
    ///
    /// A zero-conf binding fails if either output slot is already set. A
    /// confirmed binding always succeeds and replaces any zero-conf one.
    pub fn set_tx_out(&mut self, tx_hash: Hash, out: &TxOutView<'_>, is_zero_conf: bool) -> bool {
        let slot = TxSlot::new(tx_hash, out.index);
        if is_zero_conf {
            if self.tx_out.is_some() || self.tx_out_zc.is_some() {
                return false;
            }
            self.tx_out_zc = Some(slot);
        } else {
            self.tx_out = Some(slot);
            self.tx_out_zc = None;
        }
        self.amount = out.value;
        self.recipient = out.recipient();
        self.script_pubkey = out.script_pubkey.to_vec();
        true
    }

    /// Bind the input side, with the same exclusivity as [`Self::set_tx_out`]
    pub fn set_tx_in(&mut self, tx_hash: Hash, index: u32, is_zero_conf: bool) -> bool {
        let slot = TxSlot::new(tx_hash, index);
        if is_zero_conf {
            if self.tx_in.is_some() || self.tx_in_zc.is_some() {
                return false;
            }
            self.tx_in_zc = Some(slot);
        } else {
            self.tx_in = Some(slot);
            self.tx_in_zc = None;
        }
        true
    }

    /// Drop zero-conf bindings; the pair is empty afterwards if it only
    /// ever had a zero-conf output
    pub fn clear_zc_fields(&mut self) {
        self.tx_out_zc = None;
        self.tx_in_zc = None;
        if self.tx_out.is_none() {
            self.is_tx_out_from_self = false;
        }
    }

    pub fn set_tx_out_from_self(&mut self) {
        self.is_tx_out_from_self = true;
    }

    pub fn set_from_coinbase(&mut self) {
        self.is_from_coinbase = true;
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn value(&self) -> Amount {
        self.amount
    }

    pub fn recipient(&self) -> Option<Hash160> {
        self.recipient
    }

    pub fn script_pubkey(&self) -> &[u8] {
        &self.script_pubkey
    }

    pub fn tx_out(&self) -> Option<TxSlot> {
        self.tx_out
    }

    pub fn tx_out_zc(&self) -> Option<TxSlot> {
        self.tx_out_zc
    }

    pub fn tx_in(&self) -> Option<TxSlot> {
        self.tx_in
    }

    pub fn tx_in_zc(&self) -> Option<TxSlot> {
        self.tx_in_zc
    }

    /// The outpoint this pair tracks, preferring the confirmed binding
    pub fn outpoint(&self) -> Option<OutPoint> {
        self.tx_out
            .or(self.tx_out_zc)
            .map(|slot| OutPoint::new(slot.tx_hash, slot.index))
    }

    pub fn is_tx_out_from_self(&self) -> bool {
        self.is_tx_out_from_self
    }

    pub fn is_from_coinbase(&self) -> bool {
        self.is_from_coinbase
    }

    pub fn has_tx_out(&self) -> bool {
        self.tx_out.is_some()
    }

    pub fn has_tx_out_zc(&self) -> bool {
        self.tx_out_zc.is_some()
    }

    pub fn has_tx_in(&self) -> bool {
        self.tx_in.is_some()
    }

    pub fn has_tx_in_zc(&self) -> bool {
        self.tx_in_zc.is_some()
    }

    /// No output binding at all; such pairs can be dropped
    pub fn is_empty(&self) -> bool {
        self.tx_out.is_none() && self.tx_out_zc.is_none()
    }

    // ========================================================================
    // CHAIN-DEPENDENT STATE
    // ========================================================================

    pub fn has_tx_out_in_main(&self, chain: &impl TxLookup) -> bool {
        self.tx_out.map_or(false, |slot| chain.is_main_branch(&slot.tx_hash))
    }

    pub fn has_tx_in_in_main(&self, chain: &impl TxLookup) -> bool {
        self.tx_in.map_or(false, |slot| chain.is_main_branch(&slot.tx_hash))
    }

    pub fn tx_out_height(&self, chain: &impl TxLookup) -> Option<u32> {
        self.tx_out.and_then(|slot| chain.main_branch_height(&slot.tx_hash))
    }

    /// `(output valid, input valid)` against the current main chain
    pub fn reassess_validity(&self, chain: &impl TxLookup) -> (bool, bool) {
        (self.has_tx_out_in_main(chain), self.has_tx_in_in_main(chain))
    }

    pub fn is_spent(&self, chain: &impl TxLookup) -> bool {
        self.has_tx_in_in_main(chain) || self.has_tx_in_zc()
    }

    pub fn is_unspent(&self, chain: &impl TxLookup) -> bool {
        (self.has_tx_out_in_main(chain) || self.has_tx_out_zc()) && !self.is_spent(chain)
    }

    /// IsSpendable: unspent and either confirmed (coinbase outputs must
    /// also be past maturity) or a zero-conf output we sent ourselves
    pub fn is_spendable(&self, current_height: u32, chain: &impl TxLookup, policy: &SpendPolicy) -> bool {
        if self.is_spent(chain) {
            return false;
        }

        if let Some(height) = self.tx_out_height(chain) {
            let n_conf = num_confirmations(current_height, height);
            if n_conf == 0 {
                return false;
            }
            return !(self.is_from_coinbase && n_conf <= policy.coinbase_maturity);
        }

        self.has_tx_out_zc() && self.is_tx_out_from_self
    }

    /// IsMineButUnconfirmed: counted towards the unconfirmed balance.
    ///
    /// Self-sent money is never unconfirmed. Confirmed outputs stay here
    /// until they reach the confirmation (or coinbase maturity) threshold.
    pub fn is_mine_but_unconfirmed(
        &self,
        current_height: u32,
        chain: &impl TxLookup,
        policy: &SpendPolicy,
    ) -> bool {
        if self.is_tx_out_from_self {
            return false;
        }
        if self.is_spent(chain) {
            return false;
        }

        if let Some(height) = self.tx_out_height(chain) {
            let n_conf = num_confirmations(current_height, height);
            if self.is_from_coinbase {
                return n_conf < policy.coinbase_maturity;
            }
            return n_conf < policy.min_confirmations;
        }

        self.has_tx_out_zc()
    }

    pub fn to_unspent(&self, current_height: u32, chain: &impl TxLookup) -> Option<UnspentTxOut> {
        let outpoint = self.outpoint()?;
        let height = self.tx_out_height(chain);
        Some(UnspentTxOut {
            outpoint,
            value: self.amount,
            script: self.script_pubkey.clone(),
            height,
            num_confirmations: height.map_or(0, |h| num_confirmations(current_height, h)),
        })
    }
}

/// Confirmations of something mined at `height` seen from `current_height`
pub fn num_confirmations(current_height: u32, height: u32) -> u32 {
    if current_height >= height {
        current_height - height + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::p2pkh_script;
    use std::collections::HashMap;

    /// Chain stand-in: tx hash → main-branch height
    #[derive(Default)]
    struct FakeChain(HashMap<Hash, u32>);

    impl TxLookup for FakeChain {
        fn main_branch_height(&self, tx_hash: &Hash) -> Option<u32> {
            self.0.get(tx_hash).copied()
        }

        fn contains_tx(&self, tx_hash: &Hash) -> bool {
            self.0.contains_key(tx_hash)
        }
    }

    fn create_test_output(script: &[u8]) -> TxOutView<'_> {
        TxOutView { index: 0, value: 5000, script_pubkey: script }
    }

    #[test]
    fn test_zero_conf_output_exclusive() {
        let script = p2pkh_script(&[1; 20]);
        let out = create_test_output(&script);
        let mut txio = TxIOPair::new();

        assert!(txio.set_tx_out([1; 32], &out, true));
        assert!(!txio.set_tx_out([2; 32], &out, true));
        assert_eq!(txio.tx_out_zc().unwrap().tx_hash, [1; 32]);

        // Confirmed binding supersedes the zero-conf one
        assert!(txio.set_tx_out([1; 32], &out, false));
        assert!(txio.has_tx_out());
        assert!(!txio.has_tx_out_zc());
        assert!(!txio.set_tx_out([1; 32], &out, true));
        assert_eq!(txio.value(), 5000);
        assert_eq!(txio.recipient(), Some([1; 20]));
    }

    #[test]
    fn test_zero_conf_input_exclusive() {
        let mut txio = TxIOPair::with_amount(10);
        assert!(txio.set_tx_in([3; 32], 0, false));
        assert!(!txio.set_tx_in([4; 32], 0, true));
        assert!(!txio.has_tx_in_zc());

        let mut txio = TxIOPair::with_amount(10);
        assert!(txio.set_tx_in([3; 32], 0, true));
        assert!(!txio.set_tx_in([4; 32], 1, true));
        assert_eq!(txio.tx_in_zc().unwrap().tx_hash, [3; 32]);
    }

    #[test]
    fn test_spent_and_unspent_follow_main_branch() {
        let script = p2pkh_script(&[1; 20]);
        let mut chain = FakeChain::default();
        chain.0.insert([1; 32], 100);

        let mut txio = TxIOPair::new();
        txio.set_tx_out([1; 32], &create_test_output(&script), false);
        assert!(txio.is_unspent(&chain));

        txio.set_tx_in([2; 32], 0, false);
        // Spending tx not on the main chain yet
        assert!(txio.is_unspent(&chain));
        chain.0.insert([2; 32], 101);
        assert!(txio.is_spent(&chain));
        assert!(!txio.is_unspent(&chain));
        assert_eq!(txio.reassess_validity(&chain), (true, true));

        // Output tx reorganized away
        chain.0.remove(&[1; 32]);
        chain.0.remove(&[2; 32]);
        assert!(!txio.is_unspent(&chain));
        assert_eq!(txio.reassess_validity(&chain), (false, false));
    }

    #[test]
    fn test_coinbase_maturity() {
        let script = p2pkh_script(&[1; 20]);
        let policy = SpendPolicy::default();
        let mut chain = FakeChain::default();
        chain.0.insert([1; 32], 10);

        let mut txio = TxIOPair::new();
        txio.set_tx_out([1; 32], &create_test_output(&script), false);
        txio.set_from_coinbase();

        assert!(!txio.is_spendable(10, &chain, &policy));
        assert!(!txio.is_spendable(10 + policy.coinbase_maturity - 1, &chain, &policy));
        assert!(txio.is_spendable(10 + policy.coinbase_maturity, &chain, &policy));

        assert!(txio.is_mine_but_unconfirmed(10, &chain, &policy));
        assert!(!txio.is_mine_but_unconfirmed(10 + policy.coinbase_maturity, &chain, &policy));
    }

    #[test]
    fn test_zero_conf_spendability() {
        let script = p2pkh_script(&[1; 20]);
        let policy = SpendPolicy::default();
        let chain = FakeChain::default();

        let mut foreign = TxIOPair::new();
        foreign.set_tx_out([5; 32], &create_test_output(&script), true);
        assert!(!foreign.is_spendable(50, &chain, &policy));
        assert!(foreign.is_mine_but_unconfirmed(50, &chain, &policy));

        let mut change = foreign.clone();
        change.set_tx_out_from_self();
        assert!(change.is_spendable(50, &chain, &policy));
        assert!(!change.is_mine_but_unconfirmed(50, &chain, &policy));
    }

    #[test]
    fn test_min_confirmations_window() {
        let script = p2pkh_script(&[1; 20]);
        let policy = SpendPolicy::default();
        let mut chain = FakeChain::default();
        chain.0.insert([1; 32], 100);

        let mut txio = TxIOPair::new();
        txio.set_tx_out([1; 32], &create_test_output(&script), false);
        assert!(txio.is_spendable(100, &chain, &policy));
        assert!(txio.is_mine_but_unconfirmed(100 + policy.min_confirmations - 2, &chain, &policy));
        assert!(!txio.is_mine_but_unconfirmed(100 + policy.min_confirmations - 1, &chain, &policy));
        // A stale current height never underflows
        assert!(!txio.is_spendable(50, &chain, &policy));
    }

    #[test]
    fn test_clear_zc_fields() {
        let script = p2pkh_script(&[1; 20]);
        let mut zc_only = TxIOPair::new();
        zc_only.set_tx_out([1; 32], &create_test_output(&script), true);
        zc_only.set_tx_out_from_self();
        zc_only.clear_zc_fields();
        assert!(zc_only.is_empty());
        assert!(!zc_only.is_tx_out_from_self());

        let mut confirmed = TxIOPair::new();
        confirmed.set_tx_out([1; 32], &create_test_output(&script), false);
        confirmed.set_tx_in([2; 32], 0, true);
        confirmed.clear_zc_fields();
        assert!(!confirmed.is_empty());
        assert!(!confirmed.has_tx_in_zc());
    }

    #[test]
    fn test_to_unspent() {
        let script = p2pkh_script(&[1; 20]);
        let mut chain = FakeChain::default();
        chain.0.insert([1; 32], 7);
        let mut txio = TxIOPair::new();
        txio.set_tx_out([1; 32], &create_test_output(&script), false);

        let utxo = txio.to_unspent(9, &chain).unwrap();
        assert_eq!(utxo.outpoint, OutPoint::new([1; 32], 0));
        assert_eq!(utxo.height, Some(7));
        assert_eq!(utxo.num_confirmations, 3);
        assert_eq!(utxo.script, script);
        assert!(TxIOPair::new().to_unspent(9, &chain).is_none());
    }
}
