//! Header graph and transaction index, with main-chain queries
//!
//! Headers and transactions live in arenas addressed by integer ids. Parent,
//! child and header back-references are hashes or ids resolved through the
//! arenas, never owning links, so reorganizations only rewrite flags.

use crate::block::{calculate_block_hash, calculate_merkle_root, HeaderNode, ParsedBlock};
use crate::index::TxIndex;
use crate::network::NetworkParams;
use crate::serialize::hash_to_display_hex;
use crate::transaction::{TxOutView, TxRef};
use crate::types::*;
use std::collections::HashMap;
use tracing::debug;

/// A header whose stored identity does not match its contents
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityFailure {
    pub block_hash: Hash,
    pub height: Option<u32>,
    pub reason: String,
}

/// Header graph, transaction index and height index for one network
#[derive(Debug, Clone)]
pub struct Blockchain {
    pub(crate) params: NetworkParams,
    pub(crate) headers: Vec<HeaderNode>,
    pub(crate) header_ids: HashMap<Hash, usize>,
    pub(crate) txs: TxIndex,
    pub(crate) headers_by_height: Vec<usize>,
    pub(crate) top: Option<usize>,
    pub(crate) orphan_chain_roots: Vec<usize>,
    pub(crate) previously_valid: Vec<usize>,
}

impl Blockchain {
    pub fn new(params: NetworkParams) -> Self {
        Blockchain {
            params,
            headers: Vec::new(),
            header_ids: HashMap::new(),
            txs: TxIndex::new(),
            headers_by_height: Vec::new(),
            top: None,
            orphan_chain_roots: Vec::new(),
            previously_valid: Vec::new(),
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn num_headers(&self) -> usize {
        self.headers.len()
    }

    pub fn tx_index(&self) -> &TxIndex {
        &self.txs
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Insert a parsed block, first-seen wins for both headers and txs.
    ///
    /// Returns the header id and whether the header was new. A header that
    /// is already known is left untouched, including its chain metadata and
    /// transaction list. New transactions are stored once; a transaction
    /// already stored under another header is only referenced.
    pub fn insert_block(&mut self, block: ParsedBlock, stream_offset: u64) -> (usize, bool) {
        if let Some(&id) = self.header_ids.get(&block.hash) {
            debug!(hash = %hash_to_display_hex(&block.hash), "header already known");
            return (id, false);
        }

        let mut node = HeaderNode::new(block.header);
        node.stream_offset = stream_offset;
        node.num_bytes = block.num_bytes;
        for tx in block.txs {
            let (tx_id, _) = self.txs.insert(tx);
            node.tx_ids.push(tx_id);
        }

        let id = self.headers.len();
        self.header_ids.insert(node.hash, id);
        self.headers.push(node);
        (id, true)
    }

    // ========================================================================
    // HEADER QUERIES
    // ========================================================================

    pub fn header(&self, id: usize) -> Option<&HeaderNode> {
        self.headers.get(id)
    }

    pub fn header_id(&self, hash: &Hash) -> Option<usize> {
        self.header_ids.get(hash).copied()
    }

    pub fn header_by_hash(&self, hash: &Hash) -> Option<&HeaderNode> {
        self.header_id(hash).and_then(|id| self.headers.get(id))
    }

    pub fn has_header_with_hash(&self, hash: &Hash) -> bool {
        self.header_ids.contains_key(hash)
    }

    pub fn genesis_header(&self) -> Option<&HeaderNode> {
        self.header_by_hash(&self.params.genesis_hash)
    }

    /// Current best-chain tip; the genesis header before the first organize
    pub fn top_header(&self) -> Option<&HeaderNode> {
        match self.top {
            Some(id) => self.headers.get(id),
            None => self.genesis_header(),
        }
    }

    pub fn top_height(&self) -> Option<u32> {
        self.top_header().map(|h| h.height)
    }

    pub fn header_by_height(&self, height: u32) -> Option<&HeaderNode> {
        self.headers_by_height
            .get(height as usize)
            .and_then(|&id| self.headers.get(id))
    }

    /// Number of heights in the main-chain index
    pub fn main_chain_len(&self) -> usize {
        self.headers_by_height.len()
    }

    pub fn headers_not_on_main_chain(&self) -> Vec<&HeaderNode> {
        self.headers.iter().filter(|h| !h.is_main_branch).collect()
    }

    /// First header of each chain whose parent is missing
    pub fn orphan_chain_roots(&self) -> Vec<&HeaderNode> {
        self.orphan_chain_roots
            .iter()
            .filter_map(|&id| self.headers.get(id))
            .collect()
    }

    /// Headers that were on the main chain before a reorg or orphaning
    pub fn previously_valid_headers(&self) -> Vec<&HeaderNode> {
        self.previously_valid
            .iter()
            .filter_map(|&id| self.headers.get(id))
            .collect()
    }

    pub fn prefix_search_headers(&self, prefix: &[u8]) -> Vec<&HeaderNode> {
        self.headers
            .iter()
            .filter(|h| h.hash.starts_with(prefix))
            .collect()
    }

    // ========================================================================
    // TRANSACTION QUERIES
    // ========================================================================

    pub fn tx_by_hash(&self, hash: &Hash) -> Option<&TxRef> {
        self.txs.by_hash(hash)
    }

    pub fn has_tx_with_hash(&self, hash: &Hash) -> bool {
        self.txs.contains(hash)
    }

    pub fn prefix_search_tx(&self, prefix: &[u8]) -> Vec<&TxRef> {
        self.txs.prefix_search(prefix)
    }

    /// Transactions of a header, in block order
    pub fn block_txs(&self, header: &HeaderNode) -> Vec<&TxRef> {
        header
            .tx_ids
            .iter()
            .filter_map(|&id| self.txs.get(id))
            .collect()
    }

    /// Main-branch header currently claiming `tx`
    pub fn tx_header(&self, tx: &TxRef) -> Option<&HeaderNode> {
        tx.header
            .and_then(|id| self.headers.get(id))
            .filter(|h| h.is_main_branch)
    }

    /// Height of a transaction on the main chain
    pub fn tx_height(&self, hash: &Hash) -> Option<u32> {
        let tx = self.txs.by_hash(hash)?;
        if !tx.is_main_branch {
            return None;
        }
        self.tx_header(tx).map(|h| h.height)
    }

    /// Confirmation state of a confirmed-index transaction
    pub fn num_confirmations(&self, hash: &Hash) -> Confirmations {
        let tx = match self.txs.by_hash(hash) {
            Some(tx) => tx,
            None => return Confirmations::NotFound,
        };
        let header = match tx.header.and_then(|id| self.headers.get(id)) {
            Some(header) => header,
            None => return Confirmations::Unconfirmed,
        };
        if !header.is_main_branch {
            return Confirmations::OffMainBranch;
        }
        let top_height = self.top_height().unwrap_or(0);
        Confirmations::Confirmed(top_height.saturating_sub(header.height) + 1)
    }

    /// The output spent by `prevout`, if its transaction is indexed
    pub fn prev_tx_out(&self, prevout: &OutPoint) -> Option<TxOutView<'_>> {
        if prevout.is_coinbase() {
            return None;
        }
        self.txs
            .by_hash(&prevout.hash)
            .and_then(|tx| tx.output(prevout.index as usize))
    }

    /// Recipient of the output an input spends
    pub fn sender_hash160(&self, prevout: &OutPoint) -> Option<Hash160> {
        self.prev_tx_out(prevout).and_then(|out| out.recipient())
    }

    /// Value of the output an input spends
    pub fn sent_value(&self, prevout: &OutPoint) -> Option<Amount> {
        self.prev_tx_out(prevout).map(|out| out.value)
    }

    /// Main-chain transactions with at least one unclassifiable output
    pub fn find_all_non_std_tx(&self) -> Vec<Hash> {
        let mut out = Vec::new();
        for &header_id in &self.headers_by_height {
            let header = &self.headers[header_id];
            for tx in self.block_txs(header) {
                if tx.has_non_std_output() {
                    debug!(
                        height = header.height,
                        tx = %hash_to_display_hex(&tx.hash()),
                        "non-standard output script"
                    );
                    out.push(tx.hash());
                }
            }
        }
        out
    }

    // ========================================================================
    // INTEGRITY
    // ========================================================================

    /// Recompute every header hash and merkle root.
    ///
    /// Mismatches are reported, never fatal.
    pub fn verify_integrity(&self) -> Vec<IntegrityFailure> {
        let mut failures = Vec::new();
        for node in &self.headers {
            let height = node.is_main_branch.then_some(node.height);

            if calculate_block_hash(&node.header) != node.hash {
                failures.push(IntegrityFailure {
                    block_hash: node.hash,
                    height,
                    reason: "header hash does not match header fields".to_string(),
                });
                continue;
            }

            let tx_hashes: Vec<Hash> = self.block_txs(node).iter().map(|tx| tx.hash()).collect();
            match calculate_merkle_root(&tx_hashes) {
                None => failures.push(IntegrityFailure {
                    block_hash: node.hash,
                    height,
                    reason: "block has no transactions".to_string(),
                }),
                Some(root) if root != node.header.merkle_root => failures.push(IntegrityFailure {
                    block_hash: node.hash,
                    height,
                    reason: format!(
                        "merkle root {} does not match {} transactions",
                        hash_to_display_hex(&node.header.merkle_root),
                        tx_hashes.len()
                    ),
                }),
                Some(_) => {}
            }
        }
        failures
    }
}

impl TxLookup for Blockchain {
    fn main_branch_height(&self, tx_hash: &Hash) -> Option<u32> {
        self.tx_height(tx_hash)
    }

    fn contains_tx(&self, tx_hash: &Hash) -> bool {
        self.txs.contains(tx_hash)
    }
}
