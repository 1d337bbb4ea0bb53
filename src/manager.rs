//! Block data manager: ingestion, chain organization and wallet coordination
//!
//! [`BlockDataManager`] is an explicitly constructed value. Mutating calls
//! take `&mut self`; wrap it in a [`SharedBlockDataManager`] to share it
//! between threads, in which case reads block while an organize or rescan
//! holds the write lock.

use crate::block::{parse_framed_block, HeaderNode};
use crate::chain::{Blockchain, IntegrityFailure};
use crate::config::{LedgerConfig, SpendPolicy};
use crate::constants::BLOCK_FRAME_PREFIX;
use crate::error::{LedgerError, Result};
use crate::mempool::ZeroConfPool;
use crate::network::NetworkParams;
use crate::reorganization::ReorgReport;
use crate::serialize::{hash_to_display_hex, ByteReader};
use crate::transaction::{TxOutView, TxRef};
use crate::wallet::{prefilter_tx, BtcWallet};
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Outcome of adding one framed block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockAddResult {
    /// The block parsed and was inserted
    pub succeeded: bool,
    /// The block is on the main chain after organizing
    pub is_new_top: bool,
    /// Organizing displaced the previous top
    pub caused_reorg: bool,
}

#[derive(Debug, Clone)]
pub struct BlockDataManager {
    chain: Blockchain,
    zero_conf: ZeroConfPool,
    zc_enabled: bool,
    policy: SpendPolicy,

    // Prefilter results from the bulk load
    filtered_tx_hashes: Vec<Hash>,
    filtered_outpoints: HashSet<OutPoint>,
    filtered_addresses: HashMap<Hash160, u32>,

    last_reorg: Option<ReorgReport>,
    last_block_was_reorg: bool,

    configured_blk_file: Option<PathBuf>,
    blk_file_path: Option<PathBuf>,
    last_eof: u64,
    total_bytes: u64,
}

impl BlockDataManager {
    pub fn new(params: NetworkParams) -> Self {
        Self::with_policy(params, SpendPolicy::default())
    }

    pub fn with_policy(params: NetworkParams, policy: SpendPolicy) -> Self {
        BlockDataManager {
            chain: Blockchain::new(params),
            zero_conf: ZeroConfPool::new(),
            zc_enabled: false,
            policy,
            filtered_tx_hashes: Vec::new(),
            filtered_outpoints: HashSet::new(),
            filtered_addresses: HashMap::new(),
            last_reorg: None,
            last_block_was_reorg: false,
            configured_blk_file: None,
            blk_file_path: None,
            last_eof: 0,
            total_bytes: 0,
        }
    }

    /// Build from configuration; a configured zero-conf file is enabled
    /// immediately. A configured block file is remembered and read by
    /// [`BlockDataManager::read_configured_blk_file`].
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let mut manager = Self::with_policy(config.network_params()?, config.spend_policy());
        manager.configured_blk_file = config.blk_file.clone();
        if let Some(path) = &config.zero_conf_file {
            manager.enable_zero_conf(path)?;
        }
        Ok(manager)
    }

    pub fn configured_blk_file(&self) -> Option<&Path> {
        self.configured_blk_file.as_deref()
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn params(&self) -> &NetworkParams {
        self.chain.params()
    }

    pub fn policy(&self) -> &SpendPolicy {
        &self.policy
    }

    /// An empty wallet using this manager's spend policy
    pub fn new_wallet(&self) -> BtcWallet {
        BtcWallet::with_policy(self.policy)
    }

    // ========================================================================
    // BLOCK INGESTION
    // ========================================================================

    /// LoadBlocksFromScratch: 𝔹* × 𝒲* → ℕ
    ///
    /// 1. Parse every framed block, prefiltering against all wallets' addresses
    /// 2. Organize the chain
    /// 3. Mark those addresses as filtered up to the new top height
    /// 4. Purge zero-conf transactions that are now confirmed
    ///
    /// Returns the number of blocks read. Parsing stops at the first block
    /// that does not fit in the remaining bytes.
    pub fn load_blocks_from_scratch(&mut self, bytes: &[u8], wallets: &[&BtcWallet]) -> Result<usize> {
        let watched: HashSet<Hash160> = wallets.iter().flat_map(|w| w.address_hashes()).collect();
        debug!(addresses = watched.len(), "prefiltering bulk load");

        let n_blocks = self.ingest_stream(bytes, Some(&watched));
        self.total_bytes += bytes.len() as u64;

        self.chain.organize(false)?;
        let top_height = self.chain.top_height().unwrap_or(0);
        for addr in watched {
            self.filtered_addresses.insert(addr, top_height);
        }

        self.purge_zero_conf_pool()?;
        info!(
            blocks = n_blocks,
            relevant_txs = self.filtered_tx_hashes.len(),
            top_height,
            "loaded blocks from scratch"
        );
        Ok(n_blocks)
    }

    /// Bulk load the block file named in the configuration
    pub fn read_configured_blk_file(&mut self, wallets: &[&BtcWallet]) -> Result<usize> {
        let path = self.configured_blk_file.clone().ok_or(LedgerError::NoBlockFile)?;
        self.read_blk_file_from_scratch(path, wallets)
    }

    /// Bulk load a block file; loading the already-loaded file returns 0
    pub fn read_blk_file_from_scratch(
        &mut self,
        path: impl AsRef<Path>,
        wallets: &[&BtcWallet],
    ) -> Result<usize> {
        let path = path.as_ref();
        if self.blk_file_path.as_deref() == Some(path) {
            warn!(path = %path.display(), "block file already loaded");
            return Ok(0);
        }

        let bytes = fs::read(path).map_err(|e| LedgerError::io(path, e))?;
        self.blk_file_path = Some(path.to_path_buf());
        self.last_eof = bytes.len() as u64;
        self.load_blocks_from_scratch(&bytes, wallets)
    }

    /// Feed every complete block appended to the block file since the last
    /// read through [`Self::add_new_block`].
    ///
    /// A partially written trailing block is left for the next update.
    /// Returns the number of blocks added.
    pub fn read_blk_file_update(&mut self) -> Result<usize> {
        let path = self.blk_file_path.clone().ok_or(LedgerError::NoBlockFile)?;
        let bytes = fs::read(&path).map_err(|e| LedgerError::io(&path, e))?;
        let start = self.last_eof as usize;
        if bytes.len() <= start {
            return Ok(0);
        }

        let new_data = &bytes[start..];
        let mut pos = 0;
        let mut n_added = 0;
        while new_data.len() - pos >= BLOCK_FRAME_PREFIX {
            let mut len_bytes = [0u8; 4];
            len_bytes.copy_from_slice(&new_data[pos + 4..pos + BLOCK_FRAME_PREFIX]);
            let end = pos + BLOCK_FRAME_PREFIX + u32::from_le_bytes(len_bytes) as usize;
            if end > new_data.len() {
                break;
            }
            if self.add_new_block(&new_data[pos..end])?.succeeded {
                n_added += 1;
            }
            pos = end;
        }

        self.last_eof += pos as u64;
        info!(blocks = n_added, bytes = pos, "read block file update");
        Ok(n_added)
    }

    /// AddNewBlock: framed block → (succeeded, new top, reorg)
    ///
    /// 1. Parse; an unparseable block changes nothing
    /// 2. Insert and organize
    /// 3. On reorg, reassess transactions and keep the report for wallets
    /// 4. Purge the zero-conf pool of newly confirmed transactions
    pub fn add_new_block(&mut self, raw: &[u8]) -> Result<BlockAddResult> {
        let mut reader = ByteReader::new(raw);
        let parsed = match parse_framed_block(&mut reader, self.total_bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "adding new block failed");
                return Ok(BlockAddResult::default());
            }
        };

        let block_hash = parsed.hash;
        self.chain.insert_block(parsed, self.total_bytes);
        self.total_bytes += reader.position() as u64;

        let outcome = self.chain.organize(false)?;
        self.last_block_was_reorg = outcome.reorg_occurred;
        // The report only ever describes the most recent block
        self.last_reorg = match outcome.branch_point {
            Some(branch_point) if outcome.reorg_occurred => Some(self.chain.reassess_after_reorg(
                outcome.prev_top,
                outcome.new_top,
                branch_point,
            )),
            _ => None,
        };

        let is_new_top = self
            .chain
            .header_by_hash(&block_hash)
            .map_or(false, HeaderNode::is_main_branch);
        self.purge_zero_conf_pool()?;

        debug!(
            hash = %hash_to_display_hex(&block_hash),
            is_new_top,
            reorg = outcome.reorg_occurred,
            "added new block"
        );
        Ok(BlockAddResult {
            succeeded: true,
            is_new_top,
            caused_reorg: outcome.reorg_occurred,
        })
    }

    fn ingest_stream(&mut self, bytes: &[u8], watched: Option<&HashSet<Hash160>>) -> usize {
        let base = self.total_bytes;
        let mut reader = ByteReader::new(bytes);
        let mut n_blocks = 0;
        while !reader.is_empty() {
            let offset = base + reader.position() as u64;
            let parsed = match parse_framed_block(&mut reader, offset) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(offset, error = %e, "stopped reading block stream");
                    break;
                }
            };

            if let Some(watched) = watched {
                for tx in &parsed.txs {
                    prefilter_tx(
                        tx,
                        |h| watched.contains(h),
                        &mut self.filtered_outpoints,
                        &mut self.filtered_tx_hashes,
                    );
                }
            }
            self.chain.insert_block(parsed, offset);
            n_blocks += 1;
        }
        n_blocks
    }

    /// Transactions reassessed by the most recent reorg
    pub fn last_reorg_report(&self) -> Option<&ReorgReport> {
        self.last_reorg.as_ref()
    }

    pub fn last_block_was_reorg(&self) -> bool {
        self.last_block_was_reorg
    }

    /// Apply the most recent reorg report to a wallet's confirmed ledgers
    pub fn update_wallet_after_reorg(&self, wallet: &mut BtcWallet) {
        if let Some(report) = &self.last_reorg {
            wallet.apply_reorg(report, &self.chain);
        }
    }

    /// Apply the most recent reorg report to every registered wallet
    pub fn update_wallets_after_reorg(&self, wallets: &mut [&mut BtcWallet]) {
        for wallet in wallets.iter_mut() {
            self.update_wallet_after_reorg(wallet);
        }
    }

    pub fn blk_file_path(&self) -> Option<&Path> {
        self.blk_file_path.as_deref()
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn top_header(&self) -> Option<&HeaderNode> {
        self.chain.top_header()
    }

    pub fn top_height(&self) -> Option<u32> {
        self.chain.top_height()
    }

    pub fn genesis_header(&self) -> Option<&HeaderNode> {
        self.chain.genesis_header()
    }

    pub fn header_by_height(&self, height: u32) -> Option<&HeaderNode> {
        self.chain.header_by_height(height)
    }

    pub fn header_by_hash(&self, hash: &Hash) -> Option<&HeaderNode> {
        self.chain.header_by_hash(hash)
    }

    pub fn has_header_with_hash(&self, hash: &Hash) -> bool {
        self.chain.has_header_with_hash(hash)
    }

    /// Confirmed index first, then the zero-conf pool
    pub fn tx_by_hash(&self, hash: &Hash) -> Option<&TxRef> {
        self.chain
            .tx_by_hash(hash)
            .or_else(|| self.zero_conf.get(hash).map(|entry| &entry.tx))
    }

    pub fn has_tx_with_hash(&self, hash: &Hash, include_zero_conf: bool) -> bool {
        self.chain.has_tx_with_hash(hash) || (include_zero_conf && self.zero_conf.contains(hash))
    }

    /// Pooled transactions count as unconfirmed
    pub fn num_confirmations(&self, hash: &Hash) -> Confirmations {
        match self.chain.num_confirmations(hash) {
            Confirmations::NotFound if self.zero_conf.contains(hash) => Confirmations::Unconfirmed,
            other => other,
        }
    }

    pub fn prefix_search_headers(&self, prefix: &[u8]) -> Vec<&HeaderNode> {
        self.chain.prefix_search_headers(prefix)
    }

    pub fn prefix_search_tx(&self, prefix: &[u8]) -> Vec<&TxRef> {
        self.chain.prefix_search_tx(prefix)
    }

    pub fn headers_not_on_main_chain(&self) -> Vec<&HeaderNode> {
        self.chain.headers_not_on_main_chain()
    }

    pub fn orphan_chain_roots(&self) -> Vec<&HeaderNode> {
        self.chain.orphan_chain_roots()
    }

    pub fn previously_valid_headers(&self) -> Vec<&HeaderNode> {
        self.chain.previously_valid_headers()
    }

    /// The output an input spends, looked up in the index and the pool
    pub fn prev_tx_out(&self, prevout: &OutPoint) -> Option<TxOutView<'_>> {
        if prevout.is_coinbase() {
            return None;
        }
        self.tx_by_hash(&prevout.hash)
            .and_then(|tx| tx.output(prevout.index as usize))
    }

    pub fn sender_hash160(&self, prevout: &OutPoint) -> Option<Hash160> {
        self.prev_tx_out(prevout).and_then(|out| out.recipient())
    }

    pub fn sent_value(&self, prevout: &OutPoint) -> Option<Amount> {
        self.prev_tx_out(prevout).map(|out| out.value)
    }

    pub fn find_all_non_std_tx(&self) -> Vec<Hash> {
        self.chain.find_all_non_std_tx()
    }

    pub fn verify_integrity(&self) -> Vec<IntegrityFailure> {
        self.chain.verify_integrity()
    }

    // ========================================================================
    // WALLET SCANNING
    // ========================================================================

    /// Record that `addr` needs no raw-block scan up to `height`
    /// (`None` means the current top)
    pub fn mark_addr_as_filtered(&mut self, addr: Hash160, height: Option<u32>) {
        let height = height.unwrap_or_else(|| self.chain.top_height().unwrap_or(0));
        self.filtered_addresses.insert(addr, height);
    }

    pub fn addr_last_filtered_block(&self, addr: &Hash160) -> u32 {
        self.filtered_addresses.get(addr).copied().unwrap_or(0)
    }

    /// Lowest filtered height over a wallet's addresses
    pub fn minimum_filtered_block(&self, wallet: &BtcWallet) -> u32 {
        wallet
            .address_hashes()
            .map(|a| self.addr_last_filtered_block(&a))
            .min()
            .unwrap_or(u32::MAX)
    }

    /// ScanBlockchainForTx: 𝒲 × ℕ × ℕ → 𝒲
    ///
    /// 1. Below the wallet's minimum filtered height, scan only the cached
    ///    prefilter hits in `[start, min(filtered, end))`
    /// 2. Scan raw main-chain blocks in `[max(start, filtered), end)`
    /// 3. Sort the ledgers
    /// 4. With zero-conf enabled, rebuild the wallet's zero-conf state
    pub fn scan_blockchain_for_tx(&self, wallet: &mut BtcWallet, start: u32, end: u32) {
        let last_filtered = self.minimum_filtered_block(wallet);
        if start < last_filtered {
            self.scan_filtered_tx_for_wallet(wallet, start, last_filtered.min(end));
        }

        let raw_start = start.max(last_filtered);
        let raw_end = end.min(self.chain.main_chain_len() as u32);
        for height in raw_start..raw_end {
            let header = match self.chain.header_by_height(height) {
                Some(header) => header,
                None => continue,
            };
            for (tx_index, tx) in self.chain.block_txs(header).into_iter().enumerate() {
                wallet.scan_tx(
                    tx,
                    tx_index as u32,
                    header.timestamp() as u64,
                    Some(height),
                    &self.chain,
                );
            }
        }

        wallet.sort_ledger();
        if self.zc_enabled {
            self.zero_conf.rescan(wallet, &self.chain);
        }
        debug!(start, end, last_filtered, "scanned blockchain for wallet");
    }

    fn scan_filtered_tx_for_wallet(&self, wallet: &mut BtcWallet, start: u32, end: u32) {
        for tx_hash in &self.filtered_tx_hashes {
            let tx = match self.chain.tx_by_hash(tx_hash) {
                Some(tx) => tx,
                None => continue,
            };
            // Only transactions on the main chain
            let header = match self.chain.tx_header(tx) {
                Some(header) => header,
                None => continue,
            };
            let height = header.height();
            if height < start || height >= end {
                continue;
            }
            wallet.scan_tx(
                tx,
                tx.block_tx_index(),
                header.timestamp() as u64,
                Some(height),
                &self.chain,
            );
        }
    }

    // ========================================================================
    // ZERO-CONF POOL
    // ========================================================================

    /// Turn on zero-conf tracking backed by `path`; returns records loaded
    pub fn enable_zero_conf(&mut self, path: impl Into<PathBuf>) -> Result<usize> {
        self.zc_enabled = true;
        self.zero_conf.load(path, &self.chain)
    }

    /// Stop persisting and rescanning; pooled transactions are kept
    pub fn disable_zero_conf(&mut self) {
        self.zc_enabled = false;
        self.zero_conf.set_path(None);
    }

    pub fn is_zero_conf_enabled(&self) -> bool {
        self.zc_enabled
    }

    pub fn zero_conf_pool(&self) -> &ZeroConfPool {
        &self.zero_conf
    }

    /// Submit a raw transaction; `received` of 0 means now
    pub fn add_zero_conf_tx(&mut self, raw: &[u8], received: u64) -> Result<bool> {
        self.zero_conf.add(raw, received, &self.chain)
    }

    pub fn purge_zero_conf_pool(&mut self) -> Result<Vec<Hash>> {
        self.zero_conf.purge(&self.chain)
    }

    pub fn rescan_wallet_zero_conf(&self, wallet: &mut BtcWallet) -> usize {
        self.zero_conf.rescan(wallet, &self.chain)
    }
}

/// A [`BlockDataManager`] behind a single-writer lock
#[derive(Debug, Clone)]
pub struct SharedBlockDataManager {
    inner: Arc<RwLock<BlockDataManager>>,
}

impl SharedBlockDataManager {
    pub fn new(manager: BlockDataManager) -> Self {
        SharedBlockDataManager {
            inner: Arc::new(RwLock::new(manager)),
        }
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, BlockDataManager>> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }

    pub fn write(&self) -> Result<RwLockWriteGuard<'_, BlockDataManager>> {
        self.inner.write().map_err(|_| LedgerError::LockPoisoned)
    }

    pub fn add_new_block(&self, raw: &[u8]) -> Result<BlockAddResult> {
        self.write()?.add_new_block(raw)
    }

    pub fn add_zero_conf_tx(&self, raw: &[u8], received: u64) -> Result<bool> {
        self.write()?.add_zero_conf_tx(raw, received)
    }

    pub fn top_height(&self) -> Result<Option<u32>> {
        Ok(self.read()?.top_height())
    }

    pub fn num_confirmations(&self, hash: &Hash) -> Result<Confirmations> {
        Ok(self.read()?.num_confirmations(hash))
    }

    pub fn scan_blockchain_for_tx(&self, wallet: &mut BtcWallet, start: u32, end: u32) -> Result<()> {
        self.read()?.scan_blockchain_for_tx(wallet, start, end);
        Ok(())
    }

    pub fn update_wallet_after_reorg(&self, wallet: &mut BtcWallet) -> Result<()> {
        self.read()?.update_wallet_after_reorg(wallet);
        Ok(())
    }

    pub fn update_wallets_after_reorg(&self, wallets: &mut [&mut BtcWallet]) -> Result<()> {
        self.read()?.update_wallets_after_reorg(wallets);
        Ok(())
    }
}
