//! Zero-confirmation transaction pool
//!
//! Pooled transactions are kept in arrival order: a later transaction may
//! spend an output created by an earlier one, so wallet rescans must replay
//! them in the order they were received. The optional backing file is a
//! sequence of `(u64 LE receipt time, raw transaction)` records.

use crate::error::{LedgerError, Result};
use crate::serialize::{hash_to_display_hex, ByteReader};
use crate::transaction::TxRef;
use crate::types::*;
use crate::wallet::{BtcWallet, TxScan};
use indexmap::IndexMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Size of the receipt-time prefix of each file record
const RECORD_TIME_SIZE: usize = 8;

#[derive(Debug, Clone)]
pub struct ZeroConfEntry {
    pub tx: TxRef,
    /// Receipt time, seconds since the Unix epoch
    pub received: u64,
}

/// Arrival-ordered pool keyed by transaction hash
#[derive(Debug, Clone, Default)]
pub struct ZeroConfPool {
    entries: IndexMap<Hash, ZeroConfEntry>,
    path: Option<PathBuf>,
}

impl ZeroConfPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.entries.contains_key(tx_hash)
    }

    pub fn get(&self, tx_hash: &Hash) -> Option<&ZeroConfEntry> {
        self.entries.get(tx_hash)
    }

    /// Entries in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &ZeroConfEntry> {
        self.entries.values()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Backing file for appends and rewrites; `None` keeps the pool in memory
    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    /// Insert without touching the backing file.
    ///
    /// Rejects transactions already pooled or already in the confirmed index.
    pub fn insert(&mut self, tx: TxRef, received: u64, chain: &impl TxLookup) -> bool {
        let tx_hash = tx.hash();
        if self.entries.contains_key(&tx_hash) || chain.contains_tx(&tx_hash) {
            return false;
        }
        let received = if received == 0 { unix_now() } else { received };
        self.entries.insert(tx_hash, ZeroConfEntry { tx, received });
        true
    }

    /// AddZeroConfTx: raw tx × time → accepted?
    ///
    /// 1. Parse the raw transaction (malformed bytes are an error)
    /// 2. Reject duplicates; a time of 0 means now
    /// 3. Append a record to the backing file, if one is set
    pub fn add(&mut self, raw: &[u8], received: u64, chain: &impl TxLookup) -> Result<bool> {
        let tx = TxRef::from_bytes(raw)?;
        let tx_hash = tx.hash();
        if !self.insert(tx, received, chain) {
            debug!(tx = %hash_to_display_hex(&tx_hash), "zero-conf tx already known");
            return Ok(false);
        }

        if let (Some(path), Some(entry)) = (&self.path, self.entries.get(&tx_hash)) {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| LedgerError::io(path, e))?;
            file.write_all(&encode_record(entry))
                .map_err(|e| LedgerError::io(path, e))?;
        }
        Ok(true)
    }

    /// Remove every pooled transaction that is now in the confirmed index.
    ///
    /// The backing file is rewritten when anything was removed. Returns the
    /// hashes removed, in arrival order.
    pub fn purge(&mut self, chain: &impl TxLookup) -> Result<Vec<Hash>> {
        let removed: Vec<Hash> = self
            .entries
            .keys()
            .filter(|hash| chain.contains_tx(hash))
            .copied()
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }

        self.entries.retain(|hash, _| !chain.contains_tx(hash));
        info!(removed = removed.len(), remaining = self.entries.len(), "purged zero-conf pool");
        self.rewrite_file()?;
        Ok(removed)
    }

    /// Clear the wallet's zero-conf state and replay the pool in arrival order
    pub fn rescan(&self, wallet: &mut BtcWallet, chain: &impl TxLookup) -> usize {
        wallet.clear_zero_conf();
        let mut recorded = 0;
        for entry in self.entries.values() {
            if wallet.scan_tx(&entry.tx, 0, entry.received, None, chain) == TxScan::Recorded {
                recorded += 1;
            }
        }
        recorded
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Use `path` as the backing file and load its records.
    ///
    /// A missing file is an empty pool. Loaded records are inserted without
    /// re-appending, then transactions confirmed in the meantime are purged.
    pub fn load(&mut self, path: impl Into<PathBuf>, chain: &impl TxLookup) -> Result<usize> {
        let path = path.into();
        let mut loaded = 0;
        match fs::read(&path) {
            Ok(bytes) => {
                for (received, tx) in decode_records(&bytes) {
                    if self.insert(tx, received, chain) {
                        loaded += 1;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no zero-conf file yet");
            }
            Err(e) => return Err(LedgerError::io(path, e)),
        }

        self.path = Some(path);
        self.purge(chain)?;
        info!(loaded, pooled = self.entries.len(), "loaded zero-conf pool");
        Ok(loaded)
    }

    /// Rewrite the backing file from the pool contents
    pub fn rewrite_file(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        let mut bytes = Vec::new();
        for entry in self.entries.values() {
            bytes.extend_from_slice(&encode_record(entry));
        }
        fs::write(path, bytes).map_err(|e| LedgerError::io(path, e))
    }
}

fn encode_record(entry: &ZeroConfEntry) -> ByteString {
    let mut out = Vec::with_capacity(RECORD_TIME_SIZE + entry.tx.size());
    out.extend_from_slice(&entry.received.to_le_bytes());
    out.extend_from_slice(entry.tx.raw());
    out
}

/// Decode `(time, tx)` records; a truncated tail is dropped with a warning
pub fn decode_records(bytes: &[u8]) -> Vec<(u64, TxRef)> {
    let mut records = Vec::new();
    let mut reader = ByteReader::new(bytes);
    while reader.remaining() > RECORD_TIME_SIZE {
        let parsed = reader
            .read_u64()
            .and_then(|received| TxRef::parse(&mut reader).map(|tx| (received, tx)));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(
                    offset = reader.position(),
                    error = %e,
                    "dropping truncated zero-conf record"
                );
                break;
            }
        }
    }
    records
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
