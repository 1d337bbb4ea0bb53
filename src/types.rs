//! Core Bitcoin types shared by the header graph, the transaction index and wallets

use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash, internal byte order
pub type Hash = [u8; 32];

/// 20-byte public-key hash identifying a watched address
pub type Hash160 = [u8; 20];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Amount in satoshis
pub type Amount = u64;

/// OutPoint: the spendable output `(tx hash, output index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        OutPoint { hash, index }
    }

    /// Read an outpoint from the first 36 bytes of a serialized input
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < crate::constants::OUTPOINT_SIZE {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        let index = u32::from_le_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);
        Some(OutPoint { hash, index })
    }

    pub fn is_coinbase(&self) -> bool {
        self.hash == crate::constants::EMPTY_HASH
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Amount,
    pub script_pubkey: ByteString,
}

/// Fully decoded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

/// Block header as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// Block: header plus its transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

/// Confirmation state of a transaction hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmations {
    /// Neither in the transaction index nor in the zero-conf pool
    NotFound,
    /// Known, but not linked to any main-branch header
    Unconfirmed,
    /// Linked to a header that lost the best-chain selection
    OffMainBranch,
    Confirmed(u32),
}

/// Read-only view of where transactions sit on the main chain.
///
/// Spend relations only store transaction hashes; whether the transaction
/// currently counts as confirmed is always asked of the chain.
pub trait TxLookup {
    /// Height of the main-branch header that currently claims `tx_hash`
    fn main_branch_height(&self, tx_hash: &Hash) -> Option<u32>;

    /// Whether `tx_hash` is in the confirmed transaction index at all
    fn contains_tx(&self, tx_hash: &Hash) -> bool;

    fn is_main_branch(&self, tx_hash: &Hash) -> bool {
        self.main_branch_height(tx_hash).is_some()
    }
}
