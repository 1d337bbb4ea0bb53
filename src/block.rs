//! Block headers, header-graph nodes and framed block parsing

use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::pow::difficulty_from_bits;
use crate::serialize::{hash256, write_varint, ByteReader};
use crate::transaction::{serialize_transaction, TxRef};
use crate::types::*;

// ============================================================================
// HEADER GRAPH NODE
// ============================================================================

/// One header in the header graph plus its derived chain position.
///
/// `height` is only meaningful while `is_main_branch` is set, and
/// `difficulty_sum` is `None` until an organize pass resolves it.
#[derive(Debug, Clone)]
pub struct HeaderNode {
    pub(crate) header: BlockHeader,
    pub(crate) hash: Hash,
    pub(crate) next_hash: Option<Hash>,
    pub(crate) difficulty: f64,
    pub(crate) difficulty_sum: Option<f64>,
    pub(crate) height: u32,
    pub(crate) is_main_branch: bool,
    pub(crate) is_orphan: bool,
    pub(crate) is_finished_calc: bool,
    /// Transaction index ids, in block order
    pub(crate) tx_ids: Vec<usize>,
    pub(crate) stream_offset: u64,
    pub(crate) num_bytes: u32,
}

impl HeaderNode {
    pub fn new(header: BlockHeader) -> Self {
        let hash = calculate_block_hash(&header);
        let difficulty = difficulty_from_bits(header.bits);
        HeaderNode {
            header,
            hash,
            next_hash: None,
            difficulty,
            difficulty_sum: None,
            height: 0,
            is_main_branch: false,
            is_orphan: false,
            is_finished_calc: false,
            tx_ids: Vec::new(),
            stream_offset: 0,
            num_bytes: 0,
        }
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn prev_hash(&self) -> Hash {
        self.header.prev_block_hash
    }

    pub fn next_hash(&self) -> Option<Hash> {
        self.next_hash
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    pub fn difficulty_sum(&self) -> Option<f64> {
        self.difficulty_sum
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_main_branch(&self) -> bool {
        self.is_main_branch
    }

    pub fn is_orphan(&self) -> bool {
        self.is_orphan
    }

    pub fn num_tx(&self) -> usize {
        self.tx_ids.len()
    }

    pub fn tx_ids(&self) -> &[usize] {
        &self.tx_ids
    }

    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    pub fn num_bytes(&self) -> u32 {
        self.num_bytes
    }

    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        serialize_header(&self.header)
    }
}

// ============================================================================
// FRAMED BLOCK PARSING
// ============================================================================

/// A block read from the framed stream, not yet inserted anywhere
#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub header: BlockHeader,
    pub hash: Hash,
    pub txs: Vec<TxRef>,
    /// Declared length from the frame prefix
    pub num_bytes: u32,
}

/// ParseFramedBlock: 𝔹* × ℕ → ℬ
///
/// Read `magic | len | header | varint n_tx | tx*` at the reader position:
/// 1. Skip the 4 magic bytes (not checked against the network)
/// 2. Read the little-endian block length
/// 3. If the length exceeds the remaining stream: framing error
/// 4. Decode the header and every transaction within the declared length
/// 5. Record each transaction's offset relative to `stream_offset`
///
/// The reader only advances past the block when the whole block decodes.
pub fn parse_framed_block(reader: &mut ByteReader<'_>, stream_offset: u64) -> Result<ParsedBlock> {
    let mut probe = reader.clone();
    probe.skip(4)?;
    let num_bytes = probe.read_u32()?;
    if num_bytes as usize > probe.remaining() {
        return Err(LedgerError::BlockFraming {
            declared: num_bytes as usize,
            remaining: probe.remaining(),
        });
    }

    let body = probe.read_bytes(num_bytes as usize)?;
    let mut block_reader = ByteReader::new(body);
    let header = parse_header(&mut block_reader)?;
    let n_tx = block_reader.read_varint()?;

    let mut txs = Vec::new();
    for i in 0..n_tx {
        let offset = stream_offset + (BLOCK_FRAME_PREFIX + block_reader.position()) as u64;
        let mut tx = TxRef::parse(&mut block_reader)?;
        tx.stream_offset = offset;
        tx.block_tx_index = i as u32;
        txs.push(tx);
    }

    *reader = probe;
    Ok(ParsedBlock {
        hash: calculate_block_hash(&header),
        header,
        txs,
        num_bytes,
    })
}

/// Decode an unframed block (header followed by its transactions)
pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    let mut reader = ByteReader::new(bytes);
    let header = parse_header(&mut reader)?;
    let n_tx = reader.read_varint()?;
    let mut transactions = Vec::new();
    for _ in 0..n_tx {
        transactions.push(TxRef::parse(&mut reader)?.to_transaction());
    }
    if !reader.is_empty() {
        return Err(LedgerError::Deserialization(format!(
            "{} trailing bytes after block",
            reader.remaining()
        )));
    }
    Ok(Block { header, transactions })
}

pub fn parse_header(reader: &mut ByteReader<'_>) -> Result<BlockHeader> {
    Ok(BlockHeader {
        version: reader.read_u32()?,
        prev_block_hash: reader.read_hash()?,
        merkle_root: reader.read_hash()?,
        timestamp: reader.read_u32()?,
        bits: reader.read_u32()?,
        nonce: reader.read_u32()?,
    })
}

// ============================================================================
// SERIALIZATION
// ============================================================================

pub fn serialize_header(header: &BlockHeader) -> [u8; HEADER_SIZE] {
    let mut data = [0u8; HEADER_SIZE];
    data[0..4].copy_from_slice(&header.version.to_le_bytes());
    data[4..36].copy_from_slice(&header.prev_block_hash);
    data[36..68].copy_from_slice(&header.merkle_root);
    data[68..72].copy_from_slice(&header.timestamp.to_le_bytes());
    data[72..76].copy_from_slice(&header.bits.to_le_bytes());
    data[76..80].copy_from_slice(&header.nonce.to_le_bytes());
    data
}

/// Calculate block hash using header serialization
pub fn calculate_block_hash(header: &BlockHeader) -> Hash {
    hash256(&serialize_header(header))
}

/// Serialize header plus transactions, without the frame prefix
pub fn serialize_block(block: &Block) -> ByteString {
    let mut data = serialize_header(&block.header).to_vec();
    write_varint(&mut data, block.transactions.len() as u64);
    for tx in &block.transactions {
        data.extend_from_slice(&serialize_transaction(tx));
    }
    data
}

/// Prefix a serialized block with network magic and its length
pub fn frame_block(magic: &[u8; 4], block_bytes: &[u8]) -> ByteString {
    let mut data = Vec::with_capacity(BLOCK_FRAME_PREFIX + block_bytes.len());
    data.extend_from_slice(magic);
    data.extend_from_slice(&(block_bytes.len() as u32).to_le_bytes());
    data.extend_from_slice(block_bytes);
    data
}

/// Calculate merkle root using Bitcoin Merkle tree construction.
///
/// An odd entry at any level is paired with itself. Returns `None` for an
/// empty list.
pub fn calculate_merkle_root(tx_hashes: &[Hash]) -> Option<Hash> {
    if tx_hashes.is_empty() {
        return None;
    }

    let mut hashes = tx_hashes.to_vec();
    while hashes.len() > 1 {
        let mut next_level = Vec::with_capacity((hashes.len() + 1) / 2);
        for chunk in hashes.chunks(2) {
            let right = chunk.get(1).unwrap_or(&chunk[0]);
            let mut combined = [0u8; 64];
            combined[..32].copy_from_slice(&chunk[0]);
            combined[32..].copy_from_slice(right);
            next_level.push(hash256(&combined));
        }
        hashes = next_level;
    }

    Some(hashes[0])
}
