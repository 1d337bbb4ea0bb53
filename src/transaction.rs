//! Transaction records for the hash-indexed store
//!
//! A [`TxRef`] owns the raw serialized bytes of one transaction and remembers
//! where each input and output starts inside them, so relevance filters can
//! read outpoints and script prefixes without decoding the whole transaction.

use crate::error::{LedgerError, Result};
use crate::script::{classify_script, script_recipient, ScriptType};
use crate::serialize::{hash256, write_var_bytes, write_varint, ByteReader};
use crate::types::*;

/// Byte span of one input or output inside the raw transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSpan {
    start: usize,
    script_start: usize,
    script_len: usize,
}

/// One transaction plus its chain linkage.
///
/// `header` is an arena id into the header graph and is only set while some
/// main-branch header claims this transaction.
#[derive(Debug, Clone)]
pub struct TxRef {
    raw: ByteString,
    hash: Hash,
    inputs: Vec<FieldSpan>,
    outputs: Vec<FieldSpan>,
    pub(crate) stream_offset: u64,
    pub(crate) header: Option<usize>,
    pub(crate) is_main_branch: bool,
    pub(crate) block_tx_index: u32,
}

/// Borrowed view of one transaction input
#[derive(Debug, Clone, Copy)]
pub struct TxInView<'a> {
    pub index: u32,
    pub prevout: OutPoint,
    pub script_sig: &'a [u8],
    pub sequence: u32,
}

impl TxInView<'_> {
    pub fn is_coinbase(&self) -> bool {
        self.prevout.is_coinbase()
    }
}

/// Borrowed view of one transaction output
#[derive(Debug, Clone, Copy)]
pub struct TxOutView<'a> {
    pub index: u32,
    pub value: Amount,
    pub script_pubkey: &'a [u8],
}

impl TxOutView<'_> {
    pub fn script_type(&self) -> ScriptType {
        classify_script(self.script_pubkey)
    }

    pub fn recipient(&self) -> Option<Hash160> {
        script_recipient(self.script_pubkey)
    }

    pub fn is_standard(&self) -> bool {
        self.script_type() != ScriptType::Unknown
    }
}

impl TxRef {
    /// Parse one transaction at the reader's position.
    ///
    /// The reader is left just past the lock time. Nothing is hashed or
    /// copied until the whole transaction has been bounds-checked.
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<TxRef> {
        let start = reader.position();

        reader.skip(4)?; // version
        let n_in = reader.read_varint()?;
        let mut inputs = Vec::new();
        for _ in 0..n_in {
            let span_start = reader.position() - start;
            reader.skip(crate::constants::OUTPOINT_SIZE)?;
            let script_len = reader.read_len()?;
            let script_start = reader.position() - start;
            reader.skip(script_len)?;
            reader.skip(4)?; // sequence
            inputs.push(FieldSpan {
                start: span_start,
                script_start,
                script_len,
            });
        }

        let n_out = reader.read_varint()?;
        let mut outputs = Vec::new();
        for _ in 0..n_out {
            let span_start = reader.position() - start;
            reader.skip(8)?;
            let script_len = reader.read_len()?;
            let script_start = reader.position() - start;
            reader.skip(script_len)?;
            outputs.push(FieldSpan {
                start: span_start,
                script_start,
                script_len,
            });
        }
        reader.skip(4)?; // lock time

        let raw = reader.consumed_since(start).to_vec();
        let hash = hash256(&raw);
        Ok(TxRef {
            raw,
            hash,
            inputs,
            outputs,
            stream_offset: 0,
            header: None,
            is_main_branch: false,
            block_tx_index: 0,
        })
    }

    /// Parse a standalone serialized transaction; trailing bytes are an error
    pub fn from_bytes(raw: &[u8]) -> Result<TxRef> {
        let mut reader = ByteReader::new(raw);
        let tx = TxRef::parse(&mut reader)?;
        if !reader.is_empty() {
            return Err(LedgerError::Deserialization(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }
        Ok(tx)
    }

    pub fn from_transaction(tx: &Transaction) -> Result<TxRef> {
        TxRef::from_bytes(&serialize_transaction(tx))
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn size(&self) -> usize {
        self.raw.len()
    }

    pub fn version(&self) -> u32 {
        le_u32(&self.raw, 0)
    }

    pub fn lock_time(&self) -> u32 {
        le_u32(&self.raw, self.raw.len() - 4)
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Outpoint spent by input `i`, read straight from the raw bytes
    pub fn outpoint(&self, i: usize) -> Option<OutPoint> {
        let span = self.inputs.get(i)?;
        OutPoint::from_slice(&self.raw[span.start..])
    }

    /// Output script of output `i`, without decoding the value
    pub fn output_script(&self, i: usize) -> Option<&[u8]> {
        let span = self.outputs.get(i)?;
        Some(&self.raw[span.script_start..span.script_start + span.script_len])
    }

    pub fn input(&self, i: usize) -> Option<TxInView<'_>> {
        let span = self.inputs.get(i)?;
        let prevout = OutPoint::from_slice(&self.raw[span.start..])?;
        let script_end = span.script_start + span.script_len;
        Some(TxInView {
            index: i as u32,
            prevout,
            script_sig: &self.raw[span.script_start..script_end],
            sequence: le_u32(&self.raw, script_end),
        })
    }

    pub fn output(&self, i: usize) -> Option<TxOutView<'_>> {
        let span = self.outputs.get(i)?;
        Some(TxOutView {
            index: i as u32,
            value: le_u64(&self.raw, span.start),
            script_pubkey: &self.raw[span.script_start..span.script_start + span.script_len],
        })
    }

    pub fn inputs(&self) -> impl Iterator<Item = TxInView<'_>> {
        (0..self.inputs.len()).filter_map(move |i| self.input(i))
    }

    pub fn outputs(&self) -> impl Iterator<Item = TxOutView<'_>> {
        (0..self.outputs.len()).filter_map(move |i| self.output(i))
    }

    /// A transaction with any input spending the empty hash is a coinbase
    pub fn is_coinbase(&self) -> bool {
        (0..self.inputs.len()).any(|i| self.outpoint(i).map_or(false, |op| op.is_coinbase()))
    }

    pub fn has_non_std_output(&self) -> bool {
        self.outputs().any(|out| !out.is_standard())
    }

    /// Arena id of the main-branch header claiming this transaction
    pub fn header(&self) -> Option<usize> {
        self.header
    }

    pub fn is_main_branch(&self) -> bool {
        self.is_main_branch
    }

    pub fn block_tx_index(&self) -> u32 {
        self.block_tx_index
    }

    /// Offset of this transaction in the block stream it was read from
    pub fn stream_offset(&self) -> u64 {
        self.stream_offset
    }

    /// Fully decode into an owned [`Transaction`]
    pub fn to_transaction(&self) -> Transaction {
        Transaction {
            version: self.version(),
            inputs: self
                .inputs()
                .map(|input| TransactionInput {
                    prevout: input.prevout,
                    script_sig: input.script_sig.to_vec(),
                    sequence: input.sequence,
                })
                .collect(),
            outputs: self
                .outputs()
                .map(|output| TransactionOutput {
                    value: output.value,
                    script_pubkey: output.script_pubkey.to_vec(),
                })
                .collect(),
            lock_time: self.lock_time(),
        }
    }
}

// ============================================================================
// SERIALIZATION
// ============================================================================

/// Serialize a transaction in wire format
pub fn serialize_transaction(tx: &Transaction) -> ByteString {
    let mut data = Vec::new();

    data.extend_from_slice(&tx.version.to_le_bytes());

    write_varint(&mut data, tx.inputs.len() as u64);
    for input in &tx.inputs {
        data.extend_from_slice(&input.prevout.hash);
        data.extend_from_slice(&input.prevout.index.to_le_bytes());
        write_var_bytes(&mut data, &input.script_sig);
        data.extend_from_slice(&input.sequence.to_le_bytes());
    }

    write_varint(&mut data, tx.outputs.len() as u64);
    for output in &tx.outputs {
        data.extend_from_slice(&output.value.to_le_bytes());
        write_var_bytes(&mut data, &output.script_pubkey);
    }

    data.extend_from_slice(&tx.lock_time.to_le_bytes());
    data
}

/// Calculate transaction hash using wire serialization
pub fn calculate_tx_hash(tx: &Transaction) -> Hash {
    hash256(&serialize_transaction(tx))
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
