//! Bitcoin wire-format primitives: byte reader, CompactSize varints and hashing

use crate::error::{LedgerError, Result};
use crate::types::*;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Cursor over an untrusted byte slice.
///
/// Every read is bounds-checked and reports a `Deserialization` error
/// instead of panicking on short input.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Bytes consumed between `start` and the current position
    pub fn consumed_since(&self, start: usize) -> &'a [u8] {
        &self.data[start..self.pos]
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(LedgerError::Deserialization(format!(
                "need {} bytes at offset {}, only {} remaining",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_hash(&mut self) -> Result<Hash> {
        let b = self.read_bytes(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(b);
        Ok(hash)
    }

    /// Read a CompactSize integer
    pub fn read_varint(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => Ok(self.read_u16()? as u64),
            0xfe => Ok(self.read_u32()? as u64),
            0xff => self.read_u64(),
            n => Ok(n as u64),
        }
    }

    /// Read a CompactSize length and check it fits in what is left
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(LedgerError::Deserialization(format!(
                "declared length {} exceeds {} remaining bytes",
                len,
                self.remaining()
            )));
        }
        Ok(len as usize)
    }
}

/// Encode a number as a Bitcoin varint
pub fn encode_varint(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    write_varint(&mut out, value);
    out
}

pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

pub fn write_var_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

// ============================================================================
// HASHING
// ============================================================================

/// Double SHA-256
pub fn hash256(data: &[u8]) -> Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(data);
    let result = sha256d::Hash::from_engine(engine);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result[..]);
    hash
}

/// RIPEMD-160 of SHA-256
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// Display form of a hash: hex of the reversed (big-endian) bytes
pub fn hash_to_display_hex(hash: &Hash) -> String {
    let mut rev = *hash;
    rev.reverse();
    hex::encode(rev)
}

/// Parse a 32-byte hash given as hex in internal byte order
pub fn hash_from_hex(s: &str) -> Result<Hash> {
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        return Err(LedgerError::Deserialization(format!(
            "expected 32-byte hash, got {} bytes",
            bytes.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}
