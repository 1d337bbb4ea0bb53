//! Output script classification
//!
//! Only the two standard output shapes of the era are recognized; scripts
//! are never executed.

use crate::constants::*;
use crate::serialize::hash160;
use crate::types::*;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const PUSH_20: u8 = 0x14;
const PUSH_65: u8 = 0x41;

/// Recognized output script shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    StdHash160,
    /// `<65-byte pubkey> OP_CHECKSIG`
    StdPubKey65,
    Unknown,
}

/// Classify an output script by length and opcode layout
pub fn classify_script(script: &[u8]) -> ScriptType {
    match script.len() {
        STD_HASH160_SCRIPT_LEN
            if script[0] == OP_DUP
                && script[1] == OP_HASH160
                && script[2] == PUSH_20
                && script[23] == OP_EQUALVERIFY
                && script[24] == OP_CHECKSIG =>
        {
            ScriptType::StdHash160
        }
        STD_PUBKEY65_SCRIPT_LEN if script[0] == PUSH_65 && script[66] == OP_CHECKSIG => {
            ScriptType::StdPubKey65
        }
        _ => ScriptType::Unknown,
    }
}

/// Recipient public-key hash of a standard output script.
///
/// For the hash160 form the hash is read directly by offset; for the
/// pay-to-pubkey form the embedded key is hashed. Unknown scripts have no
/// recipient.
pub fn script_recipient(script: &[u8]) -> Option<Hash160> {
    match classify_script(script) {
        ScriptType::StdHash160 => {
            let mut out = [0u8; 20];
            out.copy_from_slice(&script[3..23]);
            Some(out)
        }
        ScriptType::StdPubKey65 => Some(hash160(&script[1..66])),
        ScriptType::Unknown => None,
    }
}

/// Whether `needle` occurs anywhere inside `script`
pub fn script_contains(script: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && script.windows(needle.len()).any(|w| w == needle)
}

/// Build `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(hash: &Hash160) -> ByteString {
    let mut script = Vec::with_capacity(STD_HASH160_SCRIPT_LEN);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(PUSH_20);
    script.extend_from_slice(hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// Build `<pubkey> OP_CHECKSIG` for a 65-byte uncompressed key
pub fn p2pk_script(pubkey: &[u8; 65]) -> ByteString {
    let mut script = Vec::with_capacity(STD_PUBKEY65_SCRIPT_LEN);
    script.push(PUSH_65);
    script.extend_from_slice(pubkey);
    script.push(OP_CHECKSIG);
    script
}
