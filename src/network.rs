//! Network parameter bundles: genesis identity and message-start bytes

use crate::constants::*;
use crate::error::{LedgerError, Result};
use crate::serialize::hash_from_hex;
use crate::types::*;
use serde::{Deserialize, Serialize};

/// Identity of the network whose blocks are being ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub genesis_hash: Hash,
    pub genesis_tx_hash: Hash,
    pub magic: [u8; 4],
}

impl NetworkParams {
    pub fn main() -> Self {
        Self::from_constants(
            MAINNET_GENESIS_HASH_HEX,
            MAINNET_GENESIS_TX_HASH_HEX,
            MAINNET_MAGIC_BYTES_HEX,
        )
    }

    pub fn test() -> Self {
        Self::from_constants(
            TESTNET_GENESIS_HASH_HEX,
            TESTNET_GENESIS_TX_HASH_HEX,
            TESTNET_MAGIC_BYTES_HEX,
        )
    }

    /// Select a predefined profile by name (`"Main"` or `"Test"`)
    pub fn select(name: &str) -> Result<Self> {
        match name {
            "Main" => Ok(Self::main()),
            "Test" => Ok(Self::test()),
            other => Err(LedgerError::UnknownNetwork(other.to_string())),
        }
    }

    /// Build explicit parameters from hex strings in internal byte order
    pub fn from_hex(genesis_hash: &str, genesis_tx_hash: &str, magic: &str) -> Result<Self> {
        let magic_bytes = hex::decode(magic)?;
        if magic_bytes.len() != 4 {
            return Err(LedgerError::NetworkParams(format!(
                "magic must be 4 bytes, got {}",
                magic_bytes.len()
            )));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&magic_bytes);

        Ok(NetworkParams {
            genesis_hash: hash_from_hex(genesis_hash)
                .map_err(|e| LedgerError::NetworkParams(format!("genesis hash: {}", e)))?,
            genesis_tx_hash: hash_from_hex(genesis_tx_hash)
                .map_err(|e| LedgerError::NetworkParams(format!("genesis tx hash: {}", e)))?,
            magic,
        })
    }

    // Compile-time constants always decode
    fn from_constants(genesis_hash: &str, genesis_tx_hash: &str, magic: &str) -> Self {
        Self::from_hex(genesis_hash, genesis_tx_hash, magic).unwrap_or(NetworkParams {
            genesis_hash: EMPTY_HASH,
            genesis_tx_hash: EMPTY_HASH,
            magic: [0u8; 4],
        })
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::main()
    }
}
