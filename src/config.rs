//! Ledger configuration loaded from JSON

use crate::constants::{COINBASE_MATURITY, MIN_CONFIRMATIONS};
use crate::error::{LedgerError, Result};
use crate::network::NetworkParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which network's blocks are ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkSelection {
    /// A predefined profile: `"Main"` or `"Test"`
    Named(String),
    /// Explicit hex values, hashes in internal byte order
    Explicit {
        genesis_hash: String,
        genesis_tx_hash: String,
        magic: String,
    },
}

impl Default for NetworkSelection {
    fn default() -> Self {
        NetworkSelection::Named("Main".to_string())
    }
}

impl NetworkSelection {
    pub fn resolve(&self) -> Result<NetworkParams> {
        match self {
            NetworkSelection::Named(name) => NetworkParams::select(name),
            NetworkSelection::Explicit {
                genesis_hash,
                genesis_tx_hash,
                magic,
            } => NetworkParams::from_hex(genesis_hash, genesis_tx_hash, magic),
        }
    }
}

/// Confirmation thresholds used by spendability checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendPolicy {
    pub coinbase_maturity: u32,
    pub min_confirmations: u32,
}

impl Default for SpendPolicy {
    fn default() -> Self {
        SpendPolicy {
            coinbase_maturity: COINBASE_MATURITY,
            min_confirmations: MIN_CONFIRMATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub network: NetworkSelection,
    pub zero_conf_file: Option<PathBuf>,
    pub blk_file: Option<PathBuf>,
    pub coinbase_maturity: u32,
    pub min_confirmations: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            network: NetworkSelection::default(),
            zero_conf_file: None,
            blk_file: None,
            coinbase_maturity: COINBASE_MATURITY,
            min_confirmations: MIN_CONFIRMATIONS,
        }
    }
}

impl LedgerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| LedgerError::io(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn network_params(&self) -> Result<NetworkParams> {
        self.network.resolve()
    }

    pub fn spend_policy(&self) -> SpendPolicy {
        SpendPolicy {
            coinbase_maturity: self.coinbase_maturity,
            min_confirmations: self.min_confirmations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = LedgerConfig::from_json_str("{}").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.spend_policy(), SpendPolicy::default());
        assert_eq!(config.network_params().unwrap(), NetworkParams::main());
    }

    #[test]
    fn test_named_and_explicit_networks() {
        let config = LedgerConfig::from_json_str(
            r#"{"network": "Test", "zero_conf_file": "zc.bin", "coinbase_maturity": 100}"#,
        )
        .unwrap();
        assert_eq!(config.network_params().unwrap(), NetworkParams::test());
        assert_eq!(config.zero_conf_file, Some(PathBuf::from("zc.bin")));
        assert_eq!(config.spend_policy().coinbase_maturity, 100);
        assert_eq!(config.spend_policy().min_confirmations, MIN_CONFIRMATIONS);

        let hash = "22".repeat(32);
        let json = format!(
            r#"{{"network": {{"genesis_hash": "{h}", "genesis_tx_hash": "{h}", "magic": "fabfb5da"}}}}"#,
            h = hash
        );
        let params = LedgerConfig::from_json_str(&json).unwrap().network_params().unwrap();
        assert_eq!(params.genesis_hash, [0x22; 32]);
        assert_eq!(params.magic, [0xfa, 0xbf, 0xb5, 0xda]);
    }

    #[test]
    fn test_bad_inputs() {
        assert!(matches!(
            LedgerConfig::from_json_str("{not json"),
            Err(LedgerError::Config(_))
        ));
        let config = LedgerConfig::from_json_str(r#"{"network": "Regtest"}"#).unwrap();
        assert!(matches!(
            config.network_params(),
            Err(LedgerError::UnknownNetwork(_))
        ));
        assert!(matches!(
            LedgerConfig::from_file("/nonexistent/ledger.json"),
            Err(LedgerError::Io { .. })
        ));
    }
}
