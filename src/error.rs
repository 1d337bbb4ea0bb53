//! Error types for block ingestion, chain organization and wallet tracking

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    #[error("Block framing invalid: declared {declared} bytes, {remaining} remaining")]
    BlockFraming { declared: usize, remaining: usize },

    #[error("Genesis block {0} is not in the header graph")]
    MissingGenesis(String),

    #[error("Genesis transaction {0} is not in the transaction index")]
    MissingGenesisTx(String),

    #[error("Unrecognized network name: {0}")]
    UnknownNetwork(String),

    #[error("Invalid network parameter: {0}")]
    NetworkParams(String),

    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("No block file has been loaded")]
    NoBlockFile,

    #[error("Block data manager lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
