//! # Chain-Ledger
//!
//! Block data management for a watch-only Bitcoin wallet.
//!
//! This crate reads a framed block stream, organizes headers into the
//! best chain by cumulative difficulty, indexes every transaction, and
//! tracks the unspent outputs and ledgers of watched addresses, including
//! unconfirmed transactions held in a zero-conf pool.
//!
//! ## Architecture
//!
//! - Header graph and best-chain selection (`chain`, `reorganization`)
//! - Transaction index over raw block data (`index`, `transaction`, `block`)
//! - Spend relations, ledgers and wallets (`txio`, `ledger`, `address`, `wallet`)
//! - Zero-conf pool with file persistence (`mempool`)
//! - Coordinator tying ingestion to wallet scanning (`manager`)
//!
//! ## Usage
//!
//! ```rust
//! use chain_ledger::{BlockDataManager, NetworkParams};
//!
//! let manager = BlockDataManager::new(NetworkParams::main());
//! let mut wallet = manager.new_wallet();
//! assert!(wallet.add_address([0x62; 20]));
//! assert_eq!(manager.top_height(), None);
//! assert_eq!(wallet.full_balance(manager.chain()), 0);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod serialize;
pub mod script;
pub mod pow;
pub mod transaction;
pub mod block;
pub mod index;
pub mod chain;
pub mod reorganization;
pub mod txio;
pub mod ledger;
pub mod address;
pub mod wallet;
pub mod mempool;
pub mod network;
pub mod config;
pub mod manager;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{LedgerError, Result};
pub use address::BtcAddress;
pub use chain::Blockchain;
pub use config::{LedgerConfig, NetworkSelection, SpendPolicy};
pub use ledger::LedgerEntry;
pub use manager::{BlockAddResult, BlockDataManager, SharedBlockDataManager};
pub use mempool::ZeroConfPool;
pub use network::NetworkParams;
pub use reorganization::ReorgReport;
pub use transaction::TxRef;
pub use txio::{TxIOPair, UnspentTxOut};
pub use wallet::{BtcWallet, TxScan};
