//! Reading and incrementally updating a block file on disk

mod common;

use chain_ledger::*;
use common::*;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

fn append(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn test_read_blk_file_from_scratch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blk0001.dat");
    let mut chain = TestChain::new(ALICE);
    chain.extend(vec![]);
    fs::write(&path, chain.stream()).unwrap();

    let mut manager = chain.manager();
    let wallet = {
        let mut w = manager.new_wallet();
        w.add_address(ALICE);
        w
    };
    assert_eq!(manager.read_blk_file_from_scratch(&path, &[&wallet]).unwrap(), 2);
    assert_eq!(manager.blk_file_path(), Some(path.as_path()));
    assert_eq!(manager.top_height(), Some(1));
    assert_eq!(manager.addr_last_filtered_block(&ALICE), 1);

    // Same file again is a no-op
    assert_eq!(manager.read_blk_file_from_scratch(&path, &[&wallet]).unwrap(), 0);
    assert_eq!(manager.chain().num_headers(), 2);
}

#[test]
fn test_read_missing_blk_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let chain = TestChain::new(ALICE);
    let mut manager = chain.manager();
    let result = manager.read_blk_file_from_scratch(dir.path().join("missing.dat"), &[]);
    assert!(matches!(result, Err(LedgerError::Io { .. })));
    assert!(manager.blk_file_path().is_none());
}

#[test]
fn test_blk_file_update_waits_for_complete_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blk0001.dat");
    let mut chain = TestChain::new(CAROL);
    let fund = create_test_tx(&[FOREIGN_OUTPOINT], &[(ALICE, 11)]);
    chain.extend(vec![]);
    chain.extend(vec![fund.clone()]);
    chain.extend(vec![]);
    fs::write(&path, framed_stream(&chain.blocks[..2])).unwrap();

    let mut manager = chain.manager();
    let mut wallet = manager.new_wallet();
    wallet.add_address(ALICE);
    manager.read_blk_file_from_scratch(&path, &[&wallet]).unwrap();
    assert_eq!(manager.read_blk_file_update().unwrap(), 0);

    // One whole block plus half of the next
    let b3 = framed(&chain.blocks[3]);
    let (head, tail) = b3.split_at(b3.len() / 2);
    append(&path, &framed(&chain.blocks[2]));
    append(&path, head);
    assert_eq!(manager.read_blk_file_update().unwrap(), 1);
    assert_eq!(manager.top_height(), Some(2));

    append(&path, tail);
    assert_eq!(manager.read_blk_file_update().unwrap(), 1);
    assert_eq!(manager.top_height(), Some(3));
    assert!(manager.verify_integrity().is_empty());

    // Blocks past the filtered height come from the raw scan
    manager.scan_blockchain_for_tx(&mut wallet, 0, u32::MAX);
    assert_eq!(wallet.ledger(None).len(), 1);
    assert_eq!(wallet.ledger(None)[0].block_height, Some(2));
    assert_eq!(wallet.full_balance(manager.chain()), 11);
    assert_eq!(wallet.spendable_balance(3, manager.chain()), 11);
    // Two confirmations is below the confirmation threshold
    assert_eq!(wallet.unconfirmed_balance(3, manager.chain()), 11);
}

#[test]
fn test_configured_blk_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blk0001.dat");
    let mut chain = TestChain::new(ALICE);
    chain.extend(vec![]);
    chain.extend(vec![]);
    fs::write(&path, chain.stream()).unwrap();

    let config = LedgerConfig {
        network: NetworkSelection::Explicit {
            genesis_hash: hex::encode(chain.params.genesis_hash),
            genesis_tx_hash: hex::encode(chain.params.genesis_tx_hash),
            magic: hex::encode(chain.params.magic),
        },
        blk_file: Some(path.clone()),
        ..LedgerConfig::default()
    };
    let mut manager = BlockDataManager::from_config(&config).unwrap();
    assert_eq!(manager.configured_blk_file(), Some(path.as_path()));
    assert!(manager.blk_file_path().is_none());

    let mut wallet = manager.new_wallet();
    wallet.add_address(ALICE);
    assert_eq!(manager.read_configured_blk_file(&[&wallet]).unwrap(), 3);
    assert_eq!(manager.blk_file_path(), Some(path.as_path()));
    assert_eq!(manager.top_height(), Some(2));
    assert_eq!(manager.read_configured_blk_file(&[&wallet]).unwrap(), 0);

    manager.scan_blockchain_for_tx(&mut wallet, 0, u32::MAX);
    assert_eq!(wallet.ledger(None).len(), 1);
    assert_eq!(wallet.ledger(None)[0].block_height, Some(0));
}
