//! Shared builders for synthetic block streams

#![allow(dead_code)]

use chain_ledger::block::{calculate_block_hash, calculate_merkle_root, frame_block, serialize_block};
use chain_ledger::script::p2pkh_script;
use chain_ledger::transaction::{calculate_tx_hash, serialize_transaction};
use chain_ledger::*;

pub const MAGIC: [u8; 4] = [0xfa, 0xbf, 0xb5, 0xda];
pub const EASY_BITS: u32 = 0x1d00ffff;
pub const HARD_BITS: u32 = 0x1c00ffff;

pub const ALICE: Hash160 = [0xa1; 20];
pub const BOB: Hash160 = [0xb0; 20];
pub const CAROL: Hash160 = [0xc0; 20];

/// Outpoint funded by a transaction nobody watches
pub const FOREIGN_OUTPOINT: OutPoint = OutPoint { hash: [0xee; 32], index: 3 };

pub fn create_test_coinbase(tag: u32, to: Hash160, value: Amount) -> Transaction {
    let mut script_sig = vec![0x04];
    script_sig.extend_from_slice(&tag.to_le_bytes());
    Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout: OutPoint { hash: [0; 32], index: 0xffffffff },
            script_sig,
            sequence: 0xffffffff,
        }],
        outputs: vec![TransactionOutput { value, script_pubkey: p2pkh_script(&to) }],
        lock_time: 0,
    }
}

pub fn create_test_tx(inputs: &[OutPoint], outputs: &[(Hash160, Amount)]) -> Transaction {
    Transaction {
        version: 1,
        inputs: inputs
            .iter()
            .map(|prevout| TransactionInput {
                prevout: *prevout,
                script_sig: vec![0x51],
                sequence: 0xffffffff,
            })
            .collect(),
        outputs: outputs
            .iter()
            .map(|(to, value)| TransactionOutput { value: *value, script_pubkey: p2pkh_script(to) })
            .collect(),
        lock_time: 0,
    }
}

pub fn create_test_block(prev: Hash, bits: u32, tag: u32, txs: Vec<Transaction>) -> Block {
    let hashes: Vec<Hash> = txs.iter().map(calculate_tx_hash).collect();
    Block {
        header: BlockHeader {
            version: 1,
            prev_block_hash: prev,
            merkle_root: calculate_merkle_root(&hashes).unwrap_or([0; 32]),
            timestamp: 1_300_000_000 + tag,
            bits,
            nonce: tag,
        },
        transactions: txs,
    }
}

pub fn block_hash(block: &Block) -> Hash {
    calculate_block_hash(&block.header)
}

pub fn tx_hash(tx: &Transaction) -> Hash {
    calculate_tx_hash(tx)
}

pub fn raw_tx(tx: &Transaction) -> ByteString {
    serialize_transaction(tx)
}

pub fn framed(block: &Block) -> ByteString {
    frame_block(&MAGIC, &serialize_block(block))
}

pub fn framed_stream(blocks: &[Block]) -> ByteString {
    blocks.iter().flat_map(framed).collect()
}

/// Linear test chain whose genesis coinbase pays `genesis_to`
pub struct TestChain {
    pub params: NetworkParams,
    pub blocks: Vec<Block>,
}

impl TestChain {
    pub fn new(genesis_to: Hash160) -> Self {
        let genesis = create_test_block([0; 32], EASY_BITS, 0, vec![create_test_coinbase(0, genesis_to, 50)]);
        let params = NetworkParams {
            genesis_hash: block_hash(&genesis),
            genesis_tx_hash: tx_hash(&genesis.transactions[0]),
            magic: MAGIC,
        };
        TestChain { params, blocks: vec![genesis] }
    }

    pub fn tip_hash(&self) -> Hash {
        self.blocks.last().map(block_hash).unwrap_or([0; 32])
    }

    /// Append a block with a coinbase to CAROL followed by `txs`
    pub fn extend(&mut self, txs: Vec<Transaction>) -> &Block {
        self.extend_paying(CAROL, txs)
    }

    /// Append a block whose coinbase pays `miner`
    pub fn extend_paying(&mut self, miner: Hash160, txs: Vec<Transaction>) -> &Block {
        let tag = self.blocks.len() as u32;
        let mut all = vec![create_test_coinbase(tag, miner, 50)];
        all.extend(txs);
        let block = create_test_block(self.tip_hash(), EASY_BITS, tag, all);
        self.blocks.push(block);
        &self.blocks[self.blocks.len() - 1]
    }

    /// Append empty blocks until the tip is at `height`
    pub fn extend_to(&mut self, height: usize) {
        while self.blocks.len() <= height {
            self.extend(vec![]);
        }
    }

    pub fn stream(&self) -> ByteString {
        framed_stream(&self.blocks)
    }

    pub fn manager(&self) -> BlockDataManager {
        BlockDataManager::new(self.params.clone())
    }
}
