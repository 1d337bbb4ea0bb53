//! Hash-indexed transaction store

use crate::transaction::TxRef;
use crate::types::*;
use std::collections::HashMap;

/// Arena of transactions keyed by hash.
///
/// Ids handed out by [`TxIndex::insert`] stay valid for the life of the
/// index; headers refer to transactions only through them.
#[derive(Debug, Default, Clone)]
pub struct TxIndex {
    txs: Vec<TxRef>,
    by_hash: HashMap<Hash, usize>,
}

impl TxIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    /// Insert a transaction, first occurrence wins.
    ///
    /// Returns the id of the stored transaction and whether it was new. A
    /// repeated hash keeps the first record untouched.
    pub fn insert(&mut self, tx: TxRef) -> (usize, bool) {
        if let Some(&id) = self.by_hash.get(&tx.hash()) {
            return (id, false);
        }
        let id = self.txs.len();
        self.by_hash.insert(tx.hash(), id);
        self.txs.push(tx);
        (id, true)
    }

    pub fn id_of(&self, hash: &Hash) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn get(&self, id: usize) -> Option<&TxRef> {
        self.txs.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> Option<&mut TxRef> {
        self.txs.get_mut(id)
    }

    pub fn by_hash(&self, hash: &Hash) -> Option<&TxRef> {
        self.id_of(hash).and_then(|id| self.txs.get(id))
    }

    /// Transactions whose hash starts with `prefix`, in ingestion order
    pub fn prefix_search(&self, prefix: &[u8]) -> Vec<&TxRef> {
        self.txs
            .iter()
            .filter(|tx| tx.hash().starts_with(prefix))
            .collect()
    }
}
