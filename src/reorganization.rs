//! Best-chain selection, orphan detection and reorg reassessment

use crate::chain::Blockchain;
use crate::error::{LedgerError, Result};
use crate::serialize::hash_to_display_hex;
use crate::types::*;
use std::collections::HashSet;
use tracing::{info, warn};

/// Result of one organize pass
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizeOutcome {
    /// The previous top is no longer on the main chain
    pub reorg_occurred: bool,
    pub prev_top: usize,
    pub new_top: usize,
    /// Last header shared by the old and new main chains (set on reorg)
    pub branch_point: Option<usize>,
}

/// Transactions whose main-branch status changed in a reorg
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorgReport {
    /// Were main-branch, now are not
    pub invalidated: HashSet<Hash>,
    /// Invalidated plus every transaction on the new branch
    pub affected: HashSet<Hash>,
}

impl ReorgReport {
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty()
    }
}

impl Blockchain {
    /// OrganizeChain: 𝒢 × 𝔹 → 𝒢 × {reorg, no reorg}
    ///
    /// Select the best chain by cumulative difficulty:
    /// 1. On rebuild, forget every derived field and the cached top
    /// 2. Pin genesis at height 0 with difficulty sum 1 and link its coinbase
    /// 3. Resolve every header's difficulty sum by walking parent links
    /// 4. The first header with a strictly greater sum than the previous top
    ///    becomes the new top, so equal weight keeps the earlier choice
    /// 5. Walk from the new top down to the first finished header, marking
    ///    main branch, heights, child links and re-linking transactions
    /// 6. If the previous top was not met on that walk, record the branch
    ///    point and rebuild from scratch
    ///
    /// A missing genesis header or genesis transaction is an error; orphans
    /// and reorgs are reported as values.
    pub fn organize(&mut self, force_rebuild: bool) -> Result<OrganizeOutcome> {
        // 1. Forget derived state
        if force_rebuild {
            for node in self.headers.iter_mut() {
                node.difficulty_sum = None;
                node.height = 0;
                node.is_finished_calc = false;
                node.is_main_branch = false;
                node.next_hash = None;
            }
            self.top = None;
            self.headers_by_height.clear();
        }

        // 2. Pin genesis
        let genesis = self.header_id(&self.params.genesis_hash).ok_or_else(|| {
            LedgerError::MissingGenesis(hash_to_display_hex(&self.params.genesis_hash))
        })?;
        let genesis_tx = self.txs.id_of(&self.params.genesis_tx_hash).ok_or_else(|| {
            LedgerError::MissingGenesisTx(hash_to_display_hex(&self.params.genesis_tx_hash))
        })?;
        {
            let node = &mut self.headers[genesis];
            node.height = 0;
            node.difficulty = 1.0;
            node.difficulty_sum = Some(1.0);
            node.is_main_branch = true;
            node.is_orphan = false;
            node.is_finished_calc = true;
            node.tx_ids = vec![genesis_tx];
        }
        if let Some(tx) = self.txs.get_mut(genesis_tx) {
            tx.header = Some(genesis);
            tx.is_main_branch = true;
            tx.block_tx_index = 0;
        }

        let prev_top = self.top.unwrap_or(genesis);
        self.top = Some(prev_top);

        // 3-4. Resolve sums, track the heaviest header
        let mut orphaned = vec![false; self.headers.len()];
        let mut orphan_roots = Vec::new();
        let mut max_sum = self.headers[prev_top].difficulty_sum.unwrap_or(0.0);
        let mut new_top = prev_top;
        for id in 0..self.headers.len() {
            let sum = self.trace_chain_down(id, &mut orphaned, &mut orphan_roots);
            if sum > max_sum {
                max_sum = sum;
                new_top = id;
            }
        }
        self.orphan_chain_roots = orphan_roots;
        self.top = Some(new_top);

        // 5. Walk down the winning chain
        let mut prev_chain_still_valid = new_top == prev_top;
        self.headers[new_top].next_hash = None;
        let top_height = self.headers[new_top].height as usize;
        self.headers_by_height.resize(top_height + 1, genesis);

        let mut cur = new_top;
        while !self.headers[cur].is_finished_calc {
            self.mark_main_branch(cur);

            let child_hash = self.headers[cur].hash;
            let parent = match self.header_id(&self.headers[cur].prev_hash()) {
                Some(parent) => parent,
                None => break,
            };
            self.headers[parent].next_hash = Some(child_hash);
            cur = parent;

            if cur == prev_top {
                prev_chain_still_valid = true;
            }
        }
        self.headers[cur].is_main_branch = true;
        let cur_height = self.headers[cur].height as usize;
        if let Some(slot) = self.headers_by_height.get_mut(cur_height) {
            *slot = cur;
        }

        // 6. Reorg: rebuild everything from scratch
        if !prev_chain_still_valid {
            info!(
                prev_top = %hash_to_display_hex(&self.headers[prev_top].hash),
                new_top = %hash_to_display_hex(&self.headers[new_top].hash),
                branch_point = %hash_to_display_hex(&self.headers[cur].hash),
                "chain reorganization detected"
            );
            let rebuilt = self.organize(true)?;
            return Ok(OrganizeOutcome {
                reorg_occurred: true,
                prev_top,
                new_top: rebuilt.new_top,
                branch_point: Some(cur),
            });
        }

        info!(
            height = self.headers[new_top].height,
            top = %hash_to_display_hex(&self.headers[new_top].hash),
            "chain organized"
        );
        Ok(OrganizeOutcome {
            reorg_occurred: false,
            prev_top,
            new_top,
            branch_point: None,
        })
    }

    /// ReassessAfterReorg: 𝒢 × ℋ × ℋ × ℋ → 𝒯𝒳* × 𝒯𝒳*
    ///
    /// 1. Walk old top → branch point: detach every transaction, add it to
    ///    invalidated and affected
    /// 2. Walk new top → branch point: re-attach every transaction, drop it
    ///    from invalidated, add it to affected
    ///
    /// A transaction present on both branches ends up valid.
    pub fn reassess_after_reorg(
        &mut self,
        old_top: usize,
        new_top: usize,
        branch_point: usize,
    ) -> ReorgReport {
        let mut report = ReorgReport::default();

        let mut cur = Some(old_top);
        while let Some(id) = cur.filter(|&id| id != branch_point) {
            self.previously_valid.push(id);
            for tx_id in self.headers[id].tx_ids.clone() {
                if let Some(tx) = self.txs.get_mut(tx_id) {
                    tx.header = None;
                    tx.is_main_branch = false;
                    report.invalidated.insert(tx.hash());
                    report.affected.insert(tx.hash());
                }
            }
            cur = self.header_id(&self.headers[id].prev_hash());
        }

        let mut cur = Some(new_top);
        while let Some(id) = cur.filter(|&id| id != branch_point) {
            for (pos, tx_id) in self.headers[id].tx_ids.clone().into_iter().enumerate() {
                if let Some(tx) = self.txs.get_mut(tx_id) {
                    tx.header = Some(id);
                    tx.is_main_branch = true;
                    tx.block_tx_index = pos as u32;
                    report.invalidated.remove(&tx.hash());
                    report.affected.insert(tx.hash());
                }
            }
            cur = self.header_id(&self.headers[id].prev_hash());
        }

        info!(
            invalidated = report.invalidated.len(),
            affected = report.affected.len(),
            "reassessed transactions after reorg"
        );
        report
    }

    fn mark_main_branch(&mut self, id: usize) {
        let node = &mut self.headers[id];
        node.is_finished_calc = true;
        node.is_main_branch = true;
        node.is_orphan = false;
        let height = node.height as usize;
        let tx_ids = node.tx_ids.clone();
        if let Some(slot) = self.headers_by_height.get_mut(height) {
            *slot = id;
        }

        // Transactions may still point at a header from a losing branch
        for (pos, tx_id) in tx_ids.into_iter().enumerate() {
            if let Some(tx) = self.txs.get_mut(tx_id) {
                tx.header = Some(id);
                tx.is_main_branch = true;
                tx.block_tx_index = pos as u32;
            }
        }
    }

    /// Resolve the cumulative difficulty of `start`.
    ///
    /// Walks parent links until a header with a known sum, then fills sums
    /// and heights back up the walked run. A missing parent makes the whole
    /// run an orphan chain worth 0.
    fn trace_chain_down(
        &mut self,
        start: usize,
        orphaned: &mut [bool],
        orphan_roots: &mut Vec<usize>,
    ) -> f64 {
        if let Some(sum) = self.headers[start].difficulty_sum {
            return sum;
        }

        let mut stack = Vec::new();
        let mut cur = start;
        while self.headers[cur].difficulty_sum.is_none() {
            if orphaned[cur] || stack.len() > self.headers.len() {
                self.mark_orphan_chain(&stack, orphaned, None);
                return 0.0;
            }
            stack.push(cur);
            match self.header_id(&self.headers[cur].prev_hash()) {
                Some(parent) => cur = parent,
                None => {
                    self.mark_orphan_chain(&stack, orphaned, Some(&mut *orphan_roots));
                    return 0.0;
                }
            }
        }

        let mut sum = self.headers[cur].difficulty_sum.unwrap_or(0.0);
        let mut height = self.headers[cur].height;
        for &id in stack.iter().rev() {
            let node = &mut self.headers[id];
            sum += node.difficulty;
            height += 1;
            node.difficulty_sum = Some(sum);
            node.height = height;
            node.is_orphan = false;
        }
        sum
    }

    /// Flag a parentless run of headers as orphans.
    ///
    /// The last header of `run` is the one whose parent is missing and is
    /// recorded as a chain root when `roots` is given.
    fn mark_orphan_chain(
        &mut self,
        run: &[usize],
        orphaned: &mut [bool],
        roots: Option<&mut Vec<usize>>,
    ) {
        for &id in run {
            let node = &mut self.headers[id];
            if node.is_main_branch {
                warn!(
                    hash = %hash_to_display_hex(&node.hash),
                    "header previously on main branch is now an orphan"
                );
                self.previously_valid.push(id);
            }
            node.is_orphan = true;
            node.is_main_branch = false;
            orphaned[id] = true;
        }

        if let (Some(roots), Some(&root)) = (roots, run.last()) {
            if !roots.contains(&root) {
                warn!(
                    root = %hash_to_display_hex(&self.headers[root].hash),
                    missing_parent = %hash_to_display_hex(&self.headers[root].prev_hash()),
                    length = run.len(),
                    "orphan chain detected"
                );
                roots.push(root);
            }
        }
    }
}
