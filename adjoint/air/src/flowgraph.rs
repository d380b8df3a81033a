//! A control flow graph represented as mappings of blocks to their predecessors and successors.

use typed_index_collections::TiVec;

use crate::{Block, Function};

#[cfg(test)]
mod tests;

#[derive(Clone, Default, Debug)]
struct CFGNode {
    preds: Vec<Block>,
    succs: Vec<Block>,
}

/// The Control Flow Graph maintains a mapping of blocks to their predecessors and successors.
#[derive(Clone, Default, Debug)]
pub struct ControlFlowGraph {
    data: TiVec<Block, CFGNode>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and compute the control flow graph for `func`.
    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    /// Compute the control flow graph of `func`.
    ///
    /// This will clear and overwrite any information already stored in this data structure.
    pub fn compute(&mut self, func: &Function) {
        self.data.clear();
        self.data.resize(func.layout.num_blocks(), CFGNode::default());

        for block in func.layout.blocks() {
            if let Some(term) = func.layout.last_inst(block) {
                let mut succs = Vec::new();
                func.dfg.insts[term].visit_successors(|succ| succs.push(succ));
                for &succ in &succs {
                    self.data[succ].preds.push(block);
                }
                self.data[block].succs = succs;
            }
        }
    }

    pub fn preds(&self, block: Block) -> &[Block] {
        &self.data[block].preds
    }

    pub fn succs(&self, block: Block) -> &[Block] {
        &self.data[block].succs
    }

    /// Blocks reachable from `entry` in post-order: every block is visited after all of its
    /// successors that are not on the current DFS path.
    pub fn postorder(&self, entry: Block) -> Vec<Block> {
        let mut visited: TiVec<Block, bool> = vec![false; self.data.len()].into();
        let mut res = Vec::with_capacity(self.data.len());
        let mut stack = vec![(entry, 0)];
        visited[entry] = true;

        while let Some((block, succ_idx)) = stack.pop() {
            match self.data[block].succs.get(succ_idx) {
                Some(&succ) => {
                    stack.push((block, succ_idx + 1));
                    if !visited[succ] {
                        visited[succ] = true;
                        stack.push((succ, 0));
                    }
                }
                None => res.push(block),
            }
        }
        res
    }

    /// Whether there is a (non-empty) path from `from` to `to`.
    pub fn has_path(&self, from: Block, to: Block) -> bool {
        let mut visited: TiVec<Block, bool> = vec![false; self.data.len()].into();
        let mut stack: Vec<Block> = self.succs(from).to_vec();
        while let Some(block) = stack.pop() {
            if block == to {
                return true;
            }
            if !visited[block] {
                visited[block] = true;
                stack.extend_from_slice(self.succs(block));
            }
        }
        false
    }
}
