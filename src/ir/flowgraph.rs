//! A control flow graph of block successors/predecessors, computed on
//! demand from a function's terminators.
//!
//! Kept as its own type (rather than eagerly maintained inside `Function`)
//! for the same reason Cranelift keeps `ControlFlowGraph` separate: most
//! rewrites invalidate it, so it is cheaper to recompute once per pass phase
//! than to keep incrementally consistent through arbitrary edits.

use crate::ir::entities::{Block, Inst};
use crate::ir::function::Function;
use std::collections::HashMap;

#[derive(Default)]
pub struct ControlFlowGraph {
    successors: HashMap<Block, Vec<Block>>,
    predecessors: HashMap<Block, Vec<(Block, Inst)>>,
}

impl ControlFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(func: &Function) -> Self {
        let mut cfg = Self::new();
        cfg.compute(func);
        cfg
    }

    pub fn compute(&mut self, func: &Function) {
        self.successors.clear();
        self.predecessors.clear();
        for block in func.layout.blocks() {
            self.successors.entry(block).or_default();
            self.predecessors.entry(block).or_default();
        }
        for block in func.layout.blocks() {
            if let Some(term) = func.layout.last_inst(block) {
                for succ in func.insts[term].successors() {
                    self.successors.entry(block).or_default().push(succ);
                    self.predecessors
                        .entry(succ)
                        .or_default()
                        .push((block, term));
                }
            }
        }
    }

    pub fn successors(&self, block: Block) -> &[Block] {
        self.successors.get(&block).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn predecessors(&self, block: Block) -> &[(Block, Inst)] {
        self.predecessors
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
