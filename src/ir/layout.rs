//! The program order of blocks and instructions, kept separate from the
//! instruction data itself.
//!
//! This mirrors Cranelift's `Layout`/`cursor` split: `PrimaryMap<Inst, ..>`
//! in `Function` owns instruction *data*, while `Layout` owns instruction
//! and block *order*, so splitting a block or moving an instruction never
//! needs to renumber anything.

use crate::ir::entities::{Block, Inst};
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct Layout {
    block_order: Vec<Block>,
    block_insts: HashMap<Block, Vec<Inst>>,
    inst_block: HashMap<Inst, Block>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_block(&mut self, block: Block) {
        self.block_order.push(block);
        self.block_insts.entry(block).or_default();
    }

    pub fn insert_block_after(&mut self, after: Block, new_block: Block) {
        let pos = self
            .block_order
            .iter()
            .position(|&b| b == after)
            .expect("block must already be in the layout");
        self.block_order.insert(pos + 1, new_block);
        self.block_insts.entry(new_block).or_default();
    }

    pub fn insert_block_before(&mut self, before: Block, new_block: Block) {
        let pos = self
            .block_order
            .iter()
            .position(|&b| b == before)
            .expect("block must already be in the layout");
        self.block_order.insert(pos, new_block);
        self.block_insts.entry(new_block).or_default();
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.block_order.iter().copied()
    }

    pub fn num_blocks(&self) -> usize {
        self.block_order.len()
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.block_order.first().copied()
    }

    pub fn block_insts(&self, block: Block) -> &[Inst] {
        self.block_insts
            .get(&block)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_block.get(&inst).copied()
    }

    pub fn first_inst(&self, block: Block) -> Option<Inst> {
        self.block_insts(block).first().copied()
    }

    pub fn last_inst(&self, block: Block) -> Option<Inst> {
        self.block_insts(block).last().copied()
    }

    pub fn append_inst(&mut self, block: Block, inst: Inst) {
        self.block_insts.entry(block).or_default().push(inst);
        self.inst_block.insert(inst, block);
    }

    pub fn insert_inst_before(&mut self, before: Inst, inst: Inst) {
        let block = self
            .inst_block(before)
            .expect("reference instruction must already be placed");
        let insts = self.block_insts.get_mut(&block).unwrap();
        let pos = insts.iter().position(|&i| i == before).unwrap();
        insts.insert(pos, inst);
        self.inst_block.insert(inst, block);
    }

    pub fn insert_inst_after(&mut self, after: Inst, inst: Inst) {
        let block = self
            .inst_block(after)
            .expect("reference instruction must already be placed");
        let insts = self.block_insts.get_mut(&block).unwrap();
        let pos = insts.iter().position(|&i| i == after).unwrap();
        insts.insert(pos + 1, inst);
        self.inst_block.insert(inst, block);
    }

    pub fn remove_inst(&mut self, inst: Inst) {
        if let Some(block) = self.inst_block.remove(&inst) {
            if let Some(insts) = self.block_insts.get_mut(&block) {
                insts.retain(|&i| i != inst);
            }
        }
    }

    /// Split `block` so that `at` becomes the first instruction of
    /// `new_block`; every instruction from `at` onward (inclusive) moves
    /// there. Returns `new_block`.
    ///
    /// `new_block` must already be placed in the layout immediately after
    /// `block` -- callers get this by allocating it with
    /// `Function::create_block_after(block)` first. This is the layout-level
    /// primitive behind `BasicBlock::splitBasicBlock` in the host framework
    /// this IR stands in for; callers are responsible for wiring up a
    /// terminator in the original block and fixing up any
    /// control-flow-graph caches.
    pub fn split_block_before(&mut self, at: Inst, new_block: Block) -> Block {
        let block = self
            .inst_block(at)
            .expect("split point must already be placed");
        let insts = self.block_insts.get_mut(&block).unwrap();
        let pos = insts.iter().position(|&i| i == at).unwrap();
        let tail: Vec<Inst> = insts.split_off(pos);
        for &inst in &tail {
            self.inst_block.insert(inst, new_block);
        }
        self.block_insts.insert(new_block, tail);
        new_block
    }
}
