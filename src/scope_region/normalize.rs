//! §4.7 normalization: split blocks so every scope-begin is the last
//! non-terminator instruction of a block whose terminator is a plain jump,
//! and every scope-end is the first instruction of its block.

use crate::ir::{Callee, CursorPosition, FuncCursor, FuncId, Function, Inst, InstructionData};

pub fn normalize_scope_boundaries(func: &mut Function, scope_begin: FuncId, scope_end: FuncId) {
    let begins = calls_to(func, scope_begin);
    for inst in begins {
        let block = func.layout.inst_block(inst).expect("instruction must be placed");
        split_before_terminator(func, block, inst);
    }

    let ends = calls_to(func, scope_end);
    for inst in ends {
        let block = func.layout.inst_block(inst).expect("instruction must be placed");
        split_at_target(func, block, inst);
    }
}

fn calls_to(func: &Function, target: FuncId) -> Vec<Inst> {
    func.all_insts()
        .into_iter()
        .filter(|&(_, inst)| {
            matches!(
                &func.insts[inst],
                InstructionData::Call { callee: Callee::Direct(f), .. } if *f == target
            )
        })
        .map(|(_, inst)| inst)
        .collect()
}

/// Ensure `target` is followed by exactly one instruction, a `Jump`. If it
/// isn't, split so everything after `target` moves to a new block and
/// `target`'s block gets a freshly appended `Jump` to it.
fn split_before_terminator(func: &mut Function, block: crate::ir::Block, target: Inst) {
    let insts = func.layout.block_insts(block).to_vec();
    let pos = insts.iter().position(|&i| i == target).expect("target must be in its own block");
    let after = &insts[pos + 1..];
    if after.len() == 1 && matches!(func.insts[after[0]], InstructionData::Jump { .. }) {
        return;
    }
    let split_at = after[0];
    let new_block = func.create_block_after(block);
    func.layout.split_block_before(split_at, new_block);
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::After(block));
    cursor.insert(InstructionData::Jump { dest: new_block });
}

/// Ensure `target` is the first instruction of its block. If it isn't,
/// split so `target` (and everything after it) starts a new block, and the
/// original block gets a freshly appended `Jump` to it.
fn split_at_target(func: &mut Function, block: crate::ir::Block, target: Inst) {
    if func.layout.first_inst(block) == Some(target) {
        return;
    }
    let new_block = func.create_block_after(block);
    func.layout.split_block_before(target, new_block);
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::After(block));
    cursor.insert(InstructionData::Jump { dest: new_block });
}
