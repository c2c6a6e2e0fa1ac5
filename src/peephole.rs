//! §4.11 Peephole: dominated serialization markers.
//!
//! Only intra-block redundancy is removed: a call to the serialization
//! marker that is preceded, in the same block, by another call to the same
//! marker is pure overhead (the transaction is already irrevocable), and is
//! deleted.

use crate::ir::{Callee, FuncId, InstructionData, Module};
use crate::signatures::RuntimeSignatures;

pub fn optimize_unsafe(module: &mut Module, sigs: &RuntimeSignatures, func_id: FuncId) {
    let blocks: Vec<_> = module.functions[func_id].layout.blocks().collect();
    for block in blocks {
        let insts = module.functions[func_id].layout.block_insts(block).to_vec();
        let mut seen_marker = false;
        let mut to_remove = Vec::new();
        for inst in insts {
            let is_marker = matches!(
                &module.functions[func_id].insts[inst],
                InstructionData::Call { callee: Callee::Direct(f), .. } if *f == sigs.unsafe_marker
            );
            if is_marker {
                if seen_marker {
                    to_remove.push(inst);
                } else {
                    seen_marker = true;
                }
            }
        }
        for inst in to_remove {
            module.functions[func_id].layout.remove_inst(inst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, Callee, CursorPosition, FuncCursor, Signature, Type};

    #[test]
    fn five_markers_in_one_block_collapse_to_one() {
        let mut module = Module::new();
        let sigs = RuntimeSignatures::materialize(&mut module);
        let f = module.declare_function("tm_s3", Signature::new(CallConv::C), true);
        let block = module.functions[f].create_block();
        let mut cursor = FuncCursor::new(&mut module.functions[f]);
        cursor.set_position(CursorPosition::After(block));
        for _ in 0..5 {
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(sigs.unsafe_marker),
                args: Default::default(),
                result_ty: Type::Void,
            });
        }
        cursor.insert(InstructionData::Return { value: None });

        optimize_unsafe(&mut module, &sigs, f);

        let remaining = module.functions[f]
            .layout
            .block_insts(block)
            .iter()
            .filter(|&&i| {
                matches!(
                    &module.functions[f].insts[i],
                    InstructionData::Call { callee: Callee::Direct(g), .. } if *g == sigs.unsafe_marker
                )
            })
            .count();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn markers_in_different_blocks_are_independent() {
        let mut module = Module::new();
        let sigs = RuntimeSignatures::materialize(&mut module);
        let f = module.declare_function("tm_multi_block", Signature::new(CallConv::C), true);
        let b1 = module.functions[f].create_block();
        let b2 = module.functions[f].create_block_after(b1);
        {
            let mut cursor = FuncCursor::new(&mut module.functions[f]);
            cursor.set_position(CursorPosition::After(b1));
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(sigs.unsafe_marker),
                args: Default::default(),
                result_ty: Type::Void,
            });
            cursor.insert(InstructionData::Jump { dest: b2 });
        }
        {
            let mut cursor = FuncCursor::new(&mut module.functions[f]);
            cursor.set_position(CursorPosition::After(b2));
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(sigs.unsafe_marker),
                args: Default::default(),
                result_ty: Type::Void,
            });
            cursor.insert(InstructionData::Return { value: None });
        }

        optimize_unsafe(&mut module, &sigs, f);

        assert_eq!(module.functions[f].layout.block_insts(b1).len(), 2);
        assert_eq!(module.functions[f].layout.block_insts(b2).len(), 2);
    }
}
