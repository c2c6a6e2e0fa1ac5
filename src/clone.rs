//! §4.5 Cloning.
//!
//! For every reachable origin that isn't already its own clone (pure) and
//! wasn't already paired with a hand-written one (`tm_rename_<name>`), make
//! a deep copy of its body under a new name and remember the mapping. Body
//! instrumentation (§4.6) runs on the clone, never on the origin: the
//! origin keeps running uninstrumented for callers outside any
//! transactional region.

use crate::discovery::DiscoverySets;
use crate::ir::{Block, Function, FuncId, Inst, InstructionData, Module, Value};
use crate::symbols;
use std::collections::HashMap;

/// Deep-copy every origin function that still needs one, and record the new
/// `FuncId` on its `FunctionFeatures`.
///
/// # Design note (§9)
/// The clone's name is `tm_` concatenated *textually* onto the origin's
/// name, whatever that name already is -- including an already-mangled C++
/// name like `_Z18foov`. The result, `tm__Z18foov`, is not itself a valid
/// mangling of anything; the runtime only ever looks the pair up by exact
/// string match via `register_clone` (§4.12), so this never needs to round
/// trip through a demangler.
pub fn create_clones(module: &mut Module, sets: &mut DiscoverySets) {
    let to_clone: Vec<FuncId> = sets
        .functions
        .values()
        .filter(|f| f.clone.is_none())
        .map(|f| f.orig)
        .collect();

    for orig_id in to_clone {
        if !module.functions[orig_id].is_definition() {
            // A declaration reachable only through an indirect or
            // cross-module edge has no body to clone; boundary
            // instrumentation falls back to dynamic translation for it.
            continue;
        }
        if module.functions[orig_id].name.starts_with(symbols::CLONE_PREFIX) {
            // Re-running the pass over its own output (§8 property 7): a
            // function whose name already carries the reserved prefix is
            // itself a clone, never a fresh origin, so it must never be
            // cloned again.
            continue;
        }
        let clone_name = format!("{}{}", symbols::CLONE_PREFIX, module.functions[orig_id].name);
        let clone_id = if let Some(existing) = module.get_function(&clone_name) {
            // Same reason: a clone from an earlier run of the pass is
            // already sitting under this name: reuse it instead of
            // duplicating blocks into it a second time.
            existing
        } else {
            deep_copy(module, orig_id, clone_name)
        };
        sets.functions.get_mut(&orig_id).unwrap().clone = Some(clone_id);
    }
}

/// Copy `orig`'s signature, attributes, and full instruction graph into a
/// freshly declared function named `new_name`, remapping every block,
/// instruction, and value reference along the way. Mirrors `CloneFunction`
/// from the host framework's cloning utilities, minus the argument
/// remapping this pass never needs (clones never change arity).
fn deep_copy(module: &mut Module, orig: FuncId, new_name: String) -> FuncId {
    let signature = module.functions[orig].signature.clone();
    let clone_id = module.declare_function(&new_name, signature, true);
    module.functions[clone_id].attrs = module.functions[orig].attrs.clone();

    let mut block_map: HashMap<Block, Block> = HashMap::new();
    let mut value_map: HashMap<Value, Value> = HashMap::new();

    for block in module.functions[orig].layout.blocks().collect::<Vec<_>>() {
        let new_block = module.functions[clone_id].create_block();
        block_map.insert(block, new_block);
        let old_params = module.functions[orig].blocks[block].params.clone();
        for old_param in old_params {
            let ty = module.functions[orig].value_type(old_param);
            let new_param = module.functions[clone_id].append_param(new_block, ty);
            value_map.insert(old_param, new_param);
        }
    }

    let all_insts = module.functions[orig].all_insts();
    for (old_block, old_inst) in all_insts {
        let new_block = block_map[&old_block];
        let data = module.functions[orig].insts[old_inst].clone();
        let remapped = remap_instruction(&data, &block_map, &value_map);
        let result_ty = result_type_of(&module.functions[orig], old_inst);

        let new_inst = module.functions[clone_id].insts.push(remapped);
        module.functions[clone_id].layout.append_inst(new_block, new_inst);

        if let Some(ty) = result_ty {
            if let Some(old_result) = module.functions[orig].result_of(old_inst) {
                let new_result = module.functions[clone_id].create_value(ty);
                value_map.insert(old_result, new_result);
                module.functions[clone_id].record_result(new_inst, new_result);
            }
        }
    }

    clone_id
}

pub(crate) fn result_type_of(func: &Function, inst: Inst) -> Option<crate::ir::Type> {
    match &func.insts[inst] {
        InstructionData::Load { ty, .. } => Some(*ty),
        InstructionData::AtomicRmw { ty, .. } => Some(*ty),
        InstructionData::AtomicCas { ty, .. } => Some(*ty),
        InstructionData::Call { result_ty, .. } if !matches!(result_ty, crate::ir::Type::Void) => {
            Some(*result_ty)
        }
        InstructionData::Invoke { result_ty, .. } if !matches!(result_ty, crate::ir::Type::Void) => {
            Some(*result_ty)
        }
        InstructionData::Intrinsic { result_ty, .. }
            if !matches!(result_ty, crate::ir::Type::Void) =>
        {
            Some(*result_ty)
        }
        InstructionData::Bitcast { to, .. } => Some(*to),
        InstructionData::FuncAddr { .. } => Some(crate::ir::Type::Ptr),
        _ => None,
    }
}

fn remap_instruction(
    data: &InstructionData,
    blocks: &HashMap<Block, Block>,
    values: &HashMap<Value, Value>,
) -> InstructionData {
    let v = |old: Value| -> Value { values.get(&old).copied().unwrap_or(old) };
    let b = |old: Block| -> Block { blocks.get(&old).copied().unwrap_or(old) };
    let vl = |list: &crate::ir::ValueList| -> crate::ir::ValueList {
        list.iter().map(|&x| v(x)).collect()
    };

    match data.clone() {
        InstructionData::Load { ptr, ty, flags } => InstructionData::Load {
            ptr: v(ptr),
            ty,
            flags,
        },
        InstructionData::Store { value, ptr, flags } => InstructionData::Store {
            value: v(value),
            ptr: v(ptr),
            flags,
        },
        InstructionData::AtomicRmw { ptr, value, ty, op } => InstructionData::AtomicRmw {
            ptr: v(ptr),
            value: v(value),
            ty,
            op,
        },
        InstructionData::AtomicCas {
            ptr,
            expected,
            replacement,
            ty,
        } => InstructionData::AtomicCas {
            ptr: v(ptr),
            expected: v(expected),
            replacement: v(replacement),
            ty,
        },
        InstructionData::Fence => InstructionData::Fence,
        InstructionData::Call {
            callee,
            args,
            result_ty,
        } => InstructionData::Call {
            callee: remap_callee(callee, values),
            args: vl(&args),
            result_ty,
        },
        InstructionData::Invoke {
            callee,
            args,
            result_ty,
            normal,
            unwind,
        } => InstructionData::Invoke {
            callee: remap_callee(callee, values),
            args: vl(&args),
            result_ty,
            normal: b(normal),
            unwind: b(unwind),
        },
        InstructionData::InlineAsm { args } => InstructionData::InlineAsm { args: vl(&args) },
        InstructionData::Intrinsic {
            name,
            kind,
            args,
            result_ty,
        } => InstructionData::Intrinsic {
            name,
            kind,
            args: vl(&args),
            result_ty,
        },
        InstructionData::Bitcast { value, to } => InstructionData::Bitcast { value: v(value), to },
        InstructionData::FuncAddr { func } => InstructionData::FuncAddr { func },
        InstructionData::Jump { dest } => InstructionData::Jump { dest: b(dest) },
        InstructionData::Branch {
            cond,
            then_block,
            else_block,
        } => InstructionData::Branch {
            cond: v(cond),
            then_block: b(then_block),
            else_block: b(else_block),
        },
        InstructionData::Return { value } => InstructionData::Return { value: value.map(v) },
        InstructionData::Unreachable => InstructionData::Unreachable,
        InstructionData::Phi { incoming } => InstructionData::Phi {
            incoming: incoming.into_iter().map(|(blk, val)| (b(blk), v(val))).collect(),
        },
        InstructionData::Other { opcode, args } => InstructionData::Other {
            opcode,
            args: vl(&args),
        },
        InstructionData::Unsupported { opcode } => InstructionData::Unsupported { opcode },
    }
}

fn remap_callee(callee: crate::ir::Callee, values: &HashMap<Value, Value>) -> crate::ir::Callee {
    match callee {
        crate::ir::Callee::Direct(f) => crate::ir::Callee::Direct(f),
        crate::ir::Callee::Indirect(v) => {
            crate::ir::Callee::Indirect(values.get(&v).copied().unwrap_or(v))
        }
    }
}
