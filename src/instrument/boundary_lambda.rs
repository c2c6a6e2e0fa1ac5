//! §4.10 Boundary instrumentation for the lambda API.

use crate::discovery::FunctionFeatures;
use crate::ir::{
    Block, Callee, CursorPosition, FuncCursor, FuncId, Function, InstructionData, Module, Type,
    Value,
};
use crate::symbols;
use std::collections::{HashMap, HashSet};

/// For every recognized lambda with a known clone, prepend a guard: test
/// the sentinel-pointer argument against null, and branch to a tail call
/// into the clone (when the runtime is driving this lambda transactionally)
/// or straight into the original entry block (when ordinary host code is
/// calling it) otherwise.
///
/// A lambda whose sentinel parameter cannot be found, or that has no known
/// clone, is left untouched -- per the open design question in §9, this is
/// a silent no-op rather than a serialization fallback.
pub fn convert_lambdas_cxx_api(
    module: &mut Module,
    lambdas: &HashSet<FuncId>,
    function_map: &HashMap<FuncId, FunctionFeatures>,
) {
    let targets: Vec<(FuncId, FuncId)> = lambdas
        .iter()
        .filter_map(|&f| {
            function_map
                .get(&f)
                .and_then(|features| features.clone)
                .map(|clone_id| (f, clone_id))
        })
        .collect();

    for (f, clone_id) in targets {
        guard_one(module, f, clone_id);
    }
}

fn guard_one(module: &mut Module, f: FuncId, clone_id: FuncId) {
    let Some(old_entry) = module.functions[f].entry_block() else {
        return;
    };
    let Some(sentinel) = find_sentinel_param(&module.functions[f], old_entry) else {
        return;
    };
    let params = module.functions[f].blocks[old_entry].params.clone();

    let guard_block = module.functions[f].create_block_before(old_entry);
    let call_block = module.functions[f].create_block_after(guard_block);

    let func = &mut module.functions[f];
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::After(guard_block));
    let (_, cond) = cursor.insert_with_result(
        InstructionData::Other {
            opcode: "icmp_ne_null".to_string(),
            args: smallvec::smallvec![sentinel],
        },
        Some(Type::I8),
    );
    cursor.insert(InstructionData::Branch {
        cond: cond.unwrap(),
        then_block: call_block,
        else_block: old_entry,
    });

    cursor.set_position(CursorPosition::After(call_block));
    cursor.insert(InstructionData::Call {
        callee: Callee::Direct(clone_id),
        args: params.into_iter().collect(),
        result_ty: Type::Void,
    });
    cursor.insert(InstructionData::Return { value: None });
}

fn find_sentinel_param(func: &Function, entry: Block) -> Option<Value> {
    func.blocks[entry].params.iter().copied().find(|&v| {
        matches!(func.value_type(v), Type::Other(name) if name == symbols::OPAQUE_TYPE_NAME)
    })
}
