//! §4.9 Boundary instrumentation for the legacy C API.

use crate::discovery::FunctionFeatures;
use crate::ir::{Callee, CursorPosition, FuncCursor, FuncId, InstructionData, Module, Type};
use crate::signatures::RuntimeSignatures;
use crate::symbols;
use std::collections::HashMap;

/// Retarget every call to `tm_execute_c` whose second argument resolves to a
/// function with a known clone onto the four-argument internal entry point,
/// appending the clone's address as the fourth argument. A call whose
/// target has no known clone is left alone; the runtime's own dynamic
/// lookup handles it at the call site that invokes the original function.
pub fn convert_region_begin_c_api(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    function_map: &HashMap<FuncId, FunctionFeatures>,
) {
    let Some(execute_c) = module.get_function(symbols::EXECUTE_C) else {
        return;
    };

    let candidates: Vec<FuncId> = module
        .functions
        .keys()
        .filter(|&id| module.functions[id].is_definition())
        .collect();

    for func_id in candidates {
        let sites = module.functions[func_id].all_insts();
        for (_block, inst) in sites {
            let data = module.functions[func_id].insts[inst].clone();
            match data {
                InstructionData::Call {
                    callee: Callee::Direct(callee),
                    args,
                    ..
                } if callee == execute_c => {
                    if let Some(target) = resolve_target(&module.functions[func_id], &args) {
                        if let Some(clone_id) =
                            function_map.get(&target).and_then(|f| f.clone)
                        {
                            let mut new_args = args.clone();
                            let clone_addr =
                                emit_func_addr(module, func_id, inst, clone_id);
                            new_args.push(clone_addr);
                            module.functions[func_id].insts[inst] = InstructionData::Call {
                                callee: Callee::Direct(sigs.execute_c_internal),
                                args: new_args,
                                result_ty: Type::Void,
                            };
                        }
                    }
                }
                InstructionData::Invoke {
                    callee: Callee::Direct(callee),
                    args,
                    normal,
                    unwind,
                    ..
                } if callee == execute_c => {
                    if let Some(target) = resolve_target(&module.functions[func_id], &args) {
                        if let Some(clone_id) =
                            function_map.get(&target).and_then(|f| f.clone)
                        {
                            let mut new_args = args.clone();
                            let clone_addr =
                                emit_func_addr(module, func_id, inst, clone_id);
                            new_args.push(clone_addr);
                            module.functions[func_id].insts[inst] = InstructionData::Invoke {
                                callee: Callee::Direct(sigs.execute_c_internal),
                                args: new_args,
                                result_ty: Type::Void,
                                normal,
                                unwind,
                            };
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn resolve_target(
    func: &crate::ir::Function,
    args: &crate::ir::ValueList,
) -> Option<FuncId> {
    let &second = args.get(1)?;
    let producer = func.producer(second)?;
    match &func.insts[producer] {
        InstructionData::FuncAddr { func } => Some(*func),
        _ => None,
    }
}

fn emit_func_addr(
    module: &mut Module,
    func_id: FuncId,
    before: crate::ir::Inst,
    target: FuncId,
) -> crate::ir::Value {
    let func = &mut module.functions[func_id];
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::At(before));
    let (_, addr) =
        cursor.insert_with_result(InstructionData::FuncAddr { func: target }, Some(Type::Ptr));
    addr.unwrap()
}
