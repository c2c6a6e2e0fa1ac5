//! §4.3 Discovery, legacy C-API root.

use super::DiscoverySets;
use crate::ir::{Callee, InstructionData, Module};
use crate::symbols;

/// Find every call to `tm_execute_c` in the module and, when its second
/// argument resolves to a function defined in this module, add that
/// function to the worklist. A function pointer or a cross-module
/// declaration is left to dynamic translation at the boundary instead
/// (§4.9), not discovered here.
pub fn discover_capi(module: &Module, sets: &mut DiscoverySets) {
    let Some(execute_c) = module.get_function(symbols::EXECUTE_C) else {
        return;
    };
    for func in module.functions.values() {
        if !func.is_definition() {
            continue;
        }
        for inst in func.insts.values() {
            let InstructionData::Call { callee: Callee::Direct(callee), args, .. } = inst else {
                continue;
            };
            if *callee != execute_c {
                continue;
            }
            let Some(&target_value) = args.get(1) else {
                continue;
            };
            if let Some(target_fn) = resolve_function_value(func, target_value) {
                if module.functions[target_fn].is_definition() {
                    sets.worklist.push_back(target_fn);
                }
            }
        }
    }
}

/// Resolve a value used as a call argument back to the function whose
/// address it carries, when it was produced by a `func_addr` instruction in
/// the same function. A value with no recorded producer (a block parameter,
/// an indirect load) is a function pointer we cannot statically resolve,
/// and is left for boundary instrumentation's dynamic-translation fallback.
fn resolve_function_value(
    func: &crate::ir::Function,
    value: crate::ir::Value,
) -> Option<crate::ir::FuncId> {
    let inst = func.producer(value)?;
    match &func.insts[inst] {
        InstructionData::FuncAddr { func } => Some(*func),
        _ => None,
    }
}
