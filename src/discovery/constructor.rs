//! §4.3 Discovery, annotated-constructor root.

use super::DiscoverySets;
use crate::ir::{Callee, InstructionData, Module};
use crate::symbols;

/// Find every call to the constructor marker and add its enclosing function
/// to the worklist, then erase the marker call: it has served its purpose
/// once the enclosing function is known to be a constructor root, and
/// leaving it in place would trip the body instrumentor's "unsupported
/// instruction" check on a later pass.
pub fn discover_constructors(module: &mut Module, sets: &mut DiscoverySets) {
    let Some(marker) = module.get_function(symbols::TM_CTOR_MARKER) else {
        return;
    };

    let mut marker_insts = Vec::new();
    for (func_id, func) in module.functions.iter() {
        if !func.is_definition() {
            continue;
        }
        for (_block, inst) in func.all_insts() {
            if let InstructionData::Call {
                callee: Callee::Direct(callee),
                ..
            } = &func.insts[inst]
            {
                if *callee == marker {
                    marker_insts.push((func_id, inst));
                }
            }
        }
    }

    for (func_id, inst) in &marker_insts {
        sets.worklist.push_back(*func_id);
        module.functions[*func_id].attrs.tm_ctor = true;
    }
    for (func_id, inst) in marker_insts {
        module.functions[func_id].layout.remove_inst(inst);
    }
}
