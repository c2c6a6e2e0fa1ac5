//! §4.4 Reachability closure.
//!
//! Drains the shared worklist to a fixed point, recording one
//! `FunctionFeatures` entry per *origin* function and following every direct
//! call reachable from a definition. Indirect calls are not expanded here:
//! an indirect callee cannot be a discovery root, it can only ever be a
//! dynamic-translation site at body-instrumentation time (§4.6).

use super::{DiscoverySets, FunctionFeatures};
use crate::ir::{Callee, InstructionData, Module};
use std::collections::{HashMap, HashSet};

pub fn close_reachable(module: &Module, sets: &mut DiscoverySets) {
    let rename_origin_of_clone: HashMap<_, _> = sets
        .rename_pairs
        .iter()
        .map(|&(clone, orig)| (clone, orig))
        .collect();
    let mut visited: HashSet<_> = HashSet::new();

    while let Some(fn_id) = sets.worklist.pop_front() {
        if !visited.insert(fn_id) {
            continue;
        }

        let is_lambda = sets.lambdas.contains(&fn_id);
        if let Some(&orig) = rename_origin_of_clone.get(&fn_id) {
            sets.functions.entry(orig).or_insert(FunctionFeatures {
                orig,
                clone: Some(fn_id),
                is_lambda,
            });
        } else {
            let clone = sets.pure.contains(&fn_id).then_some(fn_id);
            sets.functions.entry(fn_id).or_insert(FunctionFeatures {
                orig: fn_id,
                clone,
                is_lambda,
            });
        }

        let func = &module.functions[fn_id];
        if !func.is_definition() {
            continue;
        }
        for (_block, inst) in func.all_insts() {
            let callee = match &func.insts[inst] {
                InstructionData::Call { callee, .. } => Some(callee),
                InstructionData::Invoke { callee, .. } => Some(callee),
                _ => None,
            };
            if let Some(Callee::Direct(callee_id)) = callee {
                if module.functions[*callee_id].is_definition() {
                    sets.worklist.push_back(*callee_id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, CursorPosition, FuncCursor, Signature, Type};

    #[test]
    fn walks_direct_calls_to_a_fixed_point() {
        let mut module = Module::new();
        let leaf = module.declare_function("leaf", Signature::new(CallConv::C), true);
        let mid = module.declare_function("mid", Signature::new(CallConv::C), true);
        let root = module.declare_function("root", Signature::new(CallConv::C), true);

        for (caller, callee) in [(mid, leaf), (root, mid)] {
            let block = module.functions[caller].create_block();
            let mut cursor = FuncCursor::new(&mut module.functions[caller]);
            cursor.set_position(CursorPosition::After(block));
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(callee),
                args: Default::default(),
                result_ty: Type::Void,
            });
        }

        let mut sets = DiscoverySets::default();
        sets.worklist.push_back(root);
        close_reachable(&module, &mut sets);

        assert!(sets.functions.contains_key(&root));
        assert!(sets.functions.contains_key(&mid));
        assert!(sets.functions.contains_key(&leaf));
    }

    #[test]
    fn pure_functions_are_their_own_clone() {
        let mut module = Module::new();
        let pure_fn = module.declare_function("allocator_hook", Signature::new(CallConv::C), true);
        let mut sets = DiscoverySets::default();
        sets.pure.insert(pure_fn);
        sets.worklist.push_back(pure_fn);
        close_reachable(&module, &mut sets);
        assert_eq!(sets.functions[&pure_fn].clone, Some(pure_fn));
    }

    #[test]
    fn renamed_clone_is_keyed_by_its_original() {
        let mut module = Module::new();
        let orig = module.declare_function("widget_update", Signature::new(CallConv::C), true);
        let clone = module.declare_function("tm_widget_update", Signature::new(CallConv::C), true);
        let mut sets = DiscoverySets::default();
        sets.rename_pairs.push((clone, orig));
        sets.worklist.push_back(clone);
        close_reachable(&module, &mut sets);
        assert_eq!(sets.functions[&orig].clone, Some(clone));
        assert!(!sets.functions.contains_key(&clone));
    }

    #[test]
    fn declarations_contribute_no_further_calls() {
        let mut module = Module::new();
        let extern_fn = module.declare_function("libc_thing", Signature::new(CallConv::C), false);
        let mut sets = DiscoverySets::default();
        sets.worklist.push_back(extern_fn);
        close_reachable(&module, &mut sets);
        assert!(sets.functions.contains_key(&extern_fn));
    }
}
