//! §4.12 Static initializer emission.

use crate::discovery::FunctionFeatures;
use crate::ir::{Callee, CallConv, CursorPosition, FuncCursor, FuncId, InstructionData, Module, Signature, Type};
use crate::signatures::RuntimeSignatures;
use crate::symbols;
use cranelift_entity::EntityRef;
use std::collections::HashMap;

/// Emit `tm_static_initializer`, a no-argument void function that calls
/// `register_clone(origin, clone)` once per entry in `function_map`, and
/// append it to the module's global constructor list ahead of user
/// constructors (§6, §8 property 5).
pub fn emit_static_initializer(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    function_map: &HashMap<FuncId, FunctionFeatures>,
) -> FuncId {
    let init_id = module.declare_function(
        symbols::STATIC_INITIALIZER,
        Signature::new(CallConv::C),
        true,
    );
    let block = module.functions[init_id].create_block();

    let mut entries: Vec<(FuncId, FuncId)> = function_map
        .values()
        .filter_map(|f| f.clone.map(|clone| (f.orig, clone)))
        .collect();
    // Deterministic order: iteration order over a HashMap is not, and tests
    // checking exact call counts shouldn't depend on hash seeding.
    entries.sort_by_key(|&(orig, clone)| (orig.index(), clone.index()));

    let mut cursor = FuncCursor::new(&mut module.functions[init_id]);
    cursor.set_position(CursorPosition::After(block));
    for (orig, clone) in entries {
        let (_, orig_addr) =
            cursor.insert_with_result(InstructionData::FuncAddr { func: orig }, Some(Type::Ptr));
        let (_, clone_addr) =
            cursor.insert_with_result(InstructionData::FuncAddr { func: clone }, Some(Type::Ptr));
        cursor.insert(InstructionData::Call {
            callee: Callee::Direct(sigs.register_clone),
            args: smallvec::smallvec![orig_addr.unwrap(), clone_addr.unwrap()],
            result_ty: Type::Void,
        });
    }
    cursor.insert(InstructionData::Return { value: None });

    module.append_to_global_ctors(init_id, symbols::STATIC_INITIALIZER_PRIORITY);
    init_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CallConv as CC;

    #[test]
    fn registers_exactly_one_call_per_function_map_entry() {
        let mut module = Module::new();
        let sigs = RuntimeSignatures::materialize(&mut module);
        let a = module.declare_function("a", Signature::new(CC::C), true);
        let a_clone = module.declare_function("tm_a", Signature::new(CC::C), true);
        let b = module.declare_function("b", Signature::new(CC::C), true);

        let mut function_map = HashMap::new();
        function_map.insert(
            a,
            FunctionFeatures {
                orig: a,
                clone: Some(a_clone),
                is_lambda: false,
            },
        );
        function_map.insert(
            b,
            FunctionFeatures {
                orig: b,
                clone: Some(b),
                is_lambda: false,
            },
        );

        let init_id = emit_static_initializer(&mut module, &sigs, &function_map);

        let register_calls = module.functions[init_id]
            .all_insts()
            .into_iter()
            .filter(|&(_, i)| {
                matches!(
                    &module.functions[init_id].insts[i],
                    InstructionData::Call { callee: Callee::Direct(f), .. }
                        if *f == sigs.register_clone
                )
            })
            .count();
        assert_eq!(register_calls, 2);
        assert_eq!(
            module.constructors,
            vec![(init_id, symbols::STATIC_INITIALIZER_PRIORITY)]
        );
    }
}
