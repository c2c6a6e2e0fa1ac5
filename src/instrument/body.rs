//! §4.6 Body instrumentation.
//!
//! Runs once per freshly cloned function, rewriting in place: every
//! instruction keeps its `Inst` identity (and, when it defines one, its
//! `Value` identity) even when its `InstructionData` is replaced, so no
//! other instruction's operands ever need to be patched up. This is the
//! entity-reference design paying for itself -- see `crate::ir`'s module
//! doc comment.

use crate::config::Config;
use crate::discovery::FunctionFeatures;
use crate::error::{PassError, PassResult};
use crate::ir::{
    Callee, CursorPosition, FuncCursor, FuncId, Inst, InstructionData, Module, Type, Value,
};
use crate::signatures::RuntimeSignatures;
use crate::symbols;
use std::collections::{HashMap, HashSet};

/// Instrument every instruction in `clone_id`'s body per the table in §4.6.
/// `pure_set` and `function_map` are read-only: discovery and closure have
/// already finished populating them by the time any clone is instrumented.
/// `skip` holds instructions the scope-region diamond rewrite (§4.8) has
/// already produced and instrumented itself -- the "instrumented" copy of a
/// split memory access or call is routed through `instrument_one` directly
/// by `crate::scope_region::rewrite_scope_regions`, so running the generic
/// sweep over it again here would double-instrument it.
pub fn instrument_clone(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    config: &Config,
    pure_set: &HashSet<FuncId>,
    function_map: &HashMap<FuncId, FunctionFeatures>,
    clone_id: FuncId,
    skip: &HashSet<Inst>,
) -> PassResult<()> {
    let function_name = module.functions[clone_id].name.clone();
    let insts = module.functions[clone_id].all_insts();
    for (_block, inst) in insts {
        if skip.contains(&inst) {
            continue;
        }
        instrument_one(
            module,
            sigs,
            config,
            pure_set,
            function_map,
            clone_id,
            inst,
            &function_name,
        )?;
    }
    Ok(())
}

/// The per-instruction half of §4.6, reused verbatim by the scope-region
/// diamond rewrite (§4.8) to instrument just the "instrumented" copy of a
/// split instruction -- the "uninstrumented" copy is left exactly as the
/// programmer wrote it, so it must never be passed through here.
pub(crate) fn instrument_one(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    config: &Config,
    pure_set: &HashSet<FuncId>,
    function_map: &HashMap<FuncId, FunctionFeatures>,
    clone_id: FuncId,
    inst: Inst,
    function_name: &str,
) -> PassResult<()> {
    let data = module.functions[clone_id].insts[inst].clone();
    match data {
        InstructionData::Call {
            callee: Callee::Direct(callee),
            args,
            result_ty,
        } => {
            let callee_name = module.functions[callee].name.clone();
            if let Some(helper) = runtime_helper_for(sigs, &callee_name) {
                module.functions[clone_id].insts[inst] = InstructionData::Call {
                    callee: Callee::Direct(helper),
                    args,
                    result_ty,
                };
            } else if callee == sigs.unsafe_marker
                || callee_name == symbols::COMMIT_HANDLER
                || callee_name == symbols::SCOPE_BEGIN
                || callee_name == symbols::SCOPE_END
            {
                // left exactly as-is -- a marker call may already have been
                // placed here by the scope-region diamond rewrite (§4.8),
                // before this generic sweep ever sees it; running it through
                // the cross-module/indirect-translation branch below would
                // mistake the marker itself for an uninstrumented callee and
                // destroy the serialization request it represents.
            } else if symbols::EXCEPTION_HELPERS.contains(&callee_name.as_str()) {
                prepend_unsafe(module, clone_id, sigs, inst);
            } else if pure_set.contains(&callee) {
                // left exactly as-is
            } else if let Some(clone_callee) = function_map.get(&callee).and_then(|f| f.clone) {
                module.functions[clone_id].insts[inst] = InstructionData::Call {
                    callee: Callee::Direct(clone_callee),
                    args,
                    result_ty,
                };
            } else {
                let translated = emit_translation_for_direct(module, clone_id, sigs, inst, callee);
                module.functions[clone_id].insts[inst] = InstructionData::Call {
                    callee: Callee::Indirect(translated),
                    args,
                    result_ty,
                };
            }
        }
        InstructionData::Call {
            callee: Callee::Indirect(target),
            args,
            result_ty,
        } => {
            let translated = emit_translation_for_indirect(module, clone_id, sigs, inst, target);
            module.functions[clone_id].insts[inst] = InstructionData::Call {
                callee: Callee::Indirect(translated),
                args,
                result_ty,
            };
        }
        InstructionData::Invoke {
            callee: Callee::Direct(callee),
            args,
            result_ty,
            normal,
            unwind,
        } => {
            let callee_name = module.functions[callee].name.clone();
            if let Some(helper) = runtime_helper_for(sigs, &callee_name) {
                module.functions[clone_id].insts[inst] = InstructionData::Invoke {
                    callee: Callee::Direct(helper),
                    args,
                    result_ty,
                    normal,
                    unwind,
                };
            } else if callee == sigs.unsafe_marker
                || callee_name == symbols::COMMIT_HANDLER
                || callee_name == symbols::SCOPE_BEGIN
                || callee_name == symbols::SCOPE_END
            {
                // left exactly as-is -- see the matching comment in the
                // direct-call arm above.
            } else if symbols::EXCEPTION_HELPERS.contains(&callee_name.as_str()) {
                prepend_unsafe(module, clone_id, sigs, inst);
            } else if pure_set.contains(&callee) {
                // left exactly as-is
            } else if let Some(clone_callee) = function_map.get(&callee).and_then(|f| f.clone) {
                module.functions[clone_id].insts[inst] = InstructionData::Invoke {
                    callee: Callee::Direct(clone_callee),
                    args,
                    result_ty,
                    normal,
                    unwind,
                };
            } else {
                let translated = emit_translation_for_direct(module, clone_id, sigs, inst, callee);
                module.functions[clone_id].insts[inst] = InstructionData::Invoke {
                    callee: Callee::Indirect(translated),
                    args,
                    result_ty,
                    normal,
                    unwind,
                };
            }
        }
        InstructionData::Invoke {
            callee: Callee::Indirect(target),
            args,
            result_ty,
            normal,
            unwind,
        } => {
            let translated = emit_translation_for_indirect(module, clone_id, sigs, inst, target);
            module.functions[clone_id].insts[inst] = InstructionData::Invoke {
                callee: Callee::Indirect(translated),
                args,
                result_ty,
                normal,
                unwind,
            };
        }
        InstructionData::InlineAsm { .. } => {
            prepend_unsafe(module, clone_id, sigs, inst);
        }
        InstructionData::Intrinsic { kind, .. } => {
            if kind.forces_serialization() {
                prepend_unsafe(module, clone_id, sigs, inst);
            }
        }
        InstructionData::AtomicRmw { .. } | InstructionData::AtomicCas { .. } => {
            prepend_unsafe(module, clone_id, sigs, inst);
        }
        InstructionData::Load { ptr, ty, flags } => {
            if flags.volatile || flags.atomic {
                prepend_unsafe(module, clone_id, sigs, inst);
            } else if config.instrument_reads {
                if let Some(canonical) = crate::ir::canonical_type(&ty) {
                    module.functions[clone_id].insts[inst] = InstructionData::Call {
                        callee: Callee::Direct(sigs.load_for(canonical)),
                        args: smallvec::smallvec![ptr],
                        result_ty: ty,
                    };
                } else {
                    prepend_unsafe(module, clone_id, sigs, inst);
                }
            }
        }
        InstructionData::Store { value, ptr, flags } => {
            if flags.volatile || flags.atomic {
                prepend_unsafe(module, clone_id, sigs, inst);
            } else {
                let value_ty = module.functions[clone_id].value_type(value);
                if let Some(canonical) = crate::ir::canonical_type(&value_ty) {
                    module.functions[clone_id].insts[inst] = InstructionData::Call {
                        callee: Callee::Direct(sigs.store_for(canonical)),
                        args: smallvec::smallvec![value, ptr],
                        result_ty: Type::Void,
                    };
                } else {
                    prepend_unsafe(module, clone_id, sigs, inst);
                }
            }
        }
        InstructionData::Unsupported { opcode } => {
            return Err(PassError::UnsupportedInstruction {
                function: function_name.to_string(),
                opcode,
            });
        }
        // Fence, terminators, phi, bitcast, func_addr, and every bucket that
        // collapses into `Other` (arithmetic, casts, gep, alloca, compares,
        // select, landing pads, ...) are left exactly as they appeared.
        _ => {}
    }
    Ok(())
}

fn runtime_helper_for(sigs: &RuntimeSignatures, name: &str) -> Option<FuncId> {
    if name == symbols::MALLOC {
        Some(sigs.malloc)
    } else if name == symbols::ALIGNED_ALLOC {
        Some(sigs.aligned_alloc)
    } else if name == symbols::FREE {
        Some(sigs.free)
    } else if name == symbols::MEMCPY {
        Some(sigs.memcpy)
    } else if name == symbols::MEMSET {
        Some(sigs.memset)
    } else if name == symbols::MEMMOVE {
        Some(sigs.memmove)
    } else {
        None
    }
}

/// Insert a call to the serialization-marker helper immediately before
/// `before`. Exposed crate-wide because the scope-region diamond rewrite
/// (§4.8) needs the exact same marker-insertion behavior for the
/// instrumented copy of an atomic access, which it then erases itself
/// instead of leaving in place (§4.8's diamond has a `bb_done` that already
/// runs the real atomic unconditionally, so a second real execution on the
/// instrumented path would be redundant).
pub(crate) fn prepend_unsafe(module: &mut Module, clone_id: FuncId, sigs: &RuntimeSignatures, before: Inst) {
    let func = &mut module.functions[clone_id];
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::At(before));
    cursor.insert(InstructionData::Call {
        callee: Callee::Direct(sigs.unsafe_marker),
        args: Default::default(),
        result_ty: Type::Void,
    });
}

/// §4.6 "direct call whose callee has no known clone (cross-module)":
/// materialize the callee's address, hand it to `translate_call`, and
/// return the resulting value for the caller to swap into an indirect call.
fn emit_translation_for_direct(
    module: &mut Module,
    clone_id: FuncId,
    sigs: &RuntimeSignatures,
    before: Inst,
    target: FuncId,
) -> Value {
    let func = &mut module.functions[clone_id];
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::At(before));
    let (_, addr) =
        cursor.insert_with_result(InstructionData::FuncAddr { func: target }, Some(Type::Ptr));
    let (_, translated) = cursor.insert_with_result(
        InstructionData::Call {
            callee: Callee::Direct(sigs.translate_call),
            args: smallvec::smallvec![addr.unwrap()],
            result_ty: Type::Ptr,
        },
        Some(Type::Ptr),
    );
    translated.unwrap()
}

/// §4.6 "indirect call": same translation, applied directly to the
/// function-pointer value already in hand.
fn emit_translation_for_indirect(
    module: &mut Module,
    clone_id: FuncId,
    sigs: &RuntimeSignatures,
    before: Inst,
    target: Value,
) -> Value {
    let func = &mut module.functions[clone_id];
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::At(before));
    let (_, translated) = cursor.insert_with_result(
        InstructionData::Call {
            callee: Callee::Direct(sigs.translate_call),
            args: smallvec::smallvec![target],
            result_ty: Type::Ptr,
        },
        Some(Type::Ptr),
    );
    translated.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, MemFlags, Signature};

    fn setup() -> (Module, RuntimeSignatures) {
        let mut module = Module::new();
        let sigs = RuntimeSignatures::materialize(&mut module);
        (module, sigs)
    }

    #[test]
    fn store_of_scalar_becomes_typed_store_call() {
        let (mut module, sigs) = setup();
        let clone_id = module.declare_function("tm_f", Signature::new(CallConv::C), true);
        let block = module.functions[clone_id].create_block();
        let ptr = module.functions[clone_id].append_param(block, Type::Ptr);
        let mut cursor = FuncCursor::new(&mut module.functions[clone_id]);
        cursor.set_position(CursorPosition::After(block));
        let value = cursor.make_value(Type::I32);
        cursor.insert(InstructionData::Store {
            value,
            ptr,
            flags: MemFlags::plain(),
        });
        cursor.insert(InstructionData::Return { value: None });

        instrument_clone(
            &mut module,
            &sigs,
            &Config::default(),
            &HashSet::new(),
            &HashMap::new(),
            clone_id,
            &HashSet::new(),
        )
        .unwrap();

        let insts = module.functions[clone_id].all_insts();
        let stores = insts
            .iter()
            .filter(|(_, i)| {
                matches!(
                    &module.functions[clone_id].insts[*i],
                    InstructionData::Call { callee: Callee::Direct(f), .. }
                        if *f == sigs.store_for(crate::ir::CanonicalType::U4)
                )
            })
            .count();
        assert_eq!(stores, 1);
        // S1: zero serialization markers.
        let markers = insts
            .iter()
            .filter(|(_, i)| {
                matches!(
                    &module.functions[clone_id].insts[*i],
                    InstructionData::Call { callee: Callee::Direct(f), .. }
                        if *f == sigs.unsafe_marker
                )
            })
            .count();
        assert_eq!(markers, 0);
    }

    #[test]
    fn atomic_load_is_serialized_not_routed_through_load_u8() {
        let (mut module, sigs) = setup();
        let clone_id = module.declare_function("tm_g", Signature::new(CallConv::C), true);
        let block = module.functions[clone_id].create_block();
        let ptr = module.functions[clone_id].append_param(block, Type::Ptr);
        let mut cursor = FuncCursor::new(&mut module.functions[clone_id]);
        cursor.set_position(CursorPosition::After(block));
        let (_, loaded) = cursor.insert_with_result(
            InstructionData::Load {
                ptr,
                ty: Type::I64,
                flags: MemFlags {
                    volatile: false,
                    atomic: true,
                },
            },
            Some(Type::I64),
        );
        cursor.insert(InstructionData::Return { value: loaded });

        instrument_clone(
            &mut module,
            &sigs,
            &Config::default(),
            &HashSet::new(),
            &HashMap::new(),
            clone_id,
            &HashSet::new(),
        )
        .unwrap();

        let insts = module.functions[clone_id].all_insts();
        let load_u8_calls = insts
            .iter()
            .filter(|(_, i)| {
                matches!(
                    &module.functions[clone_id].insts[*i],
                    InstructionData::Call { callee: Callee::Direct(f), .. }
                        if *f == sigs.load_for(crate::ir::CanonicalType::U8)
                )
            })
            .count();
        let markers = insts
            .iter()
            .filter(|(_, i)| {
                matches!(
                    &module.functions[clone_id].insts[*i],
                    InstructionData::Call { callee: Callee::Direct(f), .. }
                        if *f == sigs.unsafe_marker
                )
            })
            .count();
        assert_eq!(load_u8_calls, 0);
        assert_eq!(markers, 1);
    }

    #[test]
    fn unsupported_instruction_is_fatal() {
        let (mut module, sigs) = setup();
        let clone_id = module.declare_function("tm_h", Signature::new(CallConv::C), true);
        let block = module.functions[clone_id].create_block();
        let mut cursor = FuncCursor::new(&mut module.functions[clone_id]);
        cursor.set_position(CursorPosition::After(block));
        cursor.insert(InstructionData::Unsupported {
            opcode: "vscale_range".to_string(),
        });

        let err = instrument_clone(
            &mut module,
            &sigs,
            &Config::default(),
            &HashSet::new(),
            &HashMap::new(),
            clone_id,
            &HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, PassError::UnsupportedInstruction { .. }));
    }
}
