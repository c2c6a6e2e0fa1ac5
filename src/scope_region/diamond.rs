//! §4.8 the RAII diamond rewrite.
//!
//! Every memory access and non-pure call inside a scope region is split
//! into a four-block diamond: `bb_orig` reads the per-region predicate
//! (captured by `tm_begin_transaction` and carried on its call as an
//! argument) and branches to either `bb_inst` (a fully §4.6-instrumented
//! copy) or `bb_noinst` (the instruction exactly as the programmer wrote
//! it), both of which fall through to `bb_done`. What happens in `bb_done`
//! depends on the instruction kind: a void call or a plain store has
//! nothing left to reconcile and is dropped; a load or a non-void call
//! becomes a `Phi` merging the two paths' results under the original
//! `Inst`/`Value` identity, so nothing downstream needs patching; an
//! atomic access is different again, because it always executes for real
//! exactly once in `bb_done` regardless of which branch was taken -- so
//! `bb_inst`'s copy is reduced to just the serialization marker, and
//! `bb_noinst`'s copy is dropped outright.
//!
//! An `Invoke` can't be split this way, since it's a terminator itself:
//! there's nothing to leave behind in `bb_orig` once it's removed.
//! `split_invoke` rebuilds the skeleton around it instead of splitting a
//! block in two -- `bb_inst` and `bb_noinst` each hold a full copy of the
//! invoke, both still targeting the original normal/unwind destinations,
//! and a non-void result is merged by a `Phi` inserted at the top of the
//! original normal-destination block rather than in a `bb_done` that never
//! gets built.

use crate::config::Config;
use crate::discovery::FunctionFeatures;
use crate::error::PassResult;
use crate::ir::{
    Block, Callee, CursorPosition, FuncCursor, FuncId, Function, Inst, InstructionData, Module,
    Type, Value,
};
use crate::instrument::body::{instrument_one, prepend_unsafe};
use crate::scope_region::ScopeRegion;
use crate::signatures::RuntimeSignatures;
use std::collections::{HashMap, HashSet};

/// Run the diamond rewrite over every region found in `clone_id`. Returns
/// the set of instructions it produced and instrumented itself, so the
/// generic §4.6 sweep over the rest of the clone can skip them.
pub fn rewrite_scope_regions(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    config: &Config,
    pure_set: &HashSet<FuncId>,
    function_map: &HashMap<FuncId, FunctionFeatures>,
    clone_id: FuncId,
    regions: &[ScopeRegion],
) -> PassResult<HashSet<Inst>> {
    let mut skip = HashSet::new();

    for region in regions {
        let predicate = predicate_value(&module.functions[clone_id], region.begin);
        let candidates: Vec<Inst> = module.functions[clone_id]
            .all_insts()
            .into_iter()
            .filter(|(block, _)| region.blocks.contains(block))
            .map(|(_, inst)| inst)
            .collect();

        for inst in candidates {
            // Already consumed by an earlier split in this same region (a
            // store's original copy, an atomic's uninstrumented copy, ...).
            if module.functions[clone_id].layout.inst_block(inst).is_none() {
                continue;
            }
            let data = module.functions[clone_id].insts[inst].clone();
            if !needs_diamond(&data, pure_set) {
                continue;
            }
            let produced = if matches!(data, InstructionData::Invoke { .. }) {
                split_invoke(
                    module,
                    sigs,
                    config,
                    pure_set,
                    function_map,
                    clone_id,
                    inst,
                    predicate,
                )?
            } else {
                split_plain(
                    module,
                    sigs,
                    config,
                    pure_set,
                    function_map,
                    clone_id,
                    inst,
                    predicate,
                )?
            };
            skip.extend(produced);
        }
    }

    Ok(skip)
}

/// The `tm_begin_transaction` call site's second argument is the region's
/// instrumented-or-not predicate, captured once per region entry rather
/// than re-evaluated per access.
fn predicate_value(func: &Function, begin: Inst) -> Value {
    match &func.insts[begin] {
        InstructionData::Call { args, .. } => *args
            .get(1)
            .expect("normalized scope-begin call must carry a predicate argument"),
        other => panic!("scope region begin is not a call: {other:?}"),
    }
}

fn needs_diamond(data: &InstructionData, pure_set: &HashSet<FuncId>) -> bool {
    match data {
        InstructionData::Load { .. }
        | InstructionData::Store { .. }
        | InstructionData::AtomicRmw { .. }
        | InstructionData::AtomicCas { .. } => true,
        InstructionData::Call {
            callee: Callee::Direct(f),
            ..
        }
        | InstructionData::Invoke {
            callee: Callee::Direct(f),
            ..
        } => !pure_set.contains(f),
        InstructionData::Call { .. } | InstructionData::Invoke { .. } => true,
        _ => false,
    }
}

/// Append the predicate read and the two-way branch to `bb_orig`, which by
/// now has no terminator of its own (its old one either moved into
/// `bb_done` via `split_block_before`, or -- for the invoke case -- was
/// just removed outright).
fn insert_predicate_branch(
    module: &mut Module,
    clone_id: FuncId,
    bb_orig: Block,
    predicate: Value,
    bb_inst: Block,
    bb_noinst: Block,
) {
    let func = &mut module.functions[clone_id];
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::After(bb_orig));
    let (_, cond) = cursor.insert_with_result(
        InstructionData::Other {
            opcode: "tm_scope_predicate".to_string(),
            args: smallvec::smallvec![predicate],
        },
        Some(Type::I8),
    );
    cursor.insert(InstructionData::Branch {
        cond: cond.expect("predicate read always produces a value"),
        then_block: bb_inst,
        else_block: bb_noinst,
    });
}

/// Push a copy of `data` into `block`, registering a fresh result value (if
/// `data` defines one) and appending a `Jump` to `bb_done` after it.
fn clone_into(module: &mut Module, clone_id: FuncId, data: &InstructionData, block: Block, bb_done: Block) -> Inst {
    let new_inst = module.functions[clone_id].insts.push(data.clone());
    module.functions[clone_id].layout.append_inst(block, new_inst);
    if let Some(ty) = crate::clone::result_type_of(&module.functions[clone_id], new_inst) {
        let v = module.functions[clone_id].create_value(ty);
        module.functions[clone_id].record_result(new_inst, v);
    }
    let func = &mut module.functions[clone_id];
    let mut cursor = FuncCursor::new(func);
    cursor.set_position(CursorPosition::After(block));
    cursor.insert(InstructionData::Jump { dest: bb_done });
    new_inst
}

/// Split a non-terminator access (load/store/atomic/direct-or-indirect
/// call) into the four-block diamond.
fn split_plain(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    config: &Config,
    pure_set: &HashSet<FuncId>,
    function_map: &HashMap<FuncId, FunctionFeatures>,
    clone_id: FuncId,
    inst: Inst,
    predicate: Value,
) -> PassResult<HashSet<Inst>> {
    let bb_orig = module.functions[clone_id]
        .layout
        .inst_block(inst)
        .expect("must already be placed");
    let data = module.functions[clone_id].insts[inst].clone();

    let bb_done = module.functions[clone_id].create_block_after(bb_orig);
    module.functions[clone_id].layout.split_block_before(inst, bb_done);

    let bb_inst = module.functions[clone_id].create_block_after(bb_orig);
    let bb_noinst = module.functions[clone_id].create_block_after(bb_inst);
    insert_predicate_branch(module, clone_id, bb_orig, predicate, bb_inst, bb_noinst);

    let ii_inst = clone_into(module, clone_id, &data, bb_inst, bb_done);
    let ii_noinst = clone_into(module, clone_id, &data, bb_noinst, bb_done);

    reconcile(module, clone_id, inst, &data, bb_inst, bb_noinst, ii_inst, ii_noinst);

    if matches!(
        data,
        InstructionData::AtomicRmw { .. } | InstructionData::AtomicCas { .. }
    ) {
        // The real atomic already runs unconditionally in `bb_done`; the
        // instrumented path only needs the marker ahead of it.
        prepend_unsafe(module, clone_id, sigs, ii_inst);
        module.functions[clone_id].layout.remove_inst(ii_inst);
    } else {
        let function_name = module.functions[clone_id].name.clone();
        instrument_one(
            module,
            sigs,
            config,
            pure_set,
            function_map,
            clone_id,
            ii_inst,
            &function_name,
        )?;
    }

    Ok(HashSet::from([ii_inst, ii_noinst]))
}

/// Reconcile `bb_done`'s copy of the original instruction (still living
/// there under `inst`'s original identity after the split) against the two
/// new copies, per the table in the module doc comment.
fn reconcile(
    module: &mut Module,
    clone_id: FuncId,
    inst: Inst,
    data: &InstructionData,
    bb_inst: Block,
    bb_noinst: Block,
    ii_inst: Inst,
    ii_noinst: Inst,
) {
    match data {
        InstructionData::AtomicRmw { .. } | InstructionData::AtomicCas { .. } => {
            module.functions[clone_id].layout.remove_inst(ii_noinst);
        }
        InstructionData::Store { .. } => {
            module.functions[clone_id].layout.remove_inst(inst);
        }
        InstructionData::Load { .. } => {
            merge_into_phi(module, clone_id, inst, bb_inst, bb_noinst, ii_inst, ii_noinst);
        }
        InstructionData::Call { result_ty, .. } => {
            if matches!(result_ty, Type::Void) {
                module.functions[clone_id].layout.remove_inst(inst);
            } else {
                merge_into_phi(module, clone_id, inst, bb_inst, bb_noinst, ii_inst, ii_noinst);
            }
        }
        other => unreachable!("needs_diamond only admits load/store/atomic/call, got {other:?}"),
    }
}

fn merge_into_phi(
    module: &mut Module,
    clone_id: FuncId,
    inst: Inst,
    bb_inst: Block,
    bb_noinst: Block,
    ii_inst: Inst,
    ii_noinst: Inst,
) {
    let inst_value = module.functions[clone_id]
        .result_of(ii_inst)
        .expect("instrumented copy must define a result");
    let noinst_value = module.functions[clone_id]
        .result_of(ii_noinst)
        .expect("uninstrumented copy must define a result");
    module.functions[clone_id].insts[inst] = InstructionData::Phi {
        incoming: vec![(bb_noinst, noinst_value), (bb_inst, inst_value)],
    };
}

/// Split an `Invoke`. There's no `bb_orig` remainder to leave a terminator
/// in, so this removes the invoke outright and rebuilds the skeleton
/// around it rather than calling `Layout::split_block_before`.
fn split_invoke(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    config: &Config,
    pure_set: &HashSet<FuncId>,
    function_map: &HashMap<FuncId, FunctionFeatures>,
    clone_id: FuncId,
    inst: Inst,
    predicate: Value,
) -> PassResult<HashSet<Inst>> {
    let bb_orig = module.functions[clone_id]
        .layout
        .inst_block(inst)
        .expect("must already be placed");
    let (callee, args, result_ty, normal, unwind) = match module.functions[clone_id].insts[inst].clone() {
        InstructionData::Invoke {
            callee,
            args,
            result_ty,
            normal,
            unwind,
        } => (callee, args, result_ty, normal, unwind),
        other => unreachable!("split_invoke called on non-invoke: {other:?}"),
    };

    module.functions[clone_id].layout.remove_inst(inst);

    let bb_inst = module.functions[clone_id].create_block_after(bb_orig);
    let bb_noinst = module.functions[clone_id].create_block_after(bb_inst);
    insert_predicate_branch(module, clone_id, bb_orig, predicate, bb_inst, bb_noinst);

    let ii_noinst = push_invoke_copy(module, clone_id, callee, args.clone(), result_ty, normal, unwind, bb_noinst);
    let ii_inst = push_invoke_copy(module, clone_id, callee, args, result_ty, normal, unwind, bb_inst);

    let function_name = module.functions[clone_id].name.clone();
    instrument_one(
        module,
        sigs,
        config,
        pure_set,
        function_map,
        clone_id,
        ii_inst,
        &function_name,
    )?;

    if !matches!(result_ty, Type::Void) {
        let inst_value = module.functions[clone_id]
            .result_of(ii_inst)
            .expect("instrumented invoke copy must define a result");
        let noinst_value = module.functions[clone_id]
            .result_of(ii_noinst)
            .expect("uninstrumented invoke copy must define a result");
        let phi = InstructionData::Phi {
            incoming: vec![(bb_noinst, noinst_value), (bb_inst, inst_value)],
        };
        module.functions[clone_id].insts[inst] = phi;
        place_at_top(module, clone_id, normal, inst);
    }
    // A void invoke's result needs no merge; `inst` stays unplaced for good,
    // the same as a void call's `bb_done` copy being dropped in `split_plain`.

    Ok(HashSet::from([ii_inst, ii_noinst]))
}

fn push_invoke_copy(
    module: &mut Module,
    clone_id: FuncId,
    callee: Callee,
    args: crate::ir::ValueList,
    result_ty: Type,
    normal: Block,
    unwind: Block,
    block: Block,
) -> Inst {
    let data = InstructionData::Invoke {
        callee,
        args,
        result_ty,
        normal,
        unwind,
    };
    let new_inst = module.functions[clone_id].insts.push(data);
    module.functions[clone_id].layout.append_inst(block, new_inst);
    if !matches!(result_ty, Type::Void) {
        let v = module.functions[clone_id].create_value(result_ty);
        module.functions[clone_id].record_result(new_inst, v);
    }
    new_inst
}

/// Place the already-allocated `inst` (now holding `Phi` data) at the start
/// of `block`, ahead of whatever was already there.
fn place_at_top(module: &mut Module, clone_id: FuncId, block: Block, inst: Inst) {
    if let Some(first) = module.functions[clone_id].layout.first_inst(block) {
        module.functions[clone_id].layout.insert_inst_before(first, inst);
    } else {
        module.functions[clone_id].layout.append_inst(block, inst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, MemFlags, Module, Signature};
    use crate::scope_region::{find_scope_regions, normalize_scope_boundaries};

    fn setup() -> (Module, RuntimeSignatures, FuncId, FuncId) {
        let mut module = Module::new();
        let sigs = RuntimeSignatures::materialize(&mut module);
        let begin = module.declare_function(
            "tm_begin_transaction",
            Signature::new(CallConv::C),
            false,
        );
        let end = module.declare_function("tm_end_transaction", Signature::new(CallConv::C), false);
        (module, sigs, begin, end)
    }

    /// A store inside a single-block region: instrumented copy becomes a
    /// typed `store_u4` call, uninstrumented copy keeps the raw store, and
    /// the original instruction is dropped from `bb_done`.
    #[test]
    fn store_in_scope_region_splits_into_diamond() {
        let (mut module, sigs, begin, end) = setup();
        let clone_id = module.declare_function("tm_f", Signature::new(CallConv::C), true);
        let entry = module.functions[clone_id].create_block();
        let ptr = module.functions[clone_id].append_param(entry, Type::Ptr);
        let predicate = module.functions[clone_id].append_param(entry, Type::I8);
        {
            let mut cursor = FuncCursor::new(&mut module.functions[clone_id]);
            cursor.set_position(CursorPosition::After(entry));
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(begin),
                args: smallvec::smallvec![ptr, predicate],
                result_ty: Type::Void,
            });
            let val = cursor.make_value(Type::I32);
            cursor.insert(InstructionData::Store {
                value: val,
                ptr,
                flags: MemFlags::plain(),
            });
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(end),
                args: Default::default(),
                result_ty: Type::Void,
            });
            cursor.insert(InstructionData::Return { value: None });
        }

        normalize_scope_boundaries(&mut module.functions[clone_id], begin, end);
        let regions = find_scope_regions(&module.functions[clone_id], begin, end);
        assert_eq!(regions.len(), 1);

        let skip = rewrite_scope_regions(
            &mut module,
            &sigs,
            &Config::default(),
            &HashSet::new(),
            &HashMap::new(),
            clone_id,
            &regions,
        )
        .unwrap();
        assert_eq!(skip.len(), 2);

        let insts = module.functions[clone_id].all_insts();
        let typed_stores = insts
            .iter()
            .filter(|(_, i)| {
                matches!(
                    &module.functions[clone_id].insts[*i],
                    InstructionData::Call { callee: Callee::Direct(f), .. }
                        if *f == sigs.store_for(crate::ir::CanonicalType::U4)
                )
            })
            .count();
        let raw_stores = insts
            .iter()
            .filter(|(_, i)| matches!(&module.functions[clone_id].insts[*i], InstructionData::Store { .. }))
            .count();
        assert_eq!(typed_stores, 1);
        assert_eq!(raw_stores, 1);
    }

    /// An atomic RMW inside a scope region: the instrumented path gets a
    /// serialization marker and no real atomic (it would double-execute);
    /// the uninstrumented path's copy is dropped outright; exactly one real
    /// atomic survives, unconditionally, in `bb_done`.
    #[test]
    fn atomic_in_scope_region_keeps_exactly_one_real_atomic() {
        let (mut module, sigs, begin, end) = setup();
        let clone_id = module.declare_function("tm_g", Signature::new(CallConv::C), true);
        let entry = module.functions[clone_id].create_block();
        let ptr = module.functions[clone_id].append_param(entry, Type::Ptr);
        let predicate = module.functions[clone_id].append_param(entry, Type::I8);
        {
            let mut cursor = FuncCursor::new(&mut module.functions[clone_id]);
            cursor.set_position(CursorPosition::After(entry));
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(begin),
                args: smallvec::smallvec![ptr, predicate],
                result_ty: Type::Void,
            });
            let val = cursor.make_value(Type::I32);
            cursor.insert(InstructionData::AtomicRmw {
                ptr,
                value: val,
                ty: Type::I32,
                op: crate::ir::AtomicRmwOp::Add,
            });
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(end),
                args: Default::default(),
                result_ty: Type::Void,
            });
            cursor.insert(InstructionData::Return { value: None });
        }

        normalize_scope_boundaries(&mut module.functions[clone_id], begin, end);
        let regions = find_scope_regions(&module.functions[clone_id], begin, end);

        rewrite_scope_regions(
            &mut module,
            &sigs,
            &Config::default(),
            &HashSet::new(),
            &HashMap::new(),
            clone_id,
            &regions,
        )
        .unwrap();

        let insts = module.functions[clone_id].all_insts();
        let atomics = insts
            .iter()
            .filter(|(_, i)| matches!(&module.functions[clone_id].insts[*i], InstructionData::AtomicRmw { .. }))
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
        assert_eq!(atomics, 1);
        assert_eq!(markers, 1);
    }

    /// A pure direct call inside a scope region is left alone entirely --
    /// no diamond, no skip entries.
    #[test]
    fn pure_call_in_scope_region_is_not_split() {
        let (mut module, sigs, begin, end) = setup();
        let pure_fn = module.declare_function("tm_pure_helper", Signature::new(CallConv::C), true);
        let clone_id = module.declare_function("tm_h", Signature::new(CallConv::C), true);
        let entry = module.functions[clone_id].create_block();
        let ptr = module.functions[clone_id].append_param(entry, Type::Ptr);
        let predicate = module.functions[clone_id].append_param(entry, Type::I8);
        {
            let mut cursor = FuncCursor::new(&mut module.functions[clone_id]);
            cursor.set_position(CursorPosition::After(entry));
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(begin),
                args: smallvec::smallvec![ptr, predicate],
                result_ty: Type::Void,
            });
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(pure_fn),
                args: Default::default(),
                result_ty: Type::Void,
            });
            cursor.insert(InstructionData::Call {
                callee: Callee::Direct(end),
                args: Default::default(),
                result_ty: Type::Void,
            });
            cursor.insert(InstructionData::Return { value: None });
        }

        normalize_scope_boundaries(&mut module.functions[clone_id], begin, end);
        let regions = find_scope_regions(&module.functions[clone_id], begin, end);

        let mut pure_set = HashSet::new();
        pure_set.insert(pure_fn);
        let skip = rewrite_scope_regions(
            &mut module,
            &sigs,
            &Config::default(),
            &pure_set,
            &HashMap::new(),
            clone_id,
            &regions,
        )
        .unwrap();
        assert!(skip.is_empty());
        assert_eq!(module.functions[clone_id].layout.num_blocks(), 3);
    }
}
