//! A whole-module compiler instrumentation pass for a transactional-memory
//! toolchain.
//!
//! [`run_pass`] is the single entry point: it consumes an annotated
//! [`ir::Module`] and rewrites it in place so that every memory access and
//! call reachable from a transactional root runs through the TM runtime's
//! API instead. The phases run in a fixed order -- see the module doc
//! comment on each submodule for the phase it owns, and `DESIGN.md` for how
//! each one is grounded in the reference implementation this crate is
//! patterned on.

pub mod annotations;
pub mod clone;
pub mod config;
pub mod discovery;
pub mod error;
pub mod init_emit;
pub mod instrument;
pub mod ir;
pub mod peephole;
pub mod scope_region;
pub mod signatures;
pub mod symbols;

use config::Config;
use discovery::DiscoverySets;
use error::{PassError, PassResult};
use ir::{FuncId, Module};
use log::{debug, info};
use signatures::RuntimeSignatures;
use std::collections::HashSet;

/// Run every phase of the pass over `module`, in place, per the data flow
/// in the design overview: signatures and annotation lifting, the four
/// discovery roots and their reachability closure, cloning, body
/// instrumentation (generic, then the RAII scope-region diamond rewrite
/// where applicable), the two non-RAII boundary transforms, the
/// serialization-marker peephole, and static initializer emission.
///
/// Returns the set of newly created clone `FuncId`s, in case a caller wants
/// to run further compiler passes over just the instrumented bodies.
pub fn run_pass(module: &mut Module, config: &Config) -> PassResult<HashSet<FuncId>> {
    info!("materializing runtime signatures");
    let sigs = RuntimeSignatures::materialize(module);

    annotations::lift(module);

    let mut sets = DiscoverySets::new();
    discovery::discover_annotated(module, config, &mut sets);
    discovery::discover_capi(module, &mut sets);
    discovery::discover_lambdas(module, &mut sets);
    discovery::discover_constructors(module, &mut sets);
    discovery::close_reachable(module, &mut sets);
    debug!(
        "discovery closed over {} function(s), {} pure",
        sets.functions.len(),
        sets.pure.len()
    );

    clone::create_clones(module, &mut sets);

    let function_map = sets.functions.clone();
    let pure_set = sets.pure.clone();
    let lambdas = sets.lambdas.clone();

    let scope_begin = module.get_function(symbols::SCOPE_BEGIN);
    let scope_end = module.get_function(symbols::SCOPE_END);

    let clone_ids: Vec<FuncId> = function_map
        .values()
        .filter_map(|f| f.clone.filter(|&c| c != f.orig))
        .collect();

    for clone_id in &clone_ids {
        let skip = if let (Some(begin), Some(end)) = (scope_begin, scope_end) {
            instrument_scope_regions(module, &sigs, config, &pure_set, &function_map, *clone_id, begin, end)?
        } else {
            HashSet::new()
        };
        instrument::instrument_clone(module, &sigs, config, &pure_set, &function_map, *clone_id, &skip)?;
    }

    instrument::convert_region_begin_c_api(module, &sigs, &function_map);
    instrument::convert_lambdas_cxx_api(module, &lambdas, &function_map);

    for clone_id in &clone_ids {
        peephole::optimize_unsafe(module, &sigs, *clone_id);
    }

    init_emit::emit_static_initializer(module, &sigs, &function_map);

    Ok(clone_ids.into_iter().collect())
}

/// Normalize, find, and rewrite every scope region in `clone_id`'s body.
/// Split out of `run_pass` because it needs both scope-begin and
/// scope-end to be present in the module -- a module with no RAII API at
/// all simply never calls this, and every clone's `skip` set is empty.
fn instrument_scope_regions(
    module: &mut Module,
    sigs: &RuntimeSignatures,
    config: &Config,
    pure_set: &HashSet<FuncId>,
    function_map: &std::collections::HashMap<FuncId, discovery::FunctionFeatures>,
    clone_id: FuncId,
    scope_begin: FuncId,
    scope_end: FuncId,
) -> PassResult<HashSet<ir::Inst>> {
    scope_region::normalize_scope_boundaries(&mut module.functions[clone_id], scope_begin, scope_end);
    let regions = scope_region::find_scope_regions(&module.functions[clone_id], scope_begin, scope_end);

    for region in &regions {
        if region.end.is_none() {
            return Err(PassError::MalformedScopeNesting {
                function: module.functions[clone_id].name.clone(),
                block: region.begin_block,
            });
        }
    }

    scope_region::rewrite_scope_regions(module, sigs, config, pure_set, function_map, clone_id, &regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, Callee, CursorPosition, FuncCursor, InstructionData, MemFlags, Signature, Type};

    /// S1 "store of int": a `tm_function`-annotated function storing a
    /// scalar produces one typed store call and zero serialization
    /// markers in its clone.
    #[test]
    fn store_of_int_produces_one_typed_store_and_no_markers() {
        let mut module = Module::new();
        let f = module.declare_function("store_cafebeef", Signature::new(CallConv::C), true);
        module.functions[f].attrs.tm_function = true;
        let block = module.functions[f].create_block();
        let ptr = module.functions[f].append_param(block, Type::Ptr);
        {
            let mut cursor = FuncCursor::new(&mut module.functions[f]);
            cursor.set_position(CursorPosition::After(block));
            let value = cursor.make_value(Type::I32);
            cursor.insert(InstructionData::Store {
                value,
                ptr,
                flags: MemFlags::plain(),
            });
            cursor.insert(InstructionData::Return { value: None });
        }

        let config = Config::default();
        run_pass(&mut module, &config).unwrap();

        let clone_id = module.get_function("tm_store_cafebeef").expect("clone must exist");
        let sigs = RuntimeSignatures::materialize(&mut module);
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
        assert_eq!(typed_stores, 1);
        assert_eq!(markers, 0);
    }

    /// Running the pass a second time over its own output creates no new
    /// clones (property 7, §8): a clone's body contains no `tm_function`
    /// annotation and its name already carries the reserved prefix, so
    /// nothing re-enters discovery.
    #[test]
    fn idempotent_on_an_already_instrumented_module() {
        let mut module = Module::new();
        let f = module.declare_function("already_run", Signature::new(CallConv::C), true);
        module.functions[f].attrs.tm_function = true;
        let block = module.functions[f].create_block();
        let mut cursor = FuncCursor::new(&mut module.functions[f]);
        cursor.set_position(CursorPosition::After(block));
        cursor.insert(InstructionData::Return { value: None });

        let config = Config::default();
        run_pass(&mut module, &config).unwrap();
        run_pass(&mut module, &config).unwrap();

        assert!(module.get_function("tm_tm_already_run").is_none());
    }

    /// A scope region wraps two distinct accesses; both split into
    /// diamonds, producing typed helper calls and no leftover markers.
    #[test]
    fn raii_scope_region_rewrites_enclosed_accesses() {
        let mut module = Module::new();
        let begin = module.declare_function(symbols::SCOPE_BEGIN, Signature::new(CallConv::C), false);
        let end = module.declare_function(symbols::SCOPE_END, Signature::new(CallConv::C), false);
        let f = module.declare_function("region_user", Signature::new(CallConv::C), true);
        module.functions[f].attrs.tm_function = true;
        let entry = module.functions[f].create_block();
        let ptr = module.functions[f].append_param(entry, Type::Ptr);
        let predicate = module.functions[f].append_param(entry, Type::I8);
        {
            let mut cursor = FuncCursor::new(&mut module.functions[f]);
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

        let config = Config::default();
        run_pass(&mut module, &config).unwrap();

        let clone_id = module.get_function("tm_region_user").expect("clone must exist");
        let sigs = RuntimeSignatures::materialize(&mut module);
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
        assert_eq!(typed_stores, 1);
    }
}
