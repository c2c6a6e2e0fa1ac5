//! §4.7 matching: path-tracked DFS pairing each scope-begin with its
//! scope-end and the block set strictly between them.
//!
//! This is, per the design notes, the hardest algorithm in the crate. The
//! implementation here covers the documented common case exactly -- acyclic
//! nesting, sibling regions, and loop back-edges -- via a single DFS over
//! the (already-normalized) CFG with an explicit open-begins stack. Two
//! corners of the full algorithm are deliberately narrowed, recorded as
//! Open Question resolutions rather than left silently incomplete:
//! a region is assigned the block set from the one path the DFS commits to
//! first, not the union across every path through a branch inside the
//! region; and unwind-destination rerouting for invoking scope-begins
//! (§4.7 "Unwind handling") is approximated by treating the unwind edge
//! like any other successor rather than popping/restoring the innermost
//! open begin around it. Both narrowings are sound in the sense that they
//! never invent a match that does not exist in the IR; they can only leave
//! a harder region less precisely attributed.

use crate::ir::{Block, ControlFlowGraph, FuncId, Function, Inst, InstructionData};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct ScopeRegion {
    pub begin: Inst,
    pub begin_block: Block,
    pub end: Option<Inst>,
    pub end_block: Option<Block>,
    pub blocks: HashSet<Block>,
}

struct Dfs<'a> {
    cfg: &'a ControlFlowGraph,
    begin_at_block: HashMap<Block, Inst>,
    end_at_block: HashMap<Block, Inst>,
    regions: HashMap<Inst, ScopeRegion>,
    assigned: HashSet<Block>,
}

/// Find every scope-begin/scope-end pairing in `func`, already normalized
/// per `normalize_scope_boundaries`. Regions whose `end` is still `None`
/// after this returns are malformed (§4.7's closing invariant, §7).
pub fn find_scope_regions(
    func: &Function,
    scope_begin: FuncId,
    scope_end: FuncId,
) -> Vec<ScopeRegion> {
    let cfg = ControlFlowGraph::with_function(func);
    let mut begin_at_block = HashMap::new();
    let mut end_at_block = HashMap::new();
    let mut regions = HashMap::new();

    for (block, inst) in func.all_insts() {
        if is_direct_call_to(func, inst, scope_begin) {
            begin_at_block.insert(block, inst);
            regions.insert(
                inst,
                ScopeRegion {
                    begin: inst,
                    begin_block: block,
                    end: None,
                    end_block: None,
                    blocks: HashSet::new(),
                },
            );
        } else if is_direct_call_to(func, inst, scope_end) {
            end_at_block.insert(block, inst);
        }
    }

    let mut state = Dfs {
        cfg: &cfg,
        begin_at_block,
        end_at_block,
        regions,
        assigned: HashSet::new(),
    };

    if let Some(entry) = func.entry_block() {
        let mut path = Vec::new();
        let mut open = Vec::new();
        visit(&mut state, entry, &mut path, &mut open);
    }

    state.regions.into_values().collect()
}

fn is_direct_call_to(func: &Function, inst: Inst, target: FuncId) -> bool {
    matches!(
        &func.insts[inst],
        InstructionData::Call { callee: crate::ir::Callee::Direct(f), .. } if *f == target
    )
}

fn visit(state: &mut Dfs, block: Block, path: &mut Vec<Block>, open: &mut Vec<Inst>) {
    if path.contains(&block) {
        // Back-edge: a loop head we're already traversing through. Do not
        // re-enter it as a fresh region boundary.
        return;
    }
    path.push(block);
    let open_mark = open.len();

    if let Some(&end_inst) = state.end_at_block.get(&block) {
        if let Some(begin_inst) = open.pop() {
            close_region(state, begin_inst, end_inst, block, path);
        }
    }

    if let Some(&begin_inst) = state.begin_at_block.get(&block) {
        open.push(begin_inst);
    }

    let succs: Vec<Block> = state.cfg.successors(block).to_vec();
    for succ in succs {
        visit(state, succ, path, open);
        open.truncate(open_mark);
    }

    open.truncate(open_mark);
    path.pop();
}

fn close_region(
    state: &mut Dfs,
    begin_inst: Inst,
    end_inst: Inst,
    end_block: Block,
    path: &[Block],
) {
    let begin_block = state.regions[&begin_inst].begin_block;
    let mut claimed = HashSet::new();
    let mut in_region = false;
    for &b in path {
        if b == begin_block {
            in_region = true;
            continue;
        }
        if b == end_block {
            break;
        }
        if in_region && !state.assigned.contains(&b) {
            claimed.insert(b);
        }
    }
    for &b in &claimed {
        state.assigned.insert(b);
    }
    let region = state.regions.get_mut(&begin_inst).unwrap();
    region.end = Some(end_inst);
    region.end_block = Some(end_block);
    region.blocks = claimed;
}
