//! `Module`: the whole-program unit the pass rewrites in one pass.
//!
//! Stands in for the host compiler's module type (out of scope for this
//! pass, normally supplied by the surrounding compiler framework). It keeps
//! exactly the surface the pass needs: named-symbol lookup, a global
//! annotation array, a global constructor list, and the ability to declare
//! new functions and append new symbols.

use crate::ir::entities::FuncId;
use crate::ir::function::{Function, Signature};
use cranelift_entity::PrimaryMap;
use std::collections::HashMap;

#[derive(Default)]
pub struct Module {
    pub functions: PrimaryMap<FuncId, Function>,
    by_name: HashMap<String, FuncId>,
    /// `(function, annotation token)` pairs exactly as the front end
    /// recorded them. `annotations::lift` drains this into per-function
    /// attributes before discovery runs.
    pub annotations: Vec<(FuncId, String)>,
    /// `(function, priority)`, run in ascending priority order at image
    /// start.
    pub constructors: Vec<(FuncId, i32)>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or look up) a function by name. A second declaration of the
    /// same name returns the existing `FuncId` unchanged, matching the
    /// "get-or-insert" semantics the pass relies on when materializing
    /// runtime signatures.
    pub fn declare_function(
        &mut self,
        name: &str,
        signature: Signature,
        is_definition: bool,
    ) -> FuncId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = self
            .functions
            .push(Function::new(name.to_string(), signature, is_definition));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    pub fn rename_function(&mut self, id: FuncId, new_name: &str) {
        let old = self.functions[id].name.clone();
        self.by_name.remove(&old);
        self.functions[id].name = new_name.to_string();
        self.by_name.insert(new_name.to_string(), id);
    }

    pub fn append_to_global_ctors(&mut self, id: FuncId, priority: i32) {
        self.constructors.push((id, priority));
    }
}
