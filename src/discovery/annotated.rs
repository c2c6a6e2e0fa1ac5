//! §4.3 Discovery, annotated-function root.

use super::DiscoverySets;
use crate::config::Config;
use crate::ir::Module;
use crate::symbols;

/// Seed the pure set with the runtime's own re-entrant entry points and the
/// caller's overrides, then walk every definition for `tm_function` /
/// `tm_pure` / `tm_rename_<name>`.
///
/// A `tm_rename_<name>` function is a hand-written clone: it gets renamed to
/// `tm_<name>` (the same textual-prefix rule cloning uses, §4.5/§9) and
/// paired with whatever function in the module is already named `<name>`.
pub fn discover_annotated(module: &mut Module, config: &Config, sets: &mut DiscoverySets) {
    for name in [
        symbols::EXECUTE,
        symbols::EXECUTE_C,
        symbols::EXECUTE_C_INTERNAL,
        symbols::FUNCTION_BASE_DTOR,
    ] {
        if let Some(id) = module.get_function(name) {
            sets.pure.insert(id);
        }
    }
    for name in &config.discovery_pure_overrides {
        if let Some(id) = module.get_function(name) {
            sets.pure.insert(id);
        }
    }

    let mut to_rename = Vec::new();
    for (id, func) in module.functions.iter() {
        if !func.is_definition() {
            continue;
        }
        if func.attrs.tm_function {
            sets.worklist.push_back(id);
        } else if func.attrs.tm_pure {
            sets.pure.insert(id);
        }
        if let Some(target_name) = &func.attrs.tm_rename {
            to_rename.push((id, target_name.clone()));
        }
    }

    for (clone_id, target_name) in to_rename {
        let new_name = format!("{}{}", symbols::CLONE_PREFIX, target_name);
        module.rename_function(clone_id, &new_name);
        sets.worklist.push_back(clone_id);
        if let Some(orig_id) = module.get_function(&target_name) {
            sets.rename_pairs.push((clone_id, orig_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, Signature};

    #[test]
    fn seeds_pure_set_from_runtime_entry_points() {
        let mut module = Module::new();
        module.declare_function(symbols::EXECUTE, Signature::new(CallConv::C), true);
        let config = Config::default();
        let mut sets = DiscoverySets::new();
        discover_annotated(&mut module, &config, &mut sets);
        assert_eq!(sets.pure.len(), 1);
    }

    #[test]
    fn tm_function_attribute_joins_worklist() {
        let mut module = Module::new();
        let f = module.declare_function("my_region", Signature::new(CallConv::C), true);
        module.functions[f].attrs.tm_function = true;
        let config = Config::default();
        let mut sets = DiscoverySets::new();
        discover_annotated(&mut module, &config, &mut sets);
        assert!(sets.worklist.contains(&f));
    }

    #[test]
    fn rename_pairs_a_hand_written_clone_with_its_origin() {
        let mut module = Module::new();
        let orig = module.declare_function("widget_update", Signature::new(CallConv::C), true);
        let clone = module.declare_function("user_clone", Signature::new(CallConv::C), true);
        module.functions[clone].attrs.tm_rename = Some("widget_update".to_string());
        let config = Config::default();
        let mut sets = DiscoverySets::new();
        discover_annotated(&mut module, &config, &mut sets);

        assert_eq!(module.functions[clone].name, "tm_widget_update");
        assert_eq!(sets.rename_pairs, vec![(clone, orig)]);
        assert!(sets.worklist.contains(&clone));
    }
}
