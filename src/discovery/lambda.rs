//! §4.3 Discovery, lambda-API root.
//!
//! The front end lowers a recognized lambda operator to a two-parameter
//! function with exactly one parameter of the opaque sentinel pointer type
//! (modeled here as `Type::Other(symbols::OPAQUE_TYPE_NAME)`, since this IR
//! has no named-struct type table of its own to look up). The one documented
//! exception is the generic `std::function` wrapper sharing that exact
//! shape, which is never itself transactional and must be skipped.

use super::DiscoverySets;
use crate::ir::{Module, Type};
use crate::symbols;

fn is_opaque_sentinel(ty: &Type) -> bool {
    matches!(ty, Type::Other(name) if *name == symbols::OPAQUE_TYPE_NAME)
}

pub fn discover_lambdas(module: &Module, sets: &mut DiscoverySets) {
    for (id, func) in module.functions.iter() {
        if !func.is_definition() {
            continue;
        }
        if func.name == symbols::GENERIC_LAMBDA_WRAPPER {
            continue;
        }
        let params = &func.signature.params;
        let opaque_count = params.iter().filter(|ty| is_opaque_sentinel(ty)).count();
        if params.len() == 2 && opaque_count == 1 {
            sets.worklist.push_back(id);
            sets.lambdas.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallConv, Signature};

    fn opaque_ptr() -> Type {
        Type::Other(symbols::OPAQUE_TYPE_NAME)
    }

    #[test]
    fn matches_two_arg_one_opaque_shape() {
        let mut module = Module::new();
        let mut sig = Signature::new(CallConv::C);
        sig.params = vec![Type::Ptr, opaque_ptr()];
        let f = module.declare_function("lambda_op", sig, true);
        let mut sets = DiscoverySets::default();
        discover_lambdas(&module, &mut sets);
        assert!(sets.lambdas.contains(&f));
        assert!(sets.worklist.contains(&f));
    }

    #[test]
    fn skips_the_generic_wrapper() {
        let mut module = Module::new();
        let mut sig = Signature::new(CallConv::C);
        sig.params = vec![Type::Ptr, opaque_ptr()];
        module.declare_function(symbols::GENERIC_LAMBDA_WRAPPER, sig, true);
        let mut sets = DiscoverySets::default();
        discover_lambdas(&module, &mut sets);
        assert!(sets.lambdas.is_empty());
    }

    #[test]
    fn ignores_functions_with_wrong_arity_or_no_opaque_param() {
        let mut module = Module::new();
        let mut sig = Signature::new(CallConv::C);
        sig.params = vec![Type::Ptr, Type::Ptr, opaque_ptr()];
        module.declare_function("not_a_lambda", sig, true);
        let mut sets = DiscoverySets::default();
        discover_lambdas(&module, &mut sets);
        assert!(sets.lambdas.is_empty());
    }
}
