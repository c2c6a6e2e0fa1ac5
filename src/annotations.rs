//! Annotation lifting.
//!
//! The front end records annotations in `Module::annotations` as loose
//! `(function, token)` pairs, the same shape a source-level
//! `__attribute__((annotate("...")))` decays to by the time it reaches the
//! IR. This phase drains that array once, up front, and turns each token
//! into a bit (or payload) on the function's own `FunctionAttributes`, so
//! every later phase can just read `function.attrs` instead of re-parsing
//! strings.

use crate::ir::Module;

const TOKEN_FUNCTION: &str = "tm_function";
const TOKEN_PURE: &str = "tm_pure";
const TOKEN_CTOR: &str = "tm_ctor";
const TOKEN_RENAME_PREFIX: &str = "tm_rename_";

/// Drain `module.annotations` into the `attrs` of the functions they
/// describe. Unrecognized tokens are ignored rather than rejected: a front
/// end may attach annotations this pass has no use for.
pub fn lift(module: &mut Module) {
    let annotations = std::mem::take(&mut module.annotations);
    for (id, token) in annotations {
        let attrs = &mut module.functions[id].attrs;
        if token == TOKEN_FUNCTION {
            attrs.tm_function = true;
        } else if token == TOKEN_PURE {
            attrs.tm_pure = true;
        } else if token == TOKEN_CTOR {
            attrs.tm_ctor = true;
        } else if let Some(name) = token.strip_prefix(TOKEN_RENAME_PREFIX) {
            attrs.tm_rename = Some(name.to_string());
        }
    }
}
