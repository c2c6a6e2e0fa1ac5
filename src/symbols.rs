//! Well-known symbol names the pass recognizes by exact string match.
//!
//! These are the contract between the instrumented module and the TM
//! runtime/front end. None of them carry special meaning to the host IR
//! itself; the pass is the only thing that cares.

/// Reserved prefix applied textually to an origin function's already-
/// mangled name to produce its clone's name.
pub const CLONE_PREFIX: &str = "tm_";

/// The opaque sentinel type used as one argument of a recognized lambda
/// operator.
pub const OPAQUE_TYPE_NAME: &str = "tm_opaque";

/// The single generic `std::function`-style wrapper that must *not* be
/// treated as a lambda even though it matches the lambda signature shape.
pub const GENERIC_LAMBDA_WRAPPER: &str = "std_function_invoke_tm_opaque";

/// The legacy C-API region-launch entry point. A call to this symbol whose
/// second argument is a resolvable function is both a C-API discovery root
/// and a boundary-instrumentation site.
pub const EXECUTE_C: &str = "tm_execute_c";

/// The four-argument internal form of the C-API region launch that
/// `convert_region_begin_c_api` retargets calls to.
pub const EXECUTE_C_INTERNAL: &str = "tm_execute_c_internal";

/// The lambda-API region-launch entry point.
pub const EXECUTE: &str = "tm_execute";

/// The library destructor symbol seeded into the pure set so nested lambdas
/// do not serialize.
pub const FUNCTION_BASE_DTOR: &str = "__function_base_destructor";

/// The constructor marker: a call to this symbol inside a function body
/// marks the enclosing function as a constructor root, and the call site
/// itself is deleted after discovery.
pub const TM_CTOR_MARKER: &str = "tm_ctor_marker";

/// RAII scope-begin / scope-end entry points.
pub const SCOPE_BEGIN: &str = "tm_begin_transaction";
pub const SCOPE_END: &str = "tm_end_transaction";

/// Left untouched by body instrumentation no matter what.
pub const COMMIT_HANDLER: &str = "tm_commit_handler";

/// Allocation and bulk-memory helpers recognized by name and redirected to
/// their runtime-library equivalents of the same suffix.
pub const MALLOC: &str = "malloc";
pub const ALIGNED_ALLOC: &str = "aligned_alloc";
pub const FREE: &str = "free";
pub const MEMCPY: &str = "memcpy";
pub const MEMSET: &str = "memset";
pub const MEMMOVE: &str = "memmove";

pub const ALLOC_AND_MEM_HELPERS: &[&str] =
    &[MALLOC, ALIGNED_ALLOC, FREE, MEMCPY, MEMSET, MEMMOVE];

/// C++ exception-runtime helpers: always force serialization, never
/// rewritten.
pub const EXCEPTION_HELPERS: &[&str] = &[
    "allocate_exception",
    "free_exception",
    "throw",
    "begin_catch",
    "end_catch",
    "rethrow",
];

/// Runtime dynamic-translation and serialization-marker entry points.
pub const TRANSLATE_CALL: &str = "translate_call";
pub const UNSAFE_MARKER: &str = "unsafe";
pub const REGISTER_CLONE: &str = "register_clone";

/// Name of the emitted static initializer function.
pub const STATIC_INITIALIZER: &str = "tm_static_initializer";

/// Priority assigned to the emitted initializer in the module's global
/// constructor list. Low enough that the runtime observes clone
/// registrations before any user constructor runs; the exact numeric value
/// does not matter to the runtime, only the relative ordering.
pub const STATIC_INITIALIZER_PRIORITY: i32 = 65535;
