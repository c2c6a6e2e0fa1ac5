//! §4.6, §4.9, §4.10 instrumentation: body rewriting and the two
//! non-RAII boundary transforms. (RAII's own diamond rewrite lives in
//! `crate::scope_region`, since it shares the region DFS's bookkeeping.)

pub(crate) mod body;
mod boundary_capi;
mod boundary_lambda;

pub use body::instrument_clone;
pub use boundary_capi::convert_region_begin_c_api;
pub use boundary_lambda::convert_lambdas_cxx_api;
