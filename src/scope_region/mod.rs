//! §4.7/§4.8: finding RAII scope regions in a normalized clone body and
//! rewriting every memory access and non-pure call inside one into the
//! instrumented-or-not diamond.

mod diamond;
mod dfs;
mod normalize;

pub use diamond::rewrite_scope_regions;
pub use dfs::{find_scope_regions, ScopeRegion};
pub use normalize::normalize_scope_boundaries;
