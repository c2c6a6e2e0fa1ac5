//! The pass's error taxonomy.
//!
//! Most surprising situations a compiler pass meets are *expected* here:
//! cross-module calls, indirect calls, inline asm, atomics, and unresolved
//! types are all absorbed by falling back to dynamic translation or
//! serialization, never by raising an error. Only two situations are fatal,
//! and both indicate the input module itself is malformed with respect to
//! the TM API contract.

use crate::ir::Block;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassError {
    /// A clone body contains an instruction kind the body instrumentor has
    /// no rule for at all (not even "leave it alone"). The programmer needs
    /// to mark the enclosing function pure, rename-substitute it, or move
    /// the construct out of the transactional path.
    #[error(
        "unsupported instruction `{opcode}` encountered while instrumenting function `{function}`"
    )]
    UnsupportedInstruction { function: String, opcode: String },

    /// A scope-begin call was never matched with a balanced scope-end on
    /// any traversal path, so its region was left with no end instruction.
    #[error(
        "malformed transactional scope nesting in function `{function}`: scope-begin in block {block} has no matching scope-end"
    )]
    MalformedScopeNesting { function: String, block: Block },
}

pub type PassResult<T> = Result<T, PassError>;
