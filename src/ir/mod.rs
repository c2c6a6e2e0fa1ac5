//! The in-memory compiler IR the instrumentation pass rewrites.
//!
//! A `Module` owns a table of `Function`s; each `Function` that is a
//! definition owns a `Layout`-ordered sequence of `Block`s, each holding a
//! sequence of `Inst`s whose data lives in `Function::insts`. This mirrors
//! Cranelift's entity-reference design (`PrimaryMap` arenas addressed by
//! dense `u32` handles) rather than a tree of boxed nodes, so cloning,
//! splitting blocks, and rewriting instructions in place are all cheap and
//! never invalidate a reference held elsewhere in the pass.

pub mod cursor;
pub mod entities;
pub mod flowgraph;
pub mod function;
pub mod layout;
pub mod module;
pub mod types;

pub use cursor::{CursorPosition, FuncCursor};
pub use entities::{AnyEntity, Block, FuncId, Inst, Value};
pub use flowgraph::ControlFlowGraph;
pub use function::{
    AtomicRmwOp, BlockData, CallConv, Callee, Function, FunctionAttributes, InstructionData,
    IntrinsicKind, MemFlags, Signature, ValueList,
};
pub use layout::Layout;
pub use module::Module;
pub use types::{canonical_type, CanonicalType, Type};
