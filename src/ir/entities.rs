//! Entity references used throughout the in-memory compiler IR.
//!
//! Instructions, blocks and values are not addressed through Rust references.
//! Like Cranelift's own IR, every reference is a newtype wrapping a `u32`
//! index into some arena owned by the enclosing `Function` (or, for
//! `FuncId`, owned by the enclosing `Module`). This keeps the IR cheaply
//! `Copy`, avoids aliasing issues while the pass mutates the graph it is
//! walking, and gives each entity kind its own type so a `Block` can never be
//! passed where an `Inst` is expected.

use cranelift_entity::entity_impl;
use core::fmt;

/// A reference to a function within a `Module`.
///
/// Every direct call in the IR ultimately resolves to a `FuncId`, whether or
/// not that function has a body in the current module. Cross-module calls
/// are represented by a `FuncId` whose `Function::is_definition()` is
/// `false`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(u32);
entity_impl!(FuncId, "fn");

/// A reference to a basic block within a function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to an instruction within a function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A reference to an SSA value: a block parameter or an instruction result.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// Any of the entities defined in this module, for error messages and
/// diagnostics that need to name an arbitrary IR node.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum AnyEntity {
    Function(FuncId),
    Block(Block),
    Inst(Inst),
    Value(Value),
}

impl fmt::Display for AnyEntity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            AnyEntity::Function(r) => write!(f, "{r}"),
            AnyEntity::Block(r) => write!(f, "{r}"),
            AnyEntity::Inst(r) => write!(f, "{r}"),
            AnyEntity::Value(r) => write!(f, "{r}"),
        }
    }
}

impl From<FuncId> for AnyEntity {
    fn from(r: FuncId) -> Self {
        AnyEntity::Function(r)
    }
}
impl From<Block> for AnyEntity {
    fn from(r: Block) -> Self {
        AnyEntity::Block(r)
    }
}
impl From<Inst> for AnyEntity {
    fn from(r: Inst) -> Self {
        AnyEntity::Inst(r)
    }
}
impl From<Value> for AnyEntity {
    fn from(r: Value) -> Self {
        AnyEntity::Value(r)
    }
}
