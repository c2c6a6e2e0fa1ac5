//! `Function`: the owner of a linear sequence of basic blocks and the
//! instructions inside them.

use crate::ir::entities::{Block, FuncId, Inst, Value};
use crate::ir::layout::Layout;
use crate::ir::types::Type;
use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;
use std::collections::HashMap;

/// A small, fixed-size operand list. Every call/intrinsic/branch operand
/// list in practice has a handful of entries; `SmallVec` keeps the common
/// case off the heap, mirroring how Cranelift sizes its own value lists.
pub type ValueList = SmallVec<[Value; 4]>;

/// The calling convention of a function or call site. Only matters insofar
/// as a rewritten call must preserve it.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum CallConv {
    #[default]
    C,
    Fast,
}

#[derive(Clone, Debug, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Option<Type>,
    pub call_conv: CallConv,
}

impl Signature {
    pub fn new(call_conv: CallConv) -> Self {
        Self {
            params: Vec::new(),
            ret: None,
            call_conv,
        }
    }
}

/// Source-level annotations, already lifted from the module's global
/// annotation array onto the function they describe (see
/// `annotations::lift`).
#[derive(Clone, Debug, Default)]
pub struct FunctionAttributes {
    pub tm_function: bool,
    pub tm_pure: bool,
    /// The `<name>` payload of a `tm_rename_<name>` annotation.
    pub tm_rename: Option<String>,
    pub tm_ctor: bool,
}

#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub params: Vec<Value>,
}

/// Memory-access qualifiers. A plain access has neither flag set; setting
/// either one forces the body instrumentor to serialize rather than route
/// the access through a typed helper.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct MemFlags {
    pub volatile: bool,
    pub atomic: bool,
}

impl MemFlags {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn is_plain(&self) -> bool {
        !self.volatile && !self.atomic
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AtomicRmwOp {
    Xchg,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Nand,
    Max,
    Min,
    UMax,
    UMin,
}

/// The target of a call or invoke.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Callee {
    /// A resolvable function. Its `Function::is_definition()` tells us
    /// whether this is a same-module call (which can be redirected to a
    /// clone) or a cross-module one (which needs dynamic translation).
    Direct(FuncId),
    /// A function pointer held in a value; always needs dynamic
    /// translation.
    Indirect(Value),
}

/// The serialization-or-not classification of an otherwise-unhandled
/// intrinsic. Only `Other` intrinsics are left completely alone; every
/// other kind forces the transaction irrevocable.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IntrinsicKind {
    CacheClear,
    TrampolineSetup,
    Trap,
    AtomicMemIntrinsic,
    RelativeLoad,
    MaskedLoadOrStore,
    MaskedGatherOrScatter,
    Other,
}

impl IntrinsicKind {
    pub fn forces_serialization(self) -> bool {
        !matches!(self, IntrinsicKind::Other)
    }
}

/// The tagged-variant instruction representation the pass operates on.
///
/// Every instruction kind the pass needs to reason about (§4.6 / §4.7 of the
/// design) gets its own variant; everything it is allowed to leave alone
/// (arithmetic, casts, vector ops, aggregate extract/insert, `getelementptr`,
/// `alloca`, compares, `select`, `phi`, landing pads, ordinary terminators)
/// collapses into `Other`. `Unsupported` exists only so a malformed or
/// not-yet-modeled host IR node can be represented and rejected by the body
/// instrumentor instead of silently mishandled.
#[derive(Clone, Debug)]
pub enum InstructionData {
    Load {
        ptr: Value,
        ty: Type,
        flags: MemFlags,
    },
    Store {
        value: Value,
        ptr: Value,
        flags: MemFlags,
    },
    AtomicRmw {
        ptr: Value,
        value: Value,
        ty: Type,
        op: AtomicRmwOp,
    },
    AtomicCas {
        ptr: Value,
        expected: Value,
        replacement: Value,
        ty: Type,
    },
    Fence,
    Call {
        callee: Callee,
        args: ValueList,
        result_ty: Type,
    },
    Invoke {
        callee: Callee,
        args: ValueList,
        result_ty: Type,
        normal: Block,
        unwind: Block,
    },
    InlineAsm {
        args: ValueList,
    },
    Intrinsic {
        name: String,
        kind: IntrinsicKind,
        args: ValueList,
        result_ty: Type,
    },
    /// Inserted by the pass itself ahead of typed helper calls that need a
    /// pointer-shaped operand bitcast to/from an opaque pointer.
    Bitcast {
        value: Value,
        to: Type,
    },
    /// Materializes the address of `func` as a pointer value. This is how a
    /// function used as a first-class value (a C-API region-launch
    /// argument, a lambda table entry) shows up as an operand rather than as
    /// a `Callee::Direct` at a call site.
    FuncAddr {
        func: FuncId,
    },
    Jump {
        dest: Block,
    },
    Branch {
        cond: Value,
        then_block: Block,
        else_block: Block,
    },
    Return {
        value: Option<Value>,
    },
    Unreachable,
    Phi {
        incoming: Vec<(Block, Value)>,
    },
    Other {
        opcode: String,
        args: ValueList,
    },
    /// A host IR node of a kind the pass does not recognize at all. Seeing
    /// one of these inside a clone body is a fatal error.
    Unsupported {
        opcode: String,
    },
}

impl InstructionData {
    pub fn opcode_name(&self) -> &str {
        match self {
            InstructionData::Load { .. } => "load",
            InstructionData::Store { .. } => "store",
            InstructionData::AtomicRmw { .. } => "atomicrmw",
            InstructionData::AtomicCas { .. } => "cmpxchg",
            InstructionData::Fence => "fence",
            InstructionData::Call { .. } => "call",
            InstructionData::Invoke { .. } => "invoke",
            InstructionData::InlineAsm { .. } => "inline_asm",
            InstructionData::Intrinsic { .. } => "intrinsic",
            InstructionData::Bitcast { .. } => "bitcast",
            InstructionData::FuncAddr { .. } => "func_addr",
            InstructionData::Jump { .. } => "jump",
            InstructionData::Branch { .. } => "br",
            InstructionData::Return { .. } => "ret",
            InstructionData::Unreachable => "unreachable",
            InstructionData::Phi { .. } => "phi",
            InstructionData::Other { opcode, .. } => opcode,
            InstructionData::Unsupported { opcode } => opcode,
        }
    }

    /// The normal-path successor of a terminator/invoke, if any.
    pub fn normal_successor(&self) -> Option<Block> {
        match *self {
            InstructionData::Jump { dest } => Some(dest),
            InstructionData::Branch { then_block, .. } => Some(then_block),
            InstructionData::Invoke { normal, .. } => Some(normal),
            _ => None,
        }
    }

    pub fn successors(&self) -> SmallVec<[Block; 2]> {
        match *self {
            InstructionData::Jump { dest } => smallvec::smallvec![dest],
            InstructionData::Branch {
                then_block,
                else_block,
                ..
            } => smallvec::smallvec![then_block, else_block],
            InstructionData::Invoke { normal, unwind, .. } => smallvec::smallvec![normal, unwind],
            _ => SmallVec::new(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionData::Jump { .. }
                | InstructionData::Branch { .. }
                | InstructionData::Invoke { .. }
                | InstructionData::Return { .. }
                | InstructionData::Unreachable
        )
    }
}

/// A function: identity, signature, attributes, and (if a definition) the
/// basic blocks and instructions making up its body.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub attrs: FunctionAttributes,
    is_definition: bool,
    pub blocks: PrimaryMap<Block, BlockData>,
    pub insts: PrimaryMap<Inst, InstructionData>,
    pub values: PrimaryMap<Value, Type>,
    pub layout: Layout,
    /// The value, if any, an instruction defines. Calls, loads, and
    /// `func_addr` are the usual definers; stores, jumps, and fences define
    /// nothing.
    results: HashMap<Inst, Value>,
    /// The inverse of `results`, so a use can be traced back to its definer
    /// without a linear scan.
    value_def: HashMap<Value, Inst>,
}

impl Function {
    pub fn new(name: String, signature: Signature, is_definition: bool) -> Self {
        Self {
            name,
            signature,
            attrs: FunctionAttributes::default(),
            is_definition,
            blocks: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            values: PrimaryMap::new(),
            layout: Layout::new(),
            results: HashMap::new(),
            value_def: HashMap::new(),
        }
    }

    /// Record that `inst` defines `value`. Called by `FuncCursor` right
    /// after an instruction that produces a result is inserted.
    pub fn record_result(&mut self, inst: Inst, value: Value) {
        self.results.insert(inst, value);
        self.value_def.insert(value, inst);
    }

    pub fn result_of(&self, inst: Inst) -> Option<Value> {
        self.results.get(&inst).copied()
    }

    /// The instruction that defines `value`, if any is on record. Block
    /// parameters and pass-supplied constants have no recorded definer.
    pub fn producer(&self, value: Value) -> Option<Inst> {
        self.value_def.get(&value).copied()
    }

    pub fn is_definition(&self) -> bool {
        self.is_definition
    }

    pub fn create_block(&mut self) -> Block {
        let block = self.blocks.push(BlockData::default());
        self.layout.append_block(block);
        block
    }

    /// Insert a new block right after `after` in program order, without
    /// touching `after`'s own instructions.
    pub fn create_block_after(&mut self, after: Block) -> Block {
        let block = self.blocks.push(BlockData::default());
        self.layout.insert_block_after(after, block);
        block
    }

    /// Insert a new block right before `before` in program order. Used by
    /// the lambda boundary guard (§4.10), which must make its predicate
    /// block the function's new entry.
    pub fn create_block_before(&mut self, before: Block) -> Block {
        let block = self.blocks.push(BlockData::default());
        self.layout.insert_block_before(before, block);
        block
    }

    pub fn create_value(&mut self, ty: Type) -> Value {
        self.values.push(ty)
    }

    pub fn value_type(&self, v: Value) -> Type {
        self.values[v]
    }

    pub fn append_param(&mut self, block: Block, ty: Type) -> Value {
        let v = self.create_value(ty);
        self.blocks[block].params.push(v);
        v
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.layout.entry_block()
    }

    /// Every instruction in the function, in program order, paired with its
    /// enclosing block.
    pub fn all_insts(&self) -> Vec<(Block, Inst)> {
        let mut out = Vec::new();
        for block in self.layout.blocks() {
            for &inst in self.layout.block_insts(block) {
                out.push((block, inst));
            }
        }
        out
    }
}
