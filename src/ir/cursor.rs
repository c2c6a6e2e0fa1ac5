//! A cursor for inserting instructions into a function, modeled on
//! Cranelift's `FuncCursor`: a position plus a function, with `insert`
//! honoring whatever that position means.

use crate::ir::entities::{Block, Inst, Value};
use crate::ir::function::{Function, InstructionData};
use crate::ir::types::Type;

/// Where a `FuncCursor` is currently pointing.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    Nowhere,
    /// New instructions are inserted immediately before this one.
    At(Inst),
    /// New instructions are appended to the end of this block.
    After(Block),
}

pub struct FuncCursor<'f> {
    pub func: &'f mut Function,
    pos: CursorPosition,
}

impl<'f> FuncCursor<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        Self {
            func,
            pos: CursorPosition::Nowhere,
        }
    }

    pub fn at_inst(mut self, inst: Inst) -> Self {
        self.pos = CursorPosition::At(inst);
        self
    }

    pub fn after_block(mut self, block: Block) -> Self {
        self.pos = CursorPosition::After(block);
        self
    }

    pub fn position(&self) -> CursorPosition {
        self.pos
    }

    pub fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos;
    }

    /// Insert `data` at the cursor's position and return its `Inst`. Does
    /// not move the cursor: repeated calls with `At(inst)` keep inserting
    /// immediately before `inst`, so callers building up a sequence get it
    /// in the order they called `insert`.
    pub fn insert(&mut self, data: InstructionData) -> Inst {
        let inst = self.func.insts.push(data);
        match self.pos {
            CursorPosition::At(before) => self.func.layout.insert_inst_before(before, inst),
            CursorPosition::After(block) => self.func.layout.append_inst(block, inst),
            CursorPosition::Nowhere => panic!("cursor has no insertion point"),
        }
        inst
    }

    pub fn make_value(&mut self, ty: Type) -> Value {
        self.func.create_value(ty)
    }

    /// Insert `data` and, when `result_ty` is `Some`, create the value it
    /// defines and record the def/use link for later lookup with
    /// `Function::producer`.
    pub fn insert_with_result(
        &mut self,
        data: InstructionData,
        result_ty: Option<Type>,
    ) -> (Inst, Option<Value>) {
        let inst = self.insert(data);
        let value = result_ty.map(|ty| {
            let v = self.func.create_value(ty);
            self.func.record_result(inst, v);
            v
        });
        (inst, value)
    }
}
