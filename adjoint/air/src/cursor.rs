//! Insertion points into a [`Function`] body.

use crate::builder::{InsertBuilder, InstInserterBase};
use crate::dfg::DataFlowGraph;
use crate::layout::Layout;
use crate::{Block, Function, Inst};

/// Where a [`Cursor`] inserts new instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Detached. Inserting panics.
    Nowhere,
    /// New instructions are placed directly before this instruction.
    At(Inst),
    /// The top of a block. Inserting panics.
    Before(Block),
    /// New instructions are appended to this block.
    After(Block),
}

impl CursorPosition {
    pub fn block(self, layout: &Layout) -> Option<Block> {
        match self {
            CursorPosition::Nowhere => None,
            CursorPosition::At(inst) => layout.inst_block(inst),
            CursorPosition::Before(bb) | CursorPosition::After(bb) => Some(bb),
        }
    }
}

pub trait Cursor {
    fn position(&self) -> CursorPosition;

    fn set_position(&mut self, pos: CursorPosition);

    fn layout(&self) -> &Layout;

    fn layout_mut(&mut self) -> &mut Layout;

    fn at_position(mut self, pos: CursorPosition) -> Self
    where
        Self: Sized,
    {
        self.set_position(pos);
        self
    }

    fn at_bottom(mut self, bb: Block) -> Self
    where
        Self: Sized,
    {
        self.goto_bottom(bb);
        self
    }

    /// `inst` must already be part of the layout.
    fn goto_inst(&mut self, inst: Inst) {
        debug_assert!(self.layout().inst_block(inst).is_some(), "{inst} is detached");
        self.set_position(CursorPosition::At(inst));
    }

    fn goto_bottom(&mut self, bb: Block) {
        debug_assert!(self.layout().is_block_inserted(bb), "{bb} is detached");
        self.set_position(CursorPosition::After(bb));
    }

    fn insert_inst(&mut self, inst: Inst) {
        match self.position() {
            CursorPosition::At(before) => self.layout_mut().prepend_inst(inst, before),
            CursorPosition::After(bb) => self.layout_mut().append_inst_to_bb(inst, bb),
            pos => unreachable!("can not insert {inst} at {pos:?}"),
        }
    }
}

/// A cursor that owns a mutable borrow of the whole function so that
/// both the layout and the data flow graph can be edited through it.
pub struct FuncCursor<'f> {
    pos: CursorPosition,
    pub func: &'f mut Function,
}

impl<'f> FuncCursor<'f> {
    pub fn new(func: &'f mut Function) -> Self {
        FuncCursor { pos: CursorPosition::Nowhere, func }
    }

    pub fn ins(&mut self) -> InsertBuilder<'_, &mut FuncCursor<'f>> {
        InsertBuilder::new(self)
    }
}

impl Cursor for FuncCursor<'_> {
    fn position(&self) -> CursorPosition {
        self.pos
    }

    fn set_position(&mut self, pos: CursorPosition) {
        self.pos = pos
    }

    fn layout(&self) -> &Layout {
        &self.func.layout
    }

    fn layout_mut(&mut self) -> &mut Layout {
        &mut self.func.layout
    }
}

impl<'c, 'f> InstInserterBase<'c> for &'c mut FuncCursor<'f> {
    fn data_flow_graph(&self) -> &DataFlowGraph {
        &self.func.dfg
    }

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph {
        &mut self.func.dfg
    }

    fn insert_built_inst(self, inst: Inst) -> &'c mut DataFlowGraph {
        self.insert_inst(inst);
        &mut self.func.dfg
    }
}
