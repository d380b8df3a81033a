//! AIR (adjoint IR)
//!
//! A small typed [SSA] intermediate representation modeled after the IR in [`cranelift`] and
//! [`llvm`]. It contains exactly what is needed to express primal functions and the adjoint code
//! generated for them:
//!
//! * typed pointers, vectors, arrays and (packed) structs with a data layout,
//! * floating point and integer arithmetic, loads and stores (including masked and atomic
//!   variants), stack and heap allocations,
//! * alias scope, invariant group and dereferenceability metadata.
//!
//! Instructions live in the [`DataFlowGraph`], their order is determined by the [`Layout`].
//! New instructions are inserted with a [`FuncCursor`](cursor::FuncCursor) and the
//! [`InstBuilder`](builder::InstBuilder) helpers.
//!
//! [SSA]: https://en.wikipedia.org/wiki/Static_single_assignment_form
//! [`cranelift`]: https://cranelift.dev
//! [`llvm`]: https://llvm.org

mod dfg;
mod entities;
mod instructions;
mod layout;
mod types;

pub mod builder;
pub mod cursor;
pub mod flowgraph;
pub mod metadata;
pub mod write;

use core::fmt;

use ahash::AHashMap;
use typed_index_collections::TiVec;

pub use crate::dfg::{Const, DataFlowGraph, DfgValues, DisplayConst, DisplayInst, ValueDef};
pub use crate::entities::{
    AliasDomain, AliasScope, AnyEntity, Block, Inst, InvariantGroup, Param, TbaaTag, Type, Value,
};
pub use crate::flowgraph::ControlFlowGraph;
pub use crate::instructions::{AtomicOrdering, InstructionData, Opcode};
pub use crate::layout::{InstIter, Layout};
pub use crate::types::{DisplayType, TypeData, TypeTable};
pub use stdx::Ieee64;

/// The architecture a function is compiled for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Arch {
    #[default]
    X86_64,
    Aarch64,
    Nvptx,
    Nvptx64,
    Amdgcn,
}

impl Arch {
    /// GPU targets run every thread with its own private stack, so stack memory can never be
    /// accessed concurrently.
    pub fn is_gpu(self) -> bool {
        matches!(self, Arch::Nvptx | Arch::Nvptx64 | Arch::Amdgcn)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Nvptx => "nvptx",
            Arch::Nvptx64 => "nvptx64",
            Arch::Amdgcn => "amdgcn",
        };
        f.write_str(name)
    }
}

/// A function body together with everything needed to print and run it.
///
/// Cloning keeps every entity reference intact, which is what the adjoint clone relies on.
#[derive(Clone, Default)]
pub struct Function {
    pub name: String,
    pub dfg: DataFlowGraph,
    pub layout: Layout,
    /// Debug locations carried over from the primal, see [`SourceLoc`].
    pub srclocs: TiVec<Inst, SourceLoc>,
    pub params: TiVec<Param, Value>,
    pub target: Arch,

    value_names: AHashMap<Value, String>,
    block_names: AHashMap<Block, String>,
}

impl Function {
    pub fn new() -> Function {
        Function::default()
    }

    pub fn with_name(name: String) -> Function {
        Function { name, ..Function::default() }
    }

    /// The textual form of the whole function, see [`write::write_function`].
    pub fn to_debug_string(&self) -> String {
        format!("{self:?}")
    }

    /// Adds a new parameter of type `ty` to the function.
    pub fn append_param(&mut self, ty: Type) -> Value {
        let param = self.params.next_key();
        let val = self.dfg.make_param(param, ty);
        self.params.push(val);
        val
    }

    pub fn param(&self, param: Param) -> Value {
        self.params[param]
    }

    pub fn set_value_name(&mut self, val: Value, name: String) {
        self.value_names.insert(val, name);
    }

    pub fn value_name(&self, val: Value) -> Option<&str> {
        self.value_names.get(&val).map(String::as_str)
    }

    pub fn set_block_name(&mut self, block: Block, name: String) {
        self.block_names.insert(block, name);
    }

    pub fn block_name(&self, block: Block) -> Option<&str> {
        self.block_names.get(&block).map(String::as_str)
    }

    /// Returns the name of `block` or its entity reference for unnamed blocks.
    pub fn block_label(&self, block: Block) -> String {
        match self.block_name(block) {
            Some(name) => name.to_owned(),
            None => block.to_string(),
        }
    }

    /// The last instruction of `block` if it is a terminator.
    pub fn block_terminator(&self, block: Block) -> Option<Inst> {
        self.layout.last_inst(block).filter(|&inst| self.dfg.insts[inst].is_terminator())
    }

    pub fn srcloc(&self, inst: Inst) -> SourceLoc {
        self.srclocs.get(inst).copied().unwrap_or(SourceLoc::UNKNOWN)
    }

    pub fn set_srcloc(&mut self, inst: Inst, loc: SourceLoc) {
        let needed = usize::from(inst) + 1;
        if self.srclocs.len() < needed {
            self.srclocs.resize(needed, SourceLoc::UNKNOWN);
        }
        self.srclocs[inst] = loc;
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write::write_function(f, self)
    }
}

/// Opaque debug location of an instruction. Copied along with the instruction, never inspected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceLoc(u32);

impl SourceLoc {
    pub const UNKNOWN: SourceLoc = SourceLoc(u32::MAX);

    pub fn new(raw: u32) -> SourceLoc {
        debug_assert_ne!(raw, u32::MAX, "reserved for unknown locations");
        SourceLoc(raw)
    }

    pub fn is_default(self) -> bool {
        self == SourceLoc::UNKNOWN
    }
}

impl Default for SourceLoc {
    fn default() -> SourceLoc {
        SourceLoc::UNKNOWN
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("!dbg ?")
        } else {
            write!(f, "!dbg {}", self.0)
        }
    }
}
