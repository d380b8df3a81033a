use std::fmt;

use crate::{Block, Type, Value};

#[cfg(test)]
mod tests;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    Fneg,
    Fadd,
    Fsub,
    Fmul,
    Fdiv,
    Iadd,
    Isub,
    Imul,
    Ieq,
    Ine,
    Ilt,
    Igt,
    Feq,
    Fne,
    Flt,
    Fgt,
    Bitcast,
    PtrCast,
    AddrSpaceCast,
    Select,
    Alloca,
    Malloc,
    Free,
    Load,
    Store,
    MaskedLoad,
    MaskedStore,
    AtomicFadd,
    Gep,
    ExtractValue,
    InsertValue,
    ExtractElement,
    InsertElement,
    Phi,
    Jmp,
    Br,
    Ret,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Fneg => "fneg",
            Opcode::Fadd => "fadd",
            Opcode::Fsub => "fsub",
            Opcode::Fmul => "fmul",
            Opcode::Fdiv => "fdiv",
            Opcode::Iadd => "iadd",
            Opcode::Isub => "isub",
            Opcode::Imul => "imul",
            Opcode::Ieq => "ieq",
            Opcode::Ine => "ine",
            Opcode::Ilt => "ilt",
            Opcode::Igt => "igt",
            Opcode::Feq => "feq",
            Opcode::Fne => "fne",
            Opcode::Flt => "flt",
            Opcode::Fgt => "fgt",
            Opcode::Bitcast => "bitcast",
            Opcode::PtrCast => "ptrcast",
            Opcode::AddrSpaceCast => "addrspacecast",
            Opcode::Select => "select",
            Opcode::Alloca => "alloca",
            Opcode::Malloc => "malloc",
            Opcode::Free => "free",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::MaskedLoad => "masked_load",
            Opcode::MaskedStore => "masked_store",
            Opcode::AtomicFadd => "atomic_fadd",
            Opcode::Gep => "gep",
            Opcode::ExtractValue => "extractvalue",
            Opcode::InsertValue => "insertvalue",
            Opcode::ExtractElement => "extractelement",
            Opcode::InsertElement => "insertelement",
            Opcode::Phi => "phi",
            Opcode::Jmp => "jmp",
            Opcode::Br => "br",
            Opcode::Ret => "ret",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Opcode::Ieq
                | Opcode::Ine
                | Opcode::Ilt
                | Opcode::Igt
                | Opcode::Feq
                | Opcode::Fne
                | Opcode::Flt
                | Opcode::Fgt
        )
    }

    pub fn is_cast(self) -> bool {
        matches!(self, Opcode::Bitcast | Opcode::PtrCast | Opcode::AddrSpaceCast)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory ordering of atomic read-modify-write instructions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AtomicOrdering {
    Monotonic,
    SeqCst,
}

impl fmt::Display for AtomicOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicOrdering::Monotonic => f.write_str("monotonic"),
            AtomicOrdering::SeqCst => f.write_str("seq_cst"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstructionData {
    Unary { opcode: Opcode, arg: Value },
    Binary { opcode: Opcode, args: [Value; 2] },
    /// `bitcast`, `ptrcast` and `addrspacecast` to `ty`.
    Cast { opcode: Opcode, arg: Value, ty: Type },
    /// `cond, then_val, else_val`
    Select { args: [Value; 3] },
    Alloca { ty: Type, align: u32 },
    /// Heap allocation of `arg` bytes producing a `ptr<ty>`.
    Malloc { arg: Value, ty: Type },
    Load { arg: Value, align: u32 },
    /// `val, ptr`
    Store { args: [Value; 2], align: u32 },
    /// `ptr, mask, passthru`
    MaskedLoad { args: [Value; 3], align: u32 },
    /// `val, ptr, mask`
    MaskedStore { args: [Value; 3], align: u32 },
    /// `ptr, val`
    AtomicRmw { opcode: Opcode, args: [Value; 2], align: u32, ordering: AtomicOrdering },
    /// The base pointer followed by the indices.
    Gep { args: Box<[Value]>, inbounds: bool },
    ExtractValue { arg: Value, idx: u32 },
    /// `aggregate, val`
    InsertValue { args: [Value; 2], idx: u32 },
    ExtractElement { arg: Value, idx: u32 },
    /// `vector, val`
    InsertElement { args: [Value; 2], idx: u32 },
    PhiNode { args: Box<[Value]>, blocks: Box<[Block]> },
    Jump { destination: Block },
    Branch { cond: Value, then_dst: Block, else_dst: Block },
    Ret { arg: Option<Value> },
}

impl InstructionData {
    pub fn opcode(&self) -> Opcode {
        match self {
            InstructionData::Unary { opcode, .. }
            | InstructionData::Binary { opcode, .. }
            | InstructionData::Cast { opcode, .. }
            | InstructionData::AtomicRmw { opcode, .. } => *opcode,
            InstructionData::Select { .. } => Opcode::Select,
            InstructionData::Alloca { .. } => Opcode::Alloca,
            InstructionData::Malloc { .. } => Opcode::Malloc,
            InstructionData::Load { .. } => Opcode::Load,
            InstructionData::Store { .. } => Opcode::Store,
            InstructionData::MaskedLoad { .. } => Opcode::MaskedLoad,
            InstructionData::MaskedStore { .. } => Opcode::MaskedStore,
            InstructionData::Gep { .. } => Opcode::Gep,
            InstructionData::ExtractValue { .. } => Opcode::ExtractValue,
            InstructionData::InsertValue { .. } => Opcode::InsertValue,
            InstructionData::ExtractElement { .. } => Opcode::ExtractElement,
            InstructionData::InsertElement { .. } => Opcode::InsertElement,
            InstructionData::PhiNode { .. } => Opcode::Phi,
            InstructionData::Jump { .. } => Opcode::Jmp,
            InstructionData::Branch { .. } => Opcode::Br,
            InstructionData::Ret { .. } => Opcode::Ret,
        }
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, InstructionData::PhiNode { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstructionData::Branch { .. } | InstructionData::Jump { .. } | InstructionData::Ret { .. }
        )
    }

    /// The value arguments of this instruction.
    pub fn arguments(&self) -> &[Value] {
        match self {
            InstructionData::Unary { arg, .. }
            | InstructionData::Cast { arg, .. }
            | InstructionData::Malloc { arg, .. }
            | InstructionData::Load { arg, .. }
            | InstructionData::ExtractValue { arg, .. }
            | InstructionData::ExtractElement { arg, .. }
            | InstructionData::Branch { cond: arg, .. }
            | InstructionData::Ret { arg: Some(arg) } => std::slice::from_ref(arg),
            InstructionData::Binary { args, .. }
            | InstructionData::Store { args, .. }
            | InstructionData::AtomicRmw { args, .. }
            | InstructionData::InsertValue { args, .. }
            | InstructionData::InsertElement { args, .. } => args,
            InstructionData::Select { args }
            | InstructionData::MaskedLoad { args, .. }
            | InstructionData::MaskedStore { args, .. } => args,
            InstructionData::Gep { args, .. } | InstructionData::PhiNode { args, .. } => args,
            InstructionData::Alloca { .. }
            | InstructionData::Jump { .. }
            | InstructionData::Ret { arg: None } => &[],
        }
    }

    /// Get mutable references to the value arguments of this instruction.
    pub fn arguments_mut(&mut self) -> &mut [Value] {
        match self {
            InstructionData::Unary { arg, .. }
            | InstructionData::Cast { arg, .. }
            | InstructionData::Malloc { arg, .. }
            | InstructionData::Load { arg, .. }
            | InstructionData::ExtractValue { arg, .. }
            | InstructionData::ExtractElement { arg, .. }
            | InstructionData::Branch { cond: arg, .. }
            | InstructionData::Ret { arg: Some(arg) } => std::slice::from_mut(arg),
            InstructionData::Binary { args, .. }
            | InstructionData::Store { args, .. }
            | InstructionData::AtomicRmw { args, .. }
            | InstructionData::InsertValue { args, .. }
            | InstructionData::InsertElement { args, .. } => args,
            InstructionData::Select { args }
            | InstructionData::MaskedLoad { args, .. }
            | InstructionData::MaskedStore { args, .. } => args,
            InstructionData::Gep { args, .. } | InstructionData::PhiNode { args, .. } => args,
            InstructionData::Alloca { .. }
            | InstructionData::Jump { .. }
            | InstructionData::Ret { arg: None } => &mut [],
        }
    }

    /// The pointer operand of memory accesses.
    pub fn memory_pointer(&self) -> Option<Value> {
        match *self {
            InstructionData::Load { arg, .. } => Some(arg),
            InstructionData::Store { args: [_, ptr], .. }
            | InstructionData::MaskedStore { args: [_, ptr, _], .. } => Some(ptr),
            InstructionData::MaskedLoad { args: [ptr, _, _], .. }
            | InstructionData::AtomicRmw { args: [ptr, _], .. } => Some(ptr),
            _ => None,
        }
    }

    /// Calls `f` for every successor of a terminator (once per distinct block).
    pub fn visit_successors(&self, mut f: impl FnMut(Block)) {
        match *self {
            InstructionData::Jump { destination } => f(destination),
            InstructionData::Branch { then_dst, else_dst, .. } => {
                f(then_dst);
                if else_dst != then_dst {
                    f(else_dst)
                }
            }
            _ => (),
        }
    }
}
