//! Instruction builder.
//!
//! A `Builder` provides a convenient interface for inserting instructions into a function. The
//! helpers in [`InstBuilder`] compute the result type of each instruction from the types of its
//! operands.

use core::marker::PhantomData;

use crate::instructions::AtomicOrdering;
use crate::{Block, DataFlowGraph, Inst, InstructionData, Opcode, Type, TypeData, Value};

#[cfg(test)]
mod tests;

/// Base trait for instruction builders.
///
/// The `InstBuilderBase` trait provides the basic functionality required by the methods of the
/// `InstBuilder` trait. Any data type that implements `InstBuilderBase` also gets all the methods
/// of the `InstBuilder` trait.
pub trait InstBuilderBase<'f>: Sized {
    fn data_flow_graph(&self) -> &DataFlowGraph;

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph;

    /// Insert an instruction with a result of type `ty` (if any) and return a reference to it,
    /// consuming the builder.
    fn build(self, data: InstructionData, ty: Option<Type>) -> (Inst, &'f mut DataFlowGraph);
}

/// Base trait for instruction inserters.
///
/// An instruction inserter can be adapted into an instruction builder by wrapping it in an
/// `InsertBuilder`.
pub trait InstInserterBase<'f>: Sized {
    fn data_flow_graph(&self) -> &DataFlowGraph;

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph;

    /// Insert a new instruction which belongs to the DFG.
    fn insert_built_inst(self, inst: Inst) -> &'f mut DataFlowGraph;
}

/// Builder that inserts an instruction at the current position.
pub struct InsertBuilder<'f, IIB: InstInserterBase<'f>> {
    inserter: IIB,
    unused: PhantomData<&'f u32>,
}

impl<'f, IIB: InstInserterBase<'f>> InsertBuilder<'f, IIB> {
    pub fn new(inserter: IIB) -> Self {
        Self { inserter, unused: PhantomData }
    }
}

impl<'f, IIB: InstInserterBase<'f>> InstBuilderBase<'f> for InsertBuilder<'f, IIB> {
    fn data_flow_graph(&self) -> &DataFlowGraph {
        self.inserter.data_flow_graph()
    }

    fn data_flow_graph_mut(&mut self) -> &mut DataFlowGraph {
        self.inserter.data_flow_graph_mut()
    }

    fn build(mut self, data: InstructionData, ty: Option<Type>) -> (Inst, &'f mut DataFlowGraph) {
        let inst = self.inserter.data_flow_graph_mut().make_inst(data, ty);
        (inst, self.inserter.insert_built_inst(inst))
    }
}

/// Any type implementing `InstBuilderBase` gets all the `InstBuilder` methods for free.
impl<'f, T: InstBuilderBase<'f>> InstBuilder<'f> for T {}

fn build_value<'f>(
    builder: impl InstBuilderBase<'f>,
    data: InstructionData,
    ty: Type,
) -> Value {
    let (inst, dfg) = builder.build(data, Some(ty));
    dfg.first_result(inst)
}

pub trait InstBuilder<'f>: InstBuilderBase<'f> {
    fn unary(self, opcode: Opcode, arg: Value) -> Value {
        let ty = self.data_flow_graph().value_type(arg);
        build_value(self, InstructionData::Unary { opcode, arg }, ty)
    }

    fn binary(self, opcode: Opcode, lhs: Value, rhs: Value) -> Value {
        let ty = self.data_flow_graph().value_type(lhs);
        debug_assert_eq!(
            ty,
            self.data_flow_graph().value_type(rhs),
            "operand types of {opcode} {lhs}, {rhs} differ"
        );
        build_value(self, InstructionData::Binary { opcode, args: [lhs, rhs] }, ty)
    }

    fn fneg(self, arg: Value) -> Value {
        self.unary(Opcode::Fneg, arg)
    }

    fn fadd(self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Fadd, lhs, rhs)
    }

    fn fsub(self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Fsub, lhs, rhs)
    }

    fn fmul(self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Fmul, lhs, rhs)
    }

    fn fdiv(self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Fdiv, lhs, rhs)
    }

    fn iadd(self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Iadd, lhs, rhs)
    }

    fn isub(self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Isub, lhs, rhs)
    }

    fn imul(self, lhs: Value, rhs: Value) -> Value {
        self.binary(Opcode::Imul, lhs, rhs)
    }

    /// Comparisons produce `i1` (or a vector of `i1` for vector operands).
    fn cmp(mut self, opcode: Opcode, lhs: Value, rhs: Value) -> Value {
        debug_assert!(opcode.is_comparison());
        let dfg = self.data_flow_graph_mut();
        let i1 = dfg.types.i1();
        let ty = match dfg.types[dfg.value_type(lhs)] {
            TypeData::Vector { len, .. } => dfg.types.vector(i1, len),
            _ => i1,
        };
        build_value(self, InstructionData::Binary { opcode, args: [lhs, rhs] }, ty)
    }

    fn cast(self, opcode: Opcode, arg: Value, ty: Type) -> Value {
        debug_assert!(opcode.is_cast());
        build_value(self, InstructionData::Cast { opcode, arg, ty }, ty)
    }

    fn bitcast(self, arg: Value, ty: Type) -> Value {
        debug_assert!(
            self.data_flow_graph().types.bitcast_is_valid(self.data_flow_graph().value_type(arg), ty),
            "invalid bitcast of {arg} to {}",
            self.data_flow_graph().types.display(ty)
        );
        self.cast(Opcode::Bitcast, arg, ty)
    }

    /// Changes the pointee type of a pointer.
    fn ptrcast(self, arg: Value, ty: Type) -> Value {
        debug_assert_eq!(
            self.data_flow_graph().types.addr_space(self.data_flow_graph().value_type(arg)),
            self.data_flow_graph().types.addr_space(ty)
        );
        self.cast(Opcode::PtrCast, arg, ty)
    }

    fn addrspacecast(self, arg: Value, ty: Type) -> Value {
        self.cast(Opcode::AddrSpaceCast, arg, ty)
    }

    fn select(self, cond: Value, then_val: Value, else_val: Value) -> Value {
        let ty = self.data_flow_graph().value_type(then_val);
        build_value(self, InstructionData::Select { args: [cond, then_val, else_val] }, ty)
    }

    fn alloca(mut self, ty: Type, align: u32) -> Value {
        let ptr = self.data_flow_graph_mut().types.ptr(ty);
        build_value(self, InstructionData::Alloca { ty, align }, ptr)
    }

    /// Allocates `size` bytes on the heap.
    fn malloc(mut self, size: Value, ty: Type) -> Value {
        let ptr = self.data_flow_graph_mut().types.ptr(ty);
        build_value(self, InstructionData::Malloc { arg: size, ty }, ptr)
    }

    fn free(self, ptr: Value) -> Inst {
        self.build(InstructionData::Unary { opcode: Opcode::Free, arg: ptr }, None).0
    }

    fn load(self, ptr: Value, align: u32) -> Value {
        let ty = self.data_flow_graph().pointee_type(ptr);
        build_value(self, InstructionData::Load { arg: ptr, align }, ty)
    }

    fn store(self, val: Value, ptr: Value, align: u32) -> Inst {
        debug_assert_eq!(
            self.data_flow_graph().value_type(val),
            self.data_flow_graph().pointee_type(ptr),
            "type mismatch in store of {val} to {ptr}"
        );
        self.build(InstructionData::Store { args: [val, ptr], align }, None).0
    }

    /// Loads the lanes enabled by `mask` from `ptr`, disabled lanes are taken from `passthru`.
    fn masked_load(self, ptr: Value, mask: Value, passthru: Value, align: u32) -> Value {
        let ty = self.data_flow_graph().value_type(passthru);
        build_value(self, InstructionData::MaskedLoad { args: [ptr, mask, passthru], align }, ty)
    }

    fn masked_store(self, val: Value, ptr: Value, mask: Value, align: u32) -> Inst {
        self.build(InstructionData::MaskedStore { args: [val, ptr, mask], align }, None).0
    }

    fn atomic_fadd(self, ptr: Value, val: Value, align: u32, ordering: AtomicOrdering) -> Value {
        let ty = self.data_flow_graph().value_type(val);
        let data = InstructionData::AtomicRmw {
            opcode: Opcode::AtomicFadd,
            args: [ptr, val],
            align,
            ordering,
        };
        build_value(self, data, ty)
    }

    /// Computes the address of an element. The first index steps over whole pointees, the
    /// remaining indices select members of the (nested) aggregate. Struct indices must be
    /// constants.
    fn gep(mut self, base: Value, indices: &[Value], inbounds: bool) -> Value {
        let dfg = self.data_flow_graph_mut();
        let base_ty = dfg.value_type(base);
        let addr_space = dfg.types.addr_space(base_ty).unwrap_or(0);
        let mut ty = dfg.pointee_type(base);
        for &idx in indices.iter().skip(1) {
            ty = match dfg.types[ty] {
                TypeData::Struct { .. } => match dfg.as_int_const(idx) {
                    Some(field) => dfg.types.member(ty, field as u32),
                    None => unreachable!("struct index {idx} must be a constant"),
                },
                TypeData::Array { elem, .. } | TypeData::Vector { elem, .. } => elem,
                _ => unreachable!("gep into {}", dfg.types.display(ty)),
            };
        }
        let res_ty = dfg.types.ptr_in(ty, addr_space);
        let mut args = Vec::with_capacity(indices.len() + 1);
        args.push(base);
        args.extend_from_slice(indices);
        build_value(self, InstructionData::Gep { args: args.into_boxed_slice(), inbounds }, res_ty)
    }

    fn extract_value(self, agg: Value, idx: u32) -> Value {
        let dfg = self.data_flow_graph();
        let ty = dfg.types.member(dfg.value_type(agg), idx);
        build_value(self, InstructionData::ExtractValue { arg: agg, idx }, ty)
    }

    fn insert_value(self, agg: Value, val: Value, idx: u32) -> Value {
        let ty = self.data_flow_graph().value_type(agg);
        build_value(self, InstructionData::InsertValue { args: [agg, val], idx }, ty)
    }

    fn extract_element(self, vector: Value, idx: u32) -> Value {
        let dfg = self.data_flow_graph();
        let ty = dfg.types.member(dfg.value_type(vector), idx);
        build_value(self, InstructionData::ExtractElement { arg: vector, idx }, ty)
    }

    fn insert_element(self, vector: Value, val: Value, idx: u32) -> Value {
        let ty = self.data_flow_graph().value_type(vector);
        build_value(self, InstructionData::InsertElement { args: [vector, val], idx }, ty)
    }

    fn phi(self, edges: &[(Block, Value)]) -> Value {
        let ty = self.data_flow_graph().value_type(edges[0].1);
        let blocks = edges.iter().map(|&(block, _)| block).collect();
        let args = edges.iter().map(|&(_, val)| val).collect();
        build_value(self, InstructionData::PhiNode { args, blocks }, ty)
    }

    fn jump(self, destination: Block) -> Inst {
        self.build(InstructionData::Jump { destination }, None).0
    }

    fn br(self, cond: Value, then_dst: Block, else_dst: Block) -> Inst {
        self.build(InstructionData::Branch { cond, then_dst, else_dst }, None).0
    }

    fn ret(self, arg: Option<Value>) -> Inst {
        self.build(InstructionData::Ret { arg }, None).0
    }
}
