use std::fmt;

use ahash::AHashMap;
use stdx::packed_option::PackedOption;
use stdx::Ieee64;
use typed_index_collections::TiVec;

use crate::metadata::{InstMetadata, Metadata};
use crate::write::write_operands;
use crate::{Inst, InstructionData, Opcode, Param, Type, TypeTable, Value};

pub use crate::dfg::values::{Const, DfgValues, DisplayConst, ValueDef};

#[cfg(test)]
mod tests;

mod values;

/// A data flow graph defines all instructions in a function as well as the data flow dependencies
/// between them. The DFG also tracks values which can be instruction results, function
/// parameters, constants or placeholders.
///
/// The layout of blocks in the function and of instructions in each block is recorded by the
/// `Layout` data structure which forms the other half of the function representation.
#[derive(Clone, Default)]
pub struct DataFlowGraph {
    pub insts: TiVec<Inst, InstructionData>,
    results: TiVec<Inst, PackedOption<Value>>,
    pub values: DfgValues,
    pub types: TypeTable,
    pub metadata: Metadata,
    inst_metadata: AHashMap<Inst, InstMetadata>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// Instructions
impl DataFlowGraph {
    /// Creates a new instruction that is not yet inserted into the layout. If `result_ty` is
    /// given (and not `void`) a result value is created as well.
    pub fn make_inst(&mut self, data: InstructionData, result_ty: Option<Type>) -> Inst {
        let inst = self.insts.push_and_get_key(data);
        let res = result_ty
            .filter(|&ty| !self.types.is_void(ty))
            .map(|ty| self.values.make(ValueDef::Result(inst), ty));
        self.results.push(res.into());
        inst
    }

    /// The result of `inst`. Panics if the instruction does not produce a value.
    pub fn first_result(&self, inst: Inst) -> Value {
        self.results[inst].expect("instruction has no results")
    }

    pub fn inst_result(&self, inst: Inst) -> Option<Value> {
        self.results[inst].expand()
    }

    pub fn inst_args(&self, inst: Inst) -> &[Value] {
        self.insts[inst].arguments()
    }

    pub fn inst_args_mut(&mut self, inst: Inst) -> &mut [Value] {
        self.insts[inst].arguments_mut()
    }

    pub fn opcode(&self, inst: Inst) -> Opcode {
        self.insts[inst].opcode()
    }

    /// Returns an object that displays `inst`.
    pub fn display_inst(&self, inst: Inst) -> DisplayInst<'_> {
        DisplayInst(self, inst)
    }

    pub fn inst_metadata(&self, inst: Inst) -> Option<&InstMetadata> {
        self.inst_metadata.get(&inst)
    }

    pub fn inst_metadata_mut(&mut self, inst: Inst) -> &mut InstMetadata {
        self.inst_metadata.entry(inst).or_default()
    }
}

/// Values
impl DataFlowGraph {
    pub fn value_def(&self, val: Value) -> &ValueDef {
        self.values.def(val)
    }

    pub fn value_type(&self, val: Value) -> Type {
        self.values.ty(val)
    }

    /// The instruction that defines `val` (if any).
    pub fn value_inst(&self, val: Value) -> Option<Inst> {
        self.values.def(val).inst()
    }

    pub fn value_dfg_data(&self, val: Value) -> Option<&InstructionData> {
        self.value_inst(val).map(|inst| &self.insts[inst])
    }

    pub fn is_const(&self, val: Value) -> bool {
        matches!(self.values.def(val), ValueDef::Const(_))
    }

    pub fn is_zero_const(&self, val: Value) -> bool {
        self.values.is_zero(val)
    }

    pub fn make_param(&mut self, param: Param, ty: Type) -> Value {
        self.values.make(ValueDef::Param(param), ty)
    }

    /// Creates a value without definition which must be replaced with
    /// [`replace_placeholder`](DataFlowGraph::replace_placeholder) later.
    pub fn make_placeholder(&mut self, ty: Type) -> Value {
        self.values.make(ValueDef::Placeholder, ty)
    }

    pub fn is_placeholder(&self, val: Value) -> bool {
        matches!(self.values.def(val), ValueDef::Placeholder)
    }

    pub fn iconst(&mut self, ty: Type, val: u64) -> Value {
        debug_assert!(self.types.is_int(ty));
        self.values.make_const(Const::Int { ty, val })
    }

    pub fn fconst(&mut self, ty: Type, val: f64) -> Value {
        debug_assert!(self.types.is_float(ty));
        self.values.make_const(Const::Float { ty, val: Ieee64::with_float(val) })
    }

    pub fn f64const(&mut self, val: f64) -> Value {
        let ty = self.types.f64();
        self.fconst(ty, val)
    }

    pub fn i64const(&mut self, val: i64) -> Value {
        let ty = self.types.i64();
        self.iconst(ty, val as u64)
    }

    pub fn i32const(&mut self, val: i32) -> Value {
        let ty = self.types.i32();
        self.iconst(ty, val as u32 as u64)
    }

    pub fn bool_const(&mut self, val: bool) -> Value {
        let ty = self.types.i1();
        self.iconst(ty, val as u64)
    }

    pub fn zero(&mut self, ty: Type) -> Value {
        self.values.make_const(Const::Zero(ty))
    }

    pub fn null(&mut self, ty: Type) -> Value {
        debug_assert!(self.types.is_pointer(ty));
        self.values.make_const(Const::Null(ty))
    }

    pub fn undef(&mut self, ty: Type) -> Value {
        self.values.make_const(Const::Undef(ty))
    }

    pub fn aggregate_const(&mut self, ty: Type, elems: &[Value]) -> Value {
        debug_assert!(elems.iter().all(|&elem| self.is_const(elem)));
        self.values.make_const(Const::Aggregate { ty, elems: elems.into() })
    }

    /// A `<len x i1>` constant with the given lanes.
    pub fn mask_const(&mut self, lanes: &[bool]) -> Value {
        let i1 = self.types.i1();
        let ty = self.types.vector(i1, lanes.len() as u32);
        let elems: Vec<_> = lanes.iter().map(|&lane| self.bool_const(lane)).collect();
        self.aggregate_const(ty, &elems)
    }

    pub fn as_int_const(&self, val: Value) -> Option<u64> {
        match self.values.def(val) {
            ValueDef::Const(Const::Int { val, .. }) => Some(*val),
            ValueDef::Const(Const::Zero(_)) if self.types.is_int(self.value_type(val)) => Some(0),
            _ => None,
        }
    }

    /// Replace all uses of `old` in instructions with `new`.
    pub fn replace_uses(&mut self, old: Value, new: Value) {
        for data in self.insts.iter_mut() {
            for arg in data.arguments_mut() {
                if *arg == old {
                    *arg = new
                }
            }
        }
    }

    /// Replaces all uses of the placeholder `val` with `new` and invalidates the placeholder.
    pub fn replace_placeholder(&mut self, val: Value, new: Value) {
        assert!(self.is_placeholder(val), "{val} is not a placeholder");
        debug_assert_eq!(self.value_type(val), self.value_type(new));
        self.replace_uses(val, new);
        self.values.invalidate(val);
    }

    /// Returns all instructions that use `val`. The scan includes instructions that were removed
    /// from the layout.
    pub fn uses(&self, val: Value) -> impl Iterator<Item = Inst> + '_ {
        self.insts
            .iter_enumerated()
            .filter(move |(_, data)| data.arguments().contains(&val))
            .map(|(inst, _)| inst)
    }

    /// Strips `gep`s and pointer casts from `ptr` (at most `max_lookup` of them) to find the
    /// object it points into.
    pub fn underlying_object(&self, mut ptr: Value, max_lookup: u32) -> Value {
        for _ in 0..max_lookup {
            match self.value_dfg_data(ptr) {
                Some(InstructionData::Gep { args, .. }) => ptr = args[0],
                Some(InstructionData::Cast { arg, .. }) => ptr = *arg,
                _ => break,
            }
        }
        ptr
    }

    /// The element type of the pointer `ptr`.
    pub fn pointee_type(&self, ptr: Value) -> Type {
        let ty = self.value_type(ptr);
        match self.types.pointee(ty) {
            Some(pointee) => pointee,
            None => unreachable!("{ptr} of type {} is not a pointer", self.types.display(ty)),
        }
    }
}

impl fmt::Debug for DataFlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFlowGraph")
            .field("insts", &self.insts.len())
            .field("values", &self.values.len())
            .field("types", &self.types.len())
            .finish()
    }
}

/// Object that can display an instruction.
pub struct DisplayInst<'a>(&'a DataFlowGraph, Inst);

impl<'a> fmt::Display for DisplayInst<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let dfg = self.0;
        let inst = self.1;

        if let Some(res) = dfg.inst_result(inst) {
            write!(f, "{res} = ")?;
        }
        write_operands(f, dfg, inst)
    }
}
