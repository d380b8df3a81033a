use std::fmt;

use ahash::AHashMap;
use stdx::Ieee64;
use typed_index_collections::TiVec;

use crate::{Inst, Param, Type, TypeTable, Value};

/// Where did a value come from?
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Value is the result of an instruction.
    Result(Inst),
    /// Value is a function parameter.
    Param(Param),
    /// Value is a constant.
    Const(Const),
    /// Stands in for a value that is only known later, see
    /// [`make_placeholder`](crate::DataFlowGraph::make_placeholder).
    Placeholder,
    /// The placeholder this value used to be was replaced and removed.
    Invalid,
}

impl ValueDef {
    pub fn inst(&self) -> Option<Inst> {
        match *self {
            ValueDef::Result(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn as_const(&self) -> Option<&Const> {
        match self {
            ValueDef::Const(val) => Some(val),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Const {
    Int { ty: Type, val: u64 },
    /// A float constant of type `ty`, `f32` constants are stored widened.
    Float { ty: Type, val: Ieee64 },
    /// The all zero value of any type.
    Zero(Type),
    Null(Type),
    Undef(Type),
    /// A vector, array or struct made from other constants.
    Aggregate { ty: Type, elems: Box<[Value]> },
}

impl Const {
    pub fn ty(&self) -> Type {
        match *self {
            Const::Int { ty, .. }
            | Const::Float { ty, .. }
            | Const::Zero(ty)
            | Const::Null(ty)
            | Const::Undef(ty)
            | Const::Aggregate { ty, .. } => ty,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ValueData {
    pub(crate) def: ValueDef,
    pub(crate) ty: Type,
}

#[derive(Clone, Default)]
pub struct DfgValues {
    pub(crate) values: TiVec<Value, ValueData>,
    consts: AHashMap<Const, Value>,
}

impl DfgValues {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Value> {
        self.values.keys()
    }

    pub(crate) fn make(&mut self, def: ValueDef, ty: Type) -> Value {
        self.values.push_and_get_key(ValueData { def, ty })
    }

    pub(crate) fn make_const(&mut self, val: Const) -> Value {
        if let Some(&res) = self.consts.get(&val) {
            return res;
        }
        let res = self.make(ValueDef::Const(val.clone()), val.ty());
        self.consts.insert(val, res);
        res
    }

    pub fn def(&self, val: Value) -> &ValueDef {
        &self.values[val].def
    }

    pub fn ty(&self, val: Value) -> Type {
        self.values[val].ty
    }

    pub(crate) fn invalidate(&mut self, val: Value) {
        self.values[val].def = ValueDef::Invalid;
    }

    /// Returns `true` if `val` is a constant whose bits are all zero (this includes `-0.0`).
    pub fn is_zero(&self, val: Value) -> bool {
        match self.def(val) {
            ValueDef::Const(Const::Zero(_) | Const::Null(_)) => true,
            ValueDef::Const(Const::Int { val, .. }) => *val == 0,
            ValueDef::Const(Const::Float { val, .. }) => val.is_zero(),
            ValueDef::Const(Const::Aggregate { elems, .. }) => {
                elems.iter().all(|&elem| self.is_zero(elem))
            }
            _ => false,
        }
    }

    pub fn display<'a>(&'a self, types: &'a TypeTable, val: Value) -> DisplayConst<'a> {
        DisplayConst { values: self, types, val }
    }
}

/// Displays a constant with its type (`f64 1.5`, `<2 x i1> <i1 1, i1 0>`).
pub struct DisplayConst<'a> {
    values: &'a DfgValues,
    types: &'a TypeTable,
    val: Value,
}

impl fmt::Display for DisplayConst<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ty = self.values.ty(self.val);
        write!(f, "{} ", self.types.display(ty))?;
        match self.values.def(self.val) {
            ValueDef::Const(Const::Int { val, .. }) => write!(f, "{val}"),
            ValueDef::Const(Const::Float { val, .. }) => write!(f, "{val}"),
            ValueDef::Const(Const::Zero(_)) => write!(f, "zeroinitializer"),
            ValueDef::Const(Const::Null(_)) => write!(f, "null"),
            ValueDef::Const(Const::Undef(_)) => write!(f, "undef"),
            ValueDef::Const(Const::Aggregate { elems, .. }) => {
                write!(f, "<")?;
                for (i, &elem) in elems.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.values.display(self.types, elem))?;
                }
                write!(f, ">")
            }
            _ => write!(f, "{}", self.val),
        }
    }
}
