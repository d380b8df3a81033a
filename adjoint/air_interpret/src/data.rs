use std::fmt;

use air::{Const, DataFlowGraph, Type, TypeData, TypeTable, Value, ValueDef};
use anyhow::{bail, Result};

use crate::memory::{AllocId, Pointer};

/// A runtime value.
#[derive(Clone, PartialEq, Debug)]
pub enum Data {
    Int { bits: u32, val: u64 },
    F32(f32),
    F64(f64),
    Ptr(Option<Pointer>),
    /// Vectors, arrays and structs.
    Aggregate(Box<[Data]>),
    Undef,
}

impl Data {
    pub fn int(bits: u32, val: u64) -> Data {
        Data::Int { bits, val: mask(bits, val) }
    }

    pub fn bool(val: bool) -> Data {
        Data::Int { bits: 1, val: val as u64 }
    }

    /// An undefined value with the structure of `ty` (aggregates are filled with undefined
    /// members so that `insertvalue` can build them up).
    pub fn undef(types: &TypeTable, ty: Type) -> Data {
        match types[ty] {
            TypeData::Vector { elem, len } | TypeData::Array { elem, len } => {
                Data::Aggregate((0..len).map(|_| Data::undef(types, elem)).collect())
            }
            TypeData::Struct { ref fields, .. } => {
                Data::Aggregate(fields.iter().map(|&field| Data::undef(types, field)).collect())
            }
            _ => Data::Undef,
        }
    }

    pub fn zero(types: &TypeTable, ty: Type) -> Data {
        match types[ty] {
            TypeData::Int(bits) => Data::Int { bits, val: 0 },
            TypeData::F32 => Data::F32(0.0),
            TypeData::F64 => Data::F64(0.0),
            TypeData::Ptr { .. } => Data::Ptr(None),
            TypeData::Vector { elem, len } | TypeData::Array { elem, len } => {
                Data::Aggregate((0..len).map(|_| Data::zero(types, elem)).collect())
            }
            TypeData::Struct { ref fields, .. } => {
                Data::Aggregate(fields.iter().map(|&field| Data::zero(types, field)).collect())
            }
            TypeData::Void => Data::Undef,
        }
    }

    /// The runtime value of a constant.
    pub fn from_const(dfg: &DataFlowGraph, val: Value) -> Data {
        let types = &dfg.types;
        match dfg.value_def(val) {
            ValueDef::Const(Const::Int { ty, val }) => match types[*ty] {
                TypeData::Int(bits) => Data::int(bits, *val),
                _ => Data::Undef,
            },
            ValueDef::Const(Const::Float { ty, val }) => {
                if matches!(types[*ty], TypeData::F32) {
                    Data::F32(val.to_f64() as f32)
                } else {
                    Data::F64(val.to_f64())
                }
            }
            ValueDef::Const(Const::Zero(ty) | Const::Null(ty)) => Data::zero(types, *ty),
            ValueDef::Const(Const::Undef(ty)) => Data::undef(types, *ty),
            ValueDef::Const(Const::Aggregate { elems, .. }) => {
                Data::Aggregate(elems.iter().map(|&elem| Data::from_const(dfg, elem)).collect())
            }
            _ => Data::Undef,
        }
    }

    pub fn f64(&self) -> Result<f64> {
        match *self {
            Data::F64(val) => Ok(val),
            Data::F32(val) => Ok(val as f64),
            _ => bail!("expected a float but found {self}"),
        }
    }

    pub fn uint(&self) -> Result<u64> {
        match *self {
            Data::Int { val, .. } => Ok(val),
            _ => bail!("expected an integer but found {self}"),
        }
    }

    /// The integer value sign extended to 64 bits.
    pub fn sint(&self) -> Result<i64> {
        match *self {
            Data::Int { bits: 64, val } => Ok(val as i64),
            Data::Int { bits, val } => {
                let shift = 64 - bits;
                Ok(((val << shift) as i64) >> shift)
            }
            _ => bail!("expected an integer but found {self}"),
        }
    }

    pub fn is_true(&self) -> Result<bool> {
        Ok(self.uint()? != 0)
    }

    pub fn ptr(&self) -> Result<Pointer> {
        match *self {
            Data::Ptr(Some(ptr)) => Ok(ptr),
            Data::Ptr(None) => bail!("null pointer dereference"),
            _ => bail!("expected a pointer but found {self}"),
        }
    }

    pub fn members(&self) -> Result<&[Data]> {
        match self {
            Data::Aggregate(members) => Ok(members),
            _ => bail!("expected an aggregate but found {self}"),
        }
    }

    pub fn members_mut(&mut self) -> Result<&mut [Data]> {
        match self {
            Data::Aggregate(members) => Ok(members),
            _ => bail!("expected an aggregate"),
        }
    }

    /// The allocation a pointer points into, if any.
    pub fn alloc(&self) -> Option<AllocId> {
        match *self {
            Data::Ptr(Some(ptr)) => Some(ptr.alloc),
            _ => None,
        }
    }
}

pub(crate) fn mask(bits: u32, val: u64) -> u64 {
    if bits >= 64 {
        val
    } else {
        val & ((1u64 << bits) - 1)
    }
}

impl From<f64> for Data {
    fn from(val: f64) -> Data {
        Data::F64(val)
    }
}

impl From<f32> for Data {
    fn from(val: f32) -> Data {
        Data::F32(val)
    }
}

impl From<bool> for Data {
    fn from(val: bool) -> Data {
        Data::bool(val)
    }
}

impl From<Pointer> for Data {
    fn from(ptr: Pointer) -> Data {
        Data::Ptr(Some(ptr))
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Data::Int { bits, val } => write!(f, "i{bits} {val}"),
            Data::F32(val) => write!(f, "f32 {val:?}"),
            Data::F64(val) => write!(f, "f64 {val:?}"),
            Data::Ptr(Some(ptr)) => write!(f, "{ptr}"),
            Data::Ptr(None) => write!(f, "null"),
            Data::Aggregate(members) => {
                write!(f, "{{")?;
                for (i, member) in members.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, "}}")
            }
            Data::Undef => write!(f, "undef"),
        }
    }
}
