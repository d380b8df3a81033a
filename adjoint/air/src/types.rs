//! Interned types and the data layout.
//!
//! Types are hash-consed into a [`TypeTable`] so that type equality is a simple comparison of
//! [`Type`] references. The table also answers all data layout queries (sizes, alignments and
//! struct field offsets). The layout follows the usual 64-bit conventions: pointers are 8 bytes
//! wide, scalars are aligned to their size and struct fields are naturally padded unless the
//! struct is packed.

use std::fmt;

use ahash::AHashMap;
use stdx::align_to;
use typed_index_collections::TiVec;

use crate::Type;


#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    Void,
    /// An integer with the given number of bits.
    Int(u32),
    F32,
    F64,
    /// A (typed) pointer into the given address space.
    Ptr { pointee: Type, addr_space: u32 },
    Vector { elem: Type, len: u32 },
    Array { elem: Type, len: u32 },
    Struct { fields: Box<[Type]>, packed: bool },
}

#[derive(Clone, Default)]
pub struct TypeTable {
    types: TiVec<Type, TypeData>,
    interned: AHashMap<TypeData, Type>,
}

impl std::ops::Index<Type> for TypeTable {
    type Output = TypeData;

    fn index(&self, ty: Type) -> &TypeData {
        &self.types[ty]
    }
}

/// Construction
impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn intern(&mut self, data: TypeData) -> Type {
        if let Some(&ty) = self.interned.get(&data) {
            return ty;
        }
        let ty = self.types.push_and_get_key(data.clone());
        self.interned.insert(data, ty);
        ty
    }

    pub fn void(&mut self) -> Type {
        self.intern(TypeData::Void)
    }

    pub fn int(&mut self, bits: u32) -> Type {
        debug_assert_ne!(bits, 0);
        self.intern(TypeData::Int(bits))
    }

    pub fn i1(&mut self) -> Type {
        self.int(1)
    }

    pub fn i8(&mut self) -> Type {
        self.int(8)
    }

    pub fn i32(&mut self) -> Type {
        self.int(32)
    }

    pub fn i64(&mut self) -> Type {
        self.int(64)
    }

    pub fn f32(&mut self) -> Type {
        self.intern(TypeData::F32)
    }

    pub fn f64(&mut self) -> Type {
        self.intern(TypeData::F64)
    }

    pub fn ptr(&mut self, pointee: Type) -> Type {
        self.ptr_in(pointee, 0)
    }

    pub fn ptr_in(&mut self, pointee: Type, addr_space: u32) -> Type {
        self.intern(TypeData::Ptr { pointee, addr_space })
    }

    pub fn vector(&mut self, elem: Type, len: u32) -> Type {
        debug_assert!(len != 0 && self.is_scalar(elem), "invalid vector element {elem}");
        self.intern(TypeData::Vector { elem, len })
    }

    pub fn array(&mut self, elem: Type, len: u32) -> Type {
        self.intern(TypeData::Array { elem, len })
    }

    pub fn struct_(&mut self, fields: &[Type]) -> Type {
        self.intern(TypeData::Struct { fields: fields.into(), packed: false })
    }

    pub fn packed_struct(&mut self, fields: &[Type]) -> Type {
        self.intern(TypeData::Struct { fields: fields.into(), packed: true })
    }
}

/// Classification
impl TypeTable {
    pub fn is_void(&self, ty: Type) -> bool {
        matches!(self[ty], TypeData::Void)
    }

    pub fn is_pointer(&self, ty: Type) -> bool {
        matches!(self[ty], TypeData::Ptr { .. })
    }

    pub fn is_float(&self, ty: Type) -> bool {
        matches!(self[ty], TypeData::F32 | TypeData::F64)
    }

    pub fn is_int(&self, ty: Type) -> bool {
        matches!(self[ty], TypeData::Int(_))
    }

    pub fn is_int_bits(&self, ty: Type, bits: u32) -> bool {
        self[ty] == TypeData::Int(bits)
    }

    pub fn is_vector(&self, ty: Type) -> bool {
        matches!(self[ty], TypeData::Vector { .. })
    }

    pub fn is_scalar(&self, ty: Type) -> bool {
        matches!(self[ty], TypeData::Int(_) | TypeData::F32 | TypeData::F64 | TypeData::Ptr { .. })
    }

    pub fn is_aggregate(&self, ty: Type) -> bool {
        matches!(self[ty], TypeData::Array { .. } | TypeData::Struct { .. })
    }

    /// The element type of a vector, or `ty` itself for scalars.
    pub fn scalar_type(&self, ty: Type) -> Type {
        match self[ty] {
            TypeData::Vector { elem, .. } => elem,
            _ => ty,
        }
    }

    pub fn is_fp_or_fp_vector(&self, ty: Type) -> bool {
        self.is_float(self.scalar_type(ty))
    }

    pub fn is_int_or_int_vector(&self, ty: Type) -> bool {
        self.is_int(self.scalar_type(ty))
    }

    pub fn pointee(&self, ty: Type) -> Option<Type> {
        match self[ty] {
            TypeData::Ptr { pointee, .. } => Some(pointee),
            _ => None,
        }
    }

    pub fn addr_space(&self, ty: Type) -> Option<u32> {
        match self[ty] {
            TypeData::Ptr { addr_space, .. } => Some(addr_space),
            _ => None,
        }
    }

    /// Element type and length of vectors and arrays.
    pub fn sequence(&self, ty: Type) -> Option<(Type, u32)> {
        match self[ty] {
            TypeData::Vector { elem, len } | TypeData::Array { elem, len } => Some((elem, len)),
            _ => None,
        }
    }

    pub fn struct_fields(&self, ty: Type) -> Option<&[Type]> {
        match &self[ty] {
            TypeData::Struct { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// The type of the `idx`th member of an aggregate or vector.
    pub fn member(&self, ty: Type, idx: u32) -> Type {
        match &self[ty] {
            TypeData::Struct { fields, .. } => fields[idx as usize],
            TypeData::Array { elem, len } | TypeData::Vector { elem, len } => {
                debug_assert!(idx < *len, "index {idx} out of bounds for {}", self.display(ty));
                *elem
            }
            _ => unreachable!("{} has no members", self.display(ty)),
        }
    }

    /// Whether a value of type `from` can be reinterpreted as `to` with a bitcast: both types must
    /// be first class non-aggregate types of the same size, and pointers may only be cast to other
    /// pointers in the same address space.
    pub fn bitcast_is_valid(&self, from: Type, to: Type) -> bool {
        if self.is_aggregate(from) || self.is_aggregate(to) || self.is_void(from) || self.is_void(to)
        {
            return false;
        }
        match (self.addr_space(self.scalar_type(from)), self.addr_space(self.scalar_type(to))) {
            (Some(from_space), Some(to_space)) => {
                from_space == to_space && self.size_in_bits(from) == self.size_in_bits(to)
            }
            (None, None) => self.size_in_bits(from) == self.size_in_bits(to),
            _ => false,
        }
    }
}

/// Data layout
impl TypeTable {
    pub fn size_in_bits(&self, ty: Type) -> u64 {
        match self[ty] {
            TypeData::Void => 0,
            TypeData::Int(bits) => bits as u64,
            TypeData::F32 => 32,
            TypeData::F64 | TypeData::Ptr { .. } => 64,
            TypeData::Vector { elem, len } => self.size_in_bits(elem) * len as u64,
            TypeData::Array { elem, len } => self.alloc_size(elem) * len as u64 * 8,
            TypeData::Struct { .. } => self.struct_layout(ty).0 * 8,
        }
    }

    /// The number of bytes written by a store of `ty`.
    pub fn store_size(&self, ty: Type) -> u64 {
        (self.size_in_bits(ty) + 7) / 8
    }

    /// The distance between two consecutive elements of type `ty` in an array.
    pub fn alloc_size(&self, ty: Type) -> u64 {
        align_to(self.store_size(ty), self.abi_align(ty))
    }

    pub fn abi_align(&self, ty: Type) -> u64 {
        match &self[ty] {
            TypeData::Void => 1,
            TypeData::Int(bits) => ((*bits as u64 + 7) / 8).next_power_of_two().min(8),
            TypeData::F32 => 4,
            TypeData::F64 | TypeData::Ptr { .. } => 8,
            TypeData::Vector { .. } => self.store_size(ty).next_power_of_two(),
            TypeData::Array { elem, .. } => self.abi_align(*elem),
            TypeData::Struct { packed: true, .. } => 1,
            TypeData::Struct { fields, .. } => {
                fields.iter().map(|&field| self.abi_align(field)).max().unwrap_or(1)
            }
        }
    }

    /// The preferred alignment of stack slots holding `ty`.
    pub fn pref_align(&self, ty: Type) -> u64 {
        self.abi_align(ty)
    }

    /// Byte offset of the `idx`th member of an aggregate (or vector).
    pub fn member_offset(&self, ty: Type, idx: u32) -> u64 {
        match self[ty] {
            TypeData::Struct { .. } => self.struct_layout(ty).1[idx as usize],
            TypeData::Array { elem, .. } => self.alloc_size(elem) * idx as u64,
            TypeData::Vector { elem, .. } => self.store_size(elem) * idx as u64,
            _ => unreachable!("{} has no members", self.display(ty)),
        }
    }

    /// Returns the total size and the offsets of all fields of a struct.
    fn struct_layout(&self, ty: Type) -> (u64, Vec<u64>) {
        let (fields, packed) = match &self[ty] {
            TypeData::Struct { fields, packed } => (fields, *packed),
            _ => unreachable!(),
        };
        let mut offset = 0;
        let mut offsets = Vec::with_capacity(fields.len());
        for &field in fields.iter() {
            if !packed {
                offset = align_to(offset, self.abi_align(field));
            }
            offsets.push(offset);
            offset += self.alloc_size(field);
        }
        if !packed {
            offset = align_to(offset, self.abi_align(ty));
        }
        (offset, offsets)
    }
}

impl TypeTable {
    pub fn display(&self, ty: Type) -> DisplayType<'_> {
        DisplayType { types: self, ty }
    }
}

pub struct DisplayType<'a> {
    types: &'a TypeTable,
    ty: Type,
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types = self.types;
        match &types[self.ty] {
            TypeData::Void => write!(f, "void"),
            TypeData::Int(bits) => write!(f, "i{bits}"),
            TypeData::F32 => write!(f, "f32"),
            TypeData::F64 => write!(f, "f64"),
            TypeData::Ptr { pointee, addr_space: 0 } => write!(f, "ptr<{}>", types.display(*pointee)),
            TypeData::Ptr { pointee, addr_space } => {
                write!(f, "ptr<{}, addrspace {addr_space}>", types.display(*pointee))
            }
            TypeData::Vector { elem, len } => write!(f, "<{len} x {}>", types.display(*elem)),
            TypeData::Array { elem, len } => write!(f, "[{len} x {}]", types.display(*elem)),
            TypeData::Struct { fields, packed } => {
                if *packed {
                    write!(f, "<")?;
                }
                write!(f, "{{")?;
                for (i, &field) in fields.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", types.display(field))?;
                }
                write!(f, "}}")?;
                if *packed {
                    write!(f, ">")?;
                }
                Ok(())
            }
        }
    }
}
