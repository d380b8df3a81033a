use std::fmt;

use air::{Type, TypeData, TypeTable};
use anyhow::{bail, Context, Result};
use typed_index_collections::TiVec;

use crate::data::{mask, Data};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct AllocId(u32);

impl From<usize> for AllocId {
    fn from(idx: usize) -> AllocId {
        AllocId(idx as u32)
    }
}

impl From<AllocId> for usize {
    fn from(id: AllocId) -> usize {
        id.0 as usize
    }
}

impl fmt::Display for AllocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alloc{}", self.0)
    }
}

/// A pointer into an allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Pointer {
    pub alloc: AllocId,
    pub offset: u64,
}

impl Pointer {
    pub fn offset_by(self, bytes: i64) -> Pointer {
        Pointer { alloc: self.alloc, offset: self.offset.wrapping_add(bytes as u64) }
    }

    /// Pointers are stored in memory as `(alloc + 1) << 32 | offset` so that `0` is null.
    fn to_bits(self) -> u64 {
        ((self.alloc.0 as u64 + 1) << 32) | (self.offset & 0xffff_ffff)
    }

    fn from_bits(bits: u64) -> Option<Pointer> {
        let alloc = (bits >> 32) as u32;
        if alloc == 0 {
            return None;
        }
        Some(Pointer { alloc: AllocId(alloc - 1), offset: bits & 0xffff_ffff })
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.alloc, self.offset)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AllocKind {
    /// Created by `alloca`.
    Stack,
    /// Created by `malloc`, must be released with `free`.
    Heap,
    /// Memory provided by the caller of the interpreted function.
    Host,
}

#[derive(Clone, Debug)]
struct Allocation {
    bytes: Vec<u8>,
    kind: AllocKind,
    live: bool,
}

/// Byte addressed memory made up of independent allocations.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    allocs: TiVec<AllocId, Allocation>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory::default()
    }

    pub fn alloc(&mut self, size: u64, kind: AllocKind) -> Pointer {
        let alloc = self.allocs.push_and_get_key(Allocation {
            bytes: vec![0; size as usize],
            kind,
            live: true,
        });
        Pointer { alloc, offset: 0 }
    }

    /// Allocates host memory initialized with `data` of type `ty`.
    pub fn alloc_data(&mut self, types: &TypeTable, ty: Type, data: &Data) -> Result<Pointer> {
        let ptr = self.alloc(types.alloc_size(ty), AllocKind::Host);
        self.write(types, ty, ptr, data)?;
        Ok(ptr)
    }

    pub fn free(&mut self, ptr: Pointer) -> Result<()> {
        let alloc = match self.allocs.get_mut(ptr.alloc) {
            Some(alloc) => alloc,
            None => bail!("free of unknown pointer {ptr}"),
        };
        if alloc.kind != AllocKind::Heap {
            bail!("free of {:?} memory {ptr}", alloc.kind)
        }
        if !alloc.live {
            bail!("double free of {ptr}")
        }
        if ptr.offset != 0 {
            bail!("free of interior pointer {ptr}")
        }
        alloc.live = false;
        Ok(())
    }

    pub fn is_live(&self, alloc: AllocId) -> bool {
        self.allocs.get(alloc).map_or(false, |alloc| alloc.live)
    }

    pub fn kind(&self, alloc: AllocId) -> Option<AllocKind> {
        self.allocs.get(alloc).map(|alloc| alloc.kind)
    }

    /// The number of heap allocations that were not freed yet.
    pub fn live_heap_allocs(&self) -> usize {
        self.allocs.iter().filter(|alloc| alloc.kind == AllocKind::Heap && alloc.live).count()
    }

    fn bytes(&self, ptr: Pointer, len: u64) -> Result<&[u8]> {
        let alloc = match self.allocs.get(ptr.alloc) {
            Some(alloc) => alloc,
            None => bail!("access to unknown pointer {ptr}"),
        };
        if !alloc.live {
            bail!("use after free of {ptr}")
        }
        let start = ptr.offset as usize;
        let end = start + len as usize;
        match alloc.bytes.get(start..end) {
            Some(bytes) => Ok(bytes),
            None => bail!("out of bounds access of {len} bytes at {ptr}"),
        }
    }

    fn bytes_mut(&mut self, ptr: Pointer, len: u64) -> Result<&mut [u8]> {
        let alloc = match self.allocs.get_mut(ptr.alloc) {
            Some(alloc) => alloc,
            None => bail!("access to unknown pointer {ptr}"),
        };
        if !alloc.live {
            bail!("use after free of {ptr}")
        }
        let start = ptr.offset as usize;
        let end = start + len as usize;
        match alloc.bytes.get_mut(start..end) {
            Some(bytes) => Ok(bytes),
            None => bail!("out of bounds access of {len} bytes at {ptr}"),
        }
    }

    pub fn read(&self, types: &TypeTable, ty: Type, ptr: Pointer) -> Result<Data> {
        let bytes = self.bytes(ptr, types.store_size(ty))?;
        decode(types, ty, bytes)
    }

    pub fn write(&mut self, types: &TypeTable, ty: Type, ptr: Pointer, data: &Data) -> Result<()> {
        let bytes = self.bytes_mut(ptr, types.store_size(ty))?;
        encode(types, ty, data, bytes).with_context(|| format!("failed to store {data} at {ptr}"))
    }

    pub fn read_f64(&self, ptr: Pointer) -> Result<f64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.bytes(ptr, 8)?);
        Ok(f64::from_le_bytes(raw))
    }

    pub fn write_f64(&mut self, ptr: Pointer, val: f64) -> Result<()> {
        self.bytes_mut(ptr, 8)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    /// Allocates host memory holding `vals` as consecutive doubles.
    pub fn alloc_f64s(&mut self, vals: &[f64]) -> Pointer {
        let ptr = self.alloc(8 * vals.len() as u64, AllocKind::Host);
        let alloc = &mut self.allocs[ptr.alloc];
        for (dst, val) in alloc.bytes.chunks_exact_mut(8).zip(vals) {
            dst.copy_from_slice(&val.to_le_bytes());
        }
        ptr
    }
}

/// Writes the in-memory representation of `data` (of type `ty`) to `buf`.
pub fn encode(types: &TypeTable, ty: Type, data: &Data, buf: &mut [u8]) -> Result<()> {
    let size = types.store_size(ty) as usize;
    match (&types[ty], data) {
        (_, Data::Undef) => buf[..size].fill(0),
        (TypeData::Int(_), Data::Int { val, .. }) => {
            buf[..size].copy_from_slice(&val.to_le_bytes()[..size])
        }
        (TypeData::F32, Data::F32(val)) => buf[..4].copy_from_slice(&val.to_le_bytes()),
        (TypeData::F64, Data::F64(val)) => buf[..8].copy_from_slice(&val.to_le_bytes()),
        (TypeData::Ptr { .. }, Data::Ptr(ptr)) => {
            let bits = ptr.map_or(0, Pointer::to_bits);
            buf[..8].copy_from_slice(&bits.to_le_bytes())
        }
        (
            TypeData::Vector { len, .. } | TypeData::Array { len, .. },
            Data::Aggregate(members),
        ) if members.len() == *len as usize => {
            for (i, member) in members.iter().enumerate() {
                let elem = types.member(ty, i as u32);
                let offset = types.member_offset(ty, i as u32) as usize;
                encode(types, elem, member, &mut buf[offset..])?;
            }
        }
        (TypeData::Struct { fields, .. }, Data::Aggregate(members))
            if members.len() == fields.len() =>
        {
            for (i, (&field, member)) in fields.iter().zip(members.iter()).enumerate() {
                let offset = types.member_offset(ty, i as u32) as usize;
                encode(types, field, member, &mut buf[offset..])?;
            }
        }
        _ => bail!("{data} is not a value of type {}", types.display(ty)),
    }
    Ok(())
}

/// Reads a value of type `ty` from its in-memory representation `buf`.
pub fn decode(types: &TypeTable, ty: Type, buf: &[u8]) -> Result<Data> {
    let res = match types[ty] {
        TypeData::Int(bits) => {
            let size = types.store_size(ty) as usize;
            let mut raw = [0u8; 8];
            raw[..size].copy_from_slice(&buf[..size]);
            Data::Int { bits, val: mask(bits, u64::from_le_bytes(raw)) }
        }
        TypeData::F32 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&buf[..4]);
            Data::F32(f32::from_le_bytes(raw))
        }
        TypeData::F64 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[..8]);
            Data::F64(f64::from_le_bytes(raw))
        }
        TypeData::Ptr { .. } => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[..8]);
            Data::Ptr(Pointer::from_bits(u64::from_le_bytes(raw)))
        }
        TypeData::Vector { len, .. } | TypeData::Array { len, .. } => {
            let members: Result<_> = (0..len)
                .map(|i| {
                    let offset = types.member_offset(ty, i) as usize;
                    decode(types, types.member(ty, i), &buf[offset..])
                })
                .collect();
            Data::Aggregate(members?)
        }
        TypeData::Struct { ref fields, .. } => {
            let members: Result<_> = fields
                .iter()
                .enumerate()
                .map(|(i, &field)| {
                    let offset = types.member_offset(ty, i as u32) as usize;
                    decode(types, field, &buf[offset..])
                })
                .collect();
            Data::Aggregate(members?)
        }
        TypeData::Void => bail!("can not read a value of type void"),
    };
    Ok(res)
}
