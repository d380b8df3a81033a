use ahash::RandomState;
use air::builder::InstBuilder;
use air::cursor::{Cursor, CursorPosition, FuncCursor};
use air::metadata::{InstMetadata, MetadataKind};
use air::{
    Arch, AtomicOrdering, Block, DataFlowGraph, Inst, InstructionData, SourceLoc, Type, TypeData,
    Value,
};
use indexmap::IndexMap;
use log::trace;

use crate::clone::value_label;
use crate::gradient::GradientUtils;
use crate::lanes::for_each_lane;
use crate::DerivativeMode;

/// Shadows that are used before they are known.
///
/// In forward modes the shadow of a value may be requested before the instruction that computes
/// it was differentiated. A placeholder value stands in for the shadow until
/// [`set_diffe`](GradientUtils::set_diffe) records its replacement. All uses are substituted at
/// once by [`resolve`](Placeholders::resolve).
#[derive(Clone, Debug, Default)]
pub struct Placeholders {
    pending: IndexMap<Value, Option<Value>, RandomState>,
}

impl Placeholders {
    pub fn reserve(&mut self, placeholder: Value) {
        self.pending.insert(placeholder, None);
    }

    pub fn is_pending(&self, placeholder: Value) -> bool {
        self.pending.contains_key(&placeholder)
    }

    /// Records that all uses of `placeholder` are to be replaced with `val`.
    pub fn substitute(&mut self, placeholder: Value, val: Value) {
        match self.pending.get_mut(&placeholder) {
            Some(dst) => *dst = Some(val),
            None => unreachable!("{placeholder} is not a pending placeholder"),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Placeholders without a recorded substitution.
    pub fn unresolved(&self) -> impl Iterator<Item = Value> + '_ {
        self.pending.iter().filter(|(_, dst)| dst.is_none()).map(|(&placeholder, _)| placeholder)
    }

    /// Replaces every placeholder with its substitution. Substitutions may name other
    /// placeholders, these are followed to the final value. Returns the number of replaced
    /// placeholders.
    pub fn resolve(&mut self, dfg: &mut DataFlowGraph) -> usize {
        let pending = std::mem::take(&mut self.pending);
        for &placeholder in pending.keys() {
            let mut dst = placeholder;
            for _ in 0..=pending.len() {
                match pending.get(&dst) {
                    Some(Some(next)) => dst = *next,
                    Some(None) => unreachable!("placeholder {placeholder} was never resolved"),
                    None => break,
                }
            }
            assert!(
                !pending.contains_key(&dst),
                "cyclic substitution of placeholder {placeholder}"
            );
            dfg.replace_placeholder(placeholder, dst);
        }
        pending.len()
    }
}

/// Shadow pointers
impl GradientUtils<'_> {
    /// Returns the shadow of `val`.
    ///
    /// Constants have a zero shadow. In forward modes a placeholder is created for values whose
    /// shadow is not known yet, in reverse modes all shadows of active pointers must have been
    /// registered with [`insert_inverted_pointer`](GradientUtils::insert_inverted_pointer).
    pub fn invert_pointer(&mut self, val: Value, pos: CursorPosition) -> Value {
        self.assert_original(val);
        if let Some(&shadow) = self.inverted_pointers.get(&val) {
            return shadow;
        }

        let ty = self.old_func.dfg.value_type(val);
        let shadow_ty = self.shadow_type(ty);
        if self.is_constant_value(val) {
            let dfg = &mut self.func.dfg;
            return if dfg.types.is_pointer(shadow_ty) {
                dfg.null(shadow_ty)
            } else {
                dfg.zero(shadow_ty)
            };
        }

        if self.mode.is_forward() {
            let placeholder = self.func.dfg.make_placeholder(shadow_ty);
            let name = format!("{}'ip", value_label(self.old_func, val));
            trace!("created placeholder {placeholder} ({name}) at {pos:?}");
            self.func.set_value_name(placeholder, name);
            self.placeholders.reserve(placeholder);
            self.inverted_pointers.insert(val, placeholder);
            return placeholder;
        }

        self.dump("no shadow for active value", &[val]);
        panic!("cannot find the shadow of {val}")
    }

    /// Registers `shadow` as the shadow of the original value `val`.
    pub fn insert_inverted_pointer(&mut self, val: Value, shadow: Value) {
        self.assert_original(val);
        let shadow_ty = self.shadow_type(self.old_func.dfg.value_type(val));
        assert_eq!(
            self.func.dfg.value_type(shadow),
            shadow_ty,
            "{shadow} does not have the shadow type of {val}"
        );
        self.inverted_pointers.insert(val, shadow);
    }

    /// Marks the shadow of the allocation `val` as created and consumed only by the reverse
    /// pass. Accumulations into such shadows can not race.
    pub fn mark_backwards_only_shadow(&mut self, val: Value) {
        self.assert_original(val);
        self.backwards_only_shadows.insert(val);
    }

    pub fn is_backwards_only_shadow(&self, val: Value) -> bool {
        self.backwards_only_shadows.contains(&val)
    }

    /// Substitutes every placeholder shadow with the value installed by
    /// [`set_diffe`](GradientUtils::set_diffe).
    pub fn resolve_placeholders(&mut self) -> usize {
        let unresolved: Vec<_> = self.placeholders.unresolved().collect();
        if !unresolved.is_empty() {
            self.dump("unresolved shadow placeholders", &unresolved);
            panic!("{} shadow placeholders were never resolved", unresolved.len());
        }
        self.placeholders.resolve(&mut self.func.dfg)
    }
}

/// The data shared by the per lane rules of [`GradientUtils::add_to_inverted_ptr_diffe`].
struct ShadowAccess {
    adding_type: Type,
    start: u64,
    size: u64,
    align: u32,
    inversion_allocs: Block,
}

impl ShadowAccess {
    fn pointer(&self, cursor: &mut FuncCursor<'_>, ptr: Value, needs_cast: bool) -> Value {
        let ptr_ty = cursor.func.dfg.value_type(ptr);
        let addr_space = cursor.func.dfg.types.addr_space(ptr_ty).unwrap_or(0);
        let mut ptr = ptr;
        if self.start != 0 {
            let i8_ = cursor.func.dfg.types.i8();
            let i8_ptr = cursor.func.dfg.types.ptr_in(i8_, addr_space);
            ptr = cursor.ins().ptrcast(ptr, i8_ptr);
            let offset = cursor.func.dfg.i64const(self.start as i64);
            ptr = cursor.ins().gep(ptr, &[offset], true);
        }
        if needs_cast || self.start != 0 {
            let ty = cursor.func.dfg.types.ptr_in(self.adding_type, addr_space);
            ptr = cursor.ins().ptrcast(ptr, ty);
        }
        ptr
    }

    /// Repackages `dif` as a value of the adding type. An increment that already has the
    /// adding type is used as is, the byte offset is applied to the pointer instead.
    fn increment(&self, cursor: &mut FuncCursor<'_>, dif: Value) -> Value {
        let mut dif = dif;
        let dif_ty = cursor.func.dfg.value_type(dif);
        if self.start != 0 && dif_ty != self.adding_type {
            let prev_size = cursor.func.dfg.types.store_size(dif_ty);
            assert!(
                prev_size >= self.start + self.size,
                "increment {dif} of {prev_size} bytes does not cover the bytes {}..{}",
                self.start,
                self.start + self.size
            );
            let types = &mut cursor.func.dfg.types;
            let i8_ = types.i8();
            let head = types.array(i8_, self.start as u32);
            let tail = types.array(i8_, (prev_size - self.start - self.size) as u32);
            let staging_ty = types.packed_struct(&[head, self.adding_type, tail]);
            let align = types.abi_align(dif_ty) as u32;
            let dif_ptr_ty = types.ptr(dif_ty);

            let staging = self.alloca(cursor, staging_ty, align);
            let staging_dif = cursor.ins().ptrcast(staging, dif_ptr_ty);
            cursor.ins().store(dif, staging_dif, align);
            let zero = cursor.func.dfg.i64const(0);
            let member = cursor.func.dfg.i32const(1);
            let member = cursor.ins().gep(staging, &[zero, member], true);
            dif = cursor.ins().load(member, 1);
        }

        let dif_ty = cursor.func.dfg.value_type(dif);
        if dif_ty != self.adding_type {
            let types = &mut cursor.func.dfg.types;
            let dif_size = types.store_size(dif_ty);
            assert!(
                dif_size >= self.size,
                "increment {dif} of {dif_size} bytes is smaller than the {} byte access",
                self.size
            );
            if types.bitcast_is_valid(dif_ty, self.adding_type) {
                dif = cursor.ins().bitcast(dif, self.adding_type);
            } else {
                let align = types.abi_align(dif_ty).max(types.abi_align(self.adding_type)) as u32;
                let adding_ptr_ty = types.ptr(self.adding_type);
                let tmp = self.alloca(cursor, dif_ty, align);
                cursor.ins().store(dif, tmp, align);
                let tmp = cursor.ins().ptrcast(tmp, adding_ptr_ty);
                dif = cursor.ins().load(tmp, align);
            }
        }
        dif
    }

    /// Allocates a temporary in the inversion allocation block without moving the cursor.
    fn alloca(&self, cursor: &mut FuncCursor<'_>, ty: Type, align: u32) -> Value {
        let pos = cursor.position();
        match cursor.func.block_terminator(self.inversion_allocs) {
            Some(term) => cursor.goto_inst(term),
            None => cursor.goto_bottom(self.inversion_allocs),
        }
        let res = cursor.ins().alloca(ty, align);
        cursor.set_position(pos);
        res
    }
}

impl GradientUtils<'_> {
    /// Accumulates `dif` into the shadow memory of `orig_ptr`.
    ///
    /// `orig` is the original instruction that accessed `orig_ptr`, the accumulation covers the
    /// `size` bytes starting `start` bytes after `orig_ptr`. If `adding_type` is smaller than
    /// `size` it is widened to a vector. `dif` is repackaged as `adding_type` if required.
    ///
    /// The accumulation is atomic if `atomic_add` is set or the function runs in parallel,
    /// unless the shadow belongs to a stack allocation on a GPU or is a backwards only shadow.
    #[allow(clippy::too_many_arguments)]
    pub fn add_to_inverted_ptr_diffe(
        &mut self,
        orig: Inst,
        adding_type: Type,
        start: u64,
        size: u64,
        orig_ptr: Value,
        dif: Value,
        pos: CursorPosition,
        align: Option<u32>,
        mask: Option<Value>,
    ) {
        self.assert_original(orig_ptr);

        let mut adding_type = adding_type;
        let mut size = size;
        let adding_size = self.func.dfg.types.store_size(adding_type);
        if adding_size != size {
            assert!(
                size > adding_size,
                "accumulation of {size} bytes is smaller than {}",
                self.func.dfg.types.display(adding_type)
            );
            adding_type = self.func.dfg.types.vector(adding_type, (size / adding_size) as u32);
            size = (size / adding_size) * adding_size;
        }

        let ptr = match self.mode {
            DerivativeMode::ForwardMode | DerivativeMode::ForwardModeSplit => {
                self.invert_pointer(orig_ptr, pos)
            }
            DerivativeMode::ReverseModePrimal => {
                unreachable!("invalid DerivativeMode: ReverseModePrimal")
            }
            DerivativeMode::ReverseModeGradient | DerivativeMode::ReverseModeCombined => {
                let shadow = self.invert_pointer(orig_ptr, pos);
                self.lookup.lookup(&mut self.func, shadow, pos)
            }
        };

        let orig_ptr_ty = self.old_func.dfg.value_type(orig_ptr);
        let orig_addr_space = self.old_func.dfg.types.addr_space(orig_ptr_ty).unwrap_or(0);
        let orig_pointee = self.old_func.dfg.pointee_type(orig_ptr);
        let align = align
            .filter(|&align| align != 0)
            .unwrap_or_else(|| self.func.dfg.types.abi_align(adding_type) as u32);
        let align = if start % align as u64 != 0 { 1 } else { align };
        let access = ShadowAccess {
            adding_type,
            start,
            size,
            align,
            inversion_allocs: self.inversion_allocs,
        };
        let width = self.width;

        trace!(
            "accumulating {dif} into the shadow of {orig_ptr} (bytes {start}..{})",
            start + size
        );

        let ptr_needs_cast = orig_pointee != adding_type;
        let ptr = if start != 0 || ptr_needs_cast {
            let ptr_ty = self.func.dfg.types.ptr_in(adding_type, orig_addr_space);
            let mut cursor = self.cursor(pos);
            let res = for_each_lane(&mut cursor, width, &[ptr], Some(ptr_ty), |cursor, _, args| {
                Some(access.pointer(cursor, args[0], ptr_needs_cast))
            });
            lane_result(res)
        } else {
            ptr
        };

        let dif_ty = self.func.dfg.value_type(dif);
        let dif_needs_cast = if width == 1 {
            dif_ty != adding_type
        } else {
            match self.func.dfg.types.sequence(dif_ty) {
                Some((elem, _)) => elem != adding_type,
                None => unreachable!("batched increment {dif} is not an array"),
            }
        };
        let dif = if dif_needs_cast {
            let mut cursor = self.cursor(pos);
            let res =
                for_each_lane(&mut cursor, width, &[dif], Some(adding_type), |cursor, _, args| {
                    Some(access.increment(cursor, args[0]))
                });
            lane_result(res)
        } else {
            dif
        };

        let tmp_orig = self.old_func.dfg.underlying_object(orig_ptr, 100);
        let mut atomic = self.atomic_add;
        let is_alloca = matches!(
            self.old_func.dfg.value_dfg_data(tmp_orig),
            Some(InstructionData::Alloca { .. })
        );
        if is_alloca && self.func.target.is_gpu() {
            atomic = false;
        }
        if self.backwards_only_shadows.contains(&tmp_orig) {
            atomic = false;
        }

        if atomic {
            self.atomic_accumulate(&access, orig_addr_space, ptr, dif, pos, mask);
            return;
        }

        if let Some(mask) = mask {
            let mut cursor = self.cursor(pos);
            for_each_lane(&mut cursor, width, &[ptr, dif], None, |cursor, _, args| {
                let (ptr, dif) = (args[0], args[1]);
                let passthru = cursor.func.dfg.zero(access.adding_type);
                let old = cursor.ins().masked_load(ptr, mask, passthru, access.align);
                let res = cursor.ins().fadd(old, dif);
                cursor.ins().masked_store(res, ptr, mask, access.align);
                None
            });
            return;
        }

        let orig_metadata = self.old_func.dfg.inst_metadata(orig).cloned().unwrap_or_default();
        let covers_orig = start == 0 && size == self.access_size(orig);
        let srcloc = self.old_func.srcloc(orig);
        let lane_scopes: Vec<_> = (0..width)
            .map(|lane| {
                let mut alias_scope = vec![self.derivative_alias_scope(orig_ptr, Some(lane))];
                alias_scope.extend_from_slice(&orig_metadata.alias_scope);
                let mut noalias = vec![self.derivative_alias_scope(orig_ptr, None)];
                for other in (0..width).filter(|&other| other != lane) {
                    noalias.push(self.derivative_alias_scope(orig_ptr, Some(other)));
                }
                noalias.extend_from_slice(&orig_metadata.noalias);
                (alias_scope, noalias)
            })
            .collect();

        let mut cursor = self.cursor(pos);
        for_each_lane(&mut cursor, width, &[ptr, dif], None, |cursor, lane, args| {
            let (ptr, dif) = (args[0], args[1]);
            let old = cursor.ins().load(ptr, access.align);
            let res = cursor.ins().fadd(old, dif);
            let store = cursor.ins().store(res, ptr, access.align);
            let load = match cursor.func.dfg.value_inst(old) {
                Some(load) => load,
                None => unreachable!(),
            };

            let (alias_scope, noalias) = &lane_scopes[lane as usize];
            for inst in [load, store] {
                let metadata = cursor.func.dfg.inst_metadata_mut(inst);
                metadata.alias_scope = alias_scope.clone();
                metadata.noalias = noalias.clone();
            }
            if covers_orig {
                copy_access_metadata(cursor, load, store, &orig_metadata, srcloc);
            }
            None
        });
    }

    fn atomic_accumulate(
        &mut self,
        access: &ShadowAccess,
        orig_addr_space: u32,
        ptr: Value,
        dif: Value,
        pos: CursorPosition,
        mask: Option<Value>,
    ) {
        let width = self.width;
        let mut ptr = ptr;
        if self.func.target == Arch::Amdgcn && orig_addr_space == 4 {
            let global_ty = self.func.dfg.types.ptr_in(access.adding_type, 1);
            let mut cursor = self.cursor(pos);
            let res =
                for_each_lane(&mut cursor, width, &[ptr], Some(global_ty), |cursor, _, args| {
                    Some(cursor.ins().addrspacecast(args[0], global_ty))
                });
            ptr = lane_result(res);
        }

        if let Some(mask) = mask {
            self.dump("masked atomic accumulation", &[ptr, dif, mask]);
            panic!("unhandled masked atomic fadd");
        }

        let vector_len = match self.func.dfg.types[access.adding_type] {
            TypeData::Vector { len, .. } => Some(len),
            _ => None,
        };
        let mut cursor = self.cursor(pos);
        for_each_lane(&mut cursor, width, &[dif, ptr], None, |cursor, _, args| {
            let (dif, ptr) = (args[0], args[1]);
            match vector_len {
                Some(len) => {
                    let zero = cursor.func.dfg.i64const(0);
                    for i in 0..len {
                        let elem_dif = cursor.ins().extract_element(dif, i);
                        let idx = cursor.func.dfg.i32const(i as i32);
                        let elem_ptr = cursor.ins().gep(ptr, &[zero, idx], false);
                        cursor.ins().atomic_fadd(
                            elem_ptr,
                            elem_dif,
                            access.align,
                            AtomicOrdering::Monotonic,
                        );
                    }
                }
                None => {
                    cursor.ins().atomic_fadd(ptr, dif, access.align, AtomicOrdering::Monotonic);
                }
            }
            None
        });
    }

    /// The number of bytes `orig` reads or writes.
    fn access_size(&self, orig: Inst) -> u64 {
        let dfg = &self.old_func.dfg;
        let ty = match dfg.insts[orig] {
            InstructionData::Store { args: [val, _], .. }
            | InstructionData::MaskedStore { args: [val, _, _], .. } => dfg.value_type(val),
            _ => match dfg.inst_result(orig) {
                Some(res) => dfg.value_type(res),
                None => return 0,
            },
        };
        dfg.types.store_size(ty)
    }
}

fn lane_result(res: Option<Value>) -> Value {
    match res {
        Some(res) => res,
        None => unreachable!("lane rule did not produce a value"),
    }
}

/// Copies the metadata and the source location of the original access `orig_metadata` to the
/// accumulation `load`/`store` pair.
fn copy_access_metadata(
    cursor: &mut FuncCursor<'_>,
    load: Inst,
    store: Inst,
    orig_metadata: &InstMetadata,
    srcloc: SourceLoc,
) {
    const LOAD_METADATA: [MetadataKind; 4] = [
        MetadataKind::Tbaa,
        MetadataKind::TbaaStruct,
        MetadataKind::NonNull,
        MetadataKind::Dereferenceable,
    ];
    const STORE_METADATA: [MetadataKind; 2] = [MetadataKind::Tbaa, MetadataKind::TbaaStruct];

    cursor.func.dfg.inst_metadata_mut(load).copy_from(orig_metadata, &LOAD_METADATA);
    cursor.func.dfg.inst_metadata_mut(store).copy_from(orig_metadata, &STORE_METADATA);
    if !srcloc.is_default() {
        cursor.func.set_srcloc(load, srcloc);
        cursor.func.set_srcloc(store, srcloc);
    }
}
