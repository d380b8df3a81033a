use air::builder::InstBuilder;
use air::cursor::CursorPosition;
use air::{InstructionData, Value};
use log::debug;
use stdx::{impl_debug_display, impl_idx_from};

use crate::clone::value_label;
use crate::gradient::GradientUtils;

/// Stable index of a differential slot, slots are numbered in creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiffSlot(u32);
impl_idx_from!(DiffSlot(u32));
impl_debug_display!(DiffSlot => "slot");

impl GradientUtils<'_> {
    /// Returns the differential slot of `val`, creating it on first use.
    ///
    /// Slots are stack allocations of the shadow type of `val` placed in the inversion
    /// allocation block. They are zero initialized right after they are allocated so every
    /// read that happens before the first accumulation observes zero.
    pub fn get_differential(&mut self, val: Value) -> Value {
        self.assert_original(val);
        if let Some(&slot) = self.differentials.get(&val) {
            return slot;
        }

        if self.is_constant_value(val) {
            self.dump("differential slot requested for a constant value", &[val]);
            panic!("constant value {val} has no differential");
        }

        let ty = self.old_func.dfg.value_type(val);
        let ty = self.shadow_type(ty);
        let align = self.func.dfg.types.pref_align(ty) as u32;
        let pos = self.before_terminator(self.inversion_allocs);

        let mut cursor = self.cursor(pos);
        let slot = cursor.ins().alloca(ty, align);
        let zero = cursor.func.dfg.zero(ty);
        cursor.ins().store(zero, slot, align);

        let name = format!("{}'de", value_label(self.old_func, val));
        debug!("created differential slot {slot} ({name}) for {val}");
        self.func.set_value_name(slot, name);
        self.differentials.insert_full(val, slot);
        slot
    }

    /// The stable index of the slot of `val` (if it was already created).
    pub fn slot_index(&self, val: Value) -> Option<DiffSlot> {
        self.differentials.index_of(&val)
    }

    /// The values that own a differential slot, in slot order.
    pub fn differentials(&self) -> impl Iterator<Item = (DiffSlot, Value, Value)> + '_ {
        self.differentials.iter_enumerated().map(|(idx, (&val, &slot))| (idx, val, slot))
    }

    pub(crate) fn slot_align(&self, slot: Value) -> u32 {
        match self.func.dfg.value_dfg_data(slot) {
            Some(InstructionData::Alloca { align, .. }) => *align,
            _ => unreachable!("differential slot {slot} is not an alloca"),
        }
    }

    /// Reads the current derivative of `val` at `pos`.
    ///
    /// In forward modes the derivative is the shadow of `val` instead of a slot.
    pub fn diffe(&mut self, val: Value, pos: CursorPosition) -> Value {
        self.assert_original(val);
        if self.is_constant_value(val) {
            self.dump("diffe of constant value", &[val]);
            panic!("getting diffe of constant value {val}");
        }
        if self.mode.is_forward() {
            return self.invert_pointer(val, pos);
        }

        let ty = self.old_func.dfg.value_type(val);
        let types = &self.old_func.dfg.types;
        if types.is_pointer(ty) || types.is_void(ty) {
            self.dump("diffe of pointer or void value", &[val]);
            panic!(
                "{val} of type {} has no scalar derivative",
                self.old_func.dfg.types.display(ty)
            );
        }

        let slot = self.get_differential(val);
        let align = self.slot_align(slot);
        self.cursor(pos).ins().load(slot, align)
    }

    /// Replaces the derivative of `val` with `toset`.
    ///
    /// Reverse modes overwrite the slot (usually with zero once the derivative was consumed).
    /// Forward modes install `toset` as the shadow of `val`; the placeholder that stood in for
    /// the shadow until now is substituted with `toset` by
    /// [`resolve_placeholders`](GradientUtils::resolve_placeholders).
    pub fn set_diffe(&mut self, val: Value, toset: Value, pos: CursorPosition) {
        self.assert_original(val);
        if self.is_constant_value(val) {
            self.dump("set_diffe of constant value", &[val]);
            panic!("setting diffe of constant value {val}");
        }

        let ty = self.old_func.dfg.value_type(val);
        let shadow_ty = self.shadow_type(ty);
        let toset_ty = self.func.dfg.value_type(toset);

        if self.mode.is_forward() {
            assert_eq!(
                toset_ty,
                shadow_ty,
                "{toset} does not have the shadow type {} of {val}",
                self.func.dfg.types.display(shadow_ty)
            );
            let placeholder = match self.inverted_pointers.get(&val) {
                Some(&placeholder) => placeholder,
                None => {
                    self.dump("set_diffe without a shadow placeholder", &[val, toset]);
                    panic!("{val} has no shadow placeholder");
                }
            };
            assert!(
                self.placeholders.is_pending(placeholder),
                "the shadow {placeholder} of {val} is not a placeholder"
            );
            self.placeholders.substitute(placeholder, toset);
            self.inverted_pointers.insert(val, toset);
            return;
        }

        let slot = self.get_differential(val);
        if toset_ty != shadow_ty {
            self.dump("set_diffe with mismatched type", &[toset, slot]);
            panic!(
                "cannot store {toset} of type {} into the differential of {val}",
                self.func.dfg.types.display(toset_ty)
            );
        }
        let align = self.slot_align(slot);
        self.cursor(pos).ins().store(toset, slot, align);
    }
}
