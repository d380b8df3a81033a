use air::builder::InstBuilder;
use air::cursor::{CursorPosition, FuncCursor};
use air::{AliasScope, Inst, InstructionData, Opcode, Type, TypeData, Value};
use log::trace;

use crate::gradient::GradientUtils;

impl GradientUtils<'_> {
    /// Accumulates `dif` into the derivative of `val`.
    ///
    /// `idxs` addresses a member of the (aggregate) derivative, `dif` must have the type of that
    /// member. Integer typed derivatives are reinterpreted as `adding_type` (or as `f64`/`f32`
    /// for 64/32 bit integers if `loose_types` is enabled) before they are added. With a `mask`
    /// only the enabled lanes of a vector derivative are updated.
    ///
    /// Returns the `select` instructions that were created by fusing a conditional increment
    /// into the accumulation.
    pub fn add_to_diffe(
        &mut self,
        val: Value,
        dif: Value,
        pos: CursorPosition,
        adding_type: Option<Type>,
        idxs: &[Value],
        mask: Option<Value>,
    ) -> Vec<Inst> {
        assert!(
            self.mode.is_reverse(),
            "add_to_diffe is only valid in reverse modes, not {}",
            self.mode
        );
        self.assert_original(val);

        let val_ty = self.old_func.dfg.value_type(val);
        if self.old_func.dfg.types.is_pointer(val_ty) {
            self.dump("add_to_diffe of pointer value", &[val, dif]);
            panic!("cannot accumulate into the pointer {val}, pointers have shadows");
        }
        if self.is_constant_value(val) {
            self.dump("add_to_diffe of constant value", &[val, dif]);
            panic!("cannot accumulate into the constant {val}");
        }

        let mut added_selects = Vec::new();
        let dif_ty = self.func.dfg.value_type(dif);
        let slot = self.get_differential(val);

        match self.func.dfg.types[dif_ty].clone() {
            TypeData::Struct { fields, .. } => {
                if mask.is_some() {
                    self.dump("masked add_to_diffe of a struct", &[val, dif]);
                    panic!("cannot handle recursive add_to_diffe with mask");
                }
                let mut member_idxs = idxs.to_vec();
                for (i, field) in fields.iter().enumerate() {
                    if self.func.dfg.types.is_pointer(*field) {
                        continue;
                    }
                    let member = self.cursor(pos).ins().extract_value(dif, i as u32);
                    member_idxs.push(self.func.dfg.i32const(i as i32));
                    let selects = self.add_to_diffe(val, member, pos, None, &member_idxs, None);
                    member_idxs.pop();
                    added_selects.extend(selects);
                }
                return added_selects;
            }
            TypeData::Array { elem, len } => {
                if mask.is_some() {
                    self.dump("masked add_to_diffe of an array", &[val, dif]);
                    panic!("cannot handle recursive add_to_diffe with mask");
                }
                if self.func.dfg.types.is_pointer(elem) {
                    return added_selects;
                }
                let mut member_idxs = idxs.to_vec();
                for i in 0..len {
                    let member = self.cursor(pos).ins().extract_value(dif, i);
                    member_idxs.push(self.func.dfg.i32const(i as i32));
                    let selects =
                        self.add_to_diffe(val, member, pos, adding_type, &member_idxs, None);
                    member_idxs.pop();
                    added_selects.extend(selects);
                }
                return added_selects;
            }
            _ if self.func.dfg.types.is_int_or_int_vector(dif_ty)
                || self.func.dfg.types.is_fp_or_fp_vector(dif_ty) => {}
            _ => {
                self.dump("unknown type to add to diffe", &[val, dif]);
                unreachable!(
                    "unknown type {} to add to diffe",
                    self.func.dfg.types.display(dif_ty)
                )
            }
        }

        let (ptr, align) = if idxs.is_empty() {
            (slot, self.slot_align(slot))
        } else {
            let mut gep_idxs = Vec::with_capacity(idxs.len() + 1);
            gep_idxs.push(self.func.dfg.i32const(0));
            gep_idxs.extend_from_slice(idxs);
            let ptr = self.cursor(pos).ins().gep(slot, &gep_idxs, true);
            (ptr, self.func.dfg.types.abi_align(dif_ty) as u32)
        };
        let lane_scopes = self.lane_alias_scopes(val, idxs);

        let old_ty = self.func.dfg.pointee_type(ptr);
        assert_eq!(
            old_ty,
            dif_ty,
            "increment {dif} of {val} does not match the type of its differential"
        );

        let adding_type = if self.func.dfg.types.is_int_or_int_vector(dif_ty) {
            let adding_type = adding_type.or_else(|| {
                if !self.config.loose_types {
                    return None;
                }
                let types = &mut self.func.dfg.types;
                if types.is_int_bits(dif_ty, 64) {
                    Some(types.f64())
                } else if types.is_int_bits(dif_ty, 32) {
                    Some(types.f32())
                } else {
                    None
                }
            });
            let mut adding_type = match adding_type {
                Some(ty) => ty,
                None => {
                    self.dump("no floating point type for an integer derivative", &[val, dif]);
                    panic!(
                        "unknown floating point type for adding to the {} derivative of {val}",
                        self.func.dfg.types.display(dif_ty)
                    );
                }
            };
            let types = &mut self.func.dfg.types;
            assert!(
                types.is_fp_or_fp_vector(adding_type),
                "cannot add {} values",
                types.display(adding_type)
            );
            let old_bits = types.size_in_bits(dif_ty);
            let new_bits = types.size_in_bits(adding_type);
            if old_bits > new_bits && old_bits % new_bits == 0 && !types.is_vector(adding_type) {
                adding_type = types.vector(adding_type, (old_bits / new_bits) as u32);
            }
            if types.size_in_bits(adding_type) != old_bits {
                let adding_type = types.display(adding_type).to_string();
                let dif_ty = types.display(dif_ty).to_string();
                self.dump("no bitwise mapping for an integer derivative", &[val, dif]);
                panic!("cannot reinterpret the {dif_ty} derivative of {val} as {adding_type}");
            }
            Some(adding_type)
        } else {
            None
        };

        trace!("accumulating {dif} into the derivative of {val} at {ptr}");

        let mut cursor = self.cursor(pos);
        let old = cursor.ins().load(ptr, align);
        let res = match adding_type {
            Some(adding_type) => {
                let bc_old = cursor.ins().bitcast(old, adding_type);
                let bc_dif = cursor.ins().bitcast(dif, adding_type);
                let (res, select) = fadd_for_select(&mut cursor, bc_old, bc_dif);
                let res = match select {
                    Some(select) => {
                        let (cond, then_val, else_val) = select_args(&cursor, select);
                        let then_val = cursor.ins().bitcast(then_val, dif_ty);
                        let else_val = cursor.ins().bitcast(else_val, dif_ty);
                        let res = cursor.ins().select(cond, then_val, else_val);
                        cursor.func.layout.remove_inst(select);
                        added_selects.push(defining_inst(&cursor, res));
                        res
                    }
                    None => cursor.ins().bitcast(res, dif_ty),
                };
                remove_if_unused(&mut cursor, bc_dif);
                res
            }
            None => {
                let (res, select) = fadd_for_select(&mut cursor, old, dif);
                added_selects.extend(select);
                res
            }
        };

        let store = match mask {
            Some(mask) => cursor.ins().masked_store(res, ptr, mask, align),
            None => cursor.ins().store(res, ptr, align),
        };
        if let Some((alias_scope, noalias)) = lane_scopes {
            for inst in [defining_inst(&cursor, old), store] {
                let metadata = cursor.func.dfg.inst_metadata_mut(inst);
                metadata.alias_scope = alias_scope.clone();
                metadata.noalias = noalias.clone();
            }
        }
        added_selects
    }

    /// Alias scopes of the lane of a batched derivative addressed by `idxs`. Accumulations into
    /// different lanes of the same slot never alias.
    fn lane_alias_scopes(
        &mut self,
        val: Value,
        idxs: &[Value],
    ) -> Option<(Vec<AliasScope>, Vec<AliasScope>)> {
        if self.width == 1 {
            return None;
        }
        let lane = self.func.dfg.as_int_const(*idxs.first()?)? as u32;
        let alias_scope = vec![self.derivative_alias_scope(val, Some(lane))];
        let noalias = (0..self.width)
            .filter(|&other| other != lane)
            .map(|other| self.derivative_alias_scope(val, Some(other)))
            .collect();
        Some((alias_scope, noalias))
    }
}

/// Adds `inc` to `old`, folding `0 - x` increments into `old - x`.
fn fadd_for_neg(cursor: &mut FuncCursor<'_>, old: Value, inc: Value) -> Value {
    if let Some(InstructionData::Binary { opcode: Opcode::Fsub, args: [lhs, rhs] }) =
        cursor.func.dfg.value_dfg_data(inc)
    {
        let (lhs, rhs) = (*lhs, *rhs);
        if cursor.func.dfg.is_zero_const(lhs) {
            return cursor.ins().fsub(old, rhs);
        }
    }
    cursor.ins().fadd(old, inc)
}

/// Adds `dif` to `old`. If `dif` selects between zero and some value (possibly behind a
/// bitcast) the addition is moved into the select so that the unchanged `old` is used when the
/// zero is selected. Returns the new select (if any) alongside the result.
fn fadd_for_select(cursor: &mut FuncCursor<'_>, old: Value, dif: Value) -> (Value, Option<Inst>) {
    let (select, cast_to) = match cursor.func.dfg.value_dfg_data(dif) {
        Some(InstructionData::Select { .. }) => (dif, None),
        Some(&InstructionData::Cast { opcode: Opcode::Bitcast, arg, ty }) => {
            match cursor.func.dfg.value_dfg_data(arg) {
                Some(InstructionData::Select { .. }) => (arg, Some(ty)),
                _ => return (fadd_for_neg(cursor, old, dif), None),
            }
        }
        _ => return (fadd_for_neg(cursor, old, dif), None),
    };

    let (cond, then_val, else_val) = match cursor.func.dfg.value_dfg_data(select) {
        Some(&InstructionData::Select { args }) => (args[0], args[1], args[2]),
        _ => unreachable!(),
    };
    let res = if cursor.func.dfg.is_zero_const(then_val) {
        let inc = bitcast_to(cursor, else_val, cast_to);
        let sum = fadd_for_neg(cursor, old, inc);
        cursor.ins().select(cond, old, sum)
    } else if cursor.func.dfg.is_zero_const(else_val) {
        let inc = bitcast_to(cursor, then_val, cast_to);
        let sum = fadd_for_neg(cursor, old, inc);
        cursor.ins().select(cond, sum, old)
    } else {
        return (fadd_for_neg(cursor, old, dif), None);
    };
    (res, Some(defining_inst(cursor, res)))
}

fn bitcast_to(cursor: &mut FuncCursor<'_>, val: Value, ty: Option<Type>) -> Value {
    match ty {
        Some(ty) => cursor.ins().bitcast(val, ty),
        None => val,
    }
}

fn defining_inst(cursor: &FuncCursor<'_>, val: Value) -> Inst {
    match cursor.func.dfg.value_inst(val) {
        Some(inst) => inst,
        None => unreachable!("{val} is not an instruction result"),
    }
}

fn select_args(cursor: &FuncCursor<'_>, select: Inst) -> (Value, Value, Value) {
    match cursor.func.dfg.insts[select] {
        InstructionData::Select { args } => (args[0], args[1], args[2]),
        _ => unreachable!("{select} is not a select"),
    }
}

/// Removes the instruction defining `val` from the layout if no inserted instruction uses it.
pub(crate) fn remove_if_unused(cursor: &mut FuncCursor<'_>, val: Value) {
    let inst = match cursor.func.dfg.value_inst(val) {
        Some(inst) => inst,
        None => return,
    };
    if cursor.func.layout.inst_block(inst).is_none() {
        return;
    }
    let layout = &cursor.func.layout;
    let used = cursor.func.dfg.uses(val).any(|user| layout.inst_block(user).is_some());
    if !used {
        cursor.func.layout.remove_inst(inst);
    }
}
