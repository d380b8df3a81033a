use crate::builder::InstBuilder;
use crate::cursor::{Cursor, FuncCursor};
use crate::{Function, Opcode};

#[test]
fn result_types() {
    let mut func = Function::new();
    let f32_ = func.dfg.types.f32();
    let f64_ = func.dfg.types.f64();
    let i32_ = func.dfg.types.i32();
    let i32_ptr = func.dfg.types.ptr(i32_);
    let st = func.dfg.types.struct_(&[f64_, i32_ptr, f64_]);
    let v4f32 = func.dfg.types.vector(f32_, 4);
    let v4i1 = {
        let i1 = func.dfg.types.i1();
        func.dfg.types.vector(i1, 4)
    };
    let st_ptr = func.dfg.types.ptr_in(st, 1);
    let base = func.append_param(st_ptr);
    let vec = func.append_param(v4f32);
    let block = func.layout.append_new_block();
    let zero = func.dfg.i32const(0);
    let one = func.dfg.i32const(1);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(block);
    let field = cursor.ins().gep(base, &[zero, one], true);
    let lt = cursor.ins().cmp(Opcode::Flt, vec, vec);
    let slot = cursor.ins().alloca(v4f32, 16);
    let loaded = cursor.ins().masked_load(slot, lt, vec, 16);
    let agg = cursor.ins().load(base, 8);
    let member = cursor.ins().extract_value(agg, 0);

    let types = &func.dfg.types;
    let field_ty = func.dfg.value_type(field);
    assert_eq!(types.pointee(field_ty), Some(i32_ptr));
    assert_eq!(types.addr_space(field_ty), Some(1));
    assert_eq!(func.dfg.value_type(lt), v4i1);
    assert_eq!(func.dfg.value_type(loaded), v4f32);
    assert_eq!(func.dfg.value_type(agg), st);
    assert_eq!(func.dfg.value_type(member), f64_);
}
