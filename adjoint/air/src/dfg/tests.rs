use crate::builder::InstBuilder;
use crate::cursor::{Cursor, FuncCursor};
use crate::{Function, InstructionData, ValueDef};

#[test]
fn constants_are_interned() {
    let mut func = Function::new();
    let a = func.dfg.f64const(2.0);
    let b = func.dfg.f64const(2.0);
    let c = func.dfg.f64const(-0.0);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert!(func.dfg.is_zero_const(c));
    assert!(!func.dfg.is_zero_const(a));

    let f64_ = func.dfg.types.f64();
    let arr = func.dfg.types.array(f64_, 2);
    let zero = func.dfg.zero(arr);
    let pos_zero = func.dfg.f64const(0.0);
    let agg = func.dfg.aggregate_const(arr, &[pos_zero, c]);
    assert!(func.dfg.is_zero_const(zero));
    assert!(func.dfg.is_zero_const(agg));
    assert_eq!(func.dfg.value_type(agg), arr);
}

#[test]
fn placeholders() {
    let mut func = Function::new();
    let f64_ = func.dfg.types.f64();
    let x = func.append_param(f64_);
    let block = func.layout.append_new_block();
    let placeholder = func.dfg.make_placeholder(f64_);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(block);
    let sum = cursor.ins().fadd(placeholder, x);
    let inst = func.dfg.value_inst(sum).unwrap();
    assert_eq!(func.dfg.inst_args(inst), &[placeholder, x]);

    func.dfg.replace_placeholder(placeholder, x);
    assert_eq!(func.dfg.inst_args(inst), &[x, x]);
    assert_eq!(*func.dfg.value_def(placeholder), ValueDef::Invalid);
    assert_eq!(func.dfg.uses(placeholder).count(), 0);
}

#[test]
fn underlying_object() {
    let mut func = Function::new();
    let f64_ = func.dfg.types.f64();
    let i8_ = func.dfg.types.i8();
    let arr = func.dfg.types.array(f64_, 4);
    let i8_ptr = func.dfg.types.ptr(i8_);
    let block = func.layout.append_new_block();
    let zero = func.dfg.i64const(0);
    let two = func.dfg.i64const(2);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(block);
    let slot = cursor.ins().alloca(arr, 8);
    let elem = cursor.ins().gep(slot, &[zero, two], true);
    let bytes = cursor.ins().ptrcast(elem, i8_ptr);

    assert_eq!(func.dfg.underlying_object(bytes, 100), slot);
    assert_eq!(func.dfg.underlying_object(bytes, 1), elem);
    assert_eq!(func.dfg.pointee_type(elem), f64_);
    assert!(matches!(
        func.dfg.value_dfg_data(slot),
        Some(InstructionData::Alloca { align: 8, .. })
    ));
}
