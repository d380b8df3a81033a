use air::builder::InstBuilder;
use air::cursor::{Cursor, FuncCursor};
use air::{AtomicOrdering, Function, Opcode};
use float_cmp::assert_approx_eq;

use crate::{run, Data, Memory};

/// `sum(a[0..n])` written as a loop with phis.
fn array_sum() -> Function {
    let mut func = Function::with_name("array_sum".to_owned());
    let f64_ = func.dfg.types.f64();
    let i64_ = func.dfg.types.i64();
    let ptr = func.dfg.types.ptr(f64_);
    let a = func.append_param(ptr);
    let n = func.append_param(i64_);

    let entry = func.layout.append_new_block();
    let header = func.layout.append_new_block();
    let body = func.layout.append_new_block();
    let exit = func.layout.append_new_block();
    let zero = func.dfg.i64const(0);
    let one = func.dfg.i64const(1);
    let fzero = func.dfg.f64const(0.0);
    let next_i = func.dfg.make_placeholder(i64_);
    let next_acc = func.dfg.make_placeholder(f64_);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(entry);
    cursor.ins().jump(header);
    cursor.goto_bottom(header);
    let i = cursor.ins().phi(&[(entry, zero), (body, next_i)]);
    let acc = cursor.ins().phi(&[(entry, fzero), (body, next_acc)]);
    let cond = cursor.ins().cmp(Opcode::Ilt, i, n);
    cursor.ins().br(cond, body, exit);
    cursor.goto_bottom(body);
    let elem = cursor.ins().gep(a, &[i], true);
    let x = cursor.ins().load(elem, 8);
    let acc_ = cursor.ins().fadd(acc, x);
    let i_ = cursor.ins().iadd(i, one);
    cursor.ins().jump(header);
    cursor.goto_bottom(exit);
    cursor.ins().ret(Some(acc));

    func.dfg.replace_placeholder(next_i, i_);
    func.dfg.replace_placeholder(next_acc, acc_);
    func
}

#[test]
fn loop_with_phis() {
    let func = array_sum();
    let mut memory = Memory::new();
    let a = memory.alloc_f64s(&[1.0, 2.5, 4.0, -0.5]);
    let (res, stats) = run(&func, &mut memory, &[a.into(), Data::int(64, 4)]).unwrap();
    assert_approx_eq!(f64, res.unwrap().f64().unwrap(), 7.0);
    assert_eq!(stats.atomic_rmws, 0);

    let (res, _) = run(&func, &mut memory, &[a.into(), Data::int(64, 0)]).unwrap();
    assert_eq!(res, Some(Data::F64(0.0)));
}

#[test]
fn out_of_bounds_is_reported() {
    let func = array_sum();
    let mut memory = Memory::new();
    let a = memory.alloc_f64s(&[1.0, 2.0]);
    let err = run(&func, &mut memory, &[a.into(), Data::int(64, 3)]).unwrap_err();
    assert!(format!("{err:#}").contains("out of bounds"), "{err:#}");
}

#[test]
fn struct_fields_and_bitcast() {
    let mut func = Function::with_name("fields".to_owned());
    let f64_ = func.dfg.types.f64();
    let i64_ = func.dfg.types.i64();
    let i32_ = func.dfg.types.i32();
    let i32_ptr = func.dfg.types.ptr(i32_);
    let st = func.dfg.types.struct_(&[f64_, i32_ptr, f64_]);
    let st_ptr = func.dfg.types.ptr(st);
    let base = func.append_param(st_ptr);
    let block = func.layout.append_new_block();
    let zero = func.dfg.i32const(0);
    let two = func.dfg.i32const(2);
    let val = func.dfg.f64const(1.0);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(block);
    let field = cursor.ins().gep(base, &[zero, two], true);
    cursor.ins().store(val, field, 8);
    let bits = cursor.ins().bitcast(val, i64_);
    cursor.ins().ret(Some(bits));

    let mut memory = Memory::new();
    let types = &func.dfg.types;
    let init = Data::zero(types, st);
    let ptr = memory.alloc_data(types, st, &init).unwrap();
    let (res, _) = run(&func, &mut memory, &[ptr.into()]).unwrap();
    assert_eq!(res, Some(Data::int(64, 0x3ff0_0000_0000_0000)));
    assert_approx_eq!(f64, memory.read_f64(ptr.offset_by(16)).unwrap(), 1.0);
    assert_approx_eq!(f64, memory.read_f64(ptr).unwrap(), 0.0);
}

#[test]
fn masked_memory_and_atomics() {
    let mut func = Function::with_name("masked".to_owned());
    let f64_ = func.dfg.types.f64();
    let v2f64 = func.dfg.types.vector(f64_, 2);
    let ptr = func.dfg.types.ptr(v2f64);
    let f64_ptr = func.dfg.types.ptr(f64_);
    let dst = func.append_param(ptr);
    let scalar = func.append_param(f64_ptr);
    let block = func.layout.append_new_block();
    let mask = func.dfg.mask_const(&[false, true]);
    let passthru = func.dfg.zero(v2f64);
    let one = func.dfg.f64const(1.0);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(block);
    let old = cursor.ins().masked_load(dst, mask, passthru, 16);
    let doubled = cursor.ins().fadd(old, old);
    cursor.ins().masked_store(doubled, dst, mask, 16);
    let prev = cursor.ins().atomic_fadd(scalar, one, 8, AtomicOrdering::Monotonic);
    cursor.ins().ret(Some(prev));

    let mut memory = Memory::new();
    let vec = memory.alloc_f64s(&[3.0, 5.0]);
    let acc = memory.alloc_f64s(&[2.0]);
    let (res, stats) = run(&func, &mut memory, &[vec.into(), acc.into()]).unwrap();
    assert_eq!(res, Some(Data::F64(2.0)));
    assert_eq!(stats.atomic_rmws, 1);
    assert_approx_eq!(f64, memory.read_f64(vec).unwrap(), 3.0);
    assert_approx_eq!(f64, memory.read_f64(vec.offset_by(8)).unwrap(), 10.0);
    assert_approx_eq!(f64, memory.read_f64(acc).unwrap(), 3.0);
}

#[test]
fn heap_lifetime_errors() {
    let mut func = Function::with_name("double_free".to_owned());
    let f64_ = func.dfg.types.f64();
    let block = func.layout.append_new_block();
    let size = func.dfg.i64const(8);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(block);
    let mem = cursor.ins().malloc(size, f64_);
    cursor.ins().free(mem);
    cursor.ins().free(mem);
    cursor.ins().ret(None);

    let mut memory = Memory::new();
    let err = run(&func, &mut memory, &[]).unwrap_err();
    assert!(format!("{err:#}").contains("double free"), "{err:#}");
    assert_eq!(memory.live_heap_allocs(), 0);

    let mut memory = Memory::new();
    let ptr = memory.alloc_f64s(&[1.0]);
    assert!(memory.free(ptr).is_err());
    assert!(memory.is_live(ptr.alloc));
}
