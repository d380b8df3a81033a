use expect_test::expect;

use crate::builder::InstBuilder;
use crate::cursor::{Cursor, FuncCursor};
use crate::Function;

#[test]
fn basic() {
    let mut func = Function::with_name("foo".to_owned());
    let f64_ = func.dfg.types.f64();
    let ptr = func.dfg.types.ptr(f64_);
    let v0 = func.append_param(ptr);
    let v1 = func.append_param(f64_);
    let block = func.layout.append_new_block();
    let c = func.dfg.f64const(1.5);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(block);
    let x = cursor.ins().load(v0, 8);
    let sum = cursor.ins().fadd(x, c);
    let prod = cursor.ins().fmul(sum, v1);
    let store = cursor.ins().store(prod, v0, 8);
    cursor.ins().ret(None);

    func.set_value_name(x, "x".to_owned());
    let domain = func.dfg.metadata.make_domain("primal".to_owned());
    let scope = func.dfg.metadata.make_scope(domain, "p".to_owned());
    func.dfg.inst_metadata_mut(store).alias_scope.push(scope);

    let expected = expect![[r#"
        function %foo(v0: ptr<f64>, v1: f64) {
            v2 = f64 1.5
        block0:
            v3 = load v0, align 8 ; x
            v4 = fadd v3, v2
            v5 = fmul v4, v1
            store v5, v0, align 8, !alias_scope [scope0]
            ret
        }
    "#]];
    expected.assert_eq(&func.to_debug_string());
}

#[test]
fn memory_and_control_flow() {
    let mut func = Function::with_name("bar".to_owned());
    let i1 = func.dfg.types.i1();
    let f32_ = func.dfg.types.f32();
    let v4f32 = func.dfg.types.vector(f32_, 4);
    let cond = func.append_param(i1);
    let entry = func.layout.append_new_block();
    let exit = func.layout.append_new_block();
    func.set_block_name(exit, "exit".to_owned());
    let mask = func.dfg.mask_const(&[true, false]);
    let zero = func.dfg.zero(v4f32);

    let mut cursor = FuncCursor::new(&mut func).at_bottom(entry);
    let slot = cursor.ins().alloca(v4f32, 16);
    let elem = cursor.ins().extract_element(zero, 1);
    let vec = cursor.ins().insert_element(zero, elem, 0);
    cursor.ins().store(vec, slot, 16);
    cursor.ins().br(cond, exit, exit);
    cursor.goto_bottom(exit);
    cursor.ins().ret(Some(mask));

    let expected = expect![[r#"
        function %bar(v0: i1) {
            v3 = <2 x i1> <i1 1, i1 0>
            v4 = <4 x f32> zeroinitializer
        block0:
            v5 = alloca <4 x f32>, align 16
            v6 = extractelement v4, 1
            v7 = insertelement v4, v6, 0
            store v7, v5, align 16
            br v0, block1, block1
        block1: ; exit
            ret v3
        }
    "#]];
    expected.assert_eq(&func.to_debug_string());
}
