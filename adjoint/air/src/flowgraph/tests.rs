use crate::builder::InstBuilder;
use crate::cursor::{Cursor, FuncCursor};
use crate::{ControlFlowGraph, Function};

#[test]
fn diamond_with_loop() {
    let mut func = Function::new();
    let i1 = func.dfg.types.i1();
    let cond = func.append_param(i1);
    let entry = func.layout.append_new_block();
    let left = func.layout.append_new_block();
    let right = func.layout.append_new_block();
    let exit = func.layout.append_new_block();

    let mut cursor = FuncCursor::new(&mut func).at_bottom(entry);
    cursor.ins().br(cond, left, right);
    cursor.goto_bottom(left);
    cursor.ins().jump(exit);
    cursor.goto_bottom(right);
    cursor.ins().br(cond, right, exit);
    cursor.goto_bottom(exit);
    cursor.ins().ret(None);

    let cfg = ControlFlowGraph::with_function(&func);
    assert_eq!(cfg.succs(entry), &[left, right]);
    assert_eq!(cfg.preds(exit), &[left, right]);
    assert_eq!(cfg.preds(right), &[entry, right]);

    assert_eq!(cfg.postorder(entry), vec![exit, left, right, entry]);

    assert!(cfg.has_path(entry, exit));
    assert!(cfg.has_path(right, right));
    assert!(!cfg.has_path(left, right));
    assert!(!cfg.has_path(exit, entry));
}
