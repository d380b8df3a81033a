use crate::{Block, InstructionData, Opcode, Value};

#[test]
fn arguments() {
    let v0 = Value::from(0u32);
    let v1 = Value::from(1u32);
    let v2 = Value::from(2u32);

    let store = InstructionData::Store { args: [v0, v1], align: 8 };
    assert_eq!(store.arguments(), &[v0, v1]);
    assert_eq!(store.memory_pointer(), Some(v1));
    assert_eq!(store.opcode(), Opcode::Store);

    let mut select = InstructionData::Select { args: [v0, v1, v2] };
    select.arguments_mut()[2] = v0;
    assert_eq!(select, InstructionData::Select { args: [v0, v1, v0] });

    let ret = InstructionData::Ret { arg: None };
    assert!(ret.arguments().is_empty());
    assert!(ret.is_terminator());
}

#[test]
fn successors() {
    let bb0 = Block::from(0u32);
    let bb1 = Block::from(1u32);
    let cond = Value::from(0u32);

    let mut succs = Vec::new();
    InstructionData::Branch { cond, then_dst: bb0, else_dst: bb1 }
        .visit_successors(|bb| succs.push(bb));
    assert_eq!(succs, vec![bb0, bb1]);

    succs.clear();
    InstructionData::Branch { cond, then_dst: bb1, else_dst: bb1 }
        .visit_successors(|bb| succs.push(bb));
    assert_eq!(succs, vec![bb1]);

    succs.clear();
    InstructionData::Ret { arg: Some(cond) }.visit_successors(|bb| succs.push(bb));
    assert!(succs.is_empty());
}
