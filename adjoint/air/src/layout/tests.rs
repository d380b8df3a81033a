use super::Layout;
use crate::{Block, Inst};

fn verify(layout: &Layout, blocks: &[(Block, &[Inst])]) {
    let found: Vec<_> = layout.blocks().collect();
    let expected: Vec<_> = blocks.iter().map(|&(block, _)| block).collect();
    assert_eq!(found, expected);

    for &(block, insts) in blocks {
        let forward: Vec<_> = layout.block_insts(block).collect();
        assert_eq!(forward, insts);
        let mut backward: Vec<_> = layout.block_insts(block).rev().collect();
        backward.reverse();
        assert_eq!(backward, insts);
        for &inst in insts {
            assert_eq!(layout.inst_block(inst), Some(block));
        }
    }
}

#[test]
fn block_order() {
    let mut layout = Layout::new();
    let b0 = layout.make_block();
    let b1 = layout.make_block();
    let b2 = layout.make_block();
    assert!(!layout.is_block_inserted(b0));

    layout.append_block(b1);
    layout.append_block(b2);
    verify(&layout, &[(b1, &[]), (b2, &[])]);

    layout.insert_block(b0, b1);
    verify(&layout, &[(b0, &[]), (b1, &[]), (b2, &[])]);
    assert_eq!(layout.entry_block(), Some(b0));
    assert_eq!(layout.last_block(), Some(b2));

    layout.remove_empty_block(b1);
    assert!(!layout.is_block_inserted(b1));
    verify(&layout, &[(b0, &[]), (b2, &[])]);

    layout.remove_empty_block(b2);
    assert_eq!(layout.last_block(), Some(b0));
    layout.append_block(b1);
    verify(&layout, &[(b0, &[]), (b1, &[])]);
}

#[test]
fn inst_order() {
    let mut layout = Layout::new();
    let b0 = layout.append_new_block();
    let b1 = layout.append_new_block();
    let i0 = Inst::from(0u32);
    let i1 = Inst::from(1u32);
    let i2 = Inst::from(2u32);
    let i3 = Inst::from(3u32);

    layout.append_inst_to_bb(i2, b0);
    layout.prepend_inst(i0, i2);
    layout.prepend_inst(i1, i2);
    layout.append_inst_to_bb(i3, b1);
    verify(&layout, &[(b0, &[i0, i1, i2]), (b1, &[i3])]);

    layout.remove_inst(i1);
    assert_eq!(layout.inst_block(i1), None);
    verify(&layout, &[(b0, &[i0, i2]), (b1, &[i3])]);

    layout.remove_inst(i2);
    layout.remove_inst(i0);
    verify(&layout, &[(b0, &[]), (b1, &[i3])]);

    layout.append_inst_to_bb(i0, b0);
    layout.prepend_inst(i1, i0);
    verify(&layout, &[(b0, &[i1, i0]), (b1, &[i3])]);
}
