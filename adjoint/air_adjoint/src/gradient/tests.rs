use air::builder::InstBuilder;
use air::cursor::{Cursor, FuncCursor};
use air::{Block, Function, Param};

use crate::tests::{leaf, reverse_utils};
use crate::{ActivitySet, AdjointConfig, DerivativeMode, GradientUtils, PrimalClone};

/// `entry -> (then | else) -> exit`
fn diamond() -> (Function, [Block; 4]) {
    let mut func = Function::with_name("diamond".to_owned());
    let i1 = func.dfg.types.i1();
    let cond = func.append_param(i1);
    let entry = func.layout.append_new_block();
    let then_bb = func.layout.append_new_block();
    let else_bb = func.layout.append_new_block();
    let exit = func.layout.append_new_block();
    func.set_block_name(exit, "exit".to_owned());

    let mut cursor = FuncCursor::new(&mut func).at_bottom(entry);
    cursor.ins().br(cond, then_bb, else_bb);
    cursor.goto_bottom(then_bb);
    cursor.ins().jump(exit);
    cursor.goto_bottom(else_bb);
    cursor.ins().jump(exit);
    cursor.goto_bottom(exit);
    cursor.ins().ret(None);
    (func, [entry, then_bb, else_bb, exit])
}

#[test]
fn reverse_blocks_mirror_the_primal() {
    let (func, blocks) = diamond();
    let activity = ActivitySet::new();
    let utils = reverse_utils(&func, &activity, 1, &[], AdjointConfig::default());
    assert_eq!(utils.num_reverse_blocks(), 4);
    assert_eq!(utils.original_entry(), Some(blocks[0]));
    assert_eq!(utils.func.layout.entry_block(), Some(utils.inversion_allocs));
    assert!(utils.reverse_blocks(utils.inversion_allocs).is_empty());

    for fwd in blocks {
        let revs = utils.reverse_blocks(fwd);
        assert_eq!(revs.len(), 1);
        assert_eq!(utils.primal_block(revs[0]), Some(fwd));
        assert_eq!(utils.func.layout.block_insts(revs[0]).count(), 0);
    }
    let rev_exit = utils.reverse_blocks(blocks[3])[0];
    assert_eq!(utils.func.block_name(rev_exit), Some("invertexit"));
    let rev_entry = utils.reverse_blocks(blocks[0])[0];
    assert_eq!(utils.func.block_name(rev_entry), Some("invertblock0"));
    assert_eq!(utils.primal_block(blocks[0]), None);
}

#[test]
fn emission_order_runs_successors_first() {
    let (func, [entry, then_bb, else_bb, exit]) = diamond();
    let activity = ActivitySet::new();
    let mut utils = reverse_utils(&func, &activity, 1, &[], AdjointConfig::default());
    let first_exit = utils.reverse_blocks(exit)[0];
    let second_exit = utils.append_reverse_block(exit);
    assert_eq!(utils.reverse_blocks(exit), &[first_exit, second_exit]);
    assert_eq!(utils.num_reverse_blocks(), 5);

    let order = utils.reverse_emission_order();
    let fwd: Vec<_> = order.iter().map(|&rev| utils.primal_block(rev).unwrap()).collect();
    assert_eq!(order.len(), 5);
    assert_eq!(&order[..2], &[second_exit, first_exit]);
    assert_eq!(fwd[4], entry);
    assert!(fwd[2..4].contains(&then_bb));
    assert!(fwd[2..4].contains(&else_bb));
}

#[test]
fn forward_modes_have_no_reverse_blocks() {
    let (func, blocks) = diamond();
    let activity = ActivitySet::new();
    for mode in [DerivativeMode::ForwardMode, DerivativeMode::ForwardModeSplit] {
        let clone = PrimalClone::new(&func, mode, 1, &[]);
        let utils = GradientUtils::new(&func, clone, &activity, AdjointConfig::default(), false);
        assert_eq!(utils.num_reverse_blocks(), 0);
        assert!(utils.reverse_blocks(blocks[3]).is_empty());
        assert!(utils.reverse_emission_order().is_empty());
        assert_eq!(utils.func.name, "fwddiffediamond");
    }

    let clone = PrimalClone::new(&func, DerivativeMode::ReverseModeGradient, 1, &[]);
    let utils = GradientUtils::new(&func, clone, &activity, AdjointConfig::default(), false);
    assert_eq!(utils.num_reverse_blocks(), 4);
}

#[test]
#[should_panic(expected = "invalid DerivativeMode: ReverseModePrimal")]
fn augmented_primal_is_rejected() {
    let (func, _) = diamond();
    let activity = ActivitySet::new();
    let mut clone = PrimalClone::new(&func, DerivativeMode::ReverseModeGradient, 1, &[]);
    clone.mode = DerivativeMode::ReverseModePrimal;
    GradientUtils::new(&func, clone, &activity, AdjointConfig::default(), false);
}

#[test]
fn clone_keeps_original_entities() {
    let (func, entry, params) = leaf("entities", |types| {
        let f64_ = types.f64();
        vec![types.ptr(f64_), f64_]
    });
    let activity = ActivitySet::new();
    let duplicated = [Param::from(0u32)];
    let clone = PrimalClone::new(&func, DerivativeMode::ReverseModeCombined, 3, &duplicated);
    assert_eq!(clone.new_block_from_original(entry), entry);
    assert_eq!(clone.new_from_original(params[1]), params[1]);
    assert_eq!(clone.func.name, "diffe3entities");

    let shadow = clone.inverted_pointers[&params[0]];
    let shadow_ty = clone.func.dfg.value_type(shadow);
    let ptr_ty = func.dfg.value_type(params[0]);
    assert_eq!(clone.func.dfg.types.sequence(shadow_ty), Some((ptr_ty, 3)));
    assert_eq!(clone.func.value_name(shadow), Some("v0'"));
    assert_eq!(clone.func.params.len(), 3);

    let mut utils = GradientUtils::new(&func, clone, &activity, AdjointConfig::default(), false);
    assert_eq!(utils.new_from_original(params[0]), params[0]);
    assert_eq!(utils.shadow_type(ptr_ty), shadow_ty);
    let pos = utils.before_terminator(entry);
    assert_eq!(utils.invert_pointer(params[0], pos), shadow);
}

#[test]
#[should_panic(expected = "only pointer arguments can be duplicated")]
fn scalars_can_not_be_duplicated() {
    let (func, _, _) = leaf("scalar", |types| vec![types.f64()]);
    PrimalClone::new(&func, DerivativeMode::ReverseModeCombined, 1, &[Param::from(0u32)]);
}

#[test]
fn alias_scopes_are_memoized() {
    let (func, _, params) = leaf("scopes", |types| {
        let f64_ = types.f64();
        let ptr = types.ptr(f64_);
        vec![ptr, ptr]
    });
    let activity = ActivitySet::new();
    let mut utils = reverse_utils(&func, &activity, 2, &[], AdjointConfig::default());
    let (a, b) = (params[0], params[1]);

    let primal = utils.derivative_alias_scope(a, None);
    let lane0 = utils.derivative_alias_scope(a, Some(0));
    let lane1 = utils.derivative_alias_scope(a, Some(1));
    let other = utils.derivative_alias_scope(b, Some(0));
    assert_eq!(utils.derivative_alias_scope(a, Some(0)), lane0);
    assert_ne!(lane0, lane1);
    assert_ne!(primal, lane0);
    assert_ne!(other, lane0);

    let metadata = &utils.func.dfg.metadata;
    assert_eq!(metadata.scopes[primal].domain, metadata.scopes[lane1].domain);
    assert_ne!(metadata.scopes[other].domain, metadata.scopes[lane0].domain);
    assert_eq!(metadata.domains[metadata.scopes[other].domain], "diffe_v1");
    assert_eq!(metadata.domains.len(), 2);
    assert_eq!(metadata.scopes.len(), 4);
}
