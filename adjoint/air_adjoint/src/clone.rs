use ahash::AHashMap;
use air::builder::InstBuilder;
use air::cursor::{Cursor, CursorPosition, FuncCursor};
use air::{Block, Function, Param, Type, TypeTable, Value};
use typed_index_collections::TiVec;

use crate::DerivativeMode;

/// A copy of the primal function that the adjoint is generated into.
///
/// The clone keeps all entity numbers of the original, so values and blocks of the original
/// function can be used to index into the clone. New blocks and values are only appended: the
/// inversion-allocation block (which becomes the new entry block and jumps to the primal entry)
/// and the shadow parameters of duplicated arguments.
#[derive(Clone, Debug)]
pub struct PrimalClone {
    pub func: Function,
    pub mode: DerivativeMode,
    pub width: u32,
    /// Block that holds the allocations needed by the reverse pass, it dominates every other
    /// block.
    pub inversion_allocs: Block,
    /// The blocks of the primal function in layout order (without the inversion-allocation
    /// block).
    pub original_blocks: Vec<Block>,
    /// Shadow pointers of the duplicated arguments.
    pub inverted_pointers: AHashMap<Value, Value>,
    pub(crate) original_to_new: TiVec<Value, Value>,
    block_map: TiVec<Block, Block>,
}

impl PrimalClone {
    /// Clones `original` for a derivative of `mode` with `width` lanes. Every parameter in
    /// `duplicated` must be a pointer and receives an additional shadow parameter.
    pub fn new(
        original: &Function,
        mode: DerivativeMode,
        width: u32,
        duplicated: &[Param],
    ) -> PrimalClone {
        assert_ne!(width, 0, "derivatives need at least one lane");
        let prefix = mode.prefix();
        let name = if width > 1 {
            format!("{prefix}{width}{}", original.name)
        } else {
            format!("{prefix}{}", original.name)
        };

        let mut func = original.clone();
        func.name = name;

        let original_to_new: TiVec<Value, Value> =
            original.dfg.values.iter().collect::<Vec<_>>().into();
        let block_map: TiVec<Block, Block> =
            (0..original.layout.num_blocks()).map(Block::from).collect::<Vec<_>>().into();
        let original_blocks: Vec<Block> = func.layout.blocks().collect();

        let entry = match func.layout.entry_block() {
            Some(entry) => entry,
            None => unreachable!("{} has no body and can not be differentiated", original.name),
        };
        let inversion_allocs = func.layout.make_block();
        func.layout.insert_block(inversion_allocs, entry);
        func.set_block_name(inversion_allocs, "allocsForInversion".to_owned());
        FuncCursor::new(&mut func).at_bottom(inversion_allocs).ins().jump(entry);

        let mut inverted_pointers = AHashMap::new();
        for &param in duplicated {
            let val = original.param(param);
            let ty = original.dfg.value_type(val);
            assert!(
                func.dfg.types.is_pointer(ty),
                "only pointer arguments can be duplicated, {val} has type {}",
                func.dfg.types.display(ty)
            );
            let shadow_ty = shadow_type(&mut func.dfg.types, ty, width);
            let shadow = func.append_param(shadow_ty);
            func.set_value_name(shadow, format!("{}'", value_label(original, val)));
            inverted_pointers.insert(val, shadow);
        }

        PrimalClone {
            func,
            mode,
            width,
            inversion_allocs,
            original_blocks,
            inverted_pointers,
            original_to_new,
            block_map,
        }
    }

    pub fn new_from_original(&self, val: Value) -> Value {
        self.original_to_new[val]
    }

    pub fn new_block_from_original(&self, block: Block) -> Block {
        self.block_map[block]
    }
}

/// Makes values of the forward pass available in the reverse pass (by caching or
/// recomputation).
pub trait ValueLookup {
    /// Returns a value equivalent to `val` that can be used at `pos`.
    fn lookup(&mut self, func: &mut Function, val: Value, pos: CursorPosition) -> Value;
}

/// Uses forward values directly. This is correct whenever the forward definitions dominate the
/// reverse pass and are not overwritten (combined mode without loops that redefine them).
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityLookup;

impl ValueLookup for IdentityLookup {
    fn lookup(&mut self, _func: &mut Function, val: Value, _pos: CursorPosition) -> Value {
        val
    }
}

/// `ty` for a single lane, `[width x ty]` otherwise.
pub(crate) fn shadow_type(types: &mut TypeTable, ty: Type, width: u32) -> Type {
    if width == 1 {
        ty
    } else {
        types.array(ty, width)
    }
}

pub(crate) fn value_label(func: &Function, val: Value) -> String {
    match func.value_name(val) {
        Some(name) => name.to_owned(),
        None => val.to_string(),
    }
}
