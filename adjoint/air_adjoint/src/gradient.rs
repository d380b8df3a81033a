use ahash::{AHashMap, AHashSet, RandomState};
use air::cursor::{Cursor, CursorPosition, FuncCursor};
use air::write::describe_value;
use air::{
    AliasDomain, AliasScope, Block, ControlFlowGraph, Function, Inst, Type, Value, ValueDef,
};
use indexmap::IndexMap;
use log::{debug, error};
use typed_index_collections::TiVec;
use typed_indexmap::TiMap;

use crate::activity::TypeResults;
use crate::clone::{shadow_type, value_label, IdentityLookup, PrimalClone, ValueLookup};
use crate::differentials::DiffSlot;
use crate::shadow::Placeholders;
use crate::{AdjointConfig, DerivativeMode};

#[cfg(test)]
mod tests;

/// The derivative state of a function that is being differentiated.
///
/// All operations take values of the original function (`old_func`) and emit code into the
/// cloned function (`func`) at an explicit insertion point.
pub struct GradientUtils<'a> {
    /// The function the adjoint code is generated into.
    pub func: Function,
    pub old_func: &'a Function,
    pub mode: DerivativeMode,
    /// The number of derivatives (lanes) computed at once.
    pub width: u32,
    pub config: AdjointConfig,
    pub inversion_allocs: Block,
    pub(crate) atomic_add: bool,
    pub(crate) activity: &'a dyn TypeResults,
    pub(crate) lookup: Box<dyn ValueLookup + 'a>,

    original_to_new: TiVec<Value, Value>,
    original_blocks: Vec<Block>,
    reverse_blocks: IndexMap<Block, Vec<Block>, RandomState>,
    reverse_block_to_primal: AHashMap<Block, Block>,

    pub(crate) differentials: TiMap<DiffSlot, Value, Value>,
    pub(crate) inverted_pointers: AHashMap<Value, Value>,
    pub(crate) placeholders: Placeholders,
    pub(crate) backwards_only_shadows: AHashSet<Value>,
    pub(crate) scope_frees: IndexMap<Value, Vec<Inst>, RandomState>,

    alias_domains: AHashMap<Value, AliasDomain>,
    alias_scopes: AHashMap<(Value, Option<u32>), AliasScope>,
}

impl<'a> GradientUtils<'a> {
    /// Takes ownership of `clone` and creates the reverse blocks required by its derivative mode.
    ///
    /// `parallel` marks functions that are executed by multiple threads at once (outlined
    /// parallel regions), shadow memory is always accumulated atomically in that case.
    pub fn new(
        old_func: &'a Function,
        clone: PrimalClone,
        activity: &'a dyn TypeResults,
        config: AdjointConfig,
        parallel: bool,
    ) -> GradientUtils<'a> {
        let PrimalClone {
            func,
            mode,
            width,
            inversion_allocs,
            original_blocks,
            inverted_pointers,
            original_to_new,
            ..
        } = clone;

        let mut utils = GradientUtils {
            func,
            old_func,
            mode,
            width,
            config,
            inversion_allocs,
            atomic_add: config.atomic_add || parallel,
            activity,
            lookup: Box::new(IdentityLookup),
            original_to_new,
            original_blocks,
            reverse_blocks: IndexMap::default(),
            reverse_block_to_primal: AHashMap::new(),
            differentials: TiMap::default(),
            inverted_pointers,
            placeholders: Placeholders::default(),
            backwards_only_shadows: AHashSet::new(),
            scope_frees: IndexMap::default(),
            alias_domains: AHashMap::new(),
            alias_scopes: AHashMap::new(),
        };
        utils.create_reverse_blocks();
        utils
    }

    fn create_reverse_blocks(&mut self) {
        assert!(self.reverse_blocks.is_empty());
        match self.mode {
            DerivativeMode::ForwardMode | DerivativeMode::ForwardModeSplit => return,
            DerivativeMode::ReverseModePrimal => {
                unreachable!("invalid DerivativeMode: ReverseModePrimal")
            }
            DerivativeMode::ReverseModeGradient | DerivativeMode::ReverseModeCombined => (),
        }

        for i in 0..self.original_blocks.len() {
            let block = self.original_blocks[i];
            if block == self.inversion_allocs {
                continue;
            }
            self.append_reverse_block(block);
        }
        assert!(!self.reverse_blocks.is_empty(), "reverse mode requires at least one block");
    }

    /// Replaces the mechanism that makes forward values available in the reverse pass.
    pub fn set_lookup(&mut self, lookup: impl ValueLookup + 'a) {
        self.lookup = Box::new(lookup);
    }

    pub fn new_from_original(&self, val: Value) -> Value {
        self.original_to_new[val]
    }

    /// The entry block of the primal function.
    pub fn original_entry(&self) -> Option<Block> {
        self.original_blocks.first().copied()
    }

    pub fn is_constant_value(&self, val: Value) -> bool {
        matches!(self.old_func.dfg.value_def(val), ValueDef::Const(_))
            || self.activity.is_constant_value(val)
    }

    /// Asserts that `val` belongs to the original function.
    pub(crate) fn assert_original(&self, val: Value) {
        assert!(
            usize::from(val) < self.old_func.dfg.values.len(),
            "{val} is not a value of {}",
            self.old_func.name
        );
    }

    /// The shadow type of `ty`: `ty` for a single lane, `[width x ty]` otherwise.
    pub fn shadow_type(&mut self, ty: Type) -> Type {
        shadow_type(&mut self.func.dfg.types, ty, self.width)
    }

    pub(crate) fn cursor(&mut self, pos: CursorPosition) -> FuncCursor<'_> {
        FuncCursor::new(&mut self.func).at_position(pos)
    }

    /// The insertion point before the terminator of `block` (or its bottom if it has none yet).
    pub(crate) fn before_terminator(&self, block: Block) -> CursorPosition {
        match self.func.block_terminator(block) {
            Some(term) => CursorPosition::At(term),
            None => CursorPosition::After(block),
        }
    }

    /// Logs the function and `vals` before a fatal assertion.
    pub(crate) fn dump(&self, msg: &str, vals: &[Value]) {
        error!("{msg}");
        error!("{}", self.func.to_debug_string());
        for &val in vals {
            error!("{}", describe_value(&self.func.dfg, val));
        }
    }
}

/// Reverse blocks
impl GradientUtils<'_> {
    /// Creates a new reverse block for the forward block `fwd`. Blocks appended later are
    /// emitted first.
    pub fn append_reverse_block(&mut self, fwd: Block) -> Block {
        let rev = self.func.layout.append_new_block();
        let name = format!("invert{}", self.func.block_label(fwd));
        debug!("created reverse block {rev} ({name}) for {fwd}");
        self.func.set_block_name(rev, name);
        self.reverse_blocks.entry(fwd).or_default().push(rev);
        self.reverse_block_to_primal.insert(rev, fwd);
        rev
    }

    /// The reverse blocks of `fwd` in creation order.
    pub fn reverse_blocks(&self, fwd: Block) -> &[Block] {
        self.reverse_blocks.get(&fwd).map_or(&[], Vec::as_slice)
    }

    /// The number of reverse blocks of all forward blocks.
    pub fn num_reverse_blocks(&self) -> usize {
        self.reverse_blocks.values().map(Vec::len).sum()
    }

    pub fn primal_block(&self, rev: Block) -> Option<Block> {
        self.reverse_block_to_primal.get(&rev).copied()
    }

    /// Reverse blocks in the order their accumulations must run: forward blocks are visited in
    /// post-order of the forward control flow graph (successors before predecessors) and the
    /// reverse blocks of each forward block are emitted latest-appended first.
    pub fn reverse_emission_order(&self) -> Vec<Block> {
        let entry = match self.old_func.layout.entry_block() {
            Some(entry) => entry,
            None => return Vec::new(),
        };
        let cfg = ControlFlowGraph::with_function(self.old_func);
        cfg.postorder(entry)
            .into_iter()
            .flat_map(|fwd| self.reverse_blocks(fwd).iter().rev().copied())
            .collect()
    }
}

/// Alias scopes
impl GradientUtils<'_> {
    /// The alias scope for accesses of `lane` of the shadow of `orig_ptr` (`None` is the primal).
    pub fn derivative_alias_scope(&mut self, orig_ptr: Value, lane: Option<u32>) -> AliasScope {
        if let Some(&scope) = self.alias_scopes.get(&(orig_ptr, lane)) {
            return scope;
        }
        let metadata = &mut self.func.dfg.metadata;
        let domain = *self.alias_domains.entry(orig_ptr).or_insert_with(|| {
            metadata.make_domain(format!("diffe_{}", value_label(self.old_func, orig_ptr)))
        });
        let name = match lane {
            Some(lane) => format!("shadow_{lane}"),
            None => "primal".to_owned(),
        };
        let scope = metadata.make_scope(domain, name);
        self.alias_scopes.insert((orig_ptr, lane), scope);
        scope
    }
}
