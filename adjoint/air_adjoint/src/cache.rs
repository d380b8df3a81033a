use ahash::AHashMap;
use air::builder::InstBuilder;
use air::cursor::CursorPosition;
use air::{Block, ControlFlowGraph, Inst, InstructionData, InvariantGroup, Opcode, Value, ValueDef};
use log::debug;

use crate::gradient::GradientUtils;

/// The induction variable of a loop and the stack slot holding its reverse pass counterpart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopIndex {
    /// The induction variable of the forward loop. Loops that were never given an explicit
    /// induction variable do not need to be rebuilt.
    pub var: Option<Value>,
    /// Pointer to the counter that runs the loop backwards in the reverse pass.
    pub antivar_alloc: Value,
}

/// The loops that a cached value is nested in at one level of the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheScope {
    /// Loops from outermost to innermost.
    pub loops: Vec<LoopIndex>,
}

/// The alignment of cache memory with elements of `bytes` bytes.
pub fn cache_alignment(bytes: u64) -> u32 {
    if bytes.is_power_of_two() {
        bytes.min(16) as u32
    } else {
        1
    }
}

impl GradientUtils<'_> {
    /// Releases the cache memory of `allocation` at the end of the reverse pass of `fwd_block`.
    ///
    /// `address` computes the location of the pointer to free in terms of the induction
    /// variables of the loops in `scopes[scope_index..]`, which is empty when `scope_index` is
    /// past the end. These are rebuilt from their reverse counters before `address` is re-emitted. Returns the emitted `free` unless freeing memory
    /// is disabled.
    #[allow(clippy::too_many_arguments)]
    pub fn free_cache(
        &mut self,
        fwd_block: Block,
        scopes: &[CacheScope],
        scope_index: usize,
        allocation: Value,
        element_byte_size: u64,
        address: Value,
        invariant_group: Option<InvariantGroup>,
    ) -> Option<Inst> {
        if !self.config.free_memory {
            return None;
        }
        let rev = match self.reverse_blocks(fwd_block).last() {
            Some(&rev) => rev,
            None => {
                self.dump("free_cache in a block without a reverse block", &[allocation]);
                panic!("{fwd_block} has no reverse block");
            }
        };
        let pos = self.before_terminator(rev);

        let mut antimap = AHashMap::new();
        for scope in scopes.get(scope_index..).unwrap_or_default().iter().rev() {
            for idx in scope.loops.iter().rev() {
                if let Some(var) = idx.var {
                    let align = self.func.dfg.types.abi_align(self.func.dfg.value_type(var));
                    let counter = self.cursor(pos).ins().load(idx.antivar_alloc, align as u32);
                    antimap.insert(var, counter);
                }
            }
        }

        let ptr = self.unwrap(address, pos, &mut antimap);
        let align = cache_alignment(element_byte_size);
        let mut cursor = self.cursor(pos);
        let forfree = cursor.ins().load(ptr, align);
        let free = cursor.ins().free(forfree);

        let load = self.defining_inst(forfree);
        let metadata = self.func.dfg.inst_metadata_mut(load);
        metadata.invariant_group = invariant_group;
        metadata.dereferenceable = Some(element_byte_size);
        self.func.set_value_name(forfree, "forfree".to_owned());

        debug!("freeing cache of {allocation} in {rev} with {free}");
        self.scope_frees.entry(allocation).or_default().push(free);
        Some(free)
    }

    /// The frees that were emitted for the cache `allocation`.
    pub fn scope_frees(&self, allocation: Value) -> &[Inst] {
        self.scope_frees.get(&allocation).map_or(&[], Vec::as_slice)
    }

    /// Checks that the cache `allocation` is freed and that no control path frees it twice.
    pub fn check_scope_frees(&self, allocation: Value) {
        let frees = self.scope_frees(allocation);
        if frees.is_empty() {
            self.dump("cache is never freed", &[allocation]);
            panic!("no free was emitted for the cache {allocation}");
        }

        let cfg = ControlFlowGraph::with_function(&self.func);
        let blocks: Vec<_> = frees
            .iter()
            .map(|&free| match self.func.layout.inst_block(free) {
                Some(block) => block,
                None => unreachable!("{free} was removed"),
            })
            .collect();
        for (i, &a) in blocks.iter().enumerate() {
            for (j, &b) in blocks.iter().enumerate().skip(i + 1) {
                if a == b || cfg.has_path(a, b) || cfg.has_path(b, a) {
                    self.dump("cache is freed twice", &[allocation]);
                    panic!("{} and {} both free {allocation} on one path", frees[i], frees[j]);
                }
            }
        }
    }

    /// Re-emits `val` at `pos`, replacing the values in `antimap` with their mapping.
    ///
    /// Values that dominate the whole function (constants, parameters and values defined in the
    /// inversion allocation block or the entry block) are reused. Newly emitted values are
    /// added to `antimap`.
    fn unwrap(
        &mut self,
        val: Value,
        pos: CursorPosition,
        antimap: &mut AHashMap<Value, Value>,
    ) -> Value {
        if let Some(&mapped) = antimap.get(&val) {
            return mapped;
        }

        let inst = match self.func.dfg.value_def(val) {
            ValueDef::Const(_) | ValueDef::Param(_) => return val,
            ValueDef::Result(inst) => *inst,
            ValueDef::Placeholder | ValueDef::Invalid => {
                self.dump("cannot unwrap placeholder", &[val]);
                panic!("cannot unwrap {val}");
            }
        };

        let block = self.func.layout.inst_block(inst);
        let entry = self.original_entry();
        if block == Some(self.inversion_allocs) || (block.is_some() && block == entry) {
            return val;
        }

        let data = self.func.dfg.insts[inst].clone();
        let res = match data {
            InstructionData::Gep { args, inbounds } => {
                let args: Vec<_> = args.iter().map(|&arg| self.unwrap(arg, pos, antimap)).collect();
                self.cursor(pos).ins().gep(args[0], &args[1..], inbounds)
            }
            InstructionData::Cast { opcode, arg, ty } => {
                let arg = self.unwrap(arg, pos, antimap);
                self.cursor(pos).ins().cast(opcode, arg, ty)
            }
            InstructionData::Binary {
                opcode: opcode @ (Opcode::Iadd | Opcode::Isub | Opcode::Imul),
                args: [lhs, rhs],
            } => {
                let lhs = self.unwrap(lhs, pos, antimap);
                let rhs = self.unwrap(rhs, pos, antimap);
                self.cursor(pos).ins().binary(opcode, lhs, rhs)
            }
            InstructionData::Load { arg, align }
                if self
                    .func
                    .dfg
                    .inst_metadata(inst)
                    .map_or(false, |metadata| metadata.invariant_group.is_some()) =>
            {
                let arg = self.unwrap(arg, pos, antimap);
                let res = self.cursor(pos).ins().load(arg, align);
                let metadata = self.func.dfg.inst_metadata(inst).cloned().unwrap_or_default();
                let load = self.defining_inst(res);
                *self.func.dfg.inst_metadata_mut(load) = metadata;
                res
            }
            _ => {
                self.dump("cannot unwrap", &[val]);
                panic!("cannot re-materialize {val} in the reverse pass");
            }
        };
        antimap.insert(val, res);
        res
    }

    pub(crate) fn defining_inst(&self, val: Value) -> Inst {
        match self.func.dfg.value_inst(val) {
            Some(inst) => inst,
            None => unreachable!("{val} is not an instruction result"),
        }
    }
}
