//! Block order and per-block instruction order.
//!
//! Both orders are intrusive doubly linked lists stored in side tables keyed by the entity
//! itself, so splicing at an arbitrary position and unlinking are constant time.

use stdx::packed_option::{PackedOption, ReservedValue};
use typed_index_collections::TiVec;

use crate::{Block, Inst};

#[cfg(test)]
mod tests;

#[derive(Clone, Copy, Debug)]
struct Link<K: ReservedValue> {
    prev: PackedOption<K>,
    next: PackedOption<K>,
}

impl<K: ReservedValue> Default for Link<K> {
    fn default() -> Self {
        Link { prev: PackedOption::NONE, next: PackedOption::NONE }
    }
}

#[derive(Clone, Copy, Debug)]
struct Ends<K: ReservedValue> {
    head: PackedOption<K>,
    tail: PackedOption<K>,
}

impl<K: ReservedValue> Default for Ends<K> {
    fn default() -> Self {
        Ends { head: PackedOption::NONE, tail: PackedOption::NONE }
    }
}

/// Links `node` into the list directly before `before`, or at the tail.
fn splice<K>(links: &mut TiVec<K, Link<K>>, ends: &mut Ends<K>, node: K, before: Option<K>)
where
    K: ReservedValue,
    usize: From<K>,
{
    let prev = before.map_or(ends.tail, |succ| links[succ].prev);
    links[node] = Link { prev, next: before.into() };
    match prev.expand() {
        Some(pred) => links[pred].next = node.into(),
        None => ends.head = node.into(),
    }
    match before {
        Some(succ) => links[succ].prev = node.into(),
        None => ends.tail = node.into(),
    }
}

fn unlink<K>(links: &mut TiVec<K, Link<K>>, ends: &mut Ends<K>, node: K)
where
    K: ReservedValue,
    usize: From<K>,
{
    let Link { prev, next } = std::mem::take(&mut links[node]);
    match prev.expand() {
        Some(pred) => links[pred].next = next,
        None => ends.head = next,
    }
    match next.expand() {
        Some(succ) => links[succ].prev = prev,
        None => ends.tail = prev,
    }
}

#[derive(Clone, Default)]
pub struct Layout {
    block_order: Ends<Block>,
    block_links: TiVec<Block, Link<Block>>,
    block_inserted: TiVec<Block, bool>,
    block_contents: TiVec<Block, Ends<Inst>>,

    inst_links: TiVec<Inst, Link<Inst>>,
    inst_blocks: TiVec<Inst, PackedOption<Block>>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every block ever created, inserted or not.
    pub fn num_blocks(&self) -> usize {
        self.block_links.len()
    }

    pub fn make_block(&mut self) -> Block {
        self.block_inserted.push(false);
        self.block_contents.push(Ends::default());
        self.block_links.push_and_get_key(Link::default())
    }

    pub fn append_new_block(&mut self) -> Block {
        let bb = self.make_block();
        self.append_block(bb);
        bb
    }

    pub fn is_block_inserted(&self, bb: Block) -> bool {
        self.block_inserted[bb]
    }

    pub fn append_block(&mut self, bb: Block) {
        self.link_block(bb, None)
    }

    /// Places the detached block `bb` in front of `before`.
    pub fn insert_block(&mut self, bb: Block, before: Block) {
        debug_assert!(self.is_block_inserted(before), "{before} is detached");
        self.link_block(bb, Some(before))
    }

    fn link_block(&mut self, bb: Block, before: Option<Block>) {
        debug_assert!(!self.is_block_inserted(bb), "{bb} was inserted twice");
        self.block_inserted[bb] = true;
        splice(&mut self.block_links, &mut self.block_order, bb, before);
    }

    /// Detaches `bb`, which must not contain instructions.
    pub fn remove_empty_block(&mut self, bb: Block) {
        debug_assert!(self.is_block_inserted(bb), "{bb} is detached");
        debug_assert!(self.first_inst(bb).is_none(), "{bb} still has instructions");
        self.block_inserted[bb] = false;
        unlink(&mut self.block_links, &mut self.block_order, bb);
    }

    pub fn blocks(&self) -> Blocks<'_> {
        Blocks { layout: self, cur: self.block_order.head.expand() }
    }

    pub fn entry_block(&self) -> Option<Block> {
        self.block_order.head.expand()
    }

    pub fn last_block(&self) -> Option<Block> {
        self.block_order.tail.expand()
    }

    pub fn next_block(&self, bb: Block) -> Option<Block> {
        self.block_links[bb].next.expand()
    }

    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_blocks.get(inst).and_then(|bb| bb.expand())
    }

    fn link_inst(&mut self, inst: Inst, bb: Block, before: Option<Inst>) {
        let needed = usize::from(inst) + 1;
        if self.inst_links.len() < needed {
            self.inst_links.resize(needed, Link::default());
            self.inst_blocks.resize(needed, PackedOption::NONE);
        }
        debug_assert!(self.inst_blocks[inst].is_none(), "{inst} was inserted twice");
        self.inst_blocks[inst] = bb.into();
        splice(&mut self.inst_links, &mut self.block_contents[bb], inst, before);
    }

    pub fn append_inst_to_bb(&mut self, inst: Inst, bb: Block) {
        debug_assert!(self.is_block_inserted(bb), "{bb} is detached");
        self.link_inst(inst, bb, None)
    }

    /// Places `inst` directly in front of `before`.
    pub fn prepend_inst(&mut self, inst: Inst, before: Inst) {
        match self.inst_block(before) {
            Some(bb) => self.link_inst(inst, bb, Some(before)),
            None => unreachable!("{before} is detached"),
        }
    }

    /// Detaches `inst`. Its data stays in the data flow graph.
    pub fn remove_inst(&mut self, inst: Inst) {
        let bb = match self.inst_blocks.get_mut(inst).and_then(|bb| bb.take()) {
            Some(bb) => bb,
            None => unreachable!("{inst} is detached"),
        };
        unlink(&mut self.inst_links, &mut self.block_contents[bb], inst);
    }

    pub fn first_inst(&self, bb: Block) -> Option<Inst> {
        self.block_contents[bb].head.expand()
    }

    pub fn last_inst(&self, bb: Block) -> Option<Inst> {
        self.block_contents[bb].tail.expand()
    }

    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        self.inst_links[inst].next.expand()
    }

    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        self.inst_links[inst].prev.expand()
    }

    pub fn block_insts(&self, bb: Block) -> InstIter<'_> {
        InstIter { layout: self, front: self.first_inst(bb), back: self.last_inst(bb) }
    }
}

pub struct Blocks<'a> {
    layout: &'a Layout,
    cur: Option<Block>,
}

impl Iterator for Blocks<'_> {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        let bb = self.cur?;
        self.cur = self.layout.next_block(bb);
        Some(bb)
    }
}

#[derive(Clone)]
pub struct InstIter<'a> {
    layout: &'a Layout,
    front: Option<Inst>,
    back: Option<Inst>,
}

impl InstIter<'_> {
    /// Both ends met at the last remaining instruction.
    fn exhausted(&mut self) -> bool {
        let met = self.front == self.back;
        if met {
            self.front = None;
            self.back = None;
        }
        met
    }
}

impl Iterator for InstIter<'_> {
    type Item = Inst;

    fn next(&mut self) -> Option<Inst> {
        let inst = self.front?;
        if !self.exhausted() {
            self.front = self.layout.next_inst(inst);
        }
        Some(inst)
    }
}

impl DoubleEndedIterator for InstIter<'_> {
    fn next_back(&mut self) -> Option<Inst> {
        let inst = self.back?;
        if !self.exhausted() {
            self.back = self.layout.prev_inst(inst);
        }
        Some(inst)
    }
}
