//! Reference interpreter for AIR functions.
//!
//! The interpreter executes a function one instruction at a time against a byte addressed
//! [`Memory`]. All undefined behaviour that matters for adjoint code (out of bounds accesses,
//! use after free, double free, leaked heap memory) is reported as an error instead of being
//! silently ignored.

use air::{Block, Function, Inst, InstructionData, Opcode, Type, TypeData, Value, ValueDef};
use anyhow::{bail, Context, Result};
use typed_index_collections::TiVec;

pub use crate::data::Data;
pub use crate::memory::{decode, encode, AllocId, AllocKind, Memory, Pointer};

mod data;
mod memory;

#[cfg(test)]
mod tests;

/// Upper bound for the number of executed instructions, guards tests against infinite loops.
const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

pub struct InterpreterState {
    vals: TiVec<Value, Data>,
    prev_bb: Block,
    next_inst: Option<Inst>,
}

impl InterpreterState {
    pub fn write(&mut self, dst: Value, val: impl Into<Data>) {
        self.vals[dst] = val.into()
    }

    pub fn read(&self, val: Value) -> &Data {
        &self.vals[val]
    }

    /// The block that was executed before the current one.
    pub fn prev_block(&self) -> Block {
        self.prev_bb
    }
}

/// Counters collected while interpreting a function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub steps: u64,
    pub atomic_rmws: u64,
    pub frees: u64,
}

pub struct Interpreter<'a> {
    pub state: InterpreterState,
    pub stats: Stats,
    pub step_limit: u64,
    func: &'a Function,
    memory: &'a mut Memory,
}

impl<'a> Interpreter<'a> {
    pub fn new(func: &'a Function, memory: &'a mut Memory, args: &[Data]) -> Interpreter<'a> {
        assert_eq!(
            args.len(),
            func.params.len(),
            "{} expects {} arguments",
            func.name,
            func.params.len()
        );

        let vals = func
            .dfg
            .values
            .iter()
            .map(|val| match func.dfg.value_def(val) {
                ValueDef::Param(param) => args[usize::from(*param)].clone(),
                ValueDef::Const(_) => Data::from_const(&func.dfg, val),
                _ => Data::Undef,
            })
            .collect();

        let entry =
            func.layout.entry_block().expect("Function without entry block can not be interpreted");

        let state =
            InterpreterState { vals, prev_bb: entry, next_inst: func.layout.first_inst(entry) };

        Interpreter { state, stats: Stats::default(), step_limit: DEFAULT_STEP_LIMIT, func, memory }
    }

    /// Runs the function until it returns and produces the returned value (if any).
    pub fn run(&mut self) -> Result<Option<Data>> {
        while let Some(inst) = self.state.next_inst {
            self.stats.steps += 1;
            if self.stats.steps > self.step_limit {
                bail!("{} did not terminate after {} steps", self.func.name, self.step_limit)
            }
            if let Some(ret) = self.eval(inst).with_context(|| {
                format!("failed to evaluate {}", self.func.dfg.display_inst(inst))
            })? {
                return Ok(ret);
            }
        }
        bail!("{} fell off the end of a block without a terminator", self.func.name)
    }

    fn jmp(&mut self, src: Inst, dst: Block) -> Result<()> {
        let src_bb = self.func.layout.inst_block(src).context("instruction is not inserted")?;
        self.state.prev_bb = src_bb;

        // phis at the start of a block read their inputs simultaneously
        let mut updates = Vec::new();
        let mut next = self.func.layout.first_inst(dst);
        while let Some(inst) = next {
            let (args, blocks) = match &self.func.dfg.insts[inst] {
                InstructionData::PhiNode { args, blocks } => (args, blocks),
                _ => break,
            };
            let edge = match blocks.iter().position(|&block| block == src_bb) {
                Some(edge) => edge,
                None => bail!("phi in {dst} has no edge for {src_bb}"),
            };
            updates.push((self.func.dfg.first_result(inst), self.state.vals[args[edge]].clone()));
            next = self.func.layout.next_inst(inst);
        }
        for (res, val) in updates {
            self.state.vals[res] = val;
        }
        self.state.next_inst = next;
        Ok(())
    }

    /// Evaluates a single instruction. Returns `Some` once the function returns.
    pub fn eval(&mut self, inst: Inst) -> Result<Option<Option<Data>>> {
        let func = self.func;
        let dfg = &func.dfg;
        let types = &dfg.types;
        let val = match dfg.insts[inst] {
            InstructionData::Jump { destination } => {
                self.jmp(inst, destination)?;
                return Ok(None);
            }
            InstructionData::Branch { cond, then_dst, else_dst } => {
                let dst = if self.state.vals[cond].is_true()? { then_dst } else { else_dst };
                self.jmp(inst, dst)?;
                return Ok(None);
            }
            InstructionData::Ret { arg } => {
                self.state.next_inst = None;
                return Ok(Some(arg.map(|arg| self.state.vals[arg].clone())));
            }
            // evaluated when the block is entered
            InstructionData::PhiNode { .. } => {
                self.state.next_inst = self.func.layout.next_inst(inst);
                return Ok(None);
            }

            InstructionData::Unary { opcode: Opcode::Free, arg } => {
                let ptr = self.state.vals[arg].ptr()?;
                self.memory.free(ptr)?;
                self.stats.frees += 1;
                None
            }
            InstructionData::Unary { opcode, arg } => {
                Some(lanewise1(&self.state.vals[arg], |arg| unary(opcode, arg))?)
            }
            InstructionData::Binary { opcode, args: [lhs, rhs] } => Some(lanewise2(
                &self.state.vals[lhs],
                &self.state.vals[rhs],
                |lhs, rhs| binary(opcode, lhs, rhs),
            )?),
            InstructionData::Cast { opcode: Opcode::Bitcast, arg, ty } => {
                let from = dfg.value_type(arg);
                let mut buf = vec![0u8; types.store_size(from) as usize];
                encode(types, from, &self.state.vals[arg], &mut buf)?;
                Some(decode(types, ty, &buf)?)
            }
            // pointer casts do not change the address
            InstructionData::Cast { arg, .. } => Some(self.state.vals[arg].clone()),
            InstructionData::Select { args: [cond, then_val, else_val] } => {
                let vals = &self.state.vals;
                Some(select(&vals[cond], &vals[then_val], &vals[else_val])?)
            }
            InstructionData::Alloca { ty, .. } => {
                Some(self.memory.alloc(types.alloc_size(ty), AllocKind::Stack).into())
            }
            InstructionData::Malloc { arg, .. } => {
                let size = self.state.vals[arg].uint()?;
                Some(self.memory.alloc(size, AllocKind::Heap).into())
            }
            InstructionData::Load { arg, .. } => {
                let ptr = self.state.vals[arg].ptr()?;
                Some(self.memory.read(types, dfg.pointee_type(arg), ptr)?)
            }
            InstructionData::Store { args: [val, ptr], .. } => {
                let addr = self.state.vals[ptr].ptr()?;
                self.memory.write(types, dfg.pointee_type(ptr), addr, &self.state.vals[val])?;
                None
            }
            InstructionData::MaskedLoad { args: [ptr, mask, passthru], .. } => {
                let vec_ty = dfg.value_type(passthru);
                let addr = self.state.vals[ptr].ptr()?;
                let mut res = self.state.vals[passthru].clone();
                let mask = self.state.vals[mask].members()?;
                for (lane, dst) in res.members_mut()?.iter_mut().enumerate() {
                    if mask[lane].is_true()? {
                        let offset = types.member_offset(vec_ty, lane as u32);
                        let elem = types.member(vec_ty, lane as u32);
                        *dst = self.memory.read(types, elem, addr.offset_by(offset as i64))?;
                    }
                }
                Some(res)
            }
            InstructionData::MaskedStore { args: [val, ptr, mask], .. } => {
                let vec_ty = dfg.value_type(val);
                let addr = self.state.vals[ptr].ptr()?;
                let lanes = self.state.vals[val].members()?;
                let mask = self.state.vals[mask].members()?;
                for (lane, val) in lanes.iter().enumerate() {
                    if mask[lane].is_true()? {
                        let offset = types.member_offset(vec_ty, lane as u32);
                        let elem = types.member(vec_ty, lane as u32);
                        self.memory.write(types, elem, addr.offset_by(offset as i64), val)?;
                    }
                }
                None
            }
            // a single thread observes every ordering as sequentially consistent
            InstructionData::AtomicRmw { opcode, args: [ptr, val], .. } => {
                let ty = dfg.value_type(val);
                let addr = self.state.vals[ptr].ptr()?;
                let old = self.memory.read(types, ty, addr)?;
                let opcode = opcode_of_rmw(opcode);
                let new =
                    lanewise2(&old, &self.state.vals[val], |lhs, rhs| binary(opcode, lhs, rhs))?;
                self.memory.write(types, ty, addr, &new)?;
                self.stats.atomic_rmws += 1;
                Some(old)
            }
            InstructionData::Gep { ref args, .. } => Some(self.gep(args)?),
            InstructionData::ExtractValue { arg, idx }
            | InstructionData::ExtractElement { arg, idx } => {
                match self.state.vals[arg].members()?.get(idx as usize) {
                    Some(member) => Some(member.clone()),
                    None => bail!("index {idx} out of bounds"),
                }
            }
            InstructionData::InsertValue { args: [agg, val], idx }
            | InstructionData::InsertElement { args: [agg, val], idx } => {
                let mut res = self.state.vals[agg].clone();
                match res.members_mut()?.get_mut(idx as usize) {
                    Some(dst) => *dst = self.state.vals[val].clone(),
                    None => bail!("index {idx} out of bounds"),
                }
                Some(res)
            }
        };

        self.state.next_inst = func.layout.next_inst(inst);
        if let Some(val) = val {
            let res = dfg.first_result(inst);
            self.state.vals[res] = val;
        }
        Ok(None)
    }

    fn gep(&self, args: &[Value]) -> Result<Data> {
        let dfg = &self.func.dfg;
        let types = &dfg.types;
        let base = args[0];
        let mut ptr = match self.state.vals[base] {
            Data::Ptr(Some(ptr)) => ptr,
            Data::Ptr(None) => bail!("gep on a null pointer"),
            ref val => bail!("expected a pointer but found {val}"),
        };
        let mut ty = dfg.pointee_type(base);
        let mut indices = args[1..].iter();
        if let Some(&idx) = indices.next() {
            let idx = self.state.vals[idx].sint()?;
            ptr = ptr.offset_by(idx * types.alloc_size(ty) as i64);
        }
        for &idx in indices {
            let idx = self.state.vals[idx].sint()?;
            ptr = ptr.offset_by(member_offset(types, ty, idx));
            ty = types.member(ty, idx as u32);
        }
        Ok(ptr.into())
    }
}

fn member_offset(types: &air::TypeTable, ty: Type, idx: i64) -> i64 {
    match types[ty] {
        TypeData::Array { elem, .. } => idx * types.alloc_size(elem) as i64,
        TypeData::Vector { elem, .. } => idx * types.store_size(elem) as i64,
        _ => types.member_offset(ty, idx as u32) as i64,
    }
}

fn opcode_of_rmw(opcode: Opcode) -> Opcode {
    match opcode {
        Opcode::AtomicFadd => Opcode::Fadd,
        _ => unreachable!("{opcode} is not an atomic read-modify-write"),
    }
}

fn unary(opcode: Opcode, arg: &Data) -> Result<Data> {
    match opcode {
        Opcode::Fneg => match *arg {
            Data::F32(val) => Ok((-val).into()),
            _ => Ok((-arg.f64()?).into()),
        },
        _ => bail!("{opcode} is not a unary operation"),
    }
}

fn binary(opcode: Opcode, lhs: &Data, rhs: &Data) -> Result<Data> {
    if let (Data::F32(lhs), Data::F32(rhs)) = (lhs, rhs) {
        let res = match opcode {
            Opcode::Fadd => lhs + rhs,
            Opcode::Fsub => lhs - rhs,
            Opcode::Fmul => lhs * rhs,
            Opcode::Fdiv => lhs / rhs,
            _ => return fcmp(opcode, *lhs as f64, *rhs as f64),
        };
        return Ok(res.into());
    }

    let res: Data = match opcode {
        Opcode::Fadd => (lhs.f64()? + rhs.f64()?).into(),
        Opcode::Fsub => (lhs.f64()? - rhs.f64()?).into(),
        Opcode::Fmul => (lhs.f64()? * rhs.f64()?).into(),
        Opcode::Fdiv => (lhs.f64()? / rhs.f64()?).into(),
        Opcode::Feq | Opcode::Fne | Opcode::Flt | Opcode::Fgt => {
            return fcmp(opcode, lhs.f64()?, rhs.f64()?)
        }
        Opcode::Iadd | Opcode::Isub | Opcode::Imul => {
            let bits = match *lhs {
                Data::Int { bits, .. } => bits,
                _ => bail!("expected an integer but found {lhs}"),
            };
            let (lhs, rhs) = (lhs.uint()?, rhs.uint()?);
            let val = match opcode {
                Opcode::Iadd => lhs.wrapping_add(rhs),
                Opcode::Isub => lhs.wrapping_sub(rhs),
                _ => lhs.wrapping_mul(rhs),
            };
            Data::int(bits, val)
        }
        Opcode::Ieq => (lhs.uint()? == rhs.uint()?).into(),
        Opcode::Ine => (lhs.uint()? != rhs.uint()?).into(),
        Opcode::Ilt => (lhs.sint()? < rhs.sint()?).into(),
        Opcode::Igt => (lhs.sint()? > rhs.sint()?).into(),
        _ => bail!("{opcode} is not a binary operation"),
    };
    Ok(res)
}

fn fcmp(opcode: Opcode, lhs: f64, rhs: f64) -> Result<Data> {
    let res = match opcode {
        Opcode::Feq => lhs == rhs,
        Opcode::Fne => lhs != rhs,
        Opcode::Flt => lhs < rhs,
        Opcode::Fgt => lhs > rhs,
        _ => bail!("{opcode} is not a float operation"),
    };
    Ok(res.into())
}

fn select(cond: &Data, then_val: &Data, else_val: &Data) -> Result<Data> {
    match cond {
        Data::Aggregate(lanes) => {
            let then_lanes = then_val.members()?;
            let else_lanes = else_val.members()?;
            let res: Result<_> = lanes
                .iter()
                .zip(then_lanes.iter().zip(else_lanes.iter()))
                .map(|(cond, (then_val, else_val))| select(cond, then_val, else_val))
                .collect();
            Ok(Data::Aggregate(res?))
        }
        _ if cond.is_true()? => Ok(then_val.clone()),
        _ => Ok(else_val.clone()),
    }
}

fn lanewise1(arg: &Data, f: impl Fn(&Data) -> Result<Data> + Copy) -> Result<Data> {
    match arg {
        Data::Aggregate(lanes) => {
            let res: Result<_> = lanes.iter().map(|lane| lanewise1(lane, f)).collect();
            Ok(Data::Aggregate(res?))
        }
        _ => f(arg),
    }
}

fn lanewise2(
    lhs: &Data,
    rhs: &Data,
    f: impl Fn(&Data, &Data) -> Result<Data> + Copy,
) -> Result<Data> {
    match (lhs, rhs) {
        (Data::Aggregate(lhs), Data::Aggregate(rhs)) if lhs.len() == rhs.len() => {
            let res: Result<_> =
                lhs.iter().zip(rhs.iter()).map(|(lhs, rhs)| lanewise2(lhs, rhs, f)).collect();
            Ok(Data::Aggregate(res?))
        }
        (Data::Aggregate(_), _) | (_, Data::Aggregate(_)) => {
            bail!("mismatched operands {lhs} and {rhs}")
        }
        _ => f(lhs, rhs),
    }
}

/// Convenience wrapper that interprets `func` with `args` and returns the result.
pub fn run(func: &Function, memory: &mut Memory, args: &[Data]) -> Result<(Option<Data>, Stats)> {
    let mut interpreter = Interpreter::new(func, memory, args);
    let res = interpreter.run()?;
    Ok((res, interpreter.stats))
}
