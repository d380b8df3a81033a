//! Converting functions to text.
//!
//! The `write` module provides the `write_function` function which converts a `Function` to an
//! equivalent textual form. Used constants are listed before the first block, value and block
//! names are printed as trailing comments.

use core::fmt::{self, Write};

use ahash::AHashSet;

use crate::metadata::InstMetadata;
use crate::{Block, DataFlowGraph, Function, Inst, InstructionData, Value, ValueDef};

#[cfg(test)]
mod tests;

/// Write `func` to `w` as equivalent text.
pub fn write_function(w: &mut dyn Write, func: &Function) -> fmt::Result {
    write!(w, "function %{}(", func.name)?;
    for (i, &param) in func.params.iter().enumerate() {
        if i != 0 {
            write!(w, ", ")?;
        }
        let ty = func.dfg.value_type(param);
        write!(w, "{param}: {}", func.dfg.types.display(ty))?;
    }
    writeln!(w, ") {{")?;

    write_preamble(w, func)?;

    for block in func.layout.blocks() {
        write_block_header(w, func, block)?;
        for inst in func.layout.block_insts(block) {
            write_instruction(w, func, inst)?;
        }
    }
    writeln!(w, "}}")
}

fn write_preamble(w: &mut dyn Write, func: &Function) -> fmt::Result {
    let mut consts = AHashSet::new();
    for block in func.layout.blocks() {
        for inst in func.layout.block_insts(block) {
            for &arg in func.dfg.inst_args(inst) {
                if func.dfg.is_const(arg) {
                    consts.insert(arg);
                }
            }
        }
    }
    let mut consts: Vec<Value> = consts.into_iter().collect();
    consts.sort_unstable();
    for val in consts {
        writeln!(w, "    {val} = {}", func.dfg.values.display(&func.dfg.types, val))?;
    }
    Ok(())
}

pub fn write_block_header(w: &mut dyn Write, func: &Function, block: Block) -> fmt::Result {
    match func.block_name(block) {
        Some(name) => writeln!(w, "{block}: ; {name}"),
        None => writeln!(w, "{block}:"),
    }
}

pub fn write_instruction(w: &mut dyn Write, func: &Function, inst: Inst) -> fmt::Result {
    write!(w, "    ")?;
    let res = func.dfg.inst_result(inst);
    if let Some(res) = res {
        write!(w, "{res} = ")?;
    }
    write_operands(w, &func.dfg, inst)?;
    if let Some(metadata) = func.dfg.inst_metadata(inst) {
        write_metadata(w, metadata)?;
    }
    let srcloc = func.srcloc(inst);
    if !srcloc.is_default() {
        write!(w, " {srcloc}")?;
    }
    if let Some(name) = res.and_then(|res| func.value_name(res)) {
        write!(w, " ; {name}")?;
    }
    writeln!(w)
}

pub fn write_operands(w: &mut dyn Write, dfg: &DataFlowGraph, inst: Inst) -> fmt::Result {
    let data = &dfg.insts[inst];
    let opcode = data.opcode();
    match data {
        InstructionData::Cast { arg, ty, .. } => {
            write!(w, "{opcode} {arg} to {}", dfg.types.display(*ty))
        }
        InstructionData::Alloca { ty, align } => {
            write!(w, "{opcode} {}, align {align}", dfg.types.display(*ty))
        }
        InstructionData::Malloc { arg, ty } => {
            write!(w, "{opcode} {}, {arg}", dfg.types.display(*ty))
        }
        InstructionData::Load { align, .. }
        | InstructionData::Store { align, .. }
        | InstructionData::MaskedLoad { align, .. }
        | InstructionData::MaskedStore { align, .. } => {
            write!(w, "{opcode} {}, align {align}", DisplayList(data.arguments()))
        }
        InstructionData::AtomicRmw { args, align, ordering, .. } => {
            write!(w, "{opcode} {}, align {align}, {ordering}", DisplayList(&args[..]))
        }
        InstructionData::Gep { args, inbounds } => {
            let inbounds = if *inbounds { " inbounds" } else { "" };
            write!(w, "{opcode}{inbounds} {}", DisplayList(&args[..]))
        }
        InstructionData::ExtractValue { arg, idx } | InstructionData::ExtractElement { arg, idx } => {
            write!(w, "{opcode} {arg}, {idx}")
        }
        InstructionData::InsertValue { args, idx } | InstructionData::InsertElement { args, idx } => {
            write!(w, "{opcode} {}, {idx}", DisplayList(&args[..]))
        }
        InstructionData::PhiNode { args, blocks } => {
            write!(w, "{opcode} ")?;
            for (i, (arg, block)) in args.iter().zip(blocks.iter()).enumerate() {
                if i != 0 {
                    write!(w, ", ")?;
                }
                write!(w, "[{arg}, {block}]")?;
            }
            Ok(())
        }
        InstructionData::Jump { destination } => write!(w, "{opcode} {destination}"),
        InstructionData::Branch { cond, then_dst, else_dst } => {
            write!(w, "{opcode} {cond}, {then_dst}, {else_dst}")
        }
        InstructionData::Ret { arg: None } => write!(w, "{opcode}"),
        _ => write!(w, "{opcode} {}", DisplayList(data.arguments())),
    }
}

fn write_metadata(w: &mut dyn Write, metadata: &InstMetadata) -> fmt::Result {
    if !metadata.alias_scope.is_empty() {
        write!(w, ", !alias_scope [{}]", DisplayList(&metadata.alias_scope[..]))?;
    }
    if !metadata.noalias.is_empty() {
        write!(w, ", !noalias [{}]", DisplayList(&metadata.noalias[..]))?;
    }
    if let Some(tag) = metadata.tbaa {
        write!(w, ", !tbaa {tag}")?;
    }
    if let Some(tag) = metadata.tbaa_struct {
        write!(w, ", !tbaa_struct {tag}")?;
    }
    if let Some(group) = metadata.invariant_group {
        write!(w, ", !invariant_group {group}")?;
    }
    if let Some(bytes) = metadata.dereferenceable {
        write!(w, ", !dereferenceable {bytes}")?;
    }
    if metadata.nonnull {
        write!(w, ", !nonnull")?;
    }
    Ok(())
}

struct DisplayList<'a, T>(&'a [T]);

impl<T: fmt::Display> fmt::Display for DisplayList<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{item}")?;
        }
        Ok(())
    }
}

/// Describes the definition of `val` for diagnostic dumps.
pub fn describe_value(dfg: &DataFlowGraph, val: Value) -> String {
    match dfg.value_def(val) {
        ValueDef::Result(inst) => format!("{}", dfg.display_inst(*inst)),
        ValueDef::Param(param) => format!("{val} ({param})"),
        ValueDef::Const(_) => format!("{val} = {}", dfg.values.display(&dfg.types, val)),
        ValueDef::Placeholder => format!("{val} (placeholder)"),
        ValueDef::Invalid => format!("{val} (invalid)"),
    }
}
