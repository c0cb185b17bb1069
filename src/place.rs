//! The placement pass: walks the intermediate representation
//! repeatedly, assigning a program counter to every label and settling
//! on a final byte length for every variable-size record, until a pass
//! makes no further changes.
//!
//! Only two kinds of record have a length that can change between
//! passes: a relative branch (short form vs. the long inverted-branch-
//! plus-`JMP` form) and an absolute-mode operand that turns out to
//! address zero page and can shrink. Both converge quickly in
//! practice — lengths only ever grow from "optimistic" to their final
//! value — and [`MAX_PLACEMENT_PASSES`] exists purely as a defensive
//! backstop against a future bug reintroducing an oscillation, not
//! because real programs are expected to need anywhere near that many
//! passes.

use crate::error::{Error, Result, UnresolvedRef};
use crate::format::START_ADDRESS;
use crate::ir::{ExprRecord, Ir, Operand, Record};
use crate::symtab::{SymbolTable, SymbolType};

/// Hard cap on placement passes. The spec treats non-convergence as
/// unreachable for a correct assembler; this cap turns a hypothetical
/// infinite loop into a diagnosable internal error instead.
pub const MAX_PLACEMENT_PASSES: usize = 64;

/// Run the placement pass to a fix point, returning the final size of
/// the text segment in bytes.
pub fn place(ir: &mut Ir, symtab: &mut SymbolTable, default_branch_size: u8) -> Result<u16> {
    let mut pass = 0usize;
    let mut final_pc = START_ADDRESS as i32;

    loop {
        let mut changed = false;
        let mut pc: i32 = START_ADDRESS as i32;

        for record in ir.records_mut() {
            match record {
                Record::Bytes(bytes) => pc += bytes.len() as i32,
                Record::Fill(count) => pc += *count as i32,
                Record::LabelDef(id) => symtab.bind(*id, SymbolType::Text, pc),
                Record::Expr(expr) => {
                    let len = resolve_length(expr, symtab, pc, pass, default_branch_size)?;
                    if len != expr.length {
                        changed = true;
                        expr.length = len;
                    }
                    pc += len as i32;
                }
            }
        }

        final_pc = pc;
        pass += 1;
        if !changed {
            #[cfg(feature = "logging")]
            log::debug!("placement pass {} made no further changes", pass);
            break;
        }
        #[cfg(feature = "logging")]
        log::trace!("placement pass {} changed at least one record's length", pass);
        if pass > MAX_PLACEMENT_PASSES {
            return Err(Error::placement("placement did not converge after the maximum number of passes"));
        }
    }

    let unresolved = symtab.unresolved();
    if !unresolved.is_empty() {
        let refs = unresolved
            .into_iter()
            .map(|id| {
                let sym = symtab.get(id);
                UnresolvedRef { name: sym.name.clone(), line: Some(sym.line) }
            })
            .collect();
        return Err(Error::unresolved(refs));
    }

    Ok(final_pc as u16)
}

fn resolve_length(
    expr: &mut ExprRecord,
    symtab: &SymbolTable,
    pc: i32,
    pass: usize,
    default_branch_size: u8,
) -> Result<u8> {
    match expr.operand {
        Operand::RawByte => Ok(1),
        Operand::RawWord => Ok(2),
        Operand::Instruction(_) => {
            if expr.relative_branch {
                resolve_branch_length(expr, symtab, pc, pass, default_branch_size)
            } else {
                if let Some(zp_opcode) = expr.zero_page_shrinkable {
                    if let Some(sym_id) = expr.symbol {
                        if symtab.get(sym_id).ty == SymbolType::Zp {
                            expr.operand = Operand::Instruction(zp_opcode);
                            return Ok(2);
                        }
                    }
                }
                Ok(expr.base_length)
            }
        }
    }
}

fn resolve_branch_length(
    expr: &ExprRecord,
    symtab: &SymbolTable,
    pc: i32,
    pass: usize,
    default_branch_size: u8,
) -> Result<u8> {
    let sym_id = expr
        .symbol
        .ok_or_else(|| Error::placement(format!("line {}: relative branch has no target", expr.line)))?;
    let sym = symtab.get(sym_id);

    // On the first pass most forward branch targets are still
    // unresolved references; assume the default size and let later
    // passes correct it once the target is known.
    if pass == 0 || sym.ty == SymbolType::Reference {
        return Ok(default_branch_size.max(expr.length));
    }

    if sym.ty != SymbolType::Text {
        return Err(Error::semantic(expr.line, "branch target is not a text-segment label"));
    }

    let target = symtab.resolve_address(sym_id, 0) + expr.offset;
    let delta = target - (pc + 2);
    if (-128..=127).contains(&delta) {
        Ok(2)
    } else if default_branch_size == 2 {
        Err(Error::placement(format!("line {}: branch out of range and .expand 0 forbids the long form", expr.line)))
    } else {
        Ok(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Postprocess;

    fn branch(symbol: crate::symtab::SymbolId, line: u32) -> ExprRecord {
        ExprRecord {
            operand: Operand::Instruction(0xD0),
            symbol: Some(symbol),
            offset: 0,
            postprocess: Postprocess::None,
            line,
            relative_branch: true,
            zero_page_shrinkable: None,
            immediate: false,
            base_length: 0,
            length: 0,
        }
    }

    #[test]
    fn backward_branch_converges_to_short_form() {
        let mut symtab = SymbolTable::new();
        let mut ir = Ir::new();
        let top = symtab.define("top", SymbolType::Text, 0, 1).unwrap();
        ir.push_label(top);
        ir.push_expr(branch(top, 2));
        let text_usage = place(&mut ir, &mut symtab, 5).unwrap();
        assert_eq!(text_usage, START_ADDRESS + 2);
        match &ir.records()[1] {
            Record::Expr(e) => assert_eq!(e.length, 2),
            _ => panic!("expected expr record"),
        }
    }

    #[test]
    fn unresolved_reference_is_reported() {
        let mut symtab = SymbolTable::new();
        let mut ir = Ir::new();
        let missing = symtab.lookup_or_reference("nowhere", 3).unwrap();
        ir.push_expr(branch(missing, 3));
        let err = place(&mut ir, &mut symtab, 5).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unresolved);
        assert_eq!(err.unresolved()[0].name, "nowhere");
    }
}
