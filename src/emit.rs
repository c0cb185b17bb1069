//! The emitter: walks the placed intermediate representation one last
//! time, producing the code body, the two relocation streams, and the
//! `.SYM` symbol listing.
//!
//! The original's `WritableBuffer`-style two-phase (reserve, then
//! write) buffer abstraction exists to let an emitter stream output
//! without knowing its final size up front. This crate's object file
//! is built bottom-up from an already-placed IR whose final size is
//! known before a single byte is written, so the emitter here writes
//! straight into a growable `Vec<u8>` rather than carrying that
//! abstraction over unchanged; the two-phase split would be pure
//! ceremony for a format this size.

use crate::format::{Header, JMP_OPCODE, START_ADDRESS};
use crate::ir::{Ir, Operand, Postprocess, Record};
use crate::reloc;
use crate::symtab::{SymbolTable, SymbolType};

/// The two artifacts produced by a successful assembly.
#[derive(Debug)]
pub struct Output {
    /// The complete relocatable object file: header, code, zero-page
    /// relocation stream, text relocation stream.
    pub object: Vec<u8>,
    /// The `.SYM` listing, terminated with `0x1A`.
    pub listing: Vec<u8>,
}

pub fn emit(ir: &Ir, symtab: &SymbolTable, zp_usage: u8, text_usage: u16) -> Output {
    let mut code = Vec::new();
    let mut zp_marks: Vec<u16> = Vec::new();
    // The text stream's delta baseline starts at offset 3, not 0; this
    // mirrors the original encoder's `lastRelocation` seed and has no
    // deeper structural meaning beyond matching its output byte for byte.
    let mut text_marks: Vec<u16> = vec![3];

    let mut pc: i32 = START_ADDRESS as i32;
    for record in ir.records() {
        match record {
            Record::Bytes(bytes) => {
                code.extend_from_slice(bytes);
                pc += bytes.len() as i32;
            }
            Record::Fill(count) => {
                code.resize(code.len() + *count as usize, 0);
                pc += *count as i32;
            }
            Record::LabelDef(_) => {}
            Record::Expr(expr) => {
                emit_expr(expr, symtab, pc, text_usage, &mut code, &mut zp_marks, &mut text_marks);
                pc += expr.length as i32;
            }
        }
    }

    #[cfg(feature = "logging")]
    log::debug!("{} zero-page relocations, {} text relocations", zp_marks.len(), text_marks.len());

    let header = Header { zp_usage, tpa_pages: Header::pages_for(text_usage, 0), text_usage };
    let mut object = Vec::with_capacity(Header::SIZE + code.len());
    object.extend_from_slice(&header.to_bytes());
    object.extend_from_slice(&code);
    object.extend_from_slice(&reloc::encode(&zp_marks));
    object.extend_from_slice(&reloc::encode(&text_marks));

    let listing = emit_symbols(symtab, text_usage);

    Output { object, listing }
}

fn resolved_type(symtab: &SymbolTable, id: crate::symtab::SymbolId) -> SymbolType {
    let sym = symtab.get(id);
    match sym.alias {
        Some(target) => symtab.get(target).ty,
        None => sym.ty,
    }
}

fn resolve_value(expr: &crate::ir::ExprRecord, symtab: &SymbolTable, text_usage: u16) -> i32 {
    match expr.symbol {
        Some(id) => symtab.resolve_address(id, text_usage) + expr.offset,
        None => expr.offset,
    }
}

/// Apply `<`/`>` address-byte selection to an already-resolved value.
/// A bare constant (`Postprocess::None`) passes through unchanged; the
/// emitter still truncates to the operand's byte width afterwards.
fn apply_postprocess(value: i32, postprocess: Postprocess) -> i32 {
    match postprocess {
        Postprocess::None => value,
        Postprocess::Low => value & 0xFF,
        Postprocess::High => (value >> 8) & 0xFF,
    }
}

fn emit_expr(
    expr: &crate::ir::ExprRecord,
    symtab: &SymbolTable,
    pc: i32,
    text_usage: u16,
    code: &mut Vec<u8>,
    zp_marks: &mut Vec<u16>,
    text_marks: &mut Vec<u16>,
) {
    if expr.relative_branch {
        let opcode = match expr.operand {
            Operand::Instruction(op) => op,
            _ => unreachable!("relative branches are always instructions"),
        };
        let target = resolve_value(expr, symtab, text_usage);
        if expr.length == 2 {
            let delta = target - (pc + 2);
            code.push(opcode);
            code.push(delta as i8 as u8);
        } else {
            // Long form: branch on the inverse condition past a JMP to
            // the true target.
            code.push(opcode ^ 0b0010_0000);
            code.push(3);
            code.push(JMP_OPCODE);
            let bytes = (target as u16).to_le_bytes();
            code.extend_from_slice(&bytes);
            text_marks.push((pc + 3) as u16);
        }
        return;
    }

    match expr.operand {
        Operand::RawByte => {
            let value = apply_postprocess(resolve_value(expr, symtab, text_usage), expr.postprocess);
            code.push(value as u8);
            mark_if_relocatable(expr, symtab, pc, zp_marks, text_marks);
        }
        Operand::RawWord => {
            let value = apply_postprocess(resolve_value(expr, symtab, text_usage), expr.postprocess) as u16;
            code.extend_from_slice(&value.to_le_bytes());
            mark_if_relocatable(expr, symtab, pc, zp_marks, text_marks);
        }
        Operand::Instruction(opcode) => {
            code.push(opcode);
            let value = apply_postprocess(resolve_value(expr, symtab, text_usage), expr.postprocess);
            match expr.length {
                2 => code.push(value as u8),
                3 => code.extend_from_slice(&(value as u16).to_le_bytes()),
                _ => {}
            }
            mark_if_relocatable(expr, symtab, pc, zp_marks, text_marks);
        }
    }
}

fn mark_if_relocatable(
    expr: &crate::ir::ExprRecord,
    symtab: &SymbolTable,
    pc: i32,
    zp_marks: &mut Vec<u16>,
    text_marks: &mut Vec<u16>,
) {
    let Some(sym_id) = expr.symbol else { return };
    match resolved_type(symtab, sym_id) {
        SymbolType::Zp => {
            if expr.postprocess != Postprocess::High {
                let addr = match expr.operand {
                    Operand::RawByte | Operand::RawWord => pc,
                    Operand::Instruction(_) => pc + 1,
                };
                zp_marks.push(addr as u16);
            }
        }
        SymbolType::Text | SymbolType::Bss => {
            if expr.postprocess != Postprocess::Low {
                let mut addr = pc + expr.length as i32 - 1;
                if expr.postprocess == Postprocess::High && !expr.immediate {
                    addr -= 1;
                }
                text_marks.push(addr as u16);
            }
        }
        _ => {}
    }
}

fn emit_symbols(symtab: &SymbolTable, text_usage: u16) -> Vec<u8> {
    let mut out = Vec::new();
    for (id, sym) in symtab.iter() {
        if sym.name.is_empty() {
            continue;
        }
        let ty = resolved_type(symtab, id);
        let address = symtab.resolve_address(id, text_usage) as u16;
        out.extend_from_slice(format!("{} {:04x} {}\r\n", ty.letter(), address, sym.name).as_bytes());
    }
    out.push(0x1A);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ExprRecord;

    #[test]
    fn lda_immediate_has_no_relocation() {
        let mut symtab = SymbolTable::new();
        let mut ir = Ir::new();
        ir.push_expr(ExprRecord {
            operand: Operand::Instruction(0xA9),
            symbol: None,
            offset: 0x42,
            postprocess: Postprocess::None,
            line: 1,
            relative_branch: false,
            zero_page_shrinkable: None,
            immediate: true,
            base_length: 2,
            length: 2,
        });
        let out = emit(&ir, &symtab, 0, START_ADDRESS + 2);
        assert_eq!(&out.object[Header::SIZE..Header::SIZE + 2], &[0xA9, 0x42]);
    }

    #[test]
    fn symbol_listing_skips_anonymous_entries() {
        let mut symtab = SymbolTable::new();
        symtab.define("start", SymbolType::Text, 7, 1).unwrap();
        symtab.anonymous(2);
        let ir = Ir::new();
        let out = emit(&ir, &symtab, 0, 7);
        let listing = String::from_utf8(out.listing[..out.listing.len() - 1].to_vec()).unwrap();
        assert_eq!(listing, "T 0007 start\r\n");
    }
}
