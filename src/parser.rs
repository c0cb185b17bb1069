//! The directive dispatcher: turns a token stream into the
//! intermediate representation, handling instructions, pseudo-ops,
//! labels, constant definitions, and the structured control constructs
//! (`zproc`/`zloop`/`zif`/`zuntil`/`zbreak`/`zcontinue`).
//!
//! All mutable compilation state (the symbol table, the IR being
//! built, zero-page/BSS high-water marks, the default branch size, the
//! loop and `zif` nesting stacks) lives on one `Assembler` value threaded
//! through by `&mut self`, rather than at module or process scope.

use crate::encoder::{self, AddrMode};
use crate::error::{Error, Result};
use crate::eval::{self, EvalResult};
use crate::format::JMP_OPCODE;
use crate::ir::{ExprRecord, Ir, Operand, Postprocess};
use crate::stream::TokenStream;
use crate::symtab::{SymbolId, SymbolTable, SymbolType};
use crate::token::{Lexer, TokenKind};

/// Initial branch-expansion policy: a relative branch that turns out to
/// be out of range is automatically rewritten into the 5-byte long
/// form. `.expand 0` disables this for the remainder of the file.
const DEFAULT_BRANCH_SIZE: u8 = 5;

#[derive(Debug)]
pub struct Assembler {
    stream: TokenStream,
    symtab: SymbolTable,
    ir: Ir,
    zp_usage: u16,
    bss_usage: u16,
    default_branch_size: u8,
    loops: Vec<(SymbolId, SymbolId)>,
    if_stack: Vec<SymbolId>,
}

impl Assembler {
    pub fn new(lexer: Lexer) -> Self {
        Assembler {
            stream: TokenStream::new(lexer),
            symtab: SymbolTable::new(),
            ir: Ir::new(),
            zp_usage: 0,
            bss_usage: 0,
            default_branch_size: DEFAULT_BRANCH_SIZE,
            loops: Vec::new(),
            if_stack: Vec::new(),
        }
    }

    /// Parse the entire input, building `self`'s IR and symbol table.
    pub fn parse(&mut self) -> Result<()> {
        loop {
            while matches!(self.stream.peek()?.kind, TokenKind::Terminator) {
                self.stream.next()?;
            }
            if matches!(self.stream.peek()?.kind, TokenKind::Eof) {
                break;
            }
            self.parse_statement()?;
        }
        if !self.loops.is_empty() {
            return Err(Error::semantic(self.stream.line(), "zloop without a matching zendloop/zuntil"));
        }
        if !self.if_stack.is_empty() {
            return Err(Error::semantic(self.stream.line(), "zif without a matching zendif"));
        }
        if self.symtab.scope_depth() != 0 {
            return Err(Error::semantic(self.stream.line(), "zproc without a matching zendproc"));
        }
        Ok(())
    }

    /// Consume `self`, handing ownership of its built IR and symbol
    /// table to the placement pass, along with the final zero-page
    /// usage and branch-expansion policy.
    pub fn into_parts(self) -> (Ir, SymbolTable, u8, u8) {
        (self.ir, self.symtab, self.zp_usage as u8, self.default_branch_size)
    }

    fn parse_statement(&mut self) -> Result<()> {
        let line = self.stream.line();
        let tok = self.stream.next()?;
        match tok.kind {
            TokenKind::Punct('.') => self.parse_directive(line),
            TokenKind::Ident(name) => self.parse_ident_statement(name, line),
            _ => Err(Error::syntax(line, "expected a statement")),
        }
    }

    fn parse_ident_statement(&mut self, name: String, line: u32) -> Result<()> {
        match name.to_ascii_lowercase().as_str() {
            "zproc" => return self.parse_zproc(line),
            "zendproc" => return self.parse_zendproc(line),
            "zloop" | "zrepeat" => return self.parse_zloop(line),
            "zendloop" => return self.parse_zendloop(line),
            "zuntil" => return self.parse_zuntil(line),
            "zif" => return self.parse_zif(line),
            "zendif" => return self.parse_zendif(line),
            "zbreak" => return self.parse_break_or_continue(line, false),
            "zcontinue" => return self.parse_break_or_continue(line, true),
            _ => {}
        }

        if matches!(self.stream.peek()?.kind, TokenKind::Punct(':')) {
            self.stream.next()?;
            return self.define_label(&name, line);
        }
        if matches!(self.stream.peek()?.kind, TokenKind::Punct('=')) {
            self.stream.next()?;
            return self.define_constant(&name, line);
        }
        self.parse_instruction(&name, line)
    }

    fn define_label(&mut self, name: &str, line: u32) -> Result<()> {
        let id = self.symtab.define(name, SymbolType::Text, 0, line)?;
        self.ir.push_label(id);
        self.expect_terminator()
    }

    fn define_constant(&mut self, name: &str, line: u32) -> Result<()> {
        let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
        let id = self.symtab.define(name, SymbolType::Computed, r.offset, line)?;
        if let Some(alias) = r.symbol {
            self.symtab.get_mut(id).alias = Some(alias);
        }
        self.expect_terminator()
    }

    // ---- directives --------------------------------------------------

    fn parse_directive(&mut self, line: u32) -> Result<()> {
        let tok = self.stream.next()?;
        let name = match tok.kind {
            TokenKind::Ident(n) => n,
            _ => return Err(Error::syntax(line, "expected a directive name after '.'")),
        };
        match name.to_ascii_lowercase().as_str() {
            "zp" => self.parse_reserve(line, true),
            "bss" => self.parse_reserve(line, false),
            "byte" => self.parse_data(line, 1),
            "word" => self.parse_data(line, 2),
            "fill" => self.parse_fill(line),
            "expand" => self.parse_expand(line),
            "label" => self.parse_label_directive(line),
            "include" => self.parse_include(line),
            other => Err(Error::syntax(line, format!("unknown directive '.{}'", other))),
        }
    }

    fn parse_reserve(&mut self, line: u32, zero_page: bool) -> Result<()> {
        let name = self.expect_ident(line)?;
        self.expect_punct(',')?;
        let count_result = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
        if count_result.symbol.is_some() || count_result.offset < 0 {
            return Err(Error::semantic(line, "reservation size must be a non-negative constant"));
        }
        let count = count_result.offset as u32;

        if zero_page {
            let new_total = self.zp_usage as u32 + count;
            if new_total > 255 {
                return Err(Error::semantic(line, "zero page exhausted"));
            }
            self.symtab.define(&name, SymbolType::Zp, self.zp_usage as i32, line)?;
            self.zp_usage = new_total as u16;
        } else {
            let new_total = self.bss_usage as u32 + count;
            if new_total > u16::MAX as u32 {
                return Err(Error::semantic(line, "BSS segment exhausted"));
            }
            self.symtab.define(&name, SymbolType::Bss, self.bss_usage as i32, line)?;
            self.bss_usage = new_total as u16;
        }
        self.expect_terminator()
    }

    fn parse_data(&mut self, line: u32, width: u8) -> Result<()> {
        loop {
            if width == 1 && matches!(self.stream.peek()?.kind, TokenKind::Str(_)) {
                if let TokenKind::Str(s) = self.stream.next()?.kind {
                    self.ir.push_bytes(s.as_bytes());
                }
            } else {
                let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
                self.push_data_item(r, width, line);
            }
            if matches!(self.stream.peek()?.kind, TokenKind::Punct(',')) {
                self.stream.next()?;
                continue;
            }
            break;
        }
        self.expect_terminator()
    }

    fn push_data_item(&mut self, r: EvalResult, width: u8, line: u32) {
        match r.symbol {
            None => {
                if width == 1 {
                    self.ir.push_byte(r.offset as u8);
                } else {
                    self.ir.push_bytes(&(r.offset as u16).to_le_bytes());
                }
            }
            Some(symbol) => self.ir.push_expr(ExprRecord {
                operand: if width == 1 { Operand::RawByte } else { Operand::RawWord },
                symbol: Some(symbol),
                offset: r.offset,
                postprocess: r.postprocess,
                line,
                relative_branch: false,
                zero_page_shrinkable: None,
                immediate: false,
                base_length: width,
                length: width,
            }),
        }
    }

    fn parse_fill(&mut self, line: u32) -> Result<()> {
        let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
        if r.symbol.is_some() || r.offset < 0 {
            return Err(Error::semantic(line, ".fill count must be a non-negative constant"));
        }
        self.ir.push_fill(r.offset as u16);
        self.expect_terminator()
    }

    fn parse_expand(&mut self, line: u32) -> Result<()> {
        let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
        self.default_branch_size = if r.offset == 0 { 2 } else { 5 };
        self.expect_terminator()
    }

    fn parse_label_directive(&mut self, line: u32) -> Result<()> {
        let _ = line;
        eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
        self.expect_terminator()
    }

    fn parse_include(&mut self, line: u32) -> Result<()> {
        let tok = self.stream.next()?;
        let filename = match tok.kind {
            TokenKind::Str(s) => s,
            _ => return Err(Error::syntax(line, "expected a filename string after .include")),
        };
        self.stream.include(&filename, line)?;
        self.expect_terminator()
    }

    // ---- structured control -------------------------------------------

    fn parse_zproc(&mut self, line: u32) -> Result<()> {
        let name = self.expect_ident(line)?;
        let id = self.symtab.define(&name, SymbolType::Text, 0, line)?;
        self.ir.push_label(id);
        self.symtab.push_scope();
        self.expect_terminator()
    }

    fn parse_zendproc(&mut self, line: u32) -> Result<()> {
        self.symtab.pop_scope(line)?;
        self.expect_terminator()
    }

    fn parse_zloop(&mut self, line: u32) -> Result<()> {
        self.symtab.push_scope();
        let continue_label = self.symtab.anonymous(line);
        self.ir.push_label(continue_label);
        let break_label = self.symtab.anonymous(line);
        self.loops.push((continue_label, break_label));
        self.expect_terminator()
    }

    fn parse_zendloop(&mut self, line: u32) -> Result<()> {
        let (continue_label, break_label) =
            self.loops.pop().ok_or_else(|| Error::semantic(line, "zendloop without a matching zloop"))?;
        self.emit_jump(continue_label, line);
        self.ir.push_label(break_label);
        self.symtab.pop_scope(line)?;
        self.expect_terminator()
    }

    /// `zuntil cc` is an alternative loop terminator to `zendloop`: it
    /// branches back to the loop's top if the *inverse* of `cc` holds
    /// ("loop until cc" means "keep looping while not cc"), with no
    /// trailing unconditional jump.
    fn parse_zuntil(&mut self, line: u32) -> Result<()> {
        let cc = self.expect_ident(line)?;
        let (continue_label, break_label) =
            self.loops.pop().ok_or_else(|| Error::semantic(line, "zuntil without a matching zloop"))?;
        self.emit_conditional_branch(&cc, continue_label, line, true)?;
        self.ir.push_label(break_label);
        self.symtab.pop_scope(line)?;
        self.expect_terminator()
    }

    fn parse_zif(&mut self, line: u32) -> Result<()> {
        let cc = self.expect_ident(line)?;
        let end_label = self.symtab.anonymous(line);
        self.emit_conditional_branch(&cc, end_label, line, true)?;
        self.if_stack.push(end_label);
        self.expect_terminator()
    }

    fn parse_zendif(&mut self, line: u32) -> Result<()> {
        let end_label = self.if_stack.pop().ok_or_else(|| Error::semantic(line, "zendif without a matching zif"))?;
        self.ir.push_label(end_label);
        self.expect_terminator()
    }

    /// `zbreak [cc]` / `zcontinue [cc]` branch to the innermost loop's
    /// break/continue label *if* `cc` holds, uninverted — unlike
    /// `zuntil`, these phrase their condition as the action's trigger,
    /// not the loop's exit test. An absent `cc` means unconditional.
    fn parse_break_or_continue(&mut self, line: u32, is_continue: bool) -> Result<()> {
        let (continue_label, break_label) = *self
            .loops
            .last()
            .ok_or_else(|| Error::semantic(line, "zbreak/zcontinue outside of a loop"))?;
        let target = if is_continue { continue_label } else { break_label };
        if self.stream.peek_is_terminator()? {
            self.emit_jump(target, line);
        } else {
            let cc = self.expect_ident(line)?;
            self.emit_conditional_branch(&cc, target, line, false)?;
        }
        self.expect_terminator()
    }

    fn emit_jump(&mut self, target: SymbolId, line: u32) {
        self.ir.push_expr(ExprRecord {
            operand: Operand::Instruction(JMP_OPCODE),
            symbol: Some(target),
            offset: 0,
            postprocess: Postprocess::None,
            line,
            relative_branch: false,
            zero_page_shrinkable: None,
            immediate: false,
            base_length: 3,
            length: 3,
        });
    }

    fn emit_conditional_branch(&mut self, cc: &str, target: SymbolId, line: u32, invert: bool) -> Result<()> {
        let mnemonic = format!("B{}", cc.to_ascii_uppercase());
        if !encoder::is_relative_branch(&mnemonic) {
            return Err(Error::semantic(line, format!("'{}' is not a valid branch condition", cc)));
        }
        let (mut opcode, _) = encoder::resolve(&mnemonic, AddrMode::Relative, line)?;
        if invert {
            opcode ^= 0b0010_0000;
        }
        self.ir.push_expr(ExprRecord {
            operand: Operand::Instruction(opcode),
            symbol: Some(target),
            offset: 0,
            postprocess: Postprocess::None,
            line,
            relative_branch: true,
            zero_page_shrinkable: None,
            immediate: false,
            base_length: 0,
            length: self.default_branch_size,
        });
        Ok(())
    }

    // ---- instructions ---------------------------------------------------

    fn parse_instruction(&mut self, mnemonic: &str, line: u32) -> Result<()> {
        if !encoder::is_instruction(mnemonic) {
            return Err(Error::syntax(line, format!("unknown instruction '{}'", mnemonic)));
        }

        if encoder::is_relative_branch(mnemonic) {
            let (opcode, _) = encoder::resolve(mnemonic, AddrMode::Relative, line)?;
            let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
            let target = r.symbol.ok_or_else(|| Error::semantic(line, "branch target must be a label"))?;
            self.ir.push_expr(ExprRecord {
                operand: Operand::Instruction(opcode),
                symbol: Some(target),
                offset: r.offset,
                postprocess: Postprocess::None,
                line,
                relative_branch: true,
                zero_page_shrinkable: None,
                immediate: false,
                base_length: 0,
                length: self.default_branch_size,
            });
            return self.expect_terminator();
        }

        let (mode, operand) = self.parse_operand_mode()?;
        let (opcode, resolved_mode) = encoder::resolve(mnemonic, mode, line)?;

        match operand {
            None => self.ir.push_byte(opcode),
            Some(r) => {
                let base_length = encoder::fixed_size(resolved_mode).unwrap_or(1);
                match r.symbol {
                    None => {
                        self.ir.push_byte(opcode);
                        match base_length {
                            2 => self.ir.push_byte(r.offset as u8),
                            3 => self.ir.push_bytes(&(r.offset as u16).to_le_bytes()),
                            _ => {}
                        }
                    }
                    Some(symbol) => {
                        let shrink = encoder::zero_page_opcode(mnemonic, resolved_mode);
                        self.ir.push_expr(ExprRecord {
                            operand: Operand::Instruction(opcode),
                            symbol: Some(symbol),
                            offset: r.offset,
                            postprocess: r.postprocess,
                            line,
                            relative_branch: false,
                            zero_page_shrinkable: shrink,
                            immediate: matches!(resolved_mode, AddrMode::Immediate),
                            base_length,
                            length: base_length,
                        });
                    }
                }
            }
        }
        self.expect_terminator()
    }

    fn parse_operand_mode(&mut self) -> Result<(AddrMode, Option<EvalResult>)> {
        if self.stream.peek_is_terminator()? {
            return Ok((AddrMode::Implied, None));
        }
        match self.stream.peek()?.kind.clone() {
            TokenKind::Punct('#') => {
                self.stream.next()?;
                let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
                Ok((AddrMode::Immediate, Some(r)))
            }
            TokenKind::Punct('(') => {
                self.stream.next()?;
                let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
                let tok = self.stream.next()?;
                match tok.kind {
                    TokenKind::Punct(',') => {
                        self.expect_register('X')?;
                        self.expect_punct(')')?;
                        Ok((AddrMode::IndirectX, Some(r)))
                    }
                    TokenKind::Punct(')') => {
                        if matches!(self.stream.peek()?.kind, TokenKind::Punct(',')) {
                            self.stream.next()?;
                            self.expect_register('Y')?;
                            Ok((AddrMode::IndirectY, Some(r)))
                        } else {
                            Ok((AddrMode::Indirect, Some(r)))
                        }
                    }
                    _ => Err(Error::syntax(tok.line, "expected ',' or ')'")),
                }
            }
            TokenKind::Ident(name) if name.eq_ignore_ascii_case("a") => {
                let tok = self.stream.next()?;
                if self.stream.peek_is_terminator()? {
                    Ok((AddrMode::Accumulator, None))
                } else {
                    self.stream.push_back(tok);
                    let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
                    self.finish_direct_or_indexed(r)
                }
            }
            _ => {
                let r = eval::parse_expression(&mut self.stream, &mut self.symtab, &mut self.ir)?;
                self.finish_direct_or_indexed(r)
            }
        }
    }

    fn finish_direct_or_indexed(&mut self, r: EvalResult) -> Result<(AddrMode, Option<EvalResult>)> {
        if matches!(self.stream.peek()?.kind, TokenKind::Punct(',')) {
            self.stream.next()?;
            let zero_page = r.symbol.is_none() && (0..0x100).contains(&r.offset);
            let mode = if self.peek_register('X') {
                self.expect_register('X')?;
                if zero_page { AddrMode::ZeroPageX } else { AddrMode::AbsoluteX }
            } else {
                self.expect_register('Y')?;
                if zero_page { AddrMode::ZeroPageY } else { AddrMode::AbsoluteY }
            };
            Ok((mode, Some(r)))
        } else {
            let zero_page = r.symbol.is_none() && (0..0x100).contains(&r.offset);
            Ok((if zero_page { AddrMode::ZeroPage } else { AddrMode::Absolute }, Some(r)))
        }
    }

    fn peek_register(&mut self, reg: char) -> bool {
        match self.stream.peek() {
            Ok(tok) => matches!(&tok.kind, TokenKind::Ident(n) if n.eq_ignore_ascii_case(&reg.to_string())),
            Err(_) => false,
        }
    }

    fn expect_register(&mut self, expected: char) -> Result<()> {
        let tok = self.stream.next()?;
        match tok.kind {
            TokenKind::Ident(name) if name.eq_ignore_ascii_case(&expected.to_string()) => Ok(()),
            _ => Err(Error::syntax(tok.line, format!("expected register '{}'", expected))),
        }
    }

    fn expect_ident(&mut self, line: u32) -> Result<String> {
        let tok = self.stream.next()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(Error::syntax(line, "expected an identifier")),
        }
    }

    fn expect_punct(&mut self, expected: char) -> Result<()> {
        let tok = self.stream.next()?;
        match tok.kind {
            TokenKind::Punct(c) if c == expected => Ok(()),
            _ => Err(Error::syntax(tok.line, format!("expected '{}'", expected))),
        }
    }

    fn expect_terminator(&mut self) -> Result<()> {
        let tok = self.stream.next()?;
        match tok.kind {
            TokenKind::Terminator | TokenKind::Eof => Ok(()),
            _ => Err(Error::syntax(tok.line, "expected end of statement")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{emit, place};

    fn assemble(src: &str) -> emit::Output {
        let mut asm = Assembler::new(Lexer::new(src, None));
        asm.parse().unwrap();
        let (mut ir, mut symtab, zp_usage, default_branch_size) = asm.into_parts();
        let text_usage = place::place(&mut ir, &mut symtab, default_branch_size).unwrap();
        emit::emit(&ir, &symtab, zp_usage, text_usage)
    }

    fn code(out: &emit::Output) -> &[u8] {
        &out.object[crate::format::Header::SIZE..]
    }

    #[test]
    fn scenario_1_immediate_load() {
        let out = assemble("lda #$42\n");
        assert_eq!(&code(&out)[..2], &[0xA9, 0x42]);
    }

    #[test]
    fn scenario_2_forward_self_reference() {
        let out = assemble("foo: lda foo\n");
        assert_eq!(&code(&out)[..3], &[0xAD, 0x07, 0x00]);
    }

    #[test]
    fn scenario_3_zero_page_shrink() {
        let out = assemble(".zp x, 1\nlda x\n");
        assert_eq!(&code(&out)[..2], &[0xA5, 0x00]);
    }

    #[test]
    fn scenario_4_low_byte_of_forward_label() {
        let out = assemble("lda #<label\nlabel:\n");
        assert_eq!(&code(&out)[..2], &[0xA9, 0x09]);
    }

    #[test]
    fn scenario_5_zuntil_inverts_condition() {
        let out = assemble("zloop\ndex\nzuntil eq\n");
        assert_eq!(&code(&out)[..3], &[0xCA, 0xD0, 0xFD]);
    }

    #[test]
    fn scenario_6_zif_inverts_condition() {
        let out = assemble("zif cc\nnop\nzendif\n");
        assert_eq!(&code(&out)[..3], &[0xB0, 0x01, 0xEA]);
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let mut asm = Assembler::new(Lexer::new("x: nop\nx: nop\n", None));
        let err = asm.parse().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Semantic);
    }

    #[test]
    fn zbreak_and_zcontinue_do_not_invert() {
        let out = assemble("zloop\nzbreak eq\nzcontinue ne\nzendloop\n");
        // BEQ to break label, BNE to continue label, JMP to top.
        assert_eq!(code(&out)[0], 0xF0);
        assert_eq!(code(&out)[2], 0xD0);
        assert_eq!(code(&out)[4], 0x4C);
    }
}
