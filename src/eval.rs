//! The expression evaluator: prefix/infix operators over constants and
//! symbol references, with the "constant discipline" that only `+` and
//! `-` may mix a symbol with a constant.
//!
//! The original evaluates onto an explicit 8-deep array stack via
//! recursive descent. This reimplementation keeps the recursive
//! descent but lets the Rust call stack stand in for that array,
//! tracking only a depth counter so the same "expression too complex"
//! diagnostic fires at the same nesting depth.

use crate::error::{Error, Result};
use crate::ir::{Ir, Postprocess};
use crate::stream::TokenStream;
use crate::symtab::{SymbolId, SymbolTable};
use crate::token::TokenKind;

/// Maximum expression nesting depth, matching the original's 8-slot
/// evaluation stack.
const MAX_DEPTH: u32 = 8;

/// The result of evaluating an expression: either a pure constant
/// (`symbol: None`) or a symbol plus a constant offset from it, along
/// with any leading `<`/`>` postprocessing that could not be applied
/// immediately because the value was not constant.
#[derive(Clone, Copy, Debug)]
pub struct EvalResult {
    pub symbol: Option<SymbolId>,
    pub offset: i32,
    pub postprocess: Postprocess,
}

#[derive(Clone, Copy, Debug)]
struct Value {
    symbol: Option<SymbolId>,
    offset: i32,
}

pub fn parse_expression(stream: &mut TokenStream, symtab: &mut SymbolTable, ir: &mut Ir) -> Result<EvalResult> {
    let postprocess = match stream.peek()?.kind {
        TokenKind::Punct('<') => {
            stream.next()?;
            Postprocess::Low
        }
        TokenKind::Punct('>') => {
            stream.next()?;
            Postprocess::High
        }
        _ => Postprocess::None,
    };

    let value = parse_chain(stream, symtab, ir, 0)?;

    if postprocess != Postprocess::None && value.symbol.is_none() {
        let applied = match postprocess {
            Postprocess::Low => value.offset & 0xFF,
            Postprocess::High => (value.offset >> 8) & 0xFF,
            Postprocess::None => unreachable!(),
        };
        return Ok(EvalResult { symbol: None, offset: applied, postprocess: Postprocess::None });
    }

    Ok(EvalResult { symbol: value.symbol, offset: value.offset, postprocess })
}

fn parse_chain(stream: &mut TokenStream, symtab: &mut SymbolTable, ir: &mut Ir, depth: u32) -> Result<Value> {
    let mut value = parse_node(stream, symtab, ir, depth)?;
    loop {
        let op = match stream.peek()?.kind {
            TokenKind::Punct(c @ ('+' | '-' | '*' | '|' | '^' | '&' | '/' | '%')) => c,
            _ => break,
        };
        let line = stream.line();
        stream.next()?;
        let rhs = parse_node(stream, symtab, ir, depth)?;
        value = apply_infix(op, value, rhs, line)?;
    }
    Ok(value)
}

fn parse_node(stream: &mut TokenStream, symtab: &mut SymbolTable, ir: &mut Ir, depth: u32) -> Result<Value> {
    if depth >= MAX_DEPTH {
        return Err(Error::syntax(stream.line(), "expression too complex"));
    }
    let line = stream.line();
    let tok = stream.next()?;
    match tok.kind {
        TokenKind::Punct('-') => {
            let v = parse_node(stream, symtab, ir, depth + 1)?;
            require_constant(&v, line)?;
            Ok(Value { symbol: None, offset: -v.offset })
        }
        TokenKind::Punct('~') => {
            let v = parse_node(stream, symtab, ir, depth + 1)?;
            require_constant(&v, line)?;
            Ok(Value { symbol: None, offset: !v.offset })
        }
        TokenKind::Punct('(') => {
            let v = parse_chain(stream, symtab, ir, depth + 1)?;
            expect_punct(stream, ')')?;
            Ok(v)
        }
        TokenKind::Punct('*') => {
            let id = symtab.anonymous(line);
            ir.push_label(id);
            Ok(Value { symbol: Some(id), offset: 0 })
        }
        TokenKind::Number(n) => Ok(Value { symbol: None, offset: n as i32 }),
        TokenKind::Char(c) => Ok(Value { symbol: None, offset: c as i32 }),
        TokenKind::Ident(name) => {
            let id = symtab.lookup_or_reference(&name, line)?;
            Ok(Value { symbol: Some(id), offset: 0 })
        }
        _ => Err(Error::syntax(line, "expected an expression")),
    }
}

fn require_constant(v: &Value, line: u32) -> Result<()> {
    if v.symbol.is_some() {
        Err(Error::semantic(line, "operation requires a constant value"))
    } else {
        Ok(())
    }
}

fn apply_infix(op: char, lhs: Value, rhs: Value, line: u32) -> Result<Value> {
    match op {
        '+' => combine_additive(lhs, rhs, line, 1),
        '-' => combine_additive(lhs, rhs, line, -1),
        _ => {
            require_constant(&lhs, line)?;
            require_constant(&rhs, line)?;
            let (a, b) = (lhs.offset, rhs.offset);
            let value = match op {
                '*' => a.wrapping_mul(b),
                '|' => a | b,
                '^' => a ^ b,
                '&' => a & b,
                '/' => {
                    if b == 0 {
                        return Err(Error::semantic(line, "division by zero"));
                    }
                    a / b
                }
                '%' => {
                    if b == 0 {
                        return Err(Error::semantic(line, "division by zero"));
                    }
                    a % b
                }
                _ => unreachable!("unhandled infix operator '{}'", op),
            };
            Ok(Value { symbol: None, offset: value })
        }
    }
}

fn combine_additive(lhs: Value, rhs: Value, line: u32, sign: i32) -> Result<Value> {
    match (lhs.symbol, rhs.symbol) {
        (Some(_), Some(_)) => Err(Error::semantic(line, "cannot combine two relocatable symbols")),
        (Some(s), None) => Ok(Value { symbol: Some(s), offset: lhs.offset + sign * rhs.offset }),
        (None, Some(s)) if sign > 0 => Ok(Value { symbol: Some(s), offset: lhs.offset + rhs.offset }),
        (None, Some(_)) => Err(Error::semantic(line, "cannot negate a relocatable symbol")),
        (None, None) => Ok(Value { symbol: None, offset: lhs.offset + sign * rhs.offset }),
    }
}

fn expect_punct(stream: &mut TokenStream, expected: char) -> Result<()> {
    let tok = stream.next()?;
    match tok.kind {
        TokenKind::Punct(c) if c == expected => Ok(()),
        _ => Err(Error::syntax(tok.line, format!("expected '{}'", expected))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Lexer;

    fn eval(src: &str) -> EvalResult {
        let mut stream = TokenStream::new(Lexer::new(src, None));
        let mut symtab = SymbolTable::new();
        let mut ir = Ir::new();
        parse_expression(&mut stream, &mut symtab, &mut ir).unwrap()
    }

    #[test]
    fn left_to_right_no_precedence() {
        // matches the original's single-pass left-to-right evaluator:
        // (1 + 2) * 3 = 9, not 1 + (2 * 3) = 7.
        let r = eval("1 + 2 * 3");
        assert_eq!(r.offset, 9);
        assert!(r.symbol.is_none());
    }

    #[test]
    fn low_high_byte_of_constant() {
        assert_eq!(eval("<$1234").offset, 0x34);
        assert_eq!(eval(">$1234").offset, 0x12);
    }

    #[test]
    fn unknown_identifier_becomes_a_reference() {
        let mut stream = TokenStream::new(Lexer::new("foo", None));
        let mut symtab = SymbolTable::new();
        let mut ir = Ir::new();
        let r = parse_expression(&mut stream, &mut symtab, &mut ir).unwrap();
        let id = r.symbol.unwrap();
        assert_eq!(symtab.get(id).ty, crate::symtab::SymbolType::Reference);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut stream = TokenStream::new(Lexer::new("1 / 0", None));
        let mut symtab = SymbolTable::new();
        let mut ir = Ir::new();
        let err = parse_expression(&mut stream, &mut symtab, &mut ir).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Semantic);
    }

    #[test]
    fn multiplying_two_symbols_is_an_error() {
        let mut stream = TokenStream::new(Lexer::new("foo * bar", None));
        let mut symtab = SymbolTable::new();
        let mut ir = Ir::new();
        let err = parse_expression(&mut stream, &mut symtab, &mut ir).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Semantic);
    }
}
