//! The lexer: turns a stack of source files into a stream of tokens.
//!
//! Treated as fixed scaffolding rather than part of the algorithmic
//! core (see the top of this crate's documentation): its surface is a
//! conventional hand-rolled tokenizer, not a parser-combinator pipeline,
//! because the source language has no recursive grammar at the token
//! level — just numbers, identifiers, strings, characters, and a fixed
//! set of punctuation.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One lexical token, carrying the 1-based line number (within its own
/// input stream) at which it started.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(i64),
    Str(String),
    Char(u8),
    /// One of `& ^ | ~ # ( ) * + , - . / : < = >`.
    Punct(char),
    /// A line feed or a literal `;`: both end the current statement.
    Terminator,
    Eof,
}

#[derive(Debug)]
struct Frame {
    path: Option<PathBuf>,
    chars: Vec<char>,
    pos: usize,
    line: u32,
}

/// A stack of open input streams. `.include` pushes a new frame; running
/// off the end of a frame pops it and resumes the one beneath.
#[derive(Debug)]
pub struct Lexer {
    stack: Vec<Frame>,
}

impl Lexer {
    pub fn new(source: impl Into<String>, path: Option<PathBuf>) -> Self {
        let source = source.into();
        Lexer { stack: vec![Frame { path, chars: source.chars().collect(), pos: 0, line: 1 }] }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("cannot open '{}': {}", path.display(), e)))?;
        Ok(Lexer::new(text, Some(path.to_path_buf())))
    }

    /// Push `filename` as a new innermost input stream, resolved
    /// relative to the directory of the file currently being read (or
    /// the process's current directory for the initial source file).
    pub fn include(&mut self, filename: &str, line: u32) -> Result<()> {
        let base = self.stack.last().and_then(|f| f.path.as_deref()).and_then(Path::parent);
        let path = match base {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(filename),
            _ => PathBuf::from(filename),
        };
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::lex(line, format!("cannot open included file '{}': {}", path.display(), e)))?;
        self.stack.push(Frame { path: Some(path), chars: text.chars().collect(), pos: 0, line: 1 });
        Ok(())
    }

    /// The line number within whichever input stream is currently active.
    pub fn line(&self) -> u32 {
        self.stack.last().map(|f| f.line).unwrap_or(0)
    }

    fn peek(&self) -> Option<char> {
        self.stack.last().and_then(|f| f.chars.get(f.pos).copied())
    }

    fn peek2(&self) -> Option<char> {
        self.stack.last().and_then(|f| f.chars.get(f.pos + 1).copied())
    }

    fn bump(&mut self) -> Option<char> {
        let f = self.stack.last_mut()?;
        let c = f.chars.get(f.pos).copied();
        if let Some(ch) = c {
            f.pos += 1;
            if ch == '\n' {
                f.line += 1;
            }
        }
        c
    }

    fn at_frame_end(&self) -> bool {
        match self.stack.last() {
            Some(f) => f.pos >= f.chars.len(),
            None => true,
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        loop {
            if self.stack.is_empty() {
                return Ok(Token { kind: TokenKind::Eof, line: 0 });
            }
            if self.at_frame_end() {
                if self.stack.len() == 1 {
                    let line = self.line();
                    return Ok(Token { kind: TokenKind::Eof, line });
                }
                self.stack.pop();
                continue;
            }

            let line = self.line();
            match self.peek().unwrap() {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\\' => {
                    // `\` marks a comment to end of line: skip everything
                    // up to (not including) the newline, so it still
                    // surfaces as the statement terminator.
                    self.bump();
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                '\n' => {
                    self.bump();
                    return Ok(Token { kind: TokenKind::Terminator, line });
                }
                ';' => {
                    self.bump();
                    return Ok(Token { kind: TokenKind::Terminator, line });
                }
                c if c.is_ascii_digit() => return self.lex_number(line),
                '$' => return self.lex_number(line),
                c if c.is_ascii_alphabetic() || c == '_' => return self.lex_ident(line),
                '"' => return self.lex_string(line),
                '\'' => return self.lex_char(line),
                '&' | '^' | '|' | '~' | '#' | '(' | ')' | '*' | '+' | ',' | '-' | '.' | '/'
                | ':' | '<' | '=' | '>' => {
                    let c = self.bump().unwrap();
                    return Ok(Token { kind: TokenKind::Punct(c), line });
                }
                other => {
                    return Err(Error::lex(line, format!("unexpected character '{}'", other)));
                }
            }
        }
    }

    fn lex_ident(&mut self, line: u32) -> Result<Token> {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        Ok(Token { kind: TokenKind::Ident(s), line })
    }

    fn lex_number(&mut self, line: u32) -> Result<Token> {
        let (radix, mut s) = if self.peek() == Some('$') {
            self.bump();
            (16, String::new())
        } else if self.peek() == Some('0') && matches!(self.peek2(), Some('x') | Some('X')) {
            self.bump();
            self.bump();
            (16, String::new())
        } else if self.peek() == Some('0') && matches!(self.peek2(), Some('b') | Some('B')) {
            self.bump();
            self.bump();
            (2, String::new())
        } else if self.peek() == Some('0') && matches!(self.peek2(), Some('o') | Some('O')) {
            self.bump();
            self.bump();
            (8, String::new())
        } else {
            (10, String::new())
        };
        while let Some(c) = self.peek() {
            if c.is_digit(radix) || c == '_' {
                if c != '_' {
                    s.push(c);
                }
                self.bump();
            } else {
                break;
            }
        }
        if s.is_empty() {
            return Err(Error::lex(line, "invalid numeric literal"));
        }
        let value = i64::from_str_radix(&s, radix)
            .map_err(|_| Error::lex(line, format!("invalid digit in base-{} literal '{}'", radix, s)))?;
        Ok(Token { kind: TokenKind::Number(value), line })
    }

    fn lex_escape(&mut self, line: u32) -> Result<u8> {
        match self.bump() {
            Some('n') => Ok(b'\n'),
            Some('r') => Ok(b'\r'),
            Some('t') => Ok(b'\t'),
            Some('\\') => Ok(b'\\'),
            Some('"') => Ok(b'"'),
            Some('\'') => Ok(b'\''),
            Some(other) => Err(Error::lex(line, format!("invalid escape '\\{}'", other))),
            None => Err(Error::lex(line, "unterminated escape")),
        }
    }

    fn lex_string(&mut self, line: u32) -> Result<Token> {
        self.bump();
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None | Some('\n') => return Err(Error::lex(line, "unterminated string literal")),
                Some('"') => {
                    self.bump();
                    break;
                }
                Some('\\') => {
                    self.bump();
                    bytes.push(self.lex_escape(line)?);
                }
                Some(c) => {
                    self.bump();
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        Ok(Token { kind: TokenKind::Str(String::from_utf8_lossy(&bytes).into_owned()), line })
    }

    fn lex_char(&mut self, line: u32) -> Result<Token> {
        self.bump();
        let value = match self.peek() {
            Some('\\') => {
                self.bump();
                self.lex_escape(line)?
            }
            Some(c) => {
                self.bump();
                c as u8
            }
            None => return Err(Error::lex(line, "unterminated character literal")),
        };
        match self.bump() {
            Some('\'') => Ok(Token { kind: TokenKind::Char(value), line }),
            _ => Err(Error::lex(line, "unterminated character literal")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src, None);
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token().unwrap();
            let done = matches!(t.kind, TokenKind::Eof);
            out.push(t.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn numbers_in_every_base() {
        assert_eq!(tokens("42"), vec![TokenKind::Number(42), TokenKind::Eof]);
        assert_eq!(tokens("$2a"), vec![TokenKind::Number(0x2a), TokenKind::Eof]);
        assert_eq!(tokens("0x2A"), vec![TokenKind::Number(0x2a), TokenKind::Eof]);
        assert_eq!(tokens("0b101"), vec![TokenKind::Number(5), TokenKind::Eof]);
        assert_eq!(tokens("0o17"), vec![TokenKind::Number(15), TokenKind::Eof]);
    }

    #[test]
    fn string_with_escapes() {
        assert_eq!(
            tokens("\"a\\nb\""),
            vec![TokenKind::Str("a\nb".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn semicolon_and_newline_both_terminate() {
        assert_eq!(
            tokens("lda;sta\n"),
            vec![
                TokenKind::Ident("lda".to_string()),
                TokenKind::Terminator,
                TokenKind::Ident("sta".to_string()),
                TokenKind::Terminator,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn backslash_comments_to_end_of_line() {
        assert_eq!(
            tokens("lda \\ a comment\n#1\n"),
            vec![
                TokenKind::Ident("lda".to_string()),
                TokenKind::Terminator,
                TokenKind::Punct('#'),
                TokenKind::Number(1),
                TokenKind::Terminator,
                TokenKind::Eof,
            ]
        );
    }
}
