//! The in-memory intermediate representation built by the parser and
//! consumed by the placement pass and the emitter.
//!
//! The original program stores this as a byte arena of tagged,
//! variable-length records (a 3-bit kind tag and a 5-bit length packed
//! into one descriptor byte, per [`crate`]'s design notes). This
//! reimplementation uses a `Vec<Record>` of an explicit sum type
//! instead: every later pass still walks it strictly in order and only
//! ever mutates an [`ExprRecord`]'s `length` or a symbol's offset, so
//! the shape of the algorithm carries over unchanged, only the
//! low-level representation does not.

use crate::symtab::SymbolId;

/// Maximum payload length of a single [`Record::Bytes`] run before a new
/// record is started. Carried over from the on-disk record format's 5-bit
/// length field even though nothing in this representation forces it;
/// keeping the cap bounds per-record growth and keeps behavior between
/// the two tools directly comparable.
pub const MAX_BYTES_RUN: usize = 30;

/// How a resolved 16-bit address is reduced to the single byte that is
/// actually stored, for operands written with a leading `<` or `>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Postprocess {
    None,
    Low,
    High,
}

/// What an [`ExprRecord`] writes once its value is known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    /// A plain data byte (`.byte`); no opcode prefix is emitted.
    RawByte,
    /// A plain 16-bit data word (`.word`); no opcode prefix is emitted.
    RawWord,
    /// A 6502 instruction opcode followed by its operand bytes.
    Instruction(u8),
}

/// An instruction or data word whose operand may reference a symbol, and
/// therefore may need relocation and may need more than one placement
/// pass to settle on a final length.
#[derive(Clone, Debug)]
pub struct ExprRecord {
    pub operand: Operand,
    pub symbol: Option<SymbolId>,
    pub offset: i32,
    pub postprocess: Postprocess,
    pub line: u32,
    /// `true` if `symbol` is known (from the encoder) to name a relative
    /// branch opcode; placement treats these specially.
    pub relative_branch: bool,
    /// `true` if, should `symbol` resolve to a zero-page address, the
    /// opcode can shrink to a zero-page addressing form.
    pub zero_page_shrinkable: Option<u8>,
    /// `true` if this operand was parsed in immediate addressing mode.
    /// A high-byte relocation mark sits one byte later for an
    /// immediate operand than for a multi-byte absolute one.
    pub immediate: bool,
    /// Length in bytes for a non-branch operand once its addressing
    /// mode is fixed (1 for implied/accumulator, 2 for zero-page or
    /// immediate, 3 for absolute). Unused for relative branches, whose
    /// length is decided fresh on every placement pass.
    pub base_length: u8,
    /// Resolved length in bytes; filled in by the placement pass. Starts
    /// at 0, meaning "not yet placed".
    pub length: u8,
}

/// One record in the program's intermediate representation.
#[derive(Clone, Debug)]
pub enum Record {
    /// Literal bytes, coalesced up to [`MAX_BYTES_RUN`] per record.
    Bytes(Vec<u8>),
    /// `count` zero bytes.
    Fill(u16),
    /// An instruction or data word whose operand may reference a symbol.
    Expr(ExprRecord),
    /// Binds `symbol` to the program counter at this point.
    LabelDef(SymbolId),
}

/// The program's full intermediate representation: a flat, append-only
/// list of records produced by the parser in source order.
#[derive(Default, Debug)]
pub struct Ir {
    records: Vec<Record>,
}

impl Ir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// Append one byte, coalescing into the previous record if it is a
    /// `Bytes` run with room remaining.
    pub fn push_byte(&mut self, byte: u8) {
        if let Some(Record::Bytes(buf)) = self.records.last_mut() {
            if buf.len() < MAX_BYTES_RUN {
                buf.push(byte);
                return;
            }
        }
        self.records.push(Record::Bytes(vec![byte]));
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push_byte(b);
        }
    }

    pub fn push_fill(&mut self, count: u16) {
        self.records.push(Record::Fill(count));
    }

    pub fn push_expr(&mut self, expr: ExprRecord) {
        self.records.push(Record::Expr(expr));
    }

    pub fn push_label(&mut self, symbol: SymbolId) {
        self.records.push(Record::LabelDef(symbol));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
