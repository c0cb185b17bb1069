//! A relocatable 6502 assembler and the relocation-stream codec shared
//! with `multilink`, the companion relocation packer.
//!
//! This crate covers the assembler's pipeline end to end: lexing,
//! expression evaluation, instruction encoding, symbol table
//! management, the branch-sizing fix-point placement pass, and
//! emission of the object file and `.SYM` listing. The nibble-packed
//! relocation codec ([`reloc`]) and the 7-byte object header
//! ([`format`]) are exposed separately because `multilink` links
//! against this crate for those two pieces only, not for anything
//! assembler-specific.
//!
//! # Example
//! ```
//! use relo6502::assemble;
//!
//! let out = assemble("lda #$42\n", None).unwrap();
//! assert_eq!(&out.object[relo6502::format::Header::SIZE..][..2], &[0xA9, 0x42]);
//! ```

#![warn(missing_debug_implementations)]

use std::path::{Path, PathBuf};

pub mod emit;
pub mod encoder;
pub mod error;
pub mod eval;
pub mod format;
pub mod ir;
pub mod parser;
pub mod place;
pub mod reloc;
pub mod symtab;
pub mod token;

mod stream;

pub use emit::Output;
pub use error::{Error, ErrorKind, Result};
pub use parser::Assembler;
pub use token::Lexer;

/// Assemble a complete source string and return its object file and
/// `.SYM` listing.
///
/// `path` is attributed to lexer diagnostics and used to resolve
/// `.include` directives relative to the top-level file's directory;
/// pass `None` when the source has no file of its own (e.g. in tests).
pub fn assemble(source: &str, path: Option<&Path>) -> Result<Output> {
    #[cfg(feature = "logging")]
    log::debug!("assembling {} bytes of source", source.len());

    let mut assembler = Assembler::new(Lexer::new(source, path.map(PathBuf::from)));
    assembler.parse()?;
    let (mut ir, mut symtab, zp_usage, default_branch_size) = assembler.into_parts();

    #[cfg(feature = "logging")]
    log::debug!("parsed {} IR records, {} symbols", ir.records().len(), symtab.iter().count());

    let text_usage = place::place(&mut ir, &mut symtab, default_branch_size)?;

    #[cfg(feature = "logging")]
    log::debug!("placement converged, text usage {} bytes", text_usage);

    let output = emit::emit(&ir, &symtab, zp_usage, text_usage);

    #[cfg(feature = "logging")]
    log::debug!(
        "emitted {} bytes of object, {} bytes of symbol listing",
        output.object.len(),
        output.listing.len()
    );

    Ok(output)
}

/// Assemble a source file from disk, resolving `.include` directives
/// relative to its containing directory.
pub fn assemble_file(path: impl AsRef<Path>) -> Result<Output> {
    let path = path.as_ref();
    let lexer = Lexer::from_file(path)?;
    let mut assembler = Assembler::new(lexer);
    assembler.parse()?;
    let (mut ir, mut symtab, zp_usage, default_branch_size) = assembler.into_parts();
    let text_usage = place::place(&mut ir, &mut symtab, default_branch_size)?;
    Ok(emit::emit(&ir, &symtab, zp_usage, text_usage))
}
