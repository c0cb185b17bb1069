//! Error types returned by this crate.
//!
//! Follows the manual `Error`/`ErrorKind` split used elsewhere in this
//! workspace rather than a derive-macro error enum: the inner
//! representation is private so new variants can be added without
//! breaking callers that only match on [`ErrorKind`].

use std::fmt;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error produced while assembling, placing, emitting, or linking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    inner: ErrorInner,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ErrorInner {
    Lex { line: u32, message: String },
    Syntax { line: u32, message: String },
    Semantic { line: u32, message: String },
    Placement { message: String },
    Unresolved(Vec<UnresolvedRef>),
    Io { message: String },
}

/// A single forward reference that was never defined, as reported in a
/// batched [`ErrorKind::Unresolved`] error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedRef {
    /// The undefined symbol's name.
    pub name: String,
    /// Source line of the reference, if known.
    pub line: Option<u32>,
}

/// A coarse classification of an [`Error`], for callers that want to
/// branch on error category without matching on message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A lexical error: bad escape, unterminated string, invalid digit.
    Lex,
    /// A syntactic error: unexpected token, bad addressing mode, and so on.
    Syntax,
    /// A semantic error: redefinition, constant-discipline violation, etc.
    Semantic,
    /// An error raised by the placement pass (out-of-range branch, or an
    /// internal non-convergence backstop).
    Placement,
    /// One or more symbols were referenced but never defined.
    Unresolved,
    /// A filesystem or I/O failure.
    Io,
}

impl Error {
    /// The coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match &self.inner {
            ErrorInner::Lex { .. } => ErrorKind::Lex,
            ErrorInner::Syntax { .. } => ErrorKind::Syntax,
            ErrorInner::Semantic { .. } => ErrorKind::Semantic,
            ErrorInner::Placement { .. } => ErrorKind::Placement,
            ErrorInner::Unresolved(_) => ErrorKind::Unresolved,
            ErrorInner::Io { .. } => ErrorKind::Io,
        }
    }

    /// The source line this error is attributed to, if any.
    pub fn line(&self) -> Option<u32> {
        match &self.inner {
            ErrorInner::Lex { line, .. }
            | ErrorInner::Syntax { line, .. }
            | ErrorInner::Semantic { line, .. } => Some(*line),
            _ => None,
        }
    }

    /// The unresolved references carried by an [`ErrorKind::Unresolved`]
    /// error, or an empty slice for any other kind.
    pub fn unresolved(&self) -> &[UnresolvedRef] {
        match &self.inner {
            ErrorInner::Unresolved(refs) => refs,
            _ => &[],
        }
    }

    pub(crate) fn lex(line: u32, message: impl Into<String>) -> Self {
        Error { inner: ErrorInner::Lex { line, message: message.into() } }
    }

    pub(crate) fn syntax(line: u32, message: impl Into<String>) -> Self {
        Error { inner: ErrorInner::Syntax { line, message: message.into() } }
    }

    pub(crate) fn semantic(line: u32, message: impl Into<String>) -> Self {
        Error { inner: ErrorInner::Semantic { line, message: message.into() } }
    }

    pub(crate) fn placement(message: impl Into<String>) -> Self {
        Error { inner: ErrorInner::Placement { message: message.into() } }
    }

    pub(crate) fn unresolved(refs: Vec<UnresolvedRef>) -> Self {
        Error { inner: ErrorInner::Unresolved(refs) }
    }

    pub(crate) fn io(message: impl Into<String>) -> Self {
        Error { inner: ErrorInner::Io { message: message.into() } }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ErrorInner::Lex { line, message } => write!(f, "line {}: {}", line, message),
            ErrorInner::Syntax { line, message } => write!(f, "line {}: {}", line, message),
            ErrorInner::Semantic { line, message } => write!(f, "line {}: {}", line, message),
            ErrorInner::Placement { message } => write!(f, "{}", message),
            ErrorInner::Unresolved(refs) => {
                writeln!(f, "{} unresolved reference(s):", refs.len())?;
                for r in refs {
                    match r.line {
                        Some(line) => writeln!(f, "  line {}: '{}' is never defined", line, r.name)?,
                        None => writeln!(f, "  '{}' is never defined", r.name)?,
                    }
                }
                Ok(())
            }
            ErrorInner::Io { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io(e.to_string())
    }
}
