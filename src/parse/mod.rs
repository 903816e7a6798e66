//! The directory-document tokenizer/itemizer pipeline (§4.2).
//!
//! This is a two-stage pipeline, mirroring `tor_netdoc::parse::tokenize`
//! (which this module is grounded on) but restructured to match the
//! literal token/state-machine shapes the specification calls for: a
//! streaming [`tokenize::Token`] lexer feeds the [`itemize::items`] state
//! machine that produces [`itemize::Item`]s.

pub mod bandwidth;
pub mod itemize;
pub mod tokenize;

pub use itemize::{Item, Object};
pub use tokenize::{Token, TokenKind};

use std::fmt;

/// A 1-indexed line and 0-indexed column within a document, used to locate
/// parse errors (§4.2, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    /// Line number, starting at 1.
    pub line: usize,
    /// Column (byte offset within the line), starting at 0.
    pub column: usize,
}

impl Pos {
    /// Construct a new position.
    pub fn new(line: usize, column: usize) -> Self {
        Pos { line, column }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A recorded forgivable protocol violation (§7's `ForgivableProtocol`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forgivable {
    /// Whitespace appeared before the end of a keyword line.
    TrailingWhitespace,
}

impl fmt::Display for Forgivable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Forgivable::TrailingWhitespace => write!(f, "trailing whitespace on keyword line"),
        }
    }
}

/// Which [`Forgivable`] violations should be tolerated instead of promoted
/// to a fatal [`Error::Forgivable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Forgiveness {
    /// Whether trailing whitespace on a keyword line is tolerated.
    pub allow_trailing_whitespace: bool,
}

impl Forgiveness {
    /// A forgiveness configuration that tolerates nothing: every
    /// [`Forgivable`] becomes fatal.
    pub fn strict() -> Self {
        Forgiveness::default()
    }

    /// A forgiveness configuration that tolerates everything this module
    /// knows how to forgive.
    pub fn lenient() -> Self {
        Forgiveness {
            allow_trailing_whitespace: true,
        }
    }

    fn allows(&self, f: Forgivable) -> bool {
        match f {
            Forgivable::TrailingWhitespace => self.allow_trailing_whitespace,
        }
    }
}

/// Errors produced while tokenizing or itemizing a directory document.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A byte sequence matched none of the known token patterns.
    #[error("unexpected text {text:?} at {pos}")]
    Mismatch {
        /// The offending text.
        text: String,
        /// Where it occurred.
        pos: Pos,
    },
    /// The document ended in the middle of a keyword line or an object.
    #[error("unexpected end of document at {pos}")]
    TruncatedDocument {
        /// Where the document ended unexpectedly.
        pos: Pos,
    },
    /// A token appeared where the itemizer's state machine did not expect
    /// it (§4.2's "unspecified transitions are fatal").
    #[error("unexpected {found} at {pos}, expected {expected}")]
    UnexpectedToken {
        /// What was actually found.
        found: &'static str,
        /// What the state machine expected instead.
        expected: &'static str,
        /// Where it occurred.
        pos: Pos,
    },
    /// A base64-encoded object body contained non-base64 data.
    #[error("invalid base64 object data at {pos}")]
    BadObjectBase64 {
        /// Where the bad data occurred.
        pos: Pos,
    },
    /// A [`Forgivable`] violation occurred and was not in the forgiveness
    /// allow-list.
    #[error("{violation} at {pos} (not in the forgiveness allow-list)")]
    Forgivable {
        /// Which violation occurred.
        violation: Forgivable,
        /// Where it occurred.
        pos: Pos,
    },
}

/// Result alias for this module.
pub type Result<T> = std::result::Result<T, Error>;
