//! Stage 1 of the [`crate::parse`] pipeline: break a byte buffer into a
//! lazy sequence of [`Token`]s.
//!
//! Token kinds and line/column tracking follow §4.2 exactly: `BEGIN` and
//! `END` match PEM-style object delimiters, `NL` is a single line feed,
//! `PRINTABLE` is a maximal run of non-whitespace, `WS` is spaces/tabs, and
//! anything else is a fatal `MISMATCH`. This is the same shape as the
//! original `bushel.documents.directory.DirectoryDocument.tokenize`
//! regex-driven lexer, rewritten here as a hand-rolled scanner (matching
//! `tor_netdoc::parse::tokenize::NetDocReaderBase`'s style of walking a byte
//! offset through a `&str` rather than compiling a regex per call).

use super::{Error, Pos, Result};

/// The kind of a single lexical token produced by [`Tokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `-----BEGIN <Keyword>-----`
    Begin,
    /// `-----END <Keyword>-----`
    End,
    /// A single LF.
    Nl,
    /// A maximal run of non-whitespace.
    Printable,
    /// A maximal run of spaces and/or tabs.
    Ws,
    /// The terminal end-of-file token.
    Eof,
}

/// A single lexical token: its kind, the slice of text it covers (for
/// `Begin`/`End` this is the keyword, with the `-----BEGIN `/`-----END `
/// and trailing `-----` stripped), and its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// The token's text (the keyword, for `Begin`/`End`; empty for `Nl`,
    /// `Ws`, and `Eof`).
    pub value: &'a str,
    /// Where the token started.
    pub pos: Pos,
}

const BEGIN_PREFIX: &str = "-----BEGIN ";
const END_PREFIX: &str = "-----END ";
const TAG_SUFFIX: &str = "-----";

/// A streaming tokenizer over a UTF-8 document.
///
/// Produces tokens one at a time via [`Tokenizer::next_token`]; once `Eof`
/// has been returned, further calls keep returning `Eof`.
pub struct Tokenizer<'a> {
    s: &'a str,
    off: usize,
    line: usize,
    line_start: usize,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer over `s`.
    pub fn new(s: &'a str) -> Self {
        Tokenizer {
            s,
            off: 0,
            line: 1,
            line_start: 0,
            done: false,
        }
    }

    fn pos_at(&self, off: usize) -> Pos {
        Pos::new(self.line, off - self.line_start)
    }

    fn rest(&self) -> &'a str {
        &self.s[self.off..]
    }

    /// Try to match an object delimiter (`-----BEGIN x-----` or
    /// `-----END x-----`) at the current offset. On success, advances past
    /// the delimiter (but not past the newline that must follow) and
    /// returns the keyword.
    fn try_match_delimiter(&mut self, prefix: &str) -> Option<&'a str> {
        let rest = self.rest();
        if !rest.starts_with(prefix) {
            return None;
        }
        let after_prefix = &rest[prefix.len()..];
        let tag_end = after_prefix.find(TAG_SUFFIX)?;
        let keyword = &after_prefix[..tag_end];
        if keyword.is_empty() || keyword.contains('\n') {
            return None;
        }
        let consumed = prefix.len() + tag_end + TAG_SUFFIX.len();
        self.off += consumed;
        Some(keyword)
    }

    /// Return the next token, or `Eof` forever once the document has ended.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        if self.done {
            return Ok(Token {
                kind: TokenKind::Eof,
                value: "",
                pos: self.pos_at(self.off),
            });
        }
        let start = self.off;
        let pos = self.pos_at(start);
        if self.rest().is_empty() {
            self.done = true;
            return Ok(Token {
                kind: TokenKind::Eof,
                value: "",
                pos,
            });
        }

        let first = self.rest().as_bytes()[0];

        if first == b'\n' {
            self.off += 1;
            self.line += 1;
            self.line_start = self.off;
            return Ok(Token {
                kind: TokenKind::Nl,
                value: "\n",
                pos,
            });
        }

        if first == b' ' || first == b'\t' {
            let len = self
                .rest()
                .bytes()
                .take_while(|&b| b == b' ' || b == b'\t')
                .count();
            self.off += len;
            return Ok(Token {
                kind: TokenKind::Ws,
                value: &self.s[start..self.off],
                pos,
            });
        }

        if self.rest().starts_with(BEGIN_PREFIX) {
            if let Some(keyword) = self.try_match_delimiter(BEGIN_PREFIX) {
                return Ok(Token {
                    kind: TokenKind::Begin,
                    value: keyword,
                    pos,
                });
            }
        }
        if self.rest().starts_with(END_PREFIX) {
            if let Some(keyword) = self.try_match_delimiter(END_PREFIX) {
                return Ok(Token {
                    kind: TokenKind::End,
                    value: keyword,
                    pos,
                });
            }
        }

        // PRINTABLE: maximal run of non-whitespace. A leading `-----BEGIN `/
        // `-----END ` that failed to parse as a delimiter above (e.g. no
        // closing `-----`, or an empty keyword) still consists of
        // non-whitespace bytes, so it is swept up here rather than treated
        // as MISMATCH: only truly unprintable control bytes are fatal.
        let len = self
            .rest()
            .bytes()
            .take_while(|&b| b != b'\n' && b != b' ' && b != b'\t')
            .count();
        if len == 0 {
            // A stray whitespace/control byte that matched none of the
            // above: this is the MISMATCH case (§4.2).
            let bad = self.rest().chars().next().unwrap();
            return Err(Error::Mismatch {
                text: bad.to_string(),
                pos,
            });
        }
        self.off += len;
        Ok(Token {
            kind: TokenKind::Printable,
            value: &self.s[start..self.off],
            pos,
        })
    }

    /// Collect every remaining token, including the terminal `Eof`.
    pub fn collect_all(mut self) -> Result<Vec<Token<'a>>> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            out.push(tok);
            if is_eof {
                return Ok(out);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_6_token_sequence() {
        let doc = "super-keyword 3\nonion-magic\n-----BEGIN ONION MAGIC-----\nAQ../C\n-----END ONION MAGIC-----\n";
        let toks = Tokenizer::new(doc).collect_all().unwrap();
        let kinds: Vec<_> = toks.iter().map(|t| t.kind).collect();
        use TokenKind::*;
        assert_eq!(
            kinds,
            vec![
                Printable, Ws, Printable, Nl, Printable, Nl, Begin, Nl, Printable, Nl, End, Eof,
            ]
        );
        assert_eq!(toks[0].value, "super-keyword");
        assert_eq!(toks[2].value, "3");
        assert_eq!(toks[4].value, "onion-magic");
        assert_eq!(toks[6].value, "ONION MAGIC");
        assert_eq!(toks[8].value, "AQ../C");
        assert_eq!(toks[10].value, "ONION MAGIC");
    }

    #[test]
    fn line_and_column_tracking() {
        let doc = "a b\ncd\n";
        let toks = Tokenizer::new(doc).collect_all().unwrap();
        // a(0,0) ws(0,1) b(0,2) nl(0,3) cd(1,0) nl(1,2) eof(2,0)
        assert_eq!(toks[0].pos, Pos::new(1, 0)); // "a"
        assert_eq!(toks[1].pos, Pos::new(1, 1)); // " "
        assert_eq!(toks[2].pos, Pos::new(1, 2)); // "b"
        assert_eq!(toks[3].pos, Pos::new(1, 3)); // "\n"
        assert_eq!(toks[4].pos, Pos::new(2, 0)); // "cd"
        assert_eq!(toks[5].pos, Pos::new(2, 2)); // "\n"
    }

    #[test]
    fn eof_is_sticky() {
        let mut t = Tokenizer::new("x\n");
        let _ = t.next_token().unwrap(); // "x"
        let _ = t.next_token().unwrap(); // "\n"
        let e1 = t.next_token().unwrap();
        let e2 = t.next_token().unwrap();
        assert_eq!(e1.kind, TokenKind::Eof);
        assert_eq!(e2.kind, TokenKind::Eof);
    }

    #[test]
    fn begin_end_without_matching_fence_is_printable() {
        // No closing "-----": not a well-formed delimiter, so it's just text.
        let toks = Tokenizer::new("-----BEGIN NOPE\n").collect_all().unwrap();
        assert_eq!(toks[0].kind, TokenKind::Printable);
    }
}
