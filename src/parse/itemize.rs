//! Stage 2 of the [`crate::parse`] pipeline: group a [`Token`] stream into
//! [`Item`]s (one per keyword line, with its arguments and any attached
//! PEM-style objects).
//!
//! The state machine below is the literal one from §4.2:
//!
//! ```text
//! START --PRINTABLE--> KEYWORD-LINE
//! KEYWORD-LINE --WS--> KEYWORD-LINE-WS --PRINTABLE--> KEYWORD-LINE
//! KEYWORD-LINE --NL--> KEYWORD-LINE-END
//! KEYWORD-LINE-WS --NL--> KEYWORD-LINE-END  (forgivable: trailing whitespace)
//! KEYWORD-LINE-END --BEGIN--> OBJECT-DATA
//! OBJECT-DATA --PRINTABLE--> OBJECT-DATA-EOL --NL--> OBJECT-DATA
//! OBJECT-DATA --END--> KEYWORD-LINE-END   (object closed)
//! KEYWORD-LINE-END --PRINTABLE--> emit(item), KEYWORD-LINE
//! KEYWORD-LINE-END --EOF--> emit(item), DONE
//! ```
//!
//! This directly follows `bushel.documents.directory.DirectoryDocument.items`,
//! which drives the same states off the same token stream.

use base64ct::{Base64, Encoding};

use super::tokenize::{Token, TokenKind, Tokenizer};
use super::{Error, Forgivable, Forgiveness, Pos, Result};

/// A decoded PEM-style object attached to an [`Item`]: the keyword from its
/// `-----BEGIN <keyword>-----` fence, and the base64-decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    /// The object's keyword, e.g. `"ED25519 CERT"`.
    pub keyword: String,
    /// The decoded payload bytes.
    pub data: Vec<u8>,
}

/// One keyword line and everything that hangs off it: its arguments and any
/// objects immediately following.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// The first whitespace-delimited word on the line.
    pub keyword: String,
    /// The remaining whitespace-delimited words on the line.
    pub arguments: Vec<String>,
    /// Any PEM-style objects that followed this keyword line before the
    /// next one began.
    pub objects: Vec<Object>,
    /// The position of the item's keyword.
    pub pos: Pos,
}

impl Item {
    /// Return the `n`th argument, if present.
    pub fn arg(&self, n: usize) -> Option<&str> {
        self.arguments.get(n).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    KeywordLine,
    KeywordLineWs,
    KeywordLineEnd,
    ObjectData,
    ObjectDataEol,
    Done,
}

/// Split `text` into a sequence of [`Item`]s.
///
/// `forgiveness` controls which otherwise-fatal protocol violations are
/// tolerated (§7); pass [`Forgiveness::strict`] to reject everything not
/// explicitly allowed.
pub fn items(text: &str, forgiveness: Forgiveness) -> Result<Vec<Item>> {
    let mut tokenizer = Tokenizer::new(text);
    let mut out = Vec::new();

    let mut state = State::Start;
    let mut keyword: Option<String> = None;
    let mut keyword_pos = Pos::new(1, 0);
    let mut arguments: Vec<String> = Vec::new();
    let mut objects: Vec<Object> = Vec::new();
    let mut object_keyword: Option<String> = None;
    let mut object_lines: Vec<String> = Vec::new();

    let emit = |out: &mut Vec<Item>,
                keyword: &mut Option<String>,
                keyword_pos: Pos,
                arguments: &mut Vec<String>,
                objects: &mut Vec<Object>| {
        if let Some(kw) = keyword.take() {
            out.push(Item {
                keyword: kw,
                arguments: std::mem::take(arguments),
                objects: std::mem::take(objects),
                pos: keyword_pos,
            });
        }
    };

    loop {
        let tok: Token<'_> = tokenizer.next_token()?;
        match (state, tok.kind) {
            (State::Start, TokenKind::Printable) => {
                keyword = Some(tok.value.to_string());
                keyword_pos = tok.pos;
                state = State::KeywordLine;
            }
            (State::Start, TokenKind::Eof) => {
                state = State::Done;
            }
            (State::Start, TokenKind::Nl) => {
                // Blank leading lines are tolerated; stay in START.
            }

            (State::KeywordLine, TokenKind::Ws) => state = State::KeywordLineWs,
            (State::KeywordLine, TokenKind::Nl) => state = State::KeywordLineEnd,
            (State::KeywordLine, TokenKind::Eof) => {
                return Err(Error::TruncatedDocument { pos: tok.pos });
            }
            (State::KeywordLine, other) => {
                return Err(unexpected(other, "WS or NL", tok.pos));
            }

            (State::KeywordLineWs, TokenKind::Printable) => {
                arguments.push(tok.value.to_string());
                state = State::KeywordLine;
            }
            (State::KeywordLineWs, TokenKind::Nl) => {
                if !forgiveness.allows(Forgivable::TrailingWhitespace) {
                    return Err(Error::Forgivable {
                        violation: Forgivable::TrailingWhitespace,
                        pos: tok.pos,
                    });
                }
                state = State::KeywordLineEnd;
            }
            (State::KeywordLineWs, TokenKind::Eof) => {
                return Err(Error::TruncatedDocument { pos: tok.pos });
            }
            (State::KeywordLineWs, other) => {
                return Err(unexpected(other, "PRINTABLE or NL", tok.pos));
            }

            (State::KeywordLineEnd, TokenKind::Begin) => {
                object_keyword = Some(tok.value.to_string());
                object_lines.clear();
                state = State::ObjectData;
            }
            (State::KeywordLineEnd, TokenKind::Printable) => {
                emit(&mut out, &mut keyword, keyword_pos, &mut arguments, &mut objects);
                keyword = Some(tok.value.to_string());
                keyword_pos = tok.pos;
                state = State::KeywordLine;
            }
            (State::KeywordLineEnd, TokenKind::Eof) => {
                emit(&mut out, &mut keyword, keyword_pos, &mut arguments, &mut objects);
                state = State::Done;
            }
            (State::KeywordLineEnd, other) => {
                return Err(unexpected(other, "BEGIN, PRINTABLE, or EOF", tok.pos));
            }

            (State::ObjectData, TokenKind::Printable) => {
                object_lines.push(tok.value.to_string());
                state = State::ObjectDataEol;
            }
            (State::ObjectData, TokenKind::End) => {
                let kw = object_keyword.take().unwrap_or_default();
                if tok.value != kw {
                    return Err(unexpected(TokenKind::End, "matching END keyword", tok.pos));
                }
                let joined = object_lines.join("");
                let data = Base64::decode_vec(&joined)
                    .map_err(|_| Error::BadObjectBase64 { pos: tok.pos })?;
                objects.push(Object { keyword: kw, data });
                state = State::KeywordLineEnd;
            }
            (State::ObjectData, TokenKind::Nl) => {
                // Empty line inside an object body: zero-length PRINTABLE,
                // simply stay put.
            }
            (State::ObjectData, TokenKind::Eof) => {
                return Err(Error::TruncatedDocument { pos: tok.pos });
            }
            (State::ObjectData, other) => {
                return Err(unexpected(other, "PRINTABLE, NL, or END", tok.pos));
            }

            (State::ObjectDataEol, TokenKind::Nl) => state = State::ObjectData,
            (State::ObjectDataEol, TokenKind::Eof) => {
                return Err(Error::TruncatedDocument { pos: tok.pos });
            }
            (State::ObjectDataEol, other) => {
                return Err(unexpected(other, "NL", tok.pos));
            }

            (State::Done, TokenKind::Eof) => break,
            (State::Done, other) => {
                return Err(unexpected(other, "EOF", tok.pos));
            }
        }
        if state == State::Done {
            // Drain a final confirming EOF token, if the loop above didn't.
            let tok = tokenizer.next_token()?;
            if tok.kind != TokenKind::Eof {
                return Err(unexpected(tok.kind, "EOF", tok.pos));
            }
            break;
        }
    }

    Ok(out)
}

fn unexpected(found: TokenKind, expected: &'static str, pos: Pos) -> Error {
    Error::UnexpectedToken {
        found: token_kind_name(found),
        expected,
        pos,
    }
}

fn token_kind_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Begin => "BEGIN",
        TokenKind::End => "END",
        TokenKind::Nl => "NL",
        TokenKind::Printable => "PRINTABLE",
        TokenKind::Ws => "WS",
        TokenKind::Eof => "EOF",
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_keyword_line_no_object() {
        let items = items("foo 1 2 3\n", Forgiveness::strict()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].keyword, "foo");
        assert_eq!(items[0].arguments, vec!["1", "2", "3"]);
        assert!(items[0].objects.is_empty());
    }

    #[test]
    fn scenario_with_object() {
        let doc = "super-keyword 3\nonion-magic\n-----BEGIN ONION MAGIC-----\nAQ==\n-----END ONION MAGIC-----\n";
        let items = items(doc, Forgiveness::strict()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].keyword, "super-keyword");
        assert_eq!(items[0].arguments, vec!["3"]);
        assert!(items[0].objects.is_empty());
        assert_eq!(items[1].keyword, "onion-magic");
        assert_eq!(items[1].objects.len(), 1);
        assert_eq!(items[1].objects[0].keyword, "ONION MAGIC");
        assert_eq!(items[1].objects[0].data, vec![0x01]);
    }

    #[test]
    fn multiple_items() {
        let doc = "a 1\nb 2\nc 3\n";
        let items = items(doc, Forgiveness::strict()).unwrap();
        let kws: Vec<_> = items.iter().map(|i| i.keyword.as_str()).collect();
        assert_eq!(kws, vec!["a", "b", "c"]);
    }

    #[test]
    fn trailing_whitespace_rejected_when_strict() {
        let err = items("foo 1 \n", Forgiveness::strict()).unwrap_err();
        assert!(matches!(err, Error::Forgivable { .. }));
    }

    #[test]
    fn trailing_whitespace_allowed_when_lenient() {
        let items = items("foo 1 \n", Forgiveness::lenient()).unwrap();
        assert_eq!(items[0].arguments, vec!["1"]);
    }

    #[test]
    fn mismatched_end_keyword_is_error() {
        let doc = "k\n-----BEGIN A-----\nAQ==\n-----END B-----\n";
        let err = items(doc, Forgiveness::strict()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedToken { .. }));
    }

    #[test]
    fn bad_base64_object_is_error() {
        let doc = "k\n-----BEGIN A-----\n!!!not base64!!!\n-----END A-----\n";
        let err = items(doc, Forgiveness::strict()).unwrap_err();
        assert!(matches!(err, Error::BadObjectBase64 { .. }));
    }

    #[test]
    fn empty_document_yields_no_items() {
        let items = items("", Forgiveness::strict()).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn keyword_with_no_trailing_newline_is_truncated() {
        // A bare PRINTABLE with no following NL never reaches KEYWORD-LINE-END;
        // EOF arrives mid KEYWORD-LINE, which is reported distinctly from a
        // generic unexpected token.
        let err = items("foo", Forgiveness::strict()).unwrap_err();
        assert!(matches!(err, Error::TruncatedDocument { .. }));
    }

    #[test]
    fn object_with_no_closing_fence_is_truncated() {
        // EOF arrives mid OBJECT-DATA, before the closing `-----END ...-----`.
        let doc = "k\n-----BEGIN A-----\nAQ==\n";
        let err = items(doc, Forgiveness::strict()).unwrap_err();
        assert!(matches!(err, Error::TruncatedDocument { .. }));
    }
}
