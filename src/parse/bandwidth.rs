//! The bandwidth-file tokenizer/itemizer (§4.2's companion format).
//!
//! Bandwidth files have their own, simpler two-line-kinds grammar: a header
//! block of `key=value` pairs (the first line being a bare Unix timestamp,
//! optionally followed by a `=====...` terminator if this is a "v1.x"-style
//! file), then one `key=value key=value ...` line per measured relay. This
//! mirrors `bushel.bandwidth.file.BandwidthFileLiner`/`tokenize`, which
//! drives an equivalent state machine over its own token set rather than
//! reusing the directory-document tokenizer (the two grammars diverge enough
//! — no PEM objects here, but a distinguished terminator line — that sharing
//! one lexer would force artificial cases into both).

use std::fmt;

/// The kind of a single lexical token in a bandwidth file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// The leading Unix timestamp on the first line.
    Timestamp,
    /// A `=====...` (or shorter, legacy `====`) terminator line, without its
    /// trailing newline.
    Terminator,
    /// A `key=value` pair.
    KeyValue,
    /// A single LF.
    Nl,
    /// A single space separating `key=value` pairs on a relay line.
    Sp,
}

/// A single bandwidth-file token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// What kind of token this is.
    pub kind: TokenKind,
    /// The token's raw text.
    pub value: &'a str,
    /// 1-indexed line number.
    pub line: usize,
}

/// Errors produced while tokenizing or itemizing a bandwidth file.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A line matched none of the known token patterns.
    #[error("unrecognized bandwidth-file text {text:?} on line {line}")]
    Mismatch {
        /// The offending text.
        text: String,
        /// The 1-indexed line it occurred on.
        line: usize,
    },
    /// The file had no lines at all, or the first line was not a timestamp.
    #[error("bandwidth file does not begin with a timestamp")]
    MissingTimestamp,
    /// A `key=value` pair had no `=`.
    #[error("malformed key=value pair {text:?} on line {line}")]
    MalformedKeyValue {
        /// The offending text.
        text: String,
        /// The 1-indexed line it occurred on.
        line: usize,
    },
}

/// Result alias for this module.
pub type Result<T> = std::result::Result<T, Error>;

fn is_terminator_line(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b == b'=')
}

fn tokenize_line(line: &str, line_no: usize, is_first: bool) -> Result<Vec<Token<'_>>> {
    if is_first {
        if line.bytes().all(|b| b.is_ascii_digit()) && !line.is_empty() {
            return Ok(vec![Token {
                kind: TokenKind::Timestamp,
                value: line,
                line: line_no,
            }]);
        }
        return Err(Error::MissingTimestamp);
    }
    if is_terminator_line(line) {
        return Ok(vec![Token {
            kind: TokenKind::Terminator,
            value: line,
            line: line_no,
        }]);
    }
    let mut toks = Vec::new();
    for (i, field) in line.split(' ').enumerate() {
        if i > 0 {
            toks.push(Token {
                kind: TokenKind::Sp,
                value: " ",
                line: line_no,
            });
        }
        if field.is_empty() {
            continue;
        }
        if !field.contains('=') {
            return Err(Error::MalformedKeyValue {
                text: field.to_string(),
                line: line_no,
            });
        }
        toks.push(Token {
            kind: TokenKind::KeyValue,
            value: field,
            line: line_no,
        });
    }
    Ok(toks)
}

/// Tokenize an entire bandwidth file, one logical line per call to
/// [`tokenize_line`], interleaved with [`TokenKind::Nl`] between lines.
pub fn tokenize(text: &str) -> Result<Vec<Token<'_>>> {
    let mut out = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;
        out.extend(tokenize_line(line, line_no, idx == 0)?);
        if idx + 1 < lines.len() {
            out.push(Token {
                kind: TokenKind::Nl,
                value: "\n",
                line: line_no,
            });
        }
    }
    Ok(out)
}

/// One `key=value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

fn split_kv(field: &str, line: usize) -> Result<KeyValue> {
    let (k, v) = field.split_once('=').ok_or_else(|| Error::MalformedKeyValue {
        text: field.to_string(),
        line,
    })?;
    Ok(KeyValue {
        key: k.to_string(),
        value: v.to_string(),
    })
}

/// One measured relay's `key=value` fields, keyed by the relay's node
/// fingerprint (the `node_id=` field, conventionally first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayLine {
    /// All `key=value` pairs on this line, in file order.
    pub fields: Vec<KeyValue>,
}

impl RelayLine {
    /// Look up a field by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| kv.value.as_str())
    }
}

/// A parsed bandwidth file: the header timestamp and `key=value` fields, and
/// one [`RelayLine`] per measured relay.
///
/// Grounded on `bushel.bandwidth.file.BandwidthFile`'s `START -> TIMESTAMP ->
/// HEADER-LINE <-> HEADER-LINE-KV -> RELAY-LINE <-> RELAY-LINE-KV/SP -> DONE`
/// state machine: a v1.x file's optional terminator line marks the boundary
/// between header and relay lines; a legacy file with no terminator treats
/// every line after the timestamp as a relay line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthFile {
    /// The Unix timestamp on the first line.
    pub timestamp: i64,
    /// Header `key=value` pairs (only present in v1.x+ files, before the
    /// `=====` terminator).
    pub header: Vec<KeyValue>,
    /// One entry per measured relay.
    pub relays: Vec<RelayLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    HeaderLine,
    RelayLine,
}

/// Parse a complete bandwidth file.
///
/// A v1.x+ file carries a `key=value` header section terminated by a
/// `=====`/`====` line before its relay lines; a legacy (pre-1.0.0) file has
/// no header section at all, and every line after the timestamp is already a
/// relay line. Since a header `key=value` line and a single-field relay line
/// are lexically identical, the only reliable signal is whether a terminator
/// appears anywhere in the file at all — so that is checked up front, rather
/// than trying to guess line-by-line.
pub fn parse(text: &str) -> Result<BandwidthFile> {
    let tokens = tokenize(text)?;
    let has_terminator = tokens.iter().any(|t| t.kind == TokenKind::Terminator);
    let mut iter = tokens.into_iter().peekable();

    let mut timestamp = None;
    let mut header = Vec::new();
    let mut relays = Vec::new();
    let mut current_relay_fields: Vec<KeyValue> = Vec::new();
    let mut state = State::Start;

    while let Some(tok) = iter.next() {
        match (state, tok.kind) {
            (State::Start, TokenKind::Timestamp) => {
                timestamp = Some(tok.value.parse::<i64>().map_err(|_| Error::MissingTimestamp)?);
                state = if has_terminator {
                    State::HeaderLine
                } else {
                    State::RelayLine
                };
            }
            (_, TokenKind::Nl) => {
                if state == State::RelayLine && !current_relay_fields.is_empty() {
                    relays.push(RelayLine {
                        fields: std::mem::take(&mut current_relay_fields),
                    });
                }
            }
            (State::HeaderLine, TokenKind::Terminator) => {
                state = State::RelayLine;
            }
            (State::HeaderLine, TokenKind::KeyValue) => {
                header.push(split_kv(tok.value, tok.line)?);
            }
            (State::HeaderLine, TokenKind::Sp) => {}
            (State::RelayLine, TokenKind::KeyValue) => {
                current_relay_fields.push(split_kv(tok.value, tok.line)?);
            }
            (State::RelayLine, TokenKind::Sp) => {}
            (_, kind) => {
                return Err(Error::Mismatch {
                    text: format!("{kind:?}"),
                    line: tok.line,
                });
            }
        }
    }
    if !current_relay_fields.is_empty() {
        relays.push(RelayLine {
            fields: current_relay_fields,
        });
    }

    Ok(BandwidthFile {
        timestamp: timestamp.ok_or(Error::MissingTimestamp)?,
        header,
        relays,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn v1_file_with_terminator() {
        let text = "1523911725\nversion=1.4.0\nfile_created=2018-04-16T20:25:58\n=====\nnode_id=$AAAA bw=1 nick=foo\nnode_id=$BBBB bw=2 nick=bar\n";
        let bf = parse(text).unwrap();
        assert_eq!(bf.timestamp, 1523911725);
        assert_eq!(bf.header.len(), 2);
        assert_eq!(bf.header[0].key, "version");
        assert_eq!(bf.relays.len(), 2);
        assert_eq!(bf.relays[0].get("node_id"), Some("$AAAA"));
        assert_eq!(bf.relays[1].get("nick"), Some("bar"));
    }

    #[test]
    fn legacy_file_with_no_header() {
        let text = "1523911725\nnode_id=$AAAA bw=1\n";
        let bf = parse(text).unwrap();
        assert_eq!(bf.timestamp, 1523911725);
        assert!(bf.header.is_empty());
        assert_eq!(bf.relays.len(), 1);
    }

    #[test]
    fn missing_timestamp_is_error() {
        let err = parse("not-a-timestamp\n").unwrap_err();
        assert!(matches!(err, Error::MissingTimestamp));
    }

    #[test]
    fn malformed_keyvalue_is_error() {
        let text = "1523911725\n=====\nnode_id\n";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, Error::MalformedKeyValue { .. }));
    }
}
