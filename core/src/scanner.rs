/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark Sovereign Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Structural Scanner: balanced-delimiter scanning over WAT text.
//!
//! Everything else in the crate locates declarations through these helpers.
//! Offsets are byte offsets; the delimiters are ASCII so slicing at them is
//! always on a char boundary.

use thiserror::Error;

// ─── Error Types ─────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("expected '(' at byte {0}")]
    NotAnOpener(usize),
    #[error("unbalanced delimiters: '(' at byte {open} is never closed")]
    Unbalanced { open: usize },
    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),
    #[error("unexpected input at byte {0}")]
    UnexpectedInput(usize),
}

impl ScanError {
    /// Byte offset the error refers to.
    pub fn offset(&self) -> usize {
        match self {
            ScanError::NotAnOpener(at)
            | ScanError::UnterminatedString(at)
            | ScanError::UnexpectedInput(at) => *at,
            ScanError::Unbalanced { open } => *open,
        }
    }
}

// ─── Delimiter Matching ──────────────────────────────────────────────────────

/// Returns the index immediately past the `)` that closes the `(` at `open`.
///
/// Nesting is tracked with a plain depth counter. String literals and
/// comments are stepped over so a delimiter inside them never counts.
pub fn matching_close(text: &str, open: usize) -> Result<usize, ScanError> {
    let bytes = text.as_bytes();
    if bytes.get(open) != Some(&b'(') || bytes.get(open + 1) == Some(&b';') {
        return Err(ScanError::NotAnOpener(open));
    }

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'(' if bytes.get(i + 1) == Some(&b';') => {
                i = skip_block_comment(bytes, i).ok_or(ScanError::Unbalanced { open })?;
                continue;
            }
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i + 1);
                }
            }
            b'"' => {
                i = skip_string(bytes, i)?;
                continue;
            }
            b';' if bytes.get(i + 1) == Some(&b';') => {
                i = skip_line(bytes, i);
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    Err(ScanError::Unbalanced { open })
}

/// Skips whitespace, `;;` line comments and `(; ;)` block comments.
/// An unterminated block comment consumes the rest of the text.
pub fn skip_trivia(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\n' | b'\r' => pos += 1,
            b';' if bytes.get(pos + 1) == Some(&b';') => pos = skip_line(bytes, pos),
            b'(' if bytes.get(pos + 1) == Some(&b';') => {
                pos = skip_block_comment(bytes, pos).unwrap_or(bytes.len());
            }
            _ => break,
        }
    }
    pos
}

/// Skips whitespace only; comments are left in place.
pub fn skip_ws(text: &str, pos: usize) -> usize {
    let rest = text.get(pos..).unwrap_or_default();
    pos + (rest.len() - rest.trim_start_matches(|c: char| matches!(c, ' ' | '\t' | '\n' | '\r')).len())
}

/// Returns the index just past the closing quote of the string at `start`.
fn skip_string(bytes: &[u8], start: usize) -> Result<usize, ScanError> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(ScanError::UnterminatedString(start))
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|n| start + n + 1)
        .unwrap_or(bytes.len())
}

/// Block comments nest in WAT.
fn skip_block_comment(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        if bytes[i] == b'(' && bytes[i + 1] == b';' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b';' && bytes[i + 1] == b')' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                return Some(i);
            }
        } else {
            i += 1;
        }
    }
    None
}

// ─── S-Expression Items ──────────────────────────────────────────────────────

/// One element of a parenthesized list, borrowed from the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item<'a> {
    /// Keyword, identifier, number or instruction name.
    Atom(&'a str),
    /// String literal including its quotes.
    Str(&'a str),
    /// A nested list including its delimiters.
    List(&'a str),
}

impl<'a> Item<'a> {
    pub fn atom(&self) -> Option<&'a str> {
        match self {
            Item::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn list(&self) -> Option<&'a str> {
        match self {
            Item::List(l) => Some(l),
            _ => None,
        }
    }

    /// Decoded contents of a string literal.
    pub fn string(&self) -> Option<String> {
        match self {
            Item::Str(s) => Some(unquote(s)),
            _ => None,
        }
    }
}

/// Splits the list `text` (which must start with `(`) into its direct items.
pub fn list_items(text: &str) -> Result<Vec<Item<'_>>, ScanError> {
    let end = matching_close(text, 0)?;
    let bytes = text.as_bytes();
    let mut items = Vec::new();
    let mut pos = 1;

    loop {
        pos = skip_trivia(text, pos);
        if pos >= end - 1 {
            break;
        }
        match bytes[pos] {
            b'(' => {
                let close = matching_close(text, pos)?;
                items.push(Item::List(&text[pos..close]));
                pos = close;
            }
            b'"' => {
                let close = skip_string(bytes, pos)?;
                items.push(Item::Str(&text[pos..close]));
                pos = close;
            }
            b')' => return Err(ScanError::UnexpectedInput(pos)),
            _ => {
                let close = atom_end(text, pos)?;
                if close == pos {
                    return Err(ScanError::UnexpectedInput(pos));
                }
                items.push(Item::Atom(&text[pos..close]));
                pos = close;
            }
        }
    }
    Ok(items)
}

/// Keyword of a list such as `(import ...)`, if it starts with one.
pub fn keyword(text: &str) -> Option<&str> {
    if !text.starts_with('(') {
        return None;
    }
    let start = skip_trivia(text, 1);
    let end = atom_end(text, start).ok()?;
    if end == start {
        return None;
    }
    Some(&text[start..end])
}

/// End of the atom at `start`. Quoted identifiers (`$"a b"`) are one atom.
pub fn atom_end(text: &str, start: usize) -> Result<usize, ScanError> {
    let bytes = text.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'"' if i == start + 1 && bytes[start] == b'$' => i = skip_string(bytes, i)?,
            b' ' | b'\t' | b'\n' | b'\r' | b'(' | b')' | b'"' | b';' => break,
            _ => i += 1,
        }
    }
    Ok(i)
}

/// Decodes a WAT string literal (quotes included) into its text.
pub fn unquote(literal: &str) -> String {
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(literal);
    let raw = inner.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] != b'\\' || i + 1 >= raw.len() {
            out.push(raw[i]);
            i += 1;
            continue;
        }
        let esc = raw[i + 1];
        match esc {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'"' | b'\'' | b'\\' => out.push(esc),
            _ => {
                let hex = inner.get(i + 1..i + 3).and_then(|h| u8::from_str_radix(h, 16).ok());
                if let Some(byte) = hex {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(b'\\');
                out.push(esc);
            }
        }
        i += 2;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_close_nested() {
        let text = "(a (b (c)) d) tail";
        assert_eq!(matching_close(text, 0), Ok(13));
        assert_eq!(matching_close(text, 3), Ok(10));
        assert_eq!(&text[6..matching_close(text, 6).unwrap()], "(c)");
    }

    #[test]
    fn test_matching_close_unbalanced() {
        assert_eq!(
            matching_close("(a (b)", 0),
            Err(ScanError::Unbalanced { open: 0 })
        );
        assert_eq!(matching_close("x(a)", 0), Err(ScanError::NotAnOpener(0)));
    }

    #[test]
    fn test_matching_close_skips_comments_and_strings() {
        let text = "(func (;12;) (export \"a)b\") ;; )\n nop)";
        assert_eq!(matching_close(text, 0), Ok(text.len()));
    }

    #[test]
    fn test_skip_trivia() {
        let text = "  ;; note\n (; block (; nested ;) ;) (type)";
        let pos = skip_trivia(text, 0);
        assert_eq!(&text[pos..], "(type)");
    }

    #[test]
    fn test_list_items() {
        let text = "(import \"wasi:io/poll@0.2.0\" \"poll\" (func $p (;3;) (type 2)))";
        let items = list_items(text).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], Item::Atom("import"));
        assert_eq!(items[1].string().as_deref(), Some("wasi:io/poll@0.2.0"));
        assert_eq!(items[3], Item::List("(func $p (;3;) (type 2))"));
        assert_eq!(keyword(items[3].list().unwrap()), Some("func"));
    }

    #[test]
    fn test_quoted_identifier_is_one_atom() {
        let items = list_items("(func $\"#func12 undefined_stub\" (result i32))").unwrap();
        assert_eq!(items[1], Item::Atom("$\"#func12 undefined_stub\""));
    }

    #[test]
    fn test_unquote_escapes() {
        assert_eq!(unquote(r#""a\"b\\c""#), "a\"b\\c");
        assert_eq!(unquote(r#""\41\n""#), "A\n");
    }
}
