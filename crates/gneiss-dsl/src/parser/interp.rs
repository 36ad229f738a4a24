//! String-interpolation splitting.
//!
//! A string literal is split at parse time into literal chunks and
//! embedded expressions: `"lib$name${idx + 1}.so"` becomes
//! `[Literal("lib"), Embedded(name), Embedded(idx + 1), Literal(".so")]`.
//! Escapes (`\"`, `\\`, `\$`) are resolved into the literal chunks;
//! any other backslash sequence is kept verbatim. Embedded `${...}`
//! bodies are re-lexed at their true file offset so errors inside them
//! point at the right column.

use crate::ast::{Expr, ExprKind, StringPiece};
use crate::error::{Error, ErrorKind, Result};
use crate::lexer;
use crate::span::Span;

/// Split the raw (quote-stripped) content of a string literal whose
/// token span is `span`.
pub fn split_string(raw: &str, span: Span) -> Result<Vec<StringPiece>> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    // Byte offset of the content within the file: past the open quote.
    let content_start = span.start + 1;

    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                match bytes[i + 1] {
                    b'"' | b'\\' | b'$' => literal.push(bytes[i + 1] as char),
                    other => {
                        literal.push('\\');
                        literal.push(other as char);
                    }
                }
                i += 2;
            }
            b'$' => {
                let after = i + 1;
                if after < bytes.len() && bytes[after] == b'{' {
                    let body_start = after + 1;
                    let close = find_close_brace(raw, body_start).ok_or_else(|| {
                        Error::new(
                            ErrorKind::Syntax,
                            sub_span(span, content_start, i, raw.len()),
                            "unterminated \"${\" in string",
                        )
                    })?;
                    flush(&mut pieces, &mut literal);
                    let body = &raw[body_start..close];
                    let body_span = sub_span(span, content_start, body_start, close);
                    pieces.push(StringPiece::Embedded(parse_embedded(body, body_span)?));
                    i = close + 1;
                } else {
                    let ident_end = ident_end(raw, after);
                    if ident_end == after {
                        return Err(Error::new(
                            ErrorKind::Syntax,
                            sub_span(span, content_start, i, after),
                            "\"$\" must be followed by an identifier or \"{\"",
                        ));
                    }
                    flush(&mut pieces, &mut literal);
                    let name = raw[after..ident_end].to_string();
                    let ident_span = sub_span(span, content_start, after, ident_end);
                    pieces.push(StringPiece::Embedded(Expr::new(
                        ExprKind::Identifier(name),
                        ident_span,
                    )));
                    i = ident_end;
                }
            }
            _ => {
                let ch_len = utf8_len(bytes[i]);
                literal.push_str(&raw[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    flush(&mut pieces, &mut literal);
    Ok(pieces)
}

fn flush(pieces: &mut Vec<StringPiece>, literal: &mut String) {
    if !literal.is_empty() {
        pieces.push(StringPiece::Literal(std::mem::take(literal)));
    }
}

fn parse_embedded(body: &str, body_span: Span) -> Result<Expr> {
    let tokens = lexer::lex_offset(body, body_span.file_id, body_span.start, body_span.line)?;
    if tokens.is_empty() {
        return Err(Error::new(
            ErrorKind::Syntax,
            body_span,
            "empty \"${}\" in string",
        ));
    }
    super::parse_expression(&tokens, body_span.file_id)
}

fn find_close_brace(raw: &str, from: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, b) in raw.bytes().enumerate().skip(from) {
        match b {
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(idx),
            b'}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn ident_end(raw: &str, from: usize) -> usize {
    let bytes = raw.as_bytes();
    let mut end = from;
    while end < bytes.len() {
        let b = bytes[end];
        let is_start_ok = b.is_ascii_alphabetic() || b == b'_';
        let is_cont_ok = is_start_ok || b.is_ascii_digit();
        if end == from && !is_start_ok {
            break;
        }
        if end > from && !is_cont_ok {
            break;
        }
        end += 1;
    }
    end
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b >= 0xF0 => 4,
        b if b >= 0xE0 => 3,
        _ => 2,
    }
}

/// Span for `raw[start..end]` given the file offset of `raw[0]`.
/// Strings cannot span lines, so the literal's line carries over.
fn sub_span(outer: Span, content_start: u32, start: usize, end: usize) -> Span {
    Span::new(
        outer.file_id,
        content_start + start as u32,
        content_start + end as u32,
        outer.line,
    )
}
