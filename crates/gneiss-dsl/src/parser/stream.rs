//! Token stream with lookahead for the hand-written parser.
//!
//! Comments are filtered out up front; a comment run that sits
//! directly above a token (adjacent lines, no gap) is remembered so
//! the parser can attach it to the statement starting there.

use crate::error::{Error, ErrorKind, Result};
use crate::lexer::{Spanned, Token};
use crate::span::Span;
use std::collections::HashMap;

pub struct TokenStream {
    tokens: Vec<Spanned>,
    /// Doc comment block keyed by filtered token index.
    docs: HashMap<usize, String>,
    pos: usize,
    file_id: u16,
}

impl TokenStream {
    pub fn new(raw: &[Spanned], file_id: u16) -> Self {
        let mut tokens = Vec::with_capacity(raw.len());
        let mut docs = HashMap::new();

        // Pending comment run: joined text plus the line of its last row.
        let mut run: Option<(String, u32)> = None;
        for spanned in raw {
            match &spanned.token {
                Token::Comment(text) => {
                    run = match run.take() {
                        Some((mut acc, last)) if last + 1 == spanned.span.line => {
                            acc.push('\n');
                            acc.push_str(text);
                            Some((acc, spanned.span.line))
                        }
                        _ => Some((text.clone(), spanned.span.line)),
                    };
                }
                _ => {
                    if let Some((text, last)) = run.take() {
                        if last + 1 >= spanned.span.line {
                            docs.insert(tokens.len(), text);
                        }
                    }
                    tokens.push(spanned.clone());
                }
            }
        }

        Self {
            tokens,
            docs,
            pos: 0,
            file_id,
        }
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|s| &s.token)
    }

    pub fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    /// Does the current token have the same discriminant as `expected`?
    pub fn check(&self, expected: &Token) -> bool {
        matches!(self.peek(), Some(t) if std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    /// Consume a specific token or fail with an "expected X" error.
    pub fn expect(&mut self, expected: Token) -> Result<Span> {
        if self.check(&expected) {
            Ok(self.advance().map(|s| s.span).unwrap_or_else(|| self.eof_span()))
        } else {
            let message = match self.peek() {
                Some(found) => format!("expected \"{}\", found \"{}\"", expected, found),
                None => format!("expected \"{}\", found end of file", expected),
            };
            Err(Error::new(ErrorKind::Syntax, self.current_span(), message))
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn current_pos(&self) -> usize {
        self.pos
    }

    /// Span of the current token, or a zero-length span at EOF.
    pub fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(s) => s.span,
            None => self.eof_span(),
        }
    }

    /// Span covering the tokens from `start` up to the last consumed one.
    pub fn span_from(&self, start: usize) -> Span {
        let first = match self.tokens.get(start) {
            Some(s) => s.span,
            None => return self.eof_span(),
        };
        match self.tokens.get(self.pos.saturating_sub(1)) {
            Some(last) if self.pos > start => first.merge(&last.span),
            _ => first,
        }
    }

    /// Doc comment block attached to the current token, if any.
    pub fn take_doc(&mut self) -> Option<String> {
        self.docs.remove(&self.pos)
    }

    fn eof_span(&self) -> Span {
        match self.tokens.last() {
            Some(s) => Span::new(self.file_id, s.span.end, s.span.end, s.span.line),
            None => Span::zero(self.file_id),
        }
    }
}
