//! Tokenization of GNS source text.
//!
//! Tokens are produced by a logos-derived lexer. Whitespace is skipped
//! by attribute; `#` comments are real tokens so the parser can attach
//! the comment block immediately preceding a declaration as its
//! documentation (used for build-argument docs). The token stream
//! filters them back out for everything else.
//!
//! A `-` directly followed by a digit lexes as a negative integer
//! literal, so `a - 1` (spaced) is a subtraction while `a -1` is two
//! operands and a parse error. This matches the language's convention
//! of requiring whitespace around binary minus.

use crate::error::{Error, ErrorKind, Result};
use crate::span::Span;
use logos::Logos;
use std::fmt;

/// One GNS token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Assignment
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,

    // Comparison
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    // Logic
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    // Arithmetic
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,

    // Punctuation
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    /// Integer literal. The leading `-` belongs to the literal when it
    /// directly precedes the digits.
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok(), priority = 3)]
    Integer(i64),

    /// String literal, stored with quotes stripped but escapes and
    /// `$` interpolations intact; the parser splits those later.
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    /// Identifier.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    /// `#` line comment, content with the marker and one leading space
    /// stripped.
    #[regex(r"#[^\n]*", |lex| {
        let s = lex.slice().strip_prefix('#').unwrap_or(lex.slice());
        s.strip_prefix(' ').unwrap_or(s).to_string()
    })]
    Comment(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::Eq => write!(f, "="),
            Token::PlusEq => write!(f, "+="),
            Token::MinusEq => write!(f, "-="),
            Token::EqEq => write!(f, "=="),
            Token::BangEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::AndAnd => write!(f, "&&"),
            Token::OrOr => write!(f, "||"),
            Token::Bang => write!(f, "!"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Integer(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Comment(s) => write!(f, "# {}", s),
        }
    }
}

/// Token plus its source range.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub span: Span,
}

/// Tokenize a whole file.
pub fn lex(source: &str, file_id: u16) -> Result<Vec<Spanned>> {
    lex_offset(source, file_id, 0, 1)
}

/// Tokenize a slice that starts at `byte_offset` / `start_line` of the
/// registered file. Used for the bodies of `${...}` interpolations so
/// their spans still point into the surrounding file.
pub fn lex_offset(
    source: &str,
    file_id: u16,
    byte_offset: u32,
    start_line: u32,
) -> Result<Vec<Spanned>> {
    let mut out = Vec::new();
    let mut line = start_line;
    let mut scanned = 0usize;

    let mut lexer = Token::lexer(source);
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        // Count newlines between the previous token and this one.
        line += source[scanned..range.start]
            .bytes()
            .filter(|&b| b == b'\n')
            .count() as u32;
        scanned = range.start;

        let span = Span::new(
            file_id,
            byte_offset + range.start as u32,
            byte_offset + range.end as u32,
            line,
        );
        match result {
            Ok(token) => out.push(Spanned { token, span }),
            Err(()) => {
                return Err(Error::new(
                    ErrorKind::Syntax,
                    span,
                    format!("invalid token \"{}\"", &source[range.start..range.end]),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        lex(source, 0)
            .expect("lexing failed")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_keywords_and_idents() {
        assert_eq!(
            tokens("if else executable deps"),
            vec![
                Token::If,
                Token::Else,
                Token::Ident("executable".to_string()),
                Token::Ident("deps".to_string()),
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("= += -= == != < <= > >= && || !"),
            vec![
                Token::Eq,
                Token::PlusEq,
                Token::MinusEq,
                Token::EqEq,
                Token::BangEq,
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::AndAnd,
                Token::OrOr,
                Token::Bang,
            ]
        );
    }

    #[test]
    fn test_integers() {
        assert_eq!(
            tokens("0 42 -7"),
            vec![Token::Integer(0), Token::Integer(42), Token::Integer(-7)]
        );
    }

    #[test]
    fn test_spaced_minus_is_binary() {
        assert_eq!(
            tokens("a - 1"),
            vec![
                Token::Ident("a".to_string()),
                Token::Minus,
                Token::Integer(1),
            ]
        );
        // Unspaced: the minus glues to the literal.
        assert_eq!(
            tokens("a -1"),
            vec![Token::Ident("a".to_string()), Token::Integer(-1)]
        );
    }

    #[test]
    fn test_strings_keep_escapes() {
        assert_eq!(
            tokens(r#""hi" "a\"b" "x$y""#),
            vec![
                Token::Str("hi".to_string()),
                Token::Str(r#"a\"b"#.to_string()),
                Token::Str("x$y".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_are_tokens() {
        assert_eq!(
            tokens("# Top doc.\na = 1"),
            vec![
                Token::Comment("Top doc.".to_string()),
                Token::Ident("a".to_string()),
                Token::Eq,
                Token::Integer(1),
            ]
        );
    }

    #[test]
    fn test_line_tracking() {
        let spanned = lex("a = 1\nbb = 2", 0).unwrap();
        assert_eq!(spanned[0].span.line, 1);
        assert_eq!(spanned[3].span.line, 2);
        assert_eq!(spanned[3].span.start, 6);
        assert_eq!(spanned[3].span.end, 8);
    }

    #[test]
    fn test_invalid_token_reports_span() {
        let err = lex("a = %", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.span.start, 4);
    }

    #[test]
    fn test_integer_overflow_is_error() {
        assert!(lex("99999999999999999999", 0).is_err());
    }

    #[test]
    fn test_unterminated_string_is_error() {
        assert!(lex("a = \"abc\n", 0).is_err());
    }

    #[test]
    fn test_lex_offset_shifts_spans() {
        let spanned = lex_offset("x + 1", 0, 100, 7).unwrap();
        assert_eq!(spanned[0].span.start, 100);
        assert_eq!(spanned[0].span.line, 7);
        assert_eq!(spanned[2].span.start, 104);
    }
}
