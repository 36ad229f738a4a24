//! Recursive-descent parser for GNS build files.
//!
//! A file is a sequence of statements; there are exactly three
//! statement forms:
//!
//! - assignment: `lvalue = expr`, `lvalue += expr`, `lvalue -= expr`
//! - call: `name(args) { optional block }` — targets, templates,
//!   `foreach`, `import` and friends are all spelled this way
//! - condition: `if (expr) { ... } else if ... else { ... }`
//!
//! Statement boundaries come from the grammar itself (no semicolons).
//! The parser stops at the first error and reports it with the
//! offending range.

mod expr;
mod interp;
mod stream;

pub use stream::TokenStream;

use crate::ast::{
    Accessor, AssignOp, Block, Call, Condition, ElseBranch, Expr, LValue, Statement, StatementKind,
};
use crate::error::{Error, ErrorKind, Result};
use crate::lexer::{Spanned, Token};
use crate::span::Span;

/// Parse a whole build file into its top-level block.
pub fn parse_file(tokens: &[Spanned], file_id: u16) -> Result<Block> {
    let mut stream = TokenStream::new(tokens, file_id);
    let start = stream.current_pos();
    let mut statements = Vec::new();
    while !stream.at_end() {
        statements.push(parse_statement(&mut stream)?);
    }
    let span = if statements.is_empty() {
        Span::zero(file_id)
    } else {
        stream.span_from(start)
    };
    Ok(Block { statements, span })
}

/// Parse a standalone expression (used for `--args` values, `${...}`
/// bodies and input conversion).
pub fn parse_expression(tokens: &[Spanned], file_id: u16) -> Result<Expr> {
    let mut stream = TokenStream::new(tokens, file_id);
    let expr = expr::parse_expr(&mut stream)?;
    if !stream.at_end() {
        return Err(Error::new(
            ErrorKind::Syntax,
            stream.current_span(),
            "trailing input after expression",
        ));
    }
    Ok(expr)
}

fn parse_statement(stream: &mut TokenStream) -> Result<Statement> {
    let doc = stream.take_doc();
    let start = stream.current_pos();
    let kind = match stream.peek() {
        Some(Token::If) => StatementKind::Condition(parse_condition(stream)?),
        Some(Token::Ident(_)) => parse_assign_or_call(stream)?,
        Some(found) => {
            return Err(Error::new(
                ErrorKind::Syntax,
                stream.current_span(),
                format!("expected statement, found \"{}\"", found),
            ));
        }
        None => {
            return Err(Error::new(
                ErrorKind::Syntax,
                stream.current_span(),
                "expected statement, found end of file",
            ));
        }
    };
    let mut statement = Statement::new(kind, stream.span_from(start));
    statement.doc = doc;
    Ok(statement)
}

fn parse_assign_or_call(stream: &mut TokenStream) -> Result<StatementKind> {
    match stream.peek_nth(1) {
        Some(Token::LParen) => Ok(StatementKind::Call(parse_call(stream, true)?)),
        Some(Token::Eq | Token::PlusEq | Token::MinusEq | Token::Dot | Token::LBracket) => {
            parse_assignment(stream)
        }
        _ => {
            // Lone identifier: point past it for a precise message.
            let span = stream.current_span();
            Err(Error::new(
                ErrorKind::Syntax,
                span,
                "expected assignment or function call",
            ))
        }
    }
}

fn parse_assignment(stream: &mut TokenStream) -> Result<StatementKind> {
    let lvalue = parse_lvalue(stream)?;
    let op_span = stream.current_span();
    let op = match stream.advance().map(|s| s.token) {
        Some(Token::Eq) => AssignOp::Assign,
        Some(Token::PlusEq) => AssignOp::Add,
        Some(Token::MinusEq) => AssignOp::Subtract,
        Some(found) => {
            return Err(Error::new(
                ErrorKind::Syntax,
                op_span,
                format!("expected assignment operator, found \"{}\"", found),
            ));
        }
        None => {
            return Err(Error::new(
                ErrorKind::Syntax,
                op_span,
                "expected assignment operator, found end of file",
            ));
        }
    };
    let value = expr::parse_expr(stream)?;
    Ok(StatementKind::Assign { lvalue, op, value })
}

fn parse_lvalue(stream: &mut TokenStream) -> Result<LValue> {
    let base_span = stream.current_span();
    let base = match stream.advance().map(|s| s.token) {
        Some(Token::Ident(name)) => name,
        _ => {
            return Err(Error::new(
                ErrorKind::Syntax,
                base_span,
                "expected identifier on left of assignment",
            ));
        }
    };
    let access = match stream.peek() {
        Some(Token::Dot) => {
            stream.advance();
            let member_span = stream.current_span();
            match stream.advance().map(|s| s.token) {
                Some(Token::Ident(member)) => Some(Accessor::Member(member)),
                _ => {
                    return Err(Error::new(
                        ErrorKind::Syntax,
                        member_span,
                        "expected member name after \".\"",
                    ));
                }
            }
        }
        Some(Token::LBracket) => {
            stream.advance();
            let index = expr::parse_expr(stream)?;
            stream.expect(Token::RBracket)?;
            Some(Accessor::Index(Box::new(index)))
        }
        _ => None,
    };
    Ok(LValue {
        base,
        base_span,
        access,
    })
}

fn parse_call(stream: &mut TokenStream, allow_block: bool) -> Result<Call> {
    let start = stream.current_pos();
    let name_span = stream.current_span();
    let name = match stream.advance().map(|s| s.token) {
        Some(Token::Ident(name)) => name,
        _ => {
            return Err(Error::new(
                ErrorKind::Syntax,
                name_span,
                "expected function name",
            ));
        }
    };
    let args = expr::parse_call_args(stream)?;
    let block = if allow_block && matches!(stream.peek(), Some(Token::LBrace)) {
        Some(parse_block(stream)?)
    } else {
        None
    };
    Ok(Call {
        name,
        name_span,
        args,
        block,
        span: stream.span_from(start),
    })
}

fn parse_condition(stream: &mut TokenStream) -> Result<Condition> {
    let start = stream.current_pos();
    stream.expect(Token::If)?;
    stream.expect(Token::LParen)?;
    let condition = expr::parse_expr(stream)?;
    stream.expect(Token::RParen)?;
    let then_block = parse_block(stream)?;

    let else_branch = if matches!(stream.peek(), Some(Token::Else)) {
        stream.advance();
        if matches!(stream.peek(), Some(Token::If)) {
            Some(ElseBranch::If(Box::new(parse_condition(stream)?)))
        } else {
            Some(ElseBranch::Block(parse_block(stream)?))
        }
    } else {
        None
    };

    Ok(Condition {
        condition,
        then_block,
        else_branch,
        span: stream.span_from(start),
    })
}

pub(crate) fn parse_block(stream: &mut TokenStream) -> Result<Block> {
    let start = stream.current_pos();
    stream.expect(Token::LBrace)?;
    let mut statements = Vec::new();
    while !matches!(stream.peek(), Some(Token::RBrace)) {
        if stream.at_end() {
            return Err(Error::new(
                ErrorKind::Syntax,
                stream.current_span(),
                "unterminated block, expected \"}\"",
            ));
        }
        statements.push(parse_statement(stream)?);
    }
    stream.expect(Token::RBrace)?;
    Ok(Block {
        statements,
        span: stream.span_from(start),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, ExprKind, StringPiece};
    use crate::lexer;

    fn file(source: &str) -> Block {
        let tokens = lexer::lex(source, 0).expect("lex failed");
        parse_file(&tokens, 0).expect("parse failed")
    }

    fn file_err(source: &str) -> Error {
        let tokens = lexer::lex(source, 0).expect("lex failed");
        parse_file(&tokens, 0).expect_err("expected parse error")
    }

    fn expression(source: &str) -> Expr {
        let tokens = lexer::lex(source, 0).expect("lex failed");
        parse_expression(&tokens, 0).expect("parse failed")
    }

    #[test]
    fn test_simple_assignments() {
        let block = file("a = 1\nb = \"hi\"\nc += [ 2 ]\nd -= x");
        assert_eq!(block.statements.len(), 4);
        let StatementKind::Assign { lvalue, op, .. } = &block.statements[2].kind else {
            panic!("expected assignment");
        };
        assert_eq!(lvalue.base, "c");
        assert_eq!(*op, AssignOp::Add);
    }

    #[test]
    fn test_accessor_assignment() {
        let block = file("s.member = 1\nl[0] = 2");
        let StatementKind::Assign { lvalue, .. } = &block.statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(lvalue.access, Some(Accessor::Member(ref m)) if m == "member"));
        let StatementKind::Assign { lvalue, .. } = &block.statements[1].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(lvalue.access, Some(Accessor::Index(_))));
    }

    #[test]
    fn test_call_with_block() {
        let block = file("executable(\"bin\") {\n  sources = [ \"main.cc\" ]\n}");
        let StatementKind::Call(call) = &block.statements[0].kind else {
            panic!("expected call");
        };
        assert_eq!(call.name, "executable");
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.block.as_ref().unwrap().statements.len(), 1);
    }

    #[test]
    fn test_condition_chain() {
        let block = file("if (a) {\n} else if (b) {\n} else {\n  c = 1\n}");
        let StatementKind::Condition(cond) = &block.statements[0].kind else {
            panic!("expected condition");
        };
        let Some(ElseBranch::If(elif)) = &cond.else_branch else {
            panic!("expected else-if");
        };
        assert!(matches!(elif.else_branch, Some(ElseBranch::Block(_))));
    }

    #[test]
    fn test_precedence() {
        let expr = expression("a || b && c == d + 1");
        let ExprKind::Binary { op, right, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::Or);
        let ExprKind::Binary { op, .. } = &right.kind else {
            panic!("expected nested binary");
        };
        assert_eq!(*op, BinaryOp::And);
    }

    #[test]
    fn test_unary_not() {
        let expr = expression("!a && b");
        let ExprKind::Binary { op, left, .. } = &expr.kind else {
            panic!("expected binary");
        };
        assert_eq!(*op, BinaryOp::And);
        assert!(matches!(left.kind, ExprKind::Unary { .. }));
    }

    #[test]
    fn test_list_trailing_comma() {
        let expr = expression("[ 1, 2, 3, ]");
        let ExprKind::List(elements) = &expr.kind else {
            panic!("expected list");
        };
        assert_eq!(elements.len(), 3);
    }

    #[test]
    fn test_scope_literal() {
        let block = file("a = {\n  b = 1\n}");
        let StatementKind::Assign { value, .. } = &block.statements[0].kind else {
            panic!("expected assignment");
        };
        assert!(matches!(value.kind, ExprKind::Block(_)));
    }

    #[test]
    fn test_string_interpolation_pieces() {
        let expr = expression(r#""lib$name${idx + 1}.so""#);
        let ExprKind::String(pieces) = &expr.kind else {
            panic!("expected string");
        };
        assert_eq!(pieces.len(), 4);
        assert!(matches!(&pieces[0], StringPiece::Literal(s) if s == "lib"));
        assert!(matches!(&pieces[1], StringPiece::Embedded(e)
            if matches!(&e.kind, ExprKind::Identifier(n) if n == "name")));
        assert!(matches!(&pieces[2], StringPiece::Embedded(e)
            if matches!(&e.kind, ExprKind::Binary { .. })));
        assert!(matches!(&pieces[3], StringPiece::Literal(s) if s == ".so"));
    }

    #[test]
    fn test_string_escapes() {
        let expr = expression(r#""a\"b\$c\\d""#);
        let ExprKind::String(pieces) = &expr.kind else {
            panic!("expected string");
        };
        assert_eq!(pieces.len(), 1);
        assert!(matches!(&pieces[0], StringPiece::Literal(s) if s == "a\"b$c\\d"));
    }

    #[test]
    fn test_doc_comment_attachment() {
        let block = file("# Enables debug checks.\n# Slower when on.\nuse_checks = true\n\n# Detached.\n\nother = 1");
        assert_eq!(
            block.statements[0].doc.as_deref(),
            Some("Enables debug checks.\nSlower when on.")
        );
        // A blank line between comment and statement detaches it.
        assert_eq!(block.statements[1].doc, None);
    }

    #[test]
    fn test_parse_determinism() {
        let source = "a = 1\nif (a == 1) {\n  group(\"g\") {\n    deps = [ \":x$a\" ]\n  }\n}";
        assert_eq!(file(source), file(source));
    }

    #[test]
    fn test_error_bare_identifier() {
        let err = file_err("a\n");
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn test_error_unterminated_block() {
        let err = file_err("group(\"g\") {\n  a = 1\n");
        assert!(err.message.contains("unterminated block"));
    }

    #[test]
    fn test_error_unterminated_interpolation() {
        let err = file_err("a = \"x${y\"");
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn test_expression_rejects_trailing() {
        let tokens = lexer::lex("1 2", 0).unwrap();
        assert!(parse_expression(&tokens, 0).is_err());
    }
}
