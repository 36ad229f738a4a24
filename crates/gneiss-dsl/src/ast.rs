//! Parse tree for the GNS language.
//!
//! The tree mirrors the statement/expression split of the grammar:
//! a file is a [`Block`] of statements; statements are assignments,
//! calls (optionally carrying a block, which is how targets, templates
//! and `foreach` are written) and `if`/`else` chains. Everything else
//! is an expression. Every node carries the span of the source that
//! produced it.

use crate::span::Span;

/// A brace-delimited (or top-level) sequence of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
    /// Comment block immediately preceding this statement, if any.
    /// Consumed by `declare_args` for build-argument documentation.
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Assign {
        lvalue: LValue,
        op: AssignOp,
        value: Expr,
    },
    Call(Call),
    Condition(Condition),
}

/// Assignment destination: a plain identifier or a single-level
/// accessor (`scope.member`, `list[index]`).
#[derive(Debug, Clone, PartialEq)]
pub struct LValue {
    pub base: String,
    pub base_span: Span,
    pub access: Option<Accessor>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accessor {
    Member(String),
    Index(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Subtract,
}

/// A function call or template instantiation. Statement-position calls
/// may carry a block; expression-position calls never do.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub name_span: Span,
    pub args: Vec<Expr>,
    pub block: Option<Block>,
    pub span: Span,
}

/// An `if` with optional `else if` chain and final `else`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub condition: Expr,
    pub then_block: Block,
    pub else_branch: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseBranch {
    If(Box<Condition>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Bool(bool),
    /// String literal split into literal and interpolated pieces.
    String(Vec<StringPiece>),
    List(Vec<Expr>),
    Identifier(String),
    /// `base.member` or `base[index]`; the base is always an identifier.
    Access {
        base: String,
        base_span: Span,
        access: Accessor,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Scope literal: `{ ... }` on the right of an assignment.
    Block(Block),
    Call(Call),
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum StringPiece {
    /// Literal text, escapes already resolved.
    Literal(String),
    /// `$ident` or `${expr}` embedded expression.
    Embedded(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The identifier name if this expression is a bare identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

impl Statement {
    pub fn new(kind: StatementKind, span: Span) -> Self {
        Self {
            kind,
            span,
            doc: None,
        }
    }
}
