//! GNS build-description language frontend.
//!
//! This crate owns everything between raw `BUILD.gns` text and an AST:
//!
//! - `span` — compact source locations and the [`SourceMap`] that
//!   resolves them back to files, lines and snippets
//! - `error` — structured diagnostics ([`Error`]) with caret rendering
//! - `lexer` — tokenization (logos)
//! - `ast` — the parse tree
//! - `parser` — recursive descent statements + Pratt expressions,
//!   including string-interpolation splitting
//!
//! Evaluation, scopes and the target graph live in `gneiss-core`.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use error::{Error, ErrorKind, Result};
pub use span::{SourceMap, Span};
