//! Structured diagnostics.
//!
//! Errors are values, not panics: every stage of the generator returns
//! `Result<T, Error>` and the first error aborts the enclosing unit of
//! work. An [`Error`] carries the offending span, a category, optional
//! secondary labels ("requested here", "first defined here") and
//! free-form notes. [`DiagnosticFormatter`] renders the final report
//! with the source line and a caret range, which is what the CLI
//! prints to stderr before exiting non-zero.

use crate::span::{SourceMap, Span};
use std::fmt;

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub span: Span,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
}

/// Category of diagnostic, by the stage that detected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Tokenizer or parser rejection.
    Syntax,
    /// Mismatched operand or argument types, wrong arity.
    Type,
    /// Undefined identifier, duplicate definition.
    Name,
    /// Declared but never consumed binding.
    Usage,
    /// Missing label, dependency cycle, visibility or assertion failure.
    Dependency,
    /// Filesystem or process failure.
    Io,
    /// Invalid target description (missing field, conflicting outputs).
    Generator,
}

/// Secondary span attached to a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn new(kind: ErrorKind, span: Span, message: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Type => "type error",
            ErrorKind::Name => "name error",
            ErrorKind::Usage => "unused binding",
            ErrorKind::Dependency => "dependency error",
            ErrorKind::Io => "I/O error",
            ErrorKind::Generator => "generator error",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for Error {}

/// Renders diagnostics with source context.
///
/// Output shape:
///
/// ```text
/// error: name error: undefined identifier "foo"
///   --> //BUILD.gns:3:5
///    |
///  3 | a = foo
///    |     ^^^
/// ```
pub struct DiagnosticFormatter<'a> {
    sources: &'a SourceMap,
}

impl<'a> DiagnosticFormatter<'a> {
    pub fn new(sources: &'a SourceMap) -> Self {
        Self { sources }
    }

    pub fn format(&self, error: &Error) -> String {
        let mut out = String::new();
        out.push_str(&format!("error: {}: {}\n", error.kind.name(), error.message));
        self.format_span(&mut out, &error.span, None);

        for label in &error.labels {
            self.format_span(&mut out, &label.span, Some(&label.message));
        }
        for note in &error.notes {
            out.push_str(&format!("   = note: {}\n", note));
        }
        out
    }

    pub fn format_all(&self, errors: &[Error]) -> String {
        errors
            .iter()
            .map(|e| self.format(e))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_span(&self, out: &mut String, span: &Span, label: Option<&str>) {
        if span.file_id as usize >= self.sources.file_count() {
            return;
        }
        let (line, col) = self.sources.line_col(span);
        let name = self.sources.file_name(span);
        if let Some(text) = label {
            out.push_str(&format!("   = note: {}\n", text));
            out.push_str(&format!("     at {}:{}:{}\n", name, line, col));
            return;
        }
        out.push_str(&format!("  --> {}:{}:{}\n", name, line, col));

        if let Some(source_line) = self.sources.file(span).line_text(line) {
            out.push_str("   |\n");
            out.push_str(&format!("{:3} | {}\n", line, source_line));
            let start = col as usize;
            let room = source_line.len().saturating_sub(start.saturating_sub(1)).max(1);
            let width = (span.len() as usize).clamp(1, room);
            let underline = " ".repeat(start.saturating_sub(1)) + &"^".repeat(width);
            out.push_str(&format!("   | {}\n", underline));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> SourceMap {
        let mut map = SourceMap::new();
        map.add_file("//BUILD.gns", "a = foo\nb = bar\n".to_string());
        map
    }

    #[test]
    fn test_error_construction() {
        let err = Error::new(ErrorKind::Name, Span::new(0, 4, 7, 1), "undefined identifier \"foo\"")
            .with_label(Span::new(0, 12, 15, 2), "also used here")
            .with_note("declare it before use");

        assert_eq!(err.kind, ErrorKind::Name);
        assert_eq!(err.labels.len(), 1);
        assert_eq!(err.notes.len(), 1);
        assert!(err.to_string().contains("name error"));
    }

    #[test]
    fn test_formatter_snippet_and_caret() {
        let map = sources();
        let err = Error::new(ErrorKind::Name, Span::new(0, 4, 7, 1), "undefined identifier \"foo\"");
        let text = DiagnosticFormatter::new(&map).format(&err);

        assert!(text.contains("error: name error: undefined identifier \"foo\""));
        assert!(text.contains("--> //BUILD.gns:1:5"));
        assert!(text.contains("a = foo"));
        assert!(text.contains("^^^"));
    }

    #[test]
    fn test_formatter_labels_and_notes() {
        let map = sources();
        let err = Error::new(ErrorKind::Dependency, Span::new(0, 0, 1, 1), "missing dependency")
            .with_label(Span::new(0, 8, 9, 2), "requested here")
            .with_note("check the deps list");
        let text = DiagnosticFormatter::new(&map).format(&err);

        assert!(text.contains("requested here"));
        assert!(text.contains("at //BUILD.gns:2:1"));
        assert!(text.contains("note: check the deps list"));
    }

    #[test]
    fn test_formatter_tolerates_unknown_file() {
        let map = SourceMap::new();
        let err = Error::new(ErrorKind::Io, Span::zero(3), "unreadable");
        let text = DiagnosticFormatter::new(&map).format(&err);
        assert!(text.contains("unreadable"));
    }
}
