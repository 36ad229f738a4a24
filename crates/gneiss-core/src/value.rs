//! The dynamically-typed value tree.
//!
//! Values carry the span of the expression that produced them, which
//! is what makes "expected string, got list" errors point somewhere
//! useful. Assignment copies: cloning a value deep-copies any scope
//! it holds, so two bindings never observe each other's mutations.

use crate::scope::{Scope, ScopeRef};
use gneiss_dsl::{Error, ErrorKind, Span};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
pub enum ValueKind {
    None,
    Int(i64),
    Bool(bool),
    String(String),
    List(Vec<Value>),
    Scope(ScopeRef),
}

#[derive(Debug)]
pub struct Value {
    pub kind: ValueKind,
    /// Where this value was produced.
    pub origin: Span,
}

impl ValueKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ValueKind::None => "none",
            ValueKind::Int(_) => "integer",
            ValueKind::Bool(_) => "boolean",
            ValueKind::String(_) => "string",
            ValueKind::List(_) => "list",
            ValueKind::Scope(_) => "scope",
        }
    }
}

impl Value {
    pub fn none(origin: Span) -> Self {
        Self {
            kind: ValueKind::None,
            origin,
        }
    }

    pub fn int(n: i64, origin: Span) -> Self {
        Self {
            kind: ValueKind::Int(n),
            origin,
        }
    }

    pub fn bool(b: bool, origin: Span) -> Self {
        Self {
            kind: ValueKind::Bool(b),
            origin,
        }
    }

    pub fn string(s: impl Into<String>, origin: Span) -> Self {
        Self {
            kind: ValueKind::String(s.into()),
            origin,
        }
    }

    pub fn list(items: Vec<Value>, origin: Span) -> Self {
        Self {
            kind: ValueKind::List(items),
            origin,
        }
    }

    pub fn scope(scope: ScopeRef, origin: Span) -> Self {
        Self {
            kind: ValueKind::Scope(scope),
            origin,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, ValueKind::None)
    }

    pub fn as_int(&self) -> Result<i64, Error> {
        match &self.kind {
            ValueKind::Int(n) => Ok(*n),
            _ => Err(self.type_error("integer")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, Error> {
        match &self.kind {
            ValueKind::Bool(b) => Ok(*b),
            _ => Err(self.type_error("boolean")),
        }
    }

    pub fn as_string(&self) -> Result<&str, Error> {
        match &self.kind {
            ValueKind::String(s) => Ok(s),
            _ => Err(self.type_error("string")),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], Error> {
        match &self.kind {
            ValueKind::List(items) => Ok(items),
            _ => Err(self.type_error("list")),
        }
    }

    pub fn as_scope(&self) -> Result<&ScopeRef, Error> {
        match &self.kind {
            ValueKind::Scope(s) => Ok(s),
            _ => Err(self.type_error("scope")),
        }
    }

    /// A list of strings, the shape most target variables take.
    pub fn as_string_list(&self) -> Result<Vec<String>, Error> {
        let items = self.as_list()?;
        items
            .iter()
            .map(|v| v.as_string().map(str::to_string))
            .collect()
    }

    fn type_error(&self, expected: &str) -> Error {
        Error::new(
            ErrorKind::Type,
            self.origin,
            format!("expected {}, got {}", expected, self.type_name()),
        )
    }

    /// Coerce to a string for interpolation and `print`.
    ///
    /// Integers print decimal, booleans `true`/`false`, strings are
    /// unquoted. Lists and scopes are only representable in the
    /// quoted debug form used by `print`.
    pub fn to_display_string(&self, quote: bool) -> String {
        match &self.kind {
            ValueKind::None => "<none>".to_string(),
            ValueKind::Int(n) => n.to_string(),
            ValueKind::Bool(b) => b.to_string(),
            ValueKind::String(s) => {
                if quote {
                    format!("\"{}\"", s)
                } else {
                    s.clone()
                }
            }
            ValueKind::List(items) => {
                let inner: Vec<String> =
                    items.iter().map(|v| v.to_display_string(true)).collect();
                format!("[{}]", inner.join(", "))
            }
            ValueKind::Scope(scope) => {
                let scope = scope.borrow();
                let inner: Vec<String> = scope
                    .bindings()
                    .map(|(name, value)| format!("{} = {}", name, value.to_display_string(true)))
                    .collect();
                format!("{{ {} }}", inner.join(", "))
            }
        }
    }
}

/// Cloning is a value copy: lists clone elementwise and scopes are
/// deep-copied so the clone cannot observe later mutation.
impl Clone for Value {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            ValueKind::None => ValueKind::None,
            ValueKind::Int(n) => ValueKind::Int(*n),
            ValueKind::Bool(b) => ValueKind::Bool(*b),
            ValueKind::String(s) => ValueKind::String(s.clone()),
            ValueKind::List(items) => ValueKind::List(items.clone()),
            ValueKind::Scope(scope) => {
                let copy: Scope = scope.borrow().clone_detached();
                ValueKind::Scope(Rc::new(RefCell::new(copy)))
            }
        };
        Self {
            kind,
            origin: self.origin,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (ValueKind::None, ValueKind::None) => true,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => a == b,
            (ValueKind::Scope(a), ValueKind::Scope(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().same_bindings(&b.borrow())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gneiss_dsl::Span;

    fn span() -> Span {
        Span::zero(0)
    }

    #[test]
    fn test_type_accessors() {
        assert_eq!(Value::int(4, span()).as_int().unwrap(), 4);
        assert_eq!(Value::string("x", span()).as_string().unwrap(), "x");
        assert!(Value::int(4, span()).as_string().is_err());

        let err = Value::bool(true, span()).as_list().unwrap_err();
        assert!(err.message.contains("expected list, got boolean"));
    }

    #[test]
    fn test_string_list() {
        let list = Value::list(
            vec![Value::string("a", span()), Value::string("b", span())],
            span(),
        );
        assert_eq!(list.as_string_list().unwrap(), vec!["a", "b"]);

        let mixed = Value::list(vec![Value::int(1, span())], span());
        assert!(mixed.as_string_list().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::int(-3, span()).to_display_string(false), "-3");
        assert_eq!(Value::bool(true, span()).to_display_string(false), "true");
        assert_eq!(Value::string("hi", span()).to_display_string(false), "hi");
        assert_eq!(Value::string("hi", span()).to_display_string(true), "\"hi\"");

        let list = Value::list(
            vec![Value::int(1, span()), Value::string("s", span())],
            span(),
        );
        assert_eq!(list.to_display_string(false), "[1, \"s\"]");
    }

    #[test]
    fn test_equality() {
        assert_eq!(Value::int(1, span()), Value::int(1, span()));
        assert_ne!(Value::int(1, span()), Value::int(2, span()));
        assert_ne!(Value::int(1, span()), Value::string("1", span()));

        let a = Value::list(vec![Value::int(1, span())], span());
        let b = Value::list(vec![Value::int(1, span())], span());
        assert_eq!(a, b);
    }

    #[test]
    fn test_scope_clone_is_deep() {
        let scope = Scope::detached_ref();
        scope
            .borrow_mut()
            .set("x", Value::int(1, span()), span());
        let value = Value::scope(scope.clone(), span());

        let copy = value.clone();
        scope
            .borrow_mut()
            .set("x", Value::int(2, span()), span());

        let copied_scope = copy.as_scope().unwrap();
        let seen = copied_scope.borrow().get_direct("x").unwrap();
        assert_eq!(seen.as_int().unwrap(), 1);
    }
}
