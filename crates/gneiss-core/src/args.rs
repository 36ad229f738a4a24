//! Build arguments: `declare_args` bookkeeping and override checking.
//!
//! Overrides arrive from `--args` (itself a GNS fragment evaluated
//! before loading starts). Each `declare_args` block registers its
//! arguments here with their defaults and the doc comment attached to
//! the declaration; overrides win over defaults, and after loading
//! finishes every override must correspond to some declared argument.

use crate::value::Value;
use gneiss_dsl::{Error, ErrorKind, Span};
use indexmap::IndexMap;
use std::cell::RefCell;

#[derive(Debug, Clone)]
pub struct ArgDecl {
    pub default: Value,
    /// Default or override, whichever applies.
    pub value: Value,
    pub doc: Option<String>,
    pub decl_span: Span,
}

#[derive(Debug, Default)]
pub struct Args {
    overrides: IndexMap<String, Value>,
    declared: RefCell<IndexMap<String, ArgDecl>>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: IndexMap<String, Value>) -> Self {
        Self {
            overrides,
            declared: RefCell::new(IndexMap::new()),
        }
    }

    /// Register one declared argument, returning its effective value.
    pub fn declare(
        &self,
        name: &str,
        default: Value,
        doc: Option<String>,
        span: Span,
    ) -> Result<Value, Error> {
        let mut declared = self.declared.borrow_mut();
        if let Some(existing) = declared.get(name) {
            return Err(Error::new(
                ErrorKind::Name,
                span,
                format!("build argument \"{}\" was already declared", name),
            )
            .with_label(existing.decl_span, "first declared here"));
        }

        let value = match self.overrides.get(name) {
            Some(over) => {
                if over.type_name() != default.type_name() && !default.is_none() {
                    return Err(Error::new(
                        ErrorKind::Type,
                        over.origin,
                        format!(
                            "build argument \"{}\" expects {}, the override is {}",
                            name,
                            default.type_name(),
                            over.type_name()
                        ),
                    )
                    .with_label(span, "declared here"));
                }
                over.clone()
            }
            None => default.clone(),
        };

        declared.insert(
            name.to_string(),
            ArgDecl {
                default,
                value: value.clone(),
                doc,
                decl_span: span,
            },
        );
        Ok(value)
    }

    /// After loading: every override must name a declared argument.
    pub fn verify_overrides_used(&self) -> Result<(), Error> {
        let declared = self.declared.borrow();
        for (name, value) in &self.overrides {
            if !declared.contains_key(name) {
                return Err(Error::new(
                    ErrorKind::Generator,
                    value.origin,
                    format!("build argument \"{}\" was overridden but never declared", name),
                )
                .with_note("it has no effect; remove it from --args or declare it in a declare_args() block"));
            }
        }
        Ok(())
    }

    pub fn overrides(&self) -> &IndexMap<String, Value> {
        &self.overrides
    }

    /// Snapshot of all declared arguments, for listing and args.gn.
    pub fn declared(&self) -> IndexMap<String, ArgDecl> {
        self.declared.borrow().clone()
    }
}

/// Evaluate `--args` text (a GNS fragment of assignments) into the
/// override map. The fragment is registered in the source map so
/// errors in it render like any other file.
pub fn parse_arg_overrides(
    settings: std::rc::Rc<crate::settings::BuildSettings>,
    text: &str,
    source_map: &mut gneiss_dsl::SourceMap,
) -> Result<IndexMap<String, Value>, Error> {
    use gneiss_dsl::{lexer, parser};

    let file_id = source_map.add_file("<--args>", text.to_string());
    let tokens = lexer::lex(text, file_id)?;
    let block = parser::parse_file(&tokens, file_id)?;

    let ctx = crate::eval::EvalContext::standalone(
        settings,
        std::rc::Rc::new(Args::new()),
        crate::eval::OutputSink::Stdout,
    );
    let scope = crate::scope::Scope::root_ref();
    crate::eval::eval_block_in(&ctx, &scope, &block)?;

    let scope = scope.borrow();
    let mut overrides = IndexMap::new();
    for name in scope.binding_names() {
        let value = scope.get_direct(&name).expect("binding disappeared");
        overrides.insert(name, value);
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::zero(0)
    }

    #[test]
    fn test_parse_overrides_text() {
        let settings = std::rc::Rc::new(crate::settings::BuildSettings::new(
            std::path::PathBuf::from("/nonexistent"),
            "//out",
        ));
        let mut map = gneiss_dsl::SourceMap::new();
        let overrides =
            parse_arg_overrides(settings, "use_checks = false\nlevel = 1 + 2", &mut map).unwrap();
        assert!(!overrides["use_checks"].as_bool().unwrap());
        assert_eq!(overrides["level"].as_int().unwrap(), 3);
    }

    #[test]
    fn test_default_wins_without_override() {
        let args = Args::new();
        let v = args
            .declare("use_checks", Value::bool(true, span()), None, span())
            .unwrap();
        assert!(v.as_bool().unwrap());
    }

    #[test]
    fn test_override_wins() {
        let mut overrides = IndexMap::new();
        overrides.insert("use_checks".to_string(), Value::bool(false, span()));
        let args = Args::with_overrides(overrides);

        let v = args
            .declare("use_checks", Value::bool(true, span()), None, span())
            .unwrap();
        assert!(!v.as_bool().unwrap());
    }

    #[test]
    fn test_override_type_mismatch() {
        let mut overrides = IndexMap::new();
        overrides.insert("level".to_string(), Value::string("high", span()));
        let args = Args::with_overrides(overrides);

        let err = args
            .declare("level", Value::int(2, span()), None, span())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn test_duplicate_declaration() {
        let args = Args::new();
        args.declare("x", Value::int(1, span()), None, span()).unwrap();
        let err = args
            .declare("x", Value::int(1, span()), None, span())
            .unwrap_err();
        assert!(err.message.contains("already declared"));
    }

    #[test]
    fn test_undeclared_override_detected() {
        let mut overrides = IndexMap::new();
        overrides.insert("typo_arg".to_string(), Value::bool(true, span()));
        let args = Args::with_overrides(overrides);

        args.declare("real_arg", Value::bool(false, span()), None, span())
            .unwrap();
        let err = args.verify_overrides_used().unwrap_err();
        assert!(err.message.contains("typo_arg"));
    }
}
