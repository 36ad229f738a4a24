//! Scope-manipulating built-ins: `import`, `not_needed`,
//! `forward_variables_from`, `declare_args`, `set_defaults`.

use super::{eval_args, expect_arg_count, expect_arg_range, forbid_block, require_block};
use crate::eval::{self, scope_handle, EvalContext};
use crate::item::TargetType;
use crate::paths;
use crate::scope::{Scope, ScopeRef};
use crate::value::{Value, ValueKind};
use gneiss_dsl::ast::{Call, ExprKind, StatementKind};
use gneiss_dsl::{Error, ErrorKind};

/// `import("//build/helpers.gnsi")`: load the file (once, through the
/// loader) and copy its top-level bindings and templates into the
/// calling scope. Imported names are exempt from the caller's unused
/// check; importing the same file again is a no-op.
pub fn import(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 1)?;
    let args = eval_args(ctx, scope, call)?;
    let path = paths::resolve_path(args[0].as_string()?, &ctx.current_dir);

    let importer = ctx.importer.as_ref().ok_or_else(|| {
        Error::new(
            ErrorKind::Generator,
            call.span,
            "import() is not supported in this context",
        )
    })?;
    let imported = importer.import(ctx, &path, call.span)?;
    Scope::merge_into(&imported.scope, scope, true, call.span, "import")?;
    Ok(Value::none(call.span))
}

/// `not_needed(list|"*")` or `not_needed(scope, list|"*")`: mark
/// bindings used without reading them.
pub fn not_needed(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_range(call, 1, 2)?;

    let (target, list_index) = if call.args.len() == 2 {
        let name = match &call.args[0].kind {
            ExprKind::Identifier(name) => name,
            _ => {
                return Err(Error::new(
                    ErrorKind::Type,
                    call.args[0].span,
                    "the first argument of not_needed() must name a scope",
                ));
            }
        };
        (scope_handle(scope, name, call.args[0].span)?, 1)
    } else {
        (scope.clone(), 0)
    };

    let selector = eval::eval_expr(ctx, scope, &call.args[list_index])?;
    match &selector.kind {
        ValueKind::String(star) if star == "*" => {
            target.borrow_mut().mark_all_used();
        }
        ValueKind::List(_) => {
            for name in selector.as_string_list()? {
                let marked = if list_index == 1 {
                    target.borrow_mut().mark_used_direct(&name)
                } else {
                    Scope::mark_used(&target, &name)
                };
                if !marked {
                    return Err(Error::new(
                        ErrorKind::Name,
                        selector.origin,
                        format!("not_needed() names \"{}\", which is not defined", name),
                    ));
                }
            }
        }
        _ => {
            return Err(Error::new(
                ErrorKind::Type,
                selector.origin,
                "not_needed() takes a list of names or \"*\"",
            ));
        }
    }
    Ok(Value::none(call.span))
}

/// `forward_variables_from(scope, list|"*"[, exclusions])`: copy the
/// named bindings from a scope (typically `invoker`) into the caller,
/// marking them used at the source. Clobbering an existing binding is
/// an error.
pub fn forward_variables_from(
    ctx: &EvalContext,
    scope: &ScopeRef,
    call: &Call,
) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_range(call, 2, 3)?;

    let source_name = match &call.args[0].kind {
        ExprKind::Identifier(name) => name,
        _ => {
            return Err(Error::new(
                ErrorKind::Type,
                call.args[0].span,
                "the first argument of forward_variables_from() must name a scope",
            ));
        }
    };
    let source = scope_handle(scope, source_name, call.args[0].span)?;

    let exclusions: Vec<String> = match call.args.get(2) {
        Some(expr) => eval::eval_expr(ctx, scope, expr)?.as_string_list()?,
        None => Vec::new(),
    };

    let selector = eval::eval_expr(ctx, scope, &call.args[1])?;
    let names: Vec<String> = match &selector.kind {
        ValueKind::String(star) if star == "*" => source
            .borrow()
            .binding_names()
            .into_iter()
            .filter(|n| !exclusions.contains(n))
            .collect(),
        ValueKind::List(_) => {
            let names = selector.as_string_list()?;
            for name in &names {
                if !source.borrow().has_direct(name) {
                    return Err(Error::new(
                        ErrorKind::Name,
                        selector.origin,
                        format!(
                            "\"{}\" is not in the scope given to forward_variables_from()",
                            name
                        ),
                    ));
                }
            }
            names
                .into_iter()
                .filter(|n| !exclusions.contains(n))
                .collect()
        }
        _ => {
            return Err(Error::new(
                ErrorKind::Type,
                selector.origin,
                "forward_variables_from() takes a list of names or \"*\"",
            ));
        }
    };

    for name in names {
        let value = {
            let mut src = source.borrow_mut();
            src.mark_used_direct(&name);
            src.get_direct(&name).expect("binding disappeared")
        };
        let clobbers = scope.borrow().has_direct(&name);
        if clobbers {
            let existing = scope.borrow().decl_span_direct(&name);
            let mut err = Error::new(
                ErrorKind::Name,
                call.span,
                format!("forward_variables_from() would clobber \"{}\"", name),
            );
            if let Some(span) = existing {
                err = err.with_label(span, "already declared here");
            }
            return Err(err);
        }
        scope.borrow_mut().set(&name, value, call.span);
    }
    Ok(Value::none(call.span))
}

/// `declare_args() { ... }`: evaluate defaults in a nested scope,
/// register each argument (with the doc comment above its
/// declaration), then bind the effective values into the calling
/// scope.
pub fn declare_args(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    expect_arg_count(call, 0)?;
    let block = require_block(call)?;

    let args_scope = Scope::child_ref(scope);
    eval::eval_block_in(ctx, &args_scope, block)?;

    // Doc comments attach to the assignment statements in the block.
    let doc_for = |name: &str| -> Option<String> {
        block.statements.iter().find_map(|statement| {
            match &statement.kind {
                StatementKind::Assign { lvalue, .. }
                    if lvalue.base == name && lvalue.access.is_none() =>
                {
                    statement.doc.clone()
                }
                _ => None,
            }
        })
    };

    let declared = args_scope.borrow();
    for name in declared.binding_names() {
        let default = declared.get_direct(&name).expect("binding disappeared");
        let decl_span = declared.decl_span_direct(&name).expect("binding disappeared");
        let effective = ctx.args.declare(&name, default, doc_for(&name), decl_span)?;
        scope.borrow_mut().set_exempt(&name, effective, decl_span);
    }
    Ok(Value::none(call.span))
}

/// `set_defaults("target_type") { ... }`: snapshot a scope copied
/// into every matching target declaration before its body runs.
pub fn set_defaults(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    expect_arg_count(call, 1)?;
    let block = require_block(call)?;

    let type_name = eval::eval_expr(ctx, scope, &call.args[0])?;
    let target_type = TargetType::from_function_name(type_name.as_string()?).ok_or_else(|| {
        Error::new(
            ErrorKind::Generator,
            type_name.origin,
            format!("unknown target type \"{}\"", type_name.as_string().unwrap_or("")),
        )
    })?;

    let defaults_scope = Scope::child_ref(scope);
    eval::eval_block_in(ctx, &defaults_scope, block)?;
    let snapshot = defaults_scope.borrow().clone_detached();
    ctx.defaults.borrow_mut().insert(target_type, snapshot);
    Ok(Value::none(call.span))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestSetup;
    use gneiss_dsl::ErrorKind;

    #[test]
    fn test_forward_variables_from_list() {
        let setup = TestSetup::new();
        setup
            .run(
                "template(\"wrapped\") {\n  forward_variables_from(invoker, [ \"extra\" ])\n  print(target_name, extra)\n}\nwrapped(\"x\") {\n  extra = 42\n}",
            )
            .unwrap();
        assert_eq!(setup.output(), "x 42\n");
    }

    #[test]
    fn test_forward_star_with_exclusions() {
        let setup = TestSetup::new();
        setup
            .run(
                "template(\"t\") {\n  forward_variables_from(invoker, \"*\", [ \"skipped\" ])\n  not_needed(invoker, [ \"skipped\" ])\n  print(kept)\n}\nt(\"i\") {\n  kept = 1\n  skipped = 2\n}",
            )
            .unwrap();
        assert_eq!(setup.output(), "1\n");
    }

    #[test]
    fn test_forward_clobber_is_error() {
        let setup = TestSetup::new();
        let err = setup
            .run(
                "template(\"t\") {\n  v = 1\n  forward_variables_from(invoker, [ \"v\" ])\n  print(v)\n}\nt(\"i\") {\n  v = 2\n}",
            )
            .unwrap_err();
        assert!(err.message.contains("clobber"));
    }

    #[test]
    fn test_unused_invoker_variable_is_error() {
        let setup = TestSetup::new();
        let err = setup
            .run("template(\"t\") {\n  print(target_name)\n}\nt(\"i\") {\n  ignored = 1\n}")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Usage);
        assert!(err.message.contains("ignored"));
    }

    #[test]
    fn test_not_needed_silences() {
        let setup = TestSetup::new();
        setup.run("a = 1\nnot_needed([ \"a\" ])").unwrap();
        let setup = TestSetup::new();
        setup.run("a = 1\nb = 2\nnot_needed(\"*\")").unwrap();
    }

    #[test]
    fn test_declare_args_defaults_and_docs() {
        let setup = TestSetup::new();
        setup
            .run("declare_args() {\n  # Enables extra checks.\n  use_checks = true\n}\nprint(use_checks)")
            .unwrap();
        assert_eq!(setup.output(), "true\n");

        let declared = setup.args.declared();
        let decl = declared.get("use_checks").unwrap();
        assert_eq!(decl.doc.as_deref(), Some("Enables extra checks."));
        assert!(decl.default.as_bool().unwrap());
    }

    #[test]
    fn test_declare_args_override() {
        let setup = TestSetup::with_arg_overrides(&[("use_checks", "false")]);
        setup
            .run("declare_args() {\n  use_checks = true\n}\nprint(use_checks)")
            .unwrap();
        assert_eq!(setup.output(), "false\n");
        setup.args.verify_overrides_used().unwrap();
    }

    #[test]
    fn test_undeclared_override_rejected() {
        let setup = TestSetup::with_arg_overrides(&[("bogus", "1")]);
        setup.run("a = 1\nprint(a)").unwrap();
        let err = setup.args.verify_overrides_used().unwrap_err();
        assert!(err.message.contains("bogus"));
    }
}
