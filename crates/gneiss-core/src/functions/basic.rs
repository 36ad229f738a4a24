//! `print`, `assert`, `defined`, `foreach`.

use super::{eval_args, expect_arg_count, expect_arg_range, forbid_block, require_block};
use crate::eval::{self, EvalContext};
use crate::scope::{Scope, ScopeRef};
use crate::value::{Value, ValueKind};
use gneiss_dsl::ast::{Accessor, Call, ExprKind};
use gneiss_dsl::{Error, ErrorKind};

/// `print(...)`: arguments coerced to strings, joined with spaces,
/// newline-terminated.
pub fn print(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    let args = eval_args(ctx, scope, call)?;
    let text: Vec<String> = args.iter().map(|v| v.to_display_string(false)).collect();
    ctx.print(&format!("{}\n", text.join(" ")));
    Ok(Value::none(call.span))
}

/// `assert(cond[, message])`.
pub fn assert_fn(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_range(call, 1, 2)?;
    let args = eval_args(ctx, scope, call)?;
    if args[0].as_bool()? {
        return Ok(Value::none(call.span));
    }
    let message = match args.get(1) {
        Some(v) => format!("assertion failed: {}", v.as_string()?),
        None => "assertion failed".to_string(),
    };
    Err(Error::new(ErrorKind::Generator, call.span, message))
}

/// `defined(ident)` / `defined(scope.member)`: presence test that
/// does not mark anything used.
pub fn defined(_ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 1)?;

    let present = match &call.args[0].kind {
        ExprKind::Identifier(name) => Scope::lookup_no_mark(scope, name).is_some(),
        ExprKind::Access {
            base,
            base_span,
            access: Accessor::Member(member),
        } => match Scope::lookup_no_mark(scope, base) {
            Some(value) => match &value.kind {
                ValueKind::Scope(inner) => inner.borrow().has_direct(member),
                other => {
                    return Err(Error::new(
                        ErrorKind::Type,
                        *base_span,
                        format!("\"{}\" is a {}, not a scope", base, other.type_name()),
                    ));
                }
            },
            None => false,
        },
        _ => {
            return Err(Error::new(
                ErrorKind::Type,
                call.args[0].span,
                "defined() takes an identifier or scope.member",
            ));
        }
    };
    Ok(Value::bool(present, call.span))
}

/// `foreach(var, list) { ... }`: binds `var` in a fresh branch scope
/// per iteration; writes to other names fall through to the
/// enclosing scope, and mutating `var` never touches the list.
pub fn run_foreach(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    expect_arg_count(call, 2)?;
    let block = require_block(call)?;

    let var = match &call.args[0].kind {
        ExprKind::Identifier(name) => name.clone(),
        _ => {
            return Err(Error::new(
                ErrorKind::Type,
                call.args[0].span,
                "the first argument of foreach() must be the loop variable name",
            ));
        }
    };
    let list = eval::eval_expr(ctx, scope, &call.args[1])?;
    let items = list.as_list()?.to_vec();

    for item in items {
        let iteration = Scope::shared_child_ref(scope);
        iteration
            .borrow_mut()
            .set_exempt(&var, item, call.args[0].span);
        eval::eval_block_in(ctx, &iteration, block)?;
        iteration.borrow().check_unused()?;
    }
    Ok(Value::none(call.span))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestSetup;

    #[test]
    fn test_print_captures_output() {
        let setup = TestSetup::new();
        setup.run("print(1 + 2)").unwrap();
        assert_eq!(setup.output(), "3\n");
    }

    #[test]
    fn test_print_joins_arguments() {
        let setup = TestSetup::new();
        setup.run("print(\"a\", 1, true, [ 1, \"x\" ])").unwrap();
        assert_eq!(setup.output(), "a 1 true [1, \"x\"]\n");
    }

    #[test]
    fn test_assert_message() {
        let setup = TestSetup::new();
        let err = setup.run("assert(false, \"boom\")").unwrap_err();
        assert!(err.message.contains("boom"));
        assert!(setup.run("assert(true)").is_ok());
    }

    #[test]
    fn test_defined_without_marking() {
        let setup = TestSetup::new();
        // defined() alone does not count as a use.
        let err = setup.run("a = 1\nx = defined(a)\nprint(x)").unwrap_err();
        assert!(err.message.contains("\"a\""));

        let setup = TestSetup::new();
        setup
            .run("s = {\n  inner = 1\n}\nprint(defined(s.inner))\nprint(defined(s.missing))\nprint(defined(nothing))\nnot_needed([ \"s\" ])")
            .unwrap();
        assert_eq!(setup.output(), "true\nfalse\nfalse\n");
    }

    #[test]
    fn test_foreach_binds_fresh() {
        let setup = TestSetup::new();
        setup
            .run("total = 0\nforeach(i, [ 1, 2, 3 ]) {\n  total += i\n}\nprint(total)")
            .unwrap();
        assert_eq!(setup.output(), "6\n");
    }

    #[test]
    fn test_foreach_mutation_does_not_leak() {
        let setup = TestSetup::new();
        setup
            .run("l = [ 1, 2 ]\nforeach(i, l) {\n  i = i + 10\n  print(i)\n}\nprint(l)")
            .unwrap();
        assert_eq!(setup.output(), "11\n12\n[1, 2]\n");
    }

    #[test]
    fn test_foreach_requires_list() {
        let setup = TestSetup::new();
        let err = setup.run("foreach(i, 3) {\n}").unwrap_err();
        assert!(err.message.contains("expected list"));
    }
}
