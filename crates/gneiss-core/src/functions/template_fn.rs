//! `template()`: define a user template.

use super::{eval_args, expect_arg_count, is_builtin, require_block};
use crate::eval::EvalContext;
use crate::scope::{Scope, ScopeRef};
use crate::template::Template;
use crate::value::Value;
use gneiss_dsl::ast::Call;
use gneiss_dsl::{Error, ErrorKind};
use std::rc::Rc;

pub fn define_template(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    expect_arg_count(call, 1)?;
    let block = require_block(call)?;

    let args = eval_args(ctx, scope, call)?;
    let name = args[0].as_string()?.to_string();
    if is_builtin(&name) {
        return Err(Error::new(
            ErrorKind::Name,
            args[0].origin,
            format!("template \"{}\" would shadow a built-in function", name),
        ));
    }

    // Capture the defining scope by flattening it; the body is not
    // executed now, so usage checking inside it is deferred to the
    // instantiation site.
    let closure = Scope::make_closure(scope);
    let template = Rc::new(Template::new(name, call.span, closure, block.clone()));
    scope.borrow_mut().declare_template(template)?;
    Ok(Value::none(call.span))
}
