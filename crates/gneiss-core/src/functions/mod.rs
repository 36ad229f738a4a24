//! Built-in function dispatch.
//!
//! Function calls resolve in order: built-ins, then templates found
//! lexically in the calling scope, then error. A handful of built-ins
//! receive their arguments unevaluated (`defined`, `foreach`,
//! `forward_variables_from`, `not_needed`) because they operate on
//! bindings rather than values.

mod basic;
mod file_fns;
mod path_fns;
mod scope_ops;
mod target_fns;
mod template_fn;

use crate::eval::{self, EvalContext};
use crate::item::TargetType;
use crate::scope::{Scope, ScopeRef};
use crate::value::Value;
use gneiss_dsl::ast::{Block, Call};
use gneiss_dsl::{Error, ErrorKind};

/// Names that dispatch to built-ins, kept sorted for the error hint
/// and the template-name collision check.
pub const BUILTIN_NAMES: &[&str] = &[
    "assert",
    "config",
    "declare_args",
    "defined",
    "exec_script",
    "foreach",
    "forward_variables_from",
    "get_label_info",
    "get_path_info",
    "get_target_outputs",
    "import",
    "not_needed",
    "print",
    "read_file",
    "rebase_path",
    "set_default_toolchain",
    "set_defaults",
    "template",
    "tool",
    "toolchain",
    "write_file",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name) || TargetType::from_function_name(name).is_some()
}

pub fn call_function(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    match call.name.as_str() {
        // Unevaluated-argument forms.
        "defined" => basic::defined(ctx, scope, call),
        "foreach" => basic::run_foreach(ctx, scope, call),
        "forward_variables_from" => scope_ops::forward_variables_from(ctx, scope, call),
        "not_needed" => scope_ops::not_needed(ctx, scope, call),
        // Block-structured forms.
        "template" => template_fn::define_template(ctx, scope, call),
        "declare_args" => scope_ops::declare_args(ctx, scope, call),
        "set_defaults" => scope_ops::set_defaults(ctx, scope, call),
        "config" => target_fns::declare_config(ctx, scope, call),
        "toolchain" => target_fns::declare_toolchain(ctx, scope, call),
        "tool" => target_fns::declare_tool(ctx, scope, call),
        // Plain evaluated forms.
        "import" => scope_ops::import(ctx, scope, call),
        "print" => basic::print(ctx, scope, call),
        "assert" => basic::assert_fn(ctx, scope, call),
        "set_default_toolchain" => target_fns::set_default_toolchain(ctx, scope, call),
        "get_target_outputs" => target_fns::get_target_outputs(ctx, scope, call),
        "get_path_info" => path_fns::get_path_info(ctx, scope, call),
        "rebase_path" => path_fns::rebase_path(ctx, scope, call),
        "get_label_info" => path_fns::get_label_info(ctx, scope, call),
        "read_file" => file_fns::read_file(ctx, scope, call),
        "write_file" => file_fns::write_file(ctx, scope, call),
        "exec_script" => file_fns::exec_script(ctx, scope, call),
        name => {
            if let Some(target_type) = TargetType::from_function_name(name) {
                return target_fns::declare_target(ctx, scope, call, target_type);
            }
            if let Some(template) = Scope::lookup_template(scope, name) {
                let args = eval_args(ctx, scope, call)?;
                return template.invoke(ctx, scope, call, args);
            }
            Err(Error::new(
                ErrorKind::Name,
                call.name_span,
                format!("undefined function or template \"{}\"", name),
            ))
        }
    }
}

// --- helpers shared by the function implementations ---

pub(crate) fn eval_args(
    ctx: &EvalContext,
    scope: &ScopeRef,
    call: &Call,
) -> Result<Vec<Value>, Error> {
    call.args
        .iter()
        .map(|arg| eval::eval_expr(ctx, scope, arg))
        .collect()
}

pub(crate) fn expect_arg_count(call: &Call, count: usize) -> Result<(), Error> {
    if call.args.len() != count {
        return Err(Error::new(
            ErrorKind::Type,
            call.span,
            format!(
                "{}() takes {} argument{}, got {}",
                call.name,
                count,
                if count == 1 { "" } else { "s" },
                call.args.len()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn expect_arg_range(call: &Call, min: usize, max: usize) -> Result<(), Error> {
    if call.args.len() < min || call.args.len() > max {
        return Err(Error::new(
            ErrorKind::Type,
            call.span,
            format!(
                "{}() takes {} to {} arguments, got {}",
                call.name,
                min,
                max,
                call.args.len()
            ),
        ));
    }
    Ok(())
}

pub(crate) fn require_block<'a>(call: &'a Call) -> Result<&'a Block, Error> {
    call.block.as_ref().ok_or_else(|| {
        Error::new(
            ErrorKind::Generator,
            call.span,
            format!("{}() requires a {{ }} block", call.name),
        )
    })
}

pub(crate) fn forbid_block(call: &Call) -> Result<(), Error> {
    if call.block.is_some() {
        return Err(Error::new(
            ErrorKind::Generator,
            call.span,
            format!("{}() does not take a {{ }} block", call.name),
        ));
    }
    Ok(())
}
