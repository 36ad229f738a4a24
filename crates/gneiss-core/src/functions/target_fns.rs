//! Item-declaring built-ins: the target functions, `config`,
//! `toolchain`/`tool`, `set_default_toolchain`, `get_target_outputs`.

use super::{eval_args, expect_arg_count, forbid_block, require_block};
use crate::eval::{self, EvalContext, FileKind};
use crate::item::{Config, Item, Target, TargetType, Tool, Toolchain};
use crate::item::toolchain::TOOL_NAMES;
use crate::label::Label;
use crate::scope::{Scope, ScopeRef};
use crate::substitution::SubstitutedString;
use crate::value::Value;
use gneiss_dsl::ast::Call;
use gneiss_dsl::{Error, ErrorKind, Span};
use tracing::trace;

/// Validate the declaration context and produce the item's label.
fn declaration_label(ctx: &EvalContext, call: &Call, name: &Value) -> Result<Label, Error> {
    if ctx.file_kind != FileKind::BuildFile {
        return Err(Error::new(
            ErrorKind::Generator,
            call.span,
            format!("{}() may only be used in BUILD.gns files", call.name),
        ));
    }
    let name = name.as_string()?;
    if name.is_empty() || name.contains([':', '/', '(', ')']) {
        return Err(Error::new(
            ErrorKind::Generator,
            call.span,
            format!("invalid {} name \"{}\"", call.name, name),
        ));
    }
    Ok(Label::new(ctx.current_dir.clone(), name))
}

/// Shared body of `executable`, `group`, `action`, ...: run the
/// declaration block in a prepared scope, extract the target, commit.
pub fn declare_target(
    ctx: &EvalContext,
    scope: &ScopeRef,
    call: &Call,
    target_type: TargetType,
) -> Result<Value, Error> {
    expect_arg_count(call, 1)?;
    let block = require_block(call)?;
    let args = eval_args(ctx, scope, call)?;
    let label = declaration_label(ctx, call, &args[0])?;
    let toolchain = ctx.settings.default_toolchain();

    let target_scope = Scope::child_ref(scope);
    {
        let mut ts = target_scope.borrow_mut();
        ts.set_exempt(
            "target_name",
            Value::string(label.name(), call.span),
            call.span,
        );
        ts.set_exempt(
            "current_toolchain",
            Value::string(toolchain.to_string(), call.span),
            call.span,
        );
        ts.set_exempt(
            "target_out_dir",
            Value::string(ctx.settings.target_out_dir(&ctx.current_dir), call.span),
            call.span,
        );
        ts.set_exempt(
            "target_gen_dir",
            Value::string(ctx.settings.target_gen_dir(&ctx.current_dir), call.span),
            call.span,
        );
        if let Some(defaults) = ctx.defaults.borrow().get(&target_type) {
            for (name, value) in defaults.bindings() {
                ts.set_exempt(name, value.clone(), call.span);
            }
        }
    }

    eval::eval_block_in(ctx, &target_scope, block)?;

    let target = Target::from_scope(
        &target_scope,
        label,
        target_type,
        toolchain,
        &ctx.current_dir,
        call.span,
    )?;
    target_scope.borrow().check_unused()?;

    trace!(label = %target.label, kind = target_type.function_name(), "target committed");
    ctx.collector.borrow_mut().commit(Item::Target(target))?;
    Ok(Value::none(call.span))
}

/// `config("name") { cflags = [...] ... }`.
pub fn declare_config(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    expect_arg_count(call, 1)?;
    let block = require_block(call)?;
    let args = eval_args(ctx, scope, call)?;
    let label = declaration_label(ctx, call, &args[0])?;

    let config_scope = Scope::child_ref(scope);
    eval::eval_block_in(ctx, &config_scope, block)?;
    let config = Config::from_scope(&config_scope, label, &ctx.current_dir, call.span)?;
    config_scope.borrow().check_unused()?;

    ctx.collector.borrow_mut().commit(Item::Config(config))?;
    Ok(Value::none(call.span))
}

/// `toolchain("name") { tool("cc") { ... } ... }`.
pub fn declare_toolchain(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    expect_arg_count(call, 1)?;
    let block = require_block(call)?;
    let args = eval_args(ctx, scope, call)?;
    let label = declaration_label(ctx, call, &args[0])?;

    {
        let mut scratch = ctx.toolchain_scratch.borrow_mut();
        if scratch.is_some() {
            return Err(Error::new(
                ErrorKind::Generator,
                call.span,
                "toolchain() definitions cannot nest",
            ));
        }
        *scratch = Some(Toolchain::new(label, call.span));
    }

    let toolchain_scope = Scope::child_ref(scope);
    let result = eval::eval_block_in(ctx, &toolchain_scope, block)
        .and_then(|_| toolchain_scope.borrow().check_unused());
    let toolchain = ctx
        .toolchain_scratch
        .borrow_mut()
        .take()
        .expect("toolchain scratch vanished");
    result?;

    ctx.collector
        .borrow_mut()
        .commit(Item::Toolchain(toolchain))?;
    Ok(Value::none(call.span))
}

/// `tool("cc") { command = ... }`, valid only inside `toolchain()`.
pub fn declare_tool(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    expect_arg_count(call, 1)?;
    let block = require_block(call)?;

    if ctx.toolchain_scratch.borrow().is_none() {
        return Err(Error::new(
            ErrorKind::Generator,
            call.span,
            "tool() may only be used inside a toolchain() definition",
        ));
    }

    let args = eval_args(ctx, scope, call)?;
    let name = args[0].as_string()?.to_string();
    if !TOOL_NAMES.contains(&name.as_str()) {
        return Err(Error::new(
            ErrorKind::Generator,
            args[0].origin,
            format!("unknown tool \"{}\"", name),
        ));
    }

    let tool_scope = Scope::child_ref(scope);
    eval::eval_block_in(ctx, &tool_scope, block)?;
    let tool = extract_tool(&tool_scope, name, call.span)?;
    tool_scope.borrow().check_unused()?;

    let mut scratch = ctx.toolchain_scratch.borrow_mut();
    let toolchain = scratch.as_mut().expect("toolchain scratch vanished");
    if let Some(existing) = toolchain.tools.get(&tool.name) {
        return Err(Error::new(
            ErrorKind::Name,
            call.span,
            format!("tool \"{}\" is already defined for this toolchain", tool.name),
        )
        .with_label(existing.decl_span, "first defined here"));
    }
    toolchain.tools.insert(tool.name.clone(), tool);
    Ok(Value::none(call.span))
}

fn extract_tool(scope: &ScopeRef, name: String, span: Span) -> Result<Tool, Error> {
    use crate::item::{take_string, take_string_list};

    let command = take_string(scope, "command")?.ok_or_else(|| {
        Error::new(
            ErrorKind::Generator,
            span,
            format!("tool \"{}\" requires a command", name),
        )
    })?;
    let outputs = take_string_list(scope, "outputs")?
        .unwrap_or_default()
        .iter()
        .map(|o| SubstitutedString::parse(o, span))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Tool {
        name,
        decl_span: span,
        command: SubstitutedString::parse(&command, span)?,
        description: take_string(scope, "description")?,
        outputs,
        depfile: take_string(scope, "depfile")?,
    })
}

/// `set_default_toolchain("//tc:name")`, buildconfig only.
pub fn set_default_toolchain(
    ctx: &EvalContext,
    scope: &ScopeRef,
    call: &Call,
) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 1)?;
    if ctx.file_kind != FileKind::BuildConfig {
        return Err(Error::new(
            ErrorKind::Generator,
            call.span,
            "set_default_toolchain() may only be used in the build configuration file",
        ));
    }
    let args = eval_args(ctx, scope, call)?;
    let label = Label::resolve(args[0].as_string()?, &ctx.current_dir, args[0].origin)?;
    if !ctx.settings.set_default_toolchain(label.clone()) {
        return Err(Error::new(
            ErrorKind::Generator,
            call.span,
            format!(
                "conflicting default toolchain \"{}\" (already set to \"{}\")",
                label,
                ctx.settings.default_toolchain()
            ),
        ));
    }
    Ok(Value::none(call.span))
}

/// `get_target_outputs("label")`: outputs of a target already
/// committed by the current file.
pub fn get_target_outputs(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 1)?;
    let args = eval_args(ctx, scope, call)?;
    let label = Label::resolve(args[0].as_string()?, &ctx.current_dir, args[0].origin)?;

    if label.dir() != ctx.current_dir {
        return Err(Error::new(
            ErrorKind::Generator,
            args[0].origin,
            format!(
                "get_target_outputs() only works on targets in the current file, not \"{}\"",
                label
            ),
        ));
    }

    let collector = ctx.collector.borrow();
    let target = collector
        .get(&label)
        .and_then(Item::as_target)
        .ok_or_else(|| {
            Error::new(
                ErrorKind::Generator,
                args[0].origin,
                format!("\"{}\" has not been defined yet in this file", label),
            )
        })?;

    let outputs = target.computed_outputs(&ctx.settings)?;
    let items = outputs
        .into_iter()
        .map(|o| Value::string(o, call.span))
        .collect();
    Ok(Value::list(items, call.span))
}

#[cfg(test)]
mod tests {
    use crate::item::TargetType;
    use crate::test_support::TestSetup;
    use gneiss_dsl::ErrorKind;

    #[test]
    fn test_declare_executable() {
        let setup = TestSetup::new();
        setup
            .run(
                "executable(\"app\") {\n  sources = [ \"main.cc\" ]\n  deps = [ \":lib\" ]\n}\nsource_set(\"lib\") {\n  sources = [ \"lib.cc\" ]\n}",
            )
            .unwrap();

        let collector = setup.collector();
        assert_eq!(collector.len(), 2);
        let (label, item) = collector.iter().next().unwrap();
        assert_eq!(label.to_string(), "//:app");
        let target = item.as_target().unwrap();
        assert_eq!(target.target_type, TargetType::Executable);
        assert_eq!(target.sources, vec!["//main.cc"]);
        assert_eq!(target.private_deps[0].label.to_string(), "//:lib");
    }

    #[test]
    fn test_unknown_variable_in_target_is_unused_error() {
        let setup = TestSetup::new();
        let err = setup
            .run("group(\"g\") {\n  sorces = [ \"a.cc\" ]\n}")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Usage);
        assert!(err.message.contains("sorces"));
    }

    #[test]
    fn test_duplicate_target_label() {
        let setup = TestSetup::new();
        let err = setup
            .run("group(\"g\") {\n}\ngroup(\"g\") {\n}")
            .unwrap_err();
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn test_set_defaults_applies() {
        let setup = TestSetup::new();
        setup
            .run(
                "config(\"warnings\") {\n  cflags = [ \"-Wall\" ]\n}\nset_defaults(\"executable\") {\n  configs = [ \":warnings\" ]\n}\nexecutable(\"app\") {\n  sources = [ \"main.cc\" ]\n}",
            )
            .unwrap();

        let collector = setup.collector();
        let label = crate::label::Label::new("//", "app");
        let target = collector.get(&label).unwrap().as_target().unwrap();
        assert_eq!(target.configs.len(), 1);
        assert_eq!(target.configs[0].label.to_string(), "//:warnings");
    }

    #[test]
    fn test_target_can_override_defaults() {
        let setup = TestSetup::new();
        setup
            .run(
                "set_defaults(\"executable\") {\n  testonly = true\n}\nexecutable(\"app\") {\n  testonly = false\n}",
            )
            .unwrap();
        let collector = setup.collector();
        let label = crate::label::Label::new("//", "app");
        assert!(!collector.get(&label).unwrap().as_target().unwrap().testonly);
    }

    #[test]
    fn test_action_requires_script() {
        let setup = TestSetup::new();
        let err = setup
            .run("action(\"gen\") {\n  outputs = [ \"$target_gen_dir/out.h\" ]\n}")
            .unwrap_err();
        assert!(err.message.contains("requires a script"));
    }

    #[test]
    fn test_toolchain_and_tools() {
        let setup = TestSetup::new();
        setup
            .run(
                "toolchain(\"gcc\") {\n  tool(\"cc\") {\n    command = \"gcc -c {{source}} -o {{output}}\"\n    description = \"CC {{output}}\"\n  }\n  tool(\"link\") {\n    command = \"gcc {{inputs}} -o {{output}}\"\n  }\n}",
            )
            .unwrap();

        let collector = setup.collector();
        let label = crate::label::Label::new("//", "gcc");
        let item = collector.get(&label).unwrap();
        match item {
            crate::item::Item::Toolchain(tc) => {
                assert!(tc.tool("cc").is_some());
                assert!(tc.tool("link").is_some());
                assert!(tc.tool("cxx").is_none());
            }
            _ => panic!("expected toolchain"),
        }
    }

    #[test]
    fn test_tool_outside_toolchain() {
        let setup = TestSetup::new();
        let err = setup
            .run("tool(\"cc\") {\n  command = \"cc\"\n}")
            .unwrap_err();
        assert!(err.message.contains("inside a toolchain()"));
    }

    #[test]
    fn test_get_target_outputs() {
        let setup = TestSetup::new();
        setup
            .run(
                "action(\"gen\") {\n  script = \"gen.py\"\n  outputs = [ \"{{target_gen_dir}}/made.h\" ]\n}\nprint(get_target_outputs(\":gen\"))",
            )
            .unwrap();
        assert_eq!(setup.output(), "[\"//out/debug/gen/made.h\"]\n");
    }

    #[test]
    fn test_get_target_outputs_requires_prior_definition() {
        let setup = TestSetup::new();
        let err = setup.run("print(get_target_outputs(\":later\"))").unwrap_err();
        assert!(err.message.contains("has not been defined"));
    }
}
