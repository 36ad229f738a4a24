//! Filesystem-adjacent built-ins: `read_file`, `write_file`,
//! `exec_script`, and the input-conversion rules they share.

use super::{eval_args, expect_arg_count, expect_arg_range, forbid_block};
use crate::eval::{self, EvalContext};
use crate::paths;
use crate::scope::Scope;
use crate::scope::ScopeRef;
use crate::value::{Value, ValueKind};
use gneiss_dsl::ast::Call;
use gneiss_dsl::{lexer, parser, Error, ErrorKind, Span};
use std::process::Command;
use tracing::debug;

/// Convert captured text into a value per the conversion selector.
///
/// Selectors: `"string"`, `"trim string"`, `"list lines"`,
/// `"trim list lines"`, `"value"`, `"json"`, and `""` (discard).
pub fn convert_input(
    ctx: &EvalContext,
    text: &str,
    how: &str,
    span: Span,
) -> Result<Value, Error> {
    match how {
        "" => Ok(Value::none(span)),
        "string" => Ok(Value::string(text, span)),
        "trim string" => Ok(Value::string(text.trim(), span)),
        "list lines" | "trim list lines" => {
            let trim = how.starts_with("trim");
            let items = text
                .lines()
                .map(|line| if trim { line.trim() } else { line })
                .filter(|line| !line.is_empty())
                .map(|line| Value::string(line, span))
                .collect();
            Ok(Value::list(items, span))
        }
        "value" => {
            let tokens = lexer::lex(text, span.file_id)?;
            let expr = parser::parse_expression(&tokens, span.file_id)?;
            let scratch = Scope::detached_ref();
            eval::eval_expr(ctx, &scratch, &expr)
        }
        "scope" => {
            // The text is a sequence of assignments; the resulting
            // bindings become a scope value.
            let tokens = lexer::lex(text, span.file_id)?;
            let block = parser::parse_file(&tokens, span.file_id)?;
            let scratch = Scope::detached_ref();
            eval::eval_block_in(ctx, &scratch, &block)?;
            scratch.borrow_mut().mark_all_used();
            Ok(Value::scope(scratch, span))
        }
        "json" => {
            let json: serde_json::Value = serde_json::from_str(text).map_err(|e| {
                Error::new(ErrorKind::Generator, span, format!("invalid JSON: {}", e))
            })?;
            json_to_value(&json, span)
        }
        other => Err(Error::new(
            ErrorKind::Type,
            span,
            format!("unknown input conversion \"{}\"", other),
        )),
    }
}

fn json_to_value(json: &serde_json::Value, span: Span) -> Result<Value, Error> {
    Ok(match json {
        serde_json::Value::Null => Value::none(span),
        serde_json::Value::Bool(b) => Value::bool(*b, span),
        serde_json::Value::Number(n) => {
            let n = n.as_i64().ok_or_else(|| {
                Error::new(
                    ErrorKind::Type,
                    span,
                    format!("JSON number {} is not a 64-bit integer", n),
                )
            })?;
            Value::int(n, span)
        }
        serde_json::Value::String(s) => Value::string(s, span),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(json_to_value(item, span)?);
            }
            Value::list(out, span)
        }
        serde_json::Value::Object(map) => {
            let scope = Scope::detached_ref();
            {
                let mut s = scope.borrow_mut();
                for (key, value) in map {
                    s.set(key, json_to_value(value, span)?, span);
                }
                s.mark_all_used();
            }
            Value::scope(scope, span)
        }
    })
}

/// `read_file(path, how)`.
pub fn read_file(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 2)?;
    let args = eval_args(ctx, scope, call)?;
    let path = paths::resolve_path(args[0].as_string()?, &ctx.current_dir);
    let how = args[1].as_string()?;

    let fs_path = ctx.settings.to_fs_path(&path);
    let text = std::fs::read_to_string(&fs_path).map_err(|e| {
        Error::new(
            ErrorKind::Io,
            args[0].origin,
            format!("unable to read \"{}\": {}", path, e),
        )
    })?;
    // The file's content influenced the output.
    ctx.add_gen_dependency(fs_path);
    convert_input(ctx, &text, how, call.span)
}

/// `write_file(path, data)`: writes only when the content changed,
/// and records the file so generated-input checking can exempt it.
pub fn write_file(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 2)?;
    let args = eval_args(ctx, scope, call)?;
    let path = paths::resolve_path(args[0].as_string()?, &ctx.current_dir);

    let content = match &args[1].kind {
        ValueKind::String(s) => s.clone(),
        ValueKind::List(items) => {
            let mut out = String::new();
            for item in items {
                out.push_str(&item.to_display_string(false));
                out.push('\n');
            }
            out
        }
        _ => format!("{}\n", args[1].to_display_string(false)),
    };

    let fs_path = ctx.settings.to_fs_path(&path);
    let unchanged = std::fs::read_to_string(&fs_path)
        .map(|existing| existing == content)
        .unwrap_or(false);
    if !unchanged {
        if let Some(parent) = fs_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::new(
                    ErrorKind::Io,
                    call.span,
                    format!("unable to create \"{}\": {}", parent.display(), e),
                )
            })?;
        }
        std::fs::write(&fs_path, &content).map_err(|e| {
            Error::new(
                ErrorKind::Io,
                call.span,
                format!("unable to write \"{}\": {}", path, e),
            )
        })?;
    }
    ctx.add_written_file(path);
    Ok(Value::none(call.span))
}

/// `exec_script(script, args[, how[, input_files]])`.
///
/// Runs the configured script executable with the working directory
/// set to the build dir, captures stdout, and converts it per `how`.
/// A missing interpreter is a hard error at first use. The script and
/// any listed input files become generator dependencies.
pub fn exec_script(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_range(call, 1, 4)?;
    let args = eval_args(ctx, scope, call)?;

    let script = paths::resolve_path(args[0].as_string()?, &ctx.current_dir);
    let script_args: Vec<String> = match args.get(1) {
        Some(v) => v.as_string_list()?,
        None => Vec::new(),
    };
    let how = match args.get(2) {
        Some(v) => v.as_string()?.to_string(),
        None => String::new(),
    };

    let script_fs = ctx.settings.to_fs_path(&script);
    ctx.add_gen_dependency(script_fs.clone());
    if let Some(inputs) = args.get(3) {
        for input in inputs.as_list()? {
            let path = paths::resolve_path(input.as_string()?, &ctx.current_dir);
            ctx.add_gen_dependency(ctx.settings.to_fs_path(&path));
        }
    }

    let interpreter = ctx
        .settings
        .script_executable
        .clone()
        .unwrap_or_else(|| "python3".into());

    let build_dir = ctx.settings.to_fs_path(&ctx.settings.build_dir);
    std::fs::create_dir_all(&build_dir).map_err(|e| {
        Error::new(
            ErrorKind::Io,
            call.span,
            format!("unable to create build directory: {}", e),
        )
    })?;

    debug!(script = %script, ?interpreter, "exec_script");
    let output = Command::new(&interpreter)
        .arg(&script_fs)
        .args(&script_args)
        .current_dir(&build_dir)
        .output()
        .map_err(|e| {
            Error::new(
                ErrorKind::Io,
                call.span,
                format!(
                    "unable to run script executable \"{}\": {}",
                    interpreter.display(),
                    e
                ),
            )
            .with_note("set --script-executable or the dotfile's script_executable")
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::new(
            ErrorKind::Generator,
            call.span,
            format!(
                "script \"{}\" failed with {}:\n{}",
                script,
                output.status,
                stderr.trim_end()
            ),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    convert_input(ctx, &stdout, &how, call.span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestSetup;

    #[test]
    fn test_convert_string_forms() {
        let setup = TestSetup::new();
        let ctx = setup.context();
        let span = Span::zero(0);

        let v = convert_input(&ctx, "  hi  ", "trim string", span).unwrap();
        assert_eq!(v.as_string().unwrap(), "hi");

        let v = convert_input(&ctx, "a\n  b \n\n", "trim list lines", span).unwrap();
        assert_eq!(v.as_string_list().unwrap(), vec!["a", "b"]);

        let v = convert_input(&ctx, "anything", "", span).unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn test_convert_value() {
        let setup = TestSetup::new();
        let ctx = setup.context();
        let v = convert_input(&ctx, "[ 1, \"two\" ]", "value", Span::zero(0)).unwrap();
        let items = v.as_list().unwrap();
        assert_eq!(items[0].as_int().unwrap(), 1);
        assert_eq!(items[1].as_string().unwrap(), "two");
    }

    #[test]
    fn test_convert_json() {
        let setup = TestSetup::new();
        let ctx = setup.context();
        let v = convert_input(
            &ctx,
            r#"{"name": "x", "count": 3, "flags": [true, null]}"#,
            "json",
            Span::zero(0),
        )
        .unwrap();
        let scope = v.as_scope().unwrap();
        let scope = scope.borrow();
        assert_eq!(scope.get_direct("name").unwrap().as_string().unwrap(), "x");
        assert_eq!(scope.get_direct("count").unwrap().as_int().unwrap(), 3);
        let flags = scope.get_direct("flags").unwrap();
        assert!(flags.as_list().unwrap()[1].is_none());
    }

    #[test]
    fn test_convert_scope() {
        let setup = TestSetup::new();
        let ctx = setup.context();
        let v = convert_input(&ctx, "a = 1\nb = \"two\"\n", "scope", Span::zero(0)).unwrap();
        let scope = v.as_scope().unwrap();
        let scope = scope.borrow();
        assert_eq!(scope.get_direct("a").unwrap().as_int().unwrap(), 1);
        assert_eq!(scope.get_direct("b").unwrap().as_string().unwrap(), "two");
    }

    #[test]
    fn test_convert_json_float_rejected() {
        let setup = TestSetup::new();
        let ctx = setup.context();
        assert!(convert_input(&ctx, "1.5", "json", Span::zero(0)).is_err());
    }

    #[test]
    fn test_write_and_read_file() {
        let setup = TestSetup::with_tempdir();
        setup
            .run(
                "write_file(\"//out/debug/gen/list.txt\", [ \"a\", \"b\" ])\nprint(read_file(\"//out/debug/gen/list.txt\", \"list lines\"))",
            )
            .unwrap();
        assert_eq!(setup.output(), "[\"a\", \"b\"]\n");
    }
}
