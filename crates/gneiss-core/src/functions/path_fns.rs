//! Path and label introspection: `get_path_info`, `rebase_path`,
//! `get_label_info`.

use super::{eval_args, expect_arg_count, expect_arg_range, forbid_block};
use crate::eval::EvalContext;
use crate::label::Label;
use crate::paths;
use crate::scope::ScopeRef;
use crate::value::{Value, ValueKind};
use gneiss_dsl::ast::Call;
use gneiss_dsl::{Error, ErrorKind};

/// Apply a string transform to one value or elementwise to a list.
fn map_path_value(
    value: &Value,
    mut f: impl FnMut(&str) -> Result<String, Error>,
) -> Result<Value, Error> {
    match &value.kind {
        ValueKind::String(s) => Ok(Value::string(f(s)?, value.origin)),
        ValueKind::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(Value::string(f(item.as_string()?)?, item.origin));
            }
            Ok(Value::list(out, value.origin))
        }
        other => Err(Error::new(
            ErrorKind::Type,
            value.origin,
            format!("expected string or list, got {}", other.type_name()),
        )),
    }
}

/// `get_path_info(path_or_list, what)`.
pub fn get_path_info(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 2)?;
    let args = eval_args(ctx, scope, call)?;
    let what = args[1].as_string()?;

    map_path_value(&args[0], |input| {
        let resolved = paths::resolve_path(input, &ctx.current_dir);
        Ok(match what {
            "file" => paths::file_part(&resolved).to_string(),
            "name" => paths::name_part(&resolved).to_string(),
            "extension" => paths::extension(&resolved).to_string(),
            "dir" => paths::dir_of(&resolved),
            "abspath" => resolved,
            "gen_dir" => ctx.settings.target_gen_dir(&paths::dir_of(&resolved)),
            "out_dir" => ctx.settings.target_out_dir(&paths::dir_of(&resolved)),
            _ => {
                return Err(Error::new(
                    ErrorKind::Type,
                    args[1].origin,
                    format!("unknown get_path_info() selector \"{}\"", what),
                ));
            }
        })
    })
}

/// `rebase_path(input[, new_base[, current_base]])`.
///
/// With no `new_base` the result is a filesystem-absolute path;
/// otherwise the result is relative to `new_base`. Both bases are
/// source-absolute or relative to the current directory.
pub fn rebase_path(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_range(call, 1, 3)?;
    let args = eval_args(ctx, scope, call)?;

    let current_base = match args.get(2) {
        Some(v) => paths::resolve_path(v.as_string()?, &ctx.current_dir),
        None => ctx.current_dir.clone(),
    };
    let new_base = match args.get(1) {
        Some(v) => Some(paths::resolve_path(v.as_string()?, &ctx.current_dir)),
        None => None,
    };

    map_path_value(&args[0], |input| {
        let resolved = paths::resolve_path(input, &current_base);
        Ok(match &new_base {
            Some(base) => paths::rebase(&resolved, base),
            None => ctx
                .settings
                .to_fs_path(&resolved)
                .to_string_lossy()
                .into_owned(),
        })
    })
}

/// `get_label_info(label, what)`.
pub fn get_label_info(ctx: &EvalContext, scope: &ScopeRef, call: &Call) -> Result<Value, Error> {
    forbid_block(call)?;
    expect_arg_count(call, 2)?;
    let args = eval_args(ctx, scope, call)?;
    let label = Label::resolve(args[0].as_string()?, &ctx.current_dir, args[0].origin)?;
    let what = args[1].as_string()?;

    let text = match what {
        "name" => label.name().to_string(),
        "dir" => label.dir().to_string(),
        "target_gen_dir" => ctx.settings.target_gen_dir(label.dir()),
        "target_out_dir" => ctx.settings.target_out_dir(label.dir()),
        "root_out_dir" => ctx.settings.root_out_dir().to_string(),
        "root_gen_dir" => ctx.settings.root_gen_dir(),
        "toolchain" => label
            .toolchain()
            .cloned()
            .unwrap_or_else(|| ctx.settings.default_toolchain())
            .to_string(),
        "label_no_toolchain" => label.to_string_no_toolchain(),
        "label_with_toolchain" => {
            let tc = label
                .toolchain()
                .cloned()
                .unwrap_or_else(|| ctx.settings.default_toolchain());
            format!("{}({})", label.to_string_no_toolchain(), tc.to_string_no_toolchain())
        }
        _ => {
            return Err(Error::new(
                ErrorKind::Type,
                args[1].origin,
                format!("unknown get_label_info() selector \"{}\"", what),
            ));
        }
    };
    Ok(Value::string(text, call.span))
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestSetup;

    #[test]
    fn test_get_path_info() {
        let setup = TestSetup::new();
        setup
            .run(
                "print(get_path_info(\"src/main.cc\", \"file\"))\nprint(get_path_info(\"src/main.cc\", \"name\"))\nprint(get_path_info(\"src/main.cc\", \"extension\"))\nprint(get_path_info(\"src/main.cc\", \"dir\"))\nprint(get_path_info(\"src/main.cc\", \"abspath\"))",
            )
            .unwrap();
        assert_eq!(
            setup.output(),
            "main.cc\nmain\ncc\n//src\n//src/main.cc\n"
        );
    }

    #[test]
    fn test_get_path_info_list() {
        let setup = TestSetup::new();
        setup
            .run("print(get_path_info([ \"a/x.c\", \"b/y.h\" ], \"name\"))")
            .unwrap();
        assert_eq!(setup.output(), "[\"x\", \"y\"]\n");
    }

    #[test]
    fn test_rebase_path() {
        let setup = TestSetup::new();
        setup
            .run("print(rebase_path(\"main.cc\", \"//out/debug\"))")
            .unwrap();
        assert_eq!(setup.output(), "../../main.cc\n");
    }

    #[test]
    fn test_get_label_info() {
        let setup = TestSetup::new();
        setup
            .run(
                "print(get_label_info(\"//base:i18n\", \"name\"))\nprint(get_label_info(\"//base:i18n\", \"dir\"))\nprint(get_label_info(\"//base:i18n\", \"target_out_dir\"))\nprint(get_label_info(\"//base:i18n\", \"label_with_toolchain\"))",
            )
            .unwrap();
        assert_eq!(
            setup.output(),
            "i18n\n//base\n//out/debug/obj/base\n//base:i18n(//:default)\n"
        );
    }
}
