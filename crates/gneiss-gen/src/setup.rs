//! Run setup: locate the source root, evaluate the dotfile, parse
//! `--args`, and produce the settings the loader runs with.
//!
//! The dotfile (`.gneiss` at the project root) is itself written in
//! the GNS language. Recognized bindings:
//!
//! - `buildconfig` (required) — the build configuration file
//! - `root` (optional) — directory containing the root BUILD.gns
//! - `script_executable` (optional) — interpreter for `exec_script`

use gneiss_core::args::{self, Args};
use gneiss_core::eval::{self, EvalContext, OutputSink};
use gneiss_core::paths;
use gneiss_core::scope::Scope;
use gneiss_core::settings::BuildSettings;
use gneiss_dsl::{lexer, parser, Error, ErrorKind, SourceMap, Span};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug)]
pub struct Setup {
    pub settings: Rc<BuildSettings>,
    pub args: Rc<Args>,
    /// Spans created during setup live here; handed to the loader.
    pub source_map: SourceMap,
}

pub struct SetupOptions {
    pub out_dir: String,
    pub args_text: Option<String>,
    pub root: Option<PathBuf>,
    pub dotfile: Option<PathBuf>,
    pub script_executable: Option<PathBuf>,
}

pub fn discover(options: SetupOptions) -> Result<Setup, (Error, SourceMap)> {
    let mut source_map = SourceMap::new();
    match discover_inner(options, &mut source_map) {
        Ok(setup) => Ok(setup),
        Err(err) => Err((err, source_map)),
    }
}

fn discover_inner(options: SetupOptions, source_map: &mut SourceMap) -> Result<Setup, Error> {
    let (source_root, dotfile_path) = locate_root(&options)?;
    debug!(root = %source_root.display(), "source root located");

    let build_dir = normalize_build_dir(&options.out_dir)?;
    let provisional = Rc::new(BuildSettings::new(source_root.clone(), build_dir.clone()));

    // Evaluate the dotfile.
    let dotfile_text = std::fs::read_to_string(&dotfile_path).map_err(|e| {
        Error::new(
            ErrorKind::Io,
            Span::zero(0),
            format!("unable to read dotfile \"{}\": {}", dotfile_path.display(), e),
        )
    })?;
    let file_id = source_map.add_file("//.gneiss", dotfile_text.clone());
    let tokens = lexer::lex(&dotfile_text, file_id)?;
    let block = parser::parse_file(&tokens, file_id)?;

    let ctx = EvalContext::standalone(
        provisional.clone(),
        Rc::new(Args::new()),
        OutputSink::Stdout,
    );
    let scope = Scope::root_ref();
    eval::eval_block_in(&ctx, &scope, &block)?;

    let (build_config, root_dir, dot_script_exe) = {
        let s = scope.borrow();
        let build_config = s
            .get_direct("buildconfig")
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Generator,
                    Span::zero(file_id),
                    "the dotfile must set \"buildconfig\"",
                )
            })?
            .as_string()?
            .to_string();
        let root_dir = match s.get_direct("root") {
            Some(v) => Some(v.as_string()?.to_string()),
            None => None,
        };
        let script = match s.get_direct("script_executable") {
            Some(v) => Some(PathBuf::from(v.as_string()?)),
            None => None,
        };
        (build_config, root_dir, script)
    };
    scope.borrow_mut().mark_all_used();

    let mut settings = BuildSettings::new(source_root, build_dir);
    settings.build_config_file = Some(paths::resolve_path(&build_config, "//"));
    if let Some(root_dir) = root_dir {
        let dir = paths::resolve_path(&root_dir, "//");
        settings.root_build_file = if dir == "//" {
            "//BUILD.gns".to_string()
        } else {
            format!("{}/BUILD.gns", dir)
        };
    }
    settings.script_executable = options.script_executable.or(dot_script_exe);
    let settings = Rc::new(settings);

    // Parse --args overrides.
    let args = match &options.args_text {
        Some(text) => {
            let overrides = args::parse_arg_overrides(settings.clone(), text, source_map)?;
            Args::with_overrides(overrides)
        }
        None => Args::new(),
    };

    Ok(Setup {
        settings,
        args: Rc::new(args),
        source_map: std::mem::take(source_map),
    })
}

/// Find the source root: `--root` wins; otherwise walk upward from
/// the current directory looking for the dotfile.
fn locate_root(options: &SetupOptions) -> Result<(PathBuf, PathBuf), Error> {
    if let Some(root) = &options.root {
        let dotfile = options
            .dotfile
            .clone()
            .unwrap_or_else(|| root.join(".gneiss"));
        if !dotfile.exists() {
            return Err(Error::new(
                ErrorKind::Io,
                Span::zero(0),
                format!("no dotfile at \"{}\"", dotfile.display()),
            ));
        }
        return Ok((root.clone(), dotfile));
    }

    let cwd = std::env::current_dir().map_err(|e| {
        Error::new(ErrorKind::Io, Span::zero(0), format!("unable to read cwd: {}", e))
    })?;
    let mut dir: &Path = &cwd;
    loop {
        let candidate = dir.join(".gneiss");
        if candidate.exists() {
            return Ok((dir.to_path_buf(), candidate));
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => {
                return Err(Error::new(
                    ErrorKind::Io,
                    Span::zero(0),
                    "no .gneiss dotfile found in the current directory or any parent",
                )
                .with_note("run inside a gneiss project or pass --root"));
            }
        }
    }
}

/// The out dir argument is relative to the source root
/// (`out/debug`), or already source-absolute (`//out/debug`).
fn normalize_build_dir(out_dir: &str) -> Result<String, Error> {
    let normalized = paths::resolve_path(out_dir, "//");
    if normalized == "//" {
        return Err(Error::new(
            ErrorKind::Generator,
            Span::zero(0),
            "the build directory may not be the source root",
        ));
    }
    Ok(normalized)
}
