//! On-demand file loading.
//!
//! The loader is main-thread state driving the scheduler: build files
//! are discovered from dependency labels and parsed on the worker
//! pool, while imports are loaded synchronously the moment `import()`
//! runs (so an importer always resumes after the imported file's top
//! level has completed). Every file is read and evaluated at most
//! once per run; import results are cached as detached scope
//! snapshots.
//!
//! Scope nesting per build file:
//!
//! ```text
//! buildconfig scope  ←  per-file generator variables  ←  file scope
//! ```
//!
//! The middle level carries `current_toolchain`, `target_out_dir` and
//! friends, so a file's own level holds only user bindings and import
//! snapshots stay clean.

use crate::args::Args;
use crate::collector::ItemCollector;
use crate::eval::{self, EvalContext, FileKind, ImportedFile, Importer, OutputSink};
use crate::item::{Item, TargetType, Toolchain};
use crate::paths;
use crate::scheduler::{Msg, ParseJob, ParsedFile, Scheduler};
use crate::scope::{Scope, ScopeRef};
use crate::settings::BuildSettings;
use crate::value::Value;
use gneiss_dsl::{lexer, parser, Error, ErrorKind, SourceMap, Span};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::mpsc::Receiver;
use tracing::{debug, info, trace};

/// Per-path load progress for build files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Requested,
    Loaded,
    Failed,
}

#[derive(Debug)]
enum ImportState {
    Loading,
    Done(Rc<ImportedFile>),
}

#[derive(Debug)]
pub struct Loader {
    self_ref: Weak<Loader>,
    settings: Rc<BuildSettings>,
    args: Rc<Args>,
    scheduler: Rc<Scheduler>,
    sink: OutputSink,
    source_map: RefCell<SourceMap>,
    /// Build-file states keyed by source-absolute file path.
    cache: RefCell<HashMap<String, LoadState>>,
    imports: RefCell<HashMap<String, ImportState>>,
    base_scope: RefCell<Option<ScopeRef>>,
    collector: Rc<RefCell<ItemCollector>>,
    defaults: Rc<RefCell<IndexMap<TargetType, Scope>>>,
    toolchain_scratch: Rc<RefCell<Option<Toolchain>>>,
}

impl Loader {
    pub fn new(
        settings: Rc<BuildSettings>,
        args: Rc<Args>,
        scheduler: Rc<Scheduler>,
        sink: OutputSink,
    ) -> Rc<Self> {
        Self::with_source_map(settings, args, scheduler, sink, SourceMap::new())
    }

    /// Adopt an existing source map so spans created during setup
    /// (dotfile, `--args`) render correctly from loader errors.
    pub fn with_source_map(
        settings: Rc<BuildSettings>,
        args: Rc<Args>,
        scheduler: Rc<Scheduler>,
        sink: OutputSink,
        source_map: SourceMap,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            settings,
            args,
            scheduler,
            sink,
            source_map: RefCell::new(source_map),
            cache: RefCell::new(HashMap::new()),
            imports: RefCell::new(HashMap::new()),
            base_scope: RefCell::new(None),
            collector: Rc::new(RefCell::new(ItemCollector::new())),
            defaults: Rc::new(RefCell::new(IndexMap::new())),
            toolchain_scratch: Rc::new(RefCell::new(None)),
        })
    }

    /// Drive loading to completion. On success the collector holds
    /// every committed item.
    pub fn run(&self, rx: &Receiver<Msg>) -> Result<(), Error> {
        self.load_build_config()?;

        let root_dir = paths::dir_of(&self.settings.root_build_file);
        self.request_build_file(&root_dir);
        if self.settings.has_default_toolchain() {
            let toolchain = self.settings.default_toolchain();
            self.request_build_file(toolchain.dir());
        }

        loop {
            match rx.recv() {
                Ok(Msg::FileParsed(parsed)) => {
                    if self.scheduler.is_failed() {
                        self.scheduler.dec_work();
                        continue;
                    }
                    let name = parsed.name.clone();
                    match self.on_file_parsed(parsed) {
                        Ok(()) => {
                            self.cache.borrow_mut().insert(name, LoadState::Loaded);
                        }
                        Err(err) => {
                            self.cache.borrow_mut().insert(name, LoadState::Failed);
                            self.scheduler.fail(err);
                        }
                    }
                    self.scheduler.dec_work();
                }
                Ok(Msg::Fail(err)) => return Err(err),
                Ok(Msg::Log(message)) => info!("{}", message),
                Ok(Msg::Complete) => break,
                Err(_) => break,
            }
        }

        self.args.verify_overrides_used()?;
        debug!(items = self.collector.borrow().len(), "loading complete");
        Ok(())
    }

    pub fn collector(&self) -> Rc<RefCell<ItemCollector>> {
        self.collector.clone()
    }

    /// Take the loaded items out of the loader.
    pub fn into_items(&self) -> IndexMap<crate::label::Label, Item> {
        std::mem::take(&mut *self.collector.borrow_mut()).into_items()
    }

    pub fn source_map(&self) -> std::cell::Ref<'_, SourceMap> {
        self.source_map.borrow()
    }

    /// Schedule the BUILD.gns of `dir` if it has not been requested.
    pub fn request_build_file(&self, dir: &str) {
        let file = if dir == "//" {
            "//BUILD.gns".to_string()
        } else {
            format!("{}/BUILD.gns", dir)
        };
        {
            let mut cache = self.cache.borrow_mut();
            if cache.contains_key(&file) {
                return;
            }
            cache.insert(file.clone(), LoadState::Requested);
        }

        let file_id = self.source_map.borrow_mut().reserve(file.clone());
        let fs_path = self.settings.to_fs_path(&file);
        self.scheduler.add_gen_dependency(fs_path.clone());
        trace!(file = %file, "build file requested");
        self.scheduler.schedule_parse(ParseJob {
            fs_path,
            name: file,
            dir: dir.to_string(),
            file_id,
        });
    }

    /// Evaluate a parsed build file and fan out to the directories
    /// its items reference.
    fn on_file_parsed(&self, parsed: ParsedFile) -> Result<(), Error> {
        self.source_map
            .borrow_mut()
            .install_source(parsed.file_id, parsed.source);
        let block = parsed.result?;

        trace!(file = %parsed.name, "evaluating");
        let scope = self.make_file_scope(&parsed.dir);
        let ctx = self.make_ctx(parsed.dir.clone(), FileKind::BuildFile);

        let mark = self.collector.borrow().len();
        eval::eval_block_in(&ctx, &scope, &block)?;
        scope.borrow().check_unused()?;

        let mut referenced: Vec<String> = Vec::new();
        {
            let collector = self.collector.borrow();
            for item in collector.items_since(mark) {
                collect_referenced_dirs(item, &mut referenced);
            }
        }
        for dir in referenced {
            self.request_build_file(&dir);
        }
        Ok(())
    }

    /// Evaluate the buildconfig file into the base scope all files
    /// inherit. Without a configured buildconfig the base scope only
    /// carries the generator's predefined variables.
    fn load_build_config(&self) -> Result<(), Error> {
        let root = Scope::root_ref();
        install_platform_vars(&root, &self.settings);

        if let Some(file) = self.settings.build_config_file.clone() {
            let fs_path = self.settings.to_fs_path(&file);
            let source = std::fs::read_to_string(&fs_path).map_err(|e| {
                Error::new(
                    ErrorKind::Io,
                    Span::zero(0),
                    format!("unable to read build config \"{}\": {}", file, e),
                )
            })?;
            self.scheduler.add_gen_dependency(fs_path);

            let file_id = self
                .source_map
                .borrow_mut()
                .add_file(file.clone(), source.clone());
            let tokens = lexer::lex(&source, file_id)?;
            let block = parser::parse_file(&tokens, file_id)?;

            let ctx = self.make_ctx(paths::dir_of(&file), FileKind::BuildConfig);
            eval::eval_block_in(&ctx, &root, &block)?;
            debug!(file = %file, "build config evaluated");
        }

        // Buildconfig bindings are ambient; they need not be read.
        root.borrow_mut().mark_all_used();
        *self.base_scope.borrow_mut() = Some(root);
        Ok(())
    }

    /// `buildconfig ← generator vars ← (returned) file scope`.
    fn make_file_scope(&self, dir: &str) -> ScopeRef {
        let base = self
            .base_scope
            .borrow()
            .clone()
            .expect("base scope not initialized");
        let predef = Scope::child_ref(&base);
        install_dir_vars(&predef, &self.settings, dir);
        Scope::child_ref(&predef)
    }

    fn make_ctx(&self, dir: String, kind: FileKind) -> EvalContext {
        let this = self.self_ref.upgrade().expect("loader dropped mid-run");
        EvalContext {
            settings: self.settings.clone(),
            args: self.args.clone(),
            scheduler: Some(self.scheduler.clone()),
            importer: Some(this as Rc<dyn Importer>),
            collector: self.collector.clone(),
            defaults: self.defaults.clone(),
            toolchain_scratch: self.toolchain_scratch.clone(),
            sink: self.sink.clone(),
            current_dir: dir,
            file_kind: kind,
        }
    }

    /// Synchronous import path: read, parse and evaluate now, on the
    /// main thread.
    fn load_import(&self, file: &str, span: Span) -> Result<Rc<ImportedFile>, Error> {
        let fs_path = self.settings.to_fs_path(file);
        let source = std::fs::read_to_string(&fs_path).map_err(|e| {
            Error::new(
                ErrorKind::Io,
                span,
                format!("unable to read import \"{}\": {}", file, e),
            )
        })?;
        self.scheduler.add_gen_dependency(fs_path);

        let file_id = self
            .source_map
            .borrow_mut()
            .add_file(file.to_string(), source.clone());
        let tokens = lexer::lex(&source, file_id)?;
        let block = parser::parse_file(&tokens, file_id)?;

        let scope = self.make_file_scope(&paths::dir_of(file));
        let ctx = self.make_ctx(paths::dir_of(file), FileKind::Import);
        eval::eval_block_in(&ctx, &scope, &block)?;

        // The file's own level holds exactly its exports; consuming
        // them is the importer's business, so no unused check here.
        let snapshot = scope.borrow().clone_detached();
        trace!(file = %file, "import evaluated");
        Ok(Rc::new(ImportedFile { scope: snapshot }))
    }
}

impl Importer for Loader {
    fn import(
        &self,
        _ctx: &EvalContext,
        file: &str,
        span: Span,
    ) -> Result<Rc<ImportedFile>, Error> {
        match self.imports.borrow().get(file) {
            Some(ImportState::Done(cached)) => return Ok(cached.clone()),
            Some(ImportState::Loading) => {
                return Err(Error::new(
                    ErrorKind::Dependency,
                    span,
                    format!("circular import of \"{}\"", file),
                ));
            }
            None => {}
        }
        self.imports
            .borrow_mut()
            .insert(file.to_string(), ImportState::Loading);

        match self.load_import(file, span) {
            Ok(loaded) => {
                self.imports
                    .borrow_mut()
                    .insert(file.to_string(), ImportState::Done(loaded.clone()));
                Ok(loaded)
            }
            Err(err) => {
                self.imports.borrow_mut().remove(file);
                Err(err)
            }
        }
    }
}

fn install_platform_vars(scope: &ScopeRef, settings: &BuildSettings) {
    let span = Span::zero(0);
    let os = match std::env::consts::OS {
        "macos" => "mac",
        "windows" => "win",
        other => other,
    };
    let cpu = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        other => other,
    };
    let mut s = scope.borrow_mut();
    for name in ["host_os", "current_os", "target_os"] {
        s.set_exempt(name, Value::string(os, span), span);
    }
    for name in ["host_cpu", "current_cpu", "target_cpu"] {
        s.set_exempt(name, Value::string(cpu, span), span);
    }
    s.set_exempt(
        "root_build_dir",
        Value::string(settings.build_dir.clone(), span),
        span,
    );
    s.set_exempt(
        "root_out_dir",
        Value::string(settings.root_out_dir(), span),
        span,
    );
    s.set_exempt(
        "root_gen_dir",
        Value::string(settings.root_gen_dir(), span),
        span,
    );
}

fn install_dir_vars(scope: &ScopeRef, settings: &BuildSettings, dir: &str) {
    let span = Span::zero(0);
    let mut s = scope.borrow_mut();
    let toolchain = settings.default_toolchain().to_string();
    s.set_exempt(
        "current_toolchain",
        Value::string(toolchain.clone(), span),
        span,
    );
    s.set_exempt("default_toolchain", Value::string(toolchain, span), span);
    s.set_exempt(
        "target_out_dir",
        Value::string(settings.target_out_dir(dir), span),
        span,
    );
    s.set_exempt(
        "target_gen_dir",
        Value::string(settings.target_gen_dir(dir), span),
        span,
    );
}

fn collect_referenced_dirs(item: &Item, out: &mut Vec<String>) {
    match item {
        Item::Target(target) => {
            for dep in target.all_dep_refs() {
                out.push(dep.label.dir().to_string());
            }
            for config in target
                .configs
                .iter()
                .chain(target.public_configs.iter())
                .chain(target.all_dependent_configs.iter())
            {
                out.push(config.label.dir().to_string());
            }
        }
        Item::Config(config) => {
            for nested in &config.configs {
                out.push(nested.label.dir().to_string());
            }
        }
        Item::Toolchain(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn run_tree(root: &Path) -> Result<(Rc<Loader>, OutputSink), Error> {
        let settings = Rc::new(BuildSettings::new(root.to_path_buf(), "//out"));
        let args = Rc::new(Args::new());
        let (scheduler, rx) = Scheduler::new();
        let sink = OutputSink::buffer();
        let loader = Loader::new(settings, args, Rc::new(scheduler), sink.clone());
        loader.run(&rx)?;
        Ok((loader, sink))
    }

    #[test]
    fn test_load_root_and_dep_directories() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "BUILD.gns",
            "group(\"root\") {\n  deps = [ \"//lib:lib\" ]\n}\n",
        );
        write(dir.path(), "lib/BUILD.gns", "source_set(\"lib\") {\n}\n");

        let (loader, _) = run_tree(dir.path()).unwrap();
        let collector = loader.collector();
        let collector = collector.borrow();
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn test_each_file_loaded_once() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "BUILD.gns",
            "group(\"a\") {\n  deps = [ \"//lib:lib\" ]\n}\ngroup(\"b\") {\n  deps = [ \"//lib:lib\" ]\n}\n",
        );
        write(
            dir.path(),
            "lib/BUILD.gns",
            "print(\"lib evaluated\")\nsource_set(\"lib\") {\n}\n",
        );

        let (_, sink) = run_tree(dir.path()).unwrap();
        assert_eq!(sink.captured().matches("lib evaluated").count(), 1);
    }

    #[test]
    fn test_import_bindings_and_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "build/common.gnsi", "common_flag = 7\n");
        write(
            dir.path(),
            "BUILD.gns",
            "import(\"//build/common.gnsi\")\nimport(\"//build/common.gnsi\")\nprint(common_flag)\n",
        );

        let (_, sink) = run_tree(dir.path()).unwrap();
        assert_eq!(sink.captured(), "7\n");
    }

    #[test]
    fn test_import_happens_before_importer_resumes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one.gnsi", "print(\"one\")\nv = 1\n");
        write(
            dir.path(),
            "BUILD.gns",
            "import(\"//one.gnsi\")\nprint(\"root\", v)\n",
        );

        let (_, sink) = run_tree(dir.path()).unwrap();
        assert_eq!(sink.captured(), "one\nroot 1\n");
    }

    #[test]
    fn test_transitive_import_chain() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.gnsi", "import(\"//b.gnsi\")\na_val = b_val + 1\n");
        write(dir.path(), "b.gnsi", "b_val = 1\n");
        write(
            dir.path(),
            "BUILD.gns",
            "import(\"//a.gnsi\")\nprint(a_val, b_val)\n",
        );

        let (_, sink) = run_tree(dir.path()).unwrap();
        assert_eq!(sink.captured(), "2 1\n");
    }

    #[test]
    fn test_circular_import_detected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.gnsi", "import(\"//b.gnsi\")\n");
        write(dir.path(), "b.gnsi", "import(\"//a.gnsi\")\n");
        write(dir.path(), "BUILD.gns", "import(\"//a.gnsi\")\n");

        let err = run_tree(dir.path()).unwrap_err();
        assert!(err.message.contains("circular import"));
    }

    #[test]
    fn test_buildconfig_feeds_every_file() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "build/BUILDCONFIG.gns", "shared_setting = \"on\"\n");
        write(
            dir.path(),
            "BUILD.gns",
            "print(shared_setting)\ngroup(\"root\") {\n  deps = [ \"//lib:lib\" ]\n}\n",
        );
        write(dir.path(), "lib/BUILD.gns", "print(shared_setting)\nsource_set(\"lib\") {\n}\n");

        let mut raw = BuildSettings::new(dir.path().to_path_buf(), "//out");
        raw.build_config_file = Some("//build/BUILDCONFIG.gns".to_string());
        let settings = Rc::new(raw);

        let args = Rc::new(Args::new());
        let (scheduler, rx) = Scheduler::new();
        let sink = OutputSink::buffer();
        let loader = Loader::new(settings, args, Rc::new(scheduler), sink.clone());
        loader.run(&rx).unwrap();
        assert_eq!(sink.captured().matches("on").count(), 2);
    }

    #[test]
    fn test_missing_build_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "BUILD.gns",
            "group(\"root\") {\n  deps = [ \"//missing:x\" ]\n}\n",
        );
        let err = run_tree(dir.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }

    #[test]
    fn test_parse_error_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "BUILD.gns", "group(\"root\" {\n}\n");
        let err = run_tree(dir.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }
}
