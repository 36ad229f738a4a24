//! Evaluation context.
//!
//! Rather than a process-wide singleton, everything a built-in needs
//! is threaded through an [`EvalContext`]: settings, build args, the
//! item collector, per-type defaults, the loader (as an [`Importer`]
//! trait object) and the scheduler handle for gen-dep bookkeeping.
//! Contexts are cheap to clone; the loader makes one per file.

use crate::args::Args;
use crate::collector::ItemCollector;
use crate::item::{TargetType, Toolchain};
use crate::scheduler::Scheduler;
use crate::scope::Scope;
use crate::settings::BuildSettings;
use gneiss_dsl::{Error, Span};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

/// What kind of file is being evaluated; several built-ins are only
/// legal in some of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A `BUILD.gns` file; the only place targets may be declared.
    BuildFile,
    /// An imported `.gnsi` file.
    Import,
    /// The buildconfig file named by the dotfile.
    BuildConfig,
    /// `--args` text, the dotfile, and other standalone fragments.
    ArgsFile,
}

/// Where `print` output goes. Production writes stdout; tests capture.
#[derive(Debug, Clone)]
pub enum OutputSink {
    Stdout,
    Buffer(Rc<RefCell<String>>),
}

impl OutputSink {
    pub fn buffer() -> Self {
        OutputSink::Buffer(Rc::new(RefCell::new(String::new())))
    }

    pub fn write(&self, text: &str) {
        match self {
            OutputSink::Stdout => print!("{}", text),
            OutputSink::Buffer(buf) => buf.borrow_mut().push_str(text),
        }
    }

    /// Captured text; empty for the stdout sink.
    pub fn captured(&self) -> String {
        match self {
            OutputSink::Stdout => String::new(),
            OutputSink::Buffer(buf) => buf.borrow().clone(),
        }
    }
}

/// The loader, seen from `import()`.
pub trait Importer {
    /// Load (once) and return the importable scope of `file`, a
    /// source-absolute path.
    fn import(&self, ctx: &EvalContext, file: &str, span: Span) -> Result<Rc<ImportedFile>, Error>;
}

/// Cached result of evaluating an importable file.
#[derive(Debug)]
pub struct ImportedFile {
    /// Detached snapshot of the file's top-level bindings and
    /// templates.
    pub scope: Scope,
}

#[derive(Clone)]
pub struct EvalContext {
    pub settings: Rc<BuildSettings>,
    pub args: Rc<Args>,
    pub scheduler: Option<Rc<Scheduler>>,
    pub importer: Option<Rc<dyn Importer>>,
    pub collector: Rc<RefCell<ItemCollector>>,
    /// `set_defaults` snapshots by target type.
    pub defaults: Rc<RefCell<IndexMap<TargetType, Scope>>>,
    /// The toolchain being built while inside a `toolchain()` block.
    pub toolchain_scratch: Rc<RefCell<Option<Toolchain>>>,
    pub sink: OutputSink,
    /// Source-absolute directory of the current file.
    pub current_dir: String,
    pub file_kind: FileKind,
}

impl EvalContext {
    /// A bare context for standalone evaluation (dotfile, --args,
    /// tests). No importer, no scheduler.
    pub fn standalone(settings: Rc<BuildSettings>, args: Rc<Args>, sink: OutputSink) -> Self {
        Self {
            settings,
            args,
            scheduler: None,
            importer: None,
            collector: Rc::new(RefCell::new(ItemCollector::new())),
            defaults: Rc::new(RefCell::new(IndexMap::new())),
            toolchain_scratch: Rc::new(RefCell::new(None)),
            sink,
            current_dir: "//".to_string(),
            file_kind: FileKind::ArgsFile,
        }
    }

    /// Same shared state, different file.
    pub fn for_file(&self, dir: impl Into<String>, kind: FileKind) -> Self {
        let mut ctx = self.clone();
        ctx.current_dir = dir.into();
        ctx.file_kind = kind;
        ctx
    }

    pub fn print(&self, text: &str) {
        self.sink.write(text);
    }

    pub fn add_gen_dependency(&self, path: PathBuf) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.add_gen_dependency(path);
        }
    }

    pub fn add_written_file(&self, path: String) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.add_written_file(path);
        }
    }
}
