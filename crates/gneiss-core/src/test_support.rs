//! In-memory evaluation harness for tests.
//!
//! Mirrors how the loader treats one build file: evaluate the source
//! against a fresh scope, then run the unused-binding check. Output
//! is captured, and the collector is shared across `run` calls so
//! multi-snippet tests can build up a graph.

use crate::args::Args;
use crate::collector::ItemCollector;
use crate::eval::{self, EvalContext, FileKind, OutputSink};
use crate::scope::Scope;
use crate::settings::BuildSettings;
use crate::value::Value;
use gneiss_dsl::{lexer, parser, Error};
use indexmap::IndexMap;
use std::cell::Ref;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct TestSetup {
    pub settings: Rc<BuildSettings>,
    pub args: Rc<Args>,
    ctx: EvalContext,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_source_root(PathBuf::from("/nonexistent"))
    }

    pub fn with_source_root(source_root: PathBuf) -> Self {
        Self::build(source_root, Args::new())
    }

    /// A setup whose source root is a fresh scratch directory, for
    /// tests exercising `read_file`/`write_file`.
    pub fn with_tempdir() -> Self {
        Self::with_source_root(scratch_dir())
    }

    /// Overrides given as `(name, gns_literal)` pairs.
    pub fn with_arg_overrides(pairs: &[(&str, &str)]) -> Self {
        let bootstrap = EvalContext::standalone(
            Rc::new(BuildSettings::new(
                PathBuf::from("/nonexistent"),
                "//out/debug",
            )),
            Rc::new(Args::new()),
            OutputSink::buffer(),
        );
        let mut overrides = IndexMap::new();
        for (name, text) in pairs {
            let tokens = lexer::lex(text, 0).expect("bad override literal");
            let expr = parser::parse_expression(&tokens, 0).expect("bad override literal");
            let scratch = Scope::detached_ref();
            let value: Value =
                eval::eval_expr(&bootstrap, &scratch, &expr).expect("bad override literal");
            overrides.insert((*name).to_string(), value);
        }
        Self::build(PathBuf::from("/nonexistent"), Args::with_overrides(overrides))
    }

    fn build(source_root: PathBuf, args: Args) -> Self {
        let settings = Rc::new(BuildSettings::new(source_root, "//out/debug"));
        let args = Rc::new(args);
        let mut ctx =
            EvalContext::standalone(settings.clone(), args.clone(), OutputSink::buffer());
        ctx.file_kind = FileKind::BuildFile;
        Self {
            settings,
            args,
            ctx,
        }
    }

    /// Evaluate one build-file worth of source, unused check included.
    pub fn run(&self, source: &str) -> Result<(), Error> {
        let tokens = lexer::lex(source, 0)?;
        let block = parser::parse_file(&tokens, 0)?;
        let scope = Scope::root_ref();
        eval::eval_block_in(&self.ctx, &scope, &block)?;
        let result = scope.borrow().check_unused();
        result
    }

    /// Everything printed so far.
    pub fn output(&self) -> String {
        self.ctx.sink.captured()
    }

    pub fn context(&self) -> EvalContext {
        self.ctx.clone()
    }

    pub fn collector(&self) -> Ref<'_, ItemCollector> {
        self.ctx.collector.borrow()
    }
}

impl Default for TestSetup {
    fn default() -> Self {
        Self::new()
    }
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A unique writable directory under the system temp dir.
pub fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "gneiss-test-{}-{}",
        std::process::id(),
        SCRATCH_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).expect("unable to create scratch dir");
    dir
}
