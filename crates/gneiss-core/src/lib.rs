//! Core of the gneiss meta-build generator.
//!
//! This crate turns parsed `BUILD.gns` files into a resolved target
//! graph:
//!
//! - `value` / `scope` — the dynamically-typed value tree and lexical
//!   environments with unused-binding tracking
//! - `eval` + `functions` — the tree-walking evaluator and every
//!   built-in function, including the target-declaring ones
//! - `template` — user-defined templates (closures over their
//!   defining scope)
//! - `label` / `pattern` — target labels and label patterns
//! - `item` — committed build items: targets, configs, toolchains
//! - `args` — `declare_args` bookkeeping and override checking
//! - `scheduler` / `loader` — the parse worker pool, main-thread
//!   event loop and on-demand file loading
//! - `graph` — post-load resolution: label interning, cycle
//!   detection, config/lib propagation, visibility and assertions
//!
//! The Ninja serialization lives in `gneiss-ninja`; the CLI in
//! `gneiss-gen`.

pub mod args;
pub mod collector;
pub mod eval;
pub mod functions;
pub mod graph;
pub mod item;
pub mod label;
pub mod loader;
pub mod paths;
pub mod pattern;
pub mod scheduler;
pub mod scope;
pub mod settings;
pub mod substitution;
pub mod template;
pub mod test_support;
pub mod value;

pub use eval::context::{EvalContext, FileKind, OutputSink};
pub use label::Label;
pub use scope::{Scope, ScopeRef};
pub use settings::BuildSettings;
pub use value::{Value, ValueKind};
