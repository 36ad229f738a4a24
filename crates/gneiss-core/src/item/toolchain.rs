//! Toolchains: named bundles of tool definitions.
//!
//! A `toolchain("name") { tool("cc") { ... } }` block declares the
//! commands the Ninja writer emits as rules. Tool commands use
//! `{{...}}` substitutions; the writer expands them per target (and
//! per source for compile tools).

use crate::label::Label;
use crate::substitution::SubstitutedString;
use gneiss_dsl::Span;
use indexmap::IndexMap;

/// Tool names a toolchain may define.
pub const TOOL_NAMES: &[&str] = &[
    "cc", "cxx", "asm", "alink", "solink", "link", "stamp", "copy",
];

#[derive(Debug)]
pub struct Tool {
    pub name: String,
    pub decl_span: Span,
    pub command: SubstitutedString,
    pub description: Option<String>,
    /// Output patterns, expanded per target.
    pub outputs: Vec<SubstitutedString>,
    pub depfile: Option<String>,
}

#[derive(Debug)]
pub struct Toolchain {
    pub label: Label,
    pub decl_span: Span,
    pub tools: IndexMap<String, Tool>,
}

impl Toolchain {
    pub fn new(label: Label, decl_span: Span) -> Self {
        Self {
            label,
            decl_span,
            tools: IndexMap::new(),
        }
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Tool used to compile one source file, by extension.
    pub fn compile_tool_for(&self, extension: &str) -> Option<&Tool> {
        let name = match extension {
            "c" => "cc",
            "cc" | "cpp" | "cxx" => "cxx",
            "s" | "S" | "asm" => "asm",
            _ => return None,
        };
        self.tool(name)
    }

    /// Tool used to link a target of the given kind.
    pub fn link_tool_for(&self, target_type: super::TargetType) -> Option<&Tool> {
        use super::TargetType as T;
        let name = match target_type {
            T::Executable => "link",
            T::SharedLibrary | T::LoadableModule => "solink",
            T::StaticLibrary => "alink",
            _ => return None,
        };
        self.tool(name)
    }
}
