//! Configs: named bundles of compile and link flags.

use super::{take_label_list, take_pattern_list, take_path_list, take_string_list};
use crate::label::{Label, LabelRef};
use crate::pattern::PatternRef;
use crate::scope::ScopeRef;
use gneiss_dsl::{Error, Span};

/// The flag lists a config (or a target directly) can carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigValues {
    pub cflags: Vec<String>,
    pub cflags_c: Vec<String>,
    pub cflags_cc: Vec<String>,
    pub defines: Vec<String>,
    pub include_dirs: Vec<String>,
    pub ldflags: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub libs: Vec<String>,
    pub frameworks: Vec<String>,
}

impl ConfigValues {
    pub fn is_empty(&self) -> bool {
        self.cflags.is_empty()
            && self.cflags_c.is_empty()
            && self.cflags_cc.is_empty()
            && self.defines.is_empty()
            && self.include_dirs.is_empty()
            && self.ldflags.is_empty()
            && self.lib_dirs.is_empty()
            && self.libs.is_empty()
            && self.frameworks.is_empty()
    }

    /// Append another bundle, preserving order.
    pub fn append(&mut self, other: &ConfigValues) {
        self.cflags.extend(other.cflags.iter().cloned());
        self.cflags_c.extend(other.cflags_c.iter().cloned());
        self.cflags_cc.extend(other.cflags_cc.iter().cloned());
        self.defines.extend(other.defines.iter().cloned());
        self.include_dirs.extend(other.include_dirs.iter().cloned());
        self.ldflags.extend(other.ldflags.iter().cloned());
        self.lib_dirs.extend(other.lib_dirs.iter().cloned());
        self.libs.extend(other.libs.iter().cloned());
        self.frameworks.extend(other.frameworks.iter().cloned());
    }

    /// Read the flag variables out of a declaration scope.
    /// `include_dirs` and `lib_dirs` are resolved against the
    /// declaring directory; the rest are passed through.
    pub fn extract(scope: &ScopeRef, current_dir: &str) -> Result<Self, Error> {
        Ok(Self {
            cflags: take_string_list(scope, "cflags")?.unwrap_or_default(),
            cflags_c: take_string_list(scope, "cflags_c")?.unwrap_or_default(),
            cflags_cc: take_string_list(scope, "cflags_cc")?.unwrap_or_default(),
            defines: take_string_list(scope, "defines")?.unwrap_or_default(),
            include_dirs: take_path_list(scope, "include_dirs", current_dir)?.unwrap_or_default(),
            ldflags: take_string_list(scope, "ldflags")?.unwrap_or_default(),
            lib_dirs: take_path_list(scope, "lib_dirs", current_dir)?.unwrap_or_default(),
            libs: take_string_list(scope, "libs")?.unwrap_or_default(),
            frameworks: take_string_list(scope, "frameworks")?.unwrap_or_default(),
        })
    }
}

/// A committed `config("name") { ... }`.
#[derive(Debug)]
pub struct Config {
    pub label: Label,
    pub decl_span: Span,
    pub values: ConfigValues,
    /// Nested configs, flattened during resolution.
    pub configs: Vec<LabelRef>,
    pub visibility: Option<Vec<PatternRef>>,
}

impl Config {
    pub fn from_scope(
        scope: &ScopeRef,
        label: Label,
        current_dir: &str,
        decl_span: Span,
    ) -> Result<Self, Error> {
        Ok(Self {
            label,
            decl_span,
            values: ConfigValues::extract(scope, current_dir)?,
            configs: take_label_list(scope, "configs", current_dir)?.unwrap_or_default(),
            visibility: take_pattern_list(scope, "visibility", current_dir)?,
        })
    }
}
