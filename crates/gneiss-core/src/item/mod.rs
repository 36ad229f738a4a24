//! Committed build items.
//!
//! Evaluating build files produces items: targets, configs and
//! toolchains. Items are immutable once committed to the collector;
//! only the resolver-computed fields on targets are filled in later.

pub mod config;
pub mod target;
pub mod toolchain;

pub use config::{Config, ConfigValues};
pub use target::{Target, TargetType};
pub use toolchain::{Tool, Toolchain};

use crate::label::{Label, LabelRef};
use crate::paths;
use crate::pattern::{LabelPattern, PatternRef};
use crate::scope::ScopeRef;
use crate::value::Value;
use gneiss_dsl::{Error, Span};

#[derive(Debug)]
pub enum Item {
    Target(Target),
    Config(Config),
    Toolchain(Toolchain),
}

impl Item {
    pub fn label(&self) -> &Label {
        match self {
            Item::Target(t) => &t.label,
            Item::Config(c) => &c.label,
            Item::Toolchain(t) => &t.label,
        }
    }

    pub fn decl_span(&self) -> Span {
        match self {
            Item::Target(t) => t.decl_span,
            Item::Config(c) => c.decl_span,
            Item::Toolchain(t) => t.decl_span,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Item::Target(_) => "target",
            Item::Config(_) => "config",
            Item::Toolchain(_) => "toolchain",
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Item::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&Config> {
        match self {
            Item::Config(c) => Some(c),
            _ => None,
        }
    }
}

// --- shared scope-extraction helpers ---
//
// Target and config generators read recognized variables out of the
// declaration scope. Reads are direct-level only (the declaration
// scope plus copied-in defaults) and mark the binding used; whatever
// is left unconsumed trips the scope's unused check afterwards.

pub(crate) fn take_value(scope: &ScopeRef, name: &str) -> Option<Value> {
    let mut s = scope.borrow_mut();
    if s.has_direct(name) {
        s.mark_used_direct(name);
        s.get_direct(name)
    } else {
        None
    }
}

pub(crate) fn take_string(scope: &ScopeRef, name: &str) -> Result<Option<String>, Error> {
    match take_value(scope, name) {
        Some(v) => Ok(Some(v.as_string()?.to_string())),
        None => Ok(None),
    }
}

pub(crate) fn take_bool(scope: &ScopeRef, name: &str) -> Result<Option<bool>, Error> {
    match take_value(scope, name) {
        Some(v) => Ok(Some(v.as_bool()?)),
        None => Ok(None),
    }
}

pub(crate) fn take_string_list(scope: &ScopeRef, name: &str) -> Result<Option<Vec<String>>, Error> {
    match take_value(scope, name) {
        Some(v) => Ok(Some(v.as_string_list()?)),
        None => Ok(None),
    }
}

/// String list resolved against the declaring directory.
pub(crate) fn take_path_list(
    scope: &ScopeRef,
    name: &str,
    current_dir: &str,
) -> Result<Option<Vec<String>>, Error> {
    Ok(take_string_list(scope, name)?.map(|items| {
        items
            .iter()
            .map(|p| paths::resolve_path(p, current_dir))
            .collect()
    }))
}

pub(crate) fn take_label_list(
    scope: &ScopeRef,
    name: &str,
    current_dir: &str,
) -> Result<Option<Vec<LabelRef>>, Error> {
    match take_value(scope, name) {
        Some(v) => {
            let mut out = Vec::new();
            for item in v.as_list()? {
                let text = item.as_string()?;
                out.push(LabelRef {
                    label: Label::resolve(text, current_dir, item.origin)?,
                    span: item.origin,
                });
            }
            Ok(Some(out))
        }
        None => Ok(None),
    }
}

pub(crate) fn take_pattern_list(
    scope: &ScopeRef,
    name: &str,
    current_dir: &str,
) -> Result<Option<Vec<PatternRef>>, Error> {
    match take_value(scope, name) {
        Some(v) => {
            let mut out = Vec::new();
            for item in v.as_list()? {
                let text = item.as_string()?;
                out.push(PatternRef {
                    pattern: LabelPattern::parse(text, current_dir, item.origin)?,
                    span: item.origin,
                });
            }
            Ok(Some(out))
        }
        None => Ok(None),
    }
}
