//! Label patterns, as used by `visibility` and `assert_no_deps`.
//!
//! Supported forms:
//!
//! - `//base:name`, `:name`, `sub:name` — one exact target
//! - `//base:*` — every target in one directory
//! - `//base/*` — every target in a directory and below
//! - `*` — everything
//!
//! Toolchain annotations are not part of matching; a pattern admits a
//! label in any toolchain.

use crate::label::Label;
use crate::paths;
use gneiss_dsl::{Error, Span};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelPattern {
    dir: String,
    /// None matches any name in the directory.
    name: Option<String>,
    /// Match subdirectories too.
    recursive: bool,
}

impl LabelPattern {
    /// Parse a user-written pattern relative to `current_dir`.
    pub fn parse(input: &str, current_dir: &str, span: Span) -> Result<Self, Error> {
        if input == "*" {
            return Ok(Self {
                dir: "//".to_string(),
                name: None,
                recursive: true,
            });
        }

        if let Some(prefix) = input.strip_suffix("/*") {
            let dir = if prefix.is_empty() {
                current_dir.to_string()
            } else {
                paths::resolve_path(prefix, current_dir)
            };
            return Ok(Self {
                dir,
                name: None,
                recursive: true,
            });
        }

        if let Some(idx) = input.find(':') {
            let name = &input[idx + 1..];
            if name == "*" {
                let dir_part = &input[..idx];
                let dir = if dir_part.is_empty() {
                    current_dir.to_string()
                } else {
                    paths::resolve_path(dir_part, current_dir)
                };
                return Ok(Self {
                    dir,
                    name: None,
                    recursive: false,
                });
            }
        }

        let label = Label::resolve(input, current_dir, span)?;
        Ok(Self {
            dir: label.dir().to_string(),
            name: Some(label.name().to_string()),
            recursive: false,
        })
    }

    pub fn matches(&self, label: &Label) -> bool {
        if self.recursive {
            if !paths::is_within(label.dir(), &self.dir) {
                return false;
            }
        } else if label.dir() != self.dir {
            return false;
        }
        match &self.name {
            Some(name) => label.name() == name,
            None => true,
        }
    }
}

impl fmt::Display for LabelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.recursive && self.dir == "//" && self.name.is_none() {
            return write!(f, "*");
        }
        if self.recursive {
            return write!(f, "{}/*", self.dir);
        }
        match &self.name {
            Some(name) => write!(f, "{}:{}", self.dir, name),
            None => write!(f, "{}:*", self.dir),
        }
    }
}

/// A pattern with the span it was written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRef {
    pub pattern: LabelPattern,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::zero(0)
    }

    fn label(s: &str) -> Label {
        Label::resolve(s, "//", span()).unwrap()
    }

    fn pattern(s: &str) -> LabelPattern {
        LabelPattern::parse(s, "//here", span()).unwrap()
    }

    #[test]
    fn test_exact() {
        let p = pattern("//base:x");
        assert!(p.matches(&label("//base:x")));
        assert!(!p.matches(&label("//base:y")));
        assert!(!p.matches(&label("//other:x")));
        assert_eq!(p.to_string(), "//base:x");
    }

    #[test]
    fn test_relative_resolves_against_current_dir() {
        let p = pattern(":allowed");
        assert!(p.matches(&label("//here:allowed")));
        assert!(!p.matches(&label("//there:allowed")));
    }

    #[test]
    fn test_dir_wildcard() {
        let p = pattern("//base:*");
        assert!(p.matches(&label("//base:x")));
        assert!(p.matches(&label("//base:y")));
        assert!(!p.matches(&label("//base/sub:x")));
        assert_eq!(p.to_string(), "//base:*");
    }

    #[test]
    fn test_recursive_wildcard() {
        let p = pattern("//base/*");
        assert!(p.matches(&label("//base:x")));
        assert!(p.matches(&label("//base/sub/deep:y")));
        assert!(!p.matches(&label("//based:x")));
        assert_eq!(p.to_string(), "//base/*");
    }

    #[test]
    fn test_universal() {
        let p = pattern("*");
        assert!(p.matches(&label("//anything/at/all:t")));
        assert_eq!(p.to_string(), "*");
    }

    #[test]
    fn test_toolchain_ignored() {
        let p = pattern("//base:x");
        let l = label("//base:x(//tc:gcc)");
        assert!(p.matches(&l));
    }
}
