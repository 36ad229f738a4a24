//! Target labels.
//!
//! A label names one target: a source-absolute directory, a target
//! name, and an optional explicit toolchain: `//base:i18n`,
//! `//base:i18n(//build/toolchain:gcc)`. Shorthands resolve against
//! the directory of the file being evaluated: `:local` is a target in
//! the current file, `sub/dir` means `//<here>/sub/dir:dir`.
//!
//! The graph layer interns labels into dense indices; within the
//! evaluator they are plain values.

use crate::paths;
use gneiss_dsl::{Error, ErrorKind, Span};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    dir: String,
    name: String,
    toolchain: Option<Box<Label>>,
}

impl Label {
    pub fn new(dir: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            toolchain: None,
        }
    }

    pub fn with_toolchain(mut self, toolchain: Label) -> Self {
        self.toolchain = Some(Box::new(toolchain));
        self
    }

    /// Parse a user-written label relative to `current_dir`.
    pub fn resolve(input: &str, current_dir: &str, span: Span) -> Result<Self, Error> {
        if input.is_empty() {
            return Err(Error::new(ErrorKind::Generator, span, "empty label"));
        }

        // Split an explicit toolchain: "//a:b(//tc:gcc)".
        let (main, toolchain) = match input.strip_suffix(')') {
            Some(rest) => {
                let open = rest.find('(').ok_or_else(|| {
                    Error::new(
                        ErrorKind::Generator,
                        span,
                        format!("unbalanced \")\" in label \"{}\"", input),
                    )
                })?;
                let tc = Label::resolve(&rest[open + 1..], current_dir, span)?;
                if tc.toolchain.is_some() {
                    return Err(Error::new(
                        ErrorKind::Generator,
                        span,
                        format!("toolchain label \"{}\" may not itself name a toolchain", input),
                    ));
                }
                (&rest[..open], Some(Box::new(tc)))
            }
            None => (input, None),
        };

        let (dir, name) = match main.find(':') {
            Some(idx) => {
                let dir_part = &main[..idx];
                let name = &main[idx + 1..];
                if name.is_empty() || name.contains([':', '/']) {
                    return Err(Error::new(
                        ErrorKind::Generator,
                        span,
                        format!("invalid target name in label \"{}\"", input),
                    ));
                }
                let dir = if dir_part.is_empty() {
                    current_dir.to_string()
                } else {
                    paths::resolve_path(dir_part, current_dir)
                };
                (dir, name.to_string())
            }
            None => {
                let dir = paths::resolve_path(main, current_dir);
                let name = paths::file_part(&dir).to_string();
                if name.is_empty() {
                    return Err(Error::new(
                        ErrorKind::Generator,
                        span,
                        format!("label \"{}\" has no target name", input),
                    ));
                }
                (dir, name)
            }
        };

        Ok(Self {
            dir,
            name,
            toolchain,
        })
    }

    pub fn dir(&self) -> &str {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn toolchain(&self) -> Option<&Label> {
        self.toolchain.as_deref()
    }

    /// The same label without its toolchain annotation.
    pub fn without_toolchain(&self) -> Label {
        Label {
            dir: self.dir.clone(),
            name: self.name.clone(),
            toolchain: None,
        }
    }

    /// `//dir:name` without any toolchain suffix.
    pub fn to_string_no_toolchain(&self) -> String {
        if self.dir == "//" {
            format!("//:{}", self.name)
        } else {
            format!("{}:{}", self.dir, self.name)
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_no_toolchain())?;
        if let Some(tc) = &self.toolchain {
            write!(f, "({})", tc.to_string_no_toolchain())?;
        }
        Ok(())
    }
}

/// A label reference as written in a build file, keeping the span of
/// the referencing string for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRef {
    pub label: Label,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::zero(0)
    }

    #[test]
    fn test_absolute_forms() {
        let l = Label::resolve("//base:i18n", "//app", span()).unwrap();
        assert_eq!(l.dir(), "//base");
        assert_eq!(l.name(), "i18n");
        assert_eq!(l.to_string(), "//base:i18n");

        let implicit = Label::resolve("//base/i18n", "//app", span()).unwrap();
        assert_eq!(implicit.to_string(), "//base/i18n:i18n");
    }

    #[test]
    fn test_relative_forms() {
        assert_eq!(
            Label::resolve(":local", "//app", span()).unwrap().to_string(),
            "//app:local"
        );
        assert_eq!(
            Label::resolve("sub", "//app", span()).unwrap().to_string(),
            "//app/sub:sub"
        );
        assert_eq!(
            Label::resolve("../lib:z", "//app", span()).unwrap().to_string(),
            "//lib:z"
        );
        assert_eq!(
            Label::resolve(":r", "//", span()).unwrap().to_string(),
            "//:r"
        );
    }

    #[test]
    fn test_toolchain_suffix() {
        let l = Label::resolve("//base:i18n(//build/toolchain:gcc)", "//", span()).unwrap();
        assert_eq!(l.to_string(), "//base:i18n(//build/toolchain:gcc)");
        assert_eq!(l.toolchain().unwrap().name(), "gcc");
        assert_eq!(l.without_toolchain().to_string(), "//base:i18n");
    }

    #[test]
    fn test_invalid_labels() {
        assert!(Label::resolve("", "//", span()).is_err());
        assert!(Label::resolve("//base:", "//", span()).is_err());
        assert!(Label::resolve("//base:a:b", "//", span()).is_err());
        assert!(Label::resolve("//base:x(//tc:a(//b:c))", "//", span()).is_err());
        assert!(Label::resolve("//", "//", span()).is_err());
    }

    #[test]
    fn test_identity() {
        let a = Label::resolve("//base:x", "//", span()).unwrap();
        let b = Label::resolve(":x", "//base", span()).unwrap();
        assert_eq!(a, b);
    }
}
