//! `{{...}}` substitution patterns.
//!
//! Tool commands and the `outputs` of actions and copies are written
//! with substitution patterns that the resolver and the Ninja writer
//! expand per target (and, for `action_foreach` and `copy`, per
//! source). Regular `$var` string interpolation happens earlier, at
//! evaluation time; by the time a string gets here only `{{...}}`
//! remains.

use gneiss_dsl::{Error, ErrorKind, Span};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstitutionPattern {
    // Per-source (action_foreach, copy, compile tools)
    Source,
    SourceNamePart,
    SourceFilePart,
    SourceDir,
    SourceGenDir,
    SourceOutDir,
    // Per-target
    Output,
    TargetName,
    TargetOutDir,
    TargetGenDir,
    RootOutDir,
    RootGenDir,
    // Tool-command expansions
    Cflags,
    CflagsC,
    CflagsCc,
    Defines,
    IncludeDirs,
    Ldflags,
    Libs,
    Inputs,
}

impl SubstitutionPattern {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "source" => Self::Source,
            "source_name_part" => Self::SourceNamePart,
            "source_file_part" => Self::SourceFilePart,
            "source_dir" => Self::SourceDir,
            "source_gen_dir" => Self::SourceGenDir,
            "source_out_dir" => Self::SourceOutDir,
            "output" => Self::Output,
            "target_name" => Self::TargetName,
            "target_out_dir" => Self::TargetOutDir,
            "target_gen_dir" => Self::TargetGenDir,
            "root_out_dir" => Self::RootOutDir,
            "root_gen_dir" => Self::RootGenDir,
            "cflags" => Self::Cflags,
            "cflags_c" => Self::CflagsC,
            "cflags_cc" => Self::CflagsCc,
            "defines" => Self::Defines,
            "include_dirs" => Self::IncludeDirs,
            "ldflags" => Self::Ldflags,
            "libs" => Self::Libs,
            "inputs" => Self::Inputs,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::SourceNamePart => "source_name_part",
            Self::SourceFilePart => "source_file_part",
            Self::SourceDir => "source_dir",
            Self::SourceGenDir => "source_gen_dir",
            Self::SourceOutDir => "source_out_dir",
            Self::Output => "output",
            Self::TargetName => "target_name",
            Self::TargetOutDir => "target_out_dir",
            Self::TargetGenDir => "target_gen_dir",
            Self::RootOutDir => "root_out_dir",
            Self::RootGenDir => "root_gen_dir",
            Self::Cflags => "cflags",
            Self::CflagsC => "cflags_c",
            Self::CflagsCc => "cflags_cc",
            Self::Defines => "defines",
            Self::IncludeDirs => "include_dirs",
            Self::Ldflags => "ldflags",
            Self::Libs => "libs",
            Self::Inputs => "inputs",
        }
    }

    /// Does this pattern vary per source file?
    pub fn is_per_source(self) -> bool {
        matches!(
            self,
            Self::Source
                | Self::SourceNamePart
                | Self::SourceFilePart
                | Self::SourceDir
                | Self::SourceGenDir
                | Self::SourceOutDir
        )
    }
}

impl fmt::Display for SubstitutionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{{{}}}}}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubstPiece {
    Literal(String),
    Pattern(SubstitutionPattern),
}

/// A string parsed into literal text and substitution patterns.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutedString {
    pub pieces: Vec<SubstPiece>,
}

impl SubstitutedString {
    pub fn parse(input: &str, span: Span) -> Result<Self, Error> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(open) = rest.find("{{") {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| {
                Error::new(
                    ErrorKind::Generator,
                    span,
                    format!("unterminated \"{{{{\" in \"{}\"", input),
                )
            })?;
            let name = &after[..close];
            let pattern = SubstitutionPattern::parse(name).ok_or_else(|| {
                Error::new(
                    ErrorKind::Generator,
                    span,
                    format!("unknown substitution pattern \"{{{{{}}}}}\"", name),
                )
            })?;
            if !literal.is_empty() {
                pieces.push(SubstPiece::Literal(std::mem::take(&mut literal)));
            }
            pieces.push(SubstPiece::Pattern(pattern));
            rest = &after[close + 2..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            pieces.push(SubstPiece::Literal(literal));
        }

        Ok(Self { pieces })
    }

    pub fn uses_per_source(&self) -> bool {
        self.pieces.iter().any(|p| match p {
            SubstPiece::Pattern(pattern) => pattern.is_per_source(),
            SubstPiece::Literal(_) => false,
        })
    }

    /// Expand with `lookup` supplying the text of each pattern.
    /// Unsupplied patterns are an error at `span`.
    pub fn expand(
        &self,
        span: Span,
        mut lookup: impl FnMut(SubstitutionPattern) -> Option<String>,
    ) -> Result<String, Error> {
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                SubstPiece::Literal(text) => out.push_str(text),
                SubstPiece::Pattern(pattern) => match lookup(*pattern) {
                    Some(text) => out.push_str(&text),
                    None => {
                        return Err(Error::new(
                            ErrorKind::Generator,
                            span,
                            format!("substitution {} is not valid here", pattern),
                        ));
                    }
                },
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::zero(0)
    }

    #[test]
    fn test_parse_and_expand() {
        let s = SubstitutedString::parse("{{source_name_part}}.o", span()).unwrap();
        assert!(s.uses_per_source());
        let expanded = s
            .expand(span(), |p| match p {
                SubstitutionPattern::SourceNamePart => Some("main".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(expanded, "main.o");
    }

    #[test]
    fn test_literal_only() {
        let s = SubstitutedString::parse("plain.txt", span()).unwrap();
        assert!(!s.uses_per_source());
        assert_eq!(s.expand(span(), |_| None).unwrap(), "plain.txt");
    }

    #[test]
    fn test_unknown_pattern() {
        let err = SubstitutedString::parse("{{bogus}}", span()).unwrap_err();
        assert!(err.message.contains("bogus"));
    }

    #[test]
    fn test_unterminated() {
        assert!(SubstitutedString::parse("a{{source", span()).is_err());
    }

    #[test]
    fn test_missing_supply_is_error() {
        let s = SubstitutedString::parse("{{source}}", span()).unwrap();
        assert!(s.expand(span(), |_| None).is_err());
    }

    #[test]
    fn test_multiple_patterns() {
        let s =
            SubstitutedString::parse("{{target_out_dir}}/{{target_name}}.stamp", span()).unwrap();
        let expanded = s
            .expand(span(), |p| match p {
                SubstitutionPattern::TargetOutDir => Some("//out/obj/a".to_string()),
                SubstitutionPattern::TargetName => Some("t".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(expanded, "//out/obj/a/t.stamp");
    }
}
