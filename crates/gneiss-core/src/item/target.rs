//! Target records and their construction from declaration scopes.

use super::config::ConfigValues;
use super::{
    take_bool, take_label_list, take_path_list, take_pattern_list, take_string, take_string_list,
};
use crate::label::{Label, LabelRef};
use crate::paths;
use crate::pattern::PatternRef;
use crate::scope::ScopeRef;
use crate::settings::BuildSettings;
use crate::substitution::{SubstitutedString, SubstitutionPattern};
use gneiss_dsl::{Error, ErrorKind, Span};

/// The closed set of target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    Group,
    Executable,
    StaticLibrary,
    SharedLibrary,
    LoadableModule,
    SourceSet,
    Action,
    ActionForeach,
    BundleData,
    Copy,
}

impl TargetType {
    pub fn from_function_name(name: &str) -> Option<Self> {
        Some(match name {
            "group" => Self::Group,
            "executable" => Self::Executable,
            "static_library" => Self::StaticLibrary,
            "shared_library" => Self::SharedLibrary,
            "loadable_module" => Self::LoadableModule,
            "source_set" => Self::SourceSet,
            "action" => Self::Action,
            "action_foreach" => Self::ActionForeach,
            "bundle_data" => Self::BundleData,
            "copy" => Self::Copy,
            _ => return None,
        })
    }

    pub fn function_name(self) -> &'static str {
        match self {
            Self::Group => "group",
            Self::Executable => "executable",
            Self::StaticLibrary => "static_library",
            Self::SharedLibrary => "shared_library",
            Self::LoadableModule => "loadable_module",
            Self::SourceSet => "source_set",
            Self::Action => "action",
            Self::ActionForeach => "action_foreach",
            Self::BundleData => "bundle_data",
            Self::Copy => "copy",
        }
    }

    /// Targets that produce a linked binary.
    pub fn is_linkable(self) -> bool {
        matches!(
            self,
            Self::Executable | Self::SharedLibrary | Self::LoadableModule | Self::StaticLibrary
        )
    }

    /// Targets whose deps' link inputs flow through them unchanged.
    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Group | Self::SourceSet)
    }

    /// Script-running targets whose outputs come from patterns.
    pub fn has_script(self) -> bool {
        matches!(self, Self::Action | Self::ActionForeach)
    }

    pub fn has_output_patterns(self) -> bool {
        matches!(
            self,
            Self::Action | Self::ActionForeach | Self::Copy | Self::BundleData
        )
    }
}

/// Fields computed during graph resolution.
#[derive(Debug, Default, Clone)]
pub struct ResolvedData {
    /// Ordered, flattened config labels (own first, then inherited).
    pub configs: Vec<Label>,
    /// Aggregated flag values: the target's own plus every config's.
    pub values: ConfigValues,
    /// Link inputs gathered over the dep closure.
    pub libs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub frameworks: Vec<String>,
    /// Expanded output files, source-absolute under the build dir.
    pub outputs: Vec<String>,
    pub runtime_deps_output: Option<String>,
}

/// One committed target. Immutable after commit except `resolved`.
#[derive(Debug)]
pub struct Target {
    pub label: Label,
    pub decl_span: Span,
    pub target_type: TargetType,
    pub toolchain: Label,
    pub testonly: bool,
    pub check_includes: bool,

    pub sources: Vec<String>,
    pub inputs: Vec<String>,
    /// Raw output patterns for actions, copies and bundle data.
    pub outputs: Vec<String>,
    /// Public headers; `None` means everything is public.
    pub public: Option<Vec<String>>,

    pub script: Option<String>,
    pub args: Vec<String>,
    pub depfile: Option<String>,
    pub pool: Option<String>,

    pub configs: Vec<LabelRef>,
    pub public_configs: Vec<LabelRef>,
    pub all_dependent_configs: Vec<LabelRef>,

    pub private_deps: Vec<LabelRef>,
    pub public_deps: Vec<LabelRef>,
    pub data_deps: Vec<LabelRef>,

    pub visibility: Option<Vec<PatternRef>>,
    pub assert_no_deps: Vec<PatternRef>,
    pub write_runtime_deps: Option<String>,

    /// Flag variables written directly on the target.
    pub own_values: ConfigValues,

    pub resolved: ResolvedData,
}

impl Target {
    /// Extract a target from its declaration scope. Recognized
    /// variables are consumed (marked used); the caller runs the
    /// scope's unused check afterwards to catch typos.
    pub fn from_scope(
        scope: &ScopeRef,
        label: Label,
        target_type: TargetType,
        toolchain: Label,
        current_dir: &str,
        decl_span: Span,
    ) -> Result<Self, Error> {
        let script = match take_string(scope, "script")? {
            Some(s) => Some(paths::resolve_path(&s, current_dir)),
            None => None,
        };

        let target = Self {
            label,
            decl_span,
            target_type,
            toolchain,
            testonly: take_bool(scope, "testonly")?.unwrap_or(false),
            check_includes: take_bool(scope, "check_includes")?.unwrap_or(true),
            sources: take_path_list(scope, "sources", current_dir)?.unwrap_or_default(),
            inputs: take_path_list(scope, "inputs", current_dir)?.unwrap_or_default(),
            outputs: take_string_list(scope, "outputs")?.unwrap_or_default(),
            public: take_path_list(scope, "public", current_dir)?,
            script,
            args: take_string_list(scope, "args")?.unwrap_or_default(),
            depfile: take_string(scope, "depfile")?,
            pool: take_string(scope, "pool")?,
            configs: take_label_list(scope, "configs", current_dir)?.unwrap_or_default(),
            public_configs: take_label_list(scope, "public_configs", current_dir)?
                .unwrap_or_default(),
            all_dependent_configs: take_label_list(scope, "all_dependent_configs", current_dir)?
                .unwrap_or_default(),
            private_deps: take_label_list(scope, "deps", current_dir)?.unwrap_or_default(),
            public_deps: take_label_list(scope, "public_deps", current_dir)?.unwrap_or_default(),
            data_deps: take_label_list(scope, "data_deps", current_dir)?.unwrap_or_default(),
            visibility: take_pattern_list(scope, "visibility", current_dir)?,
            assert_no_deps: take_pattern_list(scope, "assert_no_deps", current_dir)?
                .unwrap_or_default(),
            write_runtime_deps: match take_string(scope, "write_runtime_deps")? {
                Some(p) => Some(paths::resolve_path(&p, current_dir)),
                None => None,
            },
            own_values: ConfigValues::extract(scope, current_dir)?,
            resolved: ResolvedData::default(),
        };

        target.validate(decl_span)?;
        Ok(target)
    }

    fn validate(&self, span: Span) -> Result<(), Error> {
        let type_name = self.target_type.function_name();
        if self.target_type.has_script() && self.script.is_none() {
            return Err(Error::new(
                ErrorKind::Generator,
                span,
                format!("{} \"{}\" requires a script", type_name, self.label),
            ));
        }
        if self.target_type.has_output_patterns() && self.outputs.is_empty() {
            return Err(Error::new(
                ErrorKind::Generator,
                span,
                format!("{} \"{}\" requires outputs", type_name, self.label),
            ));
        }
        if matches!(self.target_type, TargetType::ActionForeach | TargetType::Copy)
            && self.sources.is_empty()
        {
            return Err(Error::new(
                ErrorKind::Generator,
                span,
                format!("{} \"{}\" requires sources", type_name, self.label),
            ));
        }
        if self.target_type == TargetType::Copy && self.outputs.len() != 1 {
            return Err(Error::new(
                ErrorKind::Generator,
                span,
                format!("copy \"{}\" takes exactly one output pattern", self.label),
            ));
        }
        if !self.target_type.has_script() && (self.script.is_some() || !self.args.is_empty()) {
            return Err(Error::new(
                ErrorKind::Generator,
                span,
                format!("\"{}\" is not an action; script/args are not valid here", self.label),
            ));
        }
        Ok(())
    }

    /// Every dependency reference, all kinds.
    pub fn all_dep_refs(&self) -> impl Iterator<Item = &LabelRef> {
        self.public_deps
            .iter()
            .chain(self.private_deps.iter())
            .chain(self.data_deps.iter())
    }

    /// Dependencies that carry configs and link inputs (not data).
    pub fn linked_dep_refs(&self) -> impl Iterator<Item = &LabelRef> {
        self.public_deps.iter().chain(self.private_deps.iter())
    }

    /// Expand output patterns for actions, copies and bundle data.
    ///
    /// `action` outputs may only use per-target patterns;
    /// `action_foreach`, `copy` and `bundle_data` expand each pattern
    /// once per source.
    pub fn computed_outputs(&self, settings: &BuildSettings) -> Result<Vec<String>, Error> {
        if !self.target_type.has_output_patterns() {
            return Err(Error::new(
                ErrorKind::Generator,
                self.decl_span,
                format!(
                    "\"{}\" is a {}; only actions and copies have computable outputs",
                    self.label,
                    self.target_type.function_name()
                ),
            ));
        }

        let per_source = matches!(
            self.target_type,
            TargetType::ActionForeach | TargetType::Copy | TargetType::BundleData
        );

        let mut out = Vec::new();
        for pattern_text in &self.outputs {
            let pattern = SubstitutedString::parse(pattern_text, self.decl_span)?;
            if per_source {
                if !pattern.uses_per_source() {
                    return Err(Error::new(
                        ErrorKind::Generator,
                        self.decl_span,
                        format!(
                            "output \"{}\" of {} \"{}\" must reference {{{{source}}}}",
                            pattern_text,
                            self.target_type.function_name(),
                            self.label
                        ),
                    ));
                }
                for source in &self.sources {
                    out.push(self.expand_output(&pattern, settings, Some(source))?);
                }
            } else {
                if pattern.uses_per_source() {
                    return Err(Error::new(
                        ErrorKind::Generator,
                        self.decl_span,
                        format!(
                            "output \"{}\" of action \"{}\" may not use per-source substitutions",
                            pattern_text, self.label
                        ),
                    ));
                }
                out.push(self.expand_output(&pattern, settings, None)?);
            }
        }

        for output in &out {
            if !settings.is_in_build_dir(output) {
                return Err(Error::new(
                    ErrorKind::Generator,
                    self.decl_span,
                    format!(
                        "output \"{}\" of \"{}\" is not inside the build directory \"{}\"",
                        output, self.label, settings.build_dir
                    ),
                ));
            }
        }
        Ok(out)
    }

    fn expand_output(
        &self,
        pattern: &SubstitutedString,
        settings: &BuildSettings,
        source: Option<&str>,
    ) -> Result<String, Error> {
        let dir = self.label.dir();
        let expanded = pattern.expand(self.decl_span, |p| {
            substitute_for_target(p, self, settings, source)
        })?;
        Ok(paths::resolve_path(&expanded, dir))
    }
}

/// Shared pattern lookup for targets, used by output expansion and
/// the Ninja writer's command expansion.
pub fn substitute_for_target(
    pattern: SubstitutionPattern,
    target: &Target,
    settings: &BuildSettings,
    source: Option<&str>,
) -> Option<String> {
    use SubstitutionPattern as P;
    let dir = target.label.dir();
    match pattern {
        P::TargetName => Some(target.label.name().to_string()),
        P::TargetOutDir => Some(settings.target_out_dir(dir)),
        P::TargetGenDir => Some(settings.target_gen_dir(dir)),
        P::RootOutDir => Some(settings.root_out_dir().to_string()),
        P::RootGenDir => Some(settings.root_gen_dir()),
        P::Source => source.map(str::to_string),
        P::SourceFilePart => source.map(|s| paths::file_part(s).to_string()),
        P::SourceNamePart => source.map(|s| paths::name_part(s).to_string()),
        P::SourceDir => source.map(|s| paths::dir_of(s)),
        P::SourceGenDir => source.map(|s| settings.target_gen_dir(&paths::dir_of(s))),
        P::SourceOutDir => source.map(|s| settings.target_out_dir(&paths::dir_of(s))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for name in [
            "group",
            "executable",
            "static_library",
            "shared_library",
            "loadable_module",
            "source_set",
            "action",
            "action_foreach",
            "bundle_data",
            "copy",
        ] {
            let t = TargetType::from_function_name(name).unwrap();
            assert_eq!(t.function_name(), name);
        }
        assert!(TargetType::from_function_name("template").is_none());
    }

    #[test]
    fn test_type_classification() {
        assert!(TargetType::Executable.is_linkable());
        assert!(TargetType::SourceSet.is_transparent());
        assert!(TargetType::ActionForeach.has_script());
        assert!(!TargetType::Group.is_linkable());
    }
}
