//! Ninja serialization of a resolved target graph.
//!
//! Layout under the build directory:
//!
//! - `toolchain.ninja` — rules from the default toolchain's `tool()`
//!   definitions (with built-in `stamp`/`copy` fallbacks) and one
//!   block of build statements per target, dependency-first
//! - `build.ninja` — includes `toolchain.ninja`, declares the
//!   regeneration rule and the default target
//! - `build.ninja.d` — generator dependencies, so the build re-runs
//!   the generator when any input file changes
//! - `args.gn` — the effective build-argument overrides
//!
//! All paths inside ninja files are relative to the build directory.

use crate::escape;
use gneiss_core::args::Args;
use gneiss_core::graph::ResolvedGraph;
use gneiss_core::item::{Target, TargetType, Tool, Toolchain};
use gneiss_core::paths;
use gneiss_core::settings::BuildSettings;
use gneiss_core::substitution::SubstitutionPattern;
use gneiss_dsl::{Error, ErrorKind, Span};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct NinjaWriter<'a> {
    graph: &'a ResolvedGraph,
    settings: &'a BuildSettings,
}

impl<'a> NinjaWriter<'a> {
    pub fn new(graph: &'a ResolvedGraph, settings: &'a BuildSettings) -> Self {
        Self { graph, settings }
    }

    /// Emit every output file. `regen_command` reproduces this
    /// generator invocation for the regeneration rule.
    pub fn write_all(
        &self,
        args: &Args,
        gen_deps: &[PathBuf],
        regen_command: &str,
    ) -> Result<(), Error> {
        let out_dir = self.settings.to_fs_path(&self.settings.build_dir);
        std::fs::create_dir_all(&out_dir).map_err(|e| io_error(&out_dir, e))?;

        self.write_file(&out_dir.join("toolchain.ninja"), &self.toolchain_ninja()?)?;
        self.write_file(
            &out_dir.join("build.ninja"),
            &self.build_ninja(regen_command),
        )?;
        self.write_file(&out_dir.join("build.ninja.d"), &build_ninja_d(gen_deps))?;
        self.write_file(&out_dir.join("args.gn"), &args_gn(args))?;
        self.write_runtime_deps_files()?;

        info!(dir = %out_dir.display(), targets = self.graph.sorted_targets.len(), "ninja files written");
        Ok(())
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<(), Error> {
        let unchanged = std::fs::read_to_string(path)
            .map(|existing| existing == content)
            .unwrap_or(false);
        if unchanged {
            return Ok(());
        }
        std::fs::write(path, content).map_err(|e| io_error(path, e))?;
        debug!(file = %path.display(), "written");
        Ok(())
    }

    /// Path relative to the build dir, escaped for ninja.
    fn rel(&self, source_abs: &str) -> String {
        escape::path(&paths::rebase(source_abs, &self.settings.build_dir))
    }

    fn toolchain_ninja(&self) -> Result<String, Error> {
        let mut out = String::new();
        let toolchain = self.graph.default_toolchain_item();

        writeln!(out, "# Generated by gneiss. Do not edit.").unwrap();
        writeln!(out).unwrap();
        self.write_rules(&mut out, toolchain);

        for label in &self.graph.sorted_targets {
            let target = self.graph.target(label).expect("sorted label vanished");
            writeln!(out).unwrap();
            writeln!(out, "# {}", label).unwrap();
            self.write_target(&mut out, target, toolchain)?;
        }
        Ok(out)
    }

    /// Rule blocks: toolchain tools first, then built-in fallbacks
    /// for anything the toolchain leaves undefined.
    fn write_rules(&self, out: &mut String, toolchain: Option<&Toolchain>) {
        if let Some(toolchain) = toolchain {
            for tool in toolchain.tools.values() {
                self.write_tool_rule(out, tool);
            }
        }
        let defined = |name: &str| toolchain.is_some_and(|tc| tc.tool(name).is_some());
        if !defined("stamp") {
            writeln!(out, "rule stamp").unwrap();
            writeln!(out, "  command = touch $out").unwrap();
            writeln!(out, "  description = STAMP $out").unwrap();
        }
        if !defined("copy") {
            writeln!(out, "rule copy").unwrap();
            writeln!(out, "  command = cp -af $in $out").unwrap();
            writeln!(out, "  description = COPY $in $out").unwrap();
        }
        writeln!(out, "rule run_script").unwrap();
        writeln!(out, "  command = $interpreter $script $args").unwrap();
        writeln!(out, "  description = ACTION $out").unwrap();
    }

    fn write_tool_rule(&self, out: &mut String, tool: &Tool) {
        let command = tool
            .command
            .expand(Span::zero(0), |p| Some(tool_pattern_var(p)))
            .expect("tool command pattern lookup is total");
        writeln!(out, "rule {}", tool.name).unwrap();
        writeln!(out, "  command = {}", command).unwrap();
        if let Some(description) = &tool.description {
            let expanded = gneiss_core::substitution::SubstitutedString::parse(
                description,
                Span::zero(0),
            )
            .and_then(|s| s.expand(Span::zero(0), |p| Some(tool_pattern_var(p))))
            .unwrap_or_else(|_| description.clone());
            writeln!(out, "  description = {}", expanded).unwrap();
        }
        if let Some(depfile) = &tool.depfile {
            writeln!(out, "  depfile = {}", depfile).unwrap();
        }
    }

    fn write_target(
        &self,
        out: &mut String,
        target: &Target,
        toolchain: Option<&Toolchain>,
    ) -> Result<(), Error> {
        match target.target_type {
            TargetType::Group => self.write_group(out, target),
            TargetType::Action | TargetType::ActionForeach => self.write_action(out, target),
            TargetType::Copy => self.write_copy(out, target),
            TargetType::BundleData => self.write_copy(out, target),
            TargetType::SourceSet => self.write_stamp(out, target),
            TargetType::Executable
            | TargetType::StaticLibrary
            | TargetType::SharedLibrary
            | TargetType::LoadableModule => self.write_binary(out, target, toolchain),
        }
    }

    /// Files the build step for this target depends on: its sources,
    /// inputs and every dependency's primary output.
    fn dep_inputs(&self, target: &Target) -> Vec<String> {
        let mut inputs: Vec<String> = Vec::new();
        for file in target.sources.iter().chain(target.inputs.iter()) {
            inputs.push(self.rel(file));
        }
        for dep in target.all_dep_refs() {
            let label = dep.label.without_toolchain();
            if let Some(dep_target) = self.graph.target(&label) {
                inputs.push(self.rel(&self.primary_output(dep_target)));
            }
        }
        inputs
    }

    /// The single file other targets depend on to order after this
    /// one.
    fn primary_output(&self, target: &Target) -> String {
        let name = target.label.name();
        match target.target_type {
            TargetType::Executable => {
                format!("{}/{}", self.settings.root_out_dir(), name)
            }
            TargetType::SharedLibrary | TargetType::LoadableModule => {
                format!("{}/lib{}.so", self.settings.root_out_dir(), name)
            }
            TargetType::StaticLibrary => format!(
                "{}/lib{}.a",
                self.settings.target_out_dir(target.label.dir()),
                name
            ),
            _ => format!(
                "{}/{}.stamp",
                self.settings.target_out_dir(target.label.dir()),
                name
            ),
        }
    }

    fn write_group(&self, out: &mut String, target: &Target) -> Result<(), Error> {
        self.write_stamp(out, target)
    }

    fn write_stamp(&self, out: &mut String, target: &Target) -> Result<(), Error> {
        let output = self.rel(&self.primary_output(target));
        let inputs = self.dep_inputs(target).join(" ");
        writeln!(out, "build {}: stamp {}", output, inputs).unwrap();
        Ok(())
    }

    fn write_action(&self, out: &mut String, target: &Target) -> Result<(), Error> {
        let interpreter = self
            .settings
            .script_executable
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "python3".to_string());
        let script = target.script.as_ref().expect("action without script");

        let per_source = target.target_type == TargetType::ActionForeach;
        let groups: Vec<(Option<&str>, Vec<String>)> = if per_source {
            target
                .sources
                .iter()
                .map(|s| (Some(s.as_str()), self.outputs_for_source(target, Some(s))))
                .collect()
        } else {
            vec![(None, target.resolved.outputs.clone())]
        };

        for (source, outputs) in groups {
            let expanded_args = self.expand_args(target, source)?;
            let outputs_rel: Vec<String> = outputs.iter().map(|o| self.rel(o)).collect();
            let mut inputs = self.dep_inputs(target);
            inputs.push(self.rel(script));

            writeln!(
                out,
                "build {}: run_script {}",
                outputs_rel.join(" "),
                inputs.join(" ")
            )
            .unwrap();
            writeln!(out, "  interpreter = {}", escape::value(&interpreter)).unwrap();
            writeln!(out, "  script = {}", self.rel(script)).unwrap();
            writeln!(out, "  args = {}", escape::value(&expanded_args.join(" "))).unwrap();
            if let Some(depfile) = &target.depfile {
                writeln!(out, "  depfile = {}", self.rel(depfile)).unwrap();
            }
            if let Some(pool) = &target.pool {
                writeln!(out, "  pool = {}", pool).unwrap();
            }
        }

        // A stamp collecting all outputs so dependents have one file
        // to order against.
        let all_rel: Vec<String> = target
            .resolved
            .outputs
            .iter()
            .map(|o| self.rel(o))
            .collect();
        writeln!(
            out,
            "build {}: stamp {}",
            self.rel(&self.primary_output(target)),
            all_rel.join(" ")
        )
        .unwrap();
        Ok(())
    }

    /// Expanded outputs belonging to one source of an
    /// `action_foreach` or `copy`.
    fn outputs_for_source(&self, target: &Target, source: Option<&str>) -> Vec<String> {
        use gneiss_core::item::target::substitute_for_target;
        use gneiss_core::substitution::SubstitutedString;

        target
            .outputs
            .iter()
            .filter_map(|pattern| {
                let parsed = SubstitutedString::parse(pattern, target.decl_span).ok()?;
                let expanded = parsed
                    .expand(target.decl_span, |p| {
                        substitute_for_target(p, target, self.settings, source)
                    })
                    .ok()?;
                Some(paths::resolve_path(&expanded, target.label.dir()))
            })
            .collect()
    }

    fn expand_args(&self, target: &Target, source: Option<&str>) -> Result<Vec<String>, Error> {
        use gneiss_core::item::target::substitute_for_target;
        use gneiss_core::substitution::SubstitutedString;

        target
            .args
            .iter()
            .map(|arg| {
                let parsed = SubstitutedString::parse(arg, target.decl_span)?;
                parsed.expand(target.decl_span, |p| {
                    substitute_for_target(p, target, self.settings, source)
                })
            })
            .collect()
    }

    fn write_copy(&self, out: &mut String, target: &Target) -> Result<(), Error> {
        for source in &target.sources {
            let outputs = self.outputs_for_source(target, Some(source));
            for output in outputs {
                writeln!(
                    out,
                    "build {}: copy {}",
                    self.rel(&output),
                    self.rel(source)
                )
                .unwrap();
            }
        }
        let all_rel: Vec<String> = target
            .resolved
            .outputs
            .iter()
            .map(|o| self.rel(o))
            .collect();
        writeln!(
            out,
            "build {}: stamp {}",
            self.rel(&self.primary_output(target)),
            all_rel.join(" ")
        )
        .unwrap();
        Ok(())
    }

    /// Compiled-and-linked targets. With toolchain tools available,
    /// per-source compile edges feed the link edge; without, a stamp
    /// records the dependency structure so the graph stays sound.
    fn write_binary(
        &self,
        out: &mut String,
        target: &Target,
        toolchain: Option<&Toolchain>,
    ) -> Result<(), Error> {
        let link_tool = toolchain.and_then(|tc| tc.link_tool_for(target.target_type));
        let Some(link_tool) = link_tool else {
            return self.write_stamp(out, target);
        };

        let values = &target.resolved.values;
        let obj_dir = format!(
            "{}/{}",
            self.settings.target_out_dir(target.label.dir()),
            target.label.name()
        );

        let mut objects: Vec<String> = Vec::new();
        for source in &target.sources {
            let extension = paths::extension(source);
            let Some(tool) = toolchain.and_then(|tc| tc.compile_tool_for(extension)) else {
                // Headers and data files ride along as inputs.
                continue;
            };
            let object = format!("{}/{}.o", obj_dir, paths::name_part(source));
            writeln!(
                out,
                "build {}: {} {}",
                self.rel(&object),
                tool.name,
                self.rel(source)
            )
            .unwrap();
            write_flag_var(out, "cflags", &values.cflags);
            write_flag_var(out, "cflags_c", &values.cflags_c);
            write_flag_var(out, "cflags_cc", &values.cflags_cc);
            write_prefixed_var(out, "defines", "-D", &values.defines);
            let include_rel: Vec<String> = values
                .include_dirs
                .iter()
                .map(|d| paths::rebase(d, &self.settings.build_dir))
                .collect();
            write_prefixed_var(out, "include_dirs", "-I", &include_rel);
            objects.push(object);
        }

        let output = self.primary_output(target);
        let mut link_inputs: Vec<String> = objects.iter().map(|o| self.rel(o)).collect();
        for dep in target.linked_dep_refs() {
            let label = dep.label.without_toolchain();
            if let Some(dep_target) = self.graph.target(&label) {
                link_inputs.push(self.rel(&self.primary_output(dep_target)));
            }
        }

        writeln!(
            out,
            "build {}: {} {}",
            self.rel(&output),
            link_tool.name,
            link_inputs.join(" ")
        )
        .unwrap();
        write_flag_var(out, "ldflags", &values.ldflags);
        write_prefixed_var(out, "libs", "-l", &target.resolved.libs);
        let lib_dir_rel: Vec<String> = target
            .resolved
            .lib_dirs
            .iter()
            .map(|d| paths::rebase(d, &self.settings.build_dir))
            .collect();
        write_prefixed_var(out, "lib_dirs", "-L", &lib_dir_rel);
        Ok(())
    }

    fn build_ninja(&self, regen_command: &str) -> String {
        let mut out = String::new();
        writeln!(out, "# Generated by gneiss. Do not edit.").unwrap();
        writeln!(out).unwrap();
        writeln!(out, "rule gneiss").unwrap();
        writeln!(out, "  command = {}", escape::value(regen_command)).unwrap();
        writeln!(out, "  description = Regenerating ninja files").unwrap();
        writeln!(out).unwrap();
        writeln!(out, "build build.ninja: gneiss").unwrap();
        writeln!(out, "  generator = 1").unwrap();
        writeln!(out, "  depfile = build.ninja.d").unwrap();
        writeln!(out).unwrap();
        writeln!(out, "subninja toolchain.ninja").unwrap();

        // Default to //:default when present, else the first root
        // target in dependency order.
        let default = self
            .graph
            .target(&gneiss_core::Label::new("//", "default"))
            .map(|t| self.primary_output(t))
            .or_else(|| {
                self.graph
                    .sorted_targets
                    .last()
                    .and_then(|l| self.graph.target(l))
                    .map(|t| self.primary_output(t))
            });
        if let Some(default) = default {
            writeln!(out).unwrap();
            writeln!(out, "default {}", self.rel(&default)).unwrap();
        }
        out
    }

    /// `<target>.runtime_deps` files: the data-dep closure's primary
    /// outputs, one per line.
    fn write_runtime_deps_files(&self) -> Result<(), Error> {
        for label in &self.graph.sorted_targets {
            let target = self.graph.target(label).expect("sorted label vanished");
            let Some(path) = &target.resolved.runtime_deps_output else {
                continue;
            };
            let mut lines = String::new();
            for dep in &target.data_deps {
                if let Some(dep_target) = self.graph.target(&dep.label.without_toolchain()) {
                    lines.push_str(&self.rel(&self.primary_output(dep_target)));
                    lines.push('\n');
                }
            }
            let fs_path = self.settings.to_fs_path(path);
            if let Some(parent) = fs_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            std::fs::write(&fs_path, lines).map_err(|e| io_error(&fs_path, e))?;
        }
        Ok(())
    }
}

/// Map a `{{...}}` pattern in a tool definition to the ninja variable
/// the build statements supply.
fn tool_pattern_var(pattern: SubstitutionPattern) -> String {
    use SubstitutionPattern as P;
    match pattern {
        P::Source | P::Inputs => "$in".to_string(),
        P::Output => "$out".to_string(),
        P::Cflags => "$cflags $cflags_c $cflags_cc $defines $include_dirs".to_string(),
        P::CflagsC => "$cflags_c".to_string(),
        P::CflagsCc => "$cflags_cc".to_string(),
        P::Defines => "$defines".to_string(),
        P::IncludeDirs => "$include_dirs".to_string(),
        P::Ldflags => "$ldflags $lib_dirs".to_string(),
        P::Libs => "$libs".to_string(),
        other => format!("${}", other.name()),
    }
}

fn write_flag_var(out: &mut String, name: &str, values: &[String]) {
    if values.is_empty() {
        writeln!(out, "  {} =", name).unwrap();
        return;
    }
    let joined: Vec<String> = values.iter().map(|v| escape::value(v)).collect();
    writeln!(out, "  {} = {}", name, joined.join(" ")).unwrap();
}

fn write_prefixed_var(out: &mut String, name: &str, prefix: &str, values: &[String]) {
    if values.is_empty() {
        writeln!(out, "  {} =", name).unwrap();
        return;
    }
    let joined: Vec<String> = values
        .iter()
        .map(|v| format!("{}{}", prefix, escape::value(v)))
        .collect();
    writeln!(out, "  {} = {}", name, joined.join(" ")).unwrap();
}

fn build_ninja_d(gen_deps: &[PathBuf]) -> String {
    let mut deps: Vec<String> = gen_deps
        .iter()
        .map(|p| escape::depfile_path(&p.to_string_lossy()))
        .collect();
    deps.sort();
    deps.dedup();
    format!("build.ninja: {}\n", deps.join(" "))
}

fn args_gn(args: &Args) -> String {
    let mut out = String::from("# Effective build arguments. Generated by gneiss.\n");
    for (name, value) in args.overrides() {
        out.push_str(&format!("{} = {}\n", name, value.to_display_string(true)));
    }
    out
}

fn io_error(path: &Path, err: std::io::Error) -> Error {
    Error::new(
        ErrorKind::Io,
        Span::zero(0),
        format!("unable to write \"{}\": {}", path.display(), err),
    )
}
