//! Build-wide settings: source root, build directory, toolchain.

use crate::label::Label;
use crate::paths;
use std::cell::RefCell;
use std::path::PathBuf;

/// Settings shared by every scope and file in one generator run.
#[derive(Debug)]
pub struct BuildSettings {
    /// Filesystem directory the source-absolute `//` maps to.
    pub source_root: PathBuf,
    /// Source-absolute build output directory (`//out/debug`).
    pub build_dir: String,
    /// Root build file, conventionally `//BUILD.gns`.
    pub root_build_file: String,
    /// Build configuration file named by the dotfile, evaluated once
    /// into the base scope every file inherits.
    pub build_config_file: Option<String>,
    /// Interpreter for `exec_script` and action scripts.
    pub script_executable: Option<PathBuf>,
    /// Set by `set_default_toolchain` while the buildconfig runs.
    default_toolchain: RefCell<Option<Label>>,
}

impl BuildSettings {
    pub fn new(source_root: PathBuf, build_dir: impl Into<String>) -> Self {
        Self {
            source_root,
            build_dir: build_dir.into(),
            root_build_file: "//BUILD.gns".to_string(),
            build_config_file: None,
            script_executable: None,
            default_toolchain: RefCell::new(None),
        }
    }

    /// Map a source-absolute path to a real filesystem path.
    pub fn to_fs_path(&self, source_abs: &str) -> PathBuf {
        let rel = source_abs.trim_start_matches('/');
        if rel.is_empty() {
            self.source_root.clone()
        } else {
            self.source_root.join(rel)
        }
    }

    /// Record the default toolchain. Returns false if a different one
    /// was already recorded.
    pub fn set_default_toolchain(&self, label: Label) -> bool {
        let mut slot = self.default_toolchain.borrow_mut();
        match &*slot {
            Some(existing) => *existing == label,
            None => {
                *slot = Some(label);
                true
            }
        }
    }

    pub fn has_default_toolchain(&self) -> bool {
        self.default_toolchain.borrow().is_some()
    }

    /// The default toolchain, falling back to `//:default` when the
    /// buildconfig never called `set_default_toolchain`.
    pub fn default_toolchain(&self) -> Label {
        self.default_toolchain
            .borrow()
            .clone()
            .unwrap_or_else(|| Label::new("//", "default"))
    }

    pub fn root_out_dir(&self) -> &str {
        &self.build_dir
    }

    pub fn root_gen_dir(&self) -> String {
        format!("{}/gen", self.build_dir)
    }

    /// Per-directory object dir: `//out/debug/obj/<dir>`.
    pub fn target_out_dir(&self, dir: &str) -> String {
        self.dir_under(dir, "obj")
    }

    /// Per-directory generated-file dir: `//out/debug/gen/<dir>`.
    pub fn target_gen_dir(&self, dir: &str) -> String {
        self.dir_under(dir, "gen")
    }

    fn dir_under(&self, dir: &str, prefix: &str) -> String {
        let rel = dir.trim_start_matches('/');
        if rel.is_empty() {
            format!("{}/{}", self.build_dir, prefix)
        } else {
            format!("{}/{}/{}", self.build_dir, prefix, rel)
        }
    }

    /// Is this source-absolute path inside the build directory?
    pub fn is_in_build_dir(&self, path: &str) -> bool {
        paths::is_within(path, &self.build_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BuildSettings {
        BuildSettings::new(PathBuf::from("/src/project"), "//out/debug")
    }

    #[test]
    fn test_fs_mapping() {
        let s = settings();
        assert_eq!(
            s.to_fs_path("//base/BUILD.gns"),
            PathBuf::from("/src/project/base/BUILD.gns")
        );
        assert_eq!(s.to_fs_path("//"), PathBuf::from("/src/project"));
    }

    #[test]
    fn test_output_dirs() {
        let s = settings();
        assert_eq!(s.target_out_dir("//base"), "//out/debug/obj/base");
        assert_eq!(s.target_gen_dir("//"), "//out/debug/gen");
        assert_eq!(s.root_gen_dir(), "//out/debug/gen");
        assert!(s.is_in_build_dir("//out/debug/obj/a.o"));
        assert!(!s.is_in_build_dir("//src/a.cc"));
    }

    #[test]
    fn test_default_toolchain_latching() {
        let s = settings();
        assert!(!s.has_default_toolchain());
        assert_eq!(s.default_toolchain().to_string(), "//:default");

        let tc = Label::new("//build/toolchain", "gcc");
        assert!(s.set_default_toolchain(tc.clone()));
        assert!(s.set_default_toolchain(tc.clone()));
        assert!(!s.set_default_toolchain(Label::new("//build/toolchain", "clang")));
        assert_eq!(s.default_toolchain(), tc);
    }
}
