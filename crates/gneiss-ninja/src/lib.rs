//! Ninja emission for the gneiss generator.
//!
//! This crate is a consumer of the resolved target graph: it owns
//! textual formatting only. Graph semantics (config propagation,
//! output expansion, validation) live in `gneiss-core`; by the time a
//! graph arrives here it is fully resolved and internally consistent.

pub mod escape;
pub mod writer;

pub use writer::NinjaWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use gneiss_core::args::Args;
    use gneiss_core::graph;
    use gneiss_core::settings::BuildSettings;
    use gneiss_core::test_support::TestSetup;
    use std::path::PathBuf;
    use std::rc::Rc;

    /// Evaluate source against a temp source root, resolve, and emit.
    fn emit(source: &str) -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let setup = TestSetup::with_source_root(dir.path().to_path_buf());
        setup.run(source).unwrap();

        let items = std::mem::take(&mut *setup.context().collector.borrow_mut()).into_items();
        let graph = graph::resolve(items, &setup.settings, None).unwrap();

        let settings = BuildSettings::new(dir.path().to_path_buf(), "//out/debug");
        let writer = NinjaWriter::new(&graph, &settings);
        writer
            .write_all(&Args::new(), &[PathBuf::from("/src/BUILD.gns")], "gneiss-gen out/debug")
            .unwrap();

        let toolchain = std::fs::read_to_string(
            dir.path().join("out/debug/toolchain.ninja"),
        )
        .unwrap();
        (dir, toolchain)
    }

    #[test]
    fn test_group_emits_stamp() {
        let (_dir, ninja) = emit("group(\"all\") {\n}");
        assert!(ninja.contains("build obj/all.stamp: stamp"));
        assert!(ninja.contains("rule stamp"));
    }

    #[test]
    fn test_action_emits_run_script() {
        let (_dir, ninja) = emit(
            "action(\"gen\") {\n  script = \"make.py\"\n  args = [ \"--out\", \"{{target_gen_dir}}\" ]\n  outputs = [ \"{{target_gen_dir}}/made.h\" ]\n}",
        );
        assert!(ninja.contains("build gen/made.h: run_script"));
        assert!(ninja.contains("script = ../../make.py"));
        assert!(ninja.contains("args = --out //out/debug/gen"));
    }

    #[test]
    fn test_binary_without_toolchain_is_stamp() {
        // Without toolchain tools the dependency structure is still
        // recorded through a stamp edge at the would-be output.
        let (_dir, ninja) = emit("executable(\"app\") {\n  sources = [ \"main.cc\" ]\n}");
        assert!(ninja.contains("build app: stamp ../../main.cc"));
    }

    #[test]
    fn test_binary_with_toolchain_compiles_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let setup = TestSetup::with_source_root(dir.path().to_path_buf());
        setup
            .run(
                "toolchain(\"gcc\") {\n  tool(\"cxx\") {\n    command = \"g++ {{cflags}} -c {{source}} -o {{output}}\"\n  }\n  tool(\"link\") {\n    command = \"g++ {{ldflags}} {{source}} -o {{output}} {{libs}}\"\n  }\n}\nconfig(\"warn\") {\n  cflags = [ \"-Wall\" ]\n}\nexecutable(\"app\") {\n  sources = [ \"main.cc\" ]\n  configs = [ \":warn\" ]\n  libs = [ \"m\" ]\n}",
            )
            .unwrap();

        let items = std::mem::take(&mut *setup.context().collector.borrow_mut()).into_items();
        let mut settings = BuildSettings::new(dir.path().to_path_buf(), "//out/debug");
        settings.build_config_file = None;
        // The default toolchain falls back to //:default; point it at
        // the declared one instead.
        settings.set_default_toolchain(gneiss_core::Label::new("//", "gcc"));
        let graph = graph::resolve(items, &settings, None).unwrap();

        let writer = NinjaWriter::new(&graph, &settings);
        writer.write_all(&Args::new(), &[], "gneiss-gen out/debug").unwrap();
        let ninja =
            std::fs::read_to_string(dir.path().join("out/debug/toolchain.ninja")).unwrap();

        assert!(ninja.contains("rule cxx"));
        assert!(ninja.contains("command = g++ $cflags $cflags_c $cflags_cc $defines $include_dirs -c $in -o $out"));
        assert!(ninja.contains("build obj/app/main.o: cxx ../../main.cc"));
        assert!(ninja.contains("cflags = -Wall"));
        assert!(ninja.contains("build app: link obj/app/main.o"));
        assert!(ninja.contains("libs = -lm"));
    }

    #[test]
    fn test_build_ninja_and_deps_file() {
        let dir = tempfile::tempdir().unwrap();
        let setup = TestSetup::with_source_root(dir.path().to_path_buf());
        setup.run("group(\"default\") {\n}").unwrap();

        let items = std::mem::take(&mut *setup.context().collector.borrow_mut()).into_items();
        let settings = BuildSettings::new(dir.path().to_path_buf(), "//out/debug");
        let graph = graph::resolve(items, &settings, None).unwrap();
        let writer = NinjaWriter::new(&graph, &settings);

        let mut overrides = indexmap::IndexMap::new();
        overrides.insert(
            "is_debug".to_string(),
            gneiss_core::Value::bool(true, gneiss_dsl::Span::zero(0)),
        );
        writer
            .write_all(
                &Args::with_overrides(overrides),
                &[PathBuf::from("/src/BUILD.gns"), PathBuf::from("/src/a b.gnsi")],
                "gneiss-gen out/debug",
            )
            .unwrap();

        let build = std::fs::read_to_string(dir.path().join("out/debug/build.ninja")).unwrap();
        assert!(build.contains("subninja toolchain.ninja"));
        assert!(build.contains("default obj/default.stamp"));
        assert!(build.contains("generator = 1"));

        let deps = std::fs::read_to_string(dir.path().join("out/debug/build.ninja.d")).unwrap();
        assert!(deps.starts_with("build.ninja: "));
        assert!(deps.contains("/src/a\\ b.gnsi"));

        let args = std::fs::read_to_string(dir.path().join("out/debug/args.gn")).unwrap();
        assert!(args.contains("is_debug = true"));
    }
}
