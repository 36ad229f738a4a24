//! gneiss-gen: evaluate a GNS build tree and emit Ninja files.
//!
//! One-shot: read inputs, emit outputs, exit. Exit code 0 on
//! success; any error prints a single formatted report to stderr and
//! exits 1.

mod setup;

use clap::Parser;
use gneiss_core::eval::OutputSink;
use gneiss_core::graph;
use gneiss_core::loader::Loader;
use gneiss_core::scheduler::Scheduler;
use gneiss_dsl::error::DiagnosticFormatter;
use gneiss_dsl::{Error, SourceMap};
use gneiss_ninja::NinjaWriter;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "gneiss-gen")]
#[command(about = "Generate Ninja files from a GNS build description")]
struct Cli {
    /// Build output directory, relative to the source root
    /// (for example `out/debug`).
    out_dir: String,

    /// Build argument overrides, as GNS assignments.
    #[arg(long)]
    args: Option<String>,

    /// Source root; defaults to the nearest parent directory
    /// containing a `.gneiss` dotfile.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Dotfile to use instead of `<root>/.gneiss`.
    #[arg(long)]
    dotfile: Option<PathBuf>,

    /// Interpreter for exec_script and action scripts.
    #[arg(long)]
    script_executable: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "gneiss=debug" } else { "gneiss=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let started = Instant::now();
    let regen_command = regen_command_line();

    let setup = match setup::discover(setup::SetupOptions {
        out_dir: cli.out_dir,
        args_text: cli.args,
        root: cli.root,
        dotfile: cli.dotfile,
        script_executable: cli.script_executable,
    }) {
        Ok(setup) => setup,
        Err((err, map)) => return report(&err, &map),
    };

    let (scheduler, rx) = Scheduler::new();
    let scheduler = Rc::new(scheduler);
    let loader = Loader::with_source_map(
        setup.settings.clone(),
        setup.args.clone(),
        scheduler.clone(),
        OutputSink::Stdout,
        setup.source_map,
    );

    if let Err(err) = loader.run(&rx) {
        return report(&err, &loader.source_map());
    }

    let graph = match graph::resolve(loader.into_items(), &setup.settings, Some(&scheduler)) {
        Ok(graph) => graph,
        Err(err) => return report(&err, &loader.source_map()),
    };

    let writer = NinjaWriter::new(&graph, &setup.settings);
    if let Err(err) = writer.write_all(
        &setup.args,
        &scheduler.gen_dependencies(),
        &regen_command,
    ) {
        return report(&err, &loader.source_map());
    }

    let files = loader.source_map().file_count();
    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "generation finished");
    println!(
        "Done. Made {} targets from {} files in {}ms.",
        graph.sorted_targets.len(),
        files,
        started.elapsed().as_millis()
    );
    0
}

fn report(err: &Error, map: &SourceMap) -> i32 {
    eprint!("{}", DiagnosticFormatter::new(map).format(err));
    1
}

/// The command line that reproduces this invocation, for the
/// regeneration rule in build.ninja.
fn regen_command_line() -> String {
    let args: Vec<String> = std::env::args().collect();
    let exe = args
        .first()
        .map(|a| a.as_str())
        .unwrap_or("gneiss-gen")
        .to_string();
    let mut parts = vec![exe];
    parts.extend(args.iter().skip(1).map(|a| {
        if a.contains(' ') {
            format!("\"{}\"", a)
        } else {
            a.clone()
        }
    }));
    parts.join(" ")
}
