//! The scheduler: parse worker pool plus main-thread event loop.
//!
//! One main thread owns every mutable scope, value and target; a
//! fixed rayon pool does the pure CPU work (reading, lexing, parsing)
//! and hands results back over an mpsc channel. Posts from one thread
//! arrive in order; the main loop is the only consumer.
//!
//! Lifecycle: every scheduled unit of work bumps the work counter and
//! the counter drops when the main thread finishes handling it. When
//! it reaches zero a `Complete` message is posted and the run loop
//! returns. The first fatal error latches the failure flag; later
//! errors are dropped, and in-flight parses finish naturally with
//! their results discarded. Dropping the scheduler joins outstanding
//! pool work through a dedicated condvar so the side-state mutex is
//! never held while waiting.

use crate::label::Label;
use gneiss_dsl::ast::Block;
use gneiss_dsl::{lexer, parser, Error, ErrorKind, Span};
use std::path::PathBuf;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use tracing::{debug, trace};

/// Messages posted to the main-thread event loop.
pub enum Msg {
    FileParsed(ParsedFile),
    Fail(Error),
    Log(String),
    Complete,
}

/// A worker's parse result, ready for main-thread evaluation.
pub struct ParsedFile {
    pub file_id: u16,
    /// Source-absolute file name (`//base/BUILD.gns`).
    pub name: String,
    /// Source-absolute directory the file governs.
    pub dir: String,
    pub source: String,
    pub result: Result<Block, Error>,
}

/// A unit of work for the parse pool.
pub struct ParseJob {
    pub fs_path: PathBuf,
    pub name: String,
    pub dir: String,
    pub file_id: u16,
}

/// Thread-shared side state, one mutex for all of it (operations are
/// short: push, lookup, set-flag).
#[derive(Debug, Default)]
pub struct RunRecords {
    /// Files whose content influenced the output; lands in build.ninja.d.
    pub gen_deps: Vec<PathBuf>,
    /// Files written by `write_file`, exempt from the
    /// unknown-generated-input check.
    pub written_files: Vec<String>,
    /// Generated-looking inputs nothing is known to produce.
    pub unknown_generated_inputs: Vec<(String, Label)>,
    /// Outputs of targets with `write_runtime_deps`.
    pub runtime_deps_outputs: Vec<String>,
    failed: bool,
}

#[derive(Debug)]
struct PoolCounter {
    count: Mutex<usize>,
    cv: Condvar,
}

#[derive(Debug)]
pub struct Scheduler {
    tx: Sender<Msg>,
    pool: rayon::ThreadPool,
    work_count: AtomicIsize,
    pool_counter: Arc<PoolCounter>,
    records: Mutex<RunRecords>,
}

impl Scheduler {
    /// Build a scheduler and the receiving end of its main loop.
    pub fn new() -> (Self, Receiver<Msg>) {
        let (tx, rx) = channel();
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("gneiss-parse-{}", i))
            .build()
            .expect("failed to build parse worker pool");
        debug!(workers, "scheduler created");

        let scheduler = Self {
            tx,
            pool,
            work_count: AtomicIsize::new(0),
            pool_counter: Arc::new(PoolCounter {
                count: Mutex::new(0),
                cv: Condvar::new(),
            }),
            records: Mutex::new(RunRecords::default()),
        };
        (scheduler, rx)
    }

    /// Hand a parse job to the pool. The result arrives on the main
    /// loop as `Msg::FileParsed`; the matching work-count decrement
    /// happens when the main thread finishes evaluating it.
    pub fn schedule_parse(&self, job: ParseJob) {
        self.inc_work();
        {
            let mut count = self.pool_counter.count.lock().unwrap();
            *count += 1;
        }
        let tx = self.tx.clone();
        let counter = self.pool_counter.clone();
        trace!(file = %job.name, "parse scheduled");
        self.pool.spawn(move || {
            let parsed = run_parse_job(job);
            // The receiver may already be gone after a failure.
            let _ = tx.send(Msg::FileParsed(parsed));
            let mut count = counter.count.lock().unwrap();
            *count -= 1;
            if *count == 0 {
                counter.cv.notify_all();
            }
        });
    }

    pub fn inc_work(&self) {
        self.work_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the work counter, posting `Complete` at zero.
    pub fn dec_work(&self) {
        if self.work_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.tx.send(Msg::Complete);
        }
    }

    /// Latch the first error and post it; subsequent errors drop.
    pub fn fail(&self, err: Error) {
        {
            let mut records = self.records.lock().unwrap();
            if records.failed {
                return;
            }
            records.failed = true;
        }
        let _ = self.tx.send(Msg::Fail(err));
    }

    pub fn is_failed(&self) -> bool {
        self.records.lock().unwrap().failed
    }

    /// Serialize a log line through the main loop.
    pub fn log(&self, message: String) {
        let _ = self.tx.send(Msg::Log(message));
    }

    pub fn add_gen_dependency(&self, path: PathBuf) {
        self.records.lock().unwrap().gen_deps.push(path);
    }

    pub fn add_written_file(&self, path: String) {
        self.records.lock().unwrap().written_files.push(path);
    }

    pub fn add_unknown_generated_input(&self, file: String, by: Label) {
        self.records
            .lock()
            .unwrap()
            .unknown_generated_inputs
            .push((file, by));
    }

    pub fn add_runtime_deps_output(&self, path: String) {
        self.records.lock().unwrap().runtime_deps_outputs.push(path);
    }

    pub fn gen_dependencies(&self) -> Vec<PathBuf> {
        self.records.lock().unwrap().gen_deps.clone()
    }

    /// Unknown generated inputs minus everything the run itself wrote
    /// (`write_file`, runtime-deps files). Meant to be called once
    /// after resolution.
    pub fn filtered_unknown_generated_inputs(&self) -> Vec<(String, Label)> {
        let records = self.records.lock().unwrap();
        records
            .unknown_generated_inputs
            .iter()
            .filter(|(file, _)| {
                !records.written_files.contains(file)
                    && !records.runtime_deps_outputs.contains(file)
            })
            .cloned()
            .collect()
    }

    /// Block until the pool has no in-flight jobs. Holds only the
    /// pool counter lock, never the records mutex.
    pub fn wait_for_pool(&self) {
        let mut count = self.pool_counter.count.lock().unwrap();
        while *count != 0 {
            count = self.pool_counter.cv.wait(count).unwrap();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.wait_for_pool();
    }
}

/// Read, lex and parse one file. Runs on a pool thread; pure.
fn run_parse_job(job: ParseJob) -> ParsedFile {
    let (source, result) = match std::fs::read_to_string(&job.fs_path) {
        Ok(source) => {
            let result = lexer::lex(&source, job.file_id)
                .and_then(|tokens| parser::parse_file(&tokens, job.file_id));
            (source, result)
        }
        Err(io) => (
            String::new(),
            Err(Error::new(
                ErrorKind::Io,
                Span::zero(job.file_id),
                format!("unable to read \"{}\": {}", job.name, io),
            )),
        ),
    };
    ParsedFile {
        file_id: job.file_id,
        name: job.name,
        dir: job.dir,
        source,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_job_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BUILD.gns");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "a = 1").unwrap();

        let (scheduler, rx) = Scheduler::new();
        scheduler.schedule_parse(ParseJob {
            fs_path: path,
            name: "//BUILD.gns".to_string(),
            dir: "//".to_string(),
            file_id: 0,
        });

        match rx.recv().unwrap() {
            Msg::FileParsed(pf) => {
                assert_eq!(pf.name, "//BUILD.gns");
                let block = pf.result.unwrap();
                assert_eq!(block.statements.len(), 1);
            }
            _ => panic!("expected FileParsed"),
        }
        scheduler.dec_work();
        assert!(matches!(rx.recv().unwrap(), Msg::Complete));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let (scheduler, rx) = Scheduler::new();
        scheduler.schedule_parse(ParseJob {
            fs_path: PathBuf::from("/nonexistent/BUILD.gns"),
            name: "//nonexistent/BUILD.gns".to_string(),
            dir: "//nonexistent".to_string(),
            file_id: 0,
        });
        match rx.recv().unwrap() {
            Msg::FileParsed(pf) => {
                let err = pf.result.unwrap_err();
                assert_eq!(err.kind, ErrorKind::Io);
            }
            _ => panic!("expected FileParsed"),
        }
        scheduler.dec_work();
    }

    #[test]
    fn test_first_error_latches() {
        let (scheduler, rx) = Scheduler::new();
        scheduler.fail(Error::new(ErrorKind::Generator, Span::zero(0), "first"));
        scheduler.fail(Error::new(ErrorKind::Generator, Span::zero(0), "second"));
        assert!(scheduler.is_failed());

        match rx.recv().unwrap() {
            Msg::Fail(err) => assert_eq!(err.message, "first"),
            _ => panic!("expected Fail"),
        }
        // The second error was suppressed.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_work_count_completion() {
        let (scheduler, rx) = Scheduler::new();
        scheduler.inc_work();
        scheduler.inc_work();
        scheduler.dec_work();
        assert!(rx.try_recv().is_err());
        scheduler.dec_work();
        assert!(matches!(rx.recv().unwrap(), Msg::Complete));
    }

    #[test]
    fn test_unknown_input_filtering() {
        let (scheduler, _rx) = Scheduler::new();
        let label = Label::new("//a", "t");
        scheduler.add_unknown_generated_input("//out/gen/a.h".to_string(), label.clone());
        scheduler.add_unknown_generated_input("//out/gen/b.h".to_string(), label);
        scheduler.add_written_file("//out/gen/a.h".to_string());

        let filtered = scheduler.filtered_unknown_generated_inputs();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].0, "//out/gen/b.h");
    }
}
