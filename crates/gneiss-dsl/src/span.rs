//! Source location tracking for diagnostics.
//!
//! Build files are identified by their source-absolute name (for
//! example `//base/BUILD.gns`), registered in a [`SourceMap`] that
//! assigns each one a small id. A [`Span`] is a byte range plus that
//! id; everything the user sees (line, column, snippet) is recomputed
//! from the map on demand.
//!
//! Files can be registered before their content is available: the
//! loader reserves an id on the main thread, ships the id to a parse
//! worker, and installs the text when the worker reports back.

use serde::{Deserialize, Serialize};

/// Compact source location: a byte range in one registered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Index into [`SourceMap`] files.
    pub file_id: u16,
    /// Byte offset of the first covered byte.
    pub start: u32,
    /// Byte offset one past the last covered byte.
    pub end: u32,
    /// 1-based line of `start`, cached so error headers never need the map.
    pub line: u32,
}

impl Span {
    pub fn new(file_id: u16, start: u32, end: u32, line: u32) -> Self {
        Self {
            file_id,
            start,
            end,
            line,
        }
    }

    /// Zero-length span at the start of a file.
    pub fn zero(file_id: u16) -> Self {
        Self::new(file_id, 0, 0, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Span covering both `self` and `other`.
    ///
    /// Spans from different files cannot be merged; `self` wins.
    pub fn merge(&self, other: &Span) -> Span {
        if self.file_id != other.file_id {
            return *self;
        }
        Span {
            file_id: self.file_id,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line.min(other.line),
        }
    }
}

/// All source files seen during one generator run.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

/// One registered file with a line index.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Source-absolute display name (`//base/BUILD.gns`).
    pub name: String,
    /// Full text. Empty until installed for placeholder entries.
    pub source: String,
    /// Byte offsets of line starts; last entry is an EOF sentinel.
    line_starts: Vec<u32>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file with its content, returning its id.
    pub fn add_file(&mut self, name: impl Into<String>, source: String) -> u16 {
        let id = self.reserve(name);
        self.install_source(id, source);
        id
    }

    /// Reserve an id for a file whose content is still being read.
    pub fn reserve(&mut self, name: impl Into<String>) -> u16 {
        let id = self.files.len();
        assert!(id <= u16::MAX as usize, "too many source files");
        self.files.push(SourceFile {
            name: name.into(),
            source: String::new(),
            line_starts: vec![0, 0],
        });
        id as u16
    }

    /// Install the text for a previously reserved id.
    pub fn install_source(&mut self, id: u16, source: String) {
        let file = &mut self.files[id as usize];
        file.line_starts = line_starts(&source);
        file.source = source;
    }

    pub fn file(&self, span: &Span) -> &SourceFile {
        &self.files[span.file_id as usize]
    }

    pub fn file_name(&self, span: &Span) -> &str {
        &self.files[span.file_id as usize].name
    }

    pub fn snippet(&self, span: &Span) -> &str {
        let file = &self.files[span.file_id as usize];
        let end = (span.end as usize).min(file.source.len());
        let start = (span.start as usize).min(end);
        &file.source[start..end]
    }

    /// 1-based (line, column) of the span start.
    pub fn line_col(&self, span: &Span) -> (u32, u32) {
        self.files[span.file_id as usize].line_col(span.start)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl SourceFile {
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.source.len() as u32);
        let idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.max(1) - 1,
        };
        // The sentinel is not a line of its own.
        let idx = idx.min(self.line_starts.len().saturating_sub(2));
        ((idx + 1) as u32, offset - self.line_starts[idx] + 1)
    }

    /// Text of a 1-based line, without its terminator.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        if line == 0 || line as usize >= self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[(line - 1) as usize] as usize;
        let end = self.line_starts[line as usize] as usize;
        Some(self.source[start..end].trim_end_matches(['\n', '\r']))
    }
}

fn line_starts(source: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (idx, b) in source.bytes().enumerate() {
        if b == b'\n' {
            starts.push((idx + 1) as u32);
        }
    }
    if starts.last() != Some(&(source.len() as u32)) {
        starts.push(source.len() as u32);
    }
    starts
}
