//! Core data model for the coverage engine.
//!
//! Everything here is plain data: file records, per-line flags and counts,
//! function records, and assertion records. Behavior lives in the runtime
//! store and the aggregator; the types below are shared across both.

pub mod errors;

pub use errors::{Error, Result, MAX_SOURCE_BYTES};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::instrument::sourcemap::SourceMap;
use crate::parser::ast::Comment;

/// Canonical key for an instrumented file: the absolute path as a string.
pub type FileId = String;

/// Derive the [`FileId`] for a path. Canonicalizes when the file exists so
/// symlinked and relative spellings collapse to one key.
pub fn file_id_for(path: &Path) -> FileId {
    match path.canonicalize() {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// Classification of a source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Executable statement line
    Code,
    /// Line fully occupied by a comment
    Comment,
    /// Whitespace-only line
    Blank,
    /// Non-executable block delimiter (`end`, `else`, lone `do`, ...)
    Structural,
}

impl LineKind {
    pub fn is_executable(self) -> bool {
        matches!(self, LineKind::Code)
    }
}

/// Two-bit flag set per line. COVERED implies EXECUTED; `set_covered`
/// maintains the implication.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFlags(u8);

impl LineFlags {
    const EXECUTED: u8 = 0b01;
    const COVERED: u8 = 0b10;

    pub fn executed(self) -> bool {
        self.0 & Self::EXECUTED != 0
    }

    pub fn covered(self) -> bool {
        self.0 & Self::COVERED != 0
    }

    pub fn set_executed(&mut self) {
        self.0 |= Self::EXECUTED;
    }

    pub fn set_covered(&mut self) {
        self.0 |= Self::COVERED | Self::EXECUTED;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Execution state of a single line.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub flags: LineFlags,
    pub execution_count: u64,
}

/// Reported state of an executable line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineState {
    NotCovered,
    Executed,
    Covered,
}

impl LineFlags {
    pub fn state(self) -> LineState {
        if self.covered() {
            LineState::Covered
        } else if self.executed() {
            LineState::Executed
        } else {
            LineState::NotCovered
        }
    }
}

/// How a function was introduced in source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    Global,
    Local,
    Method,
    Anonymous,
    Closure,
}

/// One tracked function. The id string is `"{name}:{start}-{end}"`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub name: String,
    pub kind: FunctionKind,
    pub start_line: u32,
    pub end_line: u32,
    pub executed: bool,
    pub covered: bool,
    pub execution_count: u64,
}

impl FunctionRecord {
    pub fn id(&self) -> String {
        format!("{}:{}-{}", self.name, self.start_line, self.end_line)
    }
}

/// Per-file coverage record. Created on first successful instrumentation,
/// uniquely owned by the global store; reports borrow it read-only.
#[derive(Clone, Debug)]
pub struct FileRecord {
    pub file_path: PathBuf,
    /// Original (uninstrumented) source text, kept for report rendering.
    pub source: String,
    pub line_count: u32,
    /// Lines holding at least one trackable statement, from the transformer.
    pub executable_lines: BTreeSet<u32>,
    /// Comment table from the parse, for line classification.
    pub comments: Vec<Comment>,
    pub lines: BTreeMap<u32, LineRecord>,
    /// Keyed by function id.
    pub functions: BTreeMap<String, FunctionRecord>,
    pub sourcemap: SourceMap,
}

impl FileRecord {
    pub fn line_state(&self, line: u32) -> LineState {
        self.lines
            .get(&line)
            .map(|l| l.flags.state())
            .unwrap_or(LineState::NotCovered)
    }

    pub fn execution_count(&self, line: u32) -> u64 {
        self.lines.get(&line).map(|l| l.execution_count).unwrap_or(0)
    }
}

/// Snapshot + result of one wrapped assertion call. Only records for
/// passing assertions are retained.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssertionRecord {
    pub test_file: String,
    pub test_line: u32,
    pub assertion_kind: String,
    /// Lines newly executed under this assertion's dynamic extent.
    pub covered_lines: BTreeMap<FileId, BTreeSet<u32>>,
}

/// Format a `"<file_id>:<line>"` key for the global executed/covered sets.
pub fn line_key(file_id: &str, line: u32) -> String {
    format!("{file_id}:{line}")
}

/// Split a `"<file_id>:<line>"` key back into its parts. File ids may
/// themselves contain `:` (Windows drive letters), so split at the last one.
pub fn split_line_key(key: &str) -> Option<(&str, u32)> {
    let idx = key.rfind(':')?;
    let line = key[idx + 1..].parse().ok()?;
    Some((&key[..idx], line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covered_implies_executed() {
        let mut flags = LineFlags::default();
        flags.set_covered();
        assert!(flags.executed(), "COVERED must imply EXECUTED");
        assert_eq!(flags.state(), LineState::Covered);
    }

    #[test]
    fn executed_alone_is_not_covered() {
        let mut flags = LineFlags::default();
        flags.set_executed();
        assert!(!flags.covered());
        assert_eq!(flags.state(), LineState::Executed);
    }

    #[test]
    fn line_key_round_trips() {
        let key = line_key("/tmp/a.lua", 17);
        assert_eq!(split_line_key(&key), Some(("/tmp/a.lua", 17)));
    }

    #[test]
    fn line_key_handles_windows_drive_colon() {
        let key = line_key("C:\\work\\a.lua", 3);
        assert_eq!(split_line_key(&key), Some(("C:\\work\\a.lua", 3)));
    }

    #[test]
    fn function_record_id_format() {
        let f = FunctionRecord {
            name: "add".into(),
            kind: FunctionKind::Local,
            start_line: 1,
            end_line: 3,
            executed: false,
            covered: false,
            execution_count: 0,
        };
        assert_eq!(f.id(), "add:1-3");
    }
}
