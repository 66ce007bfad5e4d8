//! Runtime coverage data store.
//!
//! Single-writer under the cooperative single-threaded model: the loader
//! hook creates file entries, the tracker writes EXECUTED flags and hit
//! counts, and the assertion hook is the only writer of COVERED. The
//! global executed/covered sets are keyed `"<file_id>:<line>"` so
//! assertion snapshots diff cheaply.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::core::{
    line_key, split_line_key, AssertionRecord, FileId, FileRecord, FunctionRecord, LineRecord,
    LineState,
};
use crate::instrument::SourceMap;
use crate::parser::ast::Comment;

/// An assertion currently accumulating coverage. The stack admits nested
/// assertions; each level keeps its own snapshot.
#[derive(Clone, Debug)]
pub struct PendingAssertion {
    pub file: FileId,
    pub line: u32,
    pub snapshot: BTreeSet<String>,
}

/// Process-wide coverage store.
#[derive(Debug, Default)]
pub struct CoverageData {
    files: BTreeMap<FileId, FileRecord>,
    executed_lines: BTreeSet<String>,
    covered_lines: BTreeSet<String>,
    assertions: Vec<AssertionRecord>,
    assertion_stack: Vec<PendingAssertion>,
    preserve_execution_counts: bool,
}

impl CoverageData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep per-line hit counts across [`reset`](Self::reset).
    pub fn set_preserve_execution_counts(&mut self, preserve: bool) {
        self.preserve_execution_counts = preserve;
    }

    /// Register an instrumented file. Idempotent: duplicate registrations
    /// are ignored.
    #[allow(clippy::too_many_arguments)]
    pub fn register_file(
        &mut self,
        file_id: &str,
        file_path: PathBuf,
        source: String,
        sourcemap: SourceMap,
        executable_lines: BTreeSet<u32>,
        comments: Vec<Comment>,
        functions: Vec<FunctionRecord>,
    ) {
        if self.files.contains_key(file_id) {
            return;
        }
        let line_count = source.lines().count() as u32;
        let functions = functions.into_iter().map(|f| (f.id(), f)).collect();
        self.files.insert(
            file_id.to_string(),
            FileRecord {
                file_path,
                source,
                line_count,
                executable_lines,
                comments,
                lines: BTreeMap::new(),
                functions,
                sourcemap,
            },
        );
    }

    /// Drop all execution and coverage data, keeping registered files.
    pub fn reset(&mut self) {
        let preserve = self.preserve_execution_counts;
        for file in self.files.values_mut() {
            if preserve {
                for line in file.lines.values_mut() {
                    line.flags.clear();
                }
            } else {
                file.lines.clear();
            }
            for func in file.functions.values_mut() {
                func.executed = false;
                func.covered = false;
                if !preserve {
                    func.execution_count = 0;
                }
            }
        }
        self.executed_lines.clear();
        self.covered_lines.clear();
        self.assertions.clear();
        self.assertion_stack.clear();
    }

    /// Drop everything, including registered files.
    pub fn full_reset(&mut self) {
        self.files.clear();
        self.executed_lines.clear();
        self.covered_lines.clear();
        self.assertions.clear();
        self.assertion_stack.clear();
    }

    /// Record one execution of `line`. No-op for lines outside the file's
    /// executable set, which protects non-executable lines against
    /// instrumentation mistakes.
    pub fn record_execution(&mut self, file_id: &str, line: u32) {
        let Some(file) = self.files.get_mut(file_id) else {
            return;
        };
        if !file.executable_lines.contains(&line) {
            return;
        }
        let record = file.lines.entry(line).or_insert_with(LineRecord::default);
        record.flags.set_executed();
        record.execution_count += 1;
        self.executed_lines.insert(line_key(file_id, line));
    }

    /// Promote `line` to COVERED. Implies EXECUTED; idempotent.
    pub fn record_coverage(&mut self, file_id: &str, line: u32) {
        let Some(file) = self.files.get_mut(file_id) else {
            return;
        };
        if !file.executable_lines.contains(&line) {
            return;
        }
        let record = file.lines.entry(line).or_insert_with(LineRecord::default);
        if !record.flags.executed() {
            record.execution_count += 1;
            self.executed_lines.insert(line_key(file_id, line));
        }
        record.flags.set_covered();
        self.covered_lines.insert(line_key(file_id, line));

        for func in file.functions.values_mut() {
            if func.start_line <= line && line <= func.end_line {
                func.covered = true;
            }
        }
    }

    /// Record one entry into the function identified by `function_id`.
    pub fn record_function_entry(&mut self, file_id: &str, function_id: &str) {
        let Some(file) = self.files.get_mut(file_id) else {
            return;
        };
        let Some(func) = file.functions.get_mut(function_id) else {
            log::debug!("unknown function id {function_id} for {file_id}");
            return;
        };
        func.executed = true;
        func.execution_count += 1;
    }

    pub fn get_line_state(&self, file_id: &str, line: u32) -> LineState {
        self.files
            .get(file_id)
            .map(|f| f.line_state(line))
            .unwrap_or(LineState::NotCovered)
    }

    pub fn get_file_data(&self, file_id: &str) -> Option<&FileRecord> {
        self.files.get(file_id)
    }

    pub fn files(&self) -> impl Iterator<Item = (&FileId, &FileRecord)> {
        self.files.iter()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn executed_lines(&self) -> &BTreeSet<String> {
        &self.executed_lines
    }

    pub fn covered_lines(&self) -> &BTreeSet<String> {
        &self.covered_lines
    }

    pub fn assertions(&self) -> &[AssertionRecord] {
        &self.assertions
    }

    pub fn append_assertion(&mut self, record: AssertionRecord) {
        self.assertions.push(record);
    }

    /// Copy of the executed set, taken before an assertion runs.
    pub fn snapshot_executed(&self) -> BTreeSet<String> {
        self.executed_lines.clone()
    }

    /// Lines executed since `before`, grouped by file.
    pub fn diff_executed(&self, before: &BTreeSet<String>) -> BTreeMap<FileId, BTreeSet<u32>> {
        let mut newly: BTreeMap<FileId, BTreeSet<u32>> = BTreeMap::new();
        for key in self.executed_lines.difference(before) {
            if let Some((file_id, line)) = split_line_key(key) {
                newly.entry(file_id.to_string()).or_default().insert(line);
            }
        }
        newly
    }

    // ---- assertion extent tracking ----

    pub fn begin_assertion(&mut self, file_id: &str, line: u32) {
        let snapshot = self.snapshot_executed();
        self.assertion_stack.push(PendingAssertion {
            file: file_id.to_string(),
            line,
            snapshot,
        });
    }

    pub fn end_assertion(&mut self) {
        self.assertion_stack.pop();
    }

    /// The innermost assertion currently accumulating coverage, if any.
    pub fn current_assertion(&self) -> Option<&PendingAssertion> {
        self.assertion_stack.last()
    }

    /// Rewrite `path:line` positions in a runtime error message back to
    /// original lines using the per-file sourcemaps. Best effort; unknown
    /// files pass through unchanged.
    pub fn rewrite_positions(&self, message: &str) -> String {
        let re = regex::Regex::new(r"([^\s:]+):(\d+)").expect("static regex compiles");
        re.replace_all(message, |caps: &regex::Captures| {
            let path = &caps[1];
            let line: u32 = caps[2].parse().unwrap_or(0);
            match self.files.get(path).and_then(|f| f.sourcemap.map_line(line)) {
                Some(original) if original > 0 => format!("{path}:{original}"),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
    }
}
